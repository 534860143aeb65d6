//! CSV ingestion
//!
//! Bytes flow from a [`ByteSource`](crate::source::ByteSource) through the
//! [`Tokenizer`], which builds a line and field index, into either the
//! materializer (one element type for the whole table) or the type detector
//! (one element type per column). [`CsvStoreExt`] feeds the result into a
//! [`DataStore`](numframe_core::DataStore).

mod convert;
mod detect;
mod load;
mod materialize;
mod options;
mod reader;
mod tokenizer;

pub use convert::{convert, ConvertError, Converted, FromField};
pub use detect::{detect, DetectOptions, TypedColumn};
pub use load::CsvStoreExt;
pub use materialize::{headings, materialize, MaterializeOptions, Materialized};
pub use options::{
    BadLinePolicy, CsvDataType, CsvOptions, Dialect, Precision, Quoting, DEFAULT_CHUNK_SIZE,
};
pub use reader::{read_csv, CsvData, CsvReader};
pub use tokenizer::Tokenizer;

#[cfg(test)]
mod tests {
    use super::*;
    use numframe_core::{DataStore, Interval, Order, Status};

    #[test]
    fn test_csv_to_selection() {
        let csv_data = "\
a,b,c
1,,3
4,5,6
7,8,
10,11,12
";
        let options = CsvOptions {
            header: true,
            warn_for_missing_data: true,
            ..CsvOptions::default()
        };

        let mut store = DataStore::new();
        let status = store.load_csv_bytes(csv_data.as_bytes(), &options).unwrap();
        assert_eq!(status, Status::MissingData);
        assert_eq!((store.n_rows(), store.n_cols()), (4, 3));

        store.select_non_missing("clean", true).unwrap();
        let mut out = vec![0.0; 6];
        let status = store.extract_selection("clean", Order::RowMajor, 3, &mut out).unwrap();
        assert_eq!(status, Status::Success);
        assert_eq!(out, vec![4.0, 5.0, 6.0, 10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_european_dialect() {
        let csv_data = "\
name;price
apple;1.234,50
pear;0,75
";
        let mut options = CsvOptions::default();
        for (name, value) in [
            ("delimiter", ";"),
            ("decimal", ","),
            ("thousands", "."),
            ("use header row", "1"),
            ("datatype", "auto"),
        ] {
            options.set(name, value).unwrap();
        }

        let mut store = DataStore::new();
        store.load_csv_bytes(csv_data.as_bytes(), &options).unwrap();
        let price = store.get_idx_from_label("price").unwrap();
        let mut out = vec![0.0; 2];
        store.extract_column(price, 2, &mut out).unwrap();
        assert_eq!(out, vec![1234.5, 0.75]);
        let mut names = vec![String::new(); 2];
        store
            .extract_slice(Interval::new(0, 1).unwrap(), Interval::point(0), 2, 0, &mut names)
            .unwrap();
        assert_eq!(names, vec!["apple", "pear"]);
    }
}
