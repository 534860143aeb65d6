//! CSV reader driving tokenizer and materializer

use std::path::Path;

use numframe_core::Status;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::source::{open_path, ByteSource, SliceSource};

use super::convert::FromField;
use super::materialize::{headings, materialize, MaterializeOptions};
use super::options::CsvOptions;
use super::tokenizer::Tokenizer;

/// Result of a typed CSV read
#[derive(Debug, Clone, PartialEq)]
pub struct CsvData<T> {
    /// Values laid out in the requested order
    pub data: Vec<T>,

    /// Number of data rows
    pub rows: usize,

    /// Number of columns
    pub cols: usize,

    /// Column names when a header row was requested
    pub headings: Option<Vec<String>>,

    /// Overall outcome; warnings do not make a read fail
    pub status: Status,

    /// Every warning raised during the read
    pub warnings: Vec<String>,
}

/// Reads CSV input into dense typed matrices
#[derive(Debug, Clone)]
pub struct CsvReader {
    options: CsvOptions,
}

impl CsvReader {
    /// Create a reader after validating `options`
    pub fn new(options: CsvOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    /// Reader options
    pub fn options(&self) -> &CsvOptions {
        &self.options
    }

    /// Read the file at `path`
    pub fn read_path<T: FromField, P: AsRef<Path>>(&self, path: P) -> Result<CsvData<T>> {
        let path = path.as_ref();
        info!(path = %path.display(), ty = T::NAME, "reading csv file");
        let mut source = open_path(path, self.options.use_memory_mapping)?;
        self.read_source(source.as_mut())
    }

    /// Read in-memory bytes
    pub fn read_bytes<T: FromField>(&self, bytes: &[u8]) -> Result<CsvData<T>> {
        self.read_source(&mut SliceSource::new(bytes))
    }

    /// Read everything `source` produces
    pub fn read_source<T: FromField>(&self, source: &mut dyn ByteSource) -> Result<CsvData<T>> {
        let options = &self.options;
        let dialect = options.dialect();
        let tok = self.tokenize(source)?;
        let mut warnings = tok.warnings().to_vec();
        let mut status = Status::Success;
        if tok.file_lines() != tok.lines() as u64 {
            let msg = format!(
                "Some lines were ignored: {} of {} lines were read",
                tok.lines(),
                tok.file_lines()
            );
            debug!("{msg}");
            warnings.push(msg);
            status = Status::BadLines;
        }

        let first_line = usize::from(options.header);
        let opts = MaterializeOptions {
            first_line,
            skip_footer: options.skip_footer,
            warn_for_missing_data: options.warn_for_missing_data,
            order: options.order,
            columns: options.columns.as_deref(),
        };
        let m = materialize::<T>(&tok, dialect, &opts)?;
        let names = if options.header && tok.lines() > 0 {
            Some(headings(&tok, dialect, m.cols, opts.columns)?)
        } else {
            None
        };

        warnings.extend(m.warnings);
        if m.status != Status::Success {
            status = m.status;
        }
        if status == Status::BadLines {
            warn!(lines = tok.lines(), file_lines = tok.file_lines(), "some csv lines were ignored");
        }
        Ok(CsvData {
            data: m.data,
            rows: m.rows,
            cols: m.cols,
            headings: names,
            status,
            warnings,
        })
    }

    /// Tokenize the whole source with the configured dialect
    pub(crate) fn tokenize(&self, source: &mut dyn ByteSource) -> Result<Tokenizer<'_>> {
        let mut tok = Tokenizer::new(self.options.dialect())
            .with_header_rows(usize::from(self.options.header))
            .with_column_subset(self.options.columns.is_some())
            .with_chunk_size(self.options.chunk_size);
        tok.tokenize_all_rows(source)?;
        Ok(tok)
    }
}

/// Read the file at `path` with `options`
pub fn read_csv<T: FromField, P: AsRef<Path>>(path: P, options: CsvOptions) -> Result<CsvData<T>> {
    CsvReader::new(options)?.read_path(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use numframe_core::{ErrorKind, Order};

    fn reader(f: impl FnOnce(&mut CsvOptions)) -> CsvReader {
        let mut options = CsvOptions::default();
        f(&mut options);
        CsvReader::new(options).unwrap()
    }

    #[test]
    fn test_read_doubles_with_header() {
        let csv_data = "\
x,y,z
1,2,3
4.5,5,6e1
";
        let data: CsvData<f64> = reader(|o| o.header = true).read_bytes(csv_data.as_bytes()).unwrap();
        assert_eq!((data.rows, data.cols), (2, 3));
        assert_eq!(data.data, vec![1.0, 2.0, 3.0, 4.5, 5.0, 60.0]);
        assert_eq!(data.headings.unwrap(), vec!["x", "y", "z"]);
        assert_eq!(data.status, Status::Success);
        assert!(data.warnings.is_empty());
    }

    #[test]
    fn test_bad_lines_status() {
        let csv_data = "\
# comment
1,2
3,4,5
6,7
";
        let data: CsvData<i64> = reader(|o| o.set("bad lines", "warn").unwrap())
            .read_bytes(csv_data.as_bytes())
            .unwrap();
        assert_eq!(data.data, vec![1, 2, 6, 7]);
        assert_eq!(data.status, Status::BadLines);
        assert!(data.warnings.iter().any(|w| w.starts_with("Skipping line 3")));
        assert!(data.warnings.iter().any(|w| w.starts_with("Some lines were ignored")));
    }

    #[test]
    fn test_missing_data_status_wins() {
        let data: CsvData<f64> = reader(|o| o.warn_for_missing_data = true)
            .read_bytes(b"1,abc\n3,4\n")
            .unwrap();
        assert_eq!(data.status, Status::MissingData);
        assert!(data.data[1].is_nan());
    }

    #[test]
    fn test_empty_trailing_field_is_missing() {
        let data: CsvData<f64> = reader(|o| o.warn_for_missing_data = true)
            .read_bytes(b"1,\n3,4\n")
            .unwrap();
        assert_eq!((data.rows, data.cols), (2, 2));
        assert_eq!(data.data[0], 1.0);
        assert!(data.data[1].is_nan());
        assert_eq!(&data.data[2..], &[3.0, 4.0]);
        assert_eq!(data.status, Status::MissingData);
        assert!(data.warnings.iter().any(|w| w == "Missing data on line 1, entry 1"), "{:?}", data.warnings);
    }

    #[test]
    fn test_plain_integer_tables() {
        let data: CsvData<i64> = reader(|_| {}).read_bytes(b"1,2\n3,4\n").unwrap();
        assert_eq!((data.rows, data.cols), (2, 2));
        assert_eq!(data.data, vec![1, 2, 3, 4]);
        assert!(data.headings.is_none());

        let data: CsvData<i64> = reader(|o| o.header = true).read_bytes(b"a,b\n1,2\n3,4\n").unwrap();
        assert_eq!(data.headings.unwrap(), vec!["a", "b"]);
        assert_eq!(data.data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_column_major_strings() {
        let data: CsvData<String> = reader(|o| o.order = Order::ColumnMajor)
            .read_bytes(b"a, b\nc,d \n")
            .unwrap();
        assert_eq!(data.data, vec!["a", "c", " b", "d"]);
    }

    #[test]
    fn test_header_only() {
        let data: CsvData<f64> = reader(|o| o.header = true).read_bytes(b"x,y\n").unwrap();
        assert_eq!(data.status, Status::NoData);
        assert_eq!((data.rows, data.cols), (0, 2));
        assert_eq!(data.headings.unwrap(), vec!["x", "y"]);
    }

    #[test]
    fn test_projection_and_footer() {
        let data: CsvData<i64> = reader(|o| {
            o.columns = Some(vec![1]);
            o.skip_footer = true;
        })
        .read_bytes(b"1,2,3\n4,5\n7,8,9\nsum,15,x\n")
        .unwrap();
        assert_eq!(data.data, vec![2, 5, 8]);
        assert_eq!(data.cols, 1);
    }

    #[test]
    fn test_typed_entry_points() {
        let r = reader(|_| {});
        let ints: CsvData<i32> = r.read_bytes(b"1,-2\n").unwrap();
        assert_eq!(ints.data, vec![1, -2]);
        let uints: CsvData<u64> = r.read_bytes(b"18446744073709551615\n").unwrap();
        assert_eq!(uints.data, vec![u64::MAX]);
        let bools: CsvData<u8> = r.read_bytes(b"TRUE,false\n").unwrap();
        assert_eq!(bools.data, vec![1, 0]);
        let floats: CsvData<f32> = r.read_bytes(b"0.5\n").unwrap();
        assert_eq!(floats.data, vec![0.5]);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let mut options = CsvOptions::default();
        options.dialect.thousands = Some(b'.');
        assert_eq!(CsvReader::new(options).unwrap_err().kind(), ErrorKind::InvalidInput);
    }
}
