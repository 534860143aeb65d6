//! Loading CSV input into a [`DataStore`]

use std::collections::HashSet;
use std::path::Path;

use numframe_core::{BlockInput, DataStore, Element, Order, Status};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::source::{open_path, ByteSource, SliceSource};

use super::convert::FromField;
use super::detect::{detect, DetectOptions, TypedColumn};
use super::options::{CsvDataType, CsvOptions};
use super::reader::{CsvData, CsvReader};

/// CSV loading entry points on [`DataStore`]
pub trait CsvStoreExt {
    /// Load the file at `path` into this empty store
    fn load_csv_path<P: AsRef<Path>>(&mut self, path: P, options: &CsvOptions) -> Result<Status>;

    /// Load everything `source` produces into this empty store
    fn load_csv_source(&mut self, source: &mut dyn ByteSource, options: &CsvOptions) -> Result<Status>;

    /// Load in-memory bytes into this empty store
    fn load_csv_bytes(&mut self, bytes: &[u8], options: &CsvOptions) -> Result<Status> {
        self.load_csv_source(&mut SliceSource::new(bytes), options)
    }
}

impl CsvStoreExt for DataStore {
    fn load_csv_path<P: AsRef<Path>>(&mut self, path: P, options: &CsvOptions) -> Result<Status> {
        let path = path.as_ref();
        info!(path = %path.display(), datatype = ?options.datatype, "loading csv into data store");
        let mut source = open_path(path, options.use_memory_mapping)?;
        self.load_csv_source(source.as_mut(), options)
    }

    fn load_csv_source(&mut self, source: &mut dyn ByteSource, options: &CsvOptions) -> Result<Status> {
        if !self.is_empty() {
            return Err(numframe_core::Error::InvalidArgument(
                "CSV data can only be loaded into an empty data store".into(),
            )
            .into());
        }
        let result = load(self, source, options);
        if result.is_err() {
            // leave no half-loaded table behind
            *self = DataStore::new();
        }
        result
    }
}

fn load(store: &mut DataStore, source: &mut dyn ByteSource, options: &CsvOptions) -> Result<Status> {
    let (status, headings) = match options.datatype {
        CsvDataType::Int => load_typed::<i64>(store, source, options)?,
        CsvDataType::Float => load_typed::<f32>(store, source, options)?,
        CsvDataType::Double => load_typed::<f64>(store, source, options)?,
        CsvDataType::Bool => load_typed::<u8>(store, source, options)?,
        CsvDataType::Str => load_typed::<String>(store, source, options)?,
        CsvDataType::Auto => load_detected(store, source, options)?,
    };
    if let Some(names) = headings {
        label_columns(store, &names)?;
    }
    Ok(status)
}

fn load_typed<T: FromField + Element>(
    store: &mut DataStore,
    source: &mut dyn ByteSource,
    options: &CsvOptions,
) -> Result<(Status, Option<Vec<String>>)> {
    let reader = CsvReader::new(options.clone())?;
    let CsvData { data, rows, cols, headings, status, .. } = reader.read_source::<T>(source)?;
    if status == Status::NoData {
        return Ok((status, None));
    }
    store.concatenate_columns(rows, cols, BlockInput::Adopt(data), options.order)?;
    Ok((status, headings))
}

/// A run of adjacent detected columns sharing one element type
enum Group {
    Int(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Bool(Vec<u8>),
    Str(Vec<String>),
}

impl Group {
    fn start(column: TypedColumn<'_>) -> Self {
        match column {
            TypedColumn::Int(v) => Group::Int(v),
            TypedColumn::Float(v) => Group::Float(v),
            TypedColumn::Double(v) => Group::Double(v),
            TypedColumn::Bool(v) => Group::Bool(v),
            TypedColumn::Str(v) => Group::Str(v.into_iter().map(str::to_string).collect()),
        }
    }

    /// Append `column` when its type matches, otherwise hand it back
    fn extend<'a>(&mut self, column: TypedColumn<'a>) -> std::result::Result<(), TypedColumn<'a>> {
        match (self, column) {
            (Group::Int(g), TypedColumn::Int(v)) => g.extend(v),
            (Group::Float(g), TypedColumn::Float(v)) => g.extend(v),
            (Group::Double(g), TypedColumn::Double(v)) => g.extend(v),
            (Group::Bool(g), TypedColumn::Bool(v)) => g.extend(v),
            (Group::Str(g), TypedColumn::Str(v)) => g.extend(v.into_iter().map(str::to_string)),
            (_, column) => return Err(column),
        }
        Ok(())
    }

    fn commit(self, store: &mut DataStore, rows: usize, cols: usize) -> Result<()> {
        let order = Order::ColumnMajor;
        match self {
            Group::Int(v) => store.concatenate_columns(rows, cols, BlockInput::Adopt(v), order),
            Group::Float(v) => store.concatenate_columns(rows, cols, BlockInput::Adopt(v), order),
            Group::Double(v) => store.concatenate_columns(rows, cols, BlockInput::Adopt(v), order),
            Group::Bool(v) => store.concatenate_columns(rows, cols, BlockInput::Adopt(v), order),
            Group::Str(v) => store.concatenate_columns(rows, cols, BlockInput::Adopt(v), order),
        }?;
        Ok(())
    }
}

fn load_detected(
    store: &mut DataStore,
    source: &mut dyn ByteSource,
    options: &CsvOptions,
) -> Result<(Status, Option<Vec<String>>)> {
    let mut text_options = options.clone();
    text_options.order = Order::RowMajor;
    let reader = CsvReader::new(text_options)?;
    let text = reader.read_source::<String>(source)?;
    if text.status == Status::NoData {
        return Ok((text.status, None));
    }

    let opts = DetectOptions {
        integers_as_fp: options.integers_as_fp,
        precision: options.precision,
    };
    let columns = detect(&text.data, text.rows, text.cols, options.dialect(), opts);

    let mut current: Option<(Group, usize)> = None;
    for column in columns {
        current = Some(match current.take() {
            None => (Group::start(column), 1),
            Some((mut group, width)) => match group.extend(column) {
                Ok(()) => (group, width + 1),
                Err(column) => {
                    group.commit(store, text.rows, width)?;
                    (Group::start(column), 1)
                }
            },
        });
    }
    if let Some((group, width)) = current {
        group.commit(store, text.rows, width)?;
    }
    Ok((text.status, text.headings))
}

fn label_columns(store: &mut DataStore, names: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for (idx, name) in names.iter().enumerate() {
        if name.is_empty() {
            continue;
        }
        if !seen.insert(name.as_str()) {
            warn!(column = idx, label = %name, "duplicate heading left unlabeled");
            continue;
        }
        store.label_column(name, idx).map_err(Error::from)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use numframe_core::{ErrorKind, Interval, ScalarType};

    fn options(f: impl FnOnce(&mut CsvOptions)) -> CsvOptions {
        let mut options = CsvOptions::default();
        f(&mut options);
        options
    }

    #[test]
    fn test_load_fixed_type() {
        let mut store = DataStore::new();
        let status = store
            .load_csv_bytes(b"a,b\n1,2\n3,4\n", &options(|o| o.header = true))
            .unwrap();
        assert_eq!(status, Status::Success);
        assert_eq!((store.n_rows(), store.n_cols()), (2, 2));
        assert_eq!(store.column_type(0).unwrap(), ScalarType::Double);
        assert_eq!(store.get_idx_from_label("b").unwrap(), 1);
        assert_eq!(store.get_col_label(0).unwrap(), "a");

        let mut out = vec![0.0; 2];
        store.extract_column(1, 2, &mut out).unwrap();
        assert_eq!(out, vec![2.0, 4.0]);
    }

    #[test]
    fn test_load_auto_groups_columns() {
        let csv_data = "\
id,count,score,flag,name,w
1,10,0.5,true,ann,1.5
2,20,1.5,false,bob,2
";
        let mut store = DataStore::new();
        let status = store
            .load_csv_bytes(
                csv_data.as_bytes(),
                &options(|o| {
                    o.header = true;
                    o.datatype = CsvDataType::Auto;
                }),
            )
            .unwrap();
        assert_eq!(status, Status::Success);
        let types: Vec<_> = (0..6).map(|c| store.column_type(c).unwrap()).collect();
        assert_eq!(
            types,
            vec![
                ScalarType::Int,
                ScalarType::Int,
                ScalarType::Double,
                ScalarType::Bool,
                ScalarType::Str,
                ScalarType::Double,
            ]
        );

        let mut ids = vec![0i64; 4];
        store
            .extract_slice(Interval::new(0, 1).unwrap(), Interval::new(0, 1).unwrap(), 2, 0, &mut ids)
            .unwrap();
        assert_eq!(ids, vec![1, 2, 10, 20]);
        assert_eq!(store.get_element::<String>(1, 4).unwrap(), "bob");
        assert_eq!(store.get_element::<u8>(0, 3).unwrap(), 1);
        assert_eq!(store.get_idx_from_label("name").unwrap(), 4);
    }

    #[test]
    fn test_load_requires_empty_store() {
        let mut store = DataStore::new();
        store.load_csv_bytes(b"1\n", &CsvOptions::default()).unwrap();
        let err = store.load_csv_bytes(b"2\n", &CsvOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(store.n_rows(), 1);
    }

    #[test]
    fn test_failed_load_leaves_store_empty() {
        let mut store = DataStore::new();
        let err = store
            .load_csv_bytes(b"1,2\nx,4\n", &options(|o| o.datatype = CsvDataType::Int))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parsing);
        assert!(store.is_empty());
    }

    #[test]
    fn test_no_data_leaves_store_empty() {
        let mut store = DataStore::new();
        let status = store.load_csv_bytes(b"", &CsvOptions::default()).unwrap();
        assert_eq!(status, Status::NoData);
        assert!(store.is_empty());
    }

    #[test]
    fn test_duplicate_headings() {
        let mut store = DataStore::new();
        store
            .load_csv_bytes(b"a,a,b\n1,2,3\n", &options(|o| o.header = true))
            .unwrap();
        assert_eq!(store.get_idx_from_label("a").unwrap(), 0);
        assert_eq!(store.get_col_label(1).unwrap(), "");
    }
}
