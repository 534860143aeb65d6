//! End-to-end tests: CSV files into data stores

use std::io::Write;
use std::sync::{Arc, Mutex};

use numframe_core::{Interval, ScalarType};
use numframe_readers::csv::{BadLinePolicy, CsvDataType};
use numframe_readers::{
    read_csv, CsvData, CsvOptions, CsvStoreExt, DataStore, ErrorKind, Order, Status,
};
use tempfile::NamedTempFile;

fn csv_file(contents: &str) -> anyhow::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_file_round_trip_streamed_and_mapped() -> anyhow::Result<()> {
    let file = csv_file("\u{feff}x,y\r\n1,2\r\n3,4\r\n")?;
    for use_memory_mapping in [false, true] {
        let options = CsvOptions {
            header: true,
            use_memory_mapping,
            chunk_size: 5,
            ..CsvOptions::default()
        };
        let data: CsvData<i64> = read_csv(file.path(), options)?;
        assert_eq!(data.data, vec![1, 2, 3, 4]);
        assert_eq!(data.headings.as_deref(), Some(&["x".to_string(), "y".to_string()][..]));
        assert_eq!(data.status, Status::Success);
    }
    Ok(())
}

#[test]
fn test_missing_file() {
    let err = read_csv::<f64, _>("/no/such/dir/data.csv", CsvOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileNotFound);
    assert!(err.to_string().contains("data.csv"));
}

#[test]
fn test_auto_load_from_file() -> anyhow::Result<()> {
    let file = csv_file(
        "\
# sensor export
station,reading,ok,temp
north,1,TRUE,20.5
south,2,FALSE,21
east,3,TRUE,19.25
",
    )?;
    let options = CsvOptions {
        header: true,
        datatype: CsvDataType::Auto,
        ..CsvOptions::default()
    };
    let mut store = DataStore::new();
    let status = store.load_csv_path(file.path(), &options)?;
    assert_eq!(status, Status::BadLines);

    assert_eq!((store.n_rows(), store.n_cols()), (3, 4));
    let types: Vec<_> = (0..4).map(|c| store.column_type(c)).collect::<Result<_, _>>()?;
    assert_eq!(types, vec![ScalarType::Str, ScalarType::Int, ScalarType::Bool, ScalarType::Double]);

    let temp = store.get_idx_from_label("temp")?;
    let mut temps = vec![0.0; 3];
    store.extract_column(temp, 3, &mut temps)?;
    assert_eq!(temps, vec![20.5, 21.0, 19.25]);

    store.select_rows("tail", Interval::new(1, 2)?)?;
    store.select_columns("tail", Interval::point(1))?;
    let mut readings = vec![0i64; 2];
    assert_eq!(store.extract_selection("tail", Order::ColumnMajor, 2, &mut readings)?, Status::Success);
    assert_eq!(readings, vec![2, 3]);
    Ok(())
}

#[test]
fn test_loaded_stores_concatenate() -> anyhow::Result<()> {
    let left_file = csv_file("a,b\n1,2\n3,4\n")?;
    let right_file = csv_file("c\n5\n6\n")?;
    let options = CsvOptions {
        header: true,
        datatype: CsvDataType::Int,
        ..CsvOptions::default()
    };

    let mut left = DataStore::new();
    left.load_csv_path(left_file.path(), &options)?;
    let mut right = DataStore::new();
    right.load_csv_path(right_file.path(), &options)?;

    left.horizontal_concat(&mut right)?;
    assert!(right.is_empty());
    assert_eq!(left.n_cols(), 3);
    assert_eq!(left.get_idx_from_label("c")?, 2);
    assert_eq!(left.get_element::<i64>(1, 2)?, 6);
    Ok(())
}

#[test]
fn test_bad_line_warning_is_logged() -> anyhow::Result<()> {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();

    let mut options = CsvOptions::default();
    options.dialect.on_bad_lines = BadLinePolicy::Warn;
    let data: CsvData<f64> = tracing::subscriber::with_default(subscriber, || {
        numframe_readers::CsvReader::new(options)?.read_bytes(b"1,2\n3,4,5\n6,7\n")
    })?;
    assert_eq!(data.rows, 2);
    assert_eq!(data.status, Status::BadLines);

    let logs = String::from_utf8(captured.0.lock().unwrap().clone())?;
    assert!(logs.contains("Skipping line 2: expected 2 fields, saw 3"), "{logs}");
    assert!(logs.contains("some csv lines were ignored"), "{logs}");
    Ok(())
}

#[test]
fn test_large_input_across_chunks() -> anyhow::Result<()> {
    let mut contents = String::from("i,sq\n");
    for i in 0..5000 {
        contents.push_str(&format!("{i},{}\n", i * i));
    }
    let file = csv_file(&contents)?;
    let options = CsvOptions {
        header: true,
        chunk_size: 1000,
        order: Order::ColumnMajor,
        ..CsvOptions::default()
    };
    let data: CsvData<i64> = read_csv(file.path(), options)?;
    assert_eq!((data.rows, data.cols), (5000, 2));
    assert_eq!(data.data[4999], 4999);
    assert_eq!(data.data[5000 + 4999], 4999 * 4999);
    Ok(())
}
