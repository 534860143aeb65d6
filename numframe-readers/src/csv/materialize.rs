//! Turning tokenized lines into dense typed matrices

use numframe_core::{Order, Status};
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::convert::FromField;
use super::options::Dialect;
use super::tokenizer::Tokenizer;

/// Settings of a single materialization
#[derive(Debug, Clone, Copy)]
pub struct MaterializeOptions<'a> {
    /// First good line holding data; lines before it are headings
    pub first_line: usize,

    /// Exclude the last good line
    pub skip_footer: bool,

    /// Store sentinels for unparsable entries instead of failing
    pub warn_for_missing_data: bool,

    /// Layout of the output matrix
    pub order: Order,

    /// Only convert these columns, in this order
    pub columns: Option<&'a [usize]>,
}

impl Default for MaterializeOptions<'_> {
    fn default() -> Self {
        Self {
            first_line: 0,
            skip_footer: false,
            warn_for_missing_data: false,
            order: Order::RowMajor,
            columns: None,
        }
    }
}

/// A dense matrix produced from tokenized lines
#[derive(Debug, Clone, PartialEq)]
pub struct Materialized<T> {
    /// Values in the requested order
    pub data: Vec<T>,

    /// Number of rows
    pub rows: usize,

    /// Number of columns
    pub cols: usize,

    /// `Success`, `NoData` or `MissingData`
    pub status: Status,

    /// Accumulated warnings
    pub warnings: Vec<String>,
}

fn platform_limit(what: &str, n: usize) -> Result<usize> {
    isize::try_from(n)
        .map(|_| n)
        .map_err(|_| Error::Overflow(format!("{what} {n} exceeds the platform limit")))
}

/// Number of good lines to convert once the footer is excluded
fn usable_lines(tok: &Tokenizer<'_>, skip_footer: bool) -> usize {
    let lines = tok.lines();
    if skip_footer {
        lines.saturating_sub(1)
    } else {
        lines
    }
}

/// Convert every data field of `tok` into a `T` matrix
pub fn materialize<T: FromField>(
    tok: &Tokenizer<'_>,
    dialect: &Dialect,
    opts: &MaterializeOptions<'_>,
) -> Result<Materialized<T>> {
    let lines = usable_lines(tok, opts.skip_footer);

    if lines <= opts.first_line {
        let cols = match (opts.columns, lines) {
            (Some(columns), _) => columns.len(),
            (None, 0) => 0,
            (None, _) => tok.line_fields(0),
        };
        let msg = "No data in CSV input".to_string();
        warn!("{msg}");
        return Ok(Materialized {
            data: Vec::new(),
            rows: 0,
            cols,
            status: Status::NoData,
            warnings: vec![msg],
        });
    }

    let rows = platform_limit("row count", lines - opts.first_line)?;
    let total_fields = tok.line_start(lines) - tok.line_start(opts.first_line);
    let fields_per_line = platform_limit("fields per line", total_fields / rows)?;

    let (cols, source_cols): (usize, Vec<usize>) = match opts.columns {
        Some(columns) => (columns.len(), columns.to_vec()),
        None => (fields_per_line, (0..fields_per_line).collect()),
    };
    let needed = match opts.columns {
        Some(columns) => columns.iter().max().map_or(0, |m| m + 1),
        None => fields_per_line,
    };

    for line in opts.first_line..lines {
        let fields = tok.line_fields(line);
        let ragged = match opts.columns {
            Some(_) => fields < needed,
            None => fields != fields_per_line,
        };
        if ragged {
            return Err(Error::Ragged {
                line: tok.file_line_number(line),
                fields,
                expected: needed,
            });
        }
    }

    let len = rows
        .checked_mul(cols)
        .ok_or_else(|| Error::Overflow(format!("{rows} x {cols} matrix exceeds usize")))?;
    let mut data: Vec<T> = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|e| Error::Memory(format!("allocating {rows} x {cols} {} matrix: {e}", T::NAME)))?;
    data.resize(len, T::missing());

    let mut status = Status::Success;
    let mut warnings = Vec::new();
    for (row, line) in (opts.first_line..lines).enumerate() {
        let start = tok.line_start(line);
        for (col, &src) in source_cols.iter().enumerate() {
            let value = match T::from_field(tok.field(start + src), dialect) {
                Ok(converted) => converted.value,
                Err(_) if opts.warn_for_missing_data => {
                    warnings.push(format!(
                        "Missing data on line {}, entry {col}",
                        tok.file_line_number(line)
                    ));
                    status = Status::MissingData;
                    T::missing()
                }
                Err(source) => {
                    return Err(Error::Field {
                        line: tok.file_line_number(line),
                        entry: col,
                        source,
                    });
                }
            };
            data[opts.order.offset(row, col, rows, cols)] = value;
        }
    }

    if status == Status::MissingData {
        warn!(entries = warnings.len(), "replaced unparsable entries with missing values");
    }
    debug!(rows, cols, ty = T::NAME, "materialized csv data");
    Ok(Materialized { data, rows, cols, status, warnings })
}

/// Parse the first good line as column names
///
/// The heading count must equal the data width; with a projection only the
/// projected names are returned.
pub fn headings(
    tok: &Tokenizer<'_>,
    dialect: &Dialect,
    cols: usize,
    columns: Option<&[usize]>,
) -> Result<Vec<String>> {
    if tok.lines() == 0 {
        return Ok(Vec::new());
    }
    let fields = tok.line_fields(0);
    let start = tok.line_start(0);
    let name = |i: usize| -> Result<String> {
        String::from_field(tok.field(start + i), dialect)
            .map(|c| c.value)
            .map_err(|source| Error::Field { line: tok.file_line_number(0), entry: i, source })
    };

    match columns {
        Some(columns) => {
            if let Some(&missing) = columns.iter().find(|&&c| c >= fields) {
                return Err(Error::Ragged {
                    line: tok.file_line_number(0),
                    fields,
                    expected: missing + 1,
                });
            }
            columns.iter().map(|&c| name(c)).collect()
        }
        None => {
            if fields != cols {
                return Err(Error::Ragged { line: tok.file_line_number(0), fields, expected: cols });
            }
            (0..fields).map(name).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SliceSource;
    use numframe_core::ErrorKind;

    fn tokenized<'d>(dialect: &'d Dialect, header: bool, input: &str) -> Tokenizer<'d> {
        let mut tok = Tokenizer::new(dialect).with_header_rows(usize::from(header));
        tok.tokenize_all_rows(&mut SliceSource::new(input.as_bytes())).unwrap();
        tok
    }

    #[test]
    fn test_row_and_column_major() {
        let d = Dialect::default();
        let tok = tokenized(&d, false, "1,2,3\n4,5,6\n");
        let rm: Materialized<i64> = materialize(&tok, &d, &MaterializeOptions::default()).unwrap();
        assert_eq!((rm.rows, rm.cols), (2, 3));
        assert_eq!(rm.data, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(rm.status, Status::Success);

        let opts = MaterializeOptions { order: Order::ColumnMajor, ..MaterializeOptions::default() };
        let cm: Materialized<i64> = materialize(&tok, &d, &opts).unwrap();
        assert_eq!(cm.data, vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_headings_and_first_line() {
        let d = Dialect::default();
        let tok = tokenized(&d, true, "x,y\n1.5,2\n3,4.25\n");
        let opts = MaterializeOptions { first_line: 1, ..MaterializeOptions::default() };
        let m: Materialized<f64> = materialize(&tok, &d, &opts).unwrap();
        assert_eq!(m.data, vec![1.5, 2.0, 3.0, 4.25]);
        assert_eq!(headings(&tok, &d, m.cols, None).unwrap(), vec!["x", "y"]);
        assert_eq!(headings(&tok, &d, 3, None).unwrap_err().kind(), ErrorKind::Parsing);
    }

    #[test]
    fn test_no_data() {
        let d = Dialect::default();
        let tok = tokenized(&d, false, "");
        let m: Materialized<f64> = materialize(&tok, &d, &MaterializeOptions::default()).unwrap();
        assert_eq!(m.status, Status::NoData);
        assert_eq!((m.rows, m.cols), (0, 0));

        let tok = tokenized(&d, true, "a,b,c\n");
        let opts = MaterializeOptions { first_line: 1, ..MaterializeOptions::default() };
        let m: Materialized<f64> = materialize(&tok, &d, &opts).unwrap();
        assert_eq!(m.status, Status::NoData);
        assert_eq!((m.rows, m.cols), (0, 3));
        assert!(m.data.is_empty());
    }

    #[test]
    fn test_footer_excluded() {
        let d = Dialect::default();
        let tok = tokenized(&d, false, "1,2\n3,4\ntotal,6\n");
        let opts = MaterializeOptions { skip_footer: true, ..MaterializeOptions::default() };
        let m: Materialized<i64> = materialize(&tok, &d, &opts).unwrap();
        assert_eq!(m.rows, 2);
        assert_eq!(m.data, vec![1, 2, 3, 4]);

        let tok = tokenized(&d, false, "1,2\n");
        let m: Materialized<i64> = materialize(&tok, &d, &opts).unwrap();
        assert_eq!(m.status, Status::NoData);
    }

    #[test]
    fn test_missing_data_sentinels() {
        let d = Dialect::default();
        let tok = tokenized(&d, false, "1,x\n,4\n");
        let err = materialize::<i64>(&tok, &d, &MaterializeOptions::default()).unwrap_err();
        assert!(err.to_string().starts_with("Unable to parse entry on line 1 entry 1"), "{err}");

        let opts = MaterializeOptions { warn_for_missing_data: true, ..MaterializeOptions::default() };
        let m: Materialized<i64> = materialize(&tok, &d, &opts).unwrap();
        assert_eq!(m.status, Status::MissingData);
        assert_eq!(m.data, vec![1, i64::MAX, i64::MAX, 4]);
        assert_eq!(m.warnings, vec!["Missing data on line 1, entry 1", "Missing data on line 2, entry 0"]);

        let m: Materialized<f64> = materialize(&tok, &d, &opts).unwrap();
        assert!(m.data[1].is_nan());
    }

    #[test]
    fn test_overflow_is_reported_with_position() {
        let d = Dialect::default();
        let tok = tokenized(&d, false, "1\n99999999999999999999\n");
        let err = materialize::<i64>(&tok, &d, &MaterializeOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Overflow);
        assert!(err.to_string().contains("line 2 entry 0"));
    }

    #[test]
    fn test_projection() {
        let d = Dialect::default();
        let mut tok = Tokenizer::new(&d).with_column_subset(true).with_header_rows(1);
        tok.tokenize_all_rows(&mut SliceSource::new(b"a,b,c\n1,2,3\n4,5,6,7\n")).unwrap();
        let columns = [2, 0];
        let opts = MaterializeOptions { first_line: 1, columns: Some(&columns), ..MaterializeOptions::default() };
        let m: Materialized<i64> = materialize(&tok, &d, &opts).unwrap();
        assert_eq!((m.rows, m.cols), (2, 2));
        assert_eq!(m.data, vec![3, 1, 6, 4]);
        assert_eq!(headings(&tok, &d, 2, Some(&columns)).unwrap(), vec!["c", "a"]);

        let far = [5];
        let opts = MaterializeOptions { first_line: 1, columns: Some(&far), ..MaterializeOptions::default() };
        let err = materialize::<i64>(&tok, &d, &opts).unwrap_err();
        assert!(matches!(err, Error::Ragged { line: 2, fields: 3, expected: 6 }));
    }

    #[test]
    fn test_ragged_lines_rejected() {
        // the column subset switch disables padding, leaving ragged lines in place
        let d = Dialect::default();
        let mut tok = Tokenizer::new(&d).with_column_subset(true);
        tok.tokenize_all_rows(&mut SliceSource::new(b"1,2\n3\n")).unwrap();
        let err = materialize::<i64>(&tok, &d, &MaterializeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Ragged { line: 1, .. } | Error::Ragged { line: 2, .. }));
    }
}
