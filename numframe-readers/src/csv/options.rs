//! CSV dialect and reader options
//!
//! [`Dialect`] carries everything the tokenizer and the field converters
//! need. [`CsvOptions`] wraps a dialect with the settings that shape the
//! materialized result. Both are plain serde values; [`CsvOptions::set`] and
//! [`CsvOptions::get`] expose them through string names and values.

use std::collections::BTreeSet;

use numframe_core::Order;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How quote characters are interpreted while reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quoting {
    /// Quote characters open and close quoted fields
    #[default]
    Minimal,
    /// Same as `Minimal` when reading
    All,
    /// Same as `Minimal` when reading
    NonNumeric,
    /// The quote character is ordinary data
    None,
}

/// What to do with a line holding more fields than expected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BadLinePolicy {
    /// Abort the read
    #[default]
    Error,
    /// Drop the line and record a warning
    Warn,
    /// Drop the line silently
    Skip,
}

/// Width of floating point values produced by the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Precision {
    /// 32-bit floats
    Single,
    /// 64-bit floats
    #[default]
    Double,
}

/// Element type requested when loading a CSV file into a data store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CsvDataType {
    /// 64-bit integers
    Int,
    /// 32-bit floats
    Float,
    /// 64-bit floats
    #[default]
    Double,
    /// Booleans
    Bool,
    /// Strings
    Str,
    /// Detect a type per column
    Auto,
}

/// Byte-level dialect of a CSV input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dialect {
    /// Field separator
    pub delimiter: u8,

    /// Treat any run of blanks as a single separator
    pub delim_whitespace: bool,

    /// Quote character
    pub quote_char: u8,

    /// Quoting style
    pub quoting: Quoting,

    /// A doubled quote inside a quoted field is a literal quote
    pub double_quote: bool,

    /// Escape character
    pub escape_char: Option<u8>,

    /// Custom line terminator; `None` accepts `\n`, `\r\n` and `\r`
    pub line_terminator: Option<u8>,

    /// Comment character
    pub comment_char: Option<u8>,

    /// Decimal point
    pub decimal: u8,

    /// Exponent marker, matched case-insensitively
    pub sci: u8,

    /// Thousands separator
    pub thousands: Option<u8>,

    /// Ignore spaces following a delimiter
    pub skip_initial_space: bool,

    /// Allow trailing blanks after a number
    pub skip_trailing_space: bool,

    /// Blank lines are not committed
    pub skip_empty_lines: bool,

    /// 0-based physical lines to skip
    pub skip_rows: BTreeSet<u64>,

    /// Skip the first `n` physical lines
    pub skip_first_rows: u64,

    /// Required field count of data lines; inferred from the previous line when unset
    pub expected_fields: Option<usize>,

    /// Policy for lines with too many fields
    pub on_bad_lines: BadLinePolicy,

    /// Smallest accepted signed integer
    pub int_min: i64,

    /// Largest accepted signed integer
    pub int_max: i64,

    /// Largest accepted unsigned integer
    pub uint_max: u64,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            delim_whitespace: false,
            quote_char: b'"',
            quoting: Quoting::Minimal,
            double_quote: true,
            escape_char: None,
            line_terminator: None,
            comment_char: Some(b'#'),
            decimal: b'.',
            sci: b'e',
            thousands: None,
            skip_initial_space: false,
            skip_trailing_space: true,
            skip_empty_lines: false,
            skip_rows: BTreeSet::new(),
            skip_first_rows: 0,
            expected_fields: None,
            on_bad_lines: BadLinePolicy::Error,
            int_min: i64::MIN,
            int_max: i64::MAX,
            uint_max: u64::MAX,
        }
    }
}

impl Dialect {
    /// Reject character assignments the tokenizer cannot disambiguate
    pub fn validate(&self) -> Result<()> {
        let quote = (self.quoting != Quoting::None).then_some(self.quote_char);
        if !self.delim_whitespace {
            let clash = [
                ("quote character", quote),
                ("line terminator", self.line_terminator),
                ("comment character", self.comment_char),
                ("escape character", self.escape_char),
            ]
            .into_iter()
            .find(|(_, c)| *c == Some(self.delimiter));
            if let Some((name, _)) = clash {
                return Err(Error::InvalidOption(format!("delimiter and {name} are the same")));
            }
        }
        if self.thousands == Some(self.decimal) {
            return Err(Error::InvalidOption(
                "decimal point and thousands separator are the same".into(),
            ));
        }
        if self.decimal.is_ascii_digit() || self.thousands.is_some_and(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidOption("numeric separators cannot be digits".into()));
        }
        if self.int_min > 0 || self.int_max < 0 {
            return Err(Error::InvalidOption(format!(
                "integer bounds [{}, {}] must contain zero",
                self.int_min, self.int_max
            )));
        }
        Ok(())
    }

    /// Whether physical line `line` is excluded by the skip settings
    #[inline]
    pub fn skips_line(&self, line: u64) -> bool {
        line < self.skip_first_rows || self.skip_rows.contains(&line)
    }
}

/// Options of a CSV read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    /// Tokenizer and converter dialect
    pub dialect: Dialect,

    /// Use the first good line as column headings
    pub header: bool,

    /// Drop the last good line
    pub skip_footer: bool,

    /// Replace unparsable entries with the missing-value sentinel
    pub warn_for_missing_data: bool,

    /// Element type when loading into a data store
    pub datatype: CsvDataType,

    /// Parse integer-looking columns as floating point during detection
    pub integers_as_fp: bool,

    /// Width of floating point columns produced by detection
    pub precision: Precision,

    /// Storage order of the materialized matrix
    pub order: Order,

    /// Only materialize these 0-based columns
    pub columns: Option<Vec<usize>>,

    /// Bytes requested from the source per read
    pub chunk_size: usize,

    /// Memory map input files instead of streaming them
    pub use_memory_mapping: bool,
}

/// Default number of bytes pulled from a source per read
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            header: false,
            skip_footer: false,
            warn_for_missing_data: false,
            datatype: CsvDataType::Double,
            integers_as_fp: false,
            precision: Precision::Double,
            order: Order::RowMajor,
            columns: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            use_memory_mapping: false,
        }
    }
}

impl CsvOptions {
    /// The dialect used for tokenizing and converting
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Validate the options as a whole
    pub fn validate(&self) -> Result<()> {
        self.dialect.validate()?;
        if self.chunk_size == 0 {
            return Err(Error::InvalidOption("chunk size must be positive".into()));
        }
        if let Some(columns) = &self.columns {
            if columns.is_empty() {
                return Err(Error::InvalidOption("column projection is empty".into()));
            }
            let unique: BTreeSet<_> = columns.iter().collect();
            if unique.len() != columns.len() {
                return Err(Error::InvalidOption("column projection repeats a column".into()));
            }
        }
        Ok(())
    }

    /// Set an option from its registry name and a string value
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let d = &mut self.dialect;
        match name {
            "delimiter" => d.delimiter = parse_char(name, value)?,
            "thousands" => d.thousands = parse_opt_char(name, value)?,
            "decimal" => d.decimal = parse_char(name, value)?,
            "comment" => d.comment_char = parse_opt_char(name, value)?,
            "quote character" => d.quote_char = parse_char(name, value)?,
            "escape character" => d.escape_char = parse_opt_char(name, value)?,
            "line terminator" => d.line_terminator = parse_opt_char(name, value)?,
            "scientific notation character" => {
                d.sci = parse_char(name, value)?.to_ascii_lowercase();
            }
            "quoting" => {
                d.quoting = match value {
                    "minimal" => Quoting::Minimal,
                    "all" => Quoting::All,
                    "nonnumeric" => Quoting::NonNumeric,
                    "none" => Quoting::None,
                    _ => return Err(bad_value(name, value)),
                }
            }
            "skip rows" => d.skip_rows = parse_row_list(value)?,
            "double quote" => d.double_quote = parse_flag(name, value)?,
            "whitespace delimiter" => d.delim_whitespace = parse_flag(name, value)?,
            "skip first rows" => d.skip_first_rows = parse_number(name, value)?,
            "skip empty lines" => d.skip_empty_lines = parse_flag(name, value)?,
            "skip initial space" => d.skip_initial_space = parse_flag(name, value)?,
            "skip trailing space" => d.skip_trailing_space = parse_flag(name, value)?,
            "expected fields" => {
                d.expected_fields = if value.is_empty() {
                    None
                } else {
                    Some(parse_number(name, value)?)
                }
            }
            "bad lines" => {
                d.on_bad_lines = match value {
                    "error" => BadLinePolicy::Error,
                    "warn" => BadLinePolicy::Warn,
                    "skip" => BadLinePolicy::Skip,
                    _ => return Err(bad_value(name, value)),
                }
            }
            "skip footer" => self.skip_footer = parse_flag(name, value)?,
            "warn for missing data" => self.warn_for_missing_data = parse_flag(name, value)?,
            "use header row" => self.header = parse_flag(name, value)?,
            "integers as floats" => self.integers_as_fp = parse_flag(name, value)?,
            "use memory mapping" => self.use_memory_mapping = parse_flag(name, value)?,
            "chunk size" => self.chunk_size = parse_number(name, value)?,
            "datatype" => {
                self.datatype = match value {
                    "integer" => CsvDataType::Int,
                    "float" => CsvDataType::Float,
                    "double" => CsvDataType::Double,
                    "boolean" => CsvDataType::Bool,
                    "char" | "string" => CsvDataType::Str,
                    "auto" => CsvDataType::Auto,
                    _ => return Err(bad_value(name, value)),
                }
            }
            "datastore precision" => {
                self.precision = match value {
                    "single" | "float" => Precision::Single,
                    "double" => Precision::Double,
                    _ => return Err(bad_value(name, value)),
                }
            }
            "storage order" => {
                self.order = match value {
                    "row major" => Order::RowMajor,
                    "column major" => Order::ColumnMajor,
                    _ => return Err(bad_value(name, value)),
                }
            }
            _ => return Err(Error::InvalidOption(format!("unknown option '{name}'"))),
        }
        Ok(())
    }

    /// Read an option back as a string, in the format [`CsvOptions::set`] accepts
    pub fn get(&self, name: &str) -> Result<String> {
        let d = &self.dialect;
        let value = match name {
            "delimiter" => char_string(d.delimiter),
            "thousands" => opt_char_string(d.thousands),
            "decimal" => char_string(d.decimal),
            "comment" => opt_char_string(d.comment_char),
            "quote character" => char_string(d.quote_char),
            "escape character" => opt_char_string(d.escape_char),
            "line terminator" => opt_char_string(d.line_terminator),
            "scientific notation character" => char_string(d.sci),
            "quoting" => match d.quoting {
                Quoting::Minimal => "minimal",
                Quoting::All => "all",
                Quoting::NonNumeric => "nonnumeric",
                Quoting::None => "none",
            }
            .to_string(),
            "skip rows" => d
                .skip_rows
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(","),
            "double quote" => flag_string(d.double_quote),
            "whitespace delimiter" => flag_string(d.delim_whitespace),
            "skip first rows" => d.skip_first_rows.to_string(),
            "skip empty lines" => flag_string(d.skip_empty_lines),
            "skip initial space" => flag_string(d.skip_initial_space),
            "skip trailing space" => flag_string(d.skip_trailing_space),
            "expected fields" => d.expected_fields.map(|n| n.to_string()).unwrap_or_default(),
            "bad lines" => match d.on_bad_lines {
                BadLinePolicy::Error => "error",
                BadLinePolicy::Warn => "warn",
                BadLinePolicy::Skip => "skip",
            }
            .to_string(),
            "skip footer" => flag_string(self.skip_footer),
            "warn for missing data" => flag_string(self.warn_for_missing_data),
            "use header row" => flag_string(self.header),
            "integers as floats" => flag_string(self.integers_as_fp),
            "use memory mapping" => flag_string(self.use_memory_mapping),
            "chunk size" => self.chunk_size.to_string(),
            "datatype" => match self.datatype {
                CsvDataType::Int => "integer",
                CsvDataType::Float => "float",
                CsvDataType::Double => "double",
                CsvDataType::Bool => "boolean",
                CsvDataType::Str => "char",
                CsvDataType::Auto => "auto",
            }
            .to_string(),
            "datastore precision" => match self.precision {
                Precision::Single => "single",
                Precision::Double => "double",
            }
            .to_string(),
            "storage order" => match self.order {
                Order::RowMajor => "row major",
                Order::ColumnMajor => "column major",
            }
            .to_string(),
            _ => return Err(Error::InvalidOption(format!("unknown option '{name}'"))),
        };
        Ok(value)
    }
}

fn bad_value(name: &str, value: &str) -> Error {
    Error::InvalidOption(format!("'{value}' is not a valid value for '{name}'"))
}

fn parse_char(name: &str, value: &str) -> Result<u8> {
    parse_opt_char(name, value)?.ok_or_else(|| bad_value(name, value))
}

/// An empty value clears the character; `\t`, `\n` and `\r` are accepted as escapes
fn parse_opt_char(name: &str, value: &str) -> Result<Option<u8>> {
    match value.as_bytes() {
        [] => Ok(None),
        [b'\\', b't'] => Ok(Some(b'\t')),
        [b'\\', b'n'] => Ok(Some(b'\n')),
        [b'\\', b'r'] => Ok(Some(b'\r')),
        [c] if c.is_ascii() => Ok(Some(*c)),
        _ => Err(bad_value(name, value)),
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(bad_value(name, value)),
    }
}

fn parse_number<N: std::str::FromStr>(name: &str, value: &str) -> Result<N> {
    value.trim().parse().map_err(|_| bad_value(name, value))
}

fn parse_row_list(value: &str) -> Result<BTreeSet<u64>> {
    value
        .split([',', ' '])
        .filter(|s| !s.is_empty())
        .map(|s| parse_number("skip rows", s))
        .collect()
}

fn char_string(c: u8) -> String {
    match c {
        b'\t' => "\\t".into(),
        b'\n' => "\\n".into(),
        b'\r' => "\\r".into(),
        _ => char::from(c).to_string(),
    }
}

fn opt_char_string(c: Option<u8>) -> String {
    c.map(char_string).unwrap_or_default()
}

fn flag_string(flag: bool) -> String {
    let s = if flag { "1" } else { "0" };
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_defaults() {
        let options = CsvOptions::default();
        let d = options.dialect();
        assert_eq!(d.delimiter, b',');
        assert_eq!(d.quote_char, b'"');
        assert!(d.double_quote);
        assert_eq!(d.comment_char, Some(b'#'));
        assert_eq!(d.sci, b'e');
        assert!(d.skip_trailing_space);
        assert_eq!(d.on_bad_lines, BadLinePolicy::Error);
        assert_eq!(options.chunk_size, 256 * 1024);
        assert_eq!(options.order, Order::RowMajor);
        options.validate().unwrap();
    }

    #[test_case("delimiter", ";")]
    #[test_case("delimiter", "\\t")]
    #[test_case("thousands", ",")]
    #[test_case("thousands", "")]
    #[test_case("skip rows", "1,4,7")]
    #[test_case("skip first rows", "3")]
    #[test_case("double quote", "0")]
    #[test_case("bad lines", "warn")]
    #[test_case("datatype", "auto")]
    #[test_case("storage order", "column major")]
    #[test_case("expected fields", "5")]
    fn test_set_get_round_trip(name: &str, value: &str) {
        let mut options = CsvOptions::default();
        options.set(name, value).unwrap();
        assert_eq!(options.get(name).unwrap(), value);
    }

    #[test]
    fn test_skip_row_list_accepts_spaces() {
        let mut options = CsvOptions::default();
        options.set("skip rows", "2 5, 9").unwrap();
        assert_eq!(options.dialect.skip_rows, BTreeSet::from([2, 5, 9]));
        assert!(options.dialect.skips_line(5));
        assert!(!options.dialect.skips_line(3));
    }

    #[test]
    fn test_skip_first_rows_and_set_combine() {
        let mut d = Dialect { skip_first_rows: 2, ..Dialect::default() };
        d.skip_rows.insert(6);
        assert!(d.skips_line(0));
        assert!(d.skips_line(1));
        assert!(!d.skips_line(2));
        assert!(d.skips_line(6));
    }

    #[test_case("delimiter", "")]
    #[test_case("delimiter", ";;")]
    #[test_case("double quote", "yes")]
    #[test_case("skip first rows", "-1")]
    #[test_case("no such option", "1")]
    fn test_set_rejects(name: &str, value: &str) {
        let mut options = CsvOptions::default();
        let err = options.set(name, value).unwrap_err();
        assert_eq!(err.kind(), numframe_core::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_validate_clashes() {
        let mut options = CsvOptions::default();
        options.set("quote character", ",").unwrap();
        assert!(options.validate().is_err());

        // without quoting the quote character is irrelevant
        options.set("quoting", "none").unwrap();
        options.validate().unwrap();

        let mut options = CsvOptions::default();
        options.set("thousands", ".").unwrap();
        assert!(options.validate().is_err());

        let options = CsvOptions { columns: Some(vec![1, 1]), ..CsvOptions::default() };
        assert!(options.validate().is_err());
    }

    #[test_case(-10, 100, true ; "around zero")]
    #[test_case(0, 0, true ; "zero only")]
    #[test_case(5, 100, false ; "positive minimum")]
    #[test_case(-100, -5, false ; "negative maximum")]
    #[test_case(10, -10, false ; "inverted")]
    fn test_integer_bounds_must_contain_zero(int_min: i64, int_max: i64, valid: bool) {
        let dialect = Dialect { int_min, int_max, ..Dialect::default() };
        assert_eq!(dialect.validate().is_ok(), valid);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut options = CsvOptions::default();
        options.set("delimiter", ";").unwrap();
        options.set("skip rows", "3").unwrap();
        let json = serde_json::to_string(&options).unwrap();
        let back: CsvOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);

        // missing fields fall back to defaults
        let partial: CsvOptions = serde_json::from_str(r#"{"header": true}"#).unwrap();
        assert!(partial.header);
        assert_eq!(partial.dialect.delimiter, b',');
    }
}
