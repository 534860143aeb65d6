//! Per-column type detection for `auto` loads
//!
//! Every column starts out as integers. Each cell is parsed along a
//! preference chain and the column either keeps its type, widens from
//! integers to floating point, or falls back to strings for good.

use numframe_core::ScalarType;
use tracing::debug;

use super::convert::FromField;
use super::options::{Dialect, Precision};

/// A detected column
#[derive(Debug, Clone, PartialEq)]
pub enum TypedColumn<'a> {
    /// 64-bit integers
    Int(Vec<i64>),
    /// 32-bit floats
    Float(Vec<f32>),
    /// 64-bit floats
    Double(Vec<f64>),
    /// Booleans as 0/1
    Bool(Vec<u8>),
    /// Raw text borrowed from the string matrix
    Str(Vec<&'a str>),
}

impl TypedColumn<'_> {
    /// Element type of the column
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            TypedColumn::Int(_) => ScalarType::Int,
            TypedColumn::Float(_) => ScalarType::Float,
            TypedColumn::Double(_) => ScalarType::Double,
            TypedColumn::Bool(_) => ScalarType::Bool,
            TypedColumn::Str(_) => ScalarType::Str,
        }
    }

    /// Number of values
    pub fn len(&self) -> usize {
        match self {
            TypedColumn::Int(v) => v.len(),
            TypedColumn::Float(v) => v.len(),
            TypedColumn::Double(v) => v.len(),
            TypedColumn::Bool(v) => v.len(),
            TypedColumn::Str(v) => v.len(),
        }
    }

    /// Whether the column holds no values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Preferences steering the parse chain
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectOptions {
    /// Skip integers and parse integer text as floating point
    pub integers_as_fp: bool,

    /// Width of floating point columns
    pub precision: Precision,
}

#[derive(Debug, Clone, Copy)]
enum Value {
    Int(i64),
    Float(f32),
    Double(f64),
    Bool(u8),
}

fn parse(raw: &str, dialect: &Dialect, opts: DetectOptions) -> Option<Value> {
    let bytes = raw.as_bytes();
    if !opts.integers_as_fp {
        if let Ok(c) = i64::from_field(bytes, dialect) {
            return Some(Value::Int(c.value));
        }
    }
    let float = match opts.precision {
        Precision::Double => f64::from_field(bytes, dialect).ok().map(|c| Value::Double(c.value)),
        Precision::Single => f32::from_field(bytes, dialect).ok().map(|c| Value::Float(c.value)),
    };
    float.or_else(|| u8::from_field(bytes, dialect).ok().map(|c| Value::Bool(c.value)))
}

fn cell(cells: &[String], cols: usize, row: usize, col: usize) -> &str {
    cells[row * cols + col].as_str()
}

/// Detect the type of every column of a row-major string matrix
///
/// `Str` columns borrow from `cells`.
#[allow(clippy::cast_precision_loss)]
pub fn detect<'a>(
    cells: &'a [String],
    rows: usize,
    cols: usize,
    dialect: &Dialect,
    opts: DetectOptions,
) -> Vec<TypedColumn<'a>> {
    let mut columns: Vec<TypedColumn<'a>> =
        (0..cols).map(|_| TypedColumn::Int(Vec::with_capacity(rows))).collect();

    for (col, column) in columns.iter_mut().enumerate() {
        for row in 0..rows {
            let raw = cell(cells, cols, row, col);
            if let TypedColumn::Str(values) = column {
                values.push(raw);
                continue;
            }
            let value = parse(raw, dialect, opts);
            let widened = match (std::mem::replace(column, TypedColumn::Int(Vec::new())), value) {
                (TypedColumn::Int(mut v), Some(Value::Int(x))) => {
                    v.push(x);
                    Some(TypedColumn::Int(v))
                }
                (TypedColumn::Int(v), Some(Value::Double(x))) => {
                    let mut w: Vec<f64> = v.into_iter().map(|i| i as f64).collect();
                    w.push(x);
                    Some(TypedColumn::Double(w))
                }
                (TypedColumn::Int(v), Some(Value::Float(x))) => {
                    let mut w: Vec<f32> = v.into_iter().map(|i| i as f32).collect();
                    w.push(x);
                    Some(TypedColumn::Float(w))
                }
                (TypedColumn::Int(v), Some(Value::Bool(b))) if v.is_empty() => {
                    Some(TypedColumn::Bool(vec![b]))
                }
                (TypedColumn::Double(mut v), Some(Value::Double(x))) => {
                    v.push(x);
                    Some(TypedColumn::Double(v))
                }
                (TypedColumn::Double(mut v), Some(Value::Int(x))) => {
                    v.push(x as f64);
                    Some(TypedColumn::Double(v))
                }
                (TypedColumn::Float(mut v), Some(Value::Float(x))) => {
                    v.push(x);
                    Some(TypedColumn::Float(v))
                }
                (TypedColumn::Float(mut v), Some(Value::Int(x))) => {
                    v.push(x as f32);
                    Some(TypedColumn::Float(v))
                }
                (TypedColumn::Bool(mut v), Some(Value::Bool(b))) => {
                    v.push(b);
                    Some(TypedColumn::Bool(v))
                }
                _ => None,
            };
            *column = widened.unwrap_or_else(|| {
                debug!(column = col, row, "column falls back to strings");
                TypedColumn::Str((0..=row).map(|r| cell(cells, cols, r, col)).collect())
            });
        }
    }
    columns
}
