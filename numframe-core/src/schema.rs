//! Scalar kinds stored in a table and the layout of a block

use std::fmt;

use serde::{Deserialize, Serialize};

/// Element type of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    /// 64-bit signed integer
    Int,
    /// 32-bit floating point
    Float,
    /// 64-bit floating point
    Double,
    /// Boolean stored as one byte (0, 1, or the missing sentinel)
    Bool,
    /// Owned UTF-8 string
    Str,
}

impl ScalarType {
    /// Whether the type has an in-band missing-value sentinel
    pub fn has_sentinel(self) -> bool {
        !matches!(self, ScalarType::Str)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Int => "integer",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
            ScalarType::Bool => "boolean",
            ScalarType::Str => "string",
        };
        f.write_str(name)
    }
}

/// Storage order of a dense rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Order {
    /// Consecutive elements of a row are adjacent
    #[default]
    RowMajor,
    /// Consecutive elements of a column are adjacent
    ColumnMajor,
}

impl Order {
    /// Offset of `(row, col)` in a dense `rows x cols` rectangle
    #[inline]
    pub fn offset(self, row: usize, col: usize, rows: usize, cols: usize) -> usize {
        match self {
            Order::RowMajor => row * cols + col,
            Order::ColumnMajor => col * rows + row,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_offset() {
        // 2 x 3 rectangle
        assert_eq!(Order::RowMajor.offset(1, 2, 2, 3), 5);
        assert_eq!(Order::ColumnMajor.offset(1, 2, 2, 3), 5);
        assert_eq!(Order::RowMajor.offset(1, 0, 2, 3), 3);
        assert_eq!(Order::ColumnMajor.offset(1, 0, 2, 3), 1);
    }

    #[test]
    fn test_sentinels() {
        assert!(ScalarType::Double.has_sentinel());
        assert!(!ScalarType::Str.has_sentinel());
    }
}
