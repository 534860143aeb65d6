//! Dense, single-typed rectangular blocks
//!
//! A [`Block`] is the unit of storage inside a [`DataStore`](crate::DataStore):
//! a fully rectangular chunk of one [`ScalarType`], stored row-major or
//! column-major. The element type is a closed set, so the enum is matched
//! exhaustively instead of dispatching through trait objects.

use std::fmt;

use crate::buffer::{BlockInput, Ownership, Storage};
use crate::error::{Error, Result};
use crate::interval::Interval;
use crate::schema::{Order, ScalarType};

mod sealed {
    pub trait Sealed {}
}

/// A value type that can live in a table block
pub trait Element: Clone + Default + fmt::Debug + Send + Sync + sealed::Sealed + 'static {
    /// Scalar kind of blocks holding this type
    const SCALAR: ScalarType;

    /// Whether the value is the type's missing-value sentinel
    fn is_missing(&self) -> bool;

    /// Typed view of a block, if it holds this type
    fn as_dense(block: &Block) -> Option<&DenseBlock<Self>>;

    /// Mutable typed view of a block, if it holds this type
    fn as_dense_mut(block: &mut Block) -> Option<&mut DenseBlock<Self>>;

    /// Erase the element type of a dense block
    fn into_block(dense: DenseBlock<Self>) -> Block;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident, |$v:ident| $missing:expr) => {
        impl sealed::Sealed for $ty {}

        impl Element for $ty {
            const SCALAR: ScalarType = ScalarType::$variant;

            fn is_missing(&self) -> bool {
                let $v = self;
                $missing
            }

            fn as_dense(block: &Block) -> Option<&DenseBlock<Self>> {
                match block {
                    Block::$variant(dense) => Some(dense),
                    _ => None,
                }
            }

            fn as_dense_mut(block: &mut Block) -> Option<&mut DenseBlock<Self>> {
                match block {
                    Block::$variant(dense) => Some(dense),
                    _ => None,
                }
            }

            fn into_block(dense: DenseBlock<Self>) -> Block {
                Block::$variant(dense)
            }
        }
    };
}

impl_element!(i64, Int, |v| *v == i64::MAX);
impl_element!(f32, Float, |v| v.is_nan());
impl_element!(f64, Double, |v| v.is_nan());
impl_element!(u8, Bool, |v| *v == u8::MAX);
impl_element!(String, Str, |_v| false);

/// A dense `rows x cols` rectangle of one element type
#[derive(Debug)]
pub struct DenseBlock<T> {
    /// Number of rows
    rows: usize,

    /// Number of columns
    cols: usize,

    /// Storage order of the elements
    order: Order,

    /// The elements
    storage: Storage<T>,

    /// Where the elements came from
    ownership: Ownership,
}

impl<T: Element> DenseBlock<T> {
    /// Create a block over caller data; dimensions must be positive
    pub fn new(rows: usize, cols: usize, order: Order, input: BlockInput<'_, T>) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidArgument(format!(
                "block dimensions must be positive, got {rows} x {cols}"
            )));
        }
        let len = rows
            .checked_mul(cols)
            .ok_or_else(|| Error::Overflow(format!("block of {rows} x {cols} elements")))?;
        let (storage, ownership) = Storage::from_input(input, len)?;
        Ok(Self {
            rows,
            cols,
            order,
            storage,
            ownership,
        })
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Ownership of the storage
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    fn check_cell(&self, row: usize, col: usize) -> Result<usize> {
        if row >= self.rows {
            return Err(Error::IndexOutOfBounds {
                index: row,
                dimension: "rows",
                len: self.rows,
            });
        }
        if col >= self.cols {
            return Err(Error::IndexOutOfBounds {
                index: col,
                dimension: "columns",
                len: self.cols,
            });
        }
        Ok(self.order.offset(row, col, self.rows, self.cols))
    }

    fn check_rect(&self, rows: Interval, cols: Interval) -> Result<()> {
        if !rows.fits(self.rows) {
            return Err(Error::IndexOutOfBounds {
                index: rows.upper(),
                dimension: "rows",
                len: self.rows,
            });
        }
        if !cols.fits(self.cols) {
            return Err(Error::IndexOutOfBounds {
                index: cols.upper(),
                dimension: "columns",
                len: self.cols,
            });
        }
        Ok(())
    }

    /// Read one element
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        let offset = self.check_cell(row, col)?;
        self.storage.read(|data| data[offset].clone())
    }

    /// Overwrite one element
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        let offset = self.check_cell(row, col)?;
        self.storage.write(|data| data[offset] = value)
    }

    /// Copy the rectangle `rows x cols` (block coordinates) column-major into
    /// `out`, starting at `start` with leading dimension `ld`
    pub fn copy_rect(
        &self,
        rows: Interval,
        cols: Interval,
        ld: usize,
        out: &mut [T],
        start: usize,
    ) -> Result<()> {
        self.check_rect(rows, cols)?;
        if ld < rows.len() {
            return Err(Error::InvalidArgument(format!(
                "leading dimension {ld} is smaller than the {} rows copied",
                rows.len()
            )));
        }
        let last = start + (cols.len() - 1) * ld + rows.len();
        if last > out.len() {
            return Err(Error::InvalidArgument(format!(
                "output buffer holds {} elements, {last} needed",
                out.len()
            )));
        }
        let (nrows, ncols, order) = (self.rows, self.cols, self.order);
        self.storage.read(|data| {
            for (k, col) in (cols.lower()..=cols.upper()).enumerate() {
                let dst = &mut out[start + k * ld..start + k * ld + rows.len()];
                if order == Order::ColumnMajor {
                    let src = order.offset(rows.lower(), col, nrows, ncols);
                    dst.clone_from_slice(&data[src..src + rows.len()]);
                } else {
                    for (slot, row) in dst.iter_mut().zip(rows.lower()..=rows.upper()) {
                        *slot = data[order.offset(row, col, nrows, ncols)].clone();
                    }
                }
            }
        })
    }

    /// Clear `valid[i]` for every row `rows.lower() + i` holding a missing
    /// sentinel in any of `cols`
    pub fn missing_rows(&self, valid: &mut [bool], rows: Interval, cols: Interval) -> Result<()> {
        self.check_rect(rows, cols)?;
        if valid.len() < rows.len() {
            return Err(Error::InvalidArgument(format!(
                "validity mask holds {} rows, {} needed",
                valid.len(),
                rows.len()
            )));
        }
        if !T::SCALAR.has_sentinel() {
            return Ok(());
        }
        let (nrows, ncols, order) = (self.rows, self.cols, self.order);
        self.storage.read(|data| {
            for col in cols.lower()..=cols.upper() {
                for (i, row) in (rows.lower()..=rows.upper()).enumerate() {
                    if data[order.offset(row, col, nrows, ncols)].is_missing() {
                        valid[i] = false;
                    }
                }
            }
        })
    }
}

/// A block of any supported element type
#[derive(Debug)]
pub enum Block {
    /// 64-bit integers
    Int(DenseBlock<i64>),
    /// Single precision floats
    Float(DenseBlock<f32>),
    /// Double precision floats
    Double(DenseBlock<f64>),
    /// Booleans as bytes
    Bool(DenseBlock<u8>),
    /// Strings
    Str(DenseBlock<String>),
}

macro_rules! dispatch {
    ($block:expr, |$dense:ident| $body:expr) => {
        match $block {
            Block::Int($dense) => $body,
            Block::Float($dense) => $body,
            Block::Double($dense) => $body,
            Block::Bool($dense) => $body,
            Block::Str($dense) => $body,
        }
    };
}

impl Block {
    /// Create a block of element type `T`
    pub fn new<T: Element>(
        rows: usize,
        cols: usize,
        order: Order,
        input: BlockInput<'_, T>,
    ) -> Result<Self> {
        Ok(T::into_block(DenseBlock::new(rows, cols, order, input)?))
    }

    /// Element type
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Block::Int(_) => ScalarType::Int,
            Block::Float(_) => ScalarType::Float,
            Block::Double(_) => ScalarType::Double,
            Block::Bool(_) => ScalarType::Bool,
            Block::Str(_) => ScalarType::Str,
        }
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        dispatch!(self, |d| d.rows())
    }

    /// Ownership of the storage
    pub fn ownership(&self) -> Ownership {
        dispatch!(self, |d| d.ownership())
    }

    /// Typed view, or a type-mismatch error naming both types
    pub fn typed<T: Element>(&self) -> Result<&DenseBlock<T>> {
        T::as_dense(self).ok_or_else(|| self.mismatch::<T>())
    }

    /// Mutable typed view, or a type-mismatch error naming both types
    pub fn typed_mut<T: Element>(&mut self) -> Result<&mut DenseBlock<T>> {
        let found = self.scalar_type();
        T::as_dense_mut(self).ok_or_else(|| {
            Error::TypeMismatch(format!("block holds {found}, requested {}", T::SCALAR))
        })
    }

    fn mismatch<T: Element>(&self) -> Error {
        Error::TypeMismatch(format!(
            "block holds {}, requested {}",
            self.scalar_type(),
            T::SCALAR
        ))
    }

    /// Clear validity bits of rows holding missing sentinels; see
    /// [`DenseBlock::missing_rows`]
    pub fn missing_rows(&self, valid: &mut [bool], rows: Interval, cols: Interval) -> Result<()> {
        dispatch!(self, |d| d.missing_rows(valid, rows, cols))
    }
}
