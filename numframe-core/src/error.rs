//! Error types for numframe tables

use std::fmt;

use thiserror::Error;

/// Result type for table operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad category of a failure, shared by every crate in the workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed field or line, ragged rows, unterminated quote or escape
    Parsing,
    /// Value outside the target integer range, or counts beyond platform limits
    Overflow,
    /// Allocation failure while growing a buffer
    Memory,
    /// Out-of-range indices, mismatched types or dimensions
    InvalidInput,
    /// Operation attempted while a row concatenation is still pending
    MissingBlock,
    /// A file could not be opened
    FileNotFound,
    /// Underlying I/O failure
    Io,
    /// Invariant violation
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Parsing => "parsing error",
            ErrorKind::Overflow => "overflow",
            ErrorKind::Memory => "memory error",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::MissingBlock => "missing block",
            ErrorKind::FileNotFound => "file not found",
            ErrorKind::Io => "I/O error",
            ErrorKind::Internal => "internal error",
        };
        f.write_str(name)
    }
}

/// Error type for table operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Index out of bounds
    #[error("Index {index} out of bounds for {dimension} of length {len}")]
    IndexOutOfBounds {
        /// Offending index
        index: usize,
        /// "rows" or "columns"
        dimension: &'static str,
        /// Current length of that dimension
        len: usize,
    },

    /// Dimensions disagree with the current table
    #[error("Dimension mismatch: expected {expected} rows, got {found}")]
    DimensionMismatch {
        /// Row count of the table
        expected: usize,
        /// Row count supplied by the caller
        found: usize,
    },

    /// Element type disagrees with the stored block
    #[error("Data type mismatch: {0}")]
    TypeMismatch(String),

    /// The table is waiting for the rest of a row block
    #[error("Missing block: rows were only partially added, columns {pending} onwards still need data")]
    MissingBlock {
        /// First column without data for the pending rows
        pending: usize,
    },

    /// Size computation overflowed
    #[error("Overflow: {0}")]
    Overflow(String),

    /// Memory allocation failed
    #[error("Memory allocation failed: {0}")]
    MemoryAllocationFailed(String),

    /// Broken internal invariant
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_)
            | Error::IndexOutOfBounds { .. }
            | Error::DimensionMismatch { .. }
            | Error::TypeMismatch(_) => ErrorKind::InvalidInput,
            Error::MissingBlock { .. } => ErrorKind::MissingBlock,
            Error::Overflow(_) => ErrorKind::Overflow,
            Error::MemoryAllocationFailed(_) => ErrorKind::Memory,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Outcome of an operation that succeeded, possibly with a soft warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Everything went as requested
    Success,
    /// Input was well formed but held no data
    NoData,
    /// Some fields could not be parsed and were replaced by missing-value sentinels
    MissingData,
    /// Some input lines were skipped or dropped
    BadLines,
    /// No selection was defined, so the whole table was extracted
    FullExtraction,
    /// The named selection does not exist; nothing was changed
    UnknownSelection,
}

impl Status {
    /// Whether this status carries a warning
    pub fn is_warning(self) -> bool {
        self != Status::Success
    }
}
