//! Error types for the CSV readers

use std::path::PathBuf;

use numframe_core::ErrorKind;
use thiserror::Error;

use crate::csv::ConvertError;

/// Error type for the readers crate
#[derive(Error, Debug)]
pub enum Error {
    /// Error raised by the data store
    #[error("Core error: {0}")]
    Core(#[from] numframe_core::Error),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input file does not exist or cannot be opened
    #[error("File not found: {}", .path.display())]
    FileNotFound {
        /// Path that was requested
        path: PathBuf,

        /// Underlying open error
        #[source]
        source: std::io::Error,
    },

    /// The byte source reported a failure mid-stream
    #[error("Reading from the byte source failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    /// The tokenizer rejected the input
    #[error("Parsing error: {0}")]
    Tokenize(String),

    /// A data line has a different field count than the rest of the table
    #[error("Line {line} had an unexpected number of fields (fields {fields}, expected {expected})")]
    Ragged {
        /// 1-based line number in the input file
        line: u64,

        /// Fields found on that line
        fields: usize,

        /// Fields required
        expected: usize,
    },

    /// A single field could not be converted to the requested type
    #[error("Unable to parse entry on line {line} entry {entry}: {source}")]
    Field {
        /// 1-based line number in the input file
        line: u64,

        /// 0-based column of the entry
        entry: usize,

        /// Conversion failure
        #[source]
        source: ConvertError,
    },

    /// A count or size exceeded what the platform can represent
    #[error("Overflow: {0}")]
    Overflow(String),

    /// A buffer could not be grown
    #[error("Memory allocation failed: {0}")]
    Memory(String),

    /// An option name or value was rejected
    #[error("Invalid option: {0}")]
    InvalidOption(String),
}

impl Error {
    /// Classify the error into one of the shared error categories
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Core(e) => e.kind(),
            Error::Io(_) | Error::ReadFailed(_) => ErrorKind::Io,
            Error::FileNotFound { .. } => ErrorKind::FileNotFound,
            Error::Tokenize(_) | Error::Ragged { .. } => ErrorKind::Parsing,
            Error::Field { source, .. } => source.kind(),
            Error::Overflow(_) => ErrorKind::Overflow,
            Error::Memory(_) => ErrorKind::Memory,
            Error::InvalidOption(_) => ErrorKind::InvalidInput,
        }
    }
}

/// Result type for the readers crate
pub type Result<T> = std::result::Result<T, Error>;
