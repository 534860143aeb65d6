//! CSV readers for numframe
//!
//! This crate turns delimited text into dense typed matrices and loads them
//! into a [`DataStore`](numframe_core::DataStore). Input is pulled in chunks
//! from a [`ByteSource`], split by a configurable tokenizer and converted
//! field by field with exact numeric semantics.

mod error;
pub mod csv;
pub mod source;

pub use csv::{read_csv, CsvData, CsvOptions, CsvReader, CsvStoreExt, Dialect};
pub use error::{Error, Result};
pub use source::{open_path, ByteSource, MmapSource, ReadStatus, ReaderSource, SliceSource};

// Re-export core types
pub use numframe_core::{DataStore, ErrorKind, Order, Status};
