//! Core data structures for numframe
//!
//! This crate provides the heterogeneous, block-structured table that CSV
//! ingestion feeds into, together with the interval structures used to
//! describe row and column ranges and the error taxonomy shared by the
//! workspace.

#![warn(missing_docs)]

pub mod block;
pub mod buffer;
pub mod error;
pub mod interval;
pub mod schema;
pub mod store;

// Re-export key types for convenience
pub use block::{Block, DenseBlock, Element};
pub use buffer::{BlockInput, Ownership, SharedBuffer};
pub use error::{Error, ErrorKind, Result, Status};
pub use interval::{Interval, IntervalMap, IntervalSet};
pub use schema::{Order, ScalarType};
pub use store::{DataStore, Selection};

static_assertions::assert_impl_all!(DataStore: Send, Sync);
static_assertions::assert_impl_all!(SharedBuffer<f64>: Send, Sync, Clone);
