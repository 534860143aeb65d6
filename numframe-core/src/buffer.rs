//! Backing storage for table blocks and the ownership it carries
//!
//! A block either owns its elements or shares a buffer with the caller. The
//! ownership of every block is recorded explicitly as an [`Ownership`] so the
//! release strategy is visible without inspecting the storage.

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};

/// How a block came to hold its elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// Shares a caller buffer; the table never releases it
    Borrowed,
    /// Elements were copied into storage allocated by the table
    Copied,
    /// The caller handed its vector over to the table
    Adopted,
}

/// A buffer shared between a caller and a table
///
/// Writes made through the table (for example `set_element`) are visible to
/// every other holder of the same `SharedBuffer`.
pub struct SharedBuffer<T> {
    inner: Arc<RwLock<Vec<T>>>,
}

impl<T> Clone for SharedBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for SharedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("holders", &Arc::strong_count(&self.inner))
            .finish()
    }
}

impl<T> SharedBuffer<T> {
    /// Wrap a vector so it can be shared with a table
    pub fn new(data: Vec<T>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(data)),
        }
    }

    /// Number of elements
    pub fn len(&self) -> Result<usize> {
        self.read(<[T]>::len)
    }

    /// Whether the buffer holds no elements
    pub fn is_empty(&self) -> Result<bool> {
        self.read(<[T]>::is_empty)
    }

    /// Run `f` over the current contents
    pub fn read<R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R> {
        let guard = self
            .inner
            .read()
            .map_err(|_| Error::Internal("shared buffer lock poisoned".into()))?;
        Ok(f(&guard))
    }

    /// Run `f` over the contents with write access
    pub fn write<R>(&self, f: impl FnOnce(&mut [T]) -> R) -> Result<R> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| Error::Internal("shared buffer lock poisoned".into()))?;
        Ok(f(&mut guard))
    }

    /// Copy of the current contents
    pub fn to_vec(&self) -> Result<Vec<T>>
    where
        T: Clone,
    {
        self.read(<[T]>::to_vec)
    }
}

/// Caller data offered to a table when adding a block
#[derive(Debug)]
pub enum BlockInput<'a, T> {
    /// Copy the elements into table-owned storage
    Copy(&'a [T]),
    /// Take the vector over
    Adopt(Vec<T>),
    /// Share the caller's buffer without copying
    Borrow(SharedBuffer<T>),
}

/// Storage held by a block
#[derive(Debug)]
pub(crate) enum Storage<T> {
    Owned(Vec<T>),
    Shared(SharedBuffer<T>),
}

impl<T: Clone> Storage<T> {
    /// Build storage for `len` elements from caller input
    pub(crate) fn from_input(input: BlockInput<'_, T>, len: usize) -> Result<(Self, Ownership)> {
        match input {
            BlockInput::Copy(data) => {
                check_len(data.len(), len)?;
                let mut owned = Vec::new();
                owned.try_reserve_exact(len).map_err(|e| {
                    Error::MemoryAllocationFailed(format!("block of {len} elements: {e}"))
                })?;
                owned.extend_from_slice(&data[..len]);
                Ok((Storage::Owned(owned), Ownership::Copied))
            }
            BlockInput::Adopt(mut data) => {
                check_len(data.len(), len)?;
                data.truncate(len);
                Ok((Storage::Owned(data), Ownership::Adopted))
            }
            BlockInput::Borrow(shared) => {
                check_len(shared.len()?, len)?;
                Ok((Storage::Shared(shared), Ownership::Borrowed))
            }
        }
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R> {
        match self {
            Storage::Owned(data) => Ok(f(data)),
            Storage::Shared(shared) => shared.read(f),
        }
    }

    pub(crate) fn write<R>(&mut self, f: impl FnOnce(&mut [T]) -> R) -> Result<R> {
        match self {
            Storage::Owned(data) => Ok(f(data)),
            Storage::Shared(shared) => shared.write(f),
        }
    }
}

fn check_len(found: usize, needed: usize) -> Result<()> {
    if found < needed {
        return Err(Error::InvalidArgument(format!(
            "buffer holds {found} elements, block needs {needed}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_input_is_independent() {
        let data = vec![1i64, 2, 3, 4];
        let (storage, ownership) = Storage::from_input(BlockInput::Copy(&data), 4).unwrap();
        assert_eq!(ownership, Ownership::Copied);
        assert_eq!(storage.read(<[i64]>::to_vec).unwrap(), data);
    }

    #[test]
    fn test_borrowed_input_shares_writes() {
        let shared = SharedBuffer::new(vec![1.0f64, 2.0]);
        let (mut storage, ownership) =
            Storage::from_input(BlockInput::Borrow(shared.clone()), 2).unwrap();
        assert_eq!(ownership, Ownership::Borrowed);
        storage.write(|s| s[1] = 7.5).unwrap();
        assert_eq!(shared.to_vec().unwrap(), vec![1.0, 7.5]);
    }

    #[test]
    fn test_short_input_rejected() {
        let err = Storage::from_input(BlockInput::Adopt(vec![1u8, 2]), 3).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
