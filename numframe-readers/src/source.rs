//! Byte sources feeding the tokenizer
//!
//! The tokenizer pulls its input in bounded chunks through [`ByteSource`].
//! Files can be streamed with buffered reads or memory mapped; in-memory
//! inputs go through [`SliceSource`].

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use tracing::debug;

use crate::error::{Error, Result};

/// Outcome of a single chunk request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// Bytes were appended to the buffer
    More,

    /// The source is exhausted and nothing was appended
    Eof,
}

/// A pull-based producer of raw input bytes
#[cfg_attr(test, mockall::automock)]
pub trait ByteSource {
    /// Append at most `max_bytes` bytes to `buf`
    fn read(&mut self, buf: &mut Vec<u8>, max_bytes: usize) -> io::Result<ReadStatus>;
}

/// Streams bytes from any [`Read`] implementation
#[derive(Debug)]
pub struct ReaderSource<R> {
    inner: R,
}

impl<R: Read> ReaderSource<R> {
    /// Wrap a reader
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn read(&mut self, buf: &mut Vec<u8>, max_bytes: usize) -> io::Result<ReadStatus> {
        let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
        let n = self.inner.by_ref().take(limit).read_to_end(buf)?;
        Ok(if n == 0 { ReadStatus::Eof } else { ReadStatus::More })
    }
}

/// Serves bytes from a borrowed slice
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    /// Create a source over `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl ByteSource for SliceSource<'_> {
    fn read(&mut self, buf: &mut Vec<u8>, max_bytes: usize) -> io::Result<ReadStatus> {
        let rest = &self.data[self.pos..];
        if rest.is_empty() {
            return Ok(ReadStatus::Eof);
        }
        let n = rest.len().min(max_bytes);
        buf.extend_from_slice(&rest[..n]);
        self.pos += n;
        Ok(ReadStatus::More)
    }
}

/// Serves bytes from a read-only memory map of a file
#[derive(Debug)]
pub struct MmapSource {
    mmap: Option<Mmap>,
    pos: usize,
    path: PathBuf,
}

impl MmapSource {
    /// Map `path` into memory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_existing(&path)?;
        let len = file.metadata()?.len();
        // Mapping a zero-length file fails on some platforms.
        let mmap = if len == 0 {
            None
        } else {
            // SAFETY: the map is read-only and never outlives this source.
            // Concurrent truncation of the file by another process is not
            // guarded against.
            #[allow(unsafe_code)]
            let mmap = unsafe { MmapOptions::new().map(&file)? };
            Some(mmap)
        };
        debug!(path = %path.display(), bytes = len, "memory mapped csv input");
        Ok(Self { mmap, pos: 0, path })
    }

    /// Path of the mapped file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for MmapSource {
    fn read(&mut self, buf: &mut Vec<u8>, max_bytes: usize) -> io::Result<ReadStatus> {
        let data: &[u8] = self.mmap.as_deref().unwrap_or(&[]);
        let rest = &data[self.pos.min(data.len())..];
        if rest.is_empty() {
            return Ok(ReadStatus::Eof);
        }
        let n = rest.len().min(max_bytes);
        buf.extend_from_slice(&rest[..n]);
        self.pos += n;
        Ok(ReadStatus::More)
    }
}

fn open_existing(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| Error::FileNotFound {
        path: path.to_path_buf(),
        source,
    })
}

/// Open a file as a byte source, memory mapped or buffered
pub fn open_path<P: AsRef<Path>>(path: P, use_memory_mapping: bool) -> Result<Box<dyn ByteSource>> {
    let path = path.as_ref();
    if use_memory_mapping {
        return Ok(Box::new(MmapSource::open(path)?));
    }
    let file = open_existing(path)?;
    debug!(path = %path.display(), "opened csv input");
    Ok(Box::new(ReaderSource::new(BufReader::new(file))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn drain(source: &mut dyn ByteSource, chunk: usize) -> (Vec<u8>, usize) {
        let mut out = Vec::new();
        let mut calls = 0;
        loop {
            let before = out.len();
            let status = source.read(&mut out, chunk).unwrap();
            calls += 1;
            if status == ReadStatus::Eof {
                assert_eq!(out.len(), before);
                return (out, calls);
            }
            assert!(out.len() - before <= chunk);
        }
    }

    #[test]
    fn test_slice_source_chunks() {
        let mut source = SliceSource::new(b"abcdefg");
        let (bytes, calls) = drain(&mut source, 3);
        assert_eq!(bytes, b"abcdefg");
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_reader_source_chunks() {
        let mut source = ReaderSource::new(Cursor::new(b"0123456789".to_vec()));
        let (bytes, _) = drain(&mut source, 4);
        assert_eq!(bytes, b"0123456789");
    }

    #[test]
    fn test_mmap_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"a,b\n1,2\n").unwrap();
        let mut source = MmapSource::open(file.path()).unwrap();
        assert_eq!(source.path(), file.path());
        let (bytes, _) = drain(&mut source, 3);
        assert_eq!(bytes, b"a,b\n1,2\n");
    }

    #[test]
    fn test_mmap_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut source = MmapSource::open(file.path()).unwrap();
        let mut buf = Vec::new();
        assert_eq!(source.read(&mut buf, 16).unwrap(), ReadStatus::Eof);
    }

    #[test]
    fn test_missing_file() {
        for mmap in [false, true] {
            let err = open_path("/definitely/not/here.csv", mmap).err().unwrap();
            assert_eq!(err.kind(), numframe_core::ErrorKind::FileNotFound);
        }
    }
}
