//! Data sources for the copy pipeline.
//!
//! The pipeline pulls chunks from a `ChunkSource` without knowing where the
//! bytes come from: a real file, or the synthetic generator used by dry
//! runs to exercise the write, flush and verify path without reading any
//! source data.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::sys;

/// Something the pipeline can read a known number of bytes from.
pub trait ChunkSource {
    /// Total bytes this source will deliver.
    fn len(&self) -> u64;

    /// Fill the front of `buf` and return how many bytes were written.
    /// Returns 0 once the source is exhausted.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A regular file opened for one sequential pass.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    len: u64,
}

impl FileSource {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        sys::advise_sequential_once(&file);
        Ok(FileSource { file, len })
    }
}

impl ChunkSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.file.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }
}

/// Zero-filled data of a fixed length, produced at a throttled pace.
#[derive(Debug)]
pub struct SyntheticSource {
    len: u64,
    produced: u64,
    chunk_delay: Duration,
}

impl SyntheticSource {
    pub fn new(len: u64, chunk_delay: Duration) -> Self {
        SyntheticSource {
            len,
            produced: 0,
            chunk_delay,
        }
    }
}

impl ChunkSource for SyntheticSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len - self.produced;
        let n = remaining.min(buf.len() as u64) as usize;
        if n == 0 {
            return Ok(0);
        }
        buf[..n].fill(0);
        self.produced += n as u64;
        if !self.chunk_delay.is_zero() {
            thread::sleep(self.chunk_delay);
        }
        Ok(n)
    }
}
