//! Aligned transfer buffer.
//!
//! One buffer is allocated per job and reused for every chunk of every file,
//! both for copying and for the verification pass. Its start address and
//! length are multiples of the direct I/O alignment so cache-bypassing reads
//! can land in it directly.
//!
//! The storage is a plain `Vec<u8>` over-allocated by one alignment unit;
//! the usable window starts at the first aligned address inside it.

use std::ops::{Deref, DerefMut};

use crate::error::EngineError;

pub struct AlignedBuffer {
    storage: Vec<u8>,
    offset: usize,
    len: usize,
    align: usize,
}

impl AlignedBuffer {
    /// Allocate a zeroed buffer of `size` bytes aligned to `align`.
    ///
    /// `size` is rounded up to a multiple of `align`.
    ///
    /// # Errors
    /// `EngineError::BufferAllocation` when `align` is not a power of two or
    /// the allocation fails.
    pub fn new(size: usize, align: usize) -> Result<Self, EngineError> {
        if !align.is_power_of_two() {
            return Err(EngineError::BufferAllocation { size });
        }
        let len = size
            .max(1)
            .div_ceil(align)
            .checked_mul(align)
            .ok_or(EngineError::BufferAllocation { size })?;
        let total = len
            .checked_add(align)
            .ok_or(EngineError::BufferAllocation { size })?;

        let mut storage = Vec::new();
        storage
            .try_reserve_exact(total)
            .map_err(|_| EngineError::BufferAllocation { size })?;
        storage.resize(total, 0);

        // The vector never grows again, so the offset stays valid
        let offset = storage.as_ptr().align_offset(align);
        if offset > align {
            return Err(EngineError::BufferAllocation { size });
        }

        Ok(AlignedBuffer {
            storage,
            offset,
            len,
            align,
        })
    }

    pub fn alignment(&self) -> usize {
        self.align
    }
}

impl Deref for AlignedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.storage[self.offset..self.offset + self.len]
    }
}

impl DerefMut for AlignedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.storage[self.offset..self.offset + self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_and_rounding() {
        let buffer = AlignedBuffer::new(10_000, 4096).expect("Failed to allocate buffer");
        assert_eq!(buffer.len(), 12_288);
        assert_eq!(buffer.as_ptr() as usize % 4096, 0);
        assert_eq!(buffer.alignment(), 4096);
        assert!(buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_writable() {
        let mut buffer = AlignedBuffer::new(4096, 4096).expect("Failed to allocate buffer");
        buffer[..3].copy_from_slice(b"abc");
        assert_eq!(&buffer[..3], b"abc");
        assert_eq!(buffer.as_mut_ptr() as usize % 4096, 0);
    }

    #[test]
    fn test_invalid_alignment_is_an_error() {
        let result = AlignedBuffer::new(4096, 3000);
        assert!(matches!(result, Err(EngineError::BufferAllocation { .. })));
        let result = AlignedBuffer::new(4096, 0);
        assert!(matches!(result, Err(EngineError::BufferAllocation { .. })));
    }

    #[test]
    fn test_moves_across_threads() {
        let mut buffer = AlignedBuffer::new(8192, 4096).expect("Failed to allocate buffer");
        buffer[0] = 7;
        let handle = std::thread::spawn(move || buffer[0]);
        assert_eq!(handle.join().expect("Thread panicked"), 7);
    }
}
