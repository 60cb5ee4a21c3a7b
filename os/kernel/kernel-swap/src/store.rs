//! The swap file as seen by the swap engine.

use alloc::vec::Vec;
use core::ops::Range;
use kernel_sync::SpinLock;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IoError {
    #[error("{len} bytes at offset {offset:#x} are past the end of the store ({size:#x} bytes)")]
    OutOfBounds { offset: u64, len: usize, size: u64 },
    #[error("short transfer of {done} out of {expected} bytes")]
    ShortTransfer { done: usize, expected: usize },
    #[error("the storage device reported an error")]
    Device,
}

/// A fixed-size, byte-addressable file opened once for the lifetime of the
/// swap subsystem.
///
/// Calls block until the transfer completes; the engine never holds any of
/// its structural locks across them.
pub trait BackingStore: Sync {
    /// Size of the store in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads into `buf` from `offset`, returning the number of bytes read.
    ///
    /// # Errors
    /// Any device or bounds failure.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, IoError>;

    /// Writes `buf` at `offset`, returning the number of bytes written.
    ///
    /// # Errors
    /// Any device or bounds failure.
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize, IoError>;
}

impl<S: BackingStore + ?Sized> BackingStore for &S {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, IoError> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize, IoError> {
        (**self).write_at(offset, buf)
    }
}

/// A swap "file" held in kernel memory. Useful before a disk driver is up
/// and for testing.
#[derive(Debug)]
pub struct MemoryBackingStore {
    data: SpinLock<Vec<u8>>,
}

impl MemoryBackingStore {
    /// A zero-filled store of `size` bytes.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            data: SpinLock::named("memory swap store", alloc::vec![0; size]),
        }
    }
}

impl BackingStore for MemoryBackingStore {
    fn len(&self) -> u64 {
        self.data.with_lock(|d| d.len() as u64)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, IoError> {
        let data = self.data.lock();
        let range = checked_range(offset, buf.len(), data.len())?;
        buf.copy_from_slice(&data[range]);
        Ok(buf.len())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize, IoError> {
        let mut data = self.data.lock();
        let range = checked_range(offset, buf.len(), data.len())?;
        data[range].copy_from_slice(buf);
        Ok(buf.len())
    }
}

/// Byte range of a `len`-byte transfer at `offset` in a store of `size` bytes.
fn checked_range(offset: u64, len: usize, size: usize) -> Result<Range<usize>, IoError> {
    let out_of_bounds = IoError::OutOfBounds {
        offset,
        len,
        size: size as u64,
    };
    let start = usize::try_from(offset).map_err(|_| out_of_bounds)?;
    let end = start.checked_add(len).ok_or(out_of_bounds)?;
    if end > size {
        return Err(out_of_bounds);
    }
    Ok(start..end)
}
