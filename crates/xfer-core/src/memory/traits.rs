//! Destination/source store abstraction.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Access of {len} bytes at 0x{address:08X} is outside the region")]
    OutOfBounds { address: u32, len: usize },

    #[error("Write of {len} bytes at 0x{address:08X} would stretch the image past {limit} bytes")]
    SpanExceeded { address: u32, len: usize, limit: u32 },
}

/// Store the engines write received data into and read outgoing data from.
///
/// Addresses are absolute for Intel HEX and stream offsets (from 0) for
/// XMODEM and Simple Upload.
pub trait Memory {
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), MemoryError>;

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError>;

    /// Bytes the destination can hold.
    fn capacity(&self) -> u32;
}

impl<M: Memory + ?Sized> Memory for &mut M {
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), MemoryError> {
        (**self).write(address, data)
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        (**self).read(address, buf)
    }

    fn capacity(&self) -> u32 {
        (**self).capacity()
    }
}
