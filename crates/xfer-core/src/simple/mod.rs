//! Simple Upload transfer.
//!
//! A bare handshake: 'R' → 'A', 4-byte LE size → 'B', then 64-byte chunks
//! each acknowledged by a rotating letter, and a single CRC32 exchange at the
//! end. There is no retransmission.

mod upload;

use thiserror::Error;

use crate::memory::MemoryError;
use crate::protocol::constants::*;
use crate::transport::TransportError;

pub use upload::SimpleUpload;

#[derive(Error, Debug)]
pub enum SimpleError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("No data within {timeout_ms}ms")]
    Timeout { timeout_ms: u32 },

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Invalid transfer size {size} (capacity {capacity})")]
    Size { size: u32, capacity: u32 },

    #[error("Expected 0x{expected:02X} in CRC exchange, got 0x{found:02X}")]
    CrcProtocol { expected: u8, found: u8 },

    #[error("CRC32 mismatch: local 0x{local:08X}, remote 0x{remote:08X}")]
    CrcMismatch { local: u32, remote: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimpleOptions {
    /// Wait for the ready command (receiver) or its acknowledgement (sender).
    pub ready_timeout_ms: u32,
    /// Wait for every other byte.
    pub byte_timeout_ms: u32,
}

impl Default for SimpleOptions {
    fn default() -> Self {
        Self {
            ready_timeout_ms: SIMPLE_READY_TIMEOUT_MS,
            byte_timeout_ms: SIMPLE_TIMEOUT_MS,
        }
    }
}

/// Acknowledgement letters: 'A', 'B', 'C', ... 'Z', then back to 'A'.
///
/// One sequence spans the whole transfer and is never reset, so the ready,
/// size, chunk and final acknowledgements all draw from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckSequence {
    next: u8,
}

impl AckSequence {
    pub fn new() -> Self {
        Self {
            next: SIMPLE_FIRST_ACK,
        }
    }

    /// Take the current letter and move on.
    pub fn advance(&mut self) -> u8 {
        let current = self.next;
        self.next = if current >= b'Z' { b'A' } else { current + 1 };
        current
    }
}

impl Default for AckSequence {
    fn default() -> Self {
        Self::new()
    }
}
