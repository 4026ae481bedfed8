//! XMODEM-1K transfer.
//!
//! 1024-byte (STX) blocks with CRC16, numbered modulo 256. The receiver also
//! accepts 128-byte (SOH) blocks; the sender only emits STX blocks, padding
//! the final one with `PAD`.
//!
//! Both directions are explicit state machines driven by a single dispatch
//! loop (see `receiver.rs` and `sender.rs`).

mod receiver;
mod sender;

use thiserror::Error;

use crate::memory::MemoryError;
use crate::protocol::constants::*;
use crate::transport::{ByteChannel, Clock, SystemClock, TransportError};

pub use receiver::RxState;
pub use sender::TxState;

#[derive(Error, Debug)]
pub enum XmodemError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("Timed out waiting for the other side")]
    Timeout,

    #[error("Transfer cancelled by the other side")]
    Cancelled,

    #[error("Block CRC check failed too many times")]
    Crc,

    #[error("Lost block synchronization")]
    Sync,

    #[error("Too many errors")]
    TooManyErrors,

    #[error("Block at offset {offset} ({size} bytes) exceeds capacity of {capacity} bytes")]
    Overflow {
        offset: u32,
        size: usize,
        capacity: u32,
    },
}

/// Timeouts for one transfer. The retry budget is fixed at
/// `XMODEM_MAX_RETRIES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XmodemOptions {
    /// Wait after each CRC request during start-up.
    pub init_timeout_ms: u32,
    /// Wait for the next block header, or for the response to a block.
    pub block_timeout_ms: u32,
    /// Wait between characters inside a block.
    pub char_timeout_ms: u32,
    /// Sender poll interval while waiting for the CRC request.
    pub sender_poll_ms: u32,
}

impl Default for XmodemOptions {
    fn default() -> Self {
        Self {
            init_timeout_ms: XMODEM_TIMEOUT_INIT_MS / XMODEM_INIT_ATTEMPTS,
            block_timeout_ms: XMODEM_TIMEOUT_BLOCK_MS,
            char_timeout_ms: XMODEM_TIMEOUT_CHAR_MS,
            sender_poll_ms: XMODEM_SENDER_POLL_MS,
        }
    }
}

/// XMODEM-1K engine. Holds configuration and the clock only; every call
/// starts from a fresh transfer context.
#[derive(Debug, Clone)]
pub struct Xmodem<K: Clock = SystemClock> {
    options: XmodemOptions,
    clock: K,
}

impl Xmodem<SystemClock> {
    pub fn new(options: XmodemOptions) -> Self {
        Self::with_clock(options, SystemClock::new())
    }
}

impl Default for Xmodem<SystemClock> {
    fn default() -> Self {
        Self::new(XmodemOptions::default())
    }
}

impl<K: Clock> Xmodem<K> {
    pub fn with_clock(options: XmodemOptions, clock: K) -> Self {
        Self { options, clock }
    }

    fn elapsed_since(&self, start_ms: u32) -> u32 {
        self.clock.now_ms().wrapping_sub(start_ms)
    }
}

/// Drain stale input.
fn flush_input<C: ByteChannel>(io: &mut C) -> Result<usize, TransportError> {
    let mut drained = 0;
    while io.get_byte(XMODEM_FLUSH_TIMEOUT_MS)?.is_some() {
        drained += 1;
    }
    Ok(drained)
}

/// Payload size implied by a block header.
fn block_size(header: u8) -> usize {
    if header == STX {
        XMODEM_BLOCK_SIZE
    } else {
        XMODEM_SHORT_BLOCK_SIZE
    }
}

/// Strip the trailing `PAD` bytes the receiver keeps from the last block.
pub fn trim_padding(data: &[u8]) -> &[u8] {
    let end = data.iter().rposition(|&b| b != PAD).map_or(0, |i| i + 1);
    &data[..end]
}
