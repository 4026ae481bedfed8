//! Byte-level link abstraction.
//!
//! Defines the `ByteChannel` trait the protocol engines are driven by,
//! allowing different implementations (serial port, stream, mock, pipe).

use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open port {port}: {message}")]
    OpenFailed { port: String, message: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Link disconnected")]
    Disconnected,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Blocking byte link handed to a protocol engine for one transfer.
///
/// Timeouts are the source's responsibility: `get_byte` must return
/// `Ok(None)` once `timeout_ms` elapses without data.
pub trait ByteChannel {
    /// Read one byte, waiting at most `timeout_ms`.
    fn get_byte(&mut self, timeout_ms: u32) -> Result<Option<u8>, TransportError>;

    /// Write one byte.
    fn put_byte(&mut self, byte: u8) -> Result<(), TransportError>;

    /// Write a run of bytes.
    fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        for &b in bytes {
            self.put_byte(b)?;
        }
        Ok(())
    }

    /// Push buffered output onto the wire.
    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

impl<T: ByteChannel + ?Sized> ByteChannel for &mut T {
    fn get_byte(&mut self, timeout_ms: u32) -> Result<Option<u8>, TransportError> {
        (**self).get_byte(timeout_ms)
    }

    fn put_byte(&mut self, byte: u8) -> Result<(), TransportError> {
        (**self).put_byte(byte)
    }

    fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).put_bytes(bytes)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        (**self).flush()
    }
}

/// Millisecond clock handed to the XMODEM engine.
///
/// Only used for reporting; all protocol timing goes through `get_byte`.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

/// Wall clock measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        self.origin.elapsed().as_millis() as u32
    }
}
