//! xfer-core: serial image transfer protocols in Rust.
//!
//! Three ways to move a firmware image over a byte-oriented serial link:
//!
//! - **Intel HEX**: line-oriented ASCII records, no retransmission
//! - **XMODEM-1K**: 1024-byte CRC16 blocks with ACK/NAK retransmission
//! - **Simple Upload**: 64-byte chunks and a single CRC32 check at the end
//!
//! # Architecture
//!
//! - **Protocol**: Constants and checksums shared by the engines
//! - **Transport**: Byte channel abstraction (serial port, streams, pipe, mock)
//! - **Memory**: Where received bytes land and sent bytes come from
//! - **Hex / Xmodem / Simple**: The protocol engines
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator with file and config handling
//!
//! The engines are synchronous and run to completion on the calling thread.
//! Every read goes through `ByteChannel::get_byte` with an explicit timeout.
//!
//! # Example
//!
//! ```no_run
//! use xfer_core::session::{Protocol, SessionConfig, TransferSession};
//!
//! let config = SessionConfig {
//!     port: Some("/dev/ttyUSB0".to_string()),
//!     protocol: Protocol::Xmodem,
//!     ..Default::default()
//! };
//!
//! let mut session = TransferSession::new(config);
//! session.send_file("firmware.bin").expect("transfer failed");
//! ```

pub mod events;
pub mod hex;
pub mod memory;
pub mod protocol;
pub mod session;
pub mod simple;
pub mod transport;
pub mod xmodem;

// Re-exports for convenience
pub use events::{
    Direction, LogLevel, NullObserver, TracingObserver, TransferEvent, TransferObserver,
    TransferPhase,
};
pub use crate::hex::{HexCodec, HexError, HexOptions, HexRecord};
pub use memory::{BufferMemory, Memory, MemoryError, SparseMemory};
pub use session::{Protocol, SessionConfig, TransferError, TransferSession};
pub use simple::{AckSequence, SimpleError, SimpleOptions, SimpleUpload};
pub use transport::{
    ByteChannel, Clock, MockChannel, PipeChannel, SerialChannel, StreamChannel, SystemClock,
    TransportError, list_ports,
};
pub use xmodem::{Xmodem, XmodemError, XmodemOptions, trim_padding};
