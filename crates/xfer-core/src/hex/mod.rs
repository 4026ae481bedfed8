//! Intel HEX transfer.
//!
//! Line-oriented ASCII records, each with a two's-complement checksum. There
//! is no retransmission: the first bad record aborts the transfer.

pub mod codec;
pub mod record;

pub use codec::{HexCodec, HexOptions};
pub use record::{HexError, HexRecord, RecordType};
