//! Protocol module - wire constants and checksums.

pub mod constants;
pub mod crc;

pub use constants::*;
pub use crc::{crc16_ccitt, crc32, crc32_finalize, crc32_update, ihex_checksum};
