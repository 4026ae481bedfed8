//! Intel HEX record parsing and rendering.

use std::fmt;

use ::hex::FromHexError;
use thiserror::Error;

use crate::memory::MemoryError;
use crate::protocol::constants::*;
use crate::protocol::crc::ihex_checksum;
use crate::transport::{ByteChannel, TransportError};

#[derive(Error, Debug)]
pub enum HexError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("No data within {timeout_ms}ms")]
    Timeout { timeout_ms: u32 },

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Record does not start with ':'")]
    InvalidStart,

    #[error("Invalid record length: {len} characters")]
    InvalidLength { len: usize },

    #[error("Invalid hex digit {found:?} at column {column}")]
    InvalidHex { column: usize, found: char },

    #[error("Checksum mismatch: computed 0x{computed:02X}, record has 0x{found:02X}")]
    Checksum { computed: u8, found: u8 },

    #[error("Unsupported record type 0x{0:02X}")]
    UnsupportedRecord(u8),

    #[error("Extended linear address record with {count} data bytes (expected 2)")]
    BadExtendedAddress { count: u8 },
}

/// Record type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Data,
    EndOfFile,
    ExtendedLinearAddress,
    Unsupported(u8),
}

impl RecordType {
    pub fn code(self) -> u8 {
        match self {
            RecordType::Data => IHEX_TYPE_DATA,
            RecordType::EndOfFile => IHEX_TYPE_EOF,
            RecordType::ExtendedLinearAddress => IHEX_TYPE_EXT_LINEAR_ADDR,
            RecordType::Unsupported(code) => code,
        }
    }
}

impl From<u8> for RecordType {
    fn from(code: u8) -> Self {
        match code {
            IHEX_TYPE_DATA => RecordType::Data,
            IHEX_TYPE_EOF => RecordType::EndOfFile,
            IHEX_TYPE_EXT_LINEAR_ADDR => RecordType::ExtendedLinearAddress,
            other => RecordType::Unsupported(other),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::Data => write!(f, "DATA"),
            RecordType::EndOfFile => write!(f, "EOF"),
            RecordType::ExtendedLinearAddress => write!(f, "EXT_LINEAR_ADDR"),
            RecordType::Unsupported(code) => write!(f, "UNSUPPORTED({:02X})", code),
        }
    }
}

/// One Intel HEX line, held in a fixed-capacity buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct HexRecord {
    address: u16,
    kind: RecordType,
    len: u8,
    data: [u8; IHEX_MAX_DATA],
    checksum: u8,
}

impl HexRecord {
    /// Build a record and compute its checksum.
    pub fn new(kind: RecordType, address: u16, data: &[u8]) -> Result<Self, HexError> {
        if data.len() > IHEX_MAX_DATA {
            return Err(HexError::InvalidLength {
                len: IHEX_MIN_LINE_LEN + 2 * data.len(),
            });
        }
        let mut record = Self {
            address,
            kind,
            len: data.len() as u8,
            data: [0; IHEX_MAX_DATA],
            checksum: 0,
        };
        record.data[..data.len()].copy_from_slice(data);
        record.checksum = record.compute_checksum();
        Ok(record)
    }

    /// Data record at a 16-bit offset.
    pub fn data_record(address: u16, data: &[u8]) -> Result<Self, HexError> {
        Self::new(RecordType::Data, address, data)
    }

    /// Extended linear address record for the upper half of `base`.
    pub fn extended_linear_address(base: u32) -> Self {
        let upper = ((base >> 16) as u16).to_be_bytes();
        let mut record = Self {
            address: 0,
            kind: RecordType::ExtendedLinearAddress,
            len: 2,
            data: [0; IHEX_MAX_DATA],
            checksum: 0,
        };
        record.data[..2].copy_from_slice(&upper);
        record.checksum = record.compute_checksum();
        record
    }

    /// Parse one line (starting with ':', terminator already stripped).
    pub fn parse(line: &[u8]) -> Result<Self, HexError> {
        if line.len() < IHEX_MIN_LINE_LEN {
            return Err(HexError::InvalidLength { len: line.len() });
        }
        if line[0] != IHEX_START {
            return Err(HexError::InvalidStart);
        }

        // count, address hi/lo, type
        let mut header = [0u8; 4];
        decode_pairs(line, 1, &mut header)?;
        let [count, addr_hi, addr_lo, kind] = header;

        let expected = IHEX_MIN_LINE_LEN + 2 * count as usize;
        if line.len() != expected {
            return Err(HexError::InvalidLength { len: line.len() });
        }

        let mut record = Self {
            address: u16::from_be_bytes([addr_hi, addr_lo]),
            kind: RecordType::from(kind),
            len: count,
            data: [0; IHEX_MAX_DATA],
            checksum: 0,
        };
        decode_pairs(line, 9, &mut record.data[..count as usize])?;

        let mut found = [0u8; 1];
        decode_pairs(line, 9 + 2 * count as usize, &mut found)?;
        record.checksum = found[0];

        let computed = record.compute_checksum();
        if computed != record.checksum {
            return Err(HexError::Checksum {
                computed,
                found: record.checksum,
            });
        }

        Ok(record)
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn kind(&self) -> RecordType {
        self.kind
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// Overwrite the stored checksum without recomputing it.
    pub fn with_checksum(mut self, checksum: u8) -> Self {
        self.checksum = checksum;
        self
    }

    fn compute_checksum(&self) -> u8 {
        let [hi, lo] = self.address.to_be_bytes();
        let header = [self.len, hi, lo, self.kind.code()];
        ihex_checksum(&header).wrapping_add(ihex_checksum(self.data()))
    }

    /// Render into `out` without the line terminator, returning the length.
    pub fn encode_into(&self, out: &mut [u8; IHEX_MAX_LINE_LEN]) -> usize {
        let [hi, lo] = self.address.to_be_bytes();
        out[0] = IHEX_START;
        let mut pos = 1;
        for &b in [self.len, hi, lo, self.kind.code()]
            .iter()
            .chain(self.data())
            .chain(std::iter::once(&self.checksum))
        {
            out[pos] = HEX_DIGITS[(b >> 4) as usize];
            out[pos + 1] = HEX_DIGITS[(b & 0x0F) as usize];
            pos += 2;
        }
        pos
    }

    /// Render as a `String` (no terminator).
    pub fn encode(&self) -> String {
        let mut line = [0u8; IHEX_MAX_LINE_LEN];
        let len = self.encode_into(&mut line);
        String::from_utf8_lossy(&line[..len]).into_owned()
    }

    /// Emit the record followed by CR LF.
    pub fn write_to<C: ByteChannel>(&self, io: &mut C) -> Result<(), TransportError> {
        let mut line = [0u8; IHEX_MAX_LINE_LEN];
        let len = self.encode_into(&mut line);
        io.put_bytes(&line[..len])?;
        io.put_bytes(b"\r\n")
    }
}

impl fmt::Debug for HexRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HexRecord({} {})", self.kind, self.encode())
    }
}

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Decode `out.len()` hex pairs from `line` starting at column `start`.
fn decode_pairs(line: &[u8], start: usize, out: &mut [u8]) -> Result<(), HexError> {
    let src = &line[start..start + 2 * out.len()];
    ::hex::decode_to_slice(src, out).map_err(|e| match e {
        FromHexError::InvalidHexCharacter { c, index } => HexError::InvalidHex {
            column: start + index,
            found: c,
        },
        _ => HexError::InvalidLength { len: line.len() },
    })
}
