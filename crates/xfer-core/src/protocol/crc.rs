//! Checksums used on the wire.
//!
//! - CRC16-CCITT (poly 0x1021, seed 0, MSB first) for XMODEM blocks.
//! - CRC32 (reflected, poly 0xEDB88320) for Simple Upload, table built at
//!   compile time.
//! - Two's-complement byte sum for Intel HEX records.

const CRC32_POLY: u32 = 0xEDB8_8320;

/// Seed for a running CRC32.
pub const CRC32_INIT: u32 = 0xFFFF_FFFF;

static CRC32_TABLE: [u32; 256] = build_crc32_table();

const fn build_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC32_POLY
            } else {
                crc >> 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Feed one byte into a running (not yet finalized) CRC32.
#[inline]
pub fn crc32_update(crc: u32, byte: u8) -> u32 {
    (crc >> 8) ^ CRC32_TABLE[((crc ^ byte as u32) & 0xFF) as usize]
}

/// Finalize a running CRC32.
#[inline]
pub fn crc32_finalize(crc: u32) -> u32 {
    !crc
}

/// CRC32 of a whole buffer.
pub fn crc32(data: &[u8]) -> u32 {
    crc32_finalize(data.iter().fold(CRC32_INIT, |crc, &b| crc32_update(crc, b)))
}

/// CRC16-CCITT as used by XMODEM-CRC.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Intel HEX checksum: two's complement of the byte sum.
pub fn ihex_checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
        .wrapping_neg()
}
