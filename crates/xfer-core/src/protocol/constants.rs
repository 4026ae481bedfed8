//! Wire constants for the three transfer protocols.

// ============================================================================
// Intel HEX
// ============================================================================

/// Record start sentinel.
pub const IHEX_START: u8 = b':';

/// Control-C, aborts a hex receive while hunting for a record.
pub const IHEX_CANCEL: u8 = 0x03;

/// Data record.
pub const IHEX_TYPE_DATA: u8 = 0x00;
/// End of file record.
pub const IHEX_TYPE_EOF: u8 = 0x01;
/// Extended linear address record (upper 16 bits of a 32-bit address).
pub const IHEX_TYPE_EXT_LINEAR_ADDR: u8 = 0x04;

/// Data bytes per emitted line.
pub const IHEX_BYTES_PER_LINE: usize = 16;

/// Largest data field a record can carry.
pub const IHEX_MAX_DATA: usize = 255;

/// Shortest legal line: `:LLAAAATTCC`.
pub const IHEX_MIN_LINE_LEN: usize = 11;

/// Longest legal line (255 data bytes), excluding the terminator.
pub const IHEX_MAX_LINE_LEN: usize = IHEX_MIN_LINE_LEN + 2 * IHEX_MAX_DATA;

/// Fixed end of file record.
pub const IHEX_EOF_RECORD: &[u8] = b":00000001FF";

// ============================================================================
// XMODEM-1K
// ============================================================================

/// Start of 128-byte block
pub const SOH: u8 = 0x01;
/// Start of 1024-byte block
pub const STX: u8 = 0x02;
/// End of transmission
pub const EOT: u8 = 0x04;
/// Acknowledge
pub const ACK: u8 = 0x06;
/// Negative acknowledge
pub const NAK: u8 = 0x15;
/// Cancel (Ctrl-X)
pub const CAN: u8 = 0x18;
/// CRC mode request
pub const CRC_REQUEST: u8 = b'C';
/// Ctrl-Z padding for short final blocks
pub const PAD: u8 = 0x1A;

pub const XMODEM_BLOCK_SIZE: usize = 1024;
pub const XMODEM_SHORT_BLOCK_SIZE: usize = 128;

/// header + block# + ~block# + 1024 data + CRC-H + CRC-L
pub const XMODEM_PACKET_SIZE: usize = XMODEM_BLOCK_SIZE + 5;

/// Retransmissions allowed per block before giving up.
pub const XMODEM_MAX_RETRIES: u8 = 10;

/// CRC requests sent by the receiver before it gives up on the sender.
pub const XMODEM_INIT_ATTEMPTS: u32 = 10;

/// One-second polls the sender spends waiting for a CRC request.
pub const XMODEM_SENDER_POLLS: u32 = 60;

/// Timeout used while draining stale input.
pub const XMODEM_FLUSH_TIMEOUT_MS: u32 = 10;

// Firmware-side defaults (ms)
pub const XMODEM_TIMEOUT_INIT_MS: u32 = 1_800_000;
pub const XMODEM_TIMEOUT_BLOCK_MS: u32 = 1_800_000;
pub const XMODEM_TIMEOUT_CHAR_MS: u32 = 1_000;
pub const XMODEM_SENDER_POLL_MS: u32 = 1_000;

// ============================================================================
// Simple Upload
// ============================================================================

/// Payload chunk acknowledged by one rotating letter.
pub const SIMPLE_CHUNK_SIZE: usize = 64;

/// Host ready to send.
pub const SIMPLE_CMD_READY: u8 = b'R';
/// CRC check command, sent after the payload.
pub const SIMPLE_CMD_CRC: u8 = b'C';
/// Control-C while waiting for the ready byte.
pub const SIMPLE_CANCEL: u8 = 0x03;

/// First letter of the acknowledgement rotation.
pub const SIMPLE_FIRST_ACK: u8 = b'A';

/// Default per-byte timeout (matches the host uploader).
pub const SIMPLE_TIMEOUT_MS: u32 = 2_000;
/// Default wait for the ready byte.
pub const SIMPLE_READY_TIMEOUT_MS: u32 = 60_000;
