//! Intel HEX stream receive/send.

use tracing::{debug, info, instrument, trace};

use super::record::{HexError, HexRecord, RecordType};
use crate::memory::Memory;
use crate::protocol::constants::*;
use crate::transport::ByteChannel;

/// Tunables for a hex transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexOptions {
    /// Wait per character before the transfer is abandoned.
    pub byte_timeout_ms: u32,
}

impl Default for HexOptions {
    fn default() -> Self {
        Self {
            byte_timeout_ms: 60_000,
        }
    }
}

/// Intel HEX codec. Holds configuration only; each call is independent.
#[derive(Debug, Clone, Copy, Default)]
pub struct HexCodec {
    options: HexOptions,
}

impl HexCodec {
    pub fn new(options: HexOptions) -> Self {
        Self { options }
    }

    /// Receive records until an EOF record, writing data through `mem`.
    ///
    /// Returns the number of data bytes written.
    #[instrument(level = "debug", skip_all)]
    pub fn receive<C, M>(&self, io: &mut C, mem: &mut M) -> Result<u32, HexError>
    where
        C: ByteChannel,
        M: Memory,
    {
        let mut line = [0u8; IHEX_MAX_LINE_LEN];
        let mut base_address: u32 = 0;
        let mut written: u32 = 0;
        let mut records: u32 = 0;

        loop {
            let len = self.read_line(io, &mut line)?;
            let record = HexRecord::parse(&line[..len])?;
            records += 1;
            trace!(record = ?record, "Record received");

            match record.kind() {
                RecordType::Data => {
                    let data = record.data();
                    if !data.is_empty() {
                        let address = base_address | u32::from(record.address());
                        mem.write(address, data)?;
                        written += data.len() as u32;
                    }
                }
                RecordType::EndOfFile => {
                    info!(records, bytes = written, "Hex receive complete");
                    return Ok(written);
                }
                RecordType::ExtendedLinearAddress => {
                    let data = record.data();
                    if data.len() != 2 {
                        return Err(HexError::BadExtendedAddress {
                            count: data.len() as u8,
                        });
                    }
                    base_address = (u32::from(data[0]) << 24) | (u32::from(data[1]) << 16);
                    debug!(base = %format!("0x{:08X}", base_address), "Extended linear address");
                }
                RecordType::Unsupported(code) => {
                    return Err(HexError::UnsupportedRecord(code));
                }
            }
        }
    }

    /// Hunt for ':' and collect the line up to CR/LF or the buffer bound.
    ///
    /// A line long enough to be a record also ends where the input goes
    /// quiet, so a file without a final newline still reaches its EOF record.
    fn read_line<C: ByteChannel>(
        &self,
        io: &mut C,
        line: &mut [u8; IHEX_MAX_LINE_LEN],
    ) -> Result<usize, HexError> {
        let timeout_ms = self.options.byte_timeout_ms;

        loop {
            match io.get_byte(timeout_ms)? {
                None => return Err(HexError::Timeout { timeout_ms }),
                Some(IHEX_CANCEL) => return Err(HexError::Cancelled),
                Some(IHEX_START) => break,
                Some(_) => continue,
            }
        }

        line[0] = IHEX_START;
        let mut len = 1;
        while len < IHEX_MAX_LINE_LEN {
            match io.get_byte(timeout_ms)? {
                None if len >= IHEX_MIN_LINE_LEN => break,
                None => return Err(HexError::Timeout { timeout_ms }),
                Some(b'\r') | Some(b'\n') => break,
                Some(b) => {
                    line[len] = b;
                    len += 1;
                }
            }
        }
        Ok(len)
    }

    /// Send `length` bytes starting at `start_addr` as Intel HEX.
    #[instrument(level = "debug", skip(self, io, mem), fields(start = %format!("0x{:08X}", start_addr)))]
    pub fn send<C, M>(
        &self,
        io: &mut C,
        mem: &mut M,
        start_addr: u32,
        length: u32,
    ) -> Result<(), HexError>
    where
        C: ByteChannel,
        M: Memory,
    {
        let mut data = [0u8; IHEX_BYTES_PER_LINE];
        let mut addr = start_addr;
        let mut remaining = length;
        let mut current_base: Option<u32> = None;
        let mut lines: u32 = 0;

        while remaining > 0 {
            let base = addr & 0xFFFF_0000;
            if current_base != Some(base) {
                HexRecord::extended_linear_address(base).write_to(io)?;
                current_base = Some(base);
                debug!(base = %format!("0x{:08X}", base), "Emitted extended linear address");
            }

            // Never let a line run past the end of the 64 KiB region.
            let to_boundary = 0x1_0000 - (addr & 0xFFFF);
            let n = remaining
                .min(IHEX_BYTES_PER_LINE as u32)
                .min(to_boundary) as usize;

            mem.read(addr, &mut data[..n])?;
            HexRecord::data_record((addr & 0xFFFF) as u16, &data[..n])?.write_to(io)?;

            addr = addr.wrapping_add(n as u32);
            remaining -= n as u32;
            lines += 1;
        }

        io.put_bytes(IHEX_EOF_RECORD)?;
        io.put_bytes(b"\r\n")?;
        io.flush()?;

        info!(lines, bytes = length, "Hex send complete");
        Ok(())
    }
}
