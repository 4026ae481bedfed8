//! Simple Upload engine.

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, info, instrument, trace, warn};

use super::{AckSequence, SimpleError, SimpleOptions};
use crate::memory::Memory;
use crate::protocol::constants::*;
use crate::protocol::crc::{CRC32_INIT, crc32_finalize, crc32_update};
use crate::transport::ByteChannel;

#[derive(Debug, Clone, Default)]
pub struct SimpleUpload {
    options: SimpleOptions,
}

impl SimpleUpload {
    pub fn new(options: SimpleOptions) -> Self {
        Self { options }
    }

    /// Receive a transfer into `mem` at offset 0, returning its size.
    #[instrument(level = "debug", skip_all)]
    pub fn receive<C, M>(&self, io: &mut C, mem: &mut M) -> Result<u32, SimpleError>
    where
        C: ByteChannel,
        M: Memory,
    {
        let mut acks = AckSequence::new();

        loop {
            match self.read(io, self.options.ready_timeout_ms)? {
                b'R' | b'r' => break,
                SIMPLE_CANCEL => return Err(SimpleError::Cancelled),
                other => trace!(byte = other, "Ignoring byte while waiting for ready"),
            }
        }
        io.put_byte(acks.advance())?;
        io.flush()?;

        let size = self.read_u32(io)?;
        io.put_byte(acks.advance())?;
        io.flush()?;

        let capacity = mem.capacity();
        if size == 0 || size > capacity {
            warn!(size, capacity, "Rejecting transfer size");
            return Err(SimpleError::Size { size, capacity });
        }
        debug!(size, "Receiving payload");

        let mut crc = CRC32_INIT;
        let mut chunk = [0u8; SIMPLE_CHUNK_SIZE];
        let mut received = 0u32;
        while received < size {
            let n = (size - received).min(SIMPLE_CHUNK_SIZE as u32) as usize;
            for slot in &mut chunk[..n] {
                let byte = self.read(io, self.options.byte_timeout_ms)?;
                crc = crc32_update(crc, byte);
                *slot = byte;
            }
            mem.write(received, &chunk[..n])?;
            received += n as u32;

            io.put_byte(acks.advance())?;
            io.flush()?;
            trace!(received, "Chunk acknowledged");
        }
        let local = crc32_finalize(crc);

        let command = self.read(io, self.options.byte_timeout_ms)?;
        if command != SIMPLE_CMD_CRC {
            return Err(SimpleError::CrcProtocol {
                expected: SIMPLE_CMD_CRC,
                found: command,
            });
        }
        let remote = self.read_u32(io)?;

        // Our CRC goes back even on mismatch so the sender can report it too.
        let mut reply = [0u8; 5];
        reply[0] = acks.advance();
        LittleEndian::write_u32(&mut reply[1..], local);
        io.put_bytes(&reply)?;
        io.flush()?;

        if local != remote {
            warn!(
                local = %format!("0x{:08X}", local),
                remote = %format!("0x{:08X}", remote),
                "CRC32 mismatch"
            );
            return Err(SimpleError::CrcMismatch { local, remote });
        }

        info!(bytes = size, crc = %format!("0x{:08X}", local), "Simple upload received");
        Ok(size)
    }

    /// Send the first `length` bytes of `mem`, returning the count sent.
    #[instrument(level = "debug", skip(self, io, mem))]
    pub fn send<C, M>(&self, io: &mut C, mem: &mut M, length: u32) -> Result<u32, SimpleError>
    where
        C: ByteChannel,
        M: Memory,
    {
        if length == 0 {
            return Err(SimpleError::Size {
                size: 0,
                capacity: mem.capacity(),
            });
        }

        let mut acks = AckSequence::new();

        io.put_byte(SIMPLE_CMD_READY)?;
        io.flush()?;
        self.expect_ack(io, &mut acks, self.options.ready_timeout_ms)?;

        let mut size = [0u8; 4];
        LittleEndian::write_u32(&mut size, length);
        io.put_bytes(&size)?;
        io.flush()?;
        self.expect_ack(io, &mut acks, self.options.byte_timeout_ms)?;

        let mut crc = CRC32_INIT;
        let mut chunk = [0u8; SIMPLE_CHUNK_SIZE];
        let mut sent = 0u32;
        while sent < length {
            let n = (length - sent).min(SIMPLE_CHUNK_SIZE as u32) as usize;
            mem.read(sent, &mut chunk[..n])?;
            crc = chunk[..n].iter().fold(crc, |c, &b| crc32_update(c, b));
            io.put_bytes(&chunk[..n])?;
            io.flush()?;
            self.expect_ack(io, &mut acks, self.options.byte_timeout_ms)?;
            sent += n as u32;
        }
        let local = crc32_finalize(crc);

        let mut command = [0u8; 5];
        command[0] = SIMPLE_CMD_CRC;
        LittleEndian::write_u32(&mut command[1..], local);
        io.put_bytes(&command)?;
        io.flush()?;

        let expected = acks.advance();
        let found = self.read(io, self.options.byte_timeout_ms)?;
        if found != expected {
            return Err(SimpleError::CrcProtocol { expected, found });
        }

        let remote = self.read_u32(io)?;
        if local != remote {
            warn!(
                local = %format!("0x{:08X}", local),
                remote = %format!("0x{:08X}", remote),
                "Receiver reports a different CRC32"
            );
            return Err(SimpleError::CrcMismatch { local, remote });
        }

        info!(bytes = length, crc = %format!("0x{:08X}", local), "Simple upload sent");
        Ok(length)
    }

    fn read<C: ByteChannel>(&self, io: &mut C, timeout_ms: u32) -> Result<u8, SimpleError> {
        io.get_byte(timeout_ms)?
            .ok_or(SimpleError::Timeout { timeout_ms })
    }

    fn read_u32<C: ByteChannel>(&self, io: &mut C) -> Result<u32, SimpleError> {
        let mut buf = [0u8; 4];
        for slot in &mut buf {
            *slot = self.read(io, self.options.byte_timeout_ms)?;
        }
        Ok(LittleEndian::read_u32(&buf))
    }

    /// Any letter other than the next in sequence aborts the transfer.
    fn expect_ack<C: ByteChannel>(
        &self,
        io: &mut C,
        acks: &mut AckSequence,
        timeout_ms: u32,
    ) -> Result<(), SimpleError> {
        let expected = acks.advance();
        let found = self.read(io, timeout_ms)?;
        if found != expected {
            debug!(
                expected = %char::from(expected),
                found = %format!("0x{:02X}", found),
                "Unexpected acknowledgement"
            );
            return Err(SimpleError::Cancelled);
        }
        Ok(())
    }
}
