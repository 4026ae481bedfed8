//! XMODEM-1K receiver state machine.

use std::fmt;

use tracing::{debug, info, instrument, trace, warn};

use super::{Xmodem, XmodemError, block_size, flush_input};
use crate::memory::Memory;
use crate::protocol::constants::*;
use crate::protocol::crc::crc16_ccitt;
use crate::transport::{ByteChannel, Clock};

/// Receiver states.
#[derive(Debug)]
pub enum RxState {
    /// Sending CRC requests until the sender starts.
    Init { attempt: u32 },
    /// Waiting for (or holding) the first byte of the next packet.
    ReceivingHeader { header: Option<u8> },
    /// Reading block#, ~block#, payload and CRC.
    ReceivingBody { size: usize },
    /// Checking block numbers and CRC.
    Validating { size: usize },
    /// Writing an accepted block.
    Committed { size: usize },
    Done,
    Failed(XmodemError),
}

impl fmt::Display for RxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RxState::Init { .. } => write!(f, "INIT"),
            RxState::ReceivingHeader { .. } => write!(f, "RECEIVING_HEADER"),
            RxState::ReceivingBody { .. } => write!(f, "RECEIVING_BODY"),
            RxState::Validating { .. } => write!(f, "VALIDATING"),
            RxState::Committed { .. } => write!(f, "COMMITTED"),
            RxState::Done => write!(f, "DONE"),
            RxState::Failed(_) => write!(f, "FAILED"),
        }
    }
}

/// Per-call transfer context.
struct RxContext {
    packet: [u8; XMODEM_PACKET_SIZE],
    expected_block: u8,
    last_accepted: Option<u8>,
    retries: u8,
    offset: u32,
}

impl RxContext {
    fn new() -> Self {
        Self {
            packet: [0; XMODEM_PACKET_SIZE],
            expected_block: 1,
            last_accepted: None,
            retries: 0,
            offset: 0,
        }
    }

    /// NAK the packet and charge the retry budget to `cause`.
    fn reject<C: ByteChannel>(
        &mut self,
        io: &mut C,
        cause: XmodemError,
    ) -> Result<RxState, XmodemError> {
        io.put_byte(NAK)?;
        self.retries += 1;
        warn!(retries = self.retries, cause = %cause, "Block rejected");
        if self.retries > XMODEM_MAX_RETRIES {
            return Ok(RxState::Failed(cause));
        }
        Ok(RxState::ReceivingHeader { header: None })
    }
}

impl<K: Clock> Xmodem<K> {
    /// Receive a file into `mem`, starting at offset 0.
    ///
    /// Returns the number of bytes written, which includes the padding of
    /// the final block.
    #[instrument(level = "debug", skip_all)]
    pub fn receive<C, M>(&self, io: &mut C, mem: &mut M) -> Result<u32, XmodemError>
    where
        C: ByteChannel,
        M: Memory,
    {
        let started = self.clock.now_ms();
        let mut ctx = RxContext::new();
        let mut state = RxState::Init { attempt: 0 };

        loop {
            trace!(state = %state, "Receiver step");
            state = match state {
                RxState::Init { attempt } => self.rx_init(io, attempt)?,
                RxState::ReceivingHeader { header } => self.rx_header(io, &mut ctx, header)?,
                RxState::ReceivingBody { size } => self.rx_body(io, &mut ctx, size)?,
                RxState::Validating { size } => Self::rx_validate(io, &mut ctx, size)?,
                RxState::Committed { size } => Self::rx_commit(io, mem, &mut ctx, size)?,
                RxState::Done => {
                    let elapsed_ms = self.elapsed_since(started);
                    info!(bytes = ctx.offset, elapsed_ms, "XMODEM receive complete");
                    return Ok(ctx.offset);
                }
                RxState::Failed(e) => {
                    warn!(error = %e, bytes = ctx.offset, "XMODEM receive failed");
                    return Err(e);
                }
            };
        }
    }

    fn rx_init<C: ByteChannel>(&self, io: &mut C, attempt: u32) -> Result<RxState, XmodemError> {
        if attempt >= XMODEM_INIT_ATTEMPTS {
            return Ok(RxState::Failed(XmodemError::Timeout));
        }

        flush_input(io)?;
        io.put_byte(CRC_REQUEST)?;
        io.flush()?;
        debug!(attempt, "Sent CRC request");

        Ok(match io.get_byte(self.options.init_timeout_ms)? {
            Some(b @ (SOH | STX)) => RxState::ReceivingHeader { header: Some(b) },
            Some(EOT) => {
                // Empty file
                io.put_byte(ACK)?;
                RxState::Done
            }
            Some(CAN) => RxState::Failed(XmodemError::Cancelled),
            _ => RxState::Init {
                attempt: attempt + 1,
            },
        })
    }

    fn rx_header<C: ByteChannel>(
        &self,
        io: &mut C,
        ctx: &mut RxContext,
        header: Option<u8>,
    ) -> Result<RxState, XmodemError> {
        let byte = match header {
            Some(b) => b,
            None => match io.get_byte(self.options.block_timeout_ms)? {
                Some(b) => b,
                None => return Ok(RxState::Failed(XmodemError::Timeout)),
            },
        };

        match byte {
            EOT => {
                io.put_byte(ACK)?;
                io.flush()?;
                Ok(RxState::Done)
            }
            CAN => Ok(RxState::Failed(XmodemError::Cancelled)),
            SOH | STX => {
                ctx.packet[0] = byte;
                Ok(RxState::ReceivingBody {
                    size: block_size(byte),
                })
            }
            other => {
                debug!(byte = %format!("0x{:02X}", other), "Unexpected header byte");
                ctx.reject(io, XmodemError::TooManyErrors)
            }
        }
    }

    fn rx_body<C: ByteChannel>(
        &self,
        io: &mut C,
        ctx: &mut RxContext,
        size: usize,
    ) -> Result<RxState, XmodemError> {
        for i in 1..size + 5 {
            match io.get_byte(self.options.char_timeout_ms)? {
                Some(b) => ctx.packet[i] = b,
                None => {
                    debug!(received = i, expected = size + 5, "Character timeout inside block");
                    return ctx.reject(io, XmodemError::Timeout);
                }
            }
        }
        Ok(RxState::Validating { size })
    }

    fn rx_validate<C: ByteChannel>(
        io: &mut C,
        ctx: &mut RxContext,
        size: usize,
    ) -> Result<RxState, XmodemError> {
        let block = ctx.packet[1];
        let complement = ctx.packet[2];

        if block ^ complement != 0xFF {
            debug!(block, complement, "Block number complement mismatch");
            return ctx.reject(io, XmodemError::Sync);
        }

        if ctx.last_accepted == Some(block) {
            // Sender missed our ACK and repeated the block.
            debug!(block, "Duplicate block acknowledged");
            io.put_byte(ACK)?;
            return Ok(RxState::ReceivingHeader { header: None });
        }

        if block != ctx.expected_block {
            debug!(block, expected = ctx.expected_block, "Out of sequence block");
            flush_input(io)?;
            return ctx.reject(io, XmodemError::Sync);
        }

        let received_crc = u16::from_be_bytes([ctx.packet[size + 3], ctx.packet[size + 4]]);
        let computed_crc = crc16_ccitt(&ctx.packet[3..3 + size]);
        if received_crc != computed_crc {
            debug!(
                block,
                received = %format!("0x{:04X}", received_crc),
                computed = %format!("0x{:04X}", computed_crc),
                "Block CRC mismatch"
            );
            return ctx.reject(io, XmodemError::Crc);
        }

        Ok(RxState::Committed { size })
    }

    fn rx_commit<C: ByteChannel, M: Memory>(
        io: &mut C,
        mem: &mut M,
        ctx: &mut RxContext,
        size: usize,
    ) -> Result<RxState, XmodemError> {
        let capacity = mem.capacity();
        if u64::from(ctx.offset) + size as u64 > u64::from(capacity) {
            io.put_byte(CAN)?;
            io.put_byte(CAN)?;
            io.flush()?;
            return Ok(RxState::Failed(XmodemError::Overflow {
                offset: ctx.offset,
                size,
                capacity,
            }));
        }

        mem.write(ctx.offset, &ctx.packet[3..3 + size])?;
        io.put_byte(ACK)?;
        io.flush()?;

        let block = ctx.packet[1];
        debug!(block, offset = ctx.offset, size, "Block accepted");

        ctx.offset += size as u32;
        ctx.last_accepted = Some(block);
        ctx.expected_block = ctx.expected_block.wrapping_add(1);
        ctx.retries = 0;

        Ok(RxState::ReceivingHeader { header: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{BufferMemory, MemoryError};
    use crate::transport::MockChannel;
    use crate::xmodem::XmodemOptions;

    /// Memory that counts write calls.
    struct CountingMemory {
        inner: BufferMemory,
        writes: usize,
    }

    impl Memory for CountingMemory {
        fn write(&mut self, address: u32, data: &[u8]) -> Result<(), MemoryError> {
            self.writes += 1;
            self.inner.write(address, data)
        }

        fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
            self.inner.read(address, buf)
        }

        fn capacity(&self) -> u32 {
            self.inner.capacity()
        }
    }

    fn packet(header: u8, block: u8, fill: u8) -> Vec<u8> {
        let size = block_size(header);
        let payload = vec![fill; size];
        let crc = crc16_ccitt(&payload);
        let mut p = vec![header, block, !block];
        p.extend_from_slice(&payload);
        p.extend_from_slice(&crc.to_be_bytes());
        p
    }

    /// Script starting with the timeout that ends the initial flush.
    fn script() -> MockChannel {
        let mut mock = MockChannel::new();
        mock.queue_timeout();
        mock
    }

    fn receive(mock: &mut MockChannel, capacity: u32) -> (Result<u32, XmodemError>, BufferMemory) {
        let mut mem = BufferMemory::new(capacity);
        let result = Xmodem::new(XmodemOptions::default()).receive(mock, &mut mem);
        (result, mem)
    }

    #[test]
    fn test_single_block_then_eot() {
        let mut mock = script();
        mock.queue_bytes(&packet(STX, 1, 0xAB));
        mock.queue_byte(EOT);

        let (result, mem) = receive(&mut mock, 4096);
        assert_eq!(result.unwrap(), 1024);
        assert_eq!(mem.as_slice(), &[0xAB; 1024][..]);
        assert_eq!(mock.get_writes(), &[CRC_REQUEST, ACK, ACK]);
    }

    #[test]
    fn test_short_blocks_accepted() {
        let mut mock = script();
        mock.queue_bytes(&packet(SOH, 1, 0x11));
        mock.queue_bytes(&packet(SOH, 2, 0x22));
        mock.queue_byte(EOT);

        let (result, mem) = receive(&mut mock, 4096);
        assert_eq!(result.unwrap(), 256);
        assert_eq!(&mem.as_slice()[..128], &[0x11; 128][..]);
        assert_eq!(&mem.as_slice()[128..], &[0x22; 128][..]);
    }

    #[test]
    fn test_empty_file() {
        let mut mock = script();
        mock.queue_byte(EOT);

        let (result, mem) = receive(&mut mock, 4096);
        assert_eq!(result.unwrap(), 0);
        assert!(mem.is_empty());
        assert_eq!(mock.get_writes(), &[CRC_REQUEST, ACK]);
    }

    #[test]
    fn test_init_gives_up_after_ten_requests() {
        let mut mock = MockChannel::new();
        let (result, _) = receive(&mut mock, 4096);
        assert!(matches!(result, Err(XmodemError::Timeout)));
        assert_eq!(mock.get_writes(), &[CRC_REQUEST; 10]);
    }

    #[test]
    fn test_init_ignores_noise() {
        let mut mock = script();
        mock.queue_byte(0x55);
        mock.queue_timeout(); // ends the second flush
        mock.queue_byte(EOT);

        let (result, _) = receive(&mut mock, 4096);
        assert_eq!(result.unwrap(), 0);
        assert_eq!(mock.get_writes(), &[CRC_REQUEST, CRC_REQUEST, ACK]);
    }

    #[test]
    fn test_duplicate_block_acked_not_rewritten() {
        let mut mock = script();
        mock.queue_bytes(&packet(STX, 1, 0x01));
        mock.queue_bytes(&packet(STX, 1, 0x01));
        mock.queue_bytes(&packet(STX, 2, 0x02));
        mock.queue_byte(EOT);

        let mut mem = CountingMemory {
            inner: BufferMemory::new(4096),
            writes: 0,
        };
        let result = Xmodem::default().receive(&mut mock, &mut mem);

        assert_eq!(result.unwrap(), 2048);
        assert_eq!(mem.writes, 2);
        assert_eq!(&mem.inner.as_slice()[1024..], &[0x02; 1024][..]);
        assert_eq!(mock.get_writes(), &[CRC_REQUEST, ACK, ACK, ACK, ACK]);
    }

    #[test]
    fn test_sync_loss_exhausts_budget() {
        let mut mock = script();
        for _ in 0..=XMODEM_MAX_RETRIES {
            mock.queue_bytes(&packet(STX, 5, 0x00));
            mock.queue_timeout(); // ends the resync flush
        }

        let (result, mem) = receive(&mut mock, 4096);
        assert!(matches!(result, Err(XmodemError::Sync)));
        assert!(mem.is_empty());

        let mut expected = vec![CRC_REQUEST];
        expected.extend(std::iter::repeat_n(NAK, XMODEM_MAX_RETRIES as usize + 1));
        assert_eq!(mock.get_writes(), &expected[..]);
    }

    #[test]
    fn test_bad_complement_is_sync_error() {
        let mut mock = script();
        for _ in 0..=XMODEM_MAX_RETRIES {
            let mut p = packet(STX, 1, 0x00);
            p[2] = 0x00;
            mock.queue_bytes(&p);
        }

        let (result, _) = receive(&mut mock, 4096);
        assert!(matches!(result, Err(XmodemError::Sync)));
    }

    #[test]
    fn test_crc_errors_exhaust_budget() {
        let mut mock = script();
        for _ in 0..=XMODEM_MAX_RETRIES {
            let mut p = packet(STX, 1, 0x00);
            p[100] ^= 0x01;
            mock.queue_bytes(&p);
        }

        let (result, mem) = receive(&mut mock, 4096);
        assert!(matches!(result, Err(XmodemError::Crc)));
        assert!(mem.is_empty());
    }

    #[test]
    fn test_crc_error_then_retransmission() {
        let mut mock = script();
        let mut bad = packet(STX, 1, 0x42);
        bad[1027] ^= 0xFF;
        mock.queue_bytes(&bad);
        mock.queue_bytes(&packet(STX, 1, 0x42));
        mock.queue_byte(EOT);

        let (result, mem) = receive(&mut mock, 4096);
        assert_eq!(result.unwrap(), 1024);
        assert_eq!(mem.as_slice(), &[0x42; 1024][..]);
        assert_eq!(mock.get_writes(), &[CRC_REQUEST, NAK, ACK, ACK]);
    }

    #[test]
    fn test_char_timeout_naks_block() {
        let mut mock = script();
        let good = packet(STX, 1, 0x33);
        mock.queue_bytes(&good[..500]);
        mock.queue_timeout();
        mock.queue_bytes(&good);
        mock.queue_byte(EOT);

        let (result, _) = receive(&mut mock, 4096);
        assert_eq!(result.unwrap(), 1024);
        assert_eq!(mock.get_writes(), &[CRC_REQUEST, NAK, ACK, ACK]);
    }

    #[test]
    fn test_garbage_header_is_naked() {
        let mut mock = script();
        mock.queue_bytes(&packet(STX, 1, 0x00));
        mock.queue_byte(0x7E);
        mock.queue_byte(EOT);

        let (result, _) = receive(&mut mock, 4096);
        assert_eq!(result.unwrap(), 1024);
        assert_eq!(mock.get_writes(), &[CRC_REQUEST, ACK, NAK, ACK]);
    }

    #[test]
    fn test_cancel_keeps_committed_blocks_only() {
        let mut mock = script();
        mock.queue_bytes(&packet(STX, 1, 0x01));
        mock.queue_byte(CAN);
        mock.queue_bytes(&packet(STX, 2, 0x02));

        let (result, mem) = receive(&mut mock, 4096);
        assert!(matches!(result, Err(XmodemError::Cancelled)));
        assert_eq!(mem.as_slice(), &[0x01; 1024][..]);
    }

    #[test]
    fn test_cancel_during_init() {
        let mut mock = script();
        mock.queue_byte(CAN);

        let (result, mem) = receive(&mut mock, 4096);
        assert!(matches!(result, Err(XmodemError::Cancelled)));
        assert!(mem.is_empty());
    }

    #[test]
    fn test_overflow_cancels_without_partial_write() {
        let mut mock = script();
        mock.queue_bytes(&packet(STX, 1, 0x01));
        mock.queue_bytes(&packet(STX, 2, 0x02));

        let (result, mem) = receive(&mut mock, 1500);
        assert!(matches!(
            result,
            Err(XmodemError::Overflow {
                offset: 1024,
                capacity: 1500,
                ..
            })
        ));
        assert_eq!(mem.len(), 1024);
        assert_eq!(mock.get_writes(), &[CRC_REQUEST, ACK, CAN, CAN]);
    }

    #[test]
    fn test_silence_between_blocks_times_out() {
        let mut mock = script();
        mock.queue_bytes(&packet(STX, 1, 0x01));

        let (result, _) = receive(&mut mock, 4096);
        assert!(matches!(result, Err(XmodemError::Timeout)));
    }

    #[test]
    fn test_block_numbers_wrap() {
        let mut mock = script();
        for n in 1..=257u32 {
            mock.queue_bytes(&packet(SOH, n as u8, n as u8));
        }
        mock.queue_byte(EOT);

        let (result, mem) = receive(&mut mock, 257 * 128);
        assert_eq!(result.unwrap(), 257 * 128);
        // block 256 travels as number 0
        assert_eq!(mem.as_slice()[255 * 128], 0x00);
        assert_eq!(mem.as_slice()[256 * 128], 0x01);
    }
}
