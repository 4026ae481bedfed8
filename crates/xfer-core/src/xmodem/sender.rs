//! XMODEM-1K sender state machine.

use std::fmt;

use tracing::{debug, info, instrument, trace, warn};

use super::{Xmodem, XmodemError};
use crate::memory::Memory;
use crate::protocol::constants::*;
use crate::protocol::crc::crc16_ccitt;
use crate::transport::{ByteChannel, Clock};

/// Sender states.
#[derive(Debug)]
pub enum TxState {
    /// Polling for the receiver's CRC request.
    AwaitingStart { poll: u32 },
    /// Filling the packet buffer with the next block.
    BuildingBlock,
    /// Writing the packet; `chunk` is the unpadded payload length.
    Transmitting { chunk: usize },
    AwaitingResponse { chunk: usize },
    SendingEot { attempt: u8 },
    Done,
    Failed(XmodemError),
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxState::AwaitingStart { .. } => write!(f, "AWAITING_START"),
            TxState::BuildingBlock => write!(f, "BUILDING_BLOCK"),
            TxState::Transmitting { .. } => write!(f, "TRANSMITTING"),
            TxState::AwaitingResponse { .. } => write!(f, "AWAITING_RESPONSE"),
            TxState::SendingEot { .. } => write!(f, "SENDING_EOT"),
            TxState::Done => write!(f, "DONE"),
            TxState::Failed(_) => write!(f, "FAILED"),
        }
    }
}

struct TxContext {
    packet: [u8; XMODEM_PACKET_SIZE],
    block: u8,
    retries: u8,
    offset: u32,
    length: u32,
}

impl<K: Clock> Xmodem<K> {
    /// Send `length` bytes of `mem`, starting at offset 0.
    ///
    /// Returns the number of payload bytes delivered (padding excluded).
    #[instrument(level = "debug", skip(self, io, mem))]
    pub fn send<C, M>(&self, io: &mut C, mem: &mut M, length: u32) -> Result<u32, XmodemError>
    where
        C: ByteChannel,
        M: Memory,
    {
        let started = self.clock.now_ms();
        let mut ctx = TxContext {
            packet: [0; XMODEM_PACKET_SIZE],
            block: 1,
            retries: 0,
            offset: 0,
            length,
        };
        let mut state = TxState::AwaitingStart { poll: 0 };

        loop {
            trace!(state = %state, "Sender step");
            state = match state {
                TxState::AwaitingStart { poll } => self.tx_await_start(io, poll)?,
                TxState::BuildingBlock => Self::tx_build(mem, &mut ctx)?,
                TxState::Transmitting { chunk } => {
                    io.put_bytes(&ctx.packet)?;
                    io.flush()?;
                    TxState::AwaitingResponse { chunk }
                }
                TxState::AwaitingResponse { chunk } => self.tx_response(io, &mut ctx, chunk)?,
                TxState::SendingEot { attempt } => self.tx_eot(io, attempt)?,
                TxState::Done => {
                    let elapsed_ms = self.elapsed_since(started);
                    info!(bytes = ctx.offset, elapsed_ms, "XMODEM send complete");
                    return Ok(ctx.offset);
                }
                TxState::Failed(e) => {
                    warn!(error = %e, bytes = ctx.offset, "XMODEM send failed");
                    return Err(e);
                }
            };
        }
    }

    fn tx_await_start<C: ByteChannel>(&self, io: &mut C, poll: u32) -> Result<TxState, XmodemError> {
        if poll >= XMODEM_SENDER_POLLS {
            return Ok(TxState::Failed(XmodemError::Timeout));
        }
        Ok(match io.get_byte(self.options.sender_poll_ms)? {
            Some(CRC_REQUEST) => {
                debug!(poll, "Receiver requested CRC mode");
                TxState::BuildingBlock
            }
            Some(CAN) => TxState::Failed(XmodemError::Cancelled),
            _ => TxState::AwaitingStart { poll: poll + 1 },
        })
    }

    fn tx_build<M: Memory>(mem: &mut M, ctx: &mut TxContext) -> Result<TxState, XmodemError> {
        if ctx.offset >= ctx.length {
            return Ok(TxState::SendingEot { attempt: 0 });
        }

        let chunk = (ctx.length - ctx.offset).min(XMODEM_BLOCK_SIZE as u32) as usize;
        ctx.packet[0] = STX;
        ctx.packet[1] = ctx.block;
        ctx.packet[2] = !ctx.block;

        let payload = &mut ctx.packet[3..3 + XMODEM_BLOCK_SIZE];
        mem.read(ctx.offset, &mut payload[..chunk])?;
        payload[chunk..].fill(PAD);

        let crc = crc16_ccitt(payload);
        ctx.packet[3 + XMODEM_BLOCK_SIZE..].copy_from_slice(&crc.to_be_bytes());

        debug!(block = ctx.block, offset = ctx.offset, chunk, "Block built");
        Ok(TxState::Transmitting { chunk })
    }

    fn tx_response<C: ByteChannel>(
        &self,
        io: &mut C,
        ctx: &mut TxContext,
        chunk: usize,
    ) -> Result<TxState, XmodemError> {
        let response = io.get_byte(self.options.block_timeout_ms)?;
        let cause = match response {
            Some(ACK) => {
                ctx.offset += chunk as u32;
                ctx.block = ctx.block.wrapping_add(1);
                ctx.retries = 0;
                return Ok(TxState::BuildingBlock);
            }
            Some(CAN) => return Ok(TxState::Failed(XmodemError::Cancelled)),
            Some(NAK) => XmodemError::TooManyErrors,
            _ => XmodemError::Timeout,
        };

        ctx.retries += 1;
        warn!(
            block = ctx.block,
            retries = ctx.retries,
            response = ?response,
            "Block not acknowledged"
        );
        if ctx.retries > XMODEM_MAX_RETRIES {
            return Ok(TxState::Failed(cause));
        }
        Ok(TxState::Transmitting { chunk })
    }

    fn tx_eot<C: ByteChannel>(&self, io: &mut C, attempt: u8) -> Result<TxState, XmodemError> {
        if attempt >= XMODEM_MAX_RETRIES {
            return Ok(TxState::Failed(XmodemError::Timeout));
        }
        io.put_byte(EOT)?;
        io.flush()?;
        Ok(match io.get_byte(self.options.block_timeout_ms)? {
            Some(ACK) => TxState::Done,
            Some(CAN) => TxState::Failed(XmodemError::Cancelled),
            _ => TxState::SendingEot {
                attempt: attempt + 1,
            },
        })
    }
}
