//! In-process duplex link.
//!
//! Two `PipeChannel` ends joined by mpsc queues. Each end is meant to be
//! driven by its own thread, which makes it the harness for exercising a
//! sender against a receiver without hardware.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use super::traits::{ByteChannel, TransportError};

pub struct PipeChannel {
    tx: Sender<u8>,
    rx: Receiver<u8>,
}

impl PipeChannel {
    /// Create two connected ends.
    pub fn pair() -> (PipeChannel, PipeChannel) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();
        (
            PipeChannel { tx: a_tx, rx: a_rx },
            PipeChannel { tx: b_tx, rx: b_rx },
        )
    }
}

impl ByteChannel for PipeChannel {
    fn get_byte(&mut self, timeout_ms: u32) -> Result<Option<u8>, TransportError> {
        match self
            .rx
            .recv_timeout(Duration::from_millis(u64::from(timeout_ms)))
        {
            Ok(b) => Ok(Some(b)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }

    fn put_byte(&mut self, byte: u8) -> Result<(), TransportError> {
        self.tx.send(byte).map_err(|_| TransportError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_both_directions() {
        let (mut a, mut b) = PipeChannel::pair();
        a.put_bytes(b"ping").unwrap();
        b.put_byte(b'!').unwrap();

        let got: Vec<u8> = (0..4).map(|_| b.get_byte(100).unwrap().unwrap()).collect();
        assert_eq!(got, b"ping");
        assert_eq!(a.get_byte(100).unwrap(), Some(b'!'));
        assert_eq!(a.get_byte(5).unwrap(), None);
    }

    #[test]
    fn test_pipe_far_end_dropped() {
        let (mut a, b) = PipeChannel::pair();
        drop(b);
        assert!(matches!(a.get_byte(5), Err(TransportError::Disconnected)));
        assert!(matches!(a.put_byte(0x55), Err(TransportError::Disconnected)));
        assert!(matches!(a.put_bytes(b"late"), Err(TransportError::Disconnected)));
    }
}
