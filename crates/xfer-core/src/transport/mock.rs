//! Mock byte channel for testing.

use std::collections::VecDeque;

use super::traits::{ByteChannel, TransportError};

/// Mock channel for unit testing the protocol engines.
///
/// Reads are served from a script where `None` stands for a timeout; once
/// the script runs dry every read times out.
#[derive(Debug, Default)]
pub struct MockChannel {
    /// Scripted reads.
    read_queue: VecDeque<Option<u8>>,
    /// Captured writes.
    write_log: Vec<u8>,
    /// Whether the link is "connected".
    connected: bool,
    /// Timeouts requested by the engine, in call order.
    timeouts: Vec<u32>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            connected: true,
            ..Default::default()
        }
    }

    /// Mock pre-loaded with a read script.
    pub fn with_reads(bytes: &[u8]) -> Self {
        let mut mock = Self::new();
        mock.queue_bytes(bytes);
        mock
    }

    /// Queue one byte to be returned on a later read.
    pub fn queue_byte(&mut self, byte: u8) {
        self.read_queue.push_back(Some(byte));
    }

    /// Queue a run of bytes.
    pub fn queue_bytes(&mut self, bytes: &[u8]) {
        self.read_queue.extend(bytes.iter().copied().map(Some));
    }

    /// Queue a single read timeout.
    pub fn queue_timeout(&mut self) {
        self.read_queue.push_back(None);
    }

    /// Scripted reads not yet consumed.
    pub fn pending_reads(&self) -> usize {
        self.read_queue.len()
    }

    /// Everything written so far.
    pub fn get_writes(&self) -> &[u8] {
        &self.write_log
    }

    /// Clear captured writes.
    pub fn clear_writes(&mut self) {
        self.write_log.clear();
    }

    /// Timeouts passed to `get_byte`.
    pub fn requested_timeouts(&self) -> &[u32] {
        &self.timeouts
    }

    /// Simulate the link dropping.
    pub fn disconnect(&mut self) {
        self.connected = false;
    }
}

impl ByteChannel for MockChannel {
    fn get_byte(&mut self, timeout_ms: u32) -> Result<Option<u8>, TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        self.timeouts.push(timeout_ms);
        Ok(self.read_queue.pop_front().flatten())
    }

    fn put_byte(&mut self, byte: u8) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        self.write_log.push(byte);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_read_script() {
        let mut mock = MockChannel::new();
        mock.queue_byte(0x43);
        mock.queue_timeout();
        mock.queue_byte(0x06);

        assert_eq!(mock.get_byte(100).unwrap(), Some(0x43));
        assert_eq!(mock.get_byte(100).unwrap(), None);
        assert_eq!(mock.get_byte(100).unwrap(), Some(0x06));

        // Script is empty now
        assert_eq!(mock.get_byte(100).unwrap(), None);
        assert_eq!(mock.requested_timeouts(), &[100, 100, 100, 100]);
    }

    #[test]
    fn test_mock_write_capture() {
        let mut mock = MockChannel::new();
        mock.put_bytes(b"Hello").unwrap();
        mock.put_byte(b'!').unwrap();

        assert_eq!(mock.get_writes(), b"Hello!");
        mock.clear_writes();
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_mock_disconnect() {
        let mut mock = MockChannel::with_reads(b"R");
        mock.disconnect();
        assert!(mock.get_byte(10).is_err());
        assert!(mock.put_byte(b'A').is_err());
    }
}
