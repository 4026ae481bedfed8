//! Byte channel over plain `std::io` streams.
//!
//! Used for offline conversions (files, stdin/stdout). End of input reads as
//! "no data", which the engines treat like a timeout.

use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};

use super::traits::{ByteChannel, TransportError};

pub struct StreamChannel<R: Read, W: Write> {
    reader: BufReader<R>,
    writer: BufWriter<W>,
}

impl<R: Read, W: Write> StreamChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
        }
    }

    /// Flush and hand back the writer.
    pub fn into_writer(self) -> Result<W, TransportError> {
        self.writer
            .into_inner()
            .map_err(|e| TransportError::WriteFailed(e.error().to_string()))
    }
}

impl<R: Read, W: Write> ByteChannel for StreamChannel<R, W> {
    fn get_byte(&mut self, _timeout_ms: u32) -> Result<Option<u8>, TransportError> {
        let mut buf = [0u8; 1];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }

    fn put_byte(&mut self, byte: u8) -> Result<(), TransportError> {
        self.writer.write_all(&[byte])?;
        Ok(())
    }

    fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.writer.write_all(bytes)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_eof_reads_as_none() {
        let mut ch = StreamChannel::new(&b"ab"[..], Vec::new());
        assert_eq!(ch.get_byte(0).unwrap(), Some(b'a'));
        assert_eq!(ch.get_byte(0).unwrap(), Some(b'b'));
        assert_eq!(ch.get_byte(0).unwrap(), None);
    }

    #[test]
    fn test_stream_writes_reach_writer() {
        let mut ch = StreamChannel::new(std::io::empty(), Vec::new());
        ch.put_bytes(b":00000001FF").unwrap();
        ch.put_byte(b'\n').unwrap();
        let out = ch.into_writer().unwrap();
        assert_eq!(out, b":00000001FF\n");
    }
}
