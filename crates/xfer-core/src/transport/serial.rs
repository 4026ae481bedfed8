//! serialport-based byte channel.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info, instrument};

use super::traits::{ByteChannel, TransportError};

/// Host side serial link (8N1, no flow control).
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
    timeout_ms: u32,
}

impl SerialChannel {
    /// Open a serial port at the given baud rate.
    #[instrument(level = "info")]
    pub fn open(port: &str, baud: u32) -> Result<Self, TransportError> {
        let handle = serialport::new(port, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| TransportError::OpenFailed {
                port: port.to_string(),
                message: e.to_string(),
            })?;

        info!(port = %port, baud, "Serial port opened");

        Ok(Self {
            port: handle,
            timeout_ms: 100,
        })
    }

    /// Discard anything waiting in the input buffer, returning how many
    /// bytes were dropped.
    pub fn discard_input(&mut self) -> Result<usize, TransportError> {
        let pending = self
            .port
            .bytes_to_read()
            .map_err(|e| TransportError::ReadFailed(e.to_string()))? as usize;
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
        if pending > 0 {
            debug!(bytes = pending, "Discarded pending input");
        }
        Ok(pending)
    }
}

impl ByteChannel for SerialChannel {
    fn get_byte(&mut self, timeout_ms: u32) -> Result<Option<u8>, TransportError> {
        if timeout_ms != self.timeout_ms {
            self.port
                .set_timeout(Duration::from_millis(u64::from(timeout_ms.max(1))))
                .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
            self.timeout_ms = timeout_ms;
        }

        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn put_byte(&mut self, byte: u8) -> Result<(), TransportError> {
        self.put_bytes(&[byte])
    }

    fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port
            .write_all(bytes)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.port
            .flush()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }
}

/// Names of the serial ports present on this machine.
pub fn list_ports() -> Result<Vec<String>, TransportError> {
    let ports = serialport::available_ports().map_err(|e| TransportError::OpenFailed {
        port: "*".into(),
        message: e.to_string(),
    })?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
