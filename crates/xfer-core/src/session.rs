//! Transfer session - high-level orchestrator over the protocol engines.

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::events::{
    Direction, LogLevel, TracingObserver, TransferEvent, TransferObserver, TransferPhase,
};
use crate::hex::{HexCodec, HexError, HexOptions};
use crate::memory::{BufferMemory, Memory, MemoryError, SparseMemory};
use crate::simple::{SimpleError, SimpleOptions, SimpleUpload};
use crate::transport::{ByteChannel, SerialChannel, StreamChannel};
use crate::xmodem::{Xmodem, XmodemError, XmodemOptions, trim_padding};

/// Any engine failure.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Intel HEX transfer failed")]
    Hex(#[from] HexError),

    #[error("XMODEM transfer failed")]
    Xmodem(#[from] XmodemError),

    #[error("Simple upload failed")]
    Simple(#[from] SimpleError),
}

/// Wire protocol for a session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Hex,
    #[default]
    Xmodem,
    Simple,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Hex => write!(f, "hex"),
            Protocol::Xmodem => write!(f, "xmodem"),
            Protocol::Simple => write!(f, "simple"),
        }
    }
}

impl FromStr for Protocol {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hex" | "ihex" => Ok(Protocol::Hex),
            "xmodem" | "xmodem-1k" => Ok(Protocol::Xmodem),
            "simple" => Ok(Protocol::Simple),
            other => Err(anyhow!(
                "Unknown protocol '{}' (expected hex, xmodem or simple)",
                other
            )),
        }
    }
}

/// Configuration for a transfer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial port name (e.g. /dev/ttyUSB0, COM3).
    pub port: Option<String>,
    pub baud: u32,
    pub protocol: Protocol,
    /// Start address used when sending Intel HEX.
    pub load_address: u32,
    /// Largest image accepted when receiving.
    pub capacity: u32,
    /// Strip trailing XMODEM padding from received images.
    pub trim_padding: bool,
    /// Text typed before the handshake, e.g. "upload\r" for a shell command.
    pub preamble: Option<String>,
    /// Wait after the preamble before draining its echo.
    pub settle_ms: u64,
    pub hex_timeout_ms: u32,
    pub xmodem_init_timeout_ms: u32,
    pub xmodem_block_timeout_ms: u32,
    pub xmodem_char_timeout_ms: u32,
    pub simple_ready_timeout_ms: u32,
    pub simple_timeout_ms: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let xmodem = XmodemOptions::default();
        let simple = SimpleOptions::default();
        Self {
            port: None,
            baud: 115_200,
            protocol: Protocol::default(),
            load_address: 0,
            capacity: 512 * 1024,
            trim_padding: true,
            preamble: None,
            settle_ms: 300,
            hex_timeout_ms: HexOptions::default().byte_timeout_ms,
            xmodem_init_timeout_ms: xmodem.init_timeout_ms,
            xmodem_block_timeout_ms: xmodem.block_timeout_ms,
            xmodem_char_timeout_ms: xmodem.char_timeout_ms,
            simple_ready_timeout_ms: simple.ready_timeout_ms,
            simple_timeout_ms: simple.byte_timeout_ms,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn hex_codec(&self) -> HexCodec {
        HexCodec::new(HexOptions {
            byte_timeout_ms: self.hex_timeout_ms,
        })
    }

    fn xmodem(&self) -> Xmodem {
        Xmodem::new(XmodemOptions {
            init_timeout_ms: self.xmodem_init_timeout_ms,
            block_timeout_ms: self.xmodem_block_timeout_ms,
            char_timeout_ms: self.xmodem_char_timeout_ms,
            ..XmodemOptions::default()
        })
    }

    fn simple(&self) -> SimpleUpload {
        SimpleUpload::new(SimpleOptions {
            ready_timeout_ms: self.simple_ready_timeout_ms,
            byte_timeout_ms: self.simple_timeout_ms,
        })
    }
}

/// Transfer session - drives one protocol engine per call and reports
/// through an observer.
pub struct TransferSession<O: TransferObserver> {
    config: SessionConfig,
    observer: Arc<O>,
    phase: TransferPhase,
}

impl TransferSession<TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_observer(config, Arc::new(TracingObserver))
    }
}

impl<O: TransferObserver> TransferSession<O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(config: SessionConfig, observer: Arc<O>) -> Self {
        Self {
            config,
            observer,
            phase: TransferPhase::Idle,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    fn set_phase(&mut self, to: TransferPhase) {
        if self.phase != to {
            self.observer.on_event(&TransferEvent::PhaseChanged {
                from: self.phase,
                to,
            });
            self.phase = to;
        }
    }

    /// Report the outcome of a transfer step and pass it through.
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.observer.on_event(&TransferEvent::Error {
                message: format!("{:#}", e),
            });
            self.set_phase(TransferPhase::Error);
        }
        result
    }

    /// Send `data` over `io` with the configured protocol.
    ///
    /// Returns the number of payload bytes delivered.
    #[instrument(skip(self, io, data), fields(protocol = %self.config.protocol, len = data.len()))]
    pub fn send<C: ByteChannel>(&mut self, io: &mut C, data: &[u8]) -> Result<u32> {
        self.set_phase(TransferPhase::Transferring);
        let started = Instant::now();
        let result = self.run_send(io, data);
        let sent = self.settle(result)?;

        self.observer.on_event(&TransferEvent::Complete {
            direction: Direction::Send,
            bytes: u64::from(sent),
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        self.set_phase(TransferPhase::Complete);
        Ok(sent)
    }

    fn run_send<C: ByteChannel>(&self, io: &mut C, data: &[u8]) -> Result<u32> {
        let length = u32::try_from(data.len())
            .map_err(|_| anyhow!("Image of {} bytes is too large", data.len()))?;

        let base = match self.config.protocol {
            Protocol::Hex => self.config.load_address,
            Protocol::Xmodem | Protocol::Simple => 0,
        };
        let mut store = BufferMemory::from_bytes(base, data.to_vec());
        let mut mem = ObservableMemory::new(&mut store, &self.observer, Direction::Send, length);

        let sent = match self.config.protocol {
            Protocol::Hex => {
                self.config
                    .hex_codec()
                    .send(io, &mut mem, base, length)
                    .map_err(TransferError::from)?;
                length
            }
            Protocol::Xmodem => self
                .config
                .xmodem()
                .send(io, &mut mem, length)
                .map_err(TransferError::from)?,
            Protocol::Simple => self
                .config
                .simple()
                .send(io, &mut mem, length)
                .map_err(TransferError::from)?,
        };
        Ok(sent)
    }

    /// Receive one image over `io` with the configured protocol.
    ///
    /// Intel HEX images are flattened from their lowest address, with holes
    /// filled by 0xFF.
    #[instrument(skip(self, io), fields(protocol = %self.config.protocol))]
    pub fn receive<C: ByteChannel>(&mut self, io: &mut C) -> Result<Vec<u8>> {
        self.set_phase(TransferPhase::Transferring);
        let started = Instant::now();
        let result = self.run_receive(io);
        let image = self.settle(result)?;

        self.observer.on_event(&TransferEvent::Complete {
            direction: Direction::Receive,
            bytes: image.len() as u64,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        self.set_phase(TransferPhase::Complete);
        Ok(image)
    }

    fn run_receive<C: ByteChannel>(&self, io: &mut C) -> Result<Vec<u8>> {
        let capacity = self.config.capacity;

        let image = match self.config.protocol {
            Protocol::Hex => {
                let mut store = SparseMemory::with_span_limit(capacity);
                let mut mem = ObservableMemory::new(&mut store, &self.observer, Direction::Receive, 0);
                self.config
                    .hex_codec()
                    .receive(io, &mut mem)
                    .map_err(TransferError::from)?;
                let (base, image) = store.to_flat();
                info!(base = %format!("0x{:08X}", base), len = image.len(), "Hex image received");
                image
            }
            Protocol::Xmodem => {
                let mut store = BufferMemory::new(capacity);
                let mut mem = ObservableMemory::new(&mut store, &self.observer, Direction::Receive, 0);
                self.config
                    .xmodem()
                    .receive(io, &mut mem)
                    .map_err(TransferError::from)?;
                let mut image = store.into_inner();
                if self.config.trim_padding {
                    let len = trim_padding(&image).len();
                    image.truncate(len);
                }
                image
            }
            Protocol::Simple => {
                let mut store = BufferMemory::new(capacity);
                let mut mem = ObservableMemory::new(&mut store, &self.observer, Direction::Receive, 0);
                self.config
                    .simple()
                    .receive(io, &mut mem)
                    .map_err(TransferError::from)?;
                store.into_inner()
            }
        };
        Ok(image)
    }

    /// Send a file over the configured serial port.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn send_file<P: AsRef<Path>>(&mut self, path: P) -> Result<u32> {
        let path = path.as_ref();
        let data =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        info!(bytes = data.len(), protocol = %self.config.protocol, "Loaded image");

        let mut port = self.connect()?;
        self.send(&mut port, &data)
    }

    /// Receive into a file over the configured serial port.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn receive_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let mut port = self.connect()?;
        let image = self.receive(&mut port)?;

        self.set_phase(TransferPhase::Finalizing);
        let written = std::fs::write(path, &image)
            .with_context(|| format!("Failed to write {}", path.display()));
        self.settle(written)?;
        self.set_phase(TransferPhase::Complete);

        info!(bytes = image.len(), path = %path.display(), "Image saved");
        Ok(image.len())
    }

    /// Open the port and type the preamble, if any.
    fn connect(&mut self) -> Result<SerialChannel> {
        self.set_phase(TransferPhase::Connecting);
        let result = self.open_port();
        self.settle(result)
    }

    fn open_port(&self) -> Result<SerialChannel> {
        let name = self
            .config
            .port
            .as_deref()
            .ok_or_else(|| anyhow!("No serial port configured"))?;
        let mut port = SerialChannel::open(name, self.config.baud)?;

        if let Some(preamble) = &self.config.preamble {
            port.put_bytes(preamble.as_bytes())?;
            port.flush()?;
            debug!(preamble = %preamble.escape_debug(), "Sent preamble");
            thread::sleep(Duration::from_millis(self.config.settle_ms));
            let echoed = port.discard_input()?;
            self.observer.on_event(&TransferEvent::Log {
                level: LogLevel::Debug,
                message: format!("Discarded {} bytes of preamble echo", echoed),
            });
        }
        Ok(port)
    }

    /// Convert a binary file into Intel HEX at the configured load address.
    #[instrument(skip(self, input, output))]
    pub fn bin_to_hex<P: AsRef<Path>, Q: AsRef<Path>>(&mut self, input: P, output: Q) -> Result<()> {
        let (input, output) = (input.as_ref(), output.as_ref());
        self.set_phase(TransferPhase::Finalizing);
        let result = self.convert_to_hex(input, output);
        self.settle(result)?;
        self.set_phase(TransferPhase::Complete);
        Ok(())
    }

    fn convert_to_hex(&self, input: &Path, output: &Path) -> Result<()> {
        let data =
            std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
        let length = u32::try_from(data.len())
            .map_err(|_| anyhow!("Image of {} bytes is too large", data.len()))?;
        let base = self.config.load_address;
        if u64::from(base) + u64::from(length) > 1 << 32 {
            return Err(anyhow!(
                "Image of {} bytes does not fit above 0x{:08X}",
                length,
                base
            ));
        }

        let file = File::create(output)
            .with_context(|| format!("Failed to create {}", output.display()))?;
        let mut io = StreamChannel::new(io::empty(), file);
        let mut mem = BufferMemory::from_bytes(base, data);
        self.config
            .hex_codec()
            .send(&mut io, &mut mem, base, length)
            .map_err(TransferError::from)?;
        io.into_writer()?.flush()?;

        info!(
            input = %input.display(),
            output = %output.display(),
            base = %format!("0x{:08X}", base),
            bytes = length,
            "Converted binary to Intel HEX"
        );
        Ok(())
    }

    /// Convert an Intel HEX file into a flat binary.
    ///
    /// Returns the address of the first byte of the binary.
    #[instrument(skip(self, input, output))]
    pub fn hex_to_bin<P: AsRef<Path>, Q: AsRef<Path>>(&mut self, input: P, output: Q) -> Result<u32> {
        let (input, output) = (input.as_ref(), output.as_ref());
        self.set_phase(TransferPhase::Finalizing);
        let result = self.convert_to_bin(input, output);
        let base = self.settle(result)?;
        self.set_phase(TransferPhase::Complete);
        Ok(base)
    }

    fn convert_to_bin(&self, input: &Path, output: &Path) -> Result<u32> {
        let file =
            File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
        let mut io = StreamChannel::new(file, io::sink());
        let mut image = SparseMemory::with_span_limit(self.config.capacity);
        self.config
            .hex_codec()
            .receive(&mut io, &mut image)
            .map_err(TransferError::from)?;

        let (base, data) = image.to_flat();
        std::fs::write(output, &data)
            .with_context(|| format!("Failed to write {}", output.display()))?;

        info!(
            input = %input.display(),
            output = %output.display(),
            base = %format!("0x{:08X}", base),
            bytes = data.len(),
            "Converted Intel HEX to binary"
        );
        Ok(base)
    }
}

/// Memory wrapper that emits progress events.
struct ObservableMemory<'a, M: Memory, O: TransferObserver> {
    inner: &'a mut M,
    observer: &'a Arc<O>,
    direction: Direction,
    total: u32,
    moved: u64,
}

impl<'a, M: Memory, O: TransferObserver> ObservableMemory<'a, M, O> {
    fn new(inner: &'a mut M, observer: &'a Arc<O>, direction: Direction, total: u32) -> Self {
        Self {
            inner,
            observer,
            direction,
            total,
            moved: 0,
        }
    }

    fn report(&mut self, len: usize) {
        self.moved += len as u64;
        self.observer.on_event(&TransferEvent::Progress {
            direction: self.direction,
            current: self.moved,
            total: u64::from(self.total),
        });
    }
}

impl<'a, M: Memory, O: TransferObserver> Memory for ObservableMemory<'a, M, O> {
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), MemoryError> {
        self.inner.write(address, data)?;
        self.report(data.len());
        Ok(())
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        self.inner.read(address, buf)?;
        self.report(buf.len());
        Ok(())
    }

    fn capacity(&self) -> u32 {
        self.inner.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::protocol::constants::{PAD, XMODEM_BLOCK_SIZE};
    use crate::transport::PipeChannel;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<TransferEvent>>,
    }

    impl TransferObserver for Recorder {
        fn on_event(&self, event: &TransferEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn fast_config(protocol: Protocol) -> SessionConfig {
        SessionConfig {
            protocol,
            capacity: 64 * 1024,
            hex_timeout_ms: 1_000,
            xmodem_init_timeout_ms: 1_000,
            xmodem_block_timeout_ms: 2_000,
            xmodem_char_timeout_ms: 500,
            simple_ready_timeout_ms: 2_000,
            simple_timeout_ms: 1_000,
            ..Default::default()
        }
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("xfer-{}-{}", std::process::id(), name))
    }

    fn round_trip(protocol: Protocol, data: &[u8]) -> Vec<u8> {
        let (mut tx_end, mut rx_end) = PipeChannel::pair();
        let payload = data.to_vec();
        let sender = thread::spawn(move || {
            let mut session =
                TransferSession::with_observer(fast_config(protocol), Arc::new(NullObserver));
            session.send(&mut tx_end, &payload)
        });

        let mut receiver =
            TransferSession::with_observer(fast_config(protocol), Arc::new(NullObserver));
        let image = receiver.receive(&mut rx_end).unwrap();
        assert_eq!(sender.join().unwrap().unwrap() as usize, data.len());
        image
    }

    #[test]
    fn test_protocol_parse() {
        assert_eq!("hex".parse::<Protocol>().unwrap(), Protocol::Hex);
        assert_eq!("XMODEM".parse::<Protocol>().unwrap(), Protocol::Xmodem);
        assert_eq!("simple".parse::<Protocol>().unwrap(), Protocol::Simple);
        assert!("kermit".parse::<Protocol>().is_err());
        assert_eq!(Protocol::Simple.to_string(), "simple");
    }

    #[test]
    fn test_config_round_trip_through_file() {
        let path = temp_path("config.toml");
        let config = SessionConfig {
            port: Some("/dev/ttyUSB0".to_string()),
            protocol: Protocol::Simple,
            preamble: Some("upload\r".to_string()),
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        let loaded = SessionConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_partial_file_uses_defaults() {
        let config: SessionConfig = toml::from_str("protocol = \"hex\"\nbaud = 9600\n").unwrap();
        assert_eq!(config.protocol, Protocol::Hex);
        assert_eq!(config.baud, 9600);
        assert_eq!(config.capacity, SessionConfig::default().capacity);
        assert!(config.port.is_none());
    }

    #[test]
    fn test_session_round_trip_each_protocol() {
        let data: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        for protocol in [Protocol::Hex, Protocol::Xmodem, Protocol::Simple] {
            assert_eq!(round_trip(protocol, &data), data, "{}", protocol);
        }
    }

    #[test]
    fn test_xmodem_padding_kept_when_asked() {
        let (mut tx_end, mut rx_end) = PipeChannel::pair();
        let sender = thread::spawn(move || {
            let mut session = TransferSession::with_observer(
                fast_config(Protocol::Xmodem),
                Arc::new(NullObserver),
            );
            session.send(&mut tx_end, &[1, 2, 3])
        });

        let config = SessionConfig {
            trim_padding: false,
            ..fast_config(Protocol::Xmodem)
        };
        let mut receiver = TransferSession::with_observer(config, Arc::new(NullObserver));
        let image = receiver.receive(&mut rx_end).unwrap();
        sender.join().unwrap().unwrap();

        assert_eq!(image.len(), XMODEM_BLOCK_SIZE);
        assert_eq!(&image[..3], &[1, 2, 3]);
        assert_eq!(image[3], PAD);
    }

    #[test]
    fn test_events_on_success() {
        let recorder = Arc::new(Recorder::default());
        let mut session =
            TransferSession::with_observer(fast_config(Protocol::Hex), recorder.clone());
        let mut sink = StreamChannel::new(io::empty(), Vec::new());
        session.send(&mut sink, &[0xAA; 40]).unwrap();
        assert_eq!(session.phase(), TransferPhase::Complete);

        let events = recorder.events.lock().unwrap();
        let progress: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                TransferEvent::Progress { current, total, .. } => {
                    assert_eq!(*total, 40);
                    Some(*current)
                }
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![16, 32, 40]);
        assert!(matches!(
            events.last(),
            Some(TransferEvent::PhaseChanged {
                to: TransferPhase::Complete,
                ..
            })
        ));
        assert!(events.iter().any(|e| matches!(
            e,
            TransferEvent::Complete {
                direction: Direction::Send,
                bytes: 40,
                ..
            }
        )));
    }

    #[test]
    fn test_events_on_failure() {
        let recorder = Arc::new(Recorder::default());
        let mut session =
            TransferSession::with_observer(fast_config(Protocol::Hex), recorder.clone());
        let mut channel = crate::transport::MockChannel::with_reads(b":00000002FE\r\n");

        let err = session.receive(&mut channel).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TransferError>(),
            Some(TransferError::Hex(HexError::UnsupportedRecord(2)))
        ));
        assert_eq!(session.phase(), TransferPhase::Error);
        assert!(
            recorder
                .events
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, TransferEvent::Error { .. }))
        );
    }

    #[test]
    fn test_hex_receive_respects_capacity() {
        let mut config = fast_config(Protocol::Hex);
        config.capacity = 4;
        let mut session = TransferSession::with_observer(config, Arc::new(NullObserver));
        let mut channel =
            crate::transport::MockChannel::with_reads(b":050000000102030405EC\r\n:00000001FF\r\n");
        assert!(session.receive(&mut channel).is_err());
    }

    #[test]
    fn test_hex_receive_rejects_wide_address_gap() {
        let mut config = fast_config(Protocol::Hex);
        config.capacity = 4;
        let mut session = TransferSession::with_observer(config, Arc::new(NullObserver));
        // one byte at 0x0, one at 0x4000_0000
        let mut channel = crate::transport::MockChannel::with_reads(
            b":0100000011EE\r\n:020000044000BA\r\n:0100000022DD\r\n:00000001FF\r\n",
        );
        let err = session.receive(&mut channel).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TransferError>(),
            Some(TransferError::Hex(HexError::Memory(MemoryError::SpanExceeded {
                address: 0x4000_0000,
                limit: 4,
                ..
            })))
        ));
    }

    #[test]
    fn test_error_chain_names_each_cause_once() {
        let err = anyhow::Error::from(TransferError::from(HexError::Cancelled));
        assert_eq!(format!("{:#}", err), "Intel HEX transfer failed: Transfer cancelled");

        let err = anyhow::Error::from(TransferError::from(XmodemError::from(
            MemoryError::OutOfBounds { address: 0x10, len: 2 },
        )));
        assert_eq!(
            format!("{:#}", err),
            "XMODEM transfer failed: Access of 2 bytes at 0x00000010 is outside the region"
        );
    }

    #[test]
    fn test_hex_to_bin_without_trailing_newline() {
        let hex = temp_path("nonl.hex");
        let bin = temp_path("nonl.bin");
        std::fs::write(&hex, ":0300300002337A1E\r\n:00000001FF").unwrap();

        let mut session = TransferSession::with_observer(SessionConfig::default(), Arc::new(NullObserver));
        let base = session.hex_to_bin(&hex, &bin).unwrap();
        assert_eq!(base, 0x30);
        assert_eq!(std::fs::read(&bin).unwrap(), [0x02, 0x33, 0x7A]);

        for path in [&hex, &bin] {
            std::fs::remove_file(path).unwrap();
        }
    }

    #[test]
    fn test_hex_to_bin_bounded_by_capacity() {
        let hex = temp_path("gap.hex");
        let bin = temp_path("gap.bin");
        std::fs::write(
            &hex,
            ":0100000011EE\r\n:020000044000BA\r\n:0100000022DD\r\n:00000001FF\r\n",
        )
        .unwrap();

        let config = SessionConfig {
            capacity: 4,
            ..Default::default()
        };
        let mut session = TransferSession::with_observer(config, Arc::new(NullObserver));
        let err = session.hex_to_bin(&hex, &bin).unwrap_err();
        std::fs::remove_file(&hex).unwrap();
        assert!(!bin.exists());
        assert!(matches!(
            err.downcast_ref::<TransferError>(),
            Some(TransferError::Hex(HexError::Memory(MemoryError::SpanExceeded { .. })))
        ));
        assert_eq!(session.phase(), TransferPhase::Error);
    }

    #[test]
    fn test_file_conversions() {
        let bin = temp_path("image.bin");
        let hex = temp_path("image.hex");
        let back = temp_path("image.out");
        let data: Vec<u8> = (0..100u8).collect();
        std::fs::write(&bin, &data).unwrap();

        let config = SessionConfig {
            load_address: 0x0800_FFF0,
            ..Default::default()
        };
        let mut session = TransferSession::with_observer(config, Arc::new(NullObserver));
        session.bin_to_hex(&bin, &hex).unwrap();

        let text = std::fs::read_to_string(&hex).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], ":020000040800F2");
        assert_eq!(lines[2], ":020000040801F1");
        assert_eq!(*lines.last().unwrap(), ":00000001FF");

        let base = session.hex_to_bin(&hex, &back).unwrap();
        assert_eq!(base, 0x0800_FFF0);
        assert_eq!(std::fs::read(&back).unwrap(), data);

        for path in [&bin, &hex, &back] {
            std::fs::remove_file(path).unwrap();
        }
    }

    #[test]
    fn test_send_file_without_port_fails() {
        let path = temp_path("noport.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        let mut session = TransferSession::with_observer(SessionConfig::default(), Arc::new(NullObserver));
        let err = session.send_file(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(err.to_string().contains("No serial port"));
        assert_eq!(session.phase(), TransferPhase::Error);
    }
}
