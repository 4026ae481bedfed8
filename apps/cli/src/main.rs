use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use xfer_core::session::{Protocol, SessionConfig, TransferSession};

#[derive(Parser, Debug)]
#[command(author, version, about = "Serial image transfer tool (Intel HEX, XMODEM-1K, Simple Upload)", long_about = None)]
struct Args {
    /// Serial port (e.g. /dev/ttyUSB0, COM3)
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// TOML configuration file; flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a binary image to the device
    Send {
        file: PathBuf,
        /// hex, xmodem or simple
        #[arg(long)]
        protocol: Option<Protocol>,
        /// Load address for Intel HEX (decimal or 0x-prefixed)
        #[arg(long, value_parser = parse_u32)]
        address: Option<u32>,
        /// Shell command typed before the handshake, e.g. "upload\r"
        #[arg(long)]
        preamble: Option<String>,
    },
    /// Receive an image from the device
    Receive {
        file: PathBuf,
        /// hex, xmodem or simple
        #[arg(long)]
        protocol: Option<Protocol>,
        /// Largest image to accept, in bytes (decimal or 0x-prefixed)
        #[arg(long, value_parser = parse_u32)]
        capacity: Option<u32>,
        /// Keep XMODEM padding at the end of the image
        #[arg(long)]
        keep_padding: bool,
    },
    /// List available serial ports
    ListPorts,
    /// Convert a binary file to Intel HEX
    Bin2hex {
        input: PathBuf,
        output: PathBuf,
        /// Load address (decimal or 0x-prefixed)
        #[arg(long, value_parser = parse_u32)]
        address: Option<u32>,
    },
    /// Convert an Intel HEX file to a flat binary
    Hex2bin {
        input: PathBuf,
        output: PathBuf,
        /// Largest image to produce, in bytes (decimal or 0x-prefixed)
        #[arg(long, value_parser = parse_u32)]
        capacity: Option<u32>,
    },
    /// Write the effective configuration to a TOML file
    SaveConfig { output: PathBuf },
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(digits) => u32::from_str_radix(&digits.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

/// Unescape `\r`, `\n` and `\t` so preambles can be given on the command line.
fn unescape(s: &str) -> String {
    s.replace("\\r", "\r").replace("\\n", "\n").replace("\\t", "\t")
}

fn load_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(port) = &args.port {
        config.port = Some(port.clone());
    }
    if let Some(baud) = args.baud {
        config.baud = baud;
    }
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let mut config = load_config(&args)?;

    match args.command {
        Command::Send {
            file,
            protocol,
            address,
            preamble,
        } => {
            config.protocol = protocol.unwrap_or(config.protocol);
            config.load_address = address.unwrap_or(config.load_address);
            if let Some(preamble) = preamble {
                config.preamble = Some(unescape(&preamble));
            }
            let sent = TransferSession::new(config).send_file(&file)?;
            info!(bytes = sent, file = %file.display(), "Send finished");
        }
        Command::Receive {
            file,
            protocol,
            capacity,
            keep_padding,
        } => {
            config.protocol = protocol.unwrap_or(config.protocol);
            config.capacity = capacity.unwrap_or(config.capacity);
            if keep_padding {
                config.trim_padding = false;
            }
            let received = TransferSession::new(config).receive_file(&file)?;
            info!(bytes = received, file = %file.display(), "Receive finished");
        }
        Command::ListPorts => {
            let ports = xfer_core::list_ports()?;
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                println!("{}", port);
            }
        }
        Command::Bin2hex {
            input,
            output,
            address,
        } => {
            config.load_address = address.unwrap_or(config.load_address);
            TransferSession::new(config).bin_to_hex(&input, &output)?;
        }
        Command::Hex2bin {
            input,
            output,
            capacity,
        } => {
            config.capacity = capacity.unwrap_or(config.capacity);
            let base = TransferSession::new(config).hex_to_bin(&input, &output)?;
            println!("Image starts at 0x{:08X}", base);
        }
        Command::SaveConfig { output } => {
            config.save_to_file(&output)?;
            info!(path = %output.display(), "Configuration saved");
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u32() {
        assert_eq!(parse_u32("4096").unwrap(), 4096);
        assert_eq!(parse_u32("0x0800_0000").unwrap(), 0x0800_0000);
        assert_eq!(parse_u32("0XFF").unwrap(), 0xFF);
        assert!(parse_u32("0xZZ").is_err());
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("upload\\r"), "upload\r");
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "xfer", "--port", "/dev/ttyUSB0", "send", "fw.bin", "--protocol", "simple",
        ])
        .unwrap();
        assert_eq!(args.port.as_deref(), Some("/dev/ttyUSB0"));
        match args.command {
            Command::Send { protocol, .. } => assert_eq!(protocol, Some(Protocol::Simple)),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_hex2bin_capacity() {
        let args =
            Args::try_parse_from(["xfer", "hex2bin", "in.hex", "out.bin", "--capacity", "0x100"]).unwrap();
        match args.command {
            Command::Hex2bin { capacity, .. } => assert_eq!(capacity, Some(0x100)),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from(["xfer", "list-ports", "--baud", "9600"]).unwrap();
        let config = load_config(&args).unwrap();
        assert_eq!(config.baud, 9600);
        assert_eq!(config.protocol, Protocol::Xmodem);
    }
}
