//! Pair with a MediaRemote device and open an encrypted control channel.
//!
//! Run with: cargo run --bin mediaremote-pair -- --host 192.168.0.42 --port 49152
//!
//! The first run against a device asks for the PIN it displays; later runs
//! reuse the stored pairing and only run pair-verify.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use mediaremote_core::DeviceConfig;
use mediaremote_pairing::{FileStore, PairingController, PinPrompt, StaticPin, StdinPrompt};
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

const DEFAULT_PORT: u16 = 49152;
const DEFAULT_CONFIG: &str = "mediaremote.json";
const DEFAULT_STORE: &str = "pairings";

struct Options {
    host: String,
    port: u16,
    device: Option<String>,
    config: PathBuf,
    store: PathBuf,
    pin: Option<String>,
    debug: bool,
}

fn usage(program: &str) {
    eprintln!("Usage: {} --host <addr> [OPTIONS]", program);
    eprintln!("\nOptions:");
    eprintln!("  --host <addr>     Device address (required)");
    eprintln!("  --port <port>     Device port (default: {})", DEFAULT_PORT);
    eprintln!("  --device <id>     Key for the stored pairing (default: host)");
    eprintln!("  --config <path>   Controller config file (default: {})", DEFAULT_CONFIG);
    eprintln!("  --store <dir>     Pairing record directory (default: {})", DEFAULT_STORE);
    eprintln!("  --pin <pin>       PIN to use instead of prompting");
    eprintln!("  --debug           Log at debug level");
    eprintln!("  --help            Show this message");
}

fn parse_args(args: &[String]) -> anyhow::Result<Option<Options>> {
    if args.iter().any(|a| a == "--help" || a == "-h") {
        return Ok(None);
    }

    let value = |flag: &str| -> Option<String> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };

    let host = match value("--host") {
        Some(host) => host,
        None => bail!("--host is required"),
    };
    let port = match value("--port") {
        Some(port) => port
            .parse()
            .with_context(|| format!("invalid port: {}", port))?,
        None => DEFAULT_PORT,
    };

    Ok(Some(Options {
        host,
        port,
        device: value("--device"),
        config: value("--config").unwrap_or_else(|| DEFAULT_CONFIG.to_string()).into(),
        store: value("--store").unwrap_or_else(|| DEFAULT_STORE.to_string()).into(),
        pin: value("--pin"),
        debug: args.iter().any(|a| a == "--debug"),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("mediaremote-pair");

    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => {
            usage(program);
            return Ok(());
        }
        Err(e) => {
            eprintln!("error: {}\n", e);
            usage(program);
            std::process::exit(2);
        }
    };

    let filter = if options.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let config = DeviceConfig::load_or_create(&options.config)
        .with_context(|| format!("loading {}", options.config.display()))?;
    tracing::info!(name = %config.name, device_id = %config.device_id, "Controller identity");

    let device_id = options.device.clone().unwrap_or_else(|| options.host.clone());
    let store = Arc::new(FileStore::new(&options.store));
    let controller = PairingController::new(store, config.pairing_id());

    let prompt: Box<dyn PinPrompt> = match options.pin.clone() {
        Some(pin) => Box::new(StaticPin::new(pin)),
        None => Box::new(StdinPrompt::default()),
    };

    let address = format!("{}:{}", options.host, options.port);
    tracing::info!(%address, "Connecting");
    let stream = TcpStream::connect(&address)
        .await
        .with_context(|| format!("connecting to {}", address))?;
    stream.set_nodelay(true)?;

    let mut channel = match controller.establish(stream, &device_id, prompt.as_ref()).await {
        Ok(channel) => channel,
        Err(e) if e.is_identity_mismatch() => {
            tracing::warn!(device_id = %device_id, error = %e, "Stored pairing is no longer valid");
            eprintln!("The device identity changed. Run again to pair from scratch.");
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("pairing failed"),
    };

    tracing::info!(device_id = %device_id, "Paired; waiting for messages (Ctrl-C to quit)");
    loop {
        tokio::select! {
            message = channel.recv() => match message? {
                Some(message) => {
                    tracing::info!(len = message.len(), "Received message");
                    tracing::debug!(payload = %hex_preview(&message), "Message payload");
                }
                None => {
                    tracing::info!("Device closed the connection");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                channel.close().await?;
                break;
            }
        }
    }

    Ok(())
}

fn hex_preview(data: &[u8]) -> String {
    let preview: String = data.iter().take(32).map(|b| format!("{:02x}", b)).collect();
    if data.len() > 32 {
        format!("{}...", preview)
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_defaults() {
        let options = parse_args(&args(&["pair", "--host", "10.0.0.2"])).unwrap().unwrap();
        assert_eq!(options.host, "10.0.0.2");
        assert_eq!(options.port, DEFAULT_PORT);
        assert_eq!(options.config, PathBuf::from(DEFAULT_CONFIG));
        assert_eq!(options.store, PathBuf::from(DEFAULT_STORE));
        assert!(options.device.is_none());
        assert!(options.pin.is_none());
        assert!(!options.debug);
    }

    #[test]
    fn parses_all_flags() {
        let options = parse_args(&args(&[
            "pair", "--host", "tv.local", "--port", "7000", "--device", "tv", "--pin", "1234",
            "--store", "/tmp/p", "--config", "/tmp/c.json", "--debug",
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(options.port, 7000);
        assert_eq!(options.device.as_deref(), Some("tv"));
        assert_eq!(options.pin.as_deref(), Some("1234"));
        assert_eq!(options.store, PathBuf::from("/tmp/p"));
        assert_eq!(options.config, PathBuf::from("/tmp/c.json"));
        assert!(options.debug);
    }

    #[test]
    fn rejects_missing_host_and_bad_port() {
        assert!(parse_args(&args(&["pair"])).is_err());
        assert!(parse_args(&args(&["pair", "--host", "h", "--port", "x"])).is_err());
    }

    #[test]
    fn help_short_circuits() {
        assert!(parse_args(&args(&["pair", "--help"])).unwrap().is_none());
    }

    #[test]
    fn hex_preview_truncates() {
        assert_eq!(hex_preview(&[0xab, 0x01]), "ab01");
        assert!(hex_preview(&[0u8; 40]).ends_with("..."));
    }
}
