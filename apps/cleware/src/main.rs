use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgGroup, Parser};
use cleware_core::{RusbBus, ToolConfig, TracingObserver, UsbObserver, commands};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Cleware USB power switch control", long_about = None)]
#[command(group(ArgGroup::new("state").args(["on", "off"])))]
struct Args {
    /// Switch the port on
    #[arg(long, short = '1')]
    on: bool,

    /// Switch the port off (default)
    #[arg(long, short = '0')]
    off: bool,

    /// 0-based port number
    #[arg(short, long, default_value_t = 0)]
    port: u8,

    /// Device's serial number, matched against the serial string (an `0x` prefix is ignored)
    #[arg(short, long = "serial-number")]
    serial: Option<String>,

    /// List matching devices and exit
    #[arg(short, long)]
    list: bool,

    /// Enable debugging
    #[arg(short, long)]
    debug: bool,

    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Config file values, overridden by command-line flags.
fn load_config(args: &Args) -> anyhow::Result<ToolConfig> {
    let mut config = match &args.config {
        Some(path) => ToolConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ToolConfig::default(),
    };
    if args.debug {
        config.debug = true;
    }
    if let Some(serial) = &args.serial {
        config.serial = Some(serial_string(serial).to_string());
    }
    Ok(config)
}

/// Serial numbers are given in hex; the device reports the digits only.
fn serial_string(arg: &str) -> &str {
    arg.strip_prefix("0x")
        .or_else(|| arg.strip_prefix("0X"))
        .unwrap_or(arg)
}

fn init_tracing(debug: bool) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if debug {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(args.debug);
            error!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    init_tracing(config.debug);

    let bus = match RusbBus::new() {
        Ok(bus) => bus,
        Err(e) => {
            error!("Failed to initialize libusb: {}", e);
            std::process::exit(e.code());
        }
    };
    let observer: Arc<dyn UsbObserver> = Arc::new(TracingObserver::new(config.debug));

    if args.list {
        match commands::list(&bus, &config, observer) {
            Ok(devices) => {
                for device in devices {
                    println!(
                        "{}\t{}",
                        device.descriptor,
                        device.product.as_deref().unwrap_or("")
                    );
                }
            }
            Err(e) => {
                error!("Error: {}", e);
                std::process::exit(e.exit_code());
            }
        }
        return;
    }

    info!(
        port = args.port,
        state = if args.on { "on" } else { "off" },
        "Switching"
    );
    if let Err(e) = commands::power(&bus, &config, args.port, args.on, observer) {
        error!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_and_off_flags() {
        let args = Args::try_parse_from(["cleware", "--on"]).unwrap();
        assert!(args.on);
        let args = Args::try_parse_from(["cleware", "-1"]).unwrap();
        assert!(args.on);
        let args = Args::try_parse_from(["cleware", "-0"]).unwrap();
        assert!(!args.on && args.off);
    }

    #[test]
    fn test_default_is_off_on_port_zero() {
        let args = Args::try_parse_from(["cleware"]).unwrap();
        assert!(!args.on);
        assert_eq!(args.port, 0);
        assert!(args.serial.is_none());
    }

    #[test]
    fn test_on_conflicts_with_off() {
        assert!(Args::try_parse_from(["cleware", "--on", "--off"]).is_err());
    }

    #[test]
    fn test_port_and_serial() {
        let args =
            Args::try_parse_from(["cleware", "-p", "3", "-s", "0x1234", "--on"]).unwrap();
        assert_eq!(args.port, 3);
        assert_eq!(args.serial.as_deref(), Some("0x1234"));
    }

    #[test]
    fn test_serial_hex_prefix_is_stripped() {
        let args = Args::try_parse_from(["cleware", "-s", "0x1234"]).unwrap();
        assert_eq!(load_config(&args).unwrap().serial.as_deref(), Some("1234"));

        let args = Args::try_parse_from(["cleware", "-s", "00A7"]).unwrap();
        assert_eq!(load_config(&args).unwrap().serial.as_deref(), Some("00A7"));
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cleware.toml");
        ToolConfig {
            serial: Some("AAAA".into()),
            ..Default::default()
        }
        .save_to_file(&file)
        .unwrap();

        let path = file.to_string_lossy().to_string();
        let args = Args::try_parse_from(["cleware", "--config", &path, "-s", "BBBB", "-d"]).unwrap();
        let config = load_config(&args).unwrap();

        assert_eq!(config.serial.as_deref(), Some("BBBB"));
        assert!(config.debug);
        assert_eq!(config.vendor_id, 0x0D50);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let args =
            Args::try_parse_from(["cleware", "--config", "/nonexistent/cleware.toml"]).unwrap();
        assert!(load_config(&args).is_err());
    }
}
