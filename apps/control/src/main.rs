use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use cleware_core::{
    RawRequest, RusbBus, SetupPacket, ToolConfig, TracingObserver, UsbError, UsbObserver,
    commands,
};
use tracing::{debug, error};

#[derive(Parser, Debug)]
#[command(author, version, about = "Send raw USB control messages", long_about = None)]
struct Args {
    /// Device to talk to, as VID:PID in hex
    #[arg(short = 'D', long, value_parser = parse_device)]
    device: DeviceId,

    /// Request type field for setup packet (hex)
    #[arg(short = 't', long = "bmRequestType", value_parser = parse_hex_u8, default_value = "0")]
    request_type: u8,

    /// Request field for setup packet (hex)
    #[arg(short = 'r', long = "bRequest", value_parser = parse_hex_u8, default_value = "0")]
    request: u8,

    /// Value field for setup packet (hex)
    #[arg(short = 'v', long = "wValue", value_parser = parse_hex_u16, default_value = "0")]
    value: u16,

    /// Index field for setup packet (hex)
    #[arg(short = 'i', long = "wIndex", value_parser = parse_hex_u16, default_value = "0")]
    index: u16,

    /// Length field for setup packet (decimal)
    #[arg(short = 'l', long = "wLength", default_value_t = 0)]
    length: u16,

    /// Number of times to issue the same request
    #[arg(short, long, default_value_t = 1)]
    count: u32,

    /// Claim the interface named by wIndex before sending
    #[arg(long)]
    claim: bool,

    /// Enable debugging
    #[arg(short, long)]
    debug: bool,

    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn setup(&self) -> SetupPacket {
        SetupPacket::new(
            self.request_type,
            self.request,
            self.value,
            self.index,
            self.length,
        )
    }

    /// SET_INTERFACE always claims the interface it selects.
    fn raw_request(&self) -> Result<RawRequest, UsbError> {
        let setup = self.setup();
        let claim_interface = if self.claim || setup.is_set_interface() {
            let interface = u8::try_from(self.index).map_err(|_| {
                UsbError::InvalidRequest(format!(
                    "wIndex 0x{:04x} is not an interface number",
                    self.index
                ))
            })?;
            Some(interface)
        } else {
            None
        };
        Ok(RawRequest {
            vendor_id: self.device.vendor_id,
            product_id: self.device.product_id,
            setup,
            count: self.count,
            claim_interface,
        })
    }
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

fn parse_hex_u8(s: &str) -> Result<u8, String> {
    u8::from_str_radix(strip_hex_prefix(s), 16).map_err(|e| format!("invalid hex byte '{}': {}", s, e))
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    u16::from_str_radix(strip_hex_prefix(s), 16)
        .map_err(|e| format!("invalid hex word '{}': {}", s, e))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DeviceId {
    vendor_id: u16,
    product_id: u16,
}

fn parse_device(s: &str) -> Result<DeviceId, String> {
    let (vid, pid) = s
        .split_once(':')
        .ok_or_else(|| format!("expected VID:PID, got '{}'", s))?;
    Ok(DeviceId {
        vendor_id: parse_hex_u16(vid)?,
        product_id: parse_hex_u16(pid)?,
    })
}

/// `dumping N byte(s)` followed by the bytes, 16 per line.
fn hexdump(data: &[u8]) -> String {
    let mut out = format!(
        "dumping {} byte{}\n",
        data.len(),
        if data.len() > 1 { "s" } else { "" }
    );
    for line in data.chunks(16) {
        let hex: Vec<String> = line.iter().map(|b| format!("{:02x}", b)).collect();
        out.push_str(&hex.join(" "));
        out.push('\n');
    }
    out
}

fn load_config(args: &Args) -> anyhow::Result<ToolConfig> {
    let mut config = match &args.config {
        Some(path) => ToolConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ToolConfig::default(),
    };
    if args.debug {
        config.debug = true;
    }
    Ok(config)
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

    let request = match args.raw_request() {
        Ok(request) => request,
        Err(e) => {
            error!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    };
    debug!(setup = %request.setup, count = request.count, claim = ?request.claim_interface, "Sending");

    let result = commands::raw_control(&bus, &config, &request, observer, |outcome| {
        if !outcome.data().is_empty() {
            print!("{}", hexdump(outcome.data()));
        }
    });
    if let Err(e) = result {
        error!("control message failed --> {} ({})", e.exit_code(), e);
        std::process::exit(e.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device() {
        assert_eq!(
            parse_device("0d50:0008"),
            Ok(DeviceId {
                vendor_id: 0x0D50,
                product_id: 0x0008
            })
        );
        assert_eq!(parse_device("0x1d6b:0x0002").unwrap().product_id, 0x0002);
        assert!(parse_device("0d50").is_err());
        assert!(parse_device("0d50:zz").is_err());
        assert!(parse_device("10000:0001").is_err());
    }

    #[test]
    fn test_fields_are_hex_and_length_is_decimal() {
        let args = Args::try_parse_from([
            "usb-control", "-D", "0d50:0008", "-t", "80", "-r", "06", "-v", "0100", "-i", "0",
            "-l", "18",
        ])
        .unwrap();
        assert_eq!(args.setup(), SetupPacket::new(0x80, 0x06, 0x0100, 0x0000, 18));
        assert_eq!(args.count, 1);
    }

    #[test]
    fn test_device_is_required() {
        assert!(Args::try_parse_from(["usb-control", "-t", "80"]).is_err());
    }

    #[test]
    fn test_set_interface_claims_index() {
        let args = Args::try_parse_from([
            "usb-control", "-D", "0d50:0008", "-t", "01", "-r", "0b", "-v", "1", "-i", "2",
        ])
        .unwrap();
        assert_eq!(args.raw_request().unwrap().claim_interface, Some(2));
    }

    #[test]
    fn test_claim_is_opt_in_for_other_requests() {
        let args =
            Args::try_parse_from(["usb-control", "-D", "0d50:0008", "-t", "c0", "-c", "3"]).unwrap();
        let request = args.raw_request().unwrap();
        assert_eq!(request.claim_interface, None);
        assert_eq!(request.count, 3);

        let args = Args::try_parse_from([
            "usb-control", "-D", "0d50:0008", "-t", "c0", "-i", "1", "--claim",
        ])
        .unwrap();
        assert_eq!(args.raw_request().unwrap().claim_interface, Some(1));
    }

    #[test]
    fn test_claim_rejects_index_beyond_interface_range() {
        let args = Args::try_parse_from([
            "usb-control", "-D", "0d50:0008", "-t", "c0", "-i", "100", "--claim",
        ])
        .unwrap();
        let err = args.raw_request().unwrap_err();
        assert!(matches!(err, UsbError::InvalidRequest(_)));
        assert_eq!(err.exit_code(), -2);

        // Without a claim wIndex is only a setup field.
        let args =
            Args::try_parse_from(["usb-control", "-D", "0d50:0008", "-t", "c0", "-i", "100"])
                .unwrap();
        assert_eq!(args.raw_request().unwrap().setup.index, 0x0100);
    }

    #[test]
    fn test_hexdump_layout() {
        assert_eq!(hexdump(&[0xAB]), "dumping 1 byte\nab\n");

        let data: Vec<u8> = (0..18).collect();
        assert_eq!(
            hexdump(&data),
            "dumping 18 bytes\n\
             00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f\n\
             10 11\n"
        );
    }
}
