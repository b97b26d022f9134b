//! Tool configuration.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::protocol::constants::*;

/// Configuration shared by the switch and raw-control tools.
///
/// Every field has a default, so a config file only lists what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Log every session step and transfer.
    pub debug: bool,
    /// Vendor ID of the switch to look for.
    pub vendor_id: u16,
    /// Product ID of the switch to look for.
    pub product_id: u16,
    /// Only accept the device with this serial number.
    pub serial: Option<String>,
    /// Timeout for switch and indicator commands.
    pub control_timeout_ms: u64,
    /// Timeout for raw control messages.
    pub raw_timeout_ms: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            debug: false,
            vendor_id: CLEWARE_VENDOR_ID,
            product_id: CLEWARE_USB_SWITCH,
            serial: None,
            control_timeout_ms: DEVICE_CONTROL_TIMEOUT_MS,
            raw_timeout_ms: RAW_CONTROL_TIMEOUT_MS,
        }
    }
}

impl ToolConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ToolConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }

    pub fn raw_timeout(&self) -> Duration {
        Duration::from_millis(self.raw_timeout_ms)
    }
}
