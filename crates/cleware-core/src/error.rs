//! Error taxonomy for device sessions and control transfers.

use thiserror::Error;

use crate::bus::{BusError, BusOp};
use crate::protocol::constants::{EXIT_NO_DEVICE, LIBUSB_ERROR_INVALID_PARAM};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsbError {
    #[error("No device matching {vendor_id:04x}:{product_id:04x}{}", serial_suffix(.serial))]
    NotFound {
        vendor_id: u16,
        product_id: u16,
        serial: Option<String>,
    },

    #[error("Failed to {op}: {source}")]
    Bus {
        op: BusOp,
        #[source]
        source: BusError,
    },

    #[error("{op} timed out after {timeout_ms}ms (status {code})")]
    Timeout { op: BusOp, timeout_ms: u64, code: i32 },

    #[error("Invalid output port {0} (expected 0-15)")]
    InvalidPort(u8),

    #[error("Invalid indicator {0} (expected 0-3)")]
    InvalidIndicator(u8),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

fn serial_suffix(serial: &Option<String>) -> String {
    match serial {
        Some(s) => format!(" with serial {}", s),
        None => String::new(),
    }
}

impl UsbError {
    pub fn bus(op: BusOp, source: BusError) -> Self {
        UsbError::Bus { op, source }
    }

    /// Process exit status for this failure.
    ///
    /// Bus failures surface the libusb status unchanged.
    pub fn exit_code(&self) -> i32 {
        match self {
            UsbError::NotFound { .. } => EXIT_NO_DEVICE,
            UsbError::Bus { source, .. } => source.code(),
            UsbError::Timeout { code, .. } => *code,
            UsbError::InvalidPort(_)
            | UsbError::InvalidIndicator(_)
            | UsbError::InvalidRequest(_) => LIBUSB_ERROR_INVALID_PARAM,
        }
    }

    /// The bus operation that failed, if any.
    pub fn op(&self) -> Option<BusOp> {
        match self {
            UsbError::Bus { op, .. } | UsbError::Timeout { op, .. } => Some(*op),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, UsbError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let not_found = UsbError::NotFound {
            vendor_id: 0x0D50,
            product_id: 0x0008,
            serial: None,
        };
        assert_eq!(not_found.exit_code(), -19);
        assert_eq!(UsbError::bus(BusOp::ClaimInterface, BusError::status(-6)).exit_code(), -6);
        assert_eq!(UsbError::InvalidPort(16).exit_code(), -2);
    }

    #[test]
    fn test_messages_name_the_failing_step() {
        let err = UsbError::bus(BusOp::SetConfiguration, BusError::status(-4));
        assert_eq!(err.to_string(), "Failed to set configuration: bus status -4");

        let err = UsbError::NotFound {
            vendor_id: 0x0D50,
            product_id: 0x0008,
            serial: Some("1234".into()),
        };
        assert_eq!(err.to_string(), "No device matching 0d50:0008 with serial 1234");
    }
}
