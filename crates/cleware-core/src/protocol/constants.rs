//! Protocol constants for the Cleware USB power switch and libusb status codes.
//!
//! The switch command layout was sniffed from the manufacturer's example
//! application and is known to work with the Cleware "USB-Switch".

// ============================================================================
// Device Identification
// ============================================================================

/// Cleware GmbH Vendor ID
pub const CLEWARE_VENDOR_ID: u16 = 0x0D50;

/// Cleware USB-Switch Product ID
pub const CLEWARE_USB_SWITCH: u16 = 0x0008;

/// USB language ID for English (United States).
pub const LANG_ID_EN_US: u16 = 0x0409;

// ============================================================================
// Session Defaults
// ============================================================================

/// Interface the switch exposes its control reports on.
pub const SWITCH_INTERFACE: u8 = 0;

/// Configuration value selected before claiming.
pub const SWITCH_CONFIGURATION: u8 = 1;

/// Alternate setting selected after claiming.
pub const SWITCH_ALT_SETTING: u8 = 0;

/// Timeout for device-control operations (switch and indicator commands).
pub const DEVICE_CONTROL_TIMEOUT_MS: u64 = 1000;

/// Timeout for generic raw control messages.
pub const RAW_CONTROL_TIMEOUT_MS: u64 = 2000;

// ============================================================================
// Setup Packet Fields
// ============================================================================

/// bmRequestType: host-to-device, class request, interface recipient.
pub const REQUEST_TYPE_CLASS_INTERFACE_OUT: u8 = 0x21;

/// HID SET_REPORT.
pub const HID_SET_REPORT: u8 = 0x09;

/// wValue: report type Output (0x02), report ID 0.
pub const REPORT_OUTPUT: u16 = 0x0200;

/// bmRequestType of a standard interface request (host-to-device).
pub const REQUEST_TYPE_STANDARD_INTERFACE_OUT: u8 = 0x01;

/// Standard SET_INTERFACE request.
pub const REQUEST_SET_INTERFACE: u8 = 0x0B;

// ============================================================================
// Switch Report Layout
// ============================================================================

/// Size of every switch/indicator report.
pub const REPORT_SIZE: usize = 3;

/// Output port N is addressed as `SWITCH_BASE + N`.
pub const SWITCH_BASE: u8 = 0x10;

/// Highest addressable output port.
pub const MAX_OUTPUT_PORT: u8 = 15;

/// Highest addressable indicator.
pub const MAX_INDICATOR: u8 = 3;

pub const SWITCH_ON: u8 = 0x01;
pub const SWITCH_OFF: u8 = 0x00;

// Indicator polarity is inverted relative to the outputs.
pub const INDICATOR_ON: u8 = 0x00;
pub const INDICATOR_OFF: u8 = 0x0F;

// ============================================================================
// libusb Status Codes
// ============================================================================

pub const LIBUSB_ERROR_IO: i32 = -1;
pub const LIBUSB_ERROR_INVALID_PARAM: i32 = -2;
pub const LIBUSB_ERROR_ACCESS: i32 = -3;
pub const LIBUSB_ERROR_NO_DEVICE: i32 = -4;
pub const LIBUSB_ERROR_NOT_FOUND: i32 = -5;
pub const LIBUSB_ERROR_BUSY: i32 = -6;
pub const LIBUSB_ERROR_TIMEOUT: i32 = -7;
pub const LIBUSB_ERROR_OVERFLOW: i32 = -8;
pub const LIBUSB_ERROR_PIPE: i32 = -9;
pub const LIBUSB_ERROR_INTERRUPTED: i32 = -10;
pub const LIBUSB_ERROR_NO_MEM: i32 = -11;
pub const LIBUSB_ERROR_NOT_SUPPORTED: i32 = -12;
pub const LIBUSB_ERROR_OTHER: i32 = -99;

/// Exit status when no device matches (`-ENODEV`).
pub const EXIT_NO_DEVICE: i32 = -19;
