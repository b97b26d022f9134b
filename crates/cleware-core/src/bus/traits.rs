//! Bus access layer abstraction.
//!
//! Defines the `UsbBus` and `BusHandle` traits the session and transfer
//! layers are written against, allowing different implementations
//! (rusb, mock, etc.).

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::device::DeviceDescriptor;
use crate::protocol::SetupPacket;
use crate::protocol::constants::LIBUSB_ERROR_TIMEOUT;

/// Failure reported by the bus layer, carrying the libusb-style negative status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("timed out (status {code})")]
    Timeout { code: i32 },

    #[error("bus status {code}")]
    Status { code: i32 },
}

impl BusError {
    pub fn timeout() -> Self {
        BusError::Timeout {
            code: LIBUSB_ERROR_TIMEOUT,
        }
    }

    pub fn status(code: i32) -> Self {
        BusError::Status { code }
    }

    /// Underlying negative status code.
    pub fn code(&self) -> i32 {
        match self {
            BusError::Timeout { code } | BusError::Status { code } => *code,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BusError::Timeout { .. })
    }
}

/// Bus-layer operations, used to name the failing step in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusOp {
    ListDevices,
    ReadDescriptor,
    Open,
    QueryDriver,
    DetachDriver,
    AttachDriver,
    SetConfiguration,
    ClaimInterface,
    ReleaseInterface,
    SetAltSetting,
    ReadString,
    ControlTransfer,
}

impl fmt::Display for BusOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusOp::ListDevices => write!(f, "list devices"),
            BusOp::ReadDescriptor => write!(f, "read device descriptor"),
            BusOp::Open => write!(f, "open device"),
            BusOp::QueryDriver => write!(f, "query kernel driver"),
            BusOp::DetachDriver => write!(f, "detach kernel driver"),
            BusOp::AttachDriver => write!(f, "reattach kernel driver"),
            BusOp::SetConfiguration => write!(f, "set configuration"),
            BusOp::ClaimInterface => write!(f, "claim interface"),
            BusOp::ReleaseInterface => write!(f, "release interface"),
            BusOp::SetAltSetting => write!(f, "set alternate setting"),
            BusOp::ReadString => write!(f, "read string descriptor"),
            BusOp::ControlTransfer => write!(f, "control transfer"),
        }
    }
}

/// Device discovery and opening.
pub trait UsbBus {
    /// Opaque reference to a device in a listing snapshot.
    type Device;
    /// Open handle; dropping it closes the device.
    type Handle: BusHandle;

    /// Snapshot of attached devices in bus-assigned order.
    fn devices(&self) -> Result<Vec<Self::Device>, BusError>;

    /// Read the device descriptor of a listed device.
    fn descriptor(&self, device: &Self::Device) -> Result<DeviceDescriptor, BusError>;

    /// Open a handle to a listed device.
    fn open(&self, device: &Self::Device) -> Result<Self::Handle, BusError>;
}

/// Operations on an open device handle.
pub trait BusHandle {
    /// Whether a kernel driver is bound to `interface`.
    fn kernel_driver_active(&mut self, interface: u8) -> Result<bool, BusError>;

    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), BusError>;

    fn attach_kernel_driver(&mut self, interface: u8) -> Result<(), BusError>;

    fn set_configuration(&mut self, config: u8) -> Result<(), BusError>;

    fn claim_interface(&mut self, interface: u8) -> Result<(), BusError>;

    fn release_interface(&mut self, interface: u8) -> Result<(), BusError>;

    fn set_alternate_setting(&mut self, interface: u8, setting: u8) -> Result<(), BusError>;

    /// Read string descriptor `index` in language `lang_id`.
    fn read_string_descriptor(
        &mut self,
        index: u8,
        lang_id: u16,
        timeout: Duration,
    ) -> Result<String, BusError>;

    /// Blocking control transfer. `buffer` is written for OUT requests and
    /// filled for IN requests; returns the number of bytes transferred.
    fn control_transfer(
        &mut self,
        setup: &SetupPacket,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, BusError>;
}
