//! Bus access layer module.

pub mod libusb;
pub mod mock;
pub mod traits;

pub use libusb::{RusbBus, RusbHandle};
pub use mock::{BusCall, MockBus, MockDevice, MockHandle, MockResponse};
pub use traits::{BusError, BusHandle, BusOp, UsbBus};
