//! Device matching by id and serial number.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::bus::{BusHandle, BusOp, UsbBus};
use crate::device::{DeviceDescriptor, DeviceEntry};
use crate::error::UsbError;
use crate::events::UsbObserver;
use crate::protocol::constants::{LANG_ID_EN_US, SWITCH_INTERFACE};
use crate::session::DriverGuard;

/// Exact vendor and product id match. No wildcards.
pub fn matches_id(descriptor: &DeviceDescriptor, vendor_id: u16, product_id: u16) -> bool {
    descriptor.vendor_id == vendor_id && descriptor.product_id == product_id
}

/// Read a string descriptor through a transient open of the device.
///
/// A bound default driver is detached for the read and reattached when the
/// guard drops, whether or not the read succeeded. Returns `None` when the
/// device has no such string.
pub(crate) fn read_string<B: UsbBus>(
    bus: &B,
    entry: &DeviceEntry<B::Device>,
    index: Option<u8>,
    timeout: Duration,
    observer: Arc<dyn UsbObserver>,
) -> Result<Option<String>, UsbError> {
    let Some(index) = index else {
        return Ok(None);
    };

    let handle = bus
        .open(&entry.device)
        .map_err(|e| UsbError::bus(BusOp::Open, e))?;
    let mut guard = DriverGuard::new(handle, SWITCH_INTERFACE, observer);
    guard.detach_if_active()?;

    let value = guard
        .handle_mut()
        .read_string_descriptor(index, LANG_ID_EN_US, timeout)
        .map_err(|e| UsbError::bus(BusOp::ReadString, e))?;
    Ok(Some(value))
}

/// Whether the device's serial number string equals `expected`.
///
/// The whole string is compared. Fails, rather than returning `false`,
/// when the serial cannot be read, so "different serial" and "unknown
/// serial" stay distinguishable. A device without a serial string never
/// matches.
pub fn matches_serial<B: UsbBus>(
    bus: &B,
    entry: &DeviceEntry<B::Device>,
    expected: &str,
    timeout: Duration,
    observer: Arc<dyn UsbObserver>,
) -> Result<bool, UsbError> {
    let serial = read_string(bus, entry, entry.descriptor.serial_index, timeout, observer)?;
    let matched = serial.as_deref() == Some(expected);
    if !matched {
        debug!(
            device = %entry.descriptor,
            serial = ?serial,
            expected = expected,
            "Not the serial number we want"
        );
    }
    Ok(matched)
}
