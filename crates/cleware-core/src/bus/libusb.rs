//! rusb-based (libusb 1.0) bus implementation.

use std::time::Duration;

use rusb::{Context, Device, DeviceHandle, UsbContext};
use tracing::{debug, instrument};

use super::traits::{BusError, BusHandle, UsbBus};
use crate::device::DeviceDescriptor;
use crate::protocol::constants::*;
use crate::protocol::{Direction, SetupPacket};

/// libusb bus backed by its own context.
pub struct RusbBus {
    context: Context,
}

impl RusbBus {
    pub fn new() -> Result<Self, BusError> {
        let context = Context::new().map_err(map_rusb_error)?;
        Ok(Self { context })
    }
}

impl UsbBus for RusbBus {
    type Device = Device<Context>;
    type Handle = RusbHandle;

    #[instrument(level = "debug", skip(self))]
    fn devices(&self) -> Result<Vec<Self::Device>, BusError> {
        let list = self.context.devices().map_err(map_rusb_error)?;
        let devices: Vec<_> = list.iter().collect();
        debug!(count = devices.len(), "Listed devices");
        Ok(devices)
    }

    fn descriptor(&self, device: &Self::Device) -> Result<DeviceDescriptor, BusError> {
        let desc = device.device_descriptor().map_err(map_rusb_error)?;
        Ok(DeviceDescriptor {
            vendor_id: desc.vendor_id(),
            product_id: desc.product_id(),
            serial_index: desc.serial_number_string_index(),
            product_index: desc.product_string_index(),
        })
    }

    fn open(&self, device: &Self::Device) -> Result<Self::Handle, BusError> {
        let handle = device.open().map_err(map_rusb_error)?;
        debug!(
            bus = device.bus_number(),
            address = device.address(),
            "Opened device"
        );
        Ok(RusbHandle { handle })
    }
}

/// Open libusb device handle. Dropping it closes the device.
pub struct RusbHandle {
    handle: DeviceHandle<Context>,
}

impl BusHandle for RusbHandle {
    fn kernel_driver_active(&mut self, interface: u8) -> Result<bool, BusError> {
        match self.handle.kernel_driver_active(interface) {
            Ok(active) => Ok(active),
            // Platforms without kernel driver control never have one bound.
            Err(rusb::Error::NotSupported) => Ok(false),
            Err(e) => Err(map_rusb_error(e)),
        }
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), BusError> {
        self.handle
            .detach_kernel_driver(interface)
            .map_err(map_rusb_error)
    }

    fn attach_kernel_driver(&mut self, interface: u8) -> Result<(), BusError> {
        self.handle
            .attach_kernel_driver(interface)
            .map_err(map_rusb_error)
    }

    fn set_configuration(&mut self, config: u8) -> Result<(), BusError> {
        self.handle
            .set_active_configuration(config)
            .map_err(map_rusb_error)
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), BusError> {
        self.handle.claim_interface(interface).map_err(map_rusb_error)
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), BusError> {
        self.handle
            .release_interface(interface)
            .map_err(map_rusb_error)
    }

    fn set_alternate_setting(&mut self, interface: u8, setting: u8) -> Result<(), BusError> {
        self.handle
            .set_alternate_setting(interface, setting)
            .map_err(map_rusb_error)
    }

    fn read_string_descriptor(
        &mut self,
        index: u8,
        lang_id: u16,
        timeout: Duration,
    ) -> Result<String, BusError> {
        let language = self
            .handle
            .read_languages(timeout)
            .map_err(map_rusb_error)?
            .into_iter()
            .find(|l| l.lang_id() == lang_id)
            .ok_or(BusError::status(LIBUSB_ERROR_NOT_FOUND))?;

        self.handle
            .read_string_descriptor(language, index, timeout)
            .map_err(map_rusb_error)
    }

    fn control_transfer(
        &mut self,
        setup: &SetupPacket,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, BusError> {
        let result = match setup.direction() {
            Direction::In => self.handle.read_control(
                setup.request_type,
                setup.request,
                setup.value,
                setup.index,
                buffer,
                timeout,
            ),
            Direction::Out => self.handle.write_control(
                setup.request_type,
                setup.request,
                setup.value,
                setup.index,
                buffer,
                timeout,
            ),
        };
        result.map_err(map_rusb_error)
    }
}

/// Map `rusb::Error` to the libusb negative status it was raised from.
pub fn map_rusb_error(err: rusb::Error) -> BusError {
    let code = match err {
        rusb::Error::Timeout => return BusError::timeout(),
        rusb::Error::Io => LIBUSB_ERROR_IO,
        rusb::Error::InvalidParam => LIBUSB_ERROR_INVALID_PARAM,
        rusb::Error::Access => LIBUSB_ERROR_ACCESS,
        rusb::Error::NoDevice => LIBUSB_ERROR_NO_DEVICE,
        rusb::Error::NotFound => LIBUSB_ERROR_NOT_FOUND,
        rusb::Error::Busy => LIBUSB_ERROR_BUSY,
        rusb::Error::Overflow => LIBUSB_ERROR_OVERFLOW,
        rusb::Error::Pipe => LIBUSB_ERROR_PIPE,
        rusb::Error::Interrupted => LIBUSB_ERROR_INTERRUPTED,
        rusb::Error::NoMem => LIBUSB_ERROR_NO_MEM,
        rusb::Error::NotSupported => LIBUSB_ERROR_NOT_SUPPORTED,
        _ => LIBUSB_ERROR_OTHER,
    };
    BusError::status(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rusb_error() {
        assert_eq!(map_rusb_error(rusb::Error::Timeout), BusError::timeout());
        assert_eq!(map_rusb_error(rusb::Error::Pipe), BusError::status(-9));
        assert_eq!(map_rusb_error(rusb::Error::Busy), BusError::status(-6));
        assert_eq!(map_rusb_error(rusb::Error::NoDevice), BusError::status(-4));
        assert_eq!(map_rusb_error(rusb::Error::Other), BusError::status(-99));
    }

    #[test]
    fn test_timeout_keeps_libusb_code() {
        let err = map_rusb_error(rusb::Error::Timeout);
        assert!(err.is_timeout());
        assert_eq!(err.code(), LIBUSB_ERROR_TIMEOUT);
    }
}
