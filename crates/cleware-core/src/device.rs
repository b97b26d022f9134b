//! Device descriptors as read from the bus during a listing pass.

use std::fmt;

/// Identity fields of a device descriptor.
///
/// String fields are referenced by descriptor index only; the strings
/// themselves need an open handle and are fetched lazily.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Index of the serial number string descriptor, if any.
    pub serial_index: Option<u8>,
    /// Index of the product string descriptor, if any.
    pub product_index: Option<u8>,
}

impl DeviceDescriptor {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            serial_index: None,
            product_index: None,
        }
    }

    pub fn with_serial_index(mut self, index: u8) -> Self {
        self.serial_index = Some(index);
        self
    }

    pub fn with_product_index(mut self, index: u8) -> Self {
        self.product_index = Some(index);
        self
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// A listed device together with its descriptor.
#[derive(Debug, Clone)]
pub struct DeviceEntry<D> {
    pub device: D,
    pub descriptor: DeviceDescriptor,
}

impl<D> DeviceEntry<D> {
    pub fn new(device: D, descriptor: DeviceDescriptor) -> Self {
        Self { device, descriptor }
    }
}
