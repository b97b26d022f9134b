//! Device enumeration and selection.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::bus::{BusOp, UsbBus};
use crate::device::DeviceEntry;
use crate::error::UsbError;
use crate::events::{UsbEvent, UsbObserver};
use crate::matcher::{matches_id, matches_serial, read_string};
use crate::protocol::constants::DEVICE_CONTROL_TIMEOUT_MS;

/// Lists devices on a bus and picks the ones matching an id pair.
pub struct Enumerator<'b, B: UsbBus> {
    bus: &'b B,
    observer: Arc<dyn UsbObserver>,
    string_timeout: Duration,
}

impl<'b, B: UsbBus> Enumerator<'b, B> {
    pub fn new(bus: &'b B, observer: Arc<dyn UsbObserver>) -> Self {
        Self {
            bus,
            observer,
            string_timeout: Duration::from_millis(DEVICE_CONTROL_TIMEOUT_MS),
        }
    }

    /// Timeout for string descriptor reads.
    pub fn with_string_timeout(mut self, timeout: Duration) -> Self {
        self.string_timeout = timeout;
        self
    }

    /// Devices in bus order, descriptors read lazily from one listing
    /// snapshot. Devices whose descriptor cannot be read are skipped.
    pub fn enumerate(&self) -> Result<impl Iterator<Item = DeviceEntry<B::Device>>, UsbError> {
        let devices = self
            .bus
            .devices()
            .map_err(|e| UsbError::bus(BusOp::ListDevices, e))?;

        Ok(devices
            .into_iter()
            .filter_map(move |device| match self.bus.descriptor(&device) {
                Ok(descriptor) => Some(DeviceEntry::new(device, descriptor)),
                Err(e) => {
                    warn!(error = %e, "Failed to get device descriptor");
                    None
                }
            }))
    }

    /// First device in bus order matching the ids and, if given, the serial.
    ///
    /// A serial that cannot be read aborts the scan with that error instead
    /// of moving on to the next candidate.
    #[instrument(level = "debug", skip(self), fields(vid = format!("{:04x}", vendor_id), pid = format!("{:04x}", product_id)))]
    pub fn find_first(
        &self,
        vendor_id: u16,
        product_id: u16,
        serial: Option<&str>,
    ) -> Result<DeviceEntry<B::Device>, UsbError> {
        for entry in self.enumerate()? {
            if !matches_id(&entry.descriptor, vendor_id, product_id) {
                continue;
            }
            if let Some(expected) = serial
                && !matches_serial(
                    self.bus,
                    &entry,
                    expected,
                    self.string_timeout,
                    Arc::clone(&self.observer),
                )?
            {
                continue;
            }

            info!(device = %entry.descriptor, "Found device");
            self.observer.on_event(&UsbEvent::DeviceMatched {
                descriptor: entry.descriptor,
            });
            return Ok(entry);
        }

        debug!("No suitable device found");
        Err(UsbError::NotFound {
            vendor_id,
            product_id,
            serial: serial.map(str::to_string),
        })
    }

    /// Every device matching the ids, for listing. No serial filter.
    pub fn list_all(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Vec<DeviceEntry<B::Device>>, UsbError> {
        Ok(self
            .enumerate()?
            .filter(|entry| matches_id(&entry.descriptor, vendor_id, product_id))
            .collect())
    }

    /// Product name string, fetched through a transient open.
    pub fn product_name(&self, entry: &DeviceEntry<B::Device>) -> Result<Option<String>, UsbError> {
        read_string(
            self.bus,
            entry,
            entry.descriptor.product_index,
            self.string_timeout,
            Arc::clone(&self.observer),
        )
    }
}
