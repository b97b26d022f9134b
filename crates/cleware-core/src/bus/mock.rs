//! Mock bus for testing session and protocol logic.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{BusError, BusHandle, BusOp, UsbBus};
use crate::device::DeviceDescriptor;
use crate::protocol::constants::{LIBUSB_ERROR_BUSY, LIBUSB_ERROR_NOT_FOUND};
use crate::protocol::{Direction, SetupPacket};

/// A simulated device on the mock bus.
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub descriptor: DeviceDescriptor,
    pub serial: Option<String>,
    pub product: Option<String>,
    /// Whether a default driver is bound to interface 0.
    pub driver_bound: bool,
}

impl MockDevice {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            descriptor: DeviceDescriptor::new(vendor_id, product_id),
            serial: None,
            product: None,
            driver_bound: false,
        }
    }

    pub fn with_serial(mut self, serial: &str) -> Self {
        self.descriptor = self.descriptor.with_serial_index(3);
        self.serial = Some(serial.to_string());
        self
    }

    pub fn with_product(mut self, product: &str) -> Self {
        self.descriptor = self.descriptor.with_product_index(2);
        self.product = Some(product.to_string());
        self
    }

    pub fn with_driver(mut self) -> Self {
        self.driver_bound = true;
        self
    }
}

/// Scripted outcome for the next control transfer.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Complete with this many bytes.
    Complete(usize),
    /// Complete an IN transfer with this data.
    Data(Vec<u8>),
    /// Complete after a simulated latency; times out if it exceeds the deadline.
    Delay(Duration),
    /// Fail with this error.
    Fail(BusError),
}

/// A call made against the mock bus, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusCall {
    Open(usize),
    Close(usize),
    KernelDriverActive(u8),
    DetachDriver(u8),
    AttachDriver(u8),
    SetConfiguration(u8),
    ClaimInterface(u8),
    ReleaseInterface(u8),
    SetAltSetting(u8, u8),
    ReadString { index: u8, lang_id: u16 },
    Control { setup: SetupPacket, data: Vec<u8> },
}

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<MockDevice>,
    failures: HashMap<BusOp, BusError>,
    responses: VecDeque<MockResponse>,
    calls: Vec<BusCall>,
    claimed: Vec<(usize, u8)>,
    open_handles: usize,
}

impl MockState {
    fn check(&self, op: BusOp) -> Result<(), BusError> {
        match self.failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Mock bus shared between the test and the handles it opens.
#[derive(Debug, Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<MockState>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device at the end of the bus order.
    pub fn with_device(self, device: MockDevice) -> Self {
        self.state.lock().unwrap().devices.push(device);
        self
    }

    /// Make every call of `op` fail with `err`.
    pub fn fail(&self, op: BusOp, err: BusError) {
        self.state.lock().unwrap().failures.insert(op, err);
    }

    /// Queue the outcome of the next control transfer. Transfers with no
    /// queued response complete in full.
    pub fn queue_response(&self, response: MockResponse) {
        self.state.lock().unwrap().responses.push_back(response);
    }

    /// Responses not yet consumed.
    pub fn pending_responses(&self) -> usize {
        self.state.lock().unwrap().responses.len()
    }

    pub fn calls(&self) -> Vec<BusCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Control transfers issued, with the OUT data sent.
    pub fn transfers(&self) -> Vec<(SetupPacket, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BusCall::Control { setup, data } => Some((setup, data)),
                _ => None,
            })
            .collect()
    }

    pub fn driver_bound(&self, device: usize) -> bool {
        self.state.lock().unwrap().devices[device].driver_bound
    }

    pub fn is_claimed(&self, device: usize, interface: u8) -> bool {
        self.state
            .lock()
            .unwrap()
            .claimed
            .contains(&(device, interface))
    }

    pub fn open_handles(&self) -> usize {
        self.state.lock().unwrap().open_handles
    }
}

impl UsbBus for MockBus {
    type Device = usize;
    type Handle = MockHandle;

    fn devices(&self) -> Result<Vec<usize>, BusError> {
        let state = self.state.lock().unwrap();
        state.check(BusOp::ListDevices)?;
        Ok((0..state.devices.len()).collect())
    }

    fn descriptor(&self, device: &usize) -> Result<DeviceDescriptor, BusError> {
        let state = self.state.lock().unwrap();
        state.check(BusOp::ReadDescriptor)?;
        Ok(state.devices[*device].descriptor)
    }

    fn open(&self, device: &usize) -> Result<MockHandle, BusError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BusCall::Open(*device));
        state.check(BusOp::Open)?;
        state.open_handles += 1;
        Ok(MockHandle {
            state: Arc::clone(&self.state),
            device: *device,
        })
    }
}

/// Handle to a simulated device. Dropping it closes the device.
#[derive(Debug)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
    device: usize,
}

impl MockHandle {
    fn call(&self, call: BusCall, op: BusOp) -> Result<std::sync::MutexGuard<'_, MockState>, BusError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state.check(op)?;
        Ok(state)
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BusCall::Close(self.device));
        state.open_handles -= 1;
    }
}

impl BusHandle for MockHandle {
    fn kernel_driver_active(&mut self, interface: u8) -> Result<bool, BusError> {
        let device = self.device;
        let state = self.call(BusCall::KernelDriverActive(interface), BusOp::QueryDriver)?;
        Ok(interface == 0 && state.devices[device].driver_bound)
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), BusError> {
        let device = self.device;
        let mut state = self.call(BusCall::DetachDriver(interface), BusOp::DetachDriver)?;
        let dev = &mut state.devices[device];
        if interface != 0 || !dev.driver_bound {
            return Err(BusError::status(LIBUSB_ERROR_NOT_FOUND));
        }
        dev.driver_bound = false;
        Ok(())
    }

    fn attach_kernel_driver(&mut self, interface: u8) -> Result<(), BusError> {
        let device = self.device;
        let mut state = self.call(BusCall::AttachDriver(interface), BusOp::AttachDriver)?;
        if state.claimed.contains(&(device, interface)) {
            return Err(BusError::status(LIBUSB_ERROR_BUSY));
        }
        let dev = &mut state.devices[device];
        if interface != 0 || dev.driver_bound {
            return Err(BusError::status(LIBUSB_ERROR_BUSY));
        }
        dev.driver_bound = true;
        Ok(())
    }

    fn set_configuration(&mut self, config: u8) -> Result<(), BusError> {
        self.call(BusCall::SetConfiguration(config), BusOp::SetConfiguration)?;
        Ok(())
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), BusError> {
        let device = self.device;
        let mut state = self.call(BusCall::ClaimInterface(interface), BusOp::ClaimInterface)?;
        if state.claimed.contains(&(device, interface)) {
            return Err(BusError::status(LIBUSB_ERROR_BUSY));
        }
        state.claimed.push((device, interface));
        Ok(())
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), BusError> {
        let device = self.device;
        let mut state = self.call(BusCall::ReleaseInterface(interface), BusOp::ReleaseInterface)?;
        let before = state.claimed.len();
        state.claimed.retain(|c| *c != (device, interface));
        if state.claimed.len() == before {
            return Err(BusError::status(LIBUSB_ERROR_NOT_FOUND));
        }
        Ok(())
    }

    fn set_alternate_setting(&mut self, interface: u8, setting: u8) -> Result<(), BusError> {
        self.call(BusCall::SetAltSetting(interface, setting), BusOp::SetAltSetting)?;
        Ok(())
    }

    fn read_string_descriptor(
        &mut self,
        index: u8,
        lang_id: u16,
        _timeout: Duration,
    ) -> Result<String, BusError> {
        let device = self.device;
        let state = self.call(BusCall::ReadString { index, lang_id }, BusOp::ReadString)?;
        let dev = &state.devices[device];
        let value = if dev.descriptor.serial_index == Some(index) {
            dev.serial.clone()
        } else if dev.descriptor.product_index == Some(index) {
            dev.product.clone()
        } else {
            None
        };
        value.ok_or(BusError::status(LIBUSB_ERROR_NOT_FOUND))
    }

    fn control_transfer(
        &mut self,
        setup: &SetupPacket,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, BusError> {
        let data = match setup.direction() {
            Direction::Out => buffer.to_vec(),
            Direction::In => Vec::new(),
        };
        let mut state = self.call(
            BusCall::Control {
                setup: *setup,
                data,
            },
            BusOp::ControlTransfer,
        )?;

        match state.responses.pop_front() {
            None => Ok(buffer.len()),
            Some(MockResponse::Complete(n)) => Ok(n.min(buffer.len())),
            Some(MockResponse::Data(bytes)) => {
                let n = bytes.len().min(buffer.len());
                buffer[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Some(MockResponse::Delay(latency)) => {
                if latency > timeout {
                    Err(BusError::timeout())
                } else {
                    Ok(buffer.len())
                }
            }
            Some(MockResponse::Fail(err)) => Err(err),
        }
    }
}
