//! Output and indicator command encoding.
//!
//! Every command is a single HID SET_REPORT carrying a 3-byte output
//! report: `[0x00, address, state]`. Outputs are addressed as
//! `0x10 + port` with 0x01 for on; indicators are addressed by number with
//! inverted polarity (0x00 is on, 0x0f is off).

use tracing::{debug, warn};

use super::constants::*;
use super::setup::SetupPacket;
use crate::bus::BusHandle;
use crate::error::UsbError;
use crate::session::Session;
use crate::transfer::{ControlExecutor, TransferOutcome};

/// Output port number, 0-15.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPort(u8);

impl OutputPort {
    pub fn new(port: u8) -> Result<Self, UsbError> {
        if port > MAX_OUTPUT_PORT {
            return Err(UsbError::InvalidPort(port));
        }
        Ok(Self(port))
    }

    pub fn number(&self) -> u8 {
        self.0
    }
}

/// Indicator (status LED) number, 0-3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indicator(u8);

impl Indicator {
    pub const LED0: Indicator = Indicator(0);
    pub const LED1: Indicator = Indicator(1);

    pub fn new(led: u8) -> Result<Self, UsbError> {
        if led > MAX_INDICATOR {
            return Err(UsbError::InvalidIndicator(led));
        }
        Ok(Self(led))
    }

    pub fn number(&self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Output(OutputPort),
    Indicator(Indicator),
}

/// Set one output or indicator to on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchCommand {
    pub target: Target,
    pub on: bool,
}

impl SwitchCommand {
    pub fn output(port: OutputPort, on: bool) -> Self {
        Self {
            target: Target::Output(port),
            on,
        }
    }

    pub fn indicator(led: Indicator, on: bool) -> Self {
        Self {
            target: Target::Indicator(led),
            on,
        }
    }

    pub fn setup(&self) -> SetupPacket {
        SetupPacket::new(
            REQUEST_TYPE_CLASS_INTERFACE_OUT,
            HID_SET_REPORT,
            REPORT_OUTPUT,
            0x0000,
            REPORT_SIZE as u16,
        )
    }

    pub fn payload(&self) -> [u8; REPORT_SIZE] {
        match self.target {
            Target::Output(port) => [
                0x00,
                SWITCH_BASE + port.number(),
                if self.on { SWITCH_ON } else { SWITCH_OFF },
            ],
            Target::Indicator(led) => [
                0x00,
                led.number(),
                if self.on { INDICATOR_ON } else { INDICATOR_OFF },
            ],
        }
    }
}

/// Commands for switching power on `port`.
///
/// Port 0 also drives the indicators: LED0 follows the output, LED1 shows
/// the opposite state.
pub fn power_sequence(port: OutputPort, on: bool) -> Vec<SwitchCommand> {
    let mut commands = vec![SwitchCommand::output(port, on)];
    if port.number() == 0 {
        commands.push(SwitchCommand::indicator(Indicator::LED0, on));
        commands.push(SwitchCommand::indicator(Indicator::LED1, !on));
    }
    commands
}

/// Sends switch commands over an open session.
pub struct SwitchController<'s, H: BusHandle> {
    session: &'s mut Session<H>,
    executor: &'s ControlExecutor,
}

impl<'s, H: BusHandle> SwitchController<'s, H> {
    pub fn new(session: &'s mut Session<H>, executor: &'s ControlExecutor) -> Self {
        Self { session, executor }
    }

    pub fn send(&mut self, command: &SwitchCommand) -> Result<TransferOutcome, UsbError> {
        let payload = command.payload();
        let outcome =
            self.executor
                .transfer(&mut *self.session, &command.setup(), Some(&payload[..]))?;
        if outcome.is_partial() {
            warn!(
                command = ?command,
                transferred = outcome.transferred,
                "Device accepted a short report"
            );
        }
        Ok(outcome)
    }

    pub fn set_output(&mut self, port: u8, on: bool) -> Result<(), UsbError> {
        let port = OutputPort::new(port)?;
        self.send(&SwitchCommand::output(port, on))?;
        Ok(())
    }

    pub fn set_indicator(&mut self, led: u8, on: bool) -> Result<(), UsbError> {
        let led = Indicator::new(led)?;
        self.send(&SwitchCommand::indicator(led, on))?;
        Ok(())
    }

    /// Switch power on `port`, stopping at the first failed transfer.
    ///
    /// Transfers already applied are not undone; the device has no undo.
    pub fn set_power(&mut self, port: u8, on: bool) -> Result<(), UsbError> {
        let port = OutputPort::new(port)?;
        for command in power_sequence(port, on) {
            self.send(&command).inspect_err(|e| {
                warn!(
                    port = port.number(),
                    state = if on { "on" } else { "off" },
                    error = %e,
                    "Failed to switch power"
                );
            })?;
        }
        debug!(port = port.number(), on = on, "Power switched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bus::{BusError, BusOp, MockBus, MockDevice, MockHandle, MockResponse};
    use crate::device::{DeviceDescriptor, DeviceEntry};
    use crate::events::NullObserver;
    use crate::session::SessionOptions;

    fn port(n: u8) -> OutputPort {
        OutputPort::new(n).unwrap()
    }

    fn open(bus: &MockBus) -> Session<MockHandle> {
        let entry = DeviceEntry::new(0, DeviceDescriptor::new(0x0D50, 0x0008));
        Session::open(bus, &entry, SessionOptions::exclusive(), Arc::new(NullObserver))
            .ok()
            .unwrap()
    }

    #[test]
    fn test_output_payload() {
        assert_eq!(SwitchCommand::output(port(3), true).payload(), [0x00, 0x13, 0x01]);
        assert_eq!(SwitchCommand::output(port(3), false).payload(), [0x00, 0x13, 0x00]);
        assert_eq!(SwitchCommand::output(port(0), true).payload(), [0x00, 0x10, 0x01]);
        assert_eq!(SwitchCommand::output(port(15), true).payload(), [0x00, 0x1F, 0x01]);
    }

    #[test]
    fn test_indicator_polarity_is_inverted() {
        let led1 = Indicator::new(1).unwrap();
        assert_eq!(SwitchCommand::indicator(led1, true).payload(), [0x00, 0x01, 0x00]);
        assert_eq!(SwitchCommand::indicator(led1, false).payload(), [0x00, 0x01, 0x0F]);
    }

    #[test]
    fn test_setup_is_hid_set_output_report() {
        let setup = SwitchCommand::output(port(5), true).setup();
        assert_eq!(setup, SetupPacket::new(0x21, 0x09, 0x0200, 0x0000, 3));
        assert_eq!(SwitchCommand::indicator(Indicator::LED0, false).setup(), setup);
    }

    #[test]
    fn test_range_checks() {
        assert_eq!(OutputPort::new(16), Err(UsbError::InvalidPort(16)));
        assert_eq!(Indicator::new(4), Err(UsbError::InvalidIndicator(4)));
        assert!(Indicator::new(3).is_ok());
    }

    #[test]
    fn test_power_sequence() {
        assert_eq!(
            power_sequence(port(0), true),
            vec![
                SwitchCommand::output(port(0), true),
                SwitchCommand::indicator(Indicator::LED0, true),
                SwitchCommand::indicator(Indicator::LED1, false),
            ]
        );
        assert_eq!(
            power_sequence(port(2), false),
            vec![SwitchCommand::output(port(2), false)]
        );
    }

    #[test]
    fn test_power_on_port0_issues_three_transfers_in_order() {
        let bus = MockBus::new().with_device(MockDevice::new(0x0D50, 0x0008));
        let mut session = open(&bus);
        let executor = ControlExecutor::device_control(Arc::new(NullObserver));

        SwitchController::new(&mut session, &executor)
            .set_power(0, true)
            .unwrap();

        let payloads: Vec<_> = bus.transfers().into_iter().map(|(_, data)| data).collect();
        assert_eq!(
            payloads,
            vec![
                vec![0x00, 0x10, 0x01],
                vec![0x00, 0x00, 0x00],
                vec![0x00, 0x01, 0x0F],
            ]
        );
    }

    #[test]
    fn test_power_off_port0_inverts_indicators() {
        let bus = MockBus::new().with_device(MockDevice::new(0x0D50, 0x0008));
        let mut session = open(&bus);
        let executor = ControlExecutor::device_control(Arc::new(NullObserver));

        SwitchController::new(&mut session, &executor)
            .set_power(0, false)
            .unwrap();

        let payloads: Vec<_> = bus.transfers().into_iter().map(|(_, data)| data).collect();
        assert_eq!(
            payloads,
            vec![
                vec![0x00, 0x10, 0x00],
                vec![0x00, 0x00, 0x0F],
                vec![0x00, 0x01, 0x00],
            ]
        );
    }

    #[test]
    fn test_power_sequence_stops_at_first_failure() {
        let bus = MockBus::new().with_device(MockDevice::new(0x0D50, 0x0008));
        let mut session = open(&bus);
        let executor = ControlExecutor::device_control(Arc::new(NullObserver));

        bus.queue_response(MockResponse::Complete(3));
        bus.queue_response(MockResponse::Fail(BusError::status(-9)));
        bus.queue_response(MockResponse::Complete(3));

        let err = SwitchController::new(&mut session, &executor)
            .set_power(0, true)
            .unwrap_err();

        assert_eq!(err, UsbError::bus(BusOp::ControlTransfer, BusError::status(-9)));
        assert_eq!(bus.transfers().len(), 2);
        assert_eq!(bus.pending_responses(), 1);
    }

    #[test]
    fn test_other_ports_leave_indicators_alone() {
        let bus = MockBus::new().with_device(MockDevice::new(0x0D50, 0x0008));
        let mut session = open(&bus);
        let executor = ControlExecutor::device_control(Arc::new(NullObserver));

        SwitchController::new(&mut session, &executor)
            .set_power(7, true)
            .unwrap();
        assert_eq!(bus.transfers().len(), 1);
        assert_eq!(bus.transfers()[0].1, vec![0x00, 0x17, 0x01]);
    }

    #[test]
    fn test_invalid_port_sends_nothing() {
        let bus = MockBus::new().with_device(MockDevice::new(0x0D50, 0x0008));
        let mut session = open(&bus);
        let executor = ControlExecutor::device_control(Arc::new(NullObserver));

        let err = SwitchController::new(&mut session, &executor)
            .set_power(16, true)
            .unwrap_err();
        assert_eq!(err, UsbError::InvalidPort(16));
        assert!(bus.transfers().is_empty());
    }

    #[test]
    fn test_set_indicator_and_output() {
        let bus = MockBus::new().with_device(MockDevice::new(0x0D50, 0x0008));
        let mut session = open(&bus);
        let executor = ControlExecutor::device_control(Arc::new(NullObserver));
        let mut controller = SwitchController::new(&mut session, &executor);

        controller.set_indicator(2, true).unwrap();
        controller.set_output(1, false).unwrap();
        assert!(controller.set_indicator(4, true).is_err());

        let payloads: Vec<_> = bus.transfers().into_iter().map(|(_, data)| data).collect();
        assert_eq!(payloads, vec![vec![0x00, 0x02, 0x00], vec![0x00, 0x11, 0x00]]);
    }
}
