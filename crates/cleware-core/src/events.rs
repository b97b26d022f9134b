//! Event system for UI decoupling.
//!
//! Lets the command-line tools (or tests) observe session and transfer
//! activity without coupling to the core logic.

use std::fmt;

use crate::device::DeviceDescriptor;
use crate::protocol::SetupPacket;

/// Session lifecycle stage an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    DriverDetached,
    DriverReattached,
    InterfaceClaimed,
    InterfaceReleased,
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStage::DriverDetached => write!(f, "Kernel driver detached"),
            SessionStage::DriverReattached => write!(f, "Kernel driver reattached"),
            SessionStage::InterfaceClaimed => write!(f, "Interface claimed"),
            SessionStage::InterfaceReleased => write!(f, "Interface released"),
        }
    }
}

/// Events emitted by the enumerator, session and executor.
#[derive(Debug, Clone)]
pub enum UsbEvent {
    /// A device passed the id (and serial) filter.
    DeviceMatched { descriptor: DeviceDescriptor },
    /// Session lifecycle step on an interface.
    Session { stage: SessionStage, interface: u8 },
    /// Control transfer completed.
    Transfer {
        setup: SetupPacket,
        transferred: usize,
        /// First bytes of the data stage.
        data: Vec<u8>,
    },
}

/// Observer trait for receiving events.
pub trait UsbObserver: Send + Sync {
    fn on_event(&self, event: &UsbEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl UsbObserver for NullObserver {
    fn on_event(&self, _event: &UsbEvent) {}
}

/// Observer that logs events using tracing.
///
/// With `debug` off only session teardown problems reach the log (as
/// warnings from the session itself); with it on every step is logged.
pub struct TracingObserver {
    debug: bool,
}

impl TracingObserver {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }
}

impl UsbObserver for TracingObserver {
    fn on_event(&self, event: &UsbEvent) {
        if !self.debug {
            return;
        }
        match event {
            UsbEvent::DeviceMatched { descriptor } => {
                tracing::debug!(device = %descriptor, "Matched device");
            }
            UsbEvent::Session { stage, interface } => {
                tracing::debug!(interface = interface, "{}", stage);
            }
            UsbEvent::Transfer {
                setup,
                transferred,
                data,
            } => {
                tracing::debug!(
                    setup = ?setup.to_bytes(),
                    dir = %setup.direction(),
                    requested = setup.length,
                    transferred = transferred,
                    data = ?data,
                    "Control transfer"
                );
            }
        }
    }
}
