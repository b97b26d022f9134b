//! Cleware-Core: USB power switch control over libusb in Rust.
//!
//! This crate finds a Cleware USB switch (or any device by id) on the bus,
//! takes exclusive control of its interface and drives it with short
//! control transfers.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Bus**: Device listing, handles and the raw control primitive (rusb, mock)
//! - **Matcher / Enumerator**: Id and serial-number selection
//! - **Session**: Detach, configure, claim; release and reattach on drop
//! - **Transfer**: Control transfers with timeout and partial-completion reporting
//! - **Protocol**: Setup packets and the output/indicator command encoder
//! - **Events**: Observer pattern for UI decoupling
//! - **Commands**: The operations behind the command-line tools
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cleware_core::{RusbBus, ToolConfig, TracingObserver, commands};
//!
//! let bus = RusbBus::new().expect("libusb init failed");
//! let config = ToolConfig::default();
//! commands::power(&bus, &config, 0, true, Arc::new(TracingObserver::new(false)))
//!     .expect("switch failed");
//! ```

pub mod bus;
pub mod commands;
pub mod config;
pub mod device;
pub mod enumerator;
pub mod error;
pub mod events;
pub mod matcher;
pub mod protocol;
pub mod session;
pub mod transfer;

// Re-exports for convenience
pub use bus::{BusError, BusHandle, BusOp, MockBus, MockDevice, RusbBus, UsbBus};
pub use commands::{ListedDevice, RawRequest};
pub use config::ToolConfig;
pub use device::{DeviceDescriptor, DeviceEntry};
pub use enumerator::Enumerator;
pub use error::UsbError;
pub use events::{NullObserver, TracingObserver, UsbEvent, UsbObserver};
pub use matcher::{matches_id, matches_serial};
pub use protocol::{SetupPacket, SwitchCommand, SwitchController};
pub use session::{Session, SessionOptions};
pub use transfer::{ControlExecutor, TransferOutcome};
