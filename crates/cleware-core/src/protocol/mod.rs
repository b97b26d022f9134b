//! Cleware switch protocol: constants, setup packets and the command encoder.

pub mod constants;
pub mod setup;
pub mod switch;

pub use constants::*;
pub use setup::{Direction, Recipient, RequestKind, SetupPacket};
pub use switch::{Indicator, OutputPort, SwitchCommand, SwitchController, Target, power_sequence};
