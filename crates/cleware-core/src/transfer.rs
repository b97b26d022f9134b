//! Control transfer execution.
//!
//! The executor builds the data-stage buffer for a setup packet, dispatches
//! it through the session's handle with a bounded timeout and reports the
//! byte count the bus actually moved. It never retries.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::bus::{BusHandle, BusOp};
use crate::error::UsbError;
use crate::events::{UsbEvent, UsbObserver};
use crate::protocol::constants::{DEVICE_CONTROL_TIMEOUT_MS, RAW_CONTROL_TIMEOUT_MS};
use crate::protocol::{Direction, SetupPacket};
use crate::session::Session;

/// Bytes of the data stage carried in transfer events.
const EVENT_DATA_LIMIT: usize = 32;

/// Result of a completed control transfer.
///
/// A short transfer is still a success: compare `transferred` with
/// `requested()` when exactness matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub setup: SetupPacket,
    pub transferred: usize,
    buffer: Vec<u8>,
}

impl TransferOutcome {
    pub fn requested(&self) -> usize {
        usize::from(self.setup.length)
    }

    pub fn is_partial(&self) -> bool {
        self.transferred < self.requested()
    }

    /// Bytes actually transferred: received data for IN requests, the sent
    /// prefix for OUT requests.
    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.transferred.min(self.buffer.len())]
    }
}

/// Dispatches control transfers with a fixed timeout.
pub struct ControlExecutor {
    timeout: Duration,
    observer: Arc<dyn UsbObserver>,
}

impl ControlExecutor {
    pub fn new(timeout: Duration, observer: Arc<dyn UsbObserver>) -> Self {
        Self { timeout, observer }
    }

    /// Executor for switch and indicator commands (1000 ms).
    pub fn device_control(observer: Arc<dyn UsbObserver>) -> Self {
        Self::new(Duration::from_millis(DEVICE_CONTROL_TIMEOUT_MS), observer)
    }

    /// Executor for raw control messages (2000 ms).
    pub fn raw(observer: Arc<dyn UsbObserver>) -> Self {
        Self::new(Duration::from_millis(RAW_CONTROL_TIMEOUT_MS), observer)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one control transfer.
    ///
    /// `payload` is the OUT data stage and must be exactly `setup.length`
    /// bytes. Without a payload a zero-filled buffer of `setup.length` bytes
    /// is used (the IN buffer, or zeros for an OUT request).
    #[instrument(level = "debug", skip(self, session, payload), fields(setup = %setup))]
    pub fn transfer<H: BusHandle>(
        &self,
        session: &mut Session<H>,
        setup: &SetupPacket,
        payload: Option<&[u8]>,
    ) -> Result<TransferOutcome, UsbError> {
        let mut buffer = match payload {
            Some(data) => {
                if setup.direction() == Direction::In {
                    return Err(UsbError::InvalidRequest(
                        "payload given for a device-to-host request".into(),
                    ));
                }
                if data.len() != usize::from(setup.length) {
                    return Err(UsbError::InvalidRequest(format!(
                        "payload is {} bytes but wLength is {}",
                        data.len(),
                        setup.length
                    )));
                }
                data.to_vec()
            }
            None => vec![0u8; usize::from(setup.length)],
        };

        let transferred = session
            .handle_mut()
            .control_transfer(setup, &mut buffer, self.timeout)
            .map_err(|e| {
                warn!(error = %e, "Control transfer failed");
                if e.is_timeout() {
                    UsbError::Timeout {
                        op: BusOp::ControlTransfer,
                        timeout_ms: self.timeout.as_millis() as u64,
                        code: e.code(),
                    }
                } else {
                    UsbError::bus(BusOp::ControlTransfer, e)
                }
            })?;

        let outcome = TransferOutcome {
            setup: *setup,
            transferred,
            buffer,
        };
        if outcome.is_partial() {
            debug!(
                requested = outcome.requested(),
                transferred = transferred,
                "Short control transfer"
            );
        }

        self.observer.on_event(&UsbEvent::Transfer {
            setup: *setup,
            transferred,
            data: outcome.data().iter().take(EVENT_DATA_LIMIT).copied().collect(),
        });
        Ok(outcome)
    }
}
