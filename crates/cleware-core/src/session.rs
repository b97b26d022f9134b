//! Device session: exclusive access to one device's claimed interface.
//!
//! Opening a session detaches the default driver, selects the
//! configuration, claims the interface and selects the alternate setting.
//! Teardown runs from `Drop`, so it happens exactly once on every exit path:
//! the interface is released first, then the default driver is reattached.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::bus::{BusHandle, BusOp, UsbBus};
use crate::device::DeviceEntry;
use crate::error::UsbError;
use crate::events::{SessionStage, UsbEvent, UsbObserver};
use crate::protocol::constants::{SWITCH_ALT_SETTING, SWITCH_CONFIGURATION, SWITCH_INTERFACE};

/// Which acquisition steps a session performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Interface to detach, claim and release.
    pub interface: u8,
    /// Configuration to select before claiming.
    pub configuration: Option<u8>,
    /// Alternate setting to select after claiming.
    pub alt_setting: Option<u8>,
    /// Claim `interface`. Without a claim the session only holds the handle.
    pub claim: bool,
}

impl SessionOptions {
    /// Full acquisition used for switch commands: configuration 1,
    /// interface 0, alternate setting 0.
    pub fn exclusive() -> Self {
        Self {
            interface: SWITCH_INTERFACE,
            configuration: Some(SWITCH_CONFIGURATION),
            alt_setting: Some(SWITCH_ALT_SETTING),
            claim: true,
        }
    }

    /// Raw control messages leave the configuration alone and only claim an
    /// interface when asked to.
    pub fn raw(claim_interface: Option<u8>) -> Self {
        Self {
            interface: claim_interface.unwrap_or(SWITCH_INTERFACE),
            configuration: None,
            alt_setting: None,
            claim: claim_interface.is_some(),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::exclusive()
    }
}

/// Open handle that reattaches the default driver it detached when dropped.
pub(crate) struct DriverGuard<H: BusHandle> {
    handle: H,
    interface: u8,
    detached: bool,
    observer: Arc<dyn UsbObserver>,
}

impl<H: BusHandle> DriverGuard<H> {
    pub(crate) fn new(handle: H, interface: u8, observer: Arc<dyn UsbObserver>) -> Self {
        Self {
            handle,
            interface,
            detached: false,
            observer,
        }
    }

    /// Detach the default driver if one is bound.
    pub(crate) fn detach_if_active(&mut self) -> Result<(), UsbError> {
        let active = self
            .handle
            .kernel_driver_active(self.interface)
            .map_err(|e| UsbError::bus(BusOp::QueryDriver, e))?;
        if !active {
            return Ok(());
        }

        self.handle
            .detach_kernel_driver(self.interface)
            .map_err(|e| UsbError::bus(BusOp::DetachDriver, e))?;
        self.detached = true;
        self.observer.on_event(&UsbEvent::Session {
            stage: SessionStage::DriverDetached,
            interface: self.interface,
        });
        Ok(())
    }

    pub(crate) fn handle_mut(&mut self) -> &mut H {
        &mut self.handle
    }

    pub(crate) fn detached(&self) -> bool {
        self.detached
    }
}

impl<H: BusHandle> Drop for DriverGuard<H> {
    fn drop(&mut self) {
        if !self.detached {
            return;
        }
        // Best effort: the device is no longer ours at this point.
        match self.handle.attach_kernel_driver(self.interface) {
            Ok(()) => self.observer.on_event(&UsbEvent::Session {
                stage: SessionStage::DriverReattached,
                interface: self.interface,
            }),
            Err(e) => warn!(
                interface = self.interface,
                error = %e,
                "Could not reattach kernel driver"
            ),
        }
    }
}

/// Exclusive session on one device.
///
/// Not clonable. The claimed interface is released when the session is
/// closed or dropped, whichever comes first.
pub struct Session<H: BusHandle> {
    claimed: Option<u8>,
    guard: DriverGuard<H>,
    observer: Arc<dyn UsbObserver>,
}

impl<H: BusHandle> Session<H> {
    /// Open `entry` and acquire it according to `options`.
    ///
    /// A failing step drops the partially built session, which releases
    /// whatever was claimed and reattaches whatever was detached.
    #[instrument(level = "info", skip_all, fields(device = %entry.descriptor))]
    pub fn open<B>(
        bus: &B,
        entry: &DeviceEntry<B::Device>,
        options: SessionOptions,
        observer: Arc<dyn UsbObserver>,
    ) -> Result<Self, UsbError>
    where
        B: UsbBus<Handle = H>,
    {
        let handle = bus
            .open(&entry.device)
            .map_err(|e| UsbError::bus(BusOp::Open, e))?;

        let mut session = Session {
            claimed: None,
            guard: DriverGuard::new(handle, options.interface, Arc::clone(&observer)),
            observer,
        };
        session.acquire(options).inspect_err(|e| {
            warn!(error = %e, "Session setup failed");
        })?;

        info!(interface = options.interface, "Session open");
        Ok(session)
    }

    fn acquire(&mut self, options: SessionOptions) -> Result<(), UsbError> {
        let interface = options.interface;

        if options.claim {
            self.guard.detach_if_active()?;
        }

        if let Some(config) = options.configuration {
            self.guard
                .handle_mut()
                .set_configuration(config)
                .map_err(|e| UsbError::bus(BusOp::SetConfiguration, e))?;
            debug!(config = config, "Configuration set");
        }

        if options.claim {
            self.guard
                .handle_mut()
                .claim_interface(interface)
                .map_err(|e| UsbError::bus(BusOp::ClaimInterface, e))?;
            self.claimed = Some(interface);
            self.observer.on_event(&UsbEvent::Session {
                stage: SessionStage::InterfaceClaimed,
                interface,
            });
        }

        if let Some(alt) = options.alt_setting {
            self.guard
                .handle_mut()
                .set_alternate_setting(interface, alt)
                .map_err(|e| UsbError::bus(BusOp::SetAltSetting, e))?;
            debug!(interface = interface, alt_setting = alt, "Alternate setting set");
        }

        Ok(())
    }

    /// Interface held by this session, if one was claimed.
    pub fn claimed_interface(&self) -> Option<u8> {
        self.claimed
    }

    /// Whether a default driver was detached and will be reattached on close.
    pub fn driver_detached(&self) -> bool {
        self.guard.detached()
    }

    pub(crate) fn handle_mut(&mut self) -> &mut H {
        self.guard.handle_mut()
    }

    /// End the session, reporting a failed release.
    ///
    /// Reattachment still runs afterwards and its failure is only logged.
    pub fn close(mut self) -> Result<(), UsbError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), UsbError> {
        let Some(interface) = self.claimed.take() else {
            return Ok(());
        };
        self.guard
            .handle_mut()
            .release_interface(interface)
            .map_err(|e| UsbError::bus(BusOp::ReleaseInterface, e))?;
        self.observer.on_event(&UsbEvent::Session {
            stage: SessionStage::InterfaceReleased,
            interface,
        });
        Ok(())
    }
}

impl<H: BusHandle> Drop for Session<H> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "Session teardown");
        }
        // `guard` drops next: driver reattach, then the handle closes.
    }
}
