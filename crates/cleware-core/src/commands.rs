//! High-level operations behind the command-line tools.
//!
//! Each operation finds the device, opens a session scoped to the call and
//! lets the session tear itself down on every return path.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::bus::UsbBus;
use crate::config::ToolConfig;
use crate::device::DeviceDescriptor;
use crate::enumerator::Enumerator;
use crate::error::UsbError;
use crate::events::UsbObserver;
use crate::protocol::{SetupPacket, SwitchController};
use crate::session::{Session, SessionOptions};
use crate::transfer::{ControlExecutor, TransferOutcome};

/// A matching device as shown by `--list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedDevice {
    pub descriptor: DeviceDescriptor,
    pub product: Option<String>,
}

/// Switch output `port` on or off on the configured device.
#[instrument(level = "info", skip(bus, config, observer))]
pub fn power<B: UsbBus>(
    bus: &B,
    config: &ToolConfig,
    port: u8,
    on: bool,
    observer: Arc<dyn UsbObserver>,
) -> Result<(), UsbError> {
    let entry = Enumerator::new(bus, Arc::clone(&observer))
        .with_string_timeout(config.control_timeout())
        .find_first(config.vendor_id, config.product_id, config.serial.as_deref())?;

    let mut session = Session::open(
        bus,
        &entry,
        SessionOptions::exclusive(),
        Arc::clone(&observer),
    )?;
    let executor = ControlExecutor::new(config.control_timeout(), observer);

    SwitchController::new(&mut session, &executor).set_power(port, on)?;
    session.close()?;

    info!(port = port, state = if on { "on" } else { "off" }, "Switched");
    Ok(())
}

/// Every device matching the configured ids, with product names.
///
/// A product name that cannot be read is logged and left empty; the
/// listing carries on with the next device.
pub fn list<B: UsbBus>(
    bus: &B,
    config: &ToolConfig,
    observer: Arc<dyn UsbObserver>,
) -> Result<Vec<ListedDevice>, UsbError> {
    let enumerator =
        Enumerator::new(bus, observer).with_string_timeout(config.control_timeout());

    Ok(enumerator
        .list_all(config.vendor_id, config.product_id)?
        .iter()
        .map(|entry| ListedDevice {
            descriptor: entry.descriptor,
            product: enumerator.product_name(entry).unwrap_or_else(|e| {
                warn!(device = %entry.descriptor, error = %e, "Failed to read product name");
                None
            }),
        })
        .collect())
}

/// A raw control message and how to send it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    pub vendor_id: u16,
    pub product_id: u16,
    pub setup: SetupPacket,
    /// Times to issue the request.
    pub count: u32,
    /// Claim this interface before sending.
    pub claim_interface: Option<u8>,
}

/// Send a raw control message `count` times, stopping at the first failure.
///
/// Each completed transfer is handed to `on_outcome` as soon as it returns,
/// so data received before a failure is not lost. Returns the number of
/// completed transfers.
#[instrument(level = "info", skip(bus, config, observer, on_outcome), fields(setup = %request.setup))]
pub fn raw_control<B, F>(
    bus: &B,
    config: &ToolConfig,
    request: &RawRequest,
    observer: Arc<dyn UsbObserver>,
    mut on_outcome: F,
) -> Result<u32, UsbError>
where
    B: UsbBus,
    F: FnMut(&TransferOutcome),
{
    let entry = Enumerator::new(bus, Arc::clone(&observer)).find_first(
        request.vendor_id,
        request.product_id,
        None,
    )?;

    let mut session = Session::open(
        bus,
        &entry,
        SessionOptions::raw(request.claim_interface),
        Arc::clone(&observer),
    )?;
    let executor = ControlExecutor::new(config.raw_timeout(), observer);

    let mut completed = 0;
    while completed < request.count {
        let outcome = executor.transfer(&mut session, &request.setup, None)?;
        on_outcome(&outcome);
        completed += 1;
    }
    session.close()?;
    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusCall, BusError, BusOp, MockBus, MockDevice, MockResponse};
    use crate::events::NullObserver;

    fn observer() -> Arc<dyn UsbObserver> {
        Arc::new(NullObserver)
    }

    fn switch() -> MockDevice {
        MockDevice::new(0x0D50, 0x0008)
    }

    #[test]
    fn test_power_on_end_to_end() {
        let bus = MockBus::new()
            .with_device(MockDevice::new(0x1D6B, 0x0002))
            .with_device(switch().with_driver());

        power(&bus, &ToolConfig::default(), 0, true, observer()).unwrap();

        assert_eq!(bus.transfers().len(), 3);
        assert!(bus.driver_bound(1));
        assert!(!bus.is_claimed(1, 0));
        assert_eq!(bus.open_handles(), 0);
    }

    #[test]
    fn test_power_transfer_failure_still_tears_down() {
        let bus = MockBus::new().with_device(switch().with_driver());
        bus.queue_response(MockResponse::Fail(BusError::status(-4)));

        let err = power(&bus, &ToolConfig::default(), 0, false, observer()).unwrap_err();
        assert_eq!(err.exit_code(), -4);
        assert_eq!(bus.transfers().len(), 1);
        assert!(bus.driver_bound(0));
        assert!(!bus.is_claimed(0, 0));
        assert_eq!(bus.open_handles(), 0);
    }

    #[test]
    fn test_power_without_device_is_not_found() {
        let bus = MockBus::new().with_device(MockDevice::new(0x1D6B, 0x0002));
        let err = power(&bus, &ToolConfig::default(), 0, true, observer()).unwrap_err();
        assert!(matches!(err, UsbError::NotFound { .. }));
        assert!(bus.calls().is_empty());
    }

    #[test]
    fn test_power_selects_by_serial() {
        let bus = MockBus::new()
            .with_device(switch().with_serial("0001"))
            .with_device(switch().with_serial("0002"));
        let config = ToolConfig {
            serial: Some("0002".into()),
            ..Default::default()
        };

        power(&bus, &config, 2, true, observer()).unwrap();

        let opens: Vec<_> = bus
            .calls()
            .into_iter()
            .filter(|c| matches!(c, BusCall::Open(_)))
            .collect();
        // Serial probes of both devices, then the session on the second.
        assert_eq!(opens, vec![BusCall::Open(0), BusCall::Open(1), BusCall::Open(1)]);
    }

    #[test]
    fn test_list_reports_product_names() {
        let bus = MockBus::new()
            .with_device(switch().with_product("USB-Switch"))
            .with_device(MockDevice::new(0x0D50, 0x0030).with_product("Other"))
            .with_device(switch());

        let listed = list(&bus, &ToolConfig::default(), observer()).unwrap();
        assert_eq!(
            listed,
            vec![
                ListedDevice {
                    descriptor: switch().with_product("USB-Switch").descriptor,
                    product: Some("USB-Switch".into()),
                },
                ListedDevice {
                    descriptor: switch().descriptor,
                    product: None,
                },
            ]
        );
    }

    #[test]
    fn test_list_survives_unreadable_product_name() {
        let bus = MockBus::new()
            .with_device(switch().with_product("USB-Switch"))
            .with_device(switch().with_product("USB-Switch").with_driver());
        bus.fail(BusOp::ReadString, BusError::status(-9));

        let listed = list(&bus, &ToolConfig::default(), observer()).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|d| d.product.is_none()));
        assert!(bus.driver_bound(1));
        assert_eq!(bus.open_handles(), 0);
    }

    fn raw_request(count: u32, claim_interface: Option<u8>) -> RawRequest {
        RawRequest {
            vendor_id: 0x0D50,
            product_id: 0x0008,
            setup: SetupPacket::new(0x80, 0x06, 0x0100, 0x0000, 18),
            count,
            claim_interface,
        }
    }

    fn ignore(_: &TransferOutcome) {}

    #[test]
    fn test_raw_control_repeats() {
        let bus = MockBus::new().with_device(switch());
        let mut seen = 0;
        let completed = raw_control(
            &bus,
            &ToolConfig::default(),
            &raw_request(3, None),
            observer(),
            |_| seen += 1,
        )
        .unwrap();
        assert_eq!(completed, 3);
        assert_eq!(seen, 3);
        assert_eq!(bus.transfers().len(), 3);
        assert!(!bus.calls().iter().any(|c| matches!(c, BusCall::ClaimInterface(_))));
    }

    #[test]
    fn test_raw_control_stops_at_first_failure() {
        let bus = MockBus::new().with_device(switch());
        bus.queue_response(MockResponse::Complete(18));
        bus.queue_response(MockResponse::Fail(BusError::status(-9)));

        let err = raw_control(
            &bus,
            &ToolConfig::default(),
            &raw_request(5, None),
            observer(),
            ignore,
        )
        .unwrap_err();
        assert_eq!(err.op(), Some(BusOp::ControlTransfer));
        assert_eq!(bus.transfers().len(), 2);
    }

    #[test]
    fn test_raw_control_reports_data_received_before_failure() {
        let bus = MockBus::new().with_device(switch());
        bus.queue_response(MockResponse::Data(vec![0xAA, 0xBB]));
        bus.queue_response(MockResponse::Fail(BusError::status(-9)));

        let mut received = Vec::new();
        let err = raw_control(
            &bus,
            &ToolConfig::default(),
            &raw_request(2, None),
            observer(),
            |outcome| received.push(outcome.data().to_vec()),
        )
        .unwrap_err();

        assert_eq!(err.exit_code(), -9);
        assert_eq!(received, vec![vec![0xAA, 0xBB]]);
        assert_eq!(bus.open_handles(), 0);
    }

    #[test]
    fn test_raw_control_huge_count_fails_on_first_transfer() {
        let bus = MockBus::new().with_device(switch());
        bus.queue_response(MockResponse::Fail(BusError::status(-9)));

        let err = raw_control(
            &bus,
            &ToolConfig::default(),
            &raw_request(u32::MAX, None),
            observer(),
            ignore,
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), -9);
        assert_eq!(bus.transfers().len(), 1);
    }

    #[test]
    fn test_raw_control_claims_when_asked() {
        let bus = MockBus::new().with_device(switch().with_driver());
        let mut request = raw_request(1, Some(0));
        request.setup = SetupPacket::new(0x01, 0x0B, 0x0001, 0x0000, 0);

        raw_control(&bus, &ToolConfig::default(), &request, observer(), ignore).unwrap();

        let calls = bus.calls();
        assert!(calls.contains(&BusCall::DetachDriver(0)));
        assert!(calls.contains(&BusCall::ClaimInterface(0)));
        assert!(calls.contains(&BusCall::ReleaseInterface(0)));
        assert!(bus.driver_bound(0));
    }

    #[test]
    fn test_raw_control_missing_device() {
        let bus = MockBus::new();
        let err = raw_control(
            &bus,
            &ToolConfig::default(),
            &raw_request(1, None),
            observer(),
            ignore,
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), -19);
    }
}
