//! Device verification and enrollment over the bus

use cunit_bus::{BusHandle, Driver};
use cunit_core::{Address, DeviceInfo};
use tracing::{debug, info, warn};

/// Attempts for the UDID check at startup
pub const UDID_VERIFY_ATTEMPTS: u32 = 10;

/// Attempts per identity field when enrolling a new device
pub const ENROLL_FIELD_ATTEMPTS: u32 = 5;

/// Check that the device at `info.address` still reports `info.udid`.
///
/// Only the UDID is compared. Type and versions follow from it.
pub async fn verify_device(bus: &BusHandle, info: &DeviceInfo) -> bool {
    debug!(address = info.address, "Verifying device");

    let driver = Driver::new(bus, info.address);
    let Some(udid) = driver.udid().get_value_sequence(UDID_VERIFY_ATTEMPTS).await else {
        warn!(address = info.address, "No UDID answer");
        return false;
    };

    if udid != info.udid {
        warn!(
            address = info.address,
            expected = %info.udid,
            actual = %udid,
            "UDID mismatch"
        );
        return false;
    }

    debug!(address = info.address, udid = %udid, "Device verified");
    true
}

/// Query the full identity profile of the device at `address`.
///
/// Returns `None` as soon as one field exhausts its attempts; no partial
/// record is ever produced.
pub async fn enroll_device(bus: &BusHandle, address: Address) -> Option<DeviceInfo> {
    debug!(address = address, "Enrolling device");

    let driver = Driver::new(bus, address);
    let device_type = driver.device_type().get_value_sequence(ENROLL_FIELD_ATTEMPTS).await?;
    let udid = driver.udid().get_value_sequence(ENROLL_FIELD_ATTEMPTS).await?;
    let modification_version = driver
        .modification_version()
        .get_value_sequence(ENROLL_FIELD_ATTEMPTS)
        .await?;
    let hardware_version = driver
        .hardware_version()
        .get_value_sequence(ENROLL_FIELD_ATTEMPTS)
        .await?;
    let firmware_version = driver
        .firmware_version()
        .get_value_sequence(ENROLL_FIELD_ATTEMPTS)
        .await?;
    let description = driver.description().get_value_sequence(ENROLL_FIELD_ATTEMPTS).await?;

    info!(address = address, udid = %udid, device_type = %device_type, "Device enrolled");

    Some(DeviceInfo {
        address,
        udid,
        device_type,
        hardware_version,
        firmware_version,
        modification_version,
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cunit_bus::{cmd, spawn_bus, SimulatedBus, SimulatedDevice};
    use cunit_core::Udid;

    #[tokio::test]
    async fn test_verify_tolerates_nine_failures() {
        let sim = SimulatedBus::new(vec![
            SimulatedDevice::new(1, Udid::new("01"), "CU4SDM0").with_failures(cmd::GET_UDID, 9)
        ]);
        let bus = spawn_bus(sim);

        let info = DeviceInfo::new(1, Udid::new("01"), "CU4SDM0");
        assert!(verify_device(&bus, &info).await);
    }

    #[tokio::test]
    async fn test_verify_fails_after_ten_attempts() {
        let sim = SimulatedBus::new(vec![
            SimulatedDevice::new(1, Udid::new("01"), "CU4SDM0").with_failures(cmd::GET_UDID, 10)
        ]);
        let log = sim.request_log();
        let bus = spawn_bus(sim);

        let info = DeviceInfo::new(1, Udid::new("01"), "CU4SDM0");
        assert!(!verify_device(&bus, &info).await);
        assert_eq!(log.count(1, cmd::GET_UDID), 10);
    }

    #[tokio::test]
    async fn test_verify_rejects_mismatch() {
        let bus = spawn_bus(SimulatedBus::new(vec![SimulatedDevice::new(
            1,
            Udid::new("02"),
            "CU4SDM0",
        )]));

        let info = DeviceInfo::new(1, Udid::new("01"), "CU4SDM0");
        assert!(!verify_device(&bus, &info).await);
    }

    #[tokio::test]
    async fn test_enroll_reads_every_field() {
        let device = SimulatedDevice::new(8, Udid::new("a1b2"), "CU4TDM1")
            .with_versions("1.1", "4.0", "M1")
            .with_description("Temperature M1");
        let bus = spawn_bus(SimulatedBus::new(vec![device]));

        let info = enroll_device(&bus, 8).await.unwrap();
        assert_eq!(info.address, 8);
        assert_eq!(info.udid, Udid::new("a1b2"));
        assert_eq!(info.device_type, "CU4TDM1");
        assert_eq!(info.hardware_version, "1.1");
        assert_eq!(info.firmware_version, "4.0");
        assert_eq!(info.modification_version, "M1");
        assert_eq!(info.description, "Temperature M1");
    }

    #[tokio::test]
    async fn test_enroll_aborts_on_first_exhausted_field() {
        let sim = SimulatedBus::new(vec![SimulatedDevice::new(8, Udid::new("a1b2"), "CU4TDM1")
            .with_silent_command(cmd::GET_MODIFICATION_VERSION)]);
        let log = sim.request_log();
        let bus = spawn_bus(sim);

        assert!(enroll_device(&bus, 8).await.is_none());
        assert_eq!(log.count(8, cmd::GET_MODIFICATION_VERSION), 5);
        assert_eq!(log.count(8, cmd::GET_HARDWARE_VERSION), 0);
        assert_eq!(log.count(8, cmd::GET_DESCRIPTION), 0);
    }
}
