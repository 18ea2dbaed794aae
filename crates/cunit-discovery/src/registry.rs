//! Authoritative list of validated devices

use cunit_bus::BusHandle;
use cunit_core::{Address, DeviceInfo, DeviceListing};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::store::DeviceStore;
use crate::validate::{enroll_device, verify_device};

/// Registry change notification for presentation clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// Persisted record re-verified at startup
    DeviceVerified(DeviceInfo),
    /// Persisted record failed startup verification and was dropped
    DeviceRejected(DeviceInfo),
    /// New device enrolled
    DeviceAdded(DeviceInfo),
    /// Record removed
    DeviceRemoved(DeviceInfo),
}

/// Outcome of the startup validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
    pub verified: Vec<Address>,
    pub rejected: Vec<Address>,
}

/// Validated devices, unique by address
pub struct DeviceRegistry {
    devices: Vec<DeviceInfo>,
    /// Stored records that failed startup verification, kept for the next start
    unverified: Vec<DeviceInfo>,
    store: Box<dyn DeviceStore>,
    event_tx: broadcast::Sender<RegistryEvent>,
}

impl DeviceRegistry {
    pub fn new(store: impl DeviceStore + 'static) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            devices: Vec::new(),
            unverified: Vec::new(),
            store: Box::new(store),
            event_tx,
        }
    }

    /// Subscribe to registry events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_tx.subscribe()
    }

    /// Load persisted records and keep only those whose UDID re-verifies.
    ///
    /// Failed records are dropped from the registry but left in the store, so
    /// a device that was merely offline is checked again on the next start.
    pub async fn initialize(&mut self, bus: &BusHandle) -> InitReport {
        info!("Initializing device registry");

        let persisted = match self.store.load() {
            Ok(devices) => devices,
            Err(e) => {
                error!(error = %e, "Failed to load device records");
                Vec::new()
            }
        };

        self.devices.clear();
        self.unverified.clear();
        let mut report = InitReport::default();

        for info in persisted {
            let seen = self.get(info.address).is_some()
                || self.unverified.iter().any(|d| d.address == info.address);
            if seen {
                warn!(address = info.address, "Duplicate device record ignored");
                continue;
            }

            if verify_device(bus, &info).await {
                info!(address = info.address, "Device initialization succeeded");
                report.verified.push(info.address);
                self.devices.push(info.clone());
                let _ = self.event_tx.send(RegistryEvent::DeviceVerified(info));
            } else {
                error!(address = info.address, "Device initialization failed");
                report.rejected.push(info.address);
                self.unverified.push(info.clone());
                let _ = self.event_tx.send(RegistryEvent::DeviceRejected(info));
            }
        }

        info!(
            verified = report.verified.len(),
            rejected = report.rejected.len(),
            "Device registry initialized"
        );
        report
    }

    /// Enroll the device at `address`, replacing any existing record there.
    ///
    /// The old record, verified or not, is dropped before enrollment starts.
    /// The new record is committed only if every identity field was read.
    pub async fn add_device(&mut self, bus: &BusHandle, address: Address) -> bool {
        info!(address = address, "Adding device");

        let replaced = self.take(address);
        if let Some(old) = &replaced {
            debug!(address = address, udid = %old.udid, "Dropped existing record");
        }

        let added = match enroll_device(bus, address).await {
            Some(info) => {
                self.devices.push(info.clone());
                let _ = self.event_tx.send(RegistryEvent::DeviceAdded(info));
                true
            }
            None => {
                warn!(address = address, "Device enrollment failed");
                false
            }
        };

        if added || replaced.is_some() {
            self.persist();
        }
        if let (false, Some(old)) = (added, replaced) {
            let _ = self.event_tx.send(RegistryEvent::DeviceRemoved(old));
        }
        added
    }

    /// Remove the record at `address`, including a stored record that failed
    /// startup verification
    pub fn remove_device(&mut self, address: Address) -> Option<DeviceInfo> {
        let removed = self.take(address)?;
        info!(address = address, "Device removed from registry");
        self.persist();
        let _ = self.event_tx.send(RegistryEvent::DeviceRemoved(removed.clone()));
        Some(removed)
    }

    pub fn get(&self, address: Address) -> Option<&DeviceInfo> {
        self.devices.iter().find(|d| d.address == address)
    }

    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Listing of the current devices in registry order
    pub fn listing(&self) -> DeviceListing {
        DeviceListing::from_devices(&self.devices)
    }

    /// Records that failed startup verification but stay in the store
    pub fn unverified(&self) -> &[DeviceInfo] {
        &self.unverified
    }

    /// Detach the record at `address` from both lists; the verified one wins
    fn take(&mut self, address: Address) -> Option<DeviceInfo> {
        let stale = self
            .unverified
            .iter()
            .position(|d| d.address == address)
            .map(|index| self.unverified.remove(index));
        let current = self
            .devices
            .iter()
            .position(|d| d.address == address)
            .map(|index| self.devices.remove(index));
        current.or(stale)
    }

    /// Save verified records followed by the unverified ones
    fn persist(&mut self) {
        let records: Vec<DeviceInfo> = self
            .devices
            .iter()
            .chain(&self.unverified)
            .cloned()
            .collect();
        if let Err(e) = self.store.save(&records) {
            warn!(error = %e, "Failed to persist device records");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use cunit_bus::{cmd, spawn_bus, SimulatedBus, SimulatedDevice};
    use cunit_core::Udid;

    fn record(address: Address, udid: &str) -> DeviceInfo {
        DeviceInfo::new(address, Udid::new(udid), "CU4SDM1")
    }

    fn simulated(address: Address, udid: &str) -> SimulatedDevice {
        SimulatedDevice::new(address, Udid::new(udid), "CU4SDM1")
    }

    #[tokio::test]
    async fn test_initialize_keeps_only_verified() {
        // 1 answers correctly, 2 reports another UDID, 3 is silent, 4 is absent
        let bus = spawn_bus(SimulatedBus::new(vec![
            simulated(1, "01"),
            simulated(2, "ff"),
            simulated(3, "03").with_silent_command(cmd::GET_UDID),
            simulated(5, "05"),
        ]));
        let store = MemoryStore::new(vec![
            record(4, "04"),
            record(1, "01"),
            record(2, "02"),
            record(5, "05"),
            record(3, "03"),
        ]);
        let mut registry = DeviceRegistry::new(store.clone());

        let report = registry.initialize(&bus).await;

        assert_eq!(report.verified, vec![1, 5]);
        assert_eq!(report.rejected, vec![4, 2, 3]);
        let kept: Vec<Address> = registry.devices().iter().map(|d| d.address).collect();
        assert_eq!(kept, vec![1, 5]);
        // Store keeps the full list for the next start
        assert_eq!(store.snapshot().len(), 5);
    }

    #[tokio::test]
    async fn test_initialize_publishes_events() {
        let bus = spawn_bus(SimulatedBus::new(vec![simulated(1, "01")]));
        let mut registry =
            DeviceRegistry::new(MemoryStore::new(vec![record(1, "01"), record(2, "02")]));
        let mut events = registry.subscribe();

        registry.initialize(&bus).await;

        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::DeviceVerified(record(1, "01"))
        );
        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::DeviceRejected(record(2, "02"))
        );
    }

    #[tokio::test]
    async fn test_add_device_commits_on_success() {
        let bus = spawn_bus(SimulatedBus::new(vec![simulated(6, "66").with_description("new")]));
        let store = MemoryStore::default();
        let mut registry = DeviceRegistry::new(store.clone());

        assert!(registry.add_device(&bus, 6).await);
        let info = registry.get(6).unwrap();
        assert_eq!(info.udid, Udid::new("66"));
        assert_eq!(info.description, "new");
        assert_eq!(store.snapshot(), registry.devices().to_vec());
    }

    #[tokio::test]
    async fn test_add_device_failure_leaves_registry_unchanged() {
        for silent in [
            cmd::GET_DEVICE_TYPE,
            cmd::GET_UDID,
            cmd::GET_MODIFICATION_VERSION,
            cmd::GET_HARDWARE_VERSION,
            cmd::GET_FIRMWARE_VERSION,
            cmd::GET_DESCRIPTION,
        ] {
            let bus = spawn_bus(SimulatedBus::new(vec![
                simulated(1, "01"),
                simulated(6, "66").with_silent_command(silent),
            ]));
            let store = MemoryStore::new(vec![record(1, "01")]);
            let mut registry = DeviceRegistry::new(store.clone());
            registry.initialize(&bus).await;
            let before = registry.devices().to_vec();

            assert!(!registry.add_device(&bus, 6).await);
            assert_eq!(registry.devices(), before.as_slice());
            assert_eq!(store.snapshot(), before);
        }
    }

    #[tokio::test]
    async fn test_add_device_replaces_existing_address() {
        let bus = spawn_bus(SimulatedBus::new(vec![simulated(1, "0b")]));
        let mut registry = DeviceRegistry::new(MemoryStore::default());

        assert!(registry.add_device(&bus, 1).await);
        assert!(registry.add_device(&bus, 1).await);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(1).unwrap().udid, Udid::new("0b"));
    }

    #[tokio::test]
    async fn test_failed_re_add_drops_old_record() {
        let bus = spawn_bus(SimulatedBus::new(vec![simulated(1, "01")]));
        let mut registry = DeviceRegistry::new(MemoryStore::new(vec![record(1, "01")]));
        registry.initialize(&bus).await;

        let silent_bus = spawn_bus(SimulatedBus::new(Vec::new()));
        assert!(!registry.add_device(&silent_bus, 1).await);
        assert!(registry.get(1).is_none());
    }

    #[tokio::test]
    async fn test_remove_device() {
        let bus = spawn_bus(SimulatedBus::new(vec![simulated(1, "01"), simulated(2, "02")]));
        let store = MemoryStore::new(vec![record(1, "01"), record(2, "02")]);
        let mut registry = DeviceRegistry::new(store.clone());
        registry.initialize(&bus).await;

        assert_eq!(registry.remove_device(1).map(|d| d.address), Some(1));
        assert!(registry.remove_device(1).is_none());
        assert_eq!(store.snapshot(), vec![record(2, "02")]);
    }

    #[tokio::test]
    async fn test_offline_records_survive_add_and_remove() {
        // 2 is offline at startup
        let bus = spawn_bus(SimulatedBus::new(vec![
            simulated(1, "01"),
            simulated(3, "03"),
            simulated(4, "04"),
        ]));
        let store = MemoryStore::new(vec![record(1, "01"), record(2, "02"), record(4, "04")]);
        let mut registry = DeviceRegistry::new(store.clone());
        registry.initialize(&bus).await;
        assert_eq!(registry.unverified(), &[record(2, "02")]);

        assert!(registry.add_device(&bus, 3).await);
        let stored: Vec<Address> = store.snapshot().iter().map(|d| d.address).collect();
        assert_eq!(stored, vec![1, 4, 3, 2]);

        assert!(registry.remove_device(4).is_some());
        let stored: Vec<Address> = store.snapshot().iter().map(|d| d.address).collect();
        assert_eq!(stored, vec![1, 3, 2]);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_add_and_remove_replace_offline_record() {
        let bus = spawn_bus(SimulatedBus::new(vec![simulated(5, "55")]));
        let store = MemoryStore::new(vec![record(2, "02"), record(5, "05"), record(7, "07")]);
        let mut registry = DeviceRegistry::new(store.clone());
        registry.initialize(&bus).await;
        assert!(registry.is_empty());

        // Re-enrolling 5 supersedes its stale record
        assert!(registry.add_device(&bus, 5).await);
        assert_eq!(registry.get(5).unwrap().udid, Udid::new("55"));
        let stored: Vec<(Address, String)> = store
            .snapshot()
            .iter()
            .map(|d| (d.address, d.udid.to_string()))
            .collect();
        assert_eq!(
            stored,
            vec![(5, "55".to_string()), (2, "02".to_string()), (7, "07".to_string())]
        );

        assert_eq!(registry.remove_device(2), Some(record(2, "02")));
        assert!(registry.remove_device(2).is_none());
        let stored: Vec<Address> = store.snapshot().iter().map(|d| d.address).collect();
        assert_eq!(stored, vec![5, 7]);
    }

    #[tokio::test]
    async fn test_listing_follows_registry_order() {
        let bus = spawn_bus(SimulatedBus::new(vec![simulated(9, "09"), simulated(2, "02")]));
        let mut registry =
            DeviceRegistry::new(MemoryStore::new(vec![record(9, "09"), record(2, "02")]));
        registry.initialize(&bus).await;

        assert_eq!(
            registry.listing().render(),
            "DevCount: 2\r\n;<br>Dev0: address=9: type=CU4SDM1\r\n;<br>Dev1: address=2: type=CU4SDM1\r\n"
        );
    }
}
