//! cunit discovery - the validated device registry
//!
//! This crate owns the authoritative list of known devices:
//! - Startup validation of persisted records by UDID
//! - Enrollment of newly addressed devices
//! - Persistence through a pluggable device store

pub mod registry;
pub mod store;
pub mod validate;

pub use registry::{DeviceRegistry, InitReport, RegistryEvent};
pub use store::{DeviceStore, MemoryStore, StoreError, TomlDeviceStore};
pub use validate::{enroll_device, verify_device, ENROLL_FIELD_ATTEMPTS, UDID_VERIFY_ATTEMPTS};
