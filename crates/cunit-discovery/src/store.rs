//! Persisted device records

use cunit_core::DeviceInfo;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse device file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize device file: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Device store is unavailable")]
    Unavailable,
}

/// Storage for the registry's device records
pub trait DeviceStore: Send + Sync {
    fn load(&self) -> Result<Vec<DeviceInfo>, StoreError>;
    fn save(&mut self, devices: &[DeviceInfo]) -> Result<(), StoreError>;
}

/// In-memory store. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    devices: Arc<Mutex<Vec<DeviceInfo>>>,
}

impl MemoryStore {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self {
            devices: Arc::new(Mutex::new(devices)),
        }
    }

    pub fn snapshot(&self) -> Vec<DeviceInfo> {
        self.devices.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

impl DeviceStore for MemoryStore {
    fn load(&self) -> Result<Vec<DeviceInfo>, StoreError> {
        self.devices
            .lock()
            .map(|d| d.clone())
            .map_err(|_| StoreError::Unavailable)
    }

    fn save(&mut self, devices: &[DeviceInfo]) -> Result<(), StoreError> {
        let mut stored = self.devices.lock().map_err(|_| StoreError::Unavailable)?;
        *stored = devices.to_vec();
        Ok(())
    }
}

/// On-disk layout: a `[[device]]` array
#[derive(Debug, Default, Serialize, Deserialize)]
struct DeviceFile {
    #[serde(default)]
    device: Vec<DeviceInfo>,
}

/// Device records kept in a TOML file
#[derive(Debug, Clone)]
pub struct TomlDeviceStore {
    path: PathBuf,
}

impl TomlDeviceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DeviceStore for TomlDeviceStore {
    fn load(&self) -> Result<Vec<DeviceInfo>, StoreError> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "Device file not found, starting empty");
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        let file: DeviceFile = toml::from_str(&content)?;
        info!(path = %self.path.display(), devices = file.device.len(), "Loaded device records");
        Ok(file.device)
    }

    fn save(&mut self, devices: &[DeviceInfo]) -> Result<(), StoreError> {
        let file = DeviceFile {
            device: devices.to_vec(),
        };
        let content = toml::to_string_pretty(&file)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}
