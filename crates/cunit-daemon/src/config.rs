//! Configuration loading

use anyhow::{Context, Result};
use cunit_bus::{SimulatedDevice, DEFAULT_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
    /// Devices answered by the simulated bus
    #[serde(default, rename = "simulated_device")]
    pub simulated_devices: Vec<SimulatedDevice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for client connections
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Pause between dispatch ticks in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl ServerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:9876".to_string()
}

fn default_tick_interval() -> u64 {
    10
}

/// Device bus transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// RS-485 gateway reached over TCP
    Tcp,
    /// Local RS-485 serial port
    Serial,
    /// In-process devices from `[[simulated_device]]`
    #[default]
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub kind: BusKind,
    /// Gateway host for the TCP bus
    #[serde(default = "default_host")]
    pub host: String,
    /// Gateway port for the TCP bus
    #[serde(default = "default_port")]
    pub port: u16,
    /// Serial device path
    #[serde(default = "default_serial_port")]
    pub serial_port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Response timeout per exchange in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            kind: BusKind::default(),
            host: default_host(),
            port: default_port(),
            serial_port: default_serial_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4001
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesConfig {
    /// Path of the persisted device records
    #[serde(default = "default_devices_path")]
    pub path: String,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            path: default_devices_path(),
        }
    }
}

fn default_devices_path() -> String {
    "./devices.toml".to_string()
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
