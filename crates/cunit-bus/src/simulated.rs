//! In-process simulated bus
//!
//! Serves identity queries and stores written parameters for a set of
//! simulated devices. Used for dry runs of the daemon without hardware and as
//! the fake instrument in tests. Failures can be injected per command.

use cunit_core::{Address, DeviceInfo, Frame, Udid};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::driver::{cmd, ParamValue};
use crate::transport::{BusIo, TransportError};

/// Payload returned for parameters that were never written (`0.0f32`)
const DEFAULT_PARAMETER: [u8; 4] = [0; 4];

/// A simulated device on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedDevice {
    pub address: Address,
    pub udid: Udid,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub hardware_version: String,
    #[serde(default)]
    pub firmware_version: String,
    #[serde(default)]
    pub modification_version: String,
    #[serde(default)]
    pub description: String,
    /// Commands that never get an answer
    #[serde(skip)]
    silent: HashSet<u8>,
    /// Remaining unanswered requests per command
    #[serde(skip)]
    failures: HashMap<u8, u32>,
    #[serde(skip)]
    parameters: HashMap<u8, Vec<u8>>,
}

impl SimulatedDevice {
    pub fn new(address: Address, udid: Udid, device_type: impl Into<String>) -> Self {
        Self {
            address,
            udid,
            device_type: device_type.into(),
            hardware_version: String::new(),
            firmware_version: String::new(),
            modification_version: String::new(),
            description: String::new(),
            silent: HashSet::new(),
            failures: HashMap::new(),
            parameters: HashMap::new(),
        }
    }

    /// Simulate the device a registry record describes
    pub fn from_info(info: &DeviceInfo) -> Self {
        Self {
            hardware_version: info.hardware_version.clone(),
            firmware_version: info.firmware_version.clone(),
            modification_version: info.modification_version.clone(),
            description: info.description.clone(),
            ..Self::new(info.address, info.udid.clone(), info.device_type.clone())
        }
    }

    pub fn with_versions(
        mut self,
        hardware: impl Into<String>,
        firmware: impl Into<String>,
        modification: impl Into<String>,
    ) -> Self {
        self.hardware_version = hardware.into();
        self.firmware_version = firmware.into();
        self.modification_version = modification.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Never answer `command`
    pub fn with_silent_command(mut self, command: u8) -> Self {
        self.silent.insert(command);
        self
    }

    /// Leave the next `count` requests for `command` unanswered
    pub fn with_failures(mut self, command: u8, count: u32) -> Self {
        self.failures.insert(command, count);
        self
    }

    pub fn with_parameter(mut self, command: u8, value: impl ParamValue) -> Self {
        self.parameters.insert(command, value.encode());
        self
    }

    fn respond(&mut self, request: &Frame) -> Option<Frame> {
        if self.silent.contains(&request.command) {
            return None;
        }
        if let Some(remaining) = self.failures.get_mut(&request.command) {
            if *remaining > 0 {
                *remaining -= 1;
                return None;
            }
        }

        let payload = match request.command {
            cmd::GET_DEVICE_TYPE => self.device_type.encode(),
            cmd::GET_MODIFICATION_VERSION => self.modification_version.encode(),
            cmd::GET_HARDWARE_VERSION => self.hardware_version.encode(),
            cmd::GET_FIRMWARE_VERSION => self.firmware_version.encode(),
            cmd::GET_DESCRIPTION => self.description.encode(),
            cmd::GET_UDID => self.udid.encode(),
            command if command & cmd::WRITE_FLAG != 0 => {
                self.parameters
                    .insert(command & !cmd::WRITE_FLAG, request.payload.clone());
                request.payload.clone()
            }
            command => self
                .parameters
                .get(&command)
                .cloned()
                .unwrap_or_else(|| DEFAULT_PARAMETER.to_vec()),
        };

        Some(Frame::new(self.address, request.command, payload))
    }
}

/// Shared record of every request the simulated bus received
#[derive(Debug, Clone, Default)]
pub struct RequestLog(Arc<Mutex<Vec<Frame>>>);

impl RequestLog {
    fn push(&self, frame: Frame) {
        if let Ok(mut log) = self.0.lock() {
            log.push(frame);
        }
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.0.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Number of requests sent to `address` with `command`
    pub fn count(&self, address: Address, command: u8) -> usize {
        self.frames()
            .iter()
            .filter(|f| f.address == address && f.command == command)
            .count()
    }

    pub fn len(&self) -> usize {
        self.frames().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bus transport answering from simulated devices
pub struct SimulatedBus {
    devices: HashMap<Address, SimulatedDevice>,
    log: RequestLog,
}

impl SimulatedBus {
    pub fn new(devices: Vec<SimulatedDevice>) -> Self {
        Self {
            devices: devices.into_iter().map(|d| (d.address, d)).collect(),
            log: RequestLog::default(),
        }
    }

    /// Handle to the request log; clone it before moving the bus into its task
    pub fn request_log(&self) -> RequestLog {
        self.log.clone()
    }
}

impl BusIo for SimulatedBus {
    async fn exchange(&mut self, request: &Frame) -> Result<Frame, TransportError> {
        self.log.push(request.clone());

        self.devices
            .get_mut(&request.address)
            .and_then(|device| device.respond(request))
            .ok_or(TransportError::NoResponse(request.address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_injected_failures_run_out() {
        let mut bus = SimulatedBus::new(vec![
            SimulatedDevice::new(1, Udid::new("01"), "CU4TDM0").with_failures(cmd::GET_DEVICE_TYPE, 2)
        ]);
        let request = Frame::request(1, cmd::GET_DEVICE_TYPE);

        assert!(bus.exchange(&request).await.is_err());
        assert!(bus.exchange(&request).await.is_err());
        let response = bus.exchange(&request).await.unwrap();
        assert_eq!(response.payload, b"CU4TDM0");
        assert_eq!(bus.request_log().count(1, cmd::GET_DEVICE_TYPE), 3);
    }

    #[tokio::test]
    async fn test_unwritten_parameter_reads_zero() {
        let mut bus = SimulatedBus::new(vec![
            SimulatedDevice::new(1, Udid::new("01"), "CU4TDM0").with_parameter(0x21, 4.2f32)
        ]);

        let zero = bus.exchange(&Frame::request(1, 0x20)).await.unwrap();
        assert_eq!(zero.payload, DEFAULT_PARAMETER.to_vec());
        let set = bus.exchange(&Frame::request(1, 0x21)).await.unwrap();
        assert_eq!(f32::decode(&set.payload).unwrap(), 4.2);
    }

    #[test]
    fn test_simulated_device_from_config() {
        let device: SimulatedDevice = toml::from_str(
            r#"
            address = 2
            udid = "beef"
            type = "CU4SDM0"
            "#,
        )
        .unwrap();
        assert_eq!(device.address, 2);
        assert_eq!(device.udid.to_bytes(), Some(vec![0xbe, 0xef]));
    }
}
