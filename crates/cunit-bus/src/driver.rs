//! Addressed device driver with retrying parameter accessors
//!
//! A [`Driver`] is a short-lived value that borrows the bus handle and targets
//! one address. Every logical parameter is reached through a [`Parameter`]
//! accessor. Retrying accessors never return errors: they resolve to
//! `Some(value)` or `None` once the attempt budget is spent.

use cunit_core::{Address, Frame, Udid};
use std::marker::PhantomData;
use thiserror::Error;
use tracing::{debug, warn};

use crate::bus::BusHandle;
use crate::transport::TransportError;

/// Device bus command codes
pub mod cmd {
    pub const GET_DEVICE_TYPE: u8 = 0x01;
    pub const GET_MODIFICATION_VERSION: u8 = 0x02;
    pub const GET_HARDWARE_VERSION: u8 = 0x03;
    pub const GET_FIRMWARE_VERSION: u8 = 0x04;
    pub const GET_DESCRIPTION: u8 = 0x05;
    pub const GET_UDID: u8 = 0x06;

    /// Set on a read command code to form the matching write command
    pub const WRITE_FLAG: u8 = 0x80;
}

/// Write command code for a parameter read with `get_command`
pub const fn write_command(get_command: u8) -> u8 {
    get_command | cmd::WRITE_FLAG
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Unexpected response: address {address}, command {command:#04x}")]
    UnexpectedResponse { address: Address, command: u8 },
    #[error("Cannot decode response to command {command:#04x}: {reason}")]
    Decode { command: u8, reason: String },
    #[error("Parameter {0:#04x} is read-only")]
    ReadOnly(u8),
}

/// Conversion between parameter values and frame payloads
pub trait ParamValue: Sized + Send + Sync {
    fn decode(payload: &[u8]) -> Result<Self, String>;
    fn encode(&self) -> Vec<u8>;
}

impl ParamValue for String {
    fn decode(payload: &[u8]) -> Result<Self, String> {
        std::str::from_utf8(payload)
            .map(|s| s.trim_end_matches('\0').to_string())
            .map_err(|e| e.to_string())
    }

    fn encode(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl ParamValue for Udid {
    fn decode(payload: &[u8]) -> Result<Self, String> {
        if payload.is_empty() {
            return Err("empty identifier".to_string());
        }
        Ok(Udid::from_bytes(payload))
    }

    fn encode(&self) -> Vec<u8> {
        self.to_bytes()
            .unwrap_or_else(|| self.as_str().as_bytes().to_vec())
    }
}

impl ParamValue for f32 {
    fn decode(payload: &[u8]) -> Result<Self, String> {
        let bytes: [u8; 4] = payload
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| format!("expected 4 bytes, got {}", payload.len()))?;
        Ok(f32::from_le_bytes(bytes))
    }

    fn encode(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
}

impl ParamValue for bool {
    fn decode(payload: &[u8]) -> Result<Self, String> {
        payload
            .first()
            .map(|b| *b != 0)
            .ok_or_else(|| "empty payload".to_string())
    }

    fn encode(&self) -> Vec<u8> {
        vec![u8::from(*self)]
    }
}

/// Driver bound to one device address
pub struct Driver<'a> {
    bus: &'a BusHandle,
    address: Address,
}

impl<'a> Driver<'a> {
    pub fn new(bus: &'a BusHandle, address: Address) -> Self {
        Self { bus, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn device_type(&self) -> Parameter<'a, String> {
        self.parameter(cmd::GET_DEVICE_TYPE, false)
    }

    pub fn udid(&self) -> Parameter<'a, Udid> {
        self.parameter(cmd::GET_UDID, false)
    }

    pub fn modification_version(&self) -> Parameter<'a, String> {
        self.parameter(cmd::GET_MODIFICATION_VERSION, false)
    }

    pub fn hardware_version(&self) -> Parameter<'a, String> {
        self.parameter(cmd::GET_HARDWARE_VERSION, false)
    }

    pub fn firmware_version(&self) -> Parameter<'a, String> {
        self.parameter(cmd::GET_FIRMWARE_VERSION, false)
    }

    pub fn description(&self) -> Parameter<'a, String> {
        self.parameter(cmd::GET_DESCRIPTION, false)
    }

    /// Accessor for a device-specific parameter
    pub fn parameter<V: ParamValue>(&self, get_command: u8, writable: bool) -> Parameter<'a, V> {
        Parameter {
            bus: self.bus,
            address: self.address,
            get_command,
            writable,
            _value: PhantomData,
        }
    }

    /// Single request/response exchange with this device
    pub async fn exchange(&self, command: u8, payload: Vec<u8>) -> Result<Frame, DriverError> {
        exchange(self.bus, Frame::new(self.address, command, payload)).await
    }
}

/// One logical parameter of one device
pub struct Parameter<'a, V> {
    bus: &'a BusHandle,
    address: Address,
    get_command: u8,
    writable: bool,
    _value: PhantomData<fn() -> V>,
}

impl<V: ParamValue> Parameter<'_, V> {
    pub fn command(&self) -> u8 {
        self.get_command
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Issue the read request once
    pub async fn get_value(&self) -> Result<V, DriverError> {
        let response = exchange(self.bus, Frame::request(self.address, self.get_command)).await?;
        V::decode(&response.payload).map_err(|reason| DriverError::Decode {
            command: self.get_command,
            reason,
        })
    }

    /// Issue the read request up to `max_attempts` times back-to-back.
    ///
    /// Returns the first successful value, or `None` when every attempt failed.
    pub async fn get_value_sequence(&self, max_attempts: u32) -> Option<V> {
        for attempt in 1..=max_attempts {
            match self.get_value().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            address = self.address,
                            command = self.get_command,
                            attempt = attempt,
                            "Parameter query succeeded after retry"
                        );
                    }
                    return Some(value);
                }
                Err(e) => {
                    debug!(
                        address = self.address,
                        command = self.get_command,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Parameter query attempt failed"
                    );
                }
            }
        }

        warn!(
            address = self.address,
            command = self.get_command,
            attempts = max_attempts,
            "Parameter query exhausted retries"
        );
        None
    }

    /// Issue the write request once
    pub async fn set_value(&self, value: &V) -> Result<(), DriverError> {
        if !self.writable {
            return Err(DriverError::ReadOnly(self.get_command));
        }
        let frame = Frame::new(self.address, write_command(self.get_command), value.encode());
        exchange(self.bus, frame).await.map(|_| ())
    }

    /// Issue the write request up to `max_attempts` times; `true` on success
    pub async fn set_value_sequence(&self, value: &V, max_attempts: u32) -> bool {
        for attempt in 1..=max_attempts {
            match self.set_value(value).await {
                Ok(()) => return true,
                Err(DriverError::ReadOnly(command)) => {
                    warn!(address = self.address, command = command, "Write to read-only parameter");
                    return false;
                }
                Err(e) => {
                    debug!(
                        address = self.address,
                        command = self.get_command,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Parameter write attempt failed"
                    );
                }
            }
        }

        warn!(
            address = self.address,
            command = self.get_command,
            attempts = max_attempts,
            "Parameter write exhausted retries"
        );
        false
    }
}

/// Exchange a frame and check the response answers it
async fn exchange(bus: &BusHandle, request: Frame) -> Result<Frame, DriverError> {
    let expected = Frame::request(request.address, request.command);
    let response = bus.transceive(request).await?;

    if !expected.is_answered_by(&response) {
        return Err(DriverError::UnexpectedResponse {
            address: response.address,
            command: response.command,
        });
    }

    Ok(response)
}
