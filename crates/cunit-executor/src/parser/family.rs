//! Parameter subsystems of one device family (`SSPD`, `TEMPerature`)
//!
//! A family parser owns a table of parameters, each mapped to a bus command
//! code. Queries read the parameter from the addressed device, set commands
//! write it. The addressed device must be registered and of the family's kind.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use cunit_bus::Driver;
use cunit_core::{Answer, DeviceKind};
use cunit_discovery::DeviceRegistry;
use tracing::{debug, error};

use super::scpi::{parse_flag, short_form, ScpiCommand};
use super::{ParseContext, QUERY_ATTEMPTS};

/// Wire representation of a parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Little-endian `f32`
    Float,
    /// Single `0`/`1` byte
    Flag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyParameter {
    pub mnemonic: &'static str,
    /// Read command; the write command sets the write flag on it
    pub command: u8,
    pub kind: ValueKind,
    pub writable: bool,
}

impl FamilyParameter {
    const fn read_only(mnemonic: &'static str, command: u8, kind: ValueKind) -> Self {
        Self {
            mnemonic,
            command,
            kind,
            writable: false,
        }
    }

    const fn read_write(mnemonic: &'static str, command: u8, kind: ValueKind) -> Self {
        Self {
            mnemonic,
            command,
            kind,
            writable: true,
        }
    }
}

pub const SSPD_PARAMETERS: &[FamilyParameter] = &[
    FamilyParameter::read_write("CURRent", 0x10, ValueKind::Float),
    FamilyParameter::read_only("VOLTage", 0x11, ValueKind::Float),
    FamilyParameter::read_only("COUNter", 0x12, ValueKind::Float),
    FamilyParameter::read_write("SHORt", 0x13, ValueKind::Flag),
    FamilyParameter::read_write("AMPlifier", 0x14, ValueKind::Flag),
];

pub const TEMPERATURE_PARAMETERS: &[FamilyParameter] = &[
    FamilyParameter::read_only("VALue", 0x20, ValueKind::Float),
    FamilyParameter::read_only("PRESsure", 0x21, ValueKind::Float),
    FamilyParameter::read_write("CURRent", 0x22, ValueKind::Float),
    FamilyParameter::read_only("VOLTage", 0x23, ValueKind::Float),
];

pub struct FamilyScpiParser {
    root: &'static str,
    kind: DeviceKind,
    parameters: Vec<FamilyParameter>,
    /// Uppercase short and long mnemonics to parameter index
    lookup: HashMap<String, usize>,
}

impl FamilyScpiParser {
    pub fn new(root: &'static str, kind: DeviceKind, parameters: Vec<FamilyParameter>) -> Self {
        Self {
            root,
            kind,
            parameters,
            lookup: HashMap::new(),
        }
    }

    pub fn sspd() -> Self {
        Self::new("SSPD", DeviceKind::Sspd, SSPD_PARAMETERS.to_vec())
    }

    pub fn temperature() -> Self {
        Self::new(
            "TEMPerature",
            DeviceKind::Temperature,
            TEMPERATURE_PARAMETERS.to_vec(),
        )
    }

    /// Build the mnemonic lookup table. A mnemonic already claimed by an
    /// earlier parameter is rejected and logged.
    pub fn initialize(&mut self, registry: &DeviceRegistry) {
        self.lookup.clear();

        for (index, parameter) in self.parameters.iter().enumerate() {
            let long = parameter.mnemonic.to_ascii_uppercase();
            let short = short_form(parameter.mnemonic);
            let keys = if short == long { vec![long] } else { vec![short, long] };

            for key in keys {
                match self.lookup.entry(key) {
                    Entry::Vacant(slot) => {
                        slot.insert(index);
                    }
                    Entry::Occupied(slot) => {
                        error!(
                            family = self.root,
                            mnemonic = parameter.mnemonic,
                            existing = self.parameters[*slot.get()].mnemonic,
                            "Duplicate mnemonic rejected"
                        );
                    }
                }
            }
        }

        let devices = registry
            .devices()
            .iter()
            .filter(|d| d.kind() == self.kind)
            .count();
        debug!(
            family = self.root,
            parameters = self.parameters.len(),
            devices = devices,
            "Family parser initialized"
        );
    }

    /// Parameter named by `token` in either form
    pub fn parameter(&self, token: &str) -> Option<&FamilyParameter> {
        self.lookup
            .get(&token.to_ascii_uppercase())
            .and_then(|&index| self.parameters.get(index))
    }

    pub async fn parse(&self, payload: &[u8], ctx: &mut ParseContext<'_>) -> Option<Answer> {
        let command = ScpiCommand::parse(payload)?;
        if command.headers.len() != 2 || !command.is_under(self.root) {
            return None;
        }
        let parameter = *self.parameter(&command.headers[1])?;

        let address = match command.address_arg(0) {
            Ok(address) => address,
            Err(reason) => return Some(Answer::error(reason)),
        };
        match ctx.registry.get(address) {
            None => return Some(Answer::error(format!("no device at address {}", address))),
            Some(info) if info.kind() != self.kind => {
                return Some(Answer::error(format!(
                    "device {} is not a {} device",
                    address, self.kind
                )))
            }
            Some(_) => {}
        }

        let driver = Driver::new(ctx.bus, address);
        let answer = if command.query {
            match read(&driver, parameter).await {
                Some(value) => Answer::text(value),
                None => Answer::error(format!("device {} did not respond", address)),
            }
        } else {
            write(&driver, parameter, command.arg(1)).await
        };
        Some(answer)
    }
}

async fn read(driver: &Driver<'_>, parameter: FamilyParameter) -> Option<String> {
    match parameter.kind {
        ValueKind::Float => driver
            .parameter::<f32>(parameter.command, parameter.writable)
            .get_value_sequence(QUERY_ATTEMPTS)
            .await
            .map(|value| value.to_string()),
        ValueKind::Flag => driver
            .parameter::<bool>(parameter.command, parameter.writable)
            .get_value_sequence(QUERY_ATTEMPTS)
            .await
            .map(|value| if value { "1" } else { "0" }.to_string()),
    }
}

async fn write(driver: &Driver<'_>, parameter: FamilyParameter, arg: Option<&str>) -> Answer {
    if !parameter.writable {
        return Answer::error(format!("{} is read-only", parameter.mnemonic));
    }
    let Some(arg) = arg else {
        return Answer::error("missing value");
    };

    let written = match parameter.kind {
        ValueKind::Float => {
            let Ok(value) = arg.parse::<f32>() else {
                return Answer::error(format!("invalid number '{}'", arg));
            };
            driver
                .parameter::<f32>(parameter.command, true)
                .set_value_sequence(&value, QUERY_ATTEMPTS)
                .await
        }
        ValueKind::Flag => {
            let Some(value) = parse_flag(arg) else {
                return Answer::error(format!("invalid flag '{}'", arg));
            };
            driver
                .parameter::<bool>(parameter.command, true)
                .set_value_sequence(&value, QUERY_ATTEMPTS)
                .await
        }
    };

    if written {
        Answer::ok()
    } else {
        Answer::error(format!("device {} did not respond", driver.address()))
    }
}
