//! `GENeral` subsystem: live identity queries for registered devices

use cunit_bus::Driver;
use cunit_core::{Address, Answer};

use super::scpi::ScpiCommand;
use super::{ParseContext, QUERY_ATTEMPTS};

const ROOT: &str = "GENeral";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    DeviceType,
    Udid,
    ModificationVersion,
    HardwareVersion,
    FirmwareVersion,
    Description,
}

const FIELDS: &[(&str, Field)] = &[
    ("DEVType", Field::DeviceType),
    ("UDID", Field::Udid),
    ("MODVersion", Field::ModificationVersion),
    ("HWVersion", Field::HardwareVersion),
    ("FWVersion", Field::FirmwareVersion),
    ("DESCription", Field::Description),
];

pub struct GeneralScpiParser;

impl GeneralScpiParser {
    pub async fn parse(&self, payload: &[u8], ctx: &mut ParseContext<'_>) -> Option<Answer> {
        let command = ScpiCommand::parse(payload)?;
        if !command.query || !command.is_under(ROOT) {
            return None;
        }
        let field = FIELDS
            .iter()
            .find(|(mnemonic, _)| command.matches(&[ROOT, *mnemonic]))
            .map(|(_, field)| *field)?;

        let address = match command.address_arg(0) {
            Ok(address) => address,
            Err(reason) => return Some(Answer::error(reason)),
        };
        if ctx.registry.get(address).is_none() {
            return Some(Answer::error(format!("no device at address {}", address)));
        }

        let value = query(Driver::new(ctx.bus, address), field).await;
        Some(match value {
            Some(value) => Answer::text(value),
            None => Answer::error(no_response(address)),
        })
    }
}

async fn query(driver: Driver<'_>, field: Field) -> Option<String> {
    match field {
        Field::DeviceType => driver.device_type().get_value_sequence(QUERY_ATTEMPTS).await,
        Field::Udid => driver
            .udid()
            .get_value_sequence(QUERY_ATTEMPTS)
            .await
            .map(|udid| udid.to_string()),
        Field::ModificationVersion => {
            driver
                .modification_version()
                .get_value_sequence(QUERY_ATTEMPTS)
                .await
        }
        Field::HardwareVersion => driver.hardware_version().get_value_sequence(QUERY_ATTEMPTS).await,
        Field::FirmwareVersion => driver.firmware_version().get_value_sequence(QUERY_ATTEMPTS).await,
        Field::Description => driver.description().get_value_sequence(QUERY_ATTEMPTS).await,
    }
}

fn no_response(address: Address) -> String {
    format!("device {} did not respond", address)
}
