//! IEEE 488.2 common commands

use cunit_core::Answer;

use super::scpi::ScpiCommand;

/// Manufacturer and model fields of the `*IDN?` reply
const IDENTITY: &str = "CU4,Control Unit Server,0";

pub struct CommonScpiParser;

impl CommonScpiParser {
    pub fn parse(&self, payload: &[u8]) -> Option<Answer> {
        let command = ScpiCommand::parse(payload)?;

        let answer = match (command.headers.as_slice(), command.query) {
            ([header], true) if header.eq_ignore_ascii_case("*IDN") => {
                Answer::text(format!("{},{}", IDENTITY, env!("CARGO_PKG_VERSION")))
            }
            ([header], true) if header.eq_ignore_ascii_case("*OPC") => Answer::text("1"),
            ([header], false)
                if header.eq_ignore_ascii_case("*CLS") || header.eq_ignore_ascii_case("*RST") =>
            {
                Answer::ok()
            }
            _ => return None,
        };
        Some(answer)
    }
}
