//! `SYSTem` subsystem: registry management and server information

use cunit_core::Answer;
use tracing::info;

use super::scpi::ScpiCommand;
use super::ParseContext;

const ROOT: &str = "SYSTem";

pub struct SystemScpiParser;

impl SystemScpiParser {
    pub async fn parse(&self, payload: &[u8], ctx: &mut ParseContext<'_>) -> Option<Answer> {
        let command = ScpiCommand::parse(payload)?;
        if !command.is_under(ROOT) {
            return None;
        }

        let answer = if command.query {
            if command.matches(&[ROOT, "DEVList"]) {
                Answer::Text(ctx.registry.listing().render())
            } else if command.matches(&[ROOT, "DEVCount"]) {
                Answer::text(ctx.registry.len().to_string())
            } else if command.matches(&[ROOT, "VERSion"]) {
                Answer::text(env!("CARGO_PKG_VERSION"))
            } else {
                return None;
            }
        } else if command.matches(&[ROOT, "ADDDevice"]) {
            match command.address_arg(0) {
                Ok(address) => {
                    info!(address = address, "Client requested device enrollment");
                    if ctx.registry.add_device(ctx.bus, address).await {
                        Answer::ok()
                    } else {
                        Answer::error(format!("device {} did not respond", address))
                    }
                }
                Err(reason) => Answer::error(reason),
            }
        } else if command.matches(&[ROOT, "REMDevice"]) {
            match command.address_arg(0) {
                Ok(address) => match ctx.registry.remove_device(address) {
                    Some(_) => Answer::ok(),
                    None => Answer::error(format!("no device at address {}", address)),
                },
                Err(reason) => Answer::error(reason),
            }
        } else {
            return None;
        };
        Some(answer)
    }
}
