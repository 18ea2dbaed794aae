//! Binary frames addressed to the server itself

use cunit_core::{Address, Answer, Frame, MAX_PAYLOAD_LEN};
use tracing::{info, warn};

use super::ParseContext;

/// Bus address reserved for the server
pub const SERVER_ADDRESS: Address = 0xFF;

/// Server command codes
pub mod server_cmd {
    pub const GET_DEVICE_LIST: u8 = 0x01;
    pub const ADD_DEVICE: u8 = 0x02;
    pub const REMOVE_DEVICE: u8 = 0x03;
    pub const GET_VERSION: u8 = 0x04;
}

const SUCCESS: u8 = 1;
const FAILURE: u8 = 0;

pub struct ServerRawParser;

impl ServerRawParser {
    pub async fn parse(&self, payload: &[u8], ctx: &mut ParseContext<'_>) -> Option<Answer> {
        let request = Frame::decode(payload).ok()?;
        if request.address != SERVER_ADDRESS {
            return None;
        }

        let data = match request.command {
            server_cmd::GET_DEVICE_LIST => listing_payload(&ctx.registry.listing().render()),
            server_cmd::ADD_DEVICE => {
                let added = match request.payload.first() {
                    Some(&address) => ctx.registry.add_device(ctx.bus, address).await,
                    None => false,
                };
                vec![if added { SUCCESS } else { FAILURE }]
            }
            server_cmd::REMOVE_DEVICE => {
                let removed = request
                    .payload
                    .first()
                    .and_then(|&address| ctx.registry.remove_device(address))
                    .is_some();
                vec![if removed { SUCCESS } else { FAILURE }]
            }
            server_cmd::GET_VERSION => env!("CARGO_PKG_VERSION").as_bytes().to_vec(),
            _ => return None,
        };

        info!(command = request.command, "Server frame handled");
        Some(Answer::Frame(Frame::new(SERVER_ADDRESS, request.command, data)))
    }
}

/// Listing bytes, cut after the last entry that fits in one frame
fn listing_payload(listing: &str) -> Vec<u8> {
    if listing.len() <= MAX_PAYLOAD_LEN {
        return listing.as_bytes().to_vec();
    }

    warn!(len = listing.len(), "Device listing truncated to one frame");
    let mut cut = MAX_PAYLOAD_LEN;
    while !listing.is_char_boundary(cut) {
        cut -= 1;
    }
    let end = listing[..cut].rfind("\r\n").map(|i| i + 2).unwrap_or(0);
    listing[..end].as_bytes().to_vec()
}
