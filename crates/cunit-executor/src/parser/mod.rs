//! Protocol parsers and the ordered chain that dispatches to them
//!
//! Each parser inspects a raw payload and either consumes it, producing an
//! [`Answer`], or passes. The chain tries parsers in a fixed priority order
//! and stops at the first one that consumes the payload, so overlapping
//! grammars are resolved by position alone.

pub mod common;
pub mod device_raw;
pub mod family;
pub mod general;
pub mod scpi;
pub mod server_raw;
pub mod system;

use cunit_bus::BusHandle;
use cunit_core::Answer;
use cunit_discovery::DeviceRegistry;
use tracing::{debug, info};

pub use common::CommonScpiParser;
pub use device_raw::DeviceRawParser;
pub use family::{FamilyParameter, FamilyScpiParser, ValueKind};
pub use general::GeneralScpiParser;
pub use scpi::ScpiCommand;
pub use server_raw::{ServerRawParser, SERVER_ADDRESS};
pub use system::SystemScpiParser;

/// Attempt budget for driver queries issued on behalf of a client
pub const QUERY_ATTEMPTS: u32 = 5;

/// State a parser may touch while handling one command
pub struct ParseContext<'a> {
    pub registry: &'a mut DeviceRegistry,
    pub bus: &'a BusHandle,
}

/// One protocol grammar
pub enum Parser {
    ServerRaw(ServerRawParser),
    DeviceRaw(DeviceRawParser),
    Common(CommonScpiParser),
    System(SystemScpiParser),
    General(GeneralScpiParser),
    Sspd(FamilyScpiParser),
    Temperature(FamilyScpiParser),
}

impl Parser {
    pub fn name(&self) -> &'static str {
        match self {
            Parser::ServerRaw(_) => "server-raw",
            Parser::DeviceRaw(_) => "device-raw",
            Parser::Common(_) => "common-scpi",
            Parser::System(_) => "system-scpi",
            Parser::General(_) => "general-scpi",
            Parser::Sspd(_) => "sspd-scpi",
            Parser::Temperature(_) => "temperature-scpi",
        }
    }

    pub fn initialize(&mut self, registry: &DeviceRegistry) {
        match self {
            Parser::Sspd(parser) | Parser::Temperature(parser) => parser.initialize(registry),
            Parser::ServerRaw(_)
            | Parser::DeviceRaw(_)
            | Parser::Common(_)
            | Parser::System(_)
            | Parser::General(_) => {}
        }
    }

    /// `Some(answer)` when the payload was consumed
    pub async fn parse(&self, payload: &[u8], ctx: &mut ParseContext<'_>) -> Option<Answer> {
        match self {
            Parser::ServerRaw(parser) => parser.parse(payload, ctx).await,
            Parser::DeviceRaw(parser) => parser.parse(payload, ctx).await,
            Parser::Common(parser) => parser.parse(payload),
            Parser::System(parser) => parser.parse(payload, ctx).await,
            Parser::General(parser) => parser.parse(payload, ctx).await,
            Parser::Sspd(parser) | Parser::Temperature(parser) => parser.parse(payload, ctx).await,
        }
    }
}

/// Ordered parser list
pub struct ParserChain {
    parsers: Vec<Parser>,
}

impl ParserChain {
    pub fn new(parsers: Vec<Parser>) -> Self {
        Self { parsers }
    }

    /// Every grammar the server speaks, highest priority first
    pub fn standard() -> Self {
        Self::new(vec![
            Parser::ServerRaw(ServerRawParser),
            Parser::DeviceRaw(DeviceRawParser),
            Parser::Common(CommonScpiParser),
            Parser::System(SystemScpiParser),
            Parser::General(GeneralScpiParser),
            Parser::Sspd(FamilyScpiParser::sspd()),
            Parser::Temperature(FamilyScpiParser::temperature()),
        ])
    }

    /// Initialize every parser in chain order
    pub fn initialize(&mut self, registry: &DeviceRegistry) {
        for parser in &mut self.parsers {
            debug!(parser = parser.name(), "Initializing parser");
            parser.initialize(registry);
        }
        info!(parsers = self.parsers.len(), "Parser chain initialized");
    }

    /// Offer the payload to each parser in order until one consumes it
    pub async fn dispatch(&self, payload: &[u8], ctx: &mut ParseContext<'_>) -> Option<Answer> {
        for parser in &self.parsers {
            if let Some(answer) = parser.parse(payload, ctx).await {
                debug!(parser = parser.name(), "Command consumed");
                return Some(answer);
            }
        }
        None
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(Parser::name).collect()
    }
}

impl Default for ParserChain {
    fn default() -> Self {
        Self::standard()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::fixture;
    use super::*;
    use cunit_bus::{cmd, SimulatedDevice};
    use cunit_core::{Frame, Udid};

    fn frame_bytes(address: u8, command: u8) -> Vec<u8> {
        Frame::request(address, command).encode().unwrap()
    }

    #[test]
    fn test_standard_chain_order() {
        assert_eq!(
            ParserChain::standard().names(),
            vec![
                "server-raw",
                "device-raw",
                "common-scpi",
                "system-scpi",
                "general-scpi",
                "sspd-scpi",
                "temperature-scpi",
            ]
        );
    }

    #[tokio::test]
    async fn test_server_frame_wins_over_device_at_same_address() {
        let device = SimulatedDevice::new(SERVER_ADDRESS, Udid::new("aa"), "CU4SDM1");
        let (mut registry, bus, log) = fixture(vec![device]).await;
        assert!(registry.get(SERVER_ADDRESS).is_some());
        let before = log.len();

        let mut chain = ParserChain::standard();
        chain.initialize(&registry);
        let mut ctx = ParseContext {
            registry: &mut registry,
            bus: &bus,
        };
        let payload = frame_bytes(SERVER_ADDRESS, server_raw::server_cmd::GET_DEVICE_LIST);
        let answer = chain.dispatch(&payload, &mut ctx).await.unwrap();

        match answer {
            Answer::Frame(frame) => {
                assert_eq!(frame.address, SERVER_ADDRESS);
                assert!(String::from_utf8_lossy(&frame.payload).starts_with("DevCount: 1"));
            }
            other => panic!("expected frame answer, got {:?}", other),
        }
        // Nothing was forwarded to the device
        assert_eq!(log.len(), before);
    }

    #[tokio::test]
    async fn test_reordered_chain_forwards_to_device() {
        let device = SimulatedDevice::new(SERVER_ADDRESS, Udid::new("aa"), "CU4SDM1");
        let (mut registry, bus, _log) = fixture(vec![device]).await;

        let chain = ParserChain::new(vec![
            Parser::DeviceRaw(DeviceRawParser),
            Parser::ServerRaw(ServerRawParser),
        ]);
        let mut ctx = ParseContext {
            registry: &mut registry,
            bus: &bus,
        };
        let payload = frame_bytes(SERVER_ADDRESS, cmd::GET_DEVICE_TYPE);
        let answer = chain.dispatch(&payload, &mut ctx).await.unwrap();

        assert_eq!(
            answer,
            Answer::Frame(Frame::new(SERVER_ADDRESS, cmd::GET_DEVICE_TYPE, b"CU4SDM1".to_vec()))
        );
    }

    #[tokio::test]
    async fn test_unmatched_payload_is_not_consumed() {
        let (mut registry, bus, _log) = fixture(Vec::new()).await;
        let mut chain = ParserChain::standard();
        chain.initialize(&registry);
        let mut ctx = ParseContext {
            registry: &mut registry,
            bus: &bus,
        };

        assert!(chain.dispatch(b"FOO:BAR?", &mut ctx).await.is_none());
        assert!(chain.dispatch(&frame_bytes(9, 0x01), &mut ctx).await.is_none());
        assert!(chain.dispatch(&[0x00, 0x01], &mut ctx).await.is_none());
    }
}
