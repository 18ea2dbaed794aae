//! Binary frames forwarded to registered devices

use cunit_bus::Driver;
use cunit_core::{Answer, Frame};
use tracing::warn;

use super::ParseContext;

pub struct DeviceRawParser;

impl DeviceRawParser {
    pub async fn parse(&self, payload: &[u8], ctx: &mut ParseContext<'_>) -> Option<Answer> {
        let request = Frame::decode(payload).ok()?;
        ctx.registry.get(request.address)?;

        let driver = Driver::new(ctx.bus, request.address);
        let response = match driver.exchange(request.command, request.payload).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    address = request.address,
                    command = request.command,
                    error = %e,
                    "Forwarded frame got no valid response"
                );
                Frame::request(request.address, request.command)
            }
        };
        Some(Answer::Frame(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::testing::fixture;
    use cunit_bus::{cmd, SimulatedDevice};
    use cunit_core::Udid;

    #[tokio::test]
    async fn test_forward_to_registered_device() {
        let device = SimulatedDevice::new(2, Udid::new("02"), "CU4TDM1").with_parameter(0x20, 4.2f32);
        let (mut registry, bus, log) = fixture(vec![device]).await;
        let mut ctx = ParseContext {
            registry: &mut registry,
            bus: &bus,
        };

        let request = Frame::request(2, 0x20).encode().unwrap();
        let answer = DeviceRawParser.parse(&request, &mut ctx).await;

        assert_eq!(
            answer,
            Some(Answer::Frame(Frame::new(2, 0x20, 4.2f32.to_le_bytes().to_vec())))
        );
        assert_eq!(log.count(2, 0x20), 1);
    }

    #[tokio::test]
    async fn test_failed_exchange_answers_empty_frame() {
        let device = SimulatedDevice::new(2, Udid::new("02"), "CU4TDM1")
            .with_silent_command(cmd::GET_DESCRIPTION);
        let (mut registry, bus, _log) = fixture(vec![device]).await;
        let mut ctx = ParseContext {
            registry: &mut registry,
            bus: &bus,
        };

        let request = Frame::request(2, cmd::GET_DESCRIPTION).encode().unwrap();
        let answer = DeviceRawParser.parse(&request, &mut ctx).await;

        assert_eq!(answer, Some(Answer::Frame(Frame::request(2, cmd::GET_DESCRIPTION))));
    }

    #[tokio::test]
    async fn test_unregistered_address_not_consumed() {
        let (mut registry, bus, log) = fixture(Vec::new()).await;
        let mut ctx = ParseContext {
            registry: &mut registry,
            bus: &bus,
        };

        let request = Frame::request(6, cmd::GET_DEVICE_TYPE).encode().unwrap();
        assert!(DeviceRawParser.parse(&request, &mut ctx).await.is_none());
        assert!(log.is_empty());
    }
}
