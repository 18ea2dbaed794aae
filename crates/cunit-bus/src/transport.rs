//! Byte-stream transports for the device bus

use cunit_core::{Address, Frame, FrameError, HEADER_LEN};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Default response timeout for a single exchange
pub const DEFAULT_TIMEOUT_MS: u64 = 200;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No response within {0:?}")]
    Timeout(Duration),
    #[error("No response from address {0}")]
    NoResponse(Address),
    #[error("Invalid frame: {0}")]
    Frame(#[from] FrameError),
    #[error("Bus task is not running")]
    Closed,
}

/// A request/response exchange on the device bus.
///
/// Implementations own the underlying connection. Only the bus task calls
/// `exchange`, so one request is in flight at a time.
pub trait BusIo: Send + 'static {
    fn exchange(
        &mut self,
        request: &Frame,
    ) -> impl Future<Output = Result<Frame, TransportError>> + Send;
}

/// Frame transport over any async byte stream (TCP gateway, RS-485 serial port)
pub struct StreamBus<S> {
    stream: S,
    timeout: Duration,
    label: String,
}

impl<S> StreamBus<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(stream: S, timeout: Duration, label: impl Into<String>) -> Self {
        Self {
            stream,
            timeout,
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl StreamBus<TcpStream> {
    /// Connect to an RS-485 gateway over TCP
    pub async fn connect_tcp(host: &str, port: u16, timeout_ms: u64) -> Result<Self, TransportError> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        debug!(host = %host, port = port, "Connected to bus gateway");
        Ok(Self::new(
            stream,
            Duration::from_millis(timeout_ms),
            format!("tcp://{}:{}", host, port),
        ))
    }
}

#[cfg(feature = "serial")]
impl StreamBus<tokio_serial::SerialStream> {
    /// Open an RS-485 serial port
    pub fn open_serial(path: &str, baud_rate: u32, timeout_ms: u64) -> Result<Self, TransportError> {
        use tokio_serial::SerialPortBuilderExt;

        let stream = tokio_serial::new(path, baud_rate)
            .open_native_async()
            .map_err(|e| TransportError::Io(e.into()))?;
        debug!(port = %path, baud_rate = baud_rate, "Opened serial bus");
        Ok(Self::new(
            stream,
            Duration::from_millis(timeout_ms),
            format!("serial://{}", path),
        ))
    }
}

impl<S> BusIo for StreamBus<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn exchange(&mut self, request: &Frame) -> Result<Frame, TransportError> {
        let packet = request.encode()?;

        trace!(
            bus = %self.label,
            address = request.address,
            command = request.command,
            len = request.payload.len(),
            "Sending bus request"
        );

        self.stream.write_all(&packet).await?;
        self.stream.flush().await?;

        let response = timeout(self.timeout, read_frame(&mut self.stream))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;

        trace!(
            bus = %self.label,
            address = response.address,
            command = response.command,
            len = response.payload.len(),
            "Received bus response"
        );

        Ok(response)
    }
}

/// Read one frame: fixed header, then the announced payload
async fn read_frame<S>(stream: &mut S) -> Result<Frame, TransportError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).await?;

    let mut payload = vec![0u8; Frame::payload_len(&header)];
    stream.read_exact(&mut payload).await?;

    Ok(Frame::new(header[0], header[1], payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_exchange_over_stream() {
        let (client, mut device) = duplex(64);
        let mut bus = StreamBus::new(client, Duration::from_millis(500), "duplex");

        let responder = tokio::spawn(async move {
            let mut request = [0u8; 3];
            device.read_exact(&mut request).await.unwrap();
            assert_eq!(request, [0x05, 0x01, 0x00]);
            device.write_all(&[0x05, 0x01, 0x03, b'C', b'U', b'4']).await.unwrap();
        });

        let response = bus.exchange(&Frame::request(0x05, 0x01)).await.unwrap();
        assert_eq!(response, Frame::new(0x05, 0x01, b"CU4".to_vec()));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_exchange_times_out() {
        let (client, _device) = duplex(64);
        let mut bus = StreamBus::new(client, Duration::from_millis(20), "duplex");

        let err = bus.exchange(&Frame::request(0x05, 0x01)).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
    }
}
