//! Bus task owning the transport, and the handle used to reach it

use cunit_core::Frame;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::transport::{BusIo, TransportError};

/// Pending requests buffered in front of the bus task
const BUS_QUEUE_DEPTH: usize = 32;

struct BusRequest {
    frame: Frame,
    reply: oneshot::Sender<Result<Frame, TransportError>>,
}

/// Cloneable handle to the bus task
#[derive(Clone)]
pub struct BusHandle {
    tx: mpsc::Sender<BusRequest>,
}

impl BusHandle {
    /// Send a request frame and wait for the response frame
    pub async fn transceive(&self, frame: Frame) -> Result<Frame, TransportError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(BusRequest { frame, reply })
            .await
            .map_err(|_| TransportError::Closed)?;
        response.await.map_err(|_| TransportError::Closed)?
    }

    /// Check whether the bus task is still accepting requests
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Move a transport into its own task and return a handle to it.
///
/// The task exits once every handle has been dropped.
pub fn spawn_bus<I: BusIo>(io: I) -> BusHandle {
    let (tx, rx) = mpsc::channel(BUS_QUEUE_DEPTH);
    tokio::spawn(run_bus(io, rx));
    BusHandle { tx }
}

async fn run_bus<I: BusIo>(mut io: I, mut rx: mpsc::Receiver<BusRequest>) {
    info!("Bus task started");

    while let Some(request) = rx.recv().await {
        let result = io.exchange(&request.frame).await;
        if let Err(e) = &result {
            debug!(
                address = request.frame.address,
                command = request.frame.command,
                error = %e,
                "Bus exchange failed"
            );
        }
        // Requester may have gone away; nothing to do then
        let _ = request.reply.send(result);
    }

    info!("Bus task stopped");
}
