//! TCP client transport
//!
//! Every accepted connection gets its own [`ChannelId`]. Each read chunk is
//! enqueued as one command; replies from the executor are routed back to the
//! connection they belong to.

use anyhow::Result;
use cunit_executor::{ChannelId, CommandSender, Executor, Reply};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info, warn};

const READ_BUFFER_SIZE: usize = 4096;

/// Outbound byte queues of the connected clients
#[derive(Clone, Default)]
struct ReplyRouter {
    clients: Arc<RwLock<HashMap<ChannelId, mpsc::UnboundedSender<Vec<u8>>>>>,
}

impl ReplyRouter {
    async fn register(&self, channel: ChannelId, tx: mpsc::UnboundedSender<Vec<u8>>) {
        self.clients.write().await.insert(channel, tx);
    }

    async fn unregister(&self, channel: ChannelId) {
        self.clients.write().await.remove(&channel);
    }

    async fn deliver(&self, reply: Reply) {
        let bytes = match reply.answer.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(channel = %reply.origin, error = %e, "Cannot encode answer");
                return;
            }
        };

        match self.clients.read().await.get(&reply.origin) {
            Some(tx) => {
                let _ = tx.send(bytes);
            }
            None => debug!(channel = %reply.origin, "Client gone, answer dropped"),
        }
    }
}

/// Accept clients on `listener` and run `executor` until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    executor: Executor,
    mut replies: mpsc::UnboundedReceiver<Reply>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let local = listener.local_addr()?;
    info!(address = %local, "Listening for clients");

    let sender = executor.sender();
    let (stop_tx, stop_rx) = watch::channel(false);
    let executor_task = tokio::spawn(executor.run(stop_rx));

    let router = ReplyRouter::default();
    let reply_router = router.clone();
    tokio::spawn(async move {
        while let Some(reply) = replies.recv().await {
            reply_router.deliver(reply).await;
        }
    });

    tokio::pin!(shutdown);
    let mut next_channel = 0u64;
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept client");
                        continue;
                    }
                };
                let channel = ChannelId(next_channel);
                next_channel += 1;
                tokio::spawn(handle_client(stream, peer, channel, sender.clone(), router.clone()));
            }
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    let _ = stop_tx.send(true);
    executor_task.await?;
    Ok(())
}

async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    channel: ChannelId,
    sender: CommandSender,
    router: ReplyRouter,
) {
    info!(peer = %peer, channel = %channel, "Client connected");
    let _ = stream.set_nodelay(true);
    let (mut reader, mut writer) = stream.into_split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    router.register(channel, out_tx).await;

    let writer_task = tokio::spawn(async move {
        while let Some(bytes) = out_rx.recv().await {
            if let Err(e) = writer.write_all(&bytes).await {
                debug!(channel = %channel, error = %e, "Write to client failed");
                break;
            }
        }
    });

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => sender.enqueue(channel, &buf[..n]),
            Err(e) => {
                debug!(channel = %channel, error = %e, "Read from client failed");
                break;
            }
        }
    }

    router.unregister(channel).await;
    let _ = writer_task.await;
    info!(peer = %peer, channel = %channel, "Client disconnected");
}
