//! Commands and the sender used by transport adapters to enqueue them

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Opaque handle of the channel (client connection) a command came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// A raw payload received from one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub origin: ChannelId,
    pub payload: Vec<u8>,
    /// Enqueue order across all channels
    pub seq: u64,
}

/// Cloneable producer side of the command queue
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Command>,
    next_seq: Arc<AtomicU64>,
}

impl CommandSender {
    /// Append a command to the tail of the queue. Never blocks.
    pub fn enqueue(&self, origin: ChannelId, payload: impl Into<Vec<u8>>) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let command = Command {
            origin,
            payload: payload.into(),
            seq,
        };

        trace!(origin = %origin, seq = seq, len = command.payload.len(), "Command enqueued");
        if self.tx.send(command).is_err() {
            debug!(origin = %origin, "Executor stopped, command discarded");
        }
    }
}

/// Create a connected sender and inbox
pub(crate) fn command_channel() -> (CommandSender, mpsc::UnboundedReceiver<Command>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = CommandSender {
        tx,
        next_seq: Arc::new(AtomicU64::new(0)),
    };
    (sender, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_assigns_increasing_seq() {
        let (sender, mut inbox) = command_channel();
        let other = sender.clone();

        sender.enqueue(ChannelId(1), b"A".to_vec());
        other.enqueue(ChannelId(2), b"B".to_vec());

        let first = inbox.try_recv().unwrap();
        let second = inbox.try_recv().unwrap();
        assert_eq!((first.origin, first.seq), (ChannelId(1), 0));
        assert_eq!((second.origin, second.seq), (ChannelId(2), 1));
    }

    #[test]
    fn test_enqueue_after_close_is_silent() {
        let (sender, inbox) = command_channel();
        drop(inbox);
        sender.enqueue(ChannelId(1), b"*IDN?".to_vec());
    }
}
