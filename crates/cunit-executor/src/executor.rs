//! Single-flow dispatch loop
//!
//! The executor owns the device registry, the parser chain and the command
//! queue. Each tick it drains newly enqueued commands, takes the head of the
//! queue and either drops it (a newer command from the same channel is
//! waiting) or runs it to completion before the next tick is armed.

use std::time::Duration;

use cunit_bus::BusHandle;
use cunit_core::Answer;
use cunit_discovery::{DeviceRegistry, InitReport};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::command::{command_channel, ChannelId, Command, CommandSender};
use crate::parser::{ParseContext, ParserChain};
use crate::queue::{CommandQueue, Dequeued};

/// Default pause between dispatch ticks
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub tick_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Answer addressed to the channel that sent the command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub origin: ChannelId,
    pub answer: Answer,
}

/// Lifecycle notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorEvent {
    /// Registry validated and parsers ready; ticks start after this
    Initialized { devices: usize },
    Stopped,
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Queue was empty
    Idle,
    /// Head dropped in favour of a newer command from the same channel
    Coalesced(Command),
    /// Head executed and answered
    Answered { origin: ChannelId, consumed: bool },
}

pub struct Executor {
    sender: CommandSender,
    inbox: mpsc::UnboundedReceiver<Command>,
    queue: CommandQueue,
    chain: ParserChain,
    registry: DeviceRegistry,
    bus: BusHandle,
    replies: mpsc::UnboundedSender<Reply>,
    event_tx: broadcast::Sender<ExecutorEvent>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(
        registry: DeviceRegistry,
        bus: BusHandle,
        replies: mpsc::UnboundedSender<Reply>,
        config: ExecutorConfig,
    ) -> Self {
        Self::with_chain(ParserChain::standard(), registry, bus, replies, config)
    }

    pub fn with_chain(
        chain: ParserChain,
        registry: DeviceRegistry,
        bus: BusHandle,
        replies: mpsc::UnboundedSender<Reply>,
        config: ExecutorConfig,
    ) -> Self {
        let (sender, inbox) = command_channel();
        let (event_tx, _) = broadcast::channel(16);
        Self {
            sender,
            inbox,
            queue: CommandQueue::new(),
            chain,
            registry,
            bus,
            replies,
            event_tx,
            config,
        }
    }

    /// Handle for transport adapters to enqueue commands
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutorEvent> {
        self.event_tx.subscribe()
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Validate the registry, then initialize the parser chain.
    ///
    /// Commands enqueued meanwhile wait in the inbox until ticking starts.
    pub async fn initialize(&mut self) -> InitReport {
        info!("Initializing command executor");

        let report = self.registry.initialize(&self.bus).await;
        self.chain.initialize(&self.registry);

        let devices = self.registry.len();
        info!(devices = devices, "Command executor initialized");
        let _ = self.event_tx.send(ExecutorEvent::Initialized { devices });
        report
    }

    /// Process at most one command
    pub async fn tick(&mut self) -> TickOutcome {
        while let Ok(command) = self.inbox.try_recv() {
            self.queue.push(command);
        }

        let command = match self.queue.pop_next() {
            None => return TickOutcome::Idle,
            Some(Dequeued::Stale(command)) => {
                debug!(
                    origin = %command.origin,
                    seq = command.seq,
                    "Dropping command superseded by the same channel"
                );
                return TickOutcome::Coalesced(command);
            }
            Some(Dequeued::Ready(command)) => command,
        };

        debug!(
            origin = %command.origin,
            seq = command.seq,
            pending = self.queue.len(),
            "Executing command"
        );

        let mut ctx = ParseContext {
            registry: &mut self.registry,
            bus: &self.bus,
        };
        let (answer, consumed) = match self.chain.dispatch(&command.payload, &mut ctx).await {
            Some(answer) => (answer, true),
            None => {
                debug!(origin = %command.origin, "No parser accepted command");
                (Answer::unknown_command(), false)
            }
        };

        let reply = Reply {
            origin: command.origin,
            answer,
        };
        if self.replies.send(reply).is_err() {
            warn!(origin = %command.origin, "Reply channel closed, answer dropped");
        }

        TickOutcome::Answered {
            origin: command.origin,
            consumed,
        }
    }

    /// Initialize, then tick until `shutdown` is set or its sender dropped.
    ///
    /// The next tick is armed only after the previous one completed, so ticks
    /// never overlap. A stop request lets the running tick finish.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        self.initialize().await;

        while !*shutdown.borrow() {
            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.tick_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Command executor stopped");
        let _ = self.event_tx.send(ExecutorEvent::Stopped);
    }
}
