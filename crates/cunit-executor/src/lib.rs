//! cunit executor - single-flow command execution
//!
//! Raw payloads from client channels are queued through a [`CommandSender`].
//! The [`Executor`] takes one command per tick, drops it if the same channel
//! has already queued a newer one, and otherwise runs it through the
//! [`ParserChain`]. Every executed command yields exactly one [`Reply`].

pub mod command;
pub mod executor;
pub mod parser;
pub mod queue;

pub use command::{ChannelId, Command, CommandSender};
pub use executor::{
    Executor, ExecutorConfig, ExecutorEvent, Reply, TickOutcome, DEFAULT_TICK_INTERVAL,
};
pub use parser::{ParseContext, Parser, ParserChain};
pub use queue::{CommandQueue, Dequeued};
