//! Ordered command queue with origin coalescing

use std::collections::VecDeque;

use crate::command::Command;

/// Head of the queue as handed to the dispatch loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dequeued {
    /// Superseded by a newer command from the same origin; drop without answer
    Stale(Command),
    /// Execute and answer
    Ready(Command),
}

/// FIFO of pending commands
#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: VecDeque<Command>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push_back(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Remove the head, classifying it as stale when any later command in the
    /// queue shares its origin.
    pub fn pop_next(&mut self) -> Option<Dequeued> {
        let head = self.commands.pop_front()?;
        let superseded = self.commands.iter().any(|c| c.origin == head.origin);

        Some(if superseded {
            Dequeued::Stale(head)
        } else {
            Dequeued::Ready(head)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ChannelId;

    fn command(origin: u64, seq: u64) -> Command {
        Command {
            origin: ChannelId(origin),
            payload: format!("cmd{}", seq).into_bytes(),
            seq,
        }
    }

    #[test]
    fn test_distinct_origins_in_fifo_order() {
        let mut queue = CommandQueue::new();
        for (seq, origin) in [1, 2, 3].into_iter().enumerate() {
            queue.push(command(origin, seq as u64));
        }

        let order: Vec<u64> = std::iter::from_fn(|| queue.pop_next())
            .map(|next| match next {
                Dequeued::Ready(c) => c.seq,
                Dequeued::Stale(c) => panic!("unexpected stale command {}", c.seq),
            })
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_same_origin_head_is_stale() {
        let mut queue = CommandQueue::new();
        queue.push(command(1, 0));
        queue.push(command(2, 1));
        queue.push(command(1, 2));

        assert_eq!(queue.pop_next(), Some(Dequeued::Stale(command(1, 0))));
        assert_eq!(queue.pop_next(), Some(Dequeued::Ready(command(2, 1))));
        assert_eq!(queue.pop_next(), Some(Dequeued::Ready(command(1, 2))));
        assert_eq!(queue.pop_next(), None);
    }

    #[test]
    fn test_burst_from_one_origin_keeps_only_latest() {
        let mut queue = CommandQueue::new();
        for seq in 0..4 {
            queue.push(command(7, seq));
        }

        let mut ready = Vec::new();
        let mut stale = 0;
        while let Some(next) = queue.pop_next() {
            match next {
                Dequeued::Ready(c) => ready.push(c.seq),
                Dequeued::Stale(_) => stale += 1,
            }
        }
        assert_eq!(ready, vec![3]);
        assert_eq!(stale, 3);
    }
}
