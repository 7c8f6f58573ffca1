use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use super::position::BlockPos;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Due {
    at: i64,
    seq: u64,
    pos: BlockPos,
}

/// Block updates scheduled for a future tick.
///
/// Updates due on the same tick come out in the order they were scheduled.
/// Scheduling a position that is already pending for the same tick is a no-op.
#[derive(Debug, Default)]
pub struct ScheduledUpdates {
    queue: BinaryHeap<Reverse<Due>>,
    pending: HashSet<(BlockPos, i64)>,
    seq: u64,
}

impl ScheduledUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `pos` to be updated on tick `at`.
    pub fn schedule(&mut self, pos: BlockPos, at: i64) {
        if !self.pending.insert((pos, at)) {
            return;
        }
        self.seq += 1;
        self.queue.push(Reverse(Due { at, seq: self.seq, pos }));
    }

    /// Remove and return every update due on or before `tick`.
    pub fn drain_due(&mut self, tick: i64) -> Vec<BlockPos> {
        let mut due = Vec::new();
        while let Some(Reverse(next)) = self.queue.peek() {
            if next.at > tick {
                break;
            }
            let Some(Reverse(next)) = self.queue.pop() else {
                break;
            };
            self.pending.remove(&(next.pos, next.at));
            due.push(next.pos);
        }
        due
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
