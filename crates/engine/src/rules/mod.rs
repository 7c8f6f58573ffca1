use crate::world::World;
use crate::world::block::BlockId;
use crate::world::position::BlockPos;

/// A block write requested by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockChange {
    pub pos: BlockPos,
    pub block: BlockId,
}

impl BlockChange {
    pub const fn new(pos: BlockPos, block: BlockId) -> Self {
        Self { pos, block }
    }
}

/// A rule function: given the current world state and the position being
/// updated, produce zero or more block changes.
///
/// Rules must be **local** and read-only: they look at a bounded
/// neighborhood of `pos` and return their writes instead of performing them,
/// so the tick can apply and re-schedule consistently.
pub type UpdateRule = fn(&World, BlockPos) -> Vec<BlockChange>;

/// The block behaviour a world ticks with.
///
/// Scheduled rules run for positions whose update came due this tick (every
/// block write schedules its neighbors for the next tick). Random rules run
/// for randomly sampled non-air positions.
#[derive(Clone, Default)]
pub struct TickRules {
    scheduled: Vec<UpdateRule>,
    random: Vec<UpdateRule>,
}

impl TickRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_scheduled(&mut self, rule: UpdateRule) {
        self.scheduled.push(rule);
    }

    pub fn add_random(&mut self, rule: UpdateRule) {
        self.random.push(rule);
    }

    pub fn evaluate_scheduled(&self, world: &World, pos: BlockPos) -> Vec<BlockChange> {
        let mut out = Vec::new();
        for rule in &self.scheduled {
            out.extend(rule(world, pos));
        }
        out
    }

    pub fn evaluate_random(&self, world: &World, pos: BlockPos) -> Vec<BlockChange> {
        let mut out = Vec::new();
        for rule in &self.random {
            out.extend(rule(world, pos));
        }
        out
    }

    pub fn len(&self) -> usize {
        self.scheduled.len() + self.random.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TickRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickRules")
            .field("scheduled", &self.scheduled.len())
            .field("random", &self.random.len())
            .finish()
    }
}
