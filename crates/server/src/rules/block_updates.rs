//! Block-update rules: gravity and grass.
//!
//! Each public function has the signature `fn(&World, BlockPos) -> Vec<BlockChange>`
//! so it can be registered directly as an `UpdateRule`. Rules only read the
//! world; the tick applies what they return.

use crate::block::{self, DIRT, GRASS_BLOCK};
use strata_engine::rules::BlockChange;
use strata_engine::world::World;
use strata_engine::world::position::BlockPos;

// ── Gravity ──────────────────────────────────────────────────────────────

/// If a gravity-affected block (sand, gravel) has a replaceable block below
/// it, swap them. The write schedules the new neighbors, so a falling block
/// keeps moving one step per tick until it lands.
pub fn gravity(world: &World, pos: BlockPos) -> Vec<BlockChange> {
    let block_id = world.get_block(pos);
    if !block::has_gravity(block_id) {
        return Vec::new();
    }

    let below = pos.below();
    if !world.dimension().range().contains(below.y) {
        return Vec::new();
    }
    let below_id = world.get_block(below);

    if block::is_replaceable(below_id) {
        vec![
            BlockChange::new(pos, below_id),
            BlockChange::new(below, block_id),
        ]
    } else {
        Vec::new()
    }
}

// ── Grass ────────────────────────────────────────────────────────────────

/// A randomly ticked grass block turns one uncovered horizontal dirt
/// neighbor (same level, or one up or down) into grass.
pub fn grass_spread(world: &World, pos: BlockPos) -> Vec<BlockChange> {
    if world.get_block(pos) != GRASS_BLOCK || block::is_solid(world.get_block(pos.above())) {
        return Vec::new();
    }
    for neighbor in pos.horizontal_neighbors() {
        for target in [neighbor, neighbor.above(), neighbor.below()] {
            if world.get_block(target) == DIRT && !block::is_solid(world.get_block(target.above())) {
                return vec![BlockChange::new(target, GRASS_BLOCK)];
            }
        }
    }
    Vec::new()
}

/// Grass covered by a solid block reverts to dirt.
pub fn grass_decay(world: &World, pos: BlockPos) -> Vec<BlockChange> {
    if world.get_block(pos) == GRASS_BLOCK && block::is_solid(world.get_block(pos.above())) {
        vec![BlockChange::new(pos, DIRT)]
    } else {
        Vec::new()
    }
}
