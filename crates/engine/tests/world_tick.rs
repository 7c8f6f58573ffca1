//! World-state tests that exercise ticking, rules and viewers through the
//! public API. Block values are opaque `BlockId`s.

use std::sync::{Arc, Mutex};

use strata_engine::rules::{BlockChange, TickRules};
use strata_engine::world::block::BlockId;
use strata_engine::world::chunk::{Chunk, SECTION_SIZE};
use strata_engine::world::dimension::Dimension;
use strata_engine::world::position::{BlockPos, ChunkPos, LocalBlockPos};
use strata_engine::world::settings::Settings;
use strata_engine::world::{Viewer, World};

const STONE: BlockId = BlockId(1);
const DIRT: BlockId = BlockId(2);
const GRASS: BlockId = BlockId(3);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Flat world: stone y=0..=3, dirt y=4, with one grass block at (0, 4, 0).
fn flat_world(chunk_radius: i32, seed: u64) -> World {
    let mut world = World::new(Dimension::Overworld, Arc::new(Settings::new("flat", 0)), seed);
    for cx in -chunk_radius..chunk_radius {
        for cz in -chunk_radius..chunk_radius {
            let mut chunk = Chunk::new();
            for x in 0..SECTION_SIZE as u8 {
                for z in 0..SECTION_SIZE as u8 {
                    for y in 0..=3i64 {
                        chunk.set_block(LocalBlockPos { x, y, z }, STONE);
                    }
                    chunk.set_block(LocalBlockPos { x, y: 4, z }, DIRT);
                }
            }
            world.insert_chunk(ChunkPos::new(cx, cz), chunk);
        }
    }
    world.set_block(BlockPos::new(0, 4, 0), GRASS);
    world
}

/// Random rule: dirt next to grass turns into grass.
fn grass_spread(world: &World, pos: BlockPos) -> Vec<BlockChange> {
    if world.get_block(pos) != DIRT {
        return Vec::new();
    }
    let touches_grass = pos
        .horizontal_neighbors()
        .iter()
        .any(|n| world.get_block(*n) == GRASS);
    if touches_grass {
        vec![BlockChange::new(pos, GRASS)]
    } else {
        Vec::new()
    }
}

fn grass_count(world: &World, radius: i64) -> usize {
    let mut count = 0;
    for x in -radius..radius {
        for z in -radius..radius {
            if world.get_block(BlockPos::new(x, 4, z)) == GRASS {
                count += 1;
            }
        }
    }
    count
}

#[derive(Default)]
struct Recorded {
    blocks: Vec<(BlockPos, BlockId)>,
    times: Vec<i64>,
}

struct RecordingViewer(Arc<Mutex<Recorded>>);

impl Viewer for RecordingViewer {
    fn view_block(&mut self, pos: BlockPos, block: BlockId) {
        self.0.lock().unwrap().blocks.push((pos, block));
    }

    fn view_time(&mut self, tick: i64) {
        self.0.lock().unwrap().times.push(tick);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn grass_spreads_under_random_ticks() {
    let mut world = flat_world(1, 99);
    let mut rules = TickRules::new();
    rules.add_random(grass_spread);
    world.set_random_tick_speed(Some(64));

    let before = grass_count(&world, 16);
    for _ in 0..200 {
        world.tick(&rules);
    }
    assert!(grass_count(&world, 16) > before);
}

#[test]
fn same_seed_same_outcome() {
    let mut rules = TickRules::new();
    rules.add_random(grass_spread);

    let run = |seed| {
        let mut world = flat_world(1, seed);
        world.set_random_tick_speed(Some(16));
        for _ in 0..100 {
            world.tick(&rules);
        }
        let mut grass = Vec::new();
        for x in -16..16 {
            for z in -16..16 {
                if world.get_block(BlockPos::new(x, 4, z)) == GRASS {
                    grass.push((x, z));
                }
            }
        }
        grass
    };

    assert_eq!(run(5), run(5));
}

#[test]
fn viewers_see_block_changes_and_time() {
    let mut world = flat_world(1, 1);
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let id = world.add_viewer(Box::new(RecordingViewer(Arc::clone(&recorded))));
    assert_eq!(world.viewer_count(), 1);

    world.set_block(BlockPos::new(3, 5, 3), STONE);
    let rules = TickRules::new();
    world.tick(&rules);
    world.tick(&rules);

    {
        let seen = recorded.lock().unwrap();
        assert_eq!(seen.blocks, vec![(BlockPos::new(3, 5, 3), STONE)]);
        assert_eq!(seen.times, vec![1, 2]);
    }

    assert!(world.remove_viewer(id).is_some());
    world.tick(&rules);
    assert_eq!(recorded.lock().unwrap().times.len(), 2);
}

#[test]
fn loading_chunks_does_not_dirty_them() {
    let mut world = flat_world(2, 1);
    // Only the grass write in the helper dirtied a chunk.
    assert_eq!(world.take_dirty_chunks(), vec![ChunkPos::new(0, 0)]);
    assert_eq!(world.chunk_count(), 16);
    assert_eq!(world.get_block(BlockPos::new(-20, 2, 17)), STONE);
    assert_eq!(world.get_block(BlockPos::new(-20, 5, 17)), BlockId::AIR);
}
