pub mod block;
pub mod chunk;
pub mod dimension;
pub mod entity;
pub mod position;
pub mod scheduled;
pub mod settings;
pub mod tick;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use block::BlockId;
use chunk::Chunk;
use dimension::Dimension;
use entity::{EntityEntry, EntityHandle, EntityKind};
use indexmap::IndexMap;
use position::{BlockPos, ChunkPos};
use rand_chacha::ChaCha8Rng;
use rand_chacha::rand_core::SeedableRng;
use scheduled::ScheduledUpdates;
use settings::Settings;
use slotmap::SlotMap;

/// Random tick samples per section when nothing else is configured.
pub const DEFAULT_RANDOM_TICK_SPEED: u32 = 3;

/// Something that wants to hear about changes in the world, typically a
/// player session streaming chunks to its client.
///
/// Viewers are called from inside transactions, so they must not block.
pub trait Viewer: Send {
    fn view_block(&mut self, _pos: BlockPos, _block: BlockId) {}
    fn view_time(&mut self, _tick: i64) {}
    fn view_entity_moved(&mut self, _entity: EntityHandle, _pos: BlockPos) {}
}

/// Registration key of a viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderId(u64);

/// The complete mutable state of one world.
///
/// There is no interior locking: whoever holds `&mut World` is the only
/// writer. The server moves a `World` into its executor thread and hands
/// transactions a mutable borrow one at a time.
pub struct World {
    dimension: Dimension,
    settings: Arc<Settings>,
    advancing: bool,
    released: bool,
    chunks: HashMap<ChunkPos, Chunk>,
    /// Chunks modified since the last save.
    dirty: HashSet<ChunkPos>,
    entities: SlotMap<EntityHandle, EntityEntry>,
    viewers: IndexMap<LoaderId, Box<dyn Viewer>>,
    next_loader: u64,
    scheduled: ScheduledUpdates,
    rng: ChaCha8Rng,
    random_tick_speed: Option<u32>,
}

impl World {
    /// Create a world on `settings`, registering as one of its holders.
    pub fn new(dimension: Dimension, settings: Arc<Settings>, seed: u64) -> Self {
        let advancing = settings.acquire();
        tracing::debug!(
            "World '{}' ({}) created, advancing: {}",
            settings.name(),
            dimension,
            advancing
        );
        Self {
            dimension,
            settings,
            advancing,
            released: false,
            chunks: HashMap::new(),
            dirty: HashSet::new(),
            entities: SlotMap::with_key(),
            viewers: IndexMap::new(),
            next_loader: 0,
            scheduled: ScheduledUpdates::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            random_tick_speed: Some(DEFAULT_RANDOM_TICK_SPEED),
        }
    }

    pub fn name(&self) -> &str {
        self.settings.name()
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Whether this world owns the shared clock of its settings.
    pub fn advancing(&self) -> bool {
        self.advancing
    }

    pub fn current_tick(&self) -> i64 {
        self.settings.current_tick()
    }

    /// `None` disables random ticking.
    pub fn set_random_tick_speed(&mut self, speed: Option<u32>) {
        self.random_tick_speed = speed;
    }

    pub fn random_tick_speed(&self) -> Option<u32> {
        self.random_tick_speed
    }

    /// Give up this world's hold on its settings. Safe to call more than once.
    pub fn detach(&mut self) {
        if !self.released {
            self.released = true;
            self.settings.release();
        }
    }

    // ── Blocks ──────────────────────────────────────────────────────────

    /// Read a block at an absolute position. Returns AIR for unloaded chunks.
    pub fn get_block(&self, pos: BlockPos) -> BlockId {
        match self.chunks.get(&pos.chunk()) {
            Some(chunk) => chunk.get_block(pos.local()),
            None => BlockId::AIR,
        }
    }

    /// Write a block at an absolute position, creating the chunk if needed.
    ///
    /// Marks the chunk dirty, schedules the block and its neighbors for an
    /// update on the next tick and tells every viewer. Returns `false` (and
    /// does nothing) when the block is unchanged or outside the dimension's
    /// height range.
    pub fn set_block(&mut self, pos: BlockPos, block: BlockId) -> bool {
        if !self.dimension.range().contains(pos.y) {
            tracing::warn!("set_block outside of {} height range: {:?}", self.dimension, pos);
            return false;
        }
        if self.get_block(pos) == block {
            return false;
        }
        let chunk_pos = pos.chunk();
        self.chunks
            .entry(chunk_pos)
            .or_default()
            .set_block(pos.local(), block);
        self.dirty.insert(chunk_pos);

        let next = self.current_tick() + 1;
        self.scheduled.schedule(pos, next);
        for neighbor in pos.neighbors() {
            self.scheduled.schedule(neighbor, next);
        }
        for viewer in self.viewers.values_mut() {
            viewer.view_block(pos, block);
        }
        true
    }

    /// Schedule `pos` for an update `delay` ticks from now.
    pub fn schedule_update(&mut self, pos: BlockPos, delay: i64) {
        let at = self.current_tick() + delay.max(1);
        self.scheduled.schedule(pos, at);
    }

    pub fn scheduled_updates(&self) -> usize {
        self.scheduled.len()
    }

    // ── Chunks ──────────────────────────────────────────────────────────

    pub fn has_chunk(&self, pos: ChunkPos) -> bool {
        self.chunks.contains_key(&pos)
    }

    /// Insert a chunk without marking it dirty (used for loading).
    pub fn insert_chunk(&mut self, pos: ChunkPos, chunk: Chunk) {
        self.chunks.insert(pos, chunk);
    }

    pub fn remove_chunk(&mut self, pos: ChunkPos) -> Option<Chunk> {
        self.dirty.remove(&pos);
        self.chunks.remove(&pos)
    }

    pub fn chunk(&self, pos: ChunkPos) -> Option<&Chunk> {
        self.chunks.get(&pos)
    }

    /// The chunk at `pos`, inserting an empty one if it is not loaded.
    pub fn chunk_or_default(&mut self, pos: ChunkPos) -> &Chunk {
        self.chunks.entry(pos).or_default()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Loaded chunk positions, sorted so iteration is deterministic.
    pub fn chunk_positions(&self) -> Vec<ChunkPos> {
        let mut positions: Vec<ChunkPos> = self.chunks.keys().copied().collect();
        positions.sort_unstable();
        positions
    }

    pub fn mark_dirty(&mut self, pos: ChunkPos) {
        if self.chunks.contains_key(&pos) {
            self.dirty.insert(pos);
        }
    }

    /// Drain and return all chunk positions modified since the last call,
    /// sorted. After this returns, the dirty set is empty.
    pub fn take_dirty_chunks(&mut self) -> Vec<ChunkPos> {
        let mut dirty: Vec<ChunkPos> = self.dirty.drain().collect();
        dirty.sort_unstable();
        dirty
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    // ── Entities ────────────────────────────────────────────────────────

    pub fn add_entity(&mut self, kind: EntityKind, pos: BlockPos) -> EntityHandle {
        let handle = self.entities.insert(EntityEntry { kind, pos });
        self.dirty.insert(pos.chunk());
        handle
    }

    /// Re-create an entity read from storage. Unlike `add_entity` this does
    /// not mark its chunk dirty.
    pub fn restore_entity(&mut self, kind: EntityKind, pos: BlockPos) -> EntityHandle {
        self.entities.insert(EntityEntry { kind, pos })
    }

    pub fn remove_entity(&mut self, handle: EntityHandle) -> Option<EntityEntry> {
        let entry = self.entities.remove(handle)?;
        self.dirty.insert(entry.chunk());
        Some(entry)
    }

    /// Move an entity, updating the chunk index. Returns `false` for an
    /// unknown handle.
    pub fn move_entity(&mut self, handle: EntityHandle, pos: BlockPos) -> bool {
        let Some(entry) = self.entities.get_mut(handle) else {
            return false;
        };
        let from = entry.chunk();
        entry.pos = pos;
        self.dirty.insert(from);
        self.dirty.insert(pos.chunk());
        for viewer in self.viewers.values_mut() {
            viewer.view_entity_moved(handle, pos);
        }
        true
    }

    pub fn entity(&self, handle: EntityHandle) -> Option<&EntityEntry> {
        self.entities.get(handle)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Entities whose current position lies in `chunk`.
    pub fn entities_in_chunk(&self, chunk: ChunkPos) -> Vec<(EntityHandle, EntityEntry)> {
        self.entities
            .iter()
            .filter(|(_, entry)| entry.chunk() == chunk)
            .map(|(handle, entry)| (handle, *entry))
            .collect()
    }

    // ── Viewers ─────────────────────────────────────────────────────────

    pub fn add_viewer(&mut self, viewer: Box<dyn Viewer>) -> LoaderId {
        self.next_loader += 1;
        let id = LoaderId(self.next_loader);
        self.viewers.insert(id, viewer);
        id
    }

    pub fn remove_viewer(&mut self, id: LoaderId) -> Option<Box<dyn Viewer>> {
        self.viewers.shift_remove(&id)
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    fn notify_time(&mut self, tick: i64) {
        for viewer in self.viewers.values_mut() {
            viewer.view_time(tick);
        }
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> World {
        World::new(Dimension::Overworld, Arc::new(Settings::default()), 1)
    }

    #[test]
    fn set_block_marks_dirty_and_schedules_neighbors() {
        let mut w = world();
        let pos = BlockPos::new(20, 64, -3);
        assert!(w.set_block(pos, BlockId(7)));
        assert_eq!(w.get_block(pos), BlockId(7));
        assert_eq!(w.dirty_count(), 1);
        assert_eq!(w.scheduled_updates(), 7);

        // Writing the same block again is not a change.
        assert!(!w.set_block(pos, BlockId(7)));
        assert_eq!(w.take_dirty_chunks(), vec![pos.chunk()]);
        assert_eq!(w.dirty_count(), 0);
    }

    #[test]
    fn set_block_outside_height_range_is_rejected() {
        let mut w = world();
        assert!(!w.set_block(BlockPos::new(0, 400, 0), BlockId(1)));
        assert!(!w.set_block(BlockPos::new(0, -65, 0), BlockId(1)));
        assert_eq!(w.chunk_count(), 0);
    }

    #[test]
    fn entity_index_follows_moves() {
        let mut w = world();
        let kind = entity::EntityRegistry::with_kinds(&["item"]).lookup("item").unwrap();
        let handle = w.add_entity(kind, BlockPos::new(1, 64, 1));
        assert_eq!(w.entities_in_chunk(ChunkPos::new(0, 0)).len(), 1);

        assert!(w.move_entity(handle, BlockPos::new(40, 64, 1)));
        assert!(w.entities_in_chunk(ChunkPos::new(0, 0)).is_empty());
        assert_eq!(w.entity(handle).unwrap().chunk(), ChunkPos::new(2, 0));

        let removed = w.remove_entity(handle).unwrap();
        assert_eq!(removed.kind, kind);
        assert_eq!(w.entity_count(), 0);
        assert!(!w.move_entity(handle, BlockPos::new(0, 0, 0)));
    }

    #[test]
    fn second_world_on_shared_settings_is_passive() {
        let settings = Arc::new(Settings::new("shared", 0));
        let mut first = World::new(Dimension::Overworld, Arc::clone(&settings), 1);
        let second = World::new(Dimension::Overworld, Arc::clone(&settings), 2);
        assert!(first.advancing());
        assert!(!second.advancing());
        assert_eq!(settings.ref_count(), 2);

        first.detach();
        first.detach();
        assert_eq!(settings.ref_count(), 1);
        drop(second);
        assert_eq!(settings.ref_count(), 0);
    }
}
