//! Persistence collaborator interface.
//!
//! A provider owns the stored form of one world directory: its settings and
//! its columns, per dimension. Worlds call it from inside transactions, so
//! implementations are synchronous.

use std::sync::Arc;

use anyhow::Result;
use strata_engine::world::chunk::Chunk;
use strata_engine::world::dimension::Dimension;
use strata_engine::world::position::{BlockPos, ChunkPos};
use strata_engine::world::settings::Settings;

/// An entity as written to storage. `kind` is resolved against the world's
/// entity registry on load; unknown kinds are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntity {
    pub kind: String,
    pub pos: BlockPos,
}

/// A loaded column with the entities that were in it when it was stored.
#[derive(Clone, Default)]
pub struct StoredColumn {
    pub chunk: Chunk,
    pub entities: Vec<StoredEntity>,
}

pub trait Provider: Send + Sync {
    /// The settings shared by every world opened on this provider. Must
    /// return the same `Arc` on every call.
    fn settings(&self) -> Arc<Settings>;

    fn save_settings(&self, settings: &Settings) -> Result<()>;

    /// `Ok(None)` when the column was never stored.
    fn load_column(&self, pos: ChunkPos, dimension: Dimension) -> Result<Option<StoredColumn>>;

    fn store_column(
        &self,
        pos: ChunkPos,
        dimension: Dimension,
        chunk: &Chunk,
        entities: &[StoredEntity],
    ) -> Result<()>;

    /// Called once the last world using this provider has closed.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Stores nothing and loads nothing. Settings live in memory only.
#[derive(Debug, Default)]
pub struct NopProvider {
    settings: Arc<Settings>,
}

impl NopProvider {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }
}

impl Provider for NopProvider {
    fn settings(&self) -> Arc<Settings> {
        Arc::clone(&self.settings)
    }

    fn save_settings(&self, _settings: &Settings) -> Result<()> {
        Ok(())
    }

    fn load_column(&self, _pos: ChunkPos, _dimension: Dimension) -> Result<Option<StoredColumn>> {
        Ok(None)
    }

    fn store_column(
        &self,
        _pos: ChunkPos,
        _dimension: Dimension,
        _chunk: &Chunk,
        _entities: &[StoredEntity],
    ) -> Result<()> {
        Ok(())
    }
}
