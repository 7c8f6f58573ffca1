//! Callbacks into game logic, invoked from inside transactions.

use std::sync::{Arc, RwLock};

use strata_engine::world::World;
use strata_engine::world::entity::{EntityHandle, EntityKind};
use strata_engine::world::tick::TickReport;

/// Hooks a game layer installs on a world. All methods run on the executor
/// thread with exclusive access to the world, so they must return quickly.
pub trait Handler: Send + Sync {
    fn on_tick(&self, _world: &World, _report: &TickReport) {}
    /// `columns` is how many dirty columns were written.
    fn on_save(&self, _world: &World, _columns: usize) {}
    fn on_entity_spawn(&self, _world: &World, _entity: EntityHandle, _kind: EntityKind) {}
    /// Last callback before the world shuts down.
    fn on_close(&self, _world: &World) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NopHandler;

impl Handler for NopHandler {}

/// The installed handler, swappable while the world runs.
pub(crate) struct HandlerSlot {
    current: RwLock<Arc<dyn Handler>>,
}

impl HandlerSlot {
    pub(crate) fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(NopHandler)),
        }
    }

    pub(crate) fn get(&self) -> Arc<dyn Handler> {
        Arc::clone(&self.current.read().expect("handler slot poisoned"))
    }

    /// Install `handler`, returning the previous one.
    pub(crate) fn replace(&self, handler: Arc<dyn Handler>) -> Arc<dyn Handler> {
        std::mem::replace(&mut *self.current.write().expect("handler slot poisoned"), handler)
    }
}
