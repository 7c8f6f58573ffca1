//! Units of work run against a world, and the context they run in.

use std::borrow::Cow;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use strata_engine::world::World;
use strata_engine::world::chunk::Chunk;
use strata_engine::world::entity::{EntityHandle, EntityRegistry};
use strata_engine::world::position::{BlockPos, ChunkPos};
use strata_engine::world::tick::TickReport;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::ExecError;
use crate::handler::Handler;
use crate::provider::StoredEntity;
use crate::world::Shared;

/// Who submitted a transaction. Shows up in logs, the dashboard and deadlock
/// reports, so it should say where the work came from (`"tick"`,
/// `"player:alice:container-close"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin(Cow<'static, str>);

impl Origin {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for Origin {
    fn from(tag: &'static str) -> Self {
        Self(Cow::Borrowed(tag))
    }
}

impl From<String> for Origin {
    fn from(tag: String) -> Self {
        Self(Cow::Owned(tag))
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fired by the executor once the running record has been cleared.
pub(crate) type Completion = Box<dyn FnOnce() + Send>;
type Work = Box<dyn FnOnce(&mut Tx<'_>) -> Completion + Send>;

pub(crate) struct Transaction {
    pub(crate) origin: Origin,
    pub(crate) work: Work,
    pub(crate) enqueued_at: Instant,
    /// The executor stops after running this one.
    pub(crate) is_final: bool,
}

impl Transaction {
    /// A transaction whose result is delivered to the returned [`Pending`].
    pub(crate) fn new<F, R>(origin: Origin, enqueued_at: Instant, f: F) -> (Self, Pending<R>)
    where
        F: FnOnce(&mut Tx<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (done, rx) = oneshot::channel();
        let work: Work = Box::new(move |tx: &mut Tx<'_>| {
            let value = f(tx);
            let complete: Completion = Box::new(move || {
                // The waiter may have given up; the work still counts.
                let _ = done.send(value);
            });
            complete
        });
        let pending = Pending {
            origin: origin.clone(),
            rx,
        };
        (
            Self {
                origin,
                work,
                enqueued_at,
                is_final: false,
            },
            pending,
        )
    }

    /// A transaction nobody waits for.
    pub(crate) fn detached<F>(origin: Origin, enqueued_at: Instant, f: F) -> Self
    where
        F: FnOnce(&mut Tx<'_>) + Send + 'static,
    {
        let work: Work = Box::new(move |tx: &mut Tx<'_>| {
            f(tx);
            let complete: Completion = Box::new(|| {});
            complete
        });
        Self {
            origin,
            work,
            enqueued_at,
            is_final: false,
        }
    }

    /// Make this the last transaction the executor runs.
    pub(crate) fn into_final(mut self) -> Self {
        self.is_final = true;
        self
    }
}

/// The result of a queued transaction, available once the executor ran it.
///
/// Dropping a `Pending` only gives up the wait; the transaction still runs.
#[must_use = "dropping a Pending discards the result, not the transaction"]
pub struct Pending<R> {
    origin: Origin,
    rx: oneshot::Receiver<R>,
}

impl<R> Pending<R> {
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub async fn wait(self) -> Result<R, ExecError> {
        let Pending { origin, rx } = self;
        rx.await.map_err(|_| ExecError::Abandoned { origin })
    }

    /// Blocking version of [`wait`](Self::wait) for threads outside the
    /// runtime. Panics if called from async context.
    pub fn blocking_wait(self) -> Result<R, ExecError> {
        let Pending { origin, rx } = self;
        rx.blocking_recv().map_err(|_| ExecError::Abandoned { origin })
    }
}

// ── Running record ──────────────────────────────────────────────────────────

/// The transaction the executor is inside right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningTransaction {
    pub origin: Origin,
    pub started: Instant,
}

impl RunningTransaction {
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }
}

/// Written by the executor around every body, read by the watchdog. The lock
/// is only ever held to copy the record in or out.
#[derive(Default)]
pub(crate) struct RunningRecord {
    current: Mutex<Option<RunningTransaction>>,
}

impl RunningRecord {
    pub(crate) fn begin(&self, origin: Origin, started: Instant) {
        *self.current.lock().expect("running record poisoned") = Some(RunningTransaction { origin, started });
    }

    pub(crate) fn finish(&self) {
        *self.current.lock().expect("running record poisoned") = None;
    }

    pub(crate) fn snapshot(&self) -> Option<RunningTransaction> {
        self.current.lock().expect("running record poisoned").clone()
    }
}

// ── Transaction context ─────────────────────────────────────────────────────

/// Exclusive access to a world for the duration of one transaction body.
///
/// Derefs to [`World`] for block, entity and viewer access, and adds the
/// operations that need the world's collaborators.
pub struct Tx<'w> {
    world: &'w mut World,
    shared: &'w Shared,
}

impl<'w> Tx<'w> {
    pub(crate) fn new(world: &'w mut World, shared: &'w Shared) -> Self {
        Self { world, shared }
    }

    pub fn world_name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_read_only(&self) -> bool {
        self.shared.read_only
    }

    pub fn handler(&self) -> Arc<dyn Handler> {
        self.shared.handler.get()
    }

    pub fn entity_registry(&self) -> &EntityRegistry {
        &self.shared.entities
    }

    /// The column at `pos`, loading it from the provider or generating it if
    /// it is not in memory yet.
    pub fn column(&mut self, pos: ChunkPos) -> &Chunk {
        if !self.world.has_chunk(pos) {
            self.load_column(pos);
        }
        self.world.chunk_or_default(pos)
    }

    /// Make sure every column within `radius` of `center` is loaded.
    /// Returns how many had to be loaded or generated.
    pub fn load_area(&mut self, center: ChunkPos, radius: i32) -> usize {
        let mut loaded = 0;
        for pos in center.square(radius) {
            if !self.world.has_chunk(pos) {
                self.load_column(pos);
                loaded += 1;
            }
        }
        loaded
    }

    fn load_column(&mut self, pos: ChunkPos) {
        let dimension = self.world.dimension();
        match self.shared.provider.load_column(pos, dimension) {
            Ok(Some(column)) => {
                self.world.insert_chunk(pos, column.chunk);
                for stored in column.entities {
                    match self.shared.entities.lookup(&stored.kind) {
                        Some(kind) => {
                            self.world.restore_entity(kind, stored.pos);
                        }
                        None => tracing::warn!(
                            "Skipping unknown entity '{}' in column ({}, {})",
                            stored.kind,
                            pos.x,
                            pos.z
                        ),
                    }
                }
                return;
            }
            Ok(None) => {}
            Err(e) => {
                // Regenerate but leave the column clean, so the stored copy
                // is only overwritten if something actually changes.
                tracing::error!("Failed to load column ({}, {}): {:#}", pos.x, pos.z, e);
                let chunk = self.generate(pos);
                self.world.insert_chunk(pos, chunk);
                return;
            }
        }
        let chunk = self.generate(pos);
        self.world.insert_chunk(pos, chunk);
        self.world.mark_dirty(pos);
    }

    fn generate(&self, pos: ChunkPos) -> Chunk {
        let mut chunk = Chunk::new();
        self.shared
            .generator
            .generate_column(pos, self.world.dimension(), &mut chunk);
        chunk
    }

    /// Add an entity of a registered kind. Unknown kinds are rejected with a
    /// warning.
    pub fn spawn_entity(&mut self, kind: &str, pos: BlockPos) -> Option<EntityHandle> {
        let Some(kind) = self.shared.entities.lookup(kind) else {
            tracing::warn!("Refusing to spawn unregistered entity '{}'", kind);
            return None;
        };
        self.column(pos.chunk());
        let handle = self.world.add_entity(kind, pos);
        self.handler().on_entity_spawn(&*self.world, handle, kind);
        Some(handle)
    }

    /// Write every dirty column, then the settings if this instance owns
    /// them. A no-op on read-only worlds. Returns the number of columns
    /// written; columns that failed stay dirty for the next attempt.
    pub fn save(&mut self) -> anyhow::Result<usize> {
        if self.shared.read_only {
            return Ok(0);
        }
        let result = self.write_dirty();
        self.shared.metrics.record_save(result.is_ok());
        let saved = result?;
        self.handler().on_save(&*self.world, saved);
        Ok(saved)
    }

    fn write_dirty(&mut self) -> anyhow::Result<usize> {
        let dimension = self.world.dimension();
        let dirty = self.world.take_dirty_chunks();
        let mut saved = 0;

        for (i, &pos) in dirty.iter().enumerate() {
            let Some(chunk) = self.world.chunk(pos) else {
                continue; // Unloaded between mark and save.
            };
            let entities: Vec<StoredEntity> = self
                .world
                .entities_in_chunk(pos)
                .into_iter()
                .map(|(_, entry)| StoredEntity {
                    kind: entry.kind.name().to_string(),
                    pos: entry.pos,
                })
                .collect();
            if let Err(e) = self.shared.provider.store_column(pos, dimension, chunk, &entities) {
                for &rest in &dirty[i..] {
                    self.world.mark_dirty(rest);
                }
                return Err(e.context(format!("storing column ({}, {})", pos.x, pos.z)));
            }
            saved += 1;
        }

        if self.world.advancing() {
            self.shared
                .provider
                .save_settings(self.world.settings())
                .context("saving settings")?;
        }
        Ok(saved)
    }

    /// Run one simulation step and notify the handler.
    pub fn tick(&mut self) -> TickReport {
        let report = self.world.tick(&self.shared.rules);
        self.shared.metrics.record_tick();
        self.handler().on_tick(&*self.world, &report);
        report
    }

    /// Queue follow-up work from inside a body. The executor never waits on
    /// its own queue: the transaction goes to the world's forwarder, which
    /// pushes follow-ups in the order they were made. They run after
    /// everything already queued. Once the world starts closing they are
    /// dropped.
    pub fn enqueue_detached<F>(&self, origin: impl Into<Origin>, f: F)
    where
        F: FnOnce(&mut Tx<'_>) + Send + 'static,
    {
        let transaction = Transaction::detached(origin.into(), self.shared.clock.now(), f);
        if let Err(rejected) = self.shared.detached.send(transaction) {
            tracing::debug!("Dropped detached transaction '{}': world closing", rejected.0.origin);
        }
    }
}

impl Deref for Tx<'_> {
    type Target = World;

    fn deref(&self) -> &World {
        &*self.world
    }
}

impl DerefMut for Tx<'_> {
    fn deref_mut(&mut self) -> &mut World {
        &mut *self.world
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pending_reports_abandoned_when_dropped_unrun() {
        let (transaction, pending) = Transaction::new("test".into(), Instant::now(), |_tx| 5);
        drop(transaction);
        assert_eq!(
            pending.wait().await,
            Err(ExecError::Abandoned {
                origin: Origin::from("test")
            })
        );
    }

    #[test]
    fn running_record_is_cleared() {
        let record = RunningRecord::default();
        assert!(record.snapshot().is_none());
        let started = Instant::now();
        record.begin("save".into(), started);
        assert_eq!(record.snapshot().map(|r| r.origin), Some(Origin::from("save")));
        record.finish();
        assert!(record.snapshot().is_none());
    }

    #[test]
    fn origin_accepts_static_and_owned_tags() {
        assert_eq!(Origin::from("tick").as_str(), "tick");
        assert_eq!(Origin::from(format!("player:{}", "alice")).to_string(), "player:alice");
    }
}
