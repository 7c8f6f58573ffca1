//! The public handle to a running world.
//!
//! Opening a world moves its [`World`] state onto a dedicated executor thread
//! and starts the background tasks around it:
//!
//! ```text
//!   submitters ──┐
//!   tick driver ─┤
//!   auto-save ───┼──► bounded queue ──► executor thread ──► &mut World
//!   detached ────┘                            ▲
//!                                             │ running record
//!                                          watchdog
//! ```
//!
//! Every read or write of world state is a transaction on that queue, so
//! there is exactly one writer and no locks around the world itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use strata_engine::rules::TickRules;
use strata_engine::world::World;
use strata_engine::world::dimension::Dimension;
use strata_engine::world::entity::{EntityHandle, EntityRegistry};
use strata_engine::world::position::BlockPos;
use strata_engine::world::settings::Settings;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::autosave;
use crate::clock::{Clock, SystemClock};
use crate::config::{self, Config, PortalResolver};
use crate::dashboard::metrics::{Metrics, MetricsSnapshot};
use crate::error::ExecError;
use crate::executor;
use crate::generator::{Generator, NopGenerator};
use crate::handler::{Handler, HandlerSlot};
use crate::lifecycle::TaskGroup;
use crate::provider::{NopProvider, Provider};
use crate::queue::{self, Queue};
use crate::tick::{self, TICK_ORIGIN};
use crate::transaction::{Origin, Pending, RunningRecord, RunningTransaction, Transaction, Tx};
use crate::watchdog::{self, WatchdogSettings};

/// State shared between the handle, the executor and the background tasks.
pub(crate) struct Shared {
    pub(crate) name: String,
    pub(crate) dimension: Dimension,
    pub(crate) read_only: bool,
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) generator: Arc<dyn Generator>,
    pub(crate) entities: EntityRegistry,
    pub(crate) rules: TickRules,
    pub(crate) handler: HandlerSlot,
    pub(crate) queue: Queue,
    /// Follow-ups enqueued from inside transactions, forwarded in order.
    pub(crate) detached: mpsc::UnboundedSender<Transaction>,
    pub(crate) running: RunningRecord,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) metrics: Metrics,
    pub(crate) runtime: Handle,
}

struct Inner {
    shared: Arc<Shared>,
    settings: Arc<Settings>,
    advancing: bool,
    /// Everything that feeds the queue: tick driver, auto-save and the
    /// detached forwarder.
    producers: TaskGroup,
    /// The executor thread and the watchdog.
    core: TaskGroup,
    closed: AtomicBool,
    portal: Option<PortalResolver>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // The task groups broadcast shutdown as they drop; the executor then
        // exits on its own and releases the settings.
        if !self.closed.load(Ordering::Acquire) {
            tracing::warn!(
                "World '{}' ({}) dropped without close; stopping its tasks",
                self.shared.name,
                self.shared.dimension
            );
        }
    }
}

/// A cheap, cloneable handle to an open world.
///
/// The world shuts down on [`close`](Self::close), or when the last handle
/// is dropped (without the final save).
#[derive(Clone)]
pub struct WorldHandle {
    inner: Arc<Inner>,
}

/// A handle that does not keep the world alive. Portal resolvers should
/// capture these so two linked worlds don't keep each other open.
#[derive(Clone)]
pub struct WeakWorldHandle {
    inner: Weak<Inner>,
}

impl WeakWorldHandle {
    pub fn upgrade(&self) -> Option<WorldHandle> {
        self.inner.upgrade().map(|inner| WorldHandle { inner })
    }
}

fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

impl WorldHandle {
    /// Open a world and start its executor, tick driver, detached forwarder,
    /// watchdog and (unless read-only or disabled) auto-save worker.
    ///
    /// The first tick runs before this returns. Must be called from within a
    /// tokio runtime; the world's tasks run on that runtime.
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let Config {
            dimension,
            portal_destination,
            provider,
            generator,
            read_only,
            save_interval,
            random_tick_speed,
            random_seed,
            entities,
            logger,
            rules,
            tuning,
            clock,
            deadlock_sink,
        } = config;
        let runtime = Handle::try_current().context("opening a world requires a tokio runtime")?;
        let tuning = tuning.normalized();
        let provider = provider.unwrap_or_else(|| Arc::new(NopProvider::default()));
        let generator = generator.unwrap_or_else(|| Arc::new(NopGenerator));
        let clock = clock.unwrap_or_else(|| Arc::new(SystemClock));
        let sink = deadlock_sink.unwrap_or_else(watchdog::abort_sink);

        let (detached, detached_rx) = mpsc::unbounded_channel();
        let settings = provider.settings();
        let mut world = World::new(dimension, Arc::clone(&settings), random_seed.unwrap_or_else(time_seed));
        world.set_random_tick_speed(config::random_tick_speed(random_tick_speed));
        let advancing = world.advancing();
        let name = settings.name().to_string();

        let shared = Arc::new(Shared {
            name: name.clone(),
            dimension,
            read_only,
            provider,
            generator,
            entities,
            rules: rules.unwrap_or_else(crate::rules::standard),
            handler: HandlerSlot::new(),
            queue: Queue::new(tuning.queue_capacity),
            detached,
            running: RunningRecord::default(),
            clock,
            metrics: Metrics::new(),
            runtime,
        });

        let span = tracing::info_span!("world", name = %name, dimension = %dimension);
        let producers = TaskGroup::new(span.clone(), logger.clone());
        let core = TaskGroup::new(span, logger);
        {
            let shared = Arc::clone(&shared);
            let signal = core.signal();
            core.spawn_thread(&format!("{}-{}", name, dimension), move || {
                    executor::run(world, shared, signal)
                })
                .context("spawning executor thread")?;
        }

        let handle = WorldHandle {
            inner: Arc::new(Inner {
                shared: Arc::clone(&shared),
                settings,
                advancing,
                producers,
                core,
                closed: AtomicBool::new(false),
                portal: portal_destination,
            }),
        };

        handle
            .submit(TICK_ORIGIN, tick::tick_body)
            .await
            .context("running the first tick")?;

        let producers = &handle.inner.producers;
        producers.spawn(
            "detached",
            queue::forward_detached(detached_rx, shared.queue.sender(), producers.signal()),
        );
        producers.spawn(
            "tick",
            tick::run(shared.queue.sender(), Arc::clone(&shared.clock), tuning.tick_interval, producers.signal()),
        );
        if let Some(period) = autosave::period(read_only, save_interval) {
            producers.spawn(
                "autosave",
                autosave::run(shared.queue.sender(), Arc::clone(&shared.clock), period, producers.signal()),
            );
        }
        let limits = WatchdogSettings {
            interval: tuning.watchdog_interval,
            threshold: tuning.deadlock_threshold,
            max_pending: tuning.max_reported_pending,
        };
        let core = &handle.inner.core;
        core.spawn("watchdog", watchdog::run(Arc::clone(&shared), limits, sink, core.signal()));

        tracing::info!(
            "World '{}' ({}) opened at tick {}, advancing: {}, read-only: {}",
            name,
            dimension,
            handle.current_tick(),
            advancing,
            read_only
        );
        Ok(handle)
    }

    pub fn name(&self) -> &str {
        &self.inner.shared.name
    }

    pub fn dimension(&self) -> Dimension {
        self.inner.shared.dimension
    }

    /// Whether this world drives the shared tick of its settings.
    pub fn is_advancing(&self) -> bool {
        self.inner.advancing
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.shared.read_only
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// The shared tick counter. Readable without a transaction.
    pub fn current_tick(&self) -> i64 {
        self.inner.settings.current_tick()
    }

    pub fn downgrade(&self) -> WeakWorldHandle {
        WeakWorldHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn check_open(&self) -> Result<(), ExecError> {
        if self.is_closed() {
            Err(ExecError::Closed)
        } else {
            Ok(())
        }
    }

    /// Queue `f` and return a handle to its result. Waits while the queue is
    /// full.
    pub async fn enqueue<F, R>(&self, origin: impl Into<Origin>, f: F) -> Result<Pending<R>, ExecError>
    where
        F: FnOnce(&mut Tx<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.check_open()?;
        let shared = &self.inner.shared;
        let (transaction, pending) = Transaction::new(origin.into(), shared.clock.now(), f);
        shared.queue.sender().push(transaction).await?;
        Ok(pending)
    }

    /// Queue `f` and wait for its result.
    pub async fn submit<F, R>(&self, origin: impl Into<Origin>, f: F) -> Result<R, ExecError>
    where
        F: FnOnce(&mut Tx<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.enqueue(origin, f).await?.wait().await
    }

    /// [`enqueue`](Self::enqueue) for threads outside the runtime. Panics if
    /// called from async context.
    pub fn blocking_enqueue<F, R>(&self, origin: impl Into<Origin>, f: F) -> Result<Pending<R>, ExecError>
    where
        F: FnOnce(&mut Tx<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.check_open()?;
        let shared = &self.inner.shared;
        let (transaction, pending) = Transaction::new(origin.into(), shared.clock.now(), f);
        shared.queue.sender().blocking_push(transaction)?;
        Ok(pending)
    }

    /// [`submit`](Self::submit) for threads outside the runtime. Panics if
    /// called from async context.
    pub fn blocking_submit<F, R>(&self, origin: impl Into<Origin>, f: F) -> Result<R, ExecError>
    where
        F: FnOnce(&mut Tx<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.blocking_enqueue(origin, f)?.blocking_wait()
    }

    /// Install a new handler, returning the previous one.
    pub fn set_handler(&self, handler: Arc<dyn Handler>) -> Arc<dyn Handler> {
        self.inner.shared.handler.replace(handler)
    }

    pub fn handler(&self) -> Arc<dyn Handler> {
        self.inner.shared.handler.get()
    }

    /// The world a portal towards `dimension` leads to, if any.
    pub fn portal_destination(&self, dimension: Dimension) -> Option<WorldHandle> {
        self.inner.portal.as_ref().and_then(|resolve| resolve(dimension))
    }

    /// Move an entity through a portal into the world `dimension` resolves
    /// to, placing it at `pos` there.
    ///
    /// Returns the entity's handle in the destination, or `None` if it no
    /// longer exists here. If the destination refuses it, the entity is put
    /// back where it was.
    pub async fn transfer_entity(
        &self,
        entity: EntityHandle,
        dimension: Dimension,
        pos: BlockPos,
    ) -> anyhow::Result<Option<EntityHandle>> {
        let destination = self
            .portal_destination(dimension)
            .with_context(|| format!("world '{}' has no portal to {}", self.name(), dimension))?;

        let Some(entry) = self
            .submit("portal:leave", move |tx| tx.remove_entity(entity))
            .await?
        else {
            return Ok(None);
        };

        let kind = entry.kind.name();
        let arrived = destination
            .submit("portal:arrive", move |tx| tx.spawn_entity(kind, pos))
            .await;
        match arrived {
            Ok(Some(handle)) => {
                tracing::debug!("Entity '{}' moved from {} to {}", kind, self.dimension(), dimension);
                Ok(Some(handle))
            }
            refused => {
                self.submit("portal:return", move |tx| tx.add_entity(entry.kind, entry.pos))
                    .await?;
                match refused {
                    Err(e) => Err(e).context("destination world rejected the transfer"),
                    _ => anyhow::bail!("entity kind '{}' is not registered in the destination", kind),
                }
            }
        }
    }

    /// The transaction the executor is inside right now.
    pub fn running_transaction(&self) -> Option<RunningTransaction> {
        self.inner.shared.running.snapshot()
    }

    /// Transactions waiting in the queue.
    pub fn queued_transactions(&self) -> usize {
        self.inner.shared.queue.len()
    }

    /// Background tasks (executor included) that have not exited yet.
    pub fn running_tasks(&self) -> usize {
        self.inner.producers.running() + self.inner.core.running()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner
            .shared
            .metrics
            .snapshot(self.queued_transactions() as u64, self.current_tick())
    }

    /// Shut the world down.
    ///
    /// Stops the tick driver, auto-save and detached forwarder first, then
    /// runs a final transaction that tells the handler and saves (unless
    /// read-only). Nothing runs after it: the executor exits and the
    /// watchdog stops. The provider is closed once no world holds its
    /// settings any more. Transactions still queued behind the final one are
    /// abandoned. Calling this again is a no-op.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let shared = &self.inner.shared;
        tracing::info!("Closing world '{}' ({})", shared.name, shared.dimension);

        self.inner.producers.shutdown().await;
        let (last, pending) = Transaction::new("close".into(), shared.clock.now(), |tx: &mut Tx<'_>| {
            tx.handler().on_close(&**tx);
            if let Err(e) = tx.save() {
                tracing::error!("Final save failed: {:#}", e);
            }
        });
        match shared.queue.sender().push(last.into_final()).await {
            Ok(()) => {
                if let Err(e) = pending.wait().await {
                    tracing::warn!("Final transaction did not complete: {}", e);
                }
            }
            Err(e) => tracing::warn!("Could not queue final transaction: {}", e),
        }

        self.inner.core.shutdown().await;

        if self.inner.settings.ref_count() == 0 {
            if let Err(e) = shared.provider.close() {
                tracing::error!("Closing provider failed: {:#}", e);
            }
        }
        tracing::info!(
            "World '{}' ({}) closed at tick {}",
            shared.name,
            shared.dimension,
            self.current_tick()
        );
    }
}
