//! World configuration.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use strata_engine::rules::TickRules;
use strata_engine::world::DEFAULT_RANDOM_TICK_SPEED;
use strata_engine::world::dimension::Dimension;
use strata_engine::world::entity::EntityRegistry;
use tracing::Dispatch;

use crate::clock::Clock;
use crate::generator::Generator;
use crate::provider::Provider;
use crate::tick::TICK_INTERVAL;
use crate::watchdog::DeadlockSink;
use crate::world::WorldHandle;

/// Resolves the world a portal in this world leads to, given the dimension
/// the portal targets.
pub type PortalResolver = Arc<dyn Fn(Dimension) -> Option<WorldHandle> + Send + Sync>;

/// How often the auto-save worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveInterval {
    /// Every ten minutes.
    #[default]
    Default,
    Every(Duration),
    Disabled,
}

impl SaveInterval {
    pub const DEFAULT_PERIOD: Duration = Duration::from_secs(10 * 60);

    /// Command-line style: `0` is the default, negative disables saving.
    pub fn from_secs(secs: i64) -> Self {
        match secs.cmp(&0) {
            Ordering::Less => SaveInterval::Disabled,
            Ordering::Equal => SaveInterval::Default,
            Ordering::Greater => SaveInterval::Every(Duration::from_secs(secs as u64)),
        }
    }

    /// The resolved period, `None` when disabled.
    pub fn period(self) -> Option<Duration> {
        match self {
            SaveInterval::Default => Some(Self::DEFAULT_PERIOD),
            SaveInterval::Every(d) if d.is_zero() => Some(Self::DEFAULT_PERIOD),
            SaveInterval::Every(d) => Some(d),
            SaveInterval::Disabled => None,
        }
    }
}

/// `0` selects the default speed, negative values disable random ticks.
pub fn random_tick_speed(value: i32) -> Option<u32> {
    match value.cmp(&0) {
        Ordering::Less => None,
        Ordering::Equal => Some(DEFAULT_RANDOM_TICK_SPEED),
        Ordering::Greater => Some(value as u32),
    }
}

/// Knobs of the transaction core. The defaults suit a live server.
#[derive(Debug, Clone)]
pub struct Tuning {
    /// Queued transactions before `enqueue` starts waiting.
    pub queue_capacity: usize,
    pub tick_interval: Duration,
    /// How often the watchdog looks at the running transaction.
    pub watchdog_interval: Duration,
    /// How long one transaction may run before the world counts as wedged.
    pub deadlock_threshold: Duration,
    /// Queued origins listed in a deadlock report.
    pub max_reported_pending: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            queue_capacity: 128,
            tick_interval: TICK_INTERVAL,
            watchdog_interval: Duration::from_secs(1),
            deadlock_threshold: Duration::from_secs(20),
            max_reported_pending: 10,
        }
    }
}

impl Tuning {
    /// Clamp values tokio would reject (zero-length intervals, zero capacity).
    pub(crate) fn normalized(mut self) -> Self {
        let min = Duration::from_millis(1);
        self.queue_capacity = self.queue_capacity.max(1);
        self.tick_interval = self.tick_interval.max(min);
        self.watchdog_interval = self.watchdog_interval.max(min);
        self
    }
}

/// Everything needed to open a world. Unset collaborators fall back to
/// no-op implementations.
#[derive(Clone, Default)]
pub struct Config {
    pub dimension: Dimension,
    /// Absent: entities cannot be transferred out of this world.
    pub portal_destination: Option<PortalResolver>,
    /// Absent: `NopProvider`, nothing is loaded or stored.
    pub provider: Option<Arc<dyn Provider>>,
    /// Absent: `NopGenerator`, new columns are empty.
    pub generator: Option<Arc<dyn Generator>>,
    /// Never write to the provider and don't run the auto-save worker.
    pub read_only: bool,
    pub save_interval: SaveInterval,
    /// See [`random_tick_speed`].
    pub random_tick_speed: i32,
    /// Absent: seeded from the system time.
    pub random_seed: Option<u64>,
    /// Entity kinds that may be spawned or loaded.
    pub entities: EntityRegistry,
    /// Where the world's tasks log. Absent: the global subscriber.
    pub logger: Option<Dispatch>,
    /// Absent: [`crate::rules::standard`].
    pub rules: Option<TickRules>,
    pub tuning: Tuning,
    /// Absent: `SystemClock`.
    pub clock: Option<Arc<dyn Clock>>,
    /// Absent: [`crate::watchdog::abort_sink`].
    pub deadlock_sink: Option<DeadlockSink>,
}

impl Config {
    /// Open a world with this configuration. See [`WorldHandle::open`].
    pub async fn open(self) -> anyhow::Result<WorldHandle> {
        WorldHandle::open(self).await
    }
}
