//! Deadlock watchdog.
//!
//! Polls the executor's running record. A transaction that stays inside its
//! body past the threshold means the world is wedged: nothing else can run,
//! and every submitter is stuck behind it. The watchdog then collects what it
//! can about the backlog and hands a [`DeadlockReport`] to the sink, which by
//! default logs it and aborts the process.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use strata_engine::world::dimension::Dimension;
use tokio::time::{Instant, MissedTickBehavior};

use crate::lifecycle::ShutdownSignal;
use crate::transaction::{Origin, RunningTransaction};
use crate::world::Shared;

/// Receives the report when a deadlock is detected.
pub type DeadlockSink = Arc<dyn Fn(&DeadlockReport) + Send + Sync>;

/// Everything known about a stuck world at the moment of detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlockReport {
    pub world: String,
    pub dimension: Dimension,
    /// The transaction that never finished.
    pub origin: Origin,
    pub elapsed: Duration,
    pub threshold: Duration,
    /// Origins of queued transactions, oldest first. They stay queued and run
    /// once the hanging transaction returns.
    pub pending: Vec<Origin>,
    /// More transactions were queued than are listed in `pending`.
    pub truncated: bool,
}

impl fmt::Display for DeadlockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Deadlock detected: transaction '{}' has been running for {:.1?} (threshold {:?})",
            self.origin, self.elapsed, self.threshold
        )?;
        writeln!(f)?;
        writeln!(f, "WORLD: {} ({})", self.world, self.dimension)?;
        writeln!(f, "HANGING TRANSACTION: {}", self.origin)?;
        writeln!(f)?;
        if self.pending.is_empty() {
            write!(f, "PENDING TRANSACTIONS: none")?;
            return Ok(());
        }
        write!(f, "PENDING TRANSACTIONS:")?;
        for (i, origin) in self.pending.iter().enumerate() {
            write!(f, "\n  #{} {}", i + 1, origin)?;
        }
        if self.truncated {
            write!(f, "\n  ... (more not shown)")?;
        }
        Ok(())
    }
}

/// The default sink: log the report and abort the process.
pub fn abort_sink() -> DeadlockSink {
    Arc::new(|report: &DeadlockReport| {
        tracing::error!("{}", report);
        if !tracing::dispatcher::has_been_set() {
            eprintln!("{}", report);
        }
        std::process::abort();
    })
}

/// A sink that only logs. The stuck world stays stuck.
pub fn log_sink() -> DeadlockSink {
    Arc::new(|report: &DeadlockReport| tracing::error!("{}", report))
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct WatchdogSettings {
    pub(crate) interval: Duration,
    pub(crate) threshold: Duration,
    pub(crate) max_pending: usize,
}

/// How long `running` has been over the threshold, if it is.
pub(crate) fn overdue(running: &RunningTransaction, now: Instant, threshold: Duration) -> Option<Duration> {
    let elapsed = running.elapsed(now);
    (elapsed > threshold).then_some(elapsed)
}

fn inspect(shared: &Shared, settings: &WatchdogSettings) -> Option<DeadlockReport> {
    let running = shared.running.snapshot()?;
    let elapsed = overdue(&running, shared.clock.now(), settings.threshold)?;
    let (pending, truncated) = shared.queue.pending(settings.max_pending);
    Some(DeadlockReport {
        world: shared.name.clone(),
        dimension: shared.dimension,
        origin: running.origin,
        elapsed,
        threshold: settings.threshold,
        pending,
        truncated,
    })
}

/// Watchdog task. Fires at most once, then exits.
pub(crate) async fn run(
    shared: Arc<Shared>,
    settings: WatchdogSettings,
    sink: DeadlockSink,
    mut signal: ShutdownSignal,
) {
    let mut interval = tokio::time::interval(settings.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = signal.wait() => break,
            _ = interval.tick() => {
                if let Some(report) = inspect(&shared, &settings) {
                    sink(&report);
                    break;
                }
            }
        }
    }
    tracing::debug!("Watchdog stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overdue_only_past_threshold() {
        let started = Instant::now();
        let running = RunningTransaction {
            origin: "stuck".into(),
            started,
        };
        let threshold = Duration::from_secs(20);
        assert_eq!(overdue(&running, started, threshold), None);
        assert_eq!(overdue(&running, started + threshold, threshold), None);
        assert_eq!(
            overdue(&running, started + Duration::from_secs(21), threshold),
            Some(Duration::from_secs(21))
        );
    }

    #[test]
    fn report_lists_pending_in_order() {
        let report = DeadlockReport {
            world: "World".into(),
            dimension: Dimension::Nether,
            origin: "player:bob:container-close".into(),
            elapsed: Duration::from_secs(21),
            threshold: Duration::from_secs(20),
            pending: vec!["tick".into(), "auto-save".into()],
            truncated: true,
        };
        let text = report.to_string();
        assert!(text.contains("WORLD: World (nether)"));
        assert!(text.contains("HANGING TRANSACTION: player:bob:container-close"));
        let tick = text.find("#1 tick").unwrap();
        let save = text.find("#2 auto-save").unwrap();
        assert!(tick < save);
        assert!(text.ends_with("(more not shown)"));
    }
}
