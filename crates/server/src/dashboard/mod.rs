//! Live status dashboard.
//!
//! Reads only what a world exposes without a transaction: the shared tick,
//! queue depth, the running record and the metrics counters. Polling the
//! dashboard never queues work, so it stays responsive even when a world is
//! wedged (which is exactly when you want to look at it).

pub mod metrics;
pub mod server;

use serde::Serialize;

use crate::world::WorldHandle;

pub use metrics::{Metrics, MetricsSnapshot};

/// Worlds shown on the dashboard, shared via `Arc<DashboardState>`.
pub struct DashboardState {
    worlds: Vec<WorldHandle>,
}

impl DashboardState {
    pub fn new(worlds: Vec<WorldHandle>) -> Self {
        Self { worlds }
    }

    pub fn statuses(&self) -> Vec<WorldStatus> {
        self.worlds.iter().map(status).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorldStatus {
    pub name: String,
    pub dimension: &'static str,
    pub tick: i64,
    pub advancing: bool,
    pub read_only: bool,
    pub closed: bool,
    pub queued: usize,
    pub running_tasks: usize,
    pub running: Option<RunningStatus>,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunningStatus {
    pub origin: String,
    pub elapsed_ms: u64,
}

/// Sample the current status of `world`.
pub fn status(world: &WorldHandle) -> WorldStatus {
    let running = world.running_transaction().map(|r| RunningStatus {
        origin: r.origin.to_string(),
        elapsed_ms: r.started.elapsed().as_millis() as u64,
    });
    WorldStatus {
        name: world.name().to_string(),
        dimension: world.dimension().name(),
        tick: world.current_tick(),
        advancing: world.is_advancing(),
        read_only: world.is_read_only(),
        closed: world.is_closed(),
        queued: world.queued_transactions(),
        running_tasks: world.running_tasks(),
        running,
        metrics: world.metrics(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{Config, SaveInterval, Tuning};
    use crate::watchdog;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn status_serializes_without_a_transaction() {
        let world = Config {
            save_interval: SaveInterval::Disabled,
            tuning: Tuning {
                tick_interval: Duration::from_secs(3600),
                ..Tuning::default()
            },
            deadlock_sink: Some(watchdog::log_sink()),
            ..Config::default()
        }
        .open()
        .await
        .unwrap();

        let state = DashboardState::new(vec![world.clone()]);
        let statuses = state.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].dimension, "overworld");
        assert_eq!(statuses[0].tick, 1);
        assert!(statuses[0].running.is_none());
        assert_eq!(statuses[0].metrics.ticks_total, 1);

        let json = serde_json::to_value(&statuses).unwrap();
        assert_eq!(json[0]["name"], "World");
        assert_eq!(json[0]["closed"], false);

        world.close().await;
        assert!(status(&world).closed);
    }
}
