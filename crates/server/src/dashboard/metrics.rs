//! Lock-free transaction counters.
//!
//! The executor updates these via atomic operations after every transaction.
//! No locks, no allocations, nothing that could stall the world. The
//! dashboard reads them at its own pace.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::time::{Duration, Instant};

/// Atomic per-world counters. A handful of `fetch_add`s per transaction.
pub struct Metrics {
    // Monotonic counters
    transactions: AtomicU64,
    panicked: AtomicU64,
    ticks: AtomicU64,
    saves: AtomicU64,
    save_failures: AtomicU64,
    exec_ns_sum: AtomicU64,
    queue_ns_sum: AtomicU64,

    // Gauges
    longest_exec_ns: AtomicU64,

    // Execution time histogram buckets
    hist_under_100us: AtomicU64,
    hist_100us_1ms: AtomicU64,
    hist_1_10ms: AtomicU64,
    hist_10_50ms: AtomicU64,
    hist_over_50ms: AtomicU64,

    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            transactions: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            saves: AtomicU64::new(0),
            save_failures: AtomicU64::new(0),
            exec_ns_sum: AtomicU64::new(0),
            queue_ns_sum: AtomicU64::new(0),
            longest_exec_ns: AtomicU64::new(0),
            hist_under_100us: AtomicU64::new(0),
            hist_100us_1ms: AtomicU64::new(0),
            hist_1_10ms: AtomicU64::new(0),
            hist_10_50ms: AtomicU64::new(0),
            hist_over_50ms: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Called by the executor after a transaction body returned.
    /// `queued` is the time between enqueue and start.
    pub fn record_transaction(&self, queued: Duration, exec: Duration) {
        let exec_ns = exec.as_nanos() as u64;
        self.transactions.fetch_add(1, Relaxed);
        self.exec_ns_sum.fetch_add(exec_ns, Relaxed);
        self.queue_ns_sum.fetch_add(queued.as_nanos() as u64, Relaxed);
        self.longest_exec_ns.fetch_max(exec_ns, Relaxed);

        let us = exec.as_micros() as u64;
        match us {
            0..=99 => {
                self.hist_under_100us.fetch_add(1, Relaxed);
            }
            100..=999 => {
                self.hist_100us_1ms.fetch_add(1, Relaxed);
            }
            1_000..=9_999 => {
                self.hist_1_10ms.fetch_add(1, Relaxed);
            }
            10_000..=49_999 => {
                self.hist_10_50ms.fetch_add(1, Relaxed);
            }
            _ => {
                self.hist_over_50ms.fetch_add(1, Relaxed);
            }
        }
    }

    pub fn record_panic(&self) {
        self.panicked.fetch_add(1, Relaxed);
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Relaxed);
    }

    pub fn record_save(&self, ok: bool) {
        if ok {
            self.saves.fetch_add(1, Relaxed);
        } else {
            self.save_failures.fetch_add(1, Relaxed);
        }
    }

    /// Read all counters into a serializable snapshot.
    /// `queued` and `tick` are gauges the caller samples from the world.
    pub fn snapshot(&self, queued: u64, tick: i64) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs_f64(),
            tick,
            queued,
            transactions_total: self.transactions.load(Relaxed),
            panicked_total: self.panicked.load(Relaxed),
            ticks_total: self.ticks.load(Relaxed),
            saves_total: self.saves.load(Relaxed),
            save_failures_total: self.save_failures.load(Relaxed),
            exec_ns_sum: self.exec_ns_sum.load(Relaxed),
            queue_ns_sum: self.queue_ns_sum.load(Relaxed),
            longest_exec_ns: self.longest_exec_ns.load(Relaxed),
            hist: [
                self.hist_under_100us.load(Relaxed),
                self.hist_100us_1ms.load(Relaxed),
                self.hist_1_10ms.load(Relaxed),
                self.hist_10_50ms.load(Relaxed),
                self.hist_over_50ms.load(Relaxed),
            ],
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable snapshot of all metrics at a point in time.
/// Clients compute rates (ticks/sec, etc.) by diffing consecutive snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: f64,
    pub tick: i64,
    pub queued: u64,
    pub transactions_total: u64,
    pub panicked_total: u64,
    pub ticks_total: u64,
    pub saves_total: u64,
    pub save_failures_total: u64,
    pub exec_ns_sum: u64,
    pub queue_ns_sum: u64,
    pub longest_exec_ns: u64,
    /// `[<100μs, 100μs-1ms, 1-10ms, 10-50ms, >50ms]`
    pub hist: [u64; 5],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transactions_land_in_histogram_buckets() {
        let metrics = Metrics::new();
        metrics.record_transaction(Duration::from_micros(3), Duration::from_micros(20));
        metrics.record_transaction(Duration::ZERO, Duration::from_millis(4));
        metrics.record_transaction(Duration::ZERO, Duration::from_millis(80));
        metrics.record_panic();
        metrics.record_save(true);
        metrics.record_save(false);

        let snap = metrics.snapshot(2, 40);
        assert_eq!(snap.transactions_total, 3);
        assert_eq!(snap.hist, [1, 0, 1, 0, 1]);
        assert_eq!(snap.longest_exec_ns, 80_000_000);
        assert_eq!(snap.queue_ns_sum, 3_000);
        assert_eq!((snap.saves_total, snap.save_failures_total), (1, 1));
        assert_eq!(snap.panicked_total, 1);
        assert_eq!((snap.queued, snap.tick), (2, 40));
    }
}
