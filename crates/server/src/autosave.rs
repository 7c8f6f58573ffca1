//! Periodic persistence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::config::SaveInterval;
use crate::lifecycle::ShutdownSignal;
use crate::queue::QueueSender;
use crate::tick;
use crate::transaction::Tx;

/// Tag of the transactions the worker submits.
pub const AUTOSAVE_ORIGIN: &str = "auto-save";

/// How often to save, or `None` when the worker should not run at all.
pub(crate) fn period(read_only: bool, interval: SaveInterval) -> Option<Duration> {
    if read_only {
        return None;
    }
    interval.period()
}

fn save_body(tx: &mut Tx<'_>) {
    let start = Instant::now();
    match tx.save() {
        Ok(n) => tracing::info!("Autosave complete: {} columns ({:.2?})", n, start.elapsed()),
        Err(e) => tracing::error!("Autosave failed: {:#}", e),
    }
}

/// Auto-save worker task.
pub(crate) async fn run(queue: QueueSender, clock: Arc<dyn Clock>, period: Duration, signal: ShutdownSignal) {
    tracing::debug!("Autosave worker started (every {:?})", period);
    tick::every(queue, clock, period, AUTOSAVE_ORIGIN.into(), save_body, signal).await;
}
