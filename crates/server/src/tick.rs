//! Fixed-rate tick driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::clock::Clock;
use crate::lifecycle::ShutdownSignal;
use crate::queue::QueueSender;
use crate::transaction::{Origin, Transaction, Tx};

/// Default tick rate: 20 ticks per second.
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Tag of the transactions the driver submits.
pub const TICK_ORIGIN: &str = "tick";

/// Body of every tick transaction.
pub(crate) fn tick_body(tx: &mut Tx<'_>) {
    tx.tick();
}

/// Enqueue `body` under `origin` every `period` until shutdown.
///
/// The interval's immediate first tick is skipped. Each firing enqueues
/// exactly one transaction and waits for queue space instead of dropping or
/// coalescing; firings missed meanwhile burst to catch up.
pub(crate) async fn every(
    queue: QueueSender,
    clock: Arc<dyn Clock>,
    period: Duration,
    origin: Origin,
    body: fn(&mut Tx<'_>),
    mut signal: ShutdownSignal,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = signal.wait() => break,
            _ = interval.tick() => {}
        }
        let transaction = Transaction::detached(origin.clone(), clock.now(), body);
        tokio::select! {
            biased;
            _ = signal.wait() => break,
            pushed = queue.push(transaction) => {
                if pushed.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!("Periodic '{}' stopped", origin);
}

/// Tick driver task.
pub(crate) async fn run(queue: QueueSender, clock: Arc<dyn Clock>, period: Duration, signal: ShutdownSignal) {
    tracing::debug!("Tick driver started (interval {:?})", period);
    every(queue, clock, period, TICK_ORIGIN.into(), tick_body, signal).await;
}

#[cfg(test)]
mod tests {
    use tracing::Span;

    use super::*;
    use crate::clock::SystemClock;
    use crate::lifecycle::TaskGroup;
    use crate::queue::Queue;

    #[tokio::test(start_paused = true)]
    async fn one_tick_per_interval() {
        let queue = Queue::new(64);
        let group = TaskGroup::new(Span::none(), None);
        group.spawn(
            "tick",
            run(queue.sender(), Arc::new(SystemClock), TICK_INTERVAL, group.signal()),
        );

        tokio::time::sleep(TICK_INTERVAL * 20 + TICK_INTERVAL / 2).await;
        group.shutdown().await;

        let (origins, more) = queue.pending(64);
        assert_eq!(origins.len(), 20);
        assert!(!more);
        assert!(origins.iter().all(|o| o.as_str() == TICK_ORIGIN));
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_delays_instead_of_dropping() {
        let queue = Queue::new(2);
        let group = TaskGroup::new(Span::none(), None);
        group.spawn(
            "tick",
            run(queue.sender(), Arc::new(SystemClock), TICK_INTERVAL, group.signal()),
        );

        // Five firings, room for two.
        tokio::time::sleep(TICK_INTERVAL * 5 + TICK_INTERVAL / 2).await;
        assert_eq!(queue.len(), 2);

        // Consuming makes room; the blocked firing and the missed ones follow.
        let idle = TaskGroup::new(Span::none(), None);
        let mut signal = idle.signal();
        for _ in 0..2 {
            assert!(queue.next(&mut signal).await.is_some());
        }
        tokio::time::sleep(TICK_INTERVAL / 4).await;
        assert_eq!(queue.len(), 2);

        group.shutdown().await;
    }
}
