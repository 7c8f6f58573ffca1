//! The single consumer of a world's queue.
//!
//! Runs on its own OS thread and owns the `World` outright; transactions get
//! a `&mut World` one at a time, in arrival order.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use strata_engine::world::World;

use crate::lifecycle::ShutdownSignal;
use crate::transaction::{Transaction, Tx};
use crate::world::Shared;

/// Transactions slower than this are logged.
const SLOW_TRANSACTION: Duration = Duration::from_millis(50);

/// Executor thread body. Returns after running the final transaction, or
/// once shutdown is signalled and the transaction in flight (if any) has
/// finished. Everything still queued is discarded. The world is dropped on
/// return, releasing its settings.
pub(crate) fn run(mut world: World, shared: Arc<Shared>, mut signal: ShutdownSignal) {
    let runtime = shared.runtime.clone();
    // Timestamps need the runtime context on this thread.
    let _enter = runtime.enter();
    tracing::debug!("Executor started at tick {}", world.current_tick());

    while let Some(transaction) = runtime.block_on(shared.queue.next(&mut signal)) {
        let is_final = transaction.is_final;
        execute(&mut world, &shared, transaction);
        if is_final {
            break;
        }
    }

    let discarded = runtime.block_on(shared.queue.close());
    if discarded > 0 {
        tracing::warn!("Discarded {} queued transactions at shutdown", discarded);
    }
    tracing::debug!("Executor stopped at tick {}", world.current_tick());
}

fn execute(world: &mut World, shared: &Shared, transaction: Transaction) {
    let Transaction {
        origin,
        work,
        enqueued_at,
        ..
    } = transaction;

    let started = shared.clock.now();
    shared.running.begin(origin.clone(), started);
    let outcome = {
        let mut tx = Tx::new(world, shared);
        panic::catch_unwind(AssertUnwindSafe(move || work(&mut tx)))
    };
    let elapsed = shared.clock.now().saturating_duration_since(started);
    shared.running.finish();

    match outcome {
        Ok(complete) => {
            shared
                .metrics
                .record_transaction(started.saturating_duration_since(enqueued_at), elapsed);
            complete();
        }
        Err(payload) => {
            // The completion sender was dropped with the body, so the waiter
            // sees `Abandoned`.
            shared.metrics.record_panic();
            tracing::error!("Transaction '{}' panicked: {}", origin, panic_message(&*payload));
        }
    }

    if elapsed > SLOW_TRANSACTION {
        tracing::warn!("Slow transaction '{}': {:.2?}", origin, elapsed);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}
