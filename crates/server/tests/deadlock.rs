//! Deadlock detection, driven by a manual clock so the threshold can be
//! crossed without waiting for it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use strata_server::clock::ManualClock;
use strata_server::watchdog::{DeadlockReport, DeadlockSink};
use strata_server::{Config, Origin, SaveInterval, Tuning};
use tokio::sync::oneshot;

fn collecting_sink() -> (DeadlockSink, Arc<Mutex<Vec<DeadlockReport>>>) {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink: DeadlockSink = {
        let reports = Arc::clone(&reports);
        Arc::new(move |report: &DeadlockReport| reports.lock().unwrap().push(report.clone()))
    };
    (sink, reports)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stuck_transaction_is_reported_once() {
    let clock = Arc::new(ManualClock::new());
    let (sink, reports) = collecting_sink();
    let world = Config {
        save_interval: SaveInterval::Disabled,
        random_tick_speed: -1,
        tuning: Tuning {
            tick_interval: Duration::from_secs(3600),
            watchdog_interval: Duration::from_millis(10),
            deadlock_threshold: Duration::from_secs(20),
            max_reported_pending: 2,
            ..Tuning::default()
        },
        clock: Some(clock.clone()),
        deadlock_sink: Some(sink),
        ..Config::default()
    }
    .open()
    .await
    .unwrap();
    assert_eq!(world.running_tasks(), 4);

    let (started_tx, started_rx) = oneshot::channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let stuck = world
        .enqueue("player:alice:container-close", move |_tx| {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
        })
        .await
        .unwrap();
    started_rx.await.unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut pending = Vec::new();
    for i in 1..=3 {
        let order = Arc::clone(&order);
        let p = world
            .enqueue(format!("pending-{i}"), move |_tx| {
                order.lock().unwrap().push(i);
                i
            })
            .await
            .unwrap();
        pending.push(p);
    }

    // Long, but not past the threshold.
    clock.advance(Duration::from_secs(19));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(reports.lock().unwrap().is_empty());
    let running = world.running_transaction().expect("executor is inside the stuck body");
    assert_eq!(running.origin.as_str(), "player:alice:container-close");

    clock.advance(Duration::from_secs(2));
    for _ in 0..200 {
        if !reports.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    {
        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.origin, Origin::from("player:alice:container-close"));
        assert!(report.elapsed > report.threshold);
        assert_eq!(report.pending, vec![Origin::from("pending-1"), Origin::from("pending-2")]);
        assert!(report.truncated);
        assert!(report.to_string().contains("#2 pending-2"));
    }

    // The watchdog is done after one report. Reporting left the backlog alone.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(world.running_tasks(), 3);
    assert_eq!(world.queued_transactions(), 3);

    release_tx.send(()).unwrap();
    stuck.wait().await.unwrap();
    for (i, p) in pending.into_iter().enumerate() {
        assert_eq!(p.wait().await.unwrap(), i + 1);
    }
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);

    clock.advance(Duration::from_secs(60));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(reports.lock().unwrap().len(), 1);
    world.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn idle_world_is_never_reported() {
    let clock = Arc::new(ManualClock::new());
    let (sink, reports) = collecting_sink();
    let world = Config {
        save_interval: SaveInterval::Disabled,
        tuning: Tuning {
            tick_interval: Duration::from_secs(3600),
            watchdog_interval: Duration::from_millis(5),
            ..Tuning::default()
        },
        clock: Some(clock.clone()),
        deadlock_sink: Some(sink),
        ..Config::default()
    }
    .open()
    .await
    .unwrap();

    clock.advance(Duration::from_secs(3600));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(reports.lock().unwrap().is_empty());
    assert!(world.running_transaction().is_none());
    world.close().await;
}
