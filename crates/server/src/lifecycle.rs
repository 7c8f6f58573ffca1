//! Background task group with a one-shot shutdown broadcast.
//!
//! Every task spawned through a [`TaskGroup`] bumps a running counter and
//! decrements it when it exits (including on panic, via a drop guard).
//! [`TaskGroup::shutdown`] broadcasts the stop signal once and then waits for
//! the counter to reach zero, so nothing the group started outlives it.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Notify, watch};
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Instrument, Span};

/// Receiving side of the shutdown broadcast. Cheap to clone.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown has been requested, or the group was dropped.
    pub async fn wait(&mut self) {
        // An error means the sender is gone, which is a shutdown as well.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    pub fn is_set(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Decrements the running counter when the task holding it ends.
struct TaskGuard {
    name: String,
    running: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        tracing::debug!("Task '{}' exited", self.name);
        if self.running.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Starts background work and stops all of it together.
///
/// Tasks run inside `span` and, when a dispatch is given, log to it instead
/// of the global subscriber. Dropping the group also broadcasts shutdown
/// (the watch sender goes away), but only [`shutdown`](Self::shutdown) waits.
pub struct TaskGroup {
    stop: watch::Sender<bool>,
    running: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    span: Span,
    dispatch: Option<Dispatch>,
}

impl TaskGroup {
    pub fn new(span: Span, dispatch: Option<Dispatch>) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            stop,
            running: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
            span,
            dispatch,
        }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.stop.subscribe(),
        }
    }

    fn guard(&self, name: &str) -> TaskGuard {
        self.running.fetch_add(1, Ordering::AcqRel);
        tracing::debug!("Task '{}' started", name);
        TaskGuard {
            name: name.to_string(),
            running: Arc::clone(&self.running),
            idle: Arc::clone(&self.idle),
        }
    }

    /// Spawn an async task on the current tokio runtime.
    pub fn spawn<F>(&self, name: &str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.guard(name);
        let task = async move {
            let _guard = guard;
            task.await;
        }
        .instrument(self.span.clone());
        match &self.dispatch {
            Some(dispatch) => tokio::spawn(task.with_subscriber(dispatch.clone())),
            None => tokio::spawn(task),
        };
    }

    /// Spawn a dedicated OS thread.
    pub fn spawn_thread<F>(&self, name: &str, task: F) -> std::io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = self.guard(name);
        let span = self.span.clone();
        let dispatch = self.dispatch.clone();
        let spawned = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _guard = guard;
                let run = move || span.in_scope(task);
                match dispatch {
                    Some(dispatch) => tracing::dispatcher::with_default(&dispatch, run),
                    None => run(),
                }
            });
        // On failure the closure (and the guard inside it) is dropped, which
        // undoes the counter bump.
        spawned.map(|_| ())
    }

    /// Number of tasks that have not exited yet.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.stop.borrow()
    }

    /// Broadcast the stop signal and wait until every task has exited.
    pub async fn shutdown(&self) {
        self.stop.send_replace(true);
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.running() == 0 {
                break;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn shutdown_waits_for_every_task() {
        let group = TaskGroup::new(Span::none(), None);
        let exited = Arc::new(AtomicUsize::new(0));

        for i in 0..3 {
            let mut signal = group.signal();
            let exited = Arc::clone(&exited);
            group.spawn(&format!("worker-{i}"), async move {
                signal.wait().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
                exited.fetch_add(1, Ordering::SeqCst);
            });
        }
        let signal = group.signal();
        let exited_thread = Arc::clone(&exited);
        group
            .spawn_thread("blocking", move || {
                while !signal.is_set() {
                    std::thread::sleep(Duration::from_millis(1));
                }
                exited_thread.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(group.running(), 4);
        tokio::time::timeout(Duration::from_secs(5), group.shutdown())
            .await
            .expect("shutdown timed out");
        assert_eq!(group.running(), 0);
        assert_eq!(exited.load(Ordering::SeqCst), 4);
        assert!(group.is_shutting_down());
    }

    #[tokio::test]
    async fn dropping_the_group_releases_waiters() {
        let group = TaskGroup::new(Span::none(), None);
        let mut signal = group.signal();
        drop(group);
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .expect("signal should resolve once the group is gone");
    }

    #[tokio::test]
    async fn shutdown_with_no_tasks_returns_immediately() {
        let group = TaskGroup::new(Span::none(), None);
        group.shutdown().await;
        group.shutdown().await;
        assert_eq!(group.running(), 0);
    }
}
