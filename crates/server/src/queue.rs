//! The bounded FIFO every mutation of a world goes through.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};

use crate::error::ExecError;
use crate::lifecycle::ShutdownSignal;
use crate::transaction::{Origin, Transaction};

/// Cloneable producer side. `push` waits while the queue is full.
#[derive(Clone)]
pub(crate) struct QueueSender {
    tx: mpsc::Sender<Transaction>,
    capacity: usize,
}

impl QueueSender {
    pub(crate) async fn push(&self, transaction: Transaction) -> Result<(), ExecError> {
        self.tx.send(transaction).await.map_err(|_| ExecError::Closed)
    }

    /// For threads outside the runtime. Panics if called from async context.
    pub(crate) fn blocking_push(&self, transaction: Transaction) -> Result<(), ExecError> {
        self.tx.blocking_send(transaction).map_err(|_| ExecError::Closed)
    }

    /// Transactions in the channel, not counting held ones.
    fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }
}

/// Consumer end. `held` keeps transactions taken out of the channel for
/// inspection; they run before anything still in the channel.
struct Inbox {
    rx: mpsc::Receiver<Transaction>,
    held: VecDeque<Transaction>,
}

/// Queue plus its single consumer end.
///
/// The inbox sits behind an async mutex: the executor holds it while
/// waiting for work, and the watchdog can take it (without blocking) to
/// look at the backlog while the executor is stuck inside a body.
pub(crate) struct Queue {
    sender: QueueSender,
    inbox: Mutex<Inbox>,
    held: AtomicUsize,
}

impl Queue {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            sender: QueueSender { tx, capacity },
            inbox: Mutex::new(Inbox {
                rx,
                held: VecDeque::new(),
            }),
            held: AtomicUsize::new(0),
        }
    }

    pub(crate) fn sender(&self) -> QueueSender {
        self.sender.clone()
    }

    /// Transactions waiting to be picked up.
    pub(crate) fn len(&self) -> usize {
        self.sender.len() + self.held.load(Ordering::Acquire)
    }

    /// Next transaction in arrival order, or `None` once shutdown is
    /// signalled. Shutdown wins over queued work.
    pub(crate) async fn next(&self, signal: &mut ShutdownSignal) -> Option<Transaction> {
        let mut inbox = self.inbox.lock().await;
        if signal.is_set() {
            return None;
        }
        if let Some(transaction) = inbox.held.pop_front() {
            self.held.store(inbox.held.len(), Ordering::Release);
            return Some(transaction);
        }
        tokio::select! {
            biased;
            _ = signal.wait() => None,
            next = inbox.rx.recv() => next,
        }
    }

    /// Origins of up to `max` queued transactions in the order they will
    /// run, plus whether more are waiting behind them. Nothing is removed.
    ///
    /// Gives up immediately (empty, `false`) if the inbox is in use.
    pub(crate) fn pending(&self, max: usize) -> (Vec<Origin>, bool) {
        let Ok(mut inbox) = self.inbox.try_lock() else {
            return (Vec::new(), false);
        };
        while inbox.held.len() < max {
            match inbox.rx.try_recv() {
                Ok(transaction) => inbox.held.push_back(transaction),
                Err(_) => break,
            }
        }
        self.held.store(inbox.held.len(), Ordering::Release);
        let origins = inbox.held.iter().take(max).map(|t| t.origin.clone()).collect();
        (origins, inbox.held.len() > max || !inbox.rx.is_empty())
    }

    /// Refuse new work and discard everything still queued. Returns how many
    /// transactions were discarded.
    pub(crate) async fn close(&self) -> usize {
        let mut inbox = self.inbox.lock().await;
        inbox.rx.close();
        let mut discarded = 0;
        let held = std::mem::take(&mut inbox.held);
        self.held.store(0, Ordering::Release);
        for transaction in held {
            tracing::debug!("Discarding unstarted transaction '{}'", transaction.origin);
            discarded += 1;
        }
        while let Ok(transaction) = inbox.rx.try_recv() {
            tracing::debug!("Discarding unstarted transaction '{}'", transaction.origin);
            discarded += 1;
        }
        discarded
    }
}

/// Moves detached follow-ups onto the queue one at a time, so they keep the
/// order they were enqueued in. On shutdown whatever is already buffered is
/// still pushed before returning.
pub(crate) async fn forward_detached(
    mut rx: mpsc::UnboundedReceiver<Transaction>,
    queue: QueueSender,
    mut signal: ShutdownSignal,
) {
    loop {
        tokio::select! {
            biased;
            _ = signal.wait() => break,
            next = rx.recv() => match next {
                Some(transaction) => {
                    if queue.push(transaction).await.is_err() {
                        return;
                    }
                }
                None => return,
            },
        }
    }
    rx.close();
    while let Ok(transaction) = rx.try_recv() {
        if queue.push(transaction).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;
    use tracing::Span;

    use super::*;
    use crate::lifecycle::TaskGroup;

    fn noop(tag: &'static str) -> Transaction {
        Transaction::detached(tag.into(), Instant::now(), |_tx| {})
    }

    #[tokio::test]
    async fn pending_leaves_the_queue_intact() {
        let queue = Queue::new(8);
        let sender = queue.sender();
        for tag in ["a", "b", "c", "d"] {
            sender.push(noop(tag)).await.unwrap();
        }
        assert_eq!(queue.len(), 4);

        let (origins, more) = queue.pending(3);
        assert_eq!(origins, vec![Origin::from("a"), "b".into(), "c".into()]);
        assert!(more);
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.pending(3), (origins, true));
        assert!(!queue.pending(8).1);

        let idle = TaskGroup::new(Span::none(), None);
        let mut signal = idle.signal();
        for tag in ["a", "b", "c", "d"] {
            let next = queue.next(&mut signal).await.unwrap();
            assert_eq!(next.origin, Origin::from(tag));
        }
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn closed_queue_rejects_pushes() {
        let queue = Queue::new(2);
        let sender = queue.sender();
        sender.push(noop("queued")).await.unwrap();
        sender.push(noop("held")).await.unwrap();
        let _ = queue.pending(1);

        assert_eq!(queue.close().await, 2);
        assert_eq!(queue.len(), 0);
        assert_eq!(sender.push(noop("late")).await, Err(ExecError::Closed));
    }

    #[tokio::test]
    async fn forwarder_flushes_buffered_work_on_shutdown() {
        let queue = Queue::new(8);
        let group = TaskGroup::new(Span::none(), None);
        let (tx, rx) = mpsc::unbounded_channel();
        for tag in ["x", "y", "z"] {
            tx.send(noop(tag)).unwrap();
        }
        group.spawn("detached", forward_detached(rx, queue.sender(), group.signal()));
        group.shutdown().await;

        assert!(tx.send(noop("late")).is_err());
        assert_eq!(queue.pending(8), (vec![Origin::from("x"), "y".into(), "z".into()], false));
    }
}
