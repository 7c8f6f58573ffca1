use thiserror::Error;

use crate::transaction::Origin;

/// Why a transaction did not deliver a result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecError {
    /// The world was closed before the transaction could be queued.
    #[error("world is closed")]
    Closed,
    /// The transaction was queued but never completed: it was discarded at
    /// shutdown or its body panicked.
    #[error("transaction '{origin}' was abandoned before completing")]
    Abandoned { origin: Origin },
}
