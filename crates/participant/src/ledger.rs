//! The ledger seam shared by all participants.

use async_trait::async_trait;
use contract::{Purchasing, Service, TransactionId};

/// What a `Start` command did to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The forward action was applied.
    Applied,
    /// The forward action had already been applied for this transaction.
    Duplicate,
    /// The forward action cannot be applied (business error).
    Rejected(String),
    /// This transaction was already compensated here; the start is stale.
    Compensated,
}

/// What a `Done` confirmation did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    AlreadyConfirmed,
    /// Nothing owned by this transaction to confirm.
    Ignored,
}

/// What a `Rollback` command did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The forward effect was reversed.
    Reversed,
    /// The rollback had already been applied.
    AlreadyCompensated,
    /// The forward action never ran here; a tombstone blocks a late start.
    NothingToUndo,
}

/// A participant's local resource and its per-transaction state machine.
///
/// Implementations serialize every read-modify-write behind their own lock
/// and record which transactions they have applied or compensated, so that
/// each forward and compensating action takes effect at most once per id.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// The participant this ledger belongs to.
    fn service(&self) -> Service;

    /// Applies the forward action.
    async fn apply_start(&self, id: &TransactionId, payload: &Purchasing) -> StartOutcome;

    /// Records that the saga completed.
    async fn apply_done(&self, id: &TransactionId, payload: &Purchasing) -> ConfirmOutcome;

    /// Reverses the forward action, if it was applied.
    async fn apply_rollback(&self, id: &TransactionId, payload: &Purchasing) -> RollbackOutcome;
}
