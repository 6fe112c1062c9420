//! Saga error types.

use broker::BrokerError;
use contract::{ContractError, TransactionId};
use thiserror::Error;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A transaction with this id already exists; ids are never reused.
    #[error("Transaction already exists: {0}")]
    DuplicateTransaction(TransactionId),

    /// A message could not be encoded or decoded.
    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),

    /// A command could not be published, even after retrying.
    #[error("Publish failed: {0}")]
    Publish(#[from] BrokerError),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
