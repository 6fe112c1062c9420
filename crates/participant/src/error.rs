//! Participant error types.

use broker::BrokerError;
use contract::ContractError;
use thiserror::Error;

/// Errors that can occur while a participant handles a message or a direct write.
#[derive(Debug, Error)]
pub enum ParticipantError {
    /// An order with this name is already in the ledger.
    #[error("Order already exists: {0}")]
    OrderExists(String),

    /// Order names must not be blank.
    #[error("Order name must not be blank")]
    BlankOrderName,

    /// The amount cannot be applied to the balance.
    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: i64, reason: String },

    /// A reply could not be encoded.
    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),

    /// A reply could not be published.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

/// Convenience type alias for participant results.
pub type Result<T> = std::result::Result<T, ParticipantError>;
