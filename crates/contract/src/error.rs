//! Contract error types.

use thiserror::Error;

/// Errors raised while decoding or validating a message.
#[derive(Debug, Error)]
pub enum ContractError {
    /// The bytes are not a well-formed message.
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The message parsed but carries an invalid field.
    #[error("Invalid message field '{field}': {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

/// Result type for contract operations.
pub type Result<T> = std::result::Result<T, ContractError>;
