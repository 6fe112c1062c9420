use thiserror::Error;

/// Errors that can occur when talking to the broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker could not accept the operation right now.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// The broker has been shut down and accepts nothing further.
    #[error("Broker closed")]
    Closed,

    /// A publish kept failing until the retry policy gave up.
    #[error("Publish to '{topic}' failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        topic: String,
        attempts: u32,
        last_error: String,
    },

    /// The circuit breaker is open and the publish was rejected without trying.
    #[error("Circuit open, publish to '{topic}' rejected")]
    CircuitOpen { topic: String },
}

impl BrokerError {
    /// Returns true if trying the same operation again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BrokerError::Unavailable(_))
    }
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
