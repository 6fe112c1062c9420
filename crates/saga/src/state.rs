//! Saga state machine.

use contract::Service;
use serde::{Deserialize, Serialize};

/// The state of a transaction as seen by the coordinator.
///
/// State transitions:
/// ```text
/// AwaitingOrder ──► AwaitingPayment ──► Completed
///       │                  │
///       └──────────────────┴──► RolledBack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// The order step has been started and has not replied yet.
    #[default]
    AwaitingOrder,

    /// The order step is done; the payment step has been started.
    AwaitingPayment,

    /// Every step completed (terminal state).
    Completed,

    /// Compensation was broadcast to every participant (terminal state).
    RolledBack,
}

impl SagaState {
    /// Returns the step the saga is waiting on, if any.
    pub fn awaiting(&self) -> Option<Service> {
        match self {
            SagaState::AwaitingOrder => Some(Service::Order),
            SagaState::AwaitingPayment => Some(Service::Payment),
            SagaState::Completed | SagaState::RolledBack => None,
        }
    }

    /// Returns the state that waits on `service`.
    pub fn awaiting_step(service: Service) -> Self {
        match service {
            Service::Order => SagaState::AwaitingOrder,
            Service::Payment => SagaState::AwaitingPayment,
        }
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::RolledBack)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::AwaitingOrder => "AwaitingOrder",
            SagaState::AwaitingPayment => "AwaitingPayment",
            SagaState::Completed => "Completed",
            SagaState::RolledBack => "RolledBack",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
