//! HTTP route handlers.

pub mod health;
pub mod metrics;
pub mod orders;
pub mod payment;
pub mod transactions;

use broker::{InMemoryBroker, RetryingPublisher};
use participant::{OrderLedger, PaymentLedger};
use saga::SagaCoordinator;
use std::sync::Arc;

/// The publisher shared by the coordinator and both participants.
pub type Publisher = RetryingPublisher<InMemoryBroker>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub publisher: Publisher,
    pub coordinator: Arc<SagaCoordinator<Publisher>>,
    pub orders: OrderLedger,
    pub payments: PaymentLedger,
}
