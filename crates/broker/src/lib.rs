//! Publish/subscribe capability used by the saga components.
//!
//! The transport itself is an external concern; this crate fixes the
//! interface (`publish(topic, bytes)` / `subscribe(topic)`), provides an
//! in-memory implementation, a concurrent consumption loop and a publisher
//! that retries with backoff behind a circuit breaker.

pub mod broker;
pub mod consumer;
pub mod error;
pub mod memory;
pub mod retry;

pub use broker::{Broker, Subscription};
pub use consumer::{MessageHandler, consume, spawn_consumer};
pub use error::{BrokerError, Result};
pub use memory::InMemoryBroker;
pub use retry::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryPolicy, RetryingPublisher};
