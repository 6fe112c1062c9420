//! Saga coordinator for the order and payment steps.
//!
//! The coordinator starts each transaction at the order participant, advances
//! it to payment when the order step replies done, and confirms the order when
//! payment replies done. An error reply from either step broadcasts rollback
//! to every participant.
//!
//! Every transaction is tracked in an in-memory [`TransactionLog`] of
//! [`SagaEvent`]s, so duplicate and reordered replies are recognized and an
//! optional timeout can compensate sagas that never finish.

pub mod coordinator;
pub mod error;
pub mod events;
pub mod log;
pub mod record;
pub mod state;

pub use coordinator::{CoordinatorConfig, ReplyOutcome, SagaCoordinator};
pub use error::{Result, SagaError};
pub use events::{CompensationReason, SagaEvent};
pub use log::TransactionLog;
pub use record::TransactionRecord;
pub use state::SagaState;
