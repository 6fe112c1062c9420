//! Saga participants.
//!
//! Each participant owns one resource and is its only writer:
//! - Order: a ledger of orders keyed by name (`Pending` until the saga completes)
//! - Payment: a running balance
//!
//! On `Start` a participant applies its forward action and replies on the
//! shared reply topic; on `Rollback` it reverses exactly that effect. Both are
//! idempotent per transaction id.

pub mod error;
pub mod handler;
pub mod ledger;
pub mod order;
pub mod payment;

pub use error::{ParticipantError, Result};
pub use handler::ParticipantHandler;
pub use ledger::{ConfirmOutcome, Ledger, RollbackOutcome, StartOutcome};
pub use order::{OrderEntry, OrderLedger, OrderStatus};
pub use payment::PaymentLedger;

/// The order participant wired to a publisher.
pub type OrderParticipant<B> = ParticipantHandler<OrderLedger, B>;

/// The payment participant wired to a publisher.
pub type PaymentParticipant<B> = ParticipantHandler<PaymentLedger, B>;
