//! Message contract for the purchase saga.
//!
//! Every component depends on this crate and on nothing else to talk to the
//! others: messages are serialized with `serde_json` and published on one topic
//! per participant plus a shared reply topic.

pub mod error;
pub mod message;
pub mod types;

pub use error::{ContractError, Result};
pub use message::{Action, Message, ORDER_CHANNEL, PAYMENT_CHANNEL, REPLY_CHANNEL, Service};
pub use types::{Purchasing, TransactionId};
