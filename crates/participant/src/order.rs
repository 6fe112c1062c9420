//! Order ledger: one entry per order name.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use contract::{Purchasing, Service, TransactionId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{ParticipantError, Result};
use crate::ledger::{ConfirmOutcome, Ledger, RollbackOutcome, StartOutcome};

/// Lifecycle of an order entry.
///
/// ```text
/// Absent ──Start──► Pending ──Done──► Confirmed
///                      │                  │
///                      └─────Rollback─────┴──► Absent
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Confirmed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An order in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEntry {
    pub status: OrderStatus,
    /// The transaction that created the entry; `None` for manual entries.
    pub transaction_id: Option<TransactionId>,
}

impl OrderEntry {
    fn owned_by(&self, id: &TransactionId) -> bool {
        self.transaction_id.as_ref() == Some(id)
    }
}

#[derive(Debug, Default)]
struct OrderBook {
    entries: HashMap<String, OrderEntry>,
    compensated: HashSet<TransactionId>,
}

/// The order participant's ledger.
///
/// An entry is owned by the transaction that created it: only that
/// transaction can confirm or roll it back.
#[derive(Debug, Clone, Default)]
pub struct OrderLedger {
    book: Arc<RwLock<OrderBook>>,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pending order outside of any saga.
    ///
    /// Returns the index of the new entry, matching the count-based id the
    /// HTTP surface reports.
    pub async fn create_manual(&self, name: &str) -> Result<usize> {
        if name.trim().is_empty() {
            return Err(ParticipantError::BlankOrderName);
        }

        let mut book = self.book.write().await;
        if book.entries.contains_key(name) {
            return Err(ParticipantError::OrderExists(name.to_string()));
        }
        book.entries.insert(
            name.to_string(),
            OrderEntry {
                status: OrderStatus::Pending,
                transaction_id: None,
            },
        );
        Ok(book.entries.len() - 1)
    }

    /// Returns the entry for `name`, if any.
    pub async fn get(&self, name: &str) -> Option<OrderEntry> {
        self.book.read().await.entries.get(name).cloned()
    }

    /// Returns a consistent copy of every entry, ordered by name.
    pub async fn snapshot(&self) -> BTreeMap<String, OrderEntry> {
        self.book
            .read()
            .await
            .entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect()
    }

    /// Returns the number of orders in the ledger.
    pub async fn len(&self) -> usize {
        self.book.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.book.read().await.entries.is_empty()
    }
}

#[async_trait]
impl Ledger for OrderLedger {
    fn service(&self) -> Service {
        Service::Order
    }

    async fn apply_start(&self, id: &TransactionId, payload: &Purchasing) -> StartOutcome {
        let mut book = self.book.write().await;

        if book.compensated.contains(id) {
            return StartOutcome::Compensated;
        }
        if payload.name.trim().is_empty() {
            return StartOutcome::Rejected("order name must not be blank".to_string());
        }

        match book.entries.get(&payload.name) {
            Some(entry) if entry.owned_by(id) => StartOutcome::Duplicate,
            Some(_) => StartOutcome::Rejected(format!("order '{}' already exists", payload.name)),
            None => {
                book.entries.insert(
                    payload.name.clone(),
                    OrderEntry {
                        status: OrderStatus::Pending,
                        transaction_id: Some(id.clone()),
                    },
                );
                StartOutcome::Applied
            }
        }
    }

    async fn apply_done(&self, id: &TransactionId, payload: &Purchasing) -> ConfirmOutcome {
        let mut book = self.book.write().await;

        match book.entries.get_mut(&payload.name) {
            Some(entry) if entry.owned_by(id) => match entry.status {
                OrderStatus::Pending => {
                    entry.status = OrderStatus::Confirmed;
                    ConfirmOutcome::Confirmed
                }
                OrderStatus::Confirmed => ConfirmOutcome::AlreadyConfirmed,
            },
            _ => ConfirmOutcome::Ignored,
        }
    }

    async fn apply_rollback(&self, id: &TransactionId, payload: &Purchasing) -> RollbackOutcome {
        let mut book = self.book.write().await;

        if !book.compensated.insert(id.clone()) {
            return RollbackOutcome::AlreadyCompensated;
        }

        let owned = book
            .entries
            .get(&payload.name)
            .is_some_and(|entry| entry.owned_by(id));
        if owned {
            book.entries.remove(&payload.name);
            RollbackOutcome::Reversed
        } else {
            RollbackOutcome::NothingToUndo
        }
    }
}
