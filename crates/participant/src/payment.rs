//! Payment ledger: a running balance with per-transaction charges.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use contract::{Purchasing, Service, TransactionId};
use tokio::sync::RwLock;

use crate::error::{ParticipantError, Result};
use crate::ledger::{ConfirmOutcome, Ledger, RollbackOutcome, StartOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Charge {
    Applied(i64),
    Compensated,
}

#[derive(Debug, Default)]
struct Account {
    balance: i64,
    charges: HashMap<TransactionId, Charge>,
}

/// The payment participant's ledger.
///
/// Every saga charge is remembered by transaction id, so a redelivered start
/// never adds twice and a rollback subtracts exactly what was added, once.
#[derive(Debug, Clone, Default)]
pub struct PaymentLedger {
    account: Arc<RwLock<Account>>,
    max_amount: Option<i64>,
}

impl PaymentLedger {
    /// Creates a ledger with a zero balance and no per-charge limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects saga charges above `max_amount`.
    pub fn with_limit(mut self, max_amount: i64) -> Self {
        self.max_amount = Some(max_amount);
        self
    }

    /// Returns the current balance.
    pub async fn balance(&self) -> i64 {
        self.account.read().await.balance
    }

    /// Returns the amount currently applied for a transaction.
    pub async fn applied_amount(&self, id: &TransactionId) -> Option<i64> {
        match self.account.read().await.charges.get(id) {
            Some(Charge::Applied(amount)) => Some(*amount),
            _ => None,
        }
    }

    /// Adds `amount` to the balance outside of any saga.
    ///
    /// Returns the new balance.
    pub async fn deposit(&self, amount: i64) -> Result<i64> {
        let mut account = self.account.write().await;
        let balance =
            account
                .balance
                .checked_add(amount)
                .ok_or_else(|| ParticipantError::InvalidAmount {
                    amount,
                    reason: "balance overflow".to_string(),
                })?;
        account.balance = balance;
        Ok(balance)
    }

    fn check_charge(&self, amount: i64) -> std::result::Result<(), String> {
        if amount <= 0 {
            return Err(format!("amount must be positive, got {amount}"));
        }
        if let Some(max) = self.max_amount
            && amount > max
        {
            return Err(format!("amount {amount} exceeds limit {max}"));
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for PaymentLedger {
    fn service(&self) -> Service {
        Service::Payment
    }

    async fn apply_start(&self, id: &TransactionId, payload: &Purchasing) -> StartOutcome {
        let mut account = self.account.write().await;

        match account.charges.get(id) {
            Some(Charge::Applied(_)) => return StartOutcome::Duplicate,
            Some(Charge::Compensated) => return StartOutcome::Compensated,
            None => {}
        }

        if let Err(reason) = self.check_charge(payload.amount) {
            return StartOutcome::Rejected(reason);
        }
        let Some(balance) = account.balance.checked_add(payload.amount) else {
            return StartOutcome::Rejected("balance overflow".to_string());
        };

        account.balance = balance;
        account
            .charges
            .insert(id.clone(), Charge::Applied(payload.amount));
        StartOutcome::Applied
    }

    async fn apply_done(&self, _id: &TransactionId, _payload: &Purchasing) -> ConfirmOutcome {
        // Charges need no confirmation step.
        ConfirmOutcome::Ignored
    }

    async fn apply_rollback(&self, id: &TransactionId, _payload: &Purchasing) -> RollbackOutcome {
        let mut account = self.account.write().await;

        match account.charges.insert(id.clone(), Charge::Compensated) {
            Some(Charge::Applied(amount)) => {
                account.balance = match account.balance.checked_sub(amount) {
                    Some(balance) => balance,
                    None => {
                        tracing::warn!(%id, amount, "balance underflow on rollback, saturating");
                        account.balance.saturating_sub(amount)
                    }
                };
                RollbackOutcome::Reversed
            }
            Some(Charge::Compensated) => RollbackOutcome::AlreadyCompensated,
            None => RollbackOutcome::NothingToUndo,
        }
    }
}
