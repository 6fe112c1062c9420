//! In-memory transaction log keyed by transaction id.

use std::collections::HashMap;
use std::sync::Arc;

use contract::TransactionId;
use tokio::sync::RwLock;

use crate::events::SagaEvent;
use crate::record::TransactionRecord;

#[derive(Debug, Default)]
struct LogEntry {
    record: TransactionRecord,
    events: Vec<SagaEvent>,
}

impl LogEntry {
    fn append(&mut self, events: Vec<SagaEvent>) {
        for event in events {
            self.record.apply(event.clone());
            self.events.push(event);
        }
    }
}

/// Append-only history of every transaction the coordinator has seen.
///
/// Decisions are taken with [`TransactionLog::decide`], which holds the write
/// lock while the caller inspects the current record and chooses the events
/// to append, so two replies for the same id can never both act on the same
/// state.
#[derive(Debug, Clone, Default)]
pub struct TransactionLog {
    entries: Arc<RwLock<HashMap<TransactionId, LogEntry>>>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `decide` against the current record and appends the events it returns.
    ///
    /// `decide` sees `None` for an unknown id. Returning no events leaves the
    /// log untouched; returning events for an unknown id creates its entry.
    pub async fn decide<T>(
        &self,
        id: &TransactionId,
        decide: impl FnOnce(Option<&TransactionRecord>) -> (Vec<SagaEvent>, T),
    ) -> T {
        let mut entries = self.entries.write().await;
        let (events, output) = decide(entries.get(id).map(|entry| &entry.record));
        if !events.is_empty() {
            entries.entry(id.clone()).or_default().append(events);
        }
        output
    }

    /// Appends events to an existing transaction.
    ///
    /// Returns false, appending nothing, if the id is unknown.
    pub async fn append(&self, id: &TransactionId, events: Vec<SagaEvent>) -> bool {
        match self.entries.write().await.get_mut(id) {
            Some(entry) => {
                entry.append(events);
                true
            }
            None => false,
        }
    }

    /// Returns the current record for a transaction.
    pub async fn get(&self, id: &TransactionId) -> Option<TransactionRecord> {
        self.entries
            .read()
            .await
            .get(id)
            .map(|entry| entry.record.clone())
    }

    /// Returns the full event history of a transaction, oldest first.
    pub async fn events(&self, id: &TransactionId) -> Vec<SagaEvent> {
        self.entries
            .read()
            .await
            .get(id)
            .map(|entry| entry.events.clone())
            .unwrap_or_default()
    }

    /// Returns every record, oldest transaction first.
    pub async fn records(&self) -> Vec<TransactionRecord> {
        let mut records: Vec<TransactionRecord> = self
            .entries
            .read()
            .await
            .values()
            .map(|entry| entry.record.clone())
            .collect();
        records.sort_by_key(TransactionRecord::started_at);
        records
    }

    /// Returns the number of transactions in the log.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
