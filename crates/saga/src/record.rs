//! Transaction record folded from saga events.

use chrono::{DateTime, Utc};
use contract::{Purchasing, Service, TransactionId};
use serde::{Deserialize, Serialize};

use crate::events::{CompensationReason, SagaEvent};
use crate::state::SagaState;

/// The coordinator's view of one transaction.
///
/// Rebuilt by replaying its events; `apply` is pure and never fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    id: Option<TransactionId>,
    version: u64,
    payload: Option<Purchasing>,
    state: SagaState,
    completed_steps: Vec<Service>,
    failed_step: Option<Service>,
    compensation_reason: Option<CompensationReason>,
    started_at: Option<DateTime<Utc>>,
    deadline: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    adopted: bool,
    publish_failures: u32,
    /// A command of the latest transition failed to publish and has not been resent.
    undelivered: bool,
}

impl TransactionRecord {
    /// Rebuilds a record from its full event history.
    pub fn replay(events: impl IntoIterator<Item = SagaEvent>) -> Self {
        let mut record = Self::default();
        for event in events {
            record.apply(event);
        }
        record
    }

    /// Applies an event to the record.
    pub fn apply(&mut self, event: SagaEvent) {
        self.version += 1;
        self.undelivered = matches!(
            event,
            SagaEvent::PublishFailed(_) | SagaEvent::StartAbandoned(_)
        );
        match event {
            SagaEvent::TransactionStarted(data) => {
                self.id = Some(data.id);
                self.payload = Some(data.payload);
                self.started_at = Some(data.started_at);
                self.deadline = data.deadline;
                self.adopted = data.adopted;
                self.state = SagaState::AwaitingOrder;
            }
            SagaEvent::StepCompleted(data) => {
                if !self.completed_steps.contains(&data.service) {
                    self.completed_steps.push(data.service);
                }
                if let Some(next) = data.service.next() {
                    self.state = SagaState::awaiting_step(next);
                }
            }
            SagaEvent::StepFailed(data) => {
                self.failed_step = Some(data.service);
            }
            SagaEvent::CompensationBroadcast(data) => {
                self.state = SagaState::RolledBack;
                self.compensation_reason = Some(data.reason);
                self.finished_at = Some(data.at);
            }
            SagaEvent::SagaCompleted(data) => {
                self.state = SagaState::Completed;
                self.finished_at = Some(data.completed_at);
            }
            SagaEvent::PublishFailed(_) => {
                // The saga stays where it was.
                self.publish_failures += 1;
            }
            SagaEvent::StartAbandoned(data) => {
                self.state = SagaState::RolledBack;
                self.compensation_reason = Some(CompensationReason::StartFailed);
                self.finished_at = Some(data.at);
            }
            SagaEvent::CommandsResent(_) => {}
        }
    }
}

// Query methods
impl TransactionRecord {
    pub fn id(&self) -> Option<&TransactionId> {
        self.id.as_ref()
    }

    /// Number of events applied.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn payload(&self) -> Option<&Purchasing> {
        self.payload.as_ref()
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Steps whose forward action was reported done, in order.
    pub fn completed_steps(&self) -> &[Service] {
        &self.completed_steps
    }

    /// The participant that reported an error, if any.
    pub fn failed_step(&self) -> Option<Service> {
        self.failed_step
    }

    pub fn compensation_reason(&self) -> Option<CompensationReason> {
        self.compensation_reason
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// True if the record was created from a reply with a previously unknown id.
    pub fn is_adopted(&self) -> bool {
        self.adopted
    }

    pub fn publish_failures(&self) -> u32 {
        self.publish_failures
    }

    /// Returns true if a command of the latest transition was never delivered.
    pub fn has_undelivered_commands(&self) -> bool {
        self.undelivered
    }

    /// Returns true if the saga is still in flight past its deadline.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.state.is_terminal() && self.deadline.is_some_and(|deadline| deadline <= now)
    }
}
