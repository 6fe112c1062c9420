//! Events recorded in the coordinator's transaction log.

use chrono::{DateTime, Utc};
use contract::{Purchasing, Service, TransactionId};
use serde::{Deserialize, Serialize};

/// Facts the coordinator records about a transaction, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// The transaction was created, or adopted from a reply with an unknown id.
    TransactionStarted(TransactionStartedData),

    /// A participant reported its forward action done.
    StepCompleted(StepData),

    /// A participant reported that its forward action failed.
    StepFailed(StepData),

    /// Rollback was broadcast to every participant.
    CompensationBroadcast(CompensationData),

    /// Every step completed and the confirmation was sent.
    SagaCompleted(SagaCompletedData),

    /// A command for this transaction could not be published.
    PublishFailed(PublishFailedData),

    /// The first command could not be published and the saga was given up.
    ///
    /// Rollback is owed but not sent; it goes out if a participant replies anyway.
    StartAbandoned(StartAbandonedData),

    /// The commands of the last transition were published again after a
    /// repeated reply found them undelivered.
    CommandsResent(CommandsResentData),
}

impl SagaEvent {
    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::TransactionStarted(_) => "TransactionStarted",
            SagaEvent::StepCompleted(_) => "StepCompleted",
            SagaEvent::StepFailed(_) => "StepFailed",
            SagaEvent::CompensationBroadcast(_) => "CompensationBroadcast",
            SagaEvent::SagaCompleted(_) => "SagaCompleted",
            SagaEvent::PublishFailed(_) => "PublishFailed",
            SagaEvent::StartAbandoned(_) => "StartAbandoned",
            SagaEvent::CommandsResent(_) => "CommandsResent",
        }
    }
}

/// Data for TransactionStarted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionStartedData {
    pub id: TransactionId,
    pub payload: Purchasing,
    pub started_at: DateTime<Utc>,
    /// When the saga is compensated if still in flight, if a timeout is configured.
    pub deadline: Option<DateTime<Utc>>,
    /// True when the record was created from a reply rather than by this coordinator.
    pub adopted: bool,
}

/// Data for step events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepData {
    pub service: Service,
}

/// Why compensation was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompensationReason {
    /// A participant replied with an error.
    StepFailed,
    /// The saga was still in flight at its deadline.
    TimedOut,
    /// The first command could not be published, so the saga never started.
    StartFailed,
}

impl std::fmt::Display for CompensationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompensationReason::StepFailed => write!(f, "step failed"),
            CompensationReason::TimedOut => write!(f, "timed out"),
            CompensationReason::StartFailed => write!(f, "start not published"),
        }
    }
}

/// Data for CompensationBroadcast event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationData {
    pub reason: CompensationReason,
    pub at: DateTime<Utc>,
}

/// Data for SagaCompleted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaCompletedData {
    pub completed_at: DateTime<Utc>,
}

/// Data for PublishFailed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishFailedData {
    pub topic: String,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Data for StartAbandoned event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartAbandonedData {
    pub at: DateTime<Utc>,
}

/// Data for CommandsResent event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandsResentData {
    pub commands: usize,
    pub at: DateTime<Utc>,
}

// Convenience constructors
impl SagaEvent {
    /// Creates a TransactionStarted event.
    pub fn transaction_started(
        id: TransactionId,
        payload: Purchasing,
        started_at: DateTime<Utc>,
        deadline: Option<DateTime<Utc>>,
    ) -> Self {
        SagaEvent::TransactionStarted(TransactionStartedData {
            id,
            payload,
            started_at,
            deadline,
            adopted: false,
        })
    }

    /// Creates a TransactionStarted event for a transaction first seen in a reply.
    pub fn transaction_adopted(
        id: TransactionId,
        payload: Purchasing,
        started_at: DateTime<Utc>,
        deadline: Option<DateTime<Utc>>,
    ) -> Self {
        SagaEvent::TransactionStarted(TransactionStartedData {
            id,
            payload,
            started_at,
            deadline,
            adopted: true,
        })
    }

    /// Creates a StepCompleted event.
    pub fn step_completed(service: Service) -> Self {
        SagaEvent::StepCompleted(StepData { service })
    }

    /// Creates a StepFailed event.
    pub fn step_failed(service: Service) -> Self {
        SagaEvent::StepFailed(StepData { service })
    }

    /// Creates a CompensationBroadcast event.
    pub fn compensation_broadcast(reason: CompensationReason, at: DateTime<Utc>) -> Self {
        SagaEvent::CompensationBroadcast(CompensationData { reason, at })
    }

    /// Creates a SagaCompleted event.
    pub fn saga_completed(completed_at: DateTime<Utc>) -> Self {
        SagaEvent::SagaCompleted(SagaCompletedData { completed_at })
    }

    /// Creates a PublishFailed event.
    pub fn publish_failed(topic: impl Into<String>, error: impl Into<String>) -> Self {
        SagaEvent::PublishFailed(PublishFailedData {
            topic: topic.into(),
            error: error.into(),
            at: Utc::now(),
        })
    }

    /// Creates a StartAbandoned event.
    pub fn start_abandoned(at: DateTime<Utc>) -> Self {
        SagaEvent::StartAbandoned(StartAbandonedData { at })
    }

    /// Creates a CommandsResent event.
    pub fn commands_resent(commands: usize, at: DateTime<Utc>) -> Self {
        SagaEvent::CommandsResent(CommandsResentData { commands, at })
    }
}
