//! Saga coordinator for sequencing the order and payment steps.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use broker::{Broker, MessageHandler};
use chrono::{DateTime, Utc};
use contract::{Action, Message, Purchasing, Service, TransactionId};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{Result, SagaError};
use crate::events::{CompensationReason, SagaEvent};
use crate::log::TransactionLog;
use crate::record::TransactionRecord;
use crate::state::SagaState;

/// Coordinator settings.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    /// How long a saga may stay in flight before it is compensated.
    ///
    /// `None` disables expiry.
    pub saga_timeout: Option<Duration>,
}

impl CoordinatorConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            saga_timeout: Some(timeout),
        }
    }
}

/// What the coordinator did with a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// A step completed and `next` was started.
    Advanced { next: Service },
    /// The last step completed and the confirmation was sent.
    Completed,
    /// A step failed and rollback was broadcast to every participant.
    Compensated,
    /// The reply repeated the last transition, whose commands had failed to
    /// publish, so they were published again.
    Resent,
    /// No transition applies; nothing was recorded or published.
    Ignored { reason: &'static str },
}

struct Decision {
    events: Vec<SagaEvent>,
    commands: Vec<Message>,
    outcome: ReplyOutcome,
    started_at: Option<DateTime<Utc>>,
}

impl Decision {
    fn ignored(reason: &'static str) -> Self {
        Self {
            events: Vec::new(),
            commands: Vec::new(),
            outcome: ReplyOutcome::Ignored { reason },
            started_at: None,
        }
    }
}

/// Chooses the transition for a reply given the transaction's current record.
///
/// | Reply                   | State               | Result                             |
/// |-------------------------|---------------------|------------------------------------|
/// | `ErrorMsg` from any     | `Awaiting*`         | rollback to every participant      |
/// | `DoneMsg` from Order    | `AwaitingOrder`     | `Start` to Payment                 |
/// | `DoneMsg` from Payment  | `AwaitingPayment`   | `DoneMsg` to Order                 |
/// | anything else           | any                 | ignored                            |
///
/// A `DoneMsg` or `ErrorMsg` for an unknown id adopts the transaction as if it
/// were awaiting the replying step, so a restarted coordinator keeps sagas moving.
/// A reply that repeats the last transition republishes its commands when any
/// of them failed to publish; see [`undelivered_commands`].
fn decide_reply(
    record: Option<&TransactionRecord>,
    message: &Message,
    now: DateTime<Utc>,
    deadline: Option<DateTime<Utc>>,
) -> Decision {
    let mut events = Vec::new();
    let (state, started_at) = match record {
        Some(record) => (record.state(), record.started_at()),
        None => match message.action {
            Action::Done | Action::Error => {
                events.push(SagaEvent::transaction_adopted(
                    message.id.clone(),
                    message.payload.clone(),
                    now,
                    deadline,
                ));
                (SagaState::awaiting_step(message.service), Some(now))
            }
            Action::Start | Action::Rollback => return Decision::ignored("unknown transaction"),
        },
    };

    if let Some(commands) = record.and_then(|record| undelivered_commands(record, message)) {
        events.push(SagaEvent::commands_resent(commands.len(), now));
        return Decision {
            events,
            commands,
            outcome: ReplyOutcome::Resent,
            started_at,
        };
    }

    let Some(awaiting) = state.awaiting() else {
        return Decision::ignored("transaction already finished");
    };

    let (commands, outcome) = match message.action {
        Action::Error => {
            events.push(SagaEvent::step_failed(message.service));
            events.push(SagaEvent::compensation_broadcast(
                CompensationReason::StepFailed,
                now,
            ));
            let rollbacks = Service::ALL
                .iter()
                .map(|service| message.rollback_for(*service))
                .collect();
            (rollbacks, ReplyOutcome::Compensated)
        }
        Action::Done if message.service == awaiting => {
            events.push(SagaEvent::step_completed(message.service));
            match message.service.next() {
                Some(next) => (
                    vec![message.forward(next, Action::Start)],
                    ReplyOutcome::Advanced { next },
                ),
                None => {
                    events.push(SagaEvent::saga_completed(now));
                    (
                        vec![message.forward(Service::Order, Action::Done)],
                        ReplyOutcome::Completed,
                    )
                }
            }
        }
        Action::Done => return Decision::ignored("reply for a step not awaited"),
        Action::Start | Action::Rollback => return Decision::ignored("no transition for action"),
    };

    Decision {
        events,
        commands,
        outcome,
        started_at,
    }
}

/// Commands owed by the transition that `message` repeats, if they were not delivered.
///
/// | Reply                   | State               | Commands again                     |
/// |-------------------------|---------------------|------------------------------------|
/// | `DoneMsg` from Order    | `AwaitingPayment`   | `Start` to Payment                 |
/// | `DoneMsg` from Payment  | `Completed`         | `DoneMsg` to Order                 |
/// | `DoneMsg` or `ErrorMsg` | `RolledBack`        | rollback to every participant      |
///
/// Participants apply each command at most once, so a resend is always safe.
fn undelivered_commands(record: &TransactionRecord, message: &Message) -> Option<Vec<Message>> {
    if !record.has_undelivered_commands() {
        return None;
    }
    let payload = record.payload()?;
    let command =
        |service, action| Message::new(message.id.clone(), service, action, payload.clone());

    match (record.state(), message.service, message.action) {
        (SagaState::AwaitingPayment, Service::Order, Action::Done) => {
            Some(vec![command(Service::Payment, Action::Start)])
        }
        (SagaState::Completed, Service::Payment, Action::Done) => {
            Some(vec![command(Service::Order, Action::Done)])
        }
        (SagaState::RolledBack, _, Action::Done | Action::Error) => Some(
            Service::ALL
                .iter()
                .map(|service| command(*service, Action::Rollback))
                .collect(),
        ),
        _ => None,
    }
}

/// Orchestrates sagas over a broker.
///
/// The coordinator owns the sequencing decision and a log of every
/// transaction it has seen. Participants are reached only through messages:
/// commands go to each participant's topic and replies arrive on the shared
/// reply topic, which the coordinator consumes as a [`MessageHandler`].
pub struct SagaCoordinator<B> {
    publisher: B,
    log: TransactionLog,
    config: CoordinatorConfig,
}

impl<B: Broker> SagaCoordinator<B> {
    pub fn new(publisher: B, config: CoordinatorConfig) -> Self {
        Self {
            publisher,
            log: TransactionLog::new(),
            config,
        }
    }

    /// Creates a transaction with a fresh id and starts its first step.
    ///
    /// Returns as soon as the `Start` command is published; the saga then
    /// progresses through replies.
    pub async fn create_transaction(&self, payload: Purchasing) -> Result<TransactionId> {
        let id = TransactionId::new();
        self.start_transaction(id.clone(), payload).await?;
        Ok(id)
    }

    /// Starts a transaction under a caller-chosen id.
    ///
    /// Ids are never reused: an id already in the log is rejected. If the
    /// `Start` command cannot be published the transaction is abandoned as
    /// rolled back and the publish error is returned; should the order step
    /// reply anyway, its reply triggers the owed rollback.
    #[tracing::instrument(skip(self, payload), fields(name = %payload.name, amount = payload.amount))]
    pub async fn start_transaction(&self, id: TransactionId, payload: Purchasing) -> Result<()> {
        let now = Utc::now();
        let deadline = self.deadline_from(now);
        let created = self
            .log
            .decide(&id, |record| match record {
                Some(_) => (Vec::new(), false),
                None => (
                    vec![SagaEvent::transaction_started(
                        id.clone(),
                        payload.clone(),
                        now,
                        deadline,
                    )],
                    true,
                ),
            })
            .await;
        if !created {
            return Err(SagaError::DuplicateTransaction(id));
        }

        metrics::counter!("saga_created_total").increment(1);
        tracing::info!(%id, "transaction created");

        let first = Service::ALL[0];
        let Err(e) = self.publish(&Message::start(id.clone(), first, payload)).await else {
            return Ok(());
        };

        let abandoned = self
            .log
            .decide(&id, |record| match record {
                Some(record) if record.state() == SagaState::AwaitingOrder => {
                    (vec![SagaEvent::start_abandoned(Utc::now())], true)
                }
                _ => (Vec::new(), false),
            })
            .await;
        if abandoned {
            metrics::counter!("saga_rolled_back_total", "reason" => "start_failed").increment(1);
            tracing::warn!(%id, "first step not published, saga abandoned");
        }
        Err(e)
    }

    /// Applies one reply from a participant.
    ///
    /// The transition is chosen and recorded atomically; commands are
    /// published afterwards. Duplicate and reordered replies are ignored
    /// without touching any transaction, unless they repeat a transition
    /// whose commands failed to publish, in which case those are sent again.
    #[tracing::instrument(
        skip(self, message),
        fields(id = %message.id, service = %message.service, action = %message.action)
    )]
    pub async fn on_reply(&self, message: Message) -> Result<ReplyOutcome> {
        let now = Utc::now();
        let deadline = self.deadline_from(now);
        let decision = self
            .log
            .decide(&message.id, |record| {
                let decision = decide_reply(record, &message, now, deadline);
                (decision.events.clone(), decision)
            })
            .await;

        match &decision.outcome {
            ReplyOutcome::Advanced { next } => {
                tracing::info!(%next, "step completed, starting next step");
            }
            ReplyOutcome::Completed => {
                metrics::counter!("saga_completed_total").increment(1);
                if let Some(elapsed) = decision
                    .started_at
                    .and_then(|started_at| (now - started_at).to_std().ok())
                {
                    metrics::histogram!("saga_duration_seconds").record(elapsed.as_secs_f64());
                }
                tracing::info!("saga completed");
            }
            ReplyOutcome::Compensated => {
                metrics::counter!("saga_rolled_back_total", "reason" => "step_failed")
                    .increment(1);
                tracing::warn!("step failed, broadcasting rollback");
            }
            ReplyOutcome::Resent => {
                metrics::counter!("saga_commands_resent_total").increment(1);
                tracing::info!(
                    commands = decision.commands.len(),
                    "repeated reply, republishing undelivered commands"
                );
            }
            ReplyOutcome::Ignored { reason } => {
                metrics::counter!("saga_replies_ignored_total").increment(1);
                tracing::debug!(%reason, "reply ignored");
            }
        }

        self.publish_all(decision.commands).await?;
        Ok(decision.outcome)
    }

    /// Compensates every in-flight transaction whose deadline is at or before `now`.
    ///
    /// Returns the ids that were compensated. Publish failures are recorded on
    /// the transaction and do not stop the sweep.
    #[tracing::instrument(skip(self))]
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Vec<TransactionId> {
        let mut expired = Vec::new();
        for record in self.log.records().await {
            if !record.is_expired(now) {
                continue;
            }
            let (Some(id), Some(payload)) = (record.id().cloned(), record.payload().cloned())
            else {
                continue;
            };

            let compensate = self
                .log
                .decide(&id, |current| match current {
                    Some(current) if current.is_expired(now) => (
                        vec![SagaEvent::compensation_broadcast(
                            CompensationReason::TimedOut,
                            now,
                        )],
                        true,
                    ),
                    _ => (Vec::new(), false),
                })
                .await;
            if !compensate {
                continue;
            }

            metrics::counter!("saga_rolled_back_total", "reason" => "timed_out").increment(1);
            tracing::warn!(%id, state = %record.state(), "saga timed out, broadcasting rollback");

            let trigger = Message::new(id.clone(), Service::Order, Action::Rollback, payload);
            let rollbacks = Service::ALL
                .iter()
                .map(|service| trigger.rollback_for(*service))
                .collect();
            // Failures are already logged and recorded.
            let _ = self.publish_all(rollbacks).await;
            expired.push(id);
        }
        expired
    }

    /// Runs [`Self::expire_stale`] every `every` until the task is aborted.
    pub fn spawn_timeout_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()>
    where
        B: 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let expired = self.expire_stale(Utc::now()).await;
                if !expired.is_empty() {
                    tracing::info!(count = expired.len(), "expired stale sagas");
                }
            }
        })
    }

    /// Returns the record of a transaction.
    pub async fn get_transaction(&self, id: &TransactionId) -> Option<TransactionRecord> {
        self.log.get(id).await
    }

    /// Returns every known transaction, oldest first.
    pub async fn transactions(&self) -> Vec<TransactionRecord> {
        self.log.records().await
    }

    /// Returns the recorded history of a transaction.
    pub async fn events(&self, id: &TransactionId) -> Vec<SagaEvent> {
        self.log.events(id).await
    }

    fn deadline_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let timeout = chrono::Duration::from_std(self.config.saga_timeout?).ok()?;
        now.checked_add_signed(timeout)
    }

    /// Publishes every command, returning the first failure after trying them all.
    async fn publish_all(&self, commands: Vec<Message>) -> Result<()> {
        let mut first_error = None;
        for command in &commands {
            if let Err(e) = self.publish(command).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn publish(&self, command: &Message) -> Result<()> {
        let topic = command.service.topic();
        let payload = command.encode()?;
        if let Err(e) = self.publisher.publish(topic, payload).await {
            metrics::counter!("saga_publish_failures_total", "topic" => topic).increment(1);
            tracing::error!(
                id = %command.id,
                %topic,
                action = %command.action,
                error = %e,
                "failed to publish command"
            );
            self.log
                .append(
                    &command.id,
                    vec![SagaEvent::publish_failed(topic, e.to_string())],
                )
                .await;
            return Err(e.into());
        }
        tracing::debug!(id = %command.id, %topic, action = %command.action, "command published");
        Ok(())
    }
}

#[async_trait]
impl<B: Broker> MessageHandler for SagaCoordinator<B> {
    async fn handle(&self, payload: &[u8]) {
        let message = match Message::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                metrics::counter!("saga_malformed_replies_total").increment(1);
                tracing::warn!(error = %e, "dropping malformed reply");
                return;
            }
        };

        let id = message.id.clone();
        if let Err(e) = self.on_reply(message).await {
            tracing::error!(%id, error = %e, "failed to process reply");
        }
    }
}
