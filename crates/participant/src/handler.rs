//! Turns ledger outcomes into replies on the shared reply topic.

use async_trait::async_trait;
use broker::{Broker, MessageHandler};
use contract::{Action, Message, REPLY_CHANNEL};

use crate::error::Result;
use crate::ledger::{ConfirmOutcome, Ledger, RollbackOutcome, StartOutcome};

/// Consumes a participant's command topic and applies each command to its ledger.
///
/// | Action     | Ledger call      | Reply                                   |
/// |------------|------------------|-----------------------------------------|
/// | `Start`    | `apply_start`    | `Done`, or `Error` when rejected        |
/// | `Done`     | `apply_done`     | none                                    |
/// | `Rollback` | `apply_rollback` | none                                    |
/// | `Error`    | none             | none                                    |
pub struct ParticipantHandler<L, B> {
    ledger: L,
    publisher: B,
}

impl<L: Ledger, B: Broker> ParticipantHandler<L, B> {
    pub fn new(ledger: L, publisher: B) -> Self {
        Self { ledger, publisher }
    }

    /// Returns the ledger this handler writes to.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Applies one validated message.
    ///
    /// Errors only arise while publishing a reply; the ledger change has
    /// already been made at that point.
    #[tracing::instrument(
        skip(self, message),
        fields(service = %self.ledger.service(), id = %message.id, action = %message.action)
    )]
    pub async fn handle_message(&self, message: Message) -> Result<()> {
        let service = self.ledger.service().as_str();
        metrics::counter!(
            "participant_messages_total",
            "service" => service,
            "action" => message.action.as_str()
        )
        .increment(1);

        match message.action {
            Action::Start => match self.ledger.apply_start(&message.id, &message.payload).await {
                StartOutcome::Applied => {
                    tracing::info!("forward action applied");
                    self.reply(message.reply(Action::Done)).await?;
                }
                StartOutcome::Duplicate => {
                    tracing::info!("duplicate start, repeating done reply");
                    self.reply(message.reply(Action::Done)).await?;
                }
                StartOutcome::Rejected(reason) => {
                    metrics::counter!("participant_rejections_total", "service" => service)
                        .increment(1);
                    tracing::warn!(%reason, "forward action rejected");
                    self.reply(message.reply(Action::Error)).await?;
                }
                StartOutcome::Compensated => {
                    tracing::info!("start after rollback ignored");
                }
            },
            Action::Done => match self.ledger.apply_done(&message.id, &message.payload).await {
                ConfirmOutcome::Confirmed => tracing::info!("entry confirmed"),
                ConfirmOutcome::AlreadyConfirmed => tracing::debug!("entry already confirmed"),
                ConfirmOutcome::Ignored => tracing::debug!("nothing to confirm"),
            },
            Action::Rollback => {
                match self
                    .ledger
                    .apply_rollback(&message.id, &message.payload)
                    .await
                {
                    RollbackOutcome::Reversed => tracing::info!("forward action compensated"),
                    RollbackOutcome::AlreadyCompensated => {
                        tracing::debug!("rollback already applied");
                    }
                    RollbackOutcome::NothingToUndo => {
                        tracing::info!("rollback with nothing to undo");
                    }
                }
            }
            Action::Error => tracing::debug!("no transition for action"),
        }

        Ok(())
    }

    async fn reply(&self, reply: Message) -> Result<()> {
        let payload = reply.encode()?;
        self.publisher.publish(REPLY_CHANNEL, payload).await?;
        tracing::debug!(reply = %reply.action, "reply published");
        Ok(())
    }
}

#[async_trait]
impl<L, B> MessageHandler for ParticipantHandler<L, B>
where
    L: Ledger,
    B: Broker,
{
    async fn handle(&self, payload: &[u8]) {
        let message = match Message::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                metrics::counter!("participant_malformed_messages_total").increment(1);
                tracing::warn!(
                    service = %self.ledger.service(),
                    error = %e,
                    "dropping malformed message"
                );
                return;
            }
        };

        if message.service != self.ledger.service() {
            tracing::warn!(
                service = %self.ledger.service(),
                addressed_to = %message.service,
                id = %message.id,
                "dropping message addressed to another participant"
            );
            return;
        }

        let id = message.id.clone();
        if let Err(e) = self.handle_message(message).await {
            tracing::error!(service = %self.ledger.service(), %id, error = %e, "failed to reply");
        }
    }
}
