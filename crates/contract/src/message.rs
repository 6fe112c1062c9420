//! Saga messages, services, actions and topics.

use serde::{Deserialize, Serialize};

use crate::error::{ContractError, Result};
use crate::types::{Purchasing, TransactionId};

/// Command topic of the order participant.
pub const ORDER_CHANNEL: &str = "OrderChannel";

/// Command topic of the payment participant.
pub const PAYMENT_CHANNEL: &str = "PaymentChannel";

/// Shared reply topic consumed by the coordinator.
pub const REPLY_CHANNEL: &str = "ReplyChannel";

/// A saga participant, in step order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Service {
    Order,
    Payment,
}

impl Service {
    /// Every participant, in the fixed step order.
    pub const ALL: [Service; 2] = [Service::Order, Service::Payment];

    /// Returns the command topic this participant consumes.
    pub fn topic(&self) -> &'static str {
        match self {
            Service::Order => ORDER_CHANNEL,
            Service::Payment => PAYMENT_CHANNEL,
        }
    }

    /// Returns the step that follows this one, if any.
    pub fn next(&self) -> Option<Service> {
        match self {
            Service::Order => Some(Service::Payment),
            Service::Payment => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Order => "Order",
            Service::Payment => "Payment",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The command or event carried by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Run the forward action.
    Start,
    /// The forward action completed (reply), or the saga completed (confirmation).
    #[serde(rename = "DoneMsg")]
    Done,
    /// The forward action could not be completed.
    #[serde(rename = "ErrorMsg")]
    Error,
    /// Run the compensating action.
    #[serde(rename = "RollbackMsg")]
    Rollback,
}

impl Action {
    /// Returns the wire spelling of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Start => "Start",
            Action::Done => "DoneMsg",
            Action::Error => "ErrorMsg",
            Action::Rollback => "RollbackMsg",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message exchanged between the coordinator and the participants.
///
/// Messages are the only channel of information between components; every
/// derived message is built by value from the one that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: TransactionId,
    pub service: Service,
    pub action: Action,
    #[serde(rename = "message")]
    pub payload: Purchasing,
}

impl Message {
    pub fn new(id: TransactionId, service: Service, action: Action, payload: Purchasing) -> Self {
        Self {
            id,
            service,
            action,
            payload,
        }
    }

    /// Creates a `Start` command addressed to `service`.
    pub fn start(id: TransactionId, service: Service, payload: Purchasing) -> Self {
        Self::new(id, service, Action::Start, payload)
    }

    /// Builds the reply a participant sends back for this message.
    pub fn reply(&self, action: Action) -> Self {
        Self::new(self.id.clone(), self.service, action, self.payload.clone())
    }

    /// Readdresses this message to another participant with a new action.
    pub fn forward(&self, service: Service, action: Action) -> Self {
        Self::new(self.id.clone(), service, action, self.payload.clone())
    }

    /// Builds the rollback command for `service`, carrying the original payload.
    pub fn rollback_for(&self, service: Service) -> Self {
        self.forward(service, Action::Rollback)
    }

    /// Decodes and validates a message received from the broker.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let message: Message = serde_json::from_slice(bytes)?;
        message.validate()?;
        Ok(message)
    }

    /// Encodes the message for publishing.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Checks the fields that the type system does not.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_blank() {
            return Err(ContractError::InvalidField {
                field: "id",
                reason: "must not be blank".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        Message::start(
            TransactionId::from("tx-1"),
            Service::Order,
            Purchasing::new("alice", 100),
        )
    }

    #[test]
    fn test_wire_shape() {
        let json: serde_json::Value = serde_json::from_slice(&sample().encode().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "tx-1",
                "service": "Order",
                "action": "Start",
                "message": { "name": "alice", "amount": 100 }
            })
        );
    }

    #[test]
    fn test_action_wire_spelling() {
        for (action, wire) in [
            (Action::Start, "\"Start\""),
            (Action::Done, "\"DoneMsg\""),
            (Action::Error, "\"ErrorMsg\""),
            (Action::Rollback, "\"RollbackMsg\""),
        ] {
            assert_eq!(serde_json::to_string(&action).unwrap(), wire);
            assert_eq!(action.as_str(), wire.trim_matches('"'));
        }
    }

    #[test]
    fn test_decode_accepts_wire_message() {
        let bytes = br#"{"id":"7","service":"Payment","action":"ErrorMsg","message":{"name":"bob","amount":5}}"#;
        let message = Message::decode(bytes).unwrap();
        assert_eq!(message.id.as_str(), "7");
        assert_eq!(message.service, Service::Payment);
        assert_eq!(message.action, Action::Error);
        assert_eq!(message.payload, Purchasing::new("bob", 5));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            Message::decode(b"not json"),
            Err(ContractError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_action() {
        let bytes = br#"{"id":"7","service":"Order","action":"Explode","message":{"name":"a","amount":1}}"#;
        assert!(matches!(
            Message::decode(bytes),
            Err(ContractError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_rejects_missing_payload() {
        let bytes = br#"{"id":"7","service":"Order","action":"Start"}"#;
        assert!(Message::decode(bytes).is_err());
    }

    #[test]
    fn test_decode_rejects_blank_id() {
        let bytes = br#"{"id":" ","service":"Order","action":"Start","message":{"name":"a","amount":1}}"#;
        assert!(matches!(
            Message::decode(bytes),
            Err(ContractError::InvalidField { field: "id", .. })
        ));
    }

    #[test]
    fn test_derived_messages_keep_id_and_payload() {
        let start = sample();

        let done = start.reply(Action::Done);
        assert_eq!(done.id, start.id);
        assert_eq!(done.service, Service::Order);
        assert_eq!(done.action, Action::Done);

        let next = done.forward(Service::Payment, Action::Start);
        assert_eq!(next.service, Service::Payment);
        assert_eq!(next.payload, start.payload);

        let rollback = next.rollback_for(Service::Order);
        assert_eq!(rollback.action, Action::Rollback);
        assert_eq!(rollback.service, Service::Order);
        assert_eq!(rollback.payload, start.payload);
    }

    #[test]
    fn test_service_topics_and_order() {
        assert_eq!(Service::Order.topic(), ORDER_CHANNEL);
        assert_eq!(Service::Payment.topic(), PAYMENT_CHANNEL);
        assert_eq!(Service::Order.next(), Some(Service::Payment));
        assert_eq!(Service::Payment.next(), None);
        assert_eq!(Service::ALL, [Service::Order, Service::Payment]);
    }
}
