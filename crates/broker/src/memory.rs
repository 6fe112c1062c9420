use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};

use crate::{Broker, BrokerError, Result, Subscription};

#[derive(Debug, Default)]
struct InMemoryBrokerState {
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>,
    /// Only kept when the broker was built with [`InMemoryBroker::with_history`].
    history: Option<Vec<(String, Vec<u8>)>>,
    delivered: usize,
    duplicate_delivery: bool,
    failing_publishes: u32,
    closed: bool,
}

/// In-memory broker for tests and single-process deployments.
///
/// Each subscription gets its own unbounded queue. Publishing to a topic with
/// no subscribers delivers the message nowhere. Published payloads are
/// retained only when history is enabled, so a long-running process does not
/// accumulate them. Faults can be injected to exercise at-least-once handling: duplicate
/// delivery and transient publish failures.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<RwLock<InMemoryBrokerState>>,
}

impl InMemoryBroker {
    /// Creates a new broker with no topics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a broker that keeps every published payload for inspection.
    pub fn with_history() -> Self {
        let state = InMemoryBrokerState {
            history: Some(Vec::new()),
            ..Default::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Delivers every subsequent message twice to each subscription.
    pub async fn set_duplicate_delivery(&self, duplicate: bool) {
        self.state.write().await.duplicate_delivery = duplicate;
    }

    /// Makes the next `count` publishes fail with `BrokerError::Unavailable`.
    pub async fn fail_next_publishes(&self, count: u32) {
        self.state.write().await.failing_publishes = count;
    }

    /// Closes the broker: open subscriptions end and every later call fails.
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        state.closed = true;
        state.subscribers.clear();
    }

    /// Returns the payloads successfully published to `topic`, oldest first.
    ///
    /// Always empty unless the broker was built with [`Self::with_history`].
    pub async fn published(&self, topic: &str) -> Vec<Vec<u8>> {
        self.state
            .read()
            .await
            .history
            .iter()
            .flatten()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Returns the total number of successful publishes across all topics.
    pub async fn publish_count(&self) -> usize {
        self.state.read().await.delivered
    }

    /// Returns the number of open subscriptions for `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.state
            .read()
            .await
            .subscribers
            .get(topic)
            .map_or(0, |subs| subs.iter().filter(|tx| !tx.is_closed()).count())
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let mut state = self.state.write().await;

        if state.closed {
            return Err(BrokerError::Closed);
        }

        if state.failing_publishes > 0 {
            state.failing_publishes -= 1;
            return Err(BrokerError::Unavailable(format!(
                "injected failure publishing to {topic}"
            )));
        }

        let copies = if state.duplicate_delivery { 2 } else { 1 };
        if let Some(senders) = state.subscribers.get_mut(topic) {
            // Drop subscriptions whose receiver has gone away.
            senders.retain(|tx| (0..copies).all(|_| tx.send(payload.clone()).is_ok()));
        }

        state.delivered += 1;
        if let Some(history) = state.history.as_mut() {
            history.push((topic.to_string(), payload));
        }
        tracing::trace!(topic, "message published");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let mut state = self.state.write().await;

        if state.closed {
            return Err(BrokerError::Closed);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push(tx);

        tracing::debug!(topic, "subscription opened");
        Ok(Subscription::new(topic, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_every_subscription() {
        let broker = InMemoryBroker::with_history();
        let mut first = broker.subscribe("Orders").await.unwrap();
        let mut second = broker.subscribe("Orders").await.unwrap();

        broker.publish("Orders", b"hello".to_vec()).await.unwrap();

        assert_eq!(first.recv().await.unwrap(), b"hello");
        assert_eq!(second.recv().await.unwrap(), b"hello");
        assert_eq!(broker.subscriber_count("Orders").await, 2);
    }

    #[tokio::test]
    async fn test_default_broker_keeps_no_history() {
        let broker = InMemoryBroker::new();
        let mut orders = broker.subscribe("Orders").await.unwrap();

        for i in 0..100u8 {
            broker.publish("Orders", vec![i]).await.unwrap();
        }

        assert_eq!(orders.recv().await.unwrap(), vec![0]);
        assert_eq!(broker.publish_count().await, 100);
        assert!(broker.published("Orders").await.is_empty());
        assert!(broker.state.read().await.history.is_none());
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let broker = InMemoryBroker::with_history();
        let mut orders = broker.subscribe("Orders").await.unwrap();

        broker.publish("Payments", b"pay".to_vec()).await.unwrap();

        assert!(orders.try_recv().is_none());
        assert_eq!(broker.published("Payments").await, vec![b"pay".to_vec()]);
        assert!(broker.published("Orders").await.is_empty());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_recorded() {
        let broker = InMemoryBroker::with_history();
        broker.publish("Nobody", b"x".to_vec()).await.unwrap();
        assert_eq!(broker.publish_count().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_delivery() {
        let broker = InMemoryBroker::with_history();
        let mut sub = broker.subscribe("Orders").await.unwrap();
        broker.set_duplicate_delivery(true).await;

        broker.publish("Orders", b"once".to_vec()).await.unwrap();

        assert_eq!(sub.try_recv().unwrap(), b"once");
        assert_eq!(sub.try_recv().unwrap(), b"once");
        assert!(sub.try_recv().is_none());
        // History records the publish, not the deliveries.
        assert_eq!(broker.publish_count().await, 1);
    }

    #[tokio::test]
    async fn test_injected_failures_are_transient() {
        let broker = InMemoryBroker::with_history();
        broker.fail_next_publishes(2).await;

        assert!(matches!(
            broker.publish("Orders", b"1".to_vec()).await,
            Err(BrokerError::Unavailable(_))
        ));
        assert!(broker.publish("Orders", b"2".to_vec()).await.is_err());
        assert!(broker.publish("Orders", b"3".to_vec()).await.is_ok());
        assert_eq!(broker.published("Orders").await, vec![b"3".to_vec()]);
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions() {
        let broker = InMemoryBroker::with_history();
        let mut sub = broker.subscribe("Orders").await.unwrap();

        broker.close().await;

        assert!(sub.recv().await.is_none());
        assert!(matches!(
            broker.publish("Orders", b"x".to_vec()).await,
            Err(BrokerError::Closed)
        ));
        assert!(matches!(
            broker.subscribe("Orders").await,
            Err(BrokerError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let broker = InMemoryBroker::with_history();
        let sub = broker.subscribe("Orders").await.unwrap();
        drop(sub);

        broker.publish("Orders", b"x".to_vec()).await.unwrap();
        assert_eq!(broker.subscriber_count("Orders").await, 0);
    }
}
