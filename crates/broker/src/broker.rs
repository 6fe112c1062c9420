use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_core::Stream;
use tokio::sync::mpsc;

use crate::Result;

/// Core trait for message broker implementations.
///
/// A broker delivers every message published to a topic to every subscription
/// of that topic. Delivery is at-least-once: consumers must tolerate duplicates
/// and must not rely on ordering.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publishes an opaque payload to a topic.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Opens a new subscription that receives every later publish to `topic`.
    async fn subscribe(&self, topic: &str) -> Result<Subscription>;
}

/// A stream of payloads delivered for one topic.
///
/// The stream ends when the broker drops its side of the subscription.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    receiver: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, receiver: mpsc::UnboundedReceiver<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            receiver,
        }
    }

    /// Returns the subscribed topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receives the next payload, or `None` once the subscription is closed.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.receiver.recv().await
    }

    /// Returns the next payload if one is already queued.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Vec<u8>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}
