//! Message handlers and the consumption loop that drives them.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::task::JoinHandle;

use crate::Subscription;

/// A handler invoked for every payload delivered on a subscription.
///
/// Handling is fail-soft: a handler logs whatever went wrong and returns, so a
/// bad message can neither crash the consumer nor block the topic. The same
/// handler may be invoked concurrently for different messages.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]);
}

/// Drives `handler` with every payload from `subscription` until it closes.
///
/// Up to `concurrency` payloads are handled at the same time.
pub async fn consume<H>(subscription: Subscription, handler: Arc<H>, concurrency: usize)
where
    H: MessageHandler + ?Sized,
{
    let topic = subscription.topic().to_string();
    tracing::info!(%topic, concurrency, "consumer started");

    subscription
        .for_each_concurrent(concurrency.max(1), |payload| {
            let handler = Arc::clone(&handler);
            let topic = topic.clone();
            async move {
                handler.handle(&payload).await;
                metrics::counter!("broker_messages_consumed_total", "topic" => topic).increment(1);
            }
        })
        .await;

    tracing::info!(%topic, "subscription closed, consumer stopped");
}

/// Spawns [`consume`] on the tokio runtime.
pub fn spawn_consumer<H>(
    subscription: Subscription,
    handler: Arc<H>,
    concurrency: usize,
) -> JoinHandle<()>
where
    H: MessageHandler + ?Sized + 'static,
{
    tokio::spawn(consume(subscription, handler, concurrency))
}
