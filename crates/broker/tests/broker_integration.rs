//! Publishing through a retrying publisher to concurrent consumers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use broker::{
    Broker, BrokerError, CircuitBreakerConfig, InMemoryBroker, MessageHandler, RetryPolicy,
    RetryingPublisher, spawn_consumer,
};
use tokio::sync::Mutex;

#[derive(Default)]
struct Collect {
    seen: Mutex<Vec<Vec<u8>>>,
}

#[async_trait]
impl MessageHandler for Collect {
    async fn handle(&self, payload: &[u8]) {
        self.seen.lock().await.push(payload.to_vec());
    }
}

fn quick_retries() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 4,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
        multiplier: 2.0,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_intermittent_failures_deliver_every_message_once() {
    let broker = InMemoryBroker::with_history();
    let publisher =
        RetryingPublisher::new(broker.clone(), quick_retries(), CircuitBreakerConfig::default());
    let first = Arc::new(Collect::default());
    let second = Arc::new(Collect::default());
    let consumers = [
        spawn_consumer(broker.subscribe("Orders").await.unwrap(), Arc::clone(&first), 4),
        spawn_consumer(broker.subscribe("Orders").await.unwrap(), Arc::clone(&second), 4),
    ];

    for i in 0..30u8 {
        if i % 3 == 0 {
            broker.fail_next_publishes(2).await;
        }
        publisher.publish("Orders", vec![i]).await.unwrap();
    }

    for _ in 0..200 {
        if first.seen.lock().await.len() == 30 && second.seen.lock().await.len() == 30 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    for handler in [&first, &second] {
        let seen = handler.seen.lock().await;
        assert_eq!(seen.len(), 30);
        let distinct: HashSet<&Vec<u8>> = seen.iter().collect();
        assert_eq!(distinct.len(), 30);
    }
    assert_eq!(broker.publish_count().await, 30);

    for consumer in consumers {
        consumer.abort();
    }
}

#[tokio::test]
async fn test_outage_surfaces_as_error_without_panicking() {
    let broker = InMemoryBroker::with_history();
    let publisher = RetryingPublisher::new(
        broker.clone(),
        quick_retries(),
        CircuitBreakerConfig {
            failure_threshold: 2,
            cooldown: Duration::from_secs(60),
        },
    );
    broker.fail_next_publishes(100).await;

    for _ in 0..2 {
        assert!(matches!(
            publisher.publish("Payments", b"x".to_vec()).await,
            Err(BrokerError::RetriesExhausted { attempts: 4, .. })
        ));
    }
    assert!(matches!(
        publisher.publish("Payments", b"x".to_vec()).await,
        Err(BrokerError::CircuitOpen { .. })
    ));
    assert!(broker.published("Payments").await.is_empty());
}
