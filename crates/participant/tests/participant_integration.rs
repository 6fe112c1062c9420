//! Participants consuming their command topics through a broker.

use std::sync::Arc;
use std::time::Duration;

use broker::{Broker, InMemoryBroker, Subscription, spawn_consumer};
use contract::{
    Action, Message, ORDER_CHANNEL, PAYMENT_CHANNEL, Purchasing, REPLY_CHANNEL, Service,
    TransactionId,
};
use participant::{OrderLedger, OrderStatus, ParticipantHandler, PaymentLedger};

async fn collect_replies(replies: &mut Subscription, count: usize) -> Vec<Message> {
    let mut received = Vec::new();
    while received.len() < count {
        let bytes = tokio::time::timeout(Duration::from_secs(2), replies.recv())
            .await
            .expect("reply within two seconds")
            .expect("reply subscription open");
        received.push(Message::decode(&bytes).unwrap());
    }
    received
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_payment_participant_absorbs_duplicate_delivery() {
    let broker = InMemoryBroker::with_history();
    broker.set_duplicate_delivery(true).await;
    let ledger = PaymentLedger::new();
    let handler = Arc::new(ParticipantHandler::new(ledger.clone(), broker.clone()));
    let mut replies = broker.subscribe(REPLY_CHANNEL).await.unwrap();
    let consumer = spawn_consumer(broker.subscribe(PAYMENT_CHANNEL).await.unwrap(), handler, 4);

    let ids: Vec<TransactionId> = (0..10).map(|_| TransactionId::new()).collect();
    for id in &ids {
        let start = Message::start(id.clone(), Service::Payment, Purchasing::new("x", 10));
        broker
            .publish(PAYMENT_CHANNEL, start.encode().unwrap())
            .await
            .unwrap();
    }

    // Every start is delivered twice and each delivery is answered.
    let received = collect_replies(&mut replies, 40).await;
    assert!(received.iter().all(|reply| reply.action == Action::Done));
    assert_eq!(ledger.balance().await, 100);

    for id in &ids {
        let rollback = Message::new(id.clone(), Service::Payment, Action::Rollback, Purchasing::new("x", 10));
        broker
            .publish(PAYMENT_CHANNEL, rollback.encode().unwrap())
            .await
            .unwrap();
    }
    for _ in 0..200 {
        if ledger.balance().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(ledger.balance().await, 0);

    consumer.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_manual_writes_race_with_saga_commands() {
    let broker = InMemoryBroker::with_history();
    let ledger = OrderLedger::new();
    let handler = Arc::new(ParticipantHandler::new(ledger.clone(), broker.clone()));
    let mut replies = broker.subscribe(REPLY_CHANNEL).await.unwrap();
    let consumer = spawn_consumer(broker.subscribe(ORDER_CHANNEL).await.unwrap(), handler, 8);

    // The same names are claimed by sagas and by direct writes at once.
    let names: Vec<String> = (0..20).map(|i| format!("order-{i}")).collect();
    let writer = {
        let ledger = ledger.clone();
        let names = names.clone();
        tokio::spawn(async move {
            let mut created = 0;
            for name in &names {
                if ledger.create_manual(name).await.is_ok() {
                    created += 1;
                }
            }
            created
        })
    };
    for name in &names {
        let start = Message::start(TransactionId::new(), Service::Order, Purchasing::new(name.as_str(), 1));
        broker
            .publish(ORDER_CHANNEL, start.encode().unwrap())
            .await
            .unwrap();
    }

    let manual = writer.await.unwrap();
    let received = collect_replies(&mut replies, names.len()).await;
    let done = received
        .iter()
        .filter(|reply| reply.action == Action::Done)
        .count();

    // Each name has exactly one owner: either the direct write or a saga.
    assert_eq!(manual + done, names.len());
    assert_eq!(ledger.len().await, names.len());
    let snapshot = ledger.snapshot().await;
    assert!(snapshot.values().all(|entry| entry.status == OrderStatus::Pending));
    assert_eq!(
        snapshot
            .values()
            .filter(|entry| entry.transaction_id.is_some())
            .count(),
        done
    );

    consumer.abort();
}
