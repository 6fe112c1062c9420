use broker::{InMemoryBroker, MessageHandler};
use contract::{Message, Purchasing, Service, TransactionId};
use criterion::{Criterion, criterion_group, criterion_main};
use participant::{Ledger, OrderLedger, PaymentLedger, PaymentParticipant};

fn bench_decode(c: &mut Criterion) {
    let bytes = Message::start(
        TransactionId::new(),
        Service::Payment,
        Purchasing::new("alice", 100),
    )
    .encode()
    .unwrap();

    c.bench_function("participant/decode_message", |b| {
        b.iter(|| Message::decode(&bytes).unwrap());
    });
}

fn bench_payment_start(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = PaymentLedger::new();

    c.bench_function("participant/payment_apply_start", |b| {
        b.iter(|| {
            rt.block_on(async {
                ledger
                    .apply_start(&TransactionId::new(), &Purchasing::new("alice", 1))
                    .await
            })
        });
    });
}

fn bench_order_start_and_rollback(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = OrderLedger::new();
    let payload = Purchasing::new("alice", 1);

    c.bench_function("participant/order_start_rollback", |b| {
        b.iter(|| {
            rt.block_on(async {
                let id = TransactionId::new();
                ledger.apply_start(&id, &payload).await;
                ledger.apply_rollback(&id, &payload).await;
            })
        });
    });
}

fn bench_handle_with_reply(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let handler = PaymentParticipant::new(PaymentLedger::new(), InMemoryBroker::new());

    c.bench_function("participant/handle_start_with_reply", |b| {
        b.iter(|| {
            rt.block_on(async {
                let bytes = Message::start(
                    TransactionId::new(),
                    Service::Payment,
                    Purchasing::new("alice", 1),
                )
                .encode()
                .unwrap();
                handler.handle(&bytes).await;
            })
        });
    });
}

criterion_group!(
    benches,
    bench_decode,
    bench_payment_start,
    bench_order_start_and_rollback,
    bench_handle_with_reply
);
criterion_main!(benches);
