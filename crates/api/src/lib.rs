//! HTTP trigger interface and in-process wiring for the saga system.
//!
//! The coordinator and both participants run in one process over a shared
//! in-memory broker, each consuming its own topic. HTTP routes start sagas and
//! read the participants' ledgers, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use broker::{Broker, InMemoryBroker, RetryingPublisher, spawn_consumer};
use contract::{ORDER_CHANNEL, PAYMENT_CHANNEL, REPLY_CHANNEL};
use metrics_exporter_prometheus::PrometheusHandle;
use participant::{OrderLedger, ParticipantHandler, PaymentLedger};
use saga::SagaCoordinator;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::AppState;
use routes::metrics::MetricsState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(MetricsState {
            handle: metrics_handle,
            app: Arc::clone(&state),
        });

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/create/{name}/{amount}", post(routes::transactions::create))
        .route("/create/{name}", post(routes::orders::create))
        .route("/get-order", get(routes::orders::snapshot))
        .route("/payment/{order_id}/{amount}", post(routes::payment::deposit))
        .route("/get-balance", get(routes::payment::balance))
        .route("/transactions", get(routes::transactions::list))
        .route("/transactions/{id}", get(routes::transactions::get))
        .route("/transactions/{id}/events", get(routes::transactions::events))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// The running saga components and the tasks that feed them.
pub struct Services {
    pub state: Arc<AppState>,
    pub broker: InMemoryBroker,
    workers: Vec<JoinHandle<()>>,
}

impl Services {
    /// Stops every consumer and the timeout sweeper.
    pub fn shutdown(&self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

/// Wires the coordinator and both participants to a fresh in-memory broker.
///
/// Subscriptions are opened before this returns, so a saga created right
/// afterwards cannot lose its first message.
pub async fn create_default_state(config: &Config) -> broker::Result<Services> {
    let broker = InMemoryBroker::new();
    let publisher =
        RetryingPublisher::new(broker.clone(), config.retry_policy(), config.circuit_breaker());

    let orders = OrderLedger::new();
    let payments = match config.payment_max_amount {
        Some(limit) => PaymentLedger::new().with_limit(limit),
        None => PaymentLedger::new(),
    };

    let coordinator = Arc::new(SagaCoordinator::new(
        publisher.clone(),
        config.coordinator(),
    ));
    let order_participant = Arc::new(ParticipantHandler::new(orders.clone(), publisher.clone()));
    let payment_participant =
        Arc::new(ParticipantHandler::new(payments.clone(), publisher.clone()));

    let concurrency = config.consumer_concurrency;
    let mut workers = vec![
        spawn_consumer(
            broker.subscribe(REPLY_CHANNEL).await?,
            Arc::clone(&coordinator),
            concurrency,
        ),
        spawn_consumer(
            broker.subscribe(ORDER_CHANNEL).await?,
            order_participant,
            concurrency,
        ),
        spawn_consumer(
            broker.subscribe(PAYMENT_CHANNEL).await?,
            payment_participant,
            concurrency,
        ),
    ];

    if config.saga_timeout.is_some() {
        workers.push(Arc::clone(&coordinator).spawn_timeout_sweeper(config.saga_sweep_interval));
    }

    tracing::info!(
        concurrency,
        saga_timeout_secs = config.saga_timeout.map(|t| t.as_secs()),
        payment_limit = config.payment_max_amount,
        "saga components started"
    );

    let state = Arc::new(AppState {
        publisher,
        coordinator,
        orders,
        payments,
    });

    Ok(Services {
        state,
        broker,
        workers,
    })
}
