//! Prometheus metrics endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

use super::AppState;

/// State for the metrics route: the recorder handle plus the ledgers sampled at scrape time.
#[derive(Clone)]
pub struct MetricsState {
    pub handle: PrometheusHandle,
    pub app: Arc<AppState>,
}

/// GET /metrics: returns Prometheus-formatted metrics.
///
/// Gauges for in-flight sagas, orders and the balance are refreshed first.
pub async fn get(State(state): State<MetricsState>) -> impl IntoResponse {
    let in_flight = state
        .app
        .coordinator
        .transactions()
        .await
        .iter()
        .filter(|record| !record.state().is_terminal())
        .count();
    metrics::gauge!("saga_in_flight").set(in_flight as f64);
    metrics::gauge!("order_entries").set(state.app.orders.len().await as f64);
    metrics::gauge!("payment_balance").set(state.app.payments.balance().await as f64);

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.handle.render(),
    )
}
