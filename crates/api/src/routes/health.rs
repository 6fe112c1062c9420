//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use broker::CircuitState;
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// State of the publish circuit breaker.
    pub publisher: String,
}

/// GET /health: returns liveness and whether publishing is currently possible.
///
/// The process is `ok` while the circuit is closed and `degraded` otherwise;
/// both answer 200 so the process is not restarted for a broker outage.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let circuit = state.publisher.breaker().state().await;
    let status = match circuit {
        CircuitState::Closed => "ok",
        CircuitState::Open | CircuitState::HalfOpen => "degraded",
    };
    Json(HealthResponse {
        status,
        publisher: circuit.to_string(),
    })
}
