//! Order ledger endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use participant::OrderEntry;
use serde::Serialize;

use super::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub id: usize,
}

/// POST /create/:name: add a pending order outside of any saga.
#[tracing::instrument(skip(state))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<OrderCreatedResponse>, ApiError> {
    let id = state.orders.create_manual(&name).await?;
    tracing::info!(%name, id, "order created manually");
    Ok(Json(OrderCreatedResponse { id }))
}

/// GET /get-order: every order keyed by name.
pub async fn snapshot(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, OrderEntry>> {
    Json(state.orders.snapshot().await)
}
