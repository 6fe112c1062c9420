//! Payment balance endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use super::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct BalanceResponse {
    pub balance: i64,
}

/// POST /payment/:order_id/:amount: deposit directly into the balance.
///
/// The order id is only recorded in the trace; deposits are not tied to orders.
#[tracing::instrument(skip(state))]
pub async fn deposit(
    State(state): State<Arc<AppState>>,
    Path((order_id, amount)): Path<(String, String)>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let amount: i64 = amount
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid amount: {amount}")))?;

    let balance = state.payments.deposit(amount).await?;
    Ok(Json(BalanceResponse { balance }))
}

/// GET /get-balance: the current balance.
pub async fn balance(State(state): State<Arc<AppState>>) -> Json<BalanceResponse> {
    Json(BalanceResponse {
        balance: state.payments.balance().await,
    })
}
