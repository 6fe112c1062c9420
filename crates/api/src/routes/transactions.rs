//! Saga trigger and transaction lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use contract::{Purchasing, TransactionId};
use saga::{SagaEvent, TransactionRecord};
use serde::Serialize;

use super::AppState;
use crate::error::ApiError;

// -- Response types --

#[derive(Serialize)]
pub struct TransactionCreatedResponse {
    pub transaction_id: String,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct TransactionResponse {
    pub id: String,
    pub state: String,
    pub name: Option<String>,
    pub amount: Option<i64>,
    pub completed_steps: Vec<String>,
    pub failed_step: Option<String>,
    pub compensation_reason: Option<String>,
    pub adopted: bool,
    pub publish_failures: u32,
    pub version: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TransactionResponse {
    fn from_record(record: &TransactionRecord) -> Self {
        Self {
            id: record.id().map(ToString::to_string).unwrap_or_default(),
            state: record.state().to_string(),
            name: record.payload().map(|p| p.name.clone()),
            amount: record.payload().map(|p| p.amount),
            completed_steps: record
                .completed_steps()
                .iter()
                .map(ToString::to_string)
                .collect(),
            failed_step: record.failed_step().map(|s| s.to_string()),
            compensation_reason: record.compensation_reason().map(|r| r.to_string()),
            adopted: record.is_adopted(),
            publish_failures: record.publish_failures(),
            version: record.version(),
            started_at: record.started_at(),
            deadline: record.deadline(),
            finished_at: record.finished_at(),
        }
    }
}

// -- Handlers --

/// POST /create/:name/:amount: start a saga.
///
/// Responds as soon as the first step is started; the outcome is observed by
/// polling `/transactions/:id` or the participants' read endpoints.
#[tracing::instrument(skip(state))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Path((name, amount)): Path<(String, String)>,
) -> Result<(StatusCode, Json<TransactionCreatedResponse>), ApiError> {
    let amount: i64 = amount
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid amount: {amount}")))?;

    let id = state
        .coordinator
        .create_transaction(Purchasing::new(name, amount))
        .await?;

    let response = TransactionCreatedResponse {
        transaction_id: id.to_string(),
        status: "initiated",
    };
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// GET /transactions: list every known transaction, oldest first.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<TransactionResponse>> {
    let records = state.coordinator.transactions().await;
    Json(records.iter().map(TransactionResponse::from_record).collect())
}

/// GET /transactions/:id: the coordinator's record of a transaction.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let record = state
        .coordinator
        .get_transaction(&TransactionId::from_string(id.as_str()))
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Transaction not found: {id}")))?;
    Ok(Json(TransactionResponse::from_record(&record)))
}

/// GET /transactions/:id/events: the recorded history of a transaction.
#[tracing::instrument(skip(state))]
pub async fn events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SagaEvent>>, ApiError> {
    let events = state
        .coordinator
        .events(&TransactionId::from_string(id.as_str()))
        .await;
    if events.is_empty() {
        return Err(ApiError::NotFound(format!("Transaction not found: {id}")));
    }
    Ok(Json(events))
}
