//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use participant::ParticipantError;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Participant ledger error.
    Participant(ParticipantError),
    /// Saga coordinator error.
    Saga(SagaError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Participant(err) => participant_error_to_response(err),
            ApiError::Saga(err) => saga_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn participant_error_to_response(err: ParticipantError) -> (StatusCode, String) {
    match &err {
        ParticipantError::OrderExists(_) => (StatusCode::CONFLICT, err.to_string()),
        ParticipantError::BlankOrderName | ParticipantError::InvalidAmount { .. } => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        ParticipantError::Contract(_) | ParticipantError::Broker(_) => {
            tracing::error!(error = %err, "participant error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match &err {
        SagaError::DuplicateTransaction(_) => (StatusCode::CONFLICT, err.to_string()),
        SagaError::Publish(_) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        SagaError::Contract(_) => {
            tracing::error!(error = %err, "saga error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<ParticipantError> for ApiError {
    fn from(err: ParticipantError) -> Self {
        ApiError::Participant(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}
