use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_helpers::ErrorResponse;
use thiserror::Error;

/// Result type for event bus operations
pub type EventResult<T> = Result<T, EventError>;

/// Errors that can occur in the event domain
#[derive(Debug, Error)]
pub enum EventError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for EventError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            EventError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            EventError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        tracing::error!("Event bus error: {}", self);

        let body = Json(ErrorResponse::new(error, "Event bus error"));
        (status, body).into_response()
    }
}
