use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_helpers::ErrorResponse;
use thiserror::Error;
use uuid::Uuid;

/// Result type for command queue operations
pub type CommandResult<T> = Result<T, CommandError>;

/// Errors that can occur in the command queue
#[derive(Debug, Error)]
pub enum CommandError {
    /// Command not found
    #[error("Command not found: {0}")]
    NotFound(Uuid),

    /// A request with this id is still pending or executing; no state change
    #[error("Request {request_id} is already in flight as command {command_id}")]
    DuplicateRequest { request_id: String, command_id: Uuid },

    /// A status transition was attempted on a terminal command
    #[error("Command {0} is already in a terminal state")]
    TerminalState(Uuid),

    /// The agent's execution report does not match the command record
    #[error("Execution report mismatch: {0}")]
    ReportMismatch(String),

    /// Stored payload failed to decode against the closed payload sum
    #[error("Invalid command payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl IntoResponse for CommandError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            CommandError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            CommandError::DuplicateRequest { .. } => {
                (StatusCode::CONFLICT, "DUPLICATE_REQUEST", self.to_string())
            }
            CommandError::TerminalState(_) => {
                (StatusCode::CONFLICT, "TERMINAL_STATE", self.to_string())
            }
            CommandError::ReportMismatch(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "REPORT_MISMATCH", self.to_string())
            }
            CommandError::InvalidPayload(_) => {
                (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD", self.to_string())
            }
            CommandError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Database error".to_string(),
            ),
        };

        let body = Json(ErrorResponse::new(error, message));
        (status, body).into_response()
    }
}
