use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_helpers::ErrorResponse;
use thiserror::Error;

/// Result type for agent domain operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that can occur in the agents domain
#[derive(Debug, Error)]
pub enum AgentError {
    /// Agent, client, or instance not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller's tenant does not own the resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The presented version did not match; caller must re-read and decide.
    /// Never retried automatically.
    #[error("Optimistic conflict on {entity} {id}")]
    OptimisticConflict { entity: &'static str, id: String },

    /// A write would break a machine-enforced invariant (two primaries, both
    /// policy toggles on). Logged critical, never auto-corrected.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Tenant limits (e.g. max agents) exceeded
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// An illegal lifecycle transition was attempted
    #[error("Illegal role transition: {0}")]
    IllegalTransition(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Command queue error bubbled through a composite operation
    #[error(transparent)]
    Command(#[from] domain_commands::CommandError),

    /// Pricing error bubbled through a composite operation
    #[error(transparent)]
    Pricing(#[from] domain_pricing::PricingError),
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AgentError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            AgentError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN", self.to_string()),
            AgentError::OptimisticConflict { .. } => {
                (StatusCode::CONFLICT, "OPTIMISTIC_CONFLICT", self.to_string())
            }
            AgentError::InvariantViolation(_) => {
                tracing::error!("INVARIANT VIOLATION: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INVARIANT_VIOLATION",
                    self.to_string(),
                )
            }
            AgentError::LimitExceeded(_) => {
                (StatusCode::FORBIDDEN, "LIMIT_EXCEEDED", self.to_string())
            }
            AgentError::IllegalTransition(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "ILLEGAL_TRANSITION",
                self.to_string(),
            ),
            AgentError::InvalidInput(_) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", self.to_string())
            }
            AgentError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Database error".to_string(),
            ),
            AgentError::Command(e) => return e_to_response(e),
            AgentError::Pricing(e) => return p_to_response(e),
        };

        let body = Json(ErrorResponse::new(error, message));
        (status, body).into_response()
    }
}

fn e_to_response(e: &domain_commands::CommandError) -> Response {
    // Delegate to the command domain's own mapping by reconstructing the
    // response from its display form
    let (status, error) = match e {
        domain_commands::CommandError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        domain_commands::CommandError::DuplicateRequest { .. } => {
            (StatusCode::CONFLICT, "DUPLICATE_REQUEST")
        }
        domain_commands::CommandError::TerminalState(_) => (StatusCode::CONFLICT, "TERMINAL_STATE"),
        domain_commands::CommandError::ReportMismatch(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "REPORT_MISMATCH")
        }
        domain_commands::CommandError::InvalidPayload(_) => {
            (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD")
        }
        domain_commands::CommandError::Database(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    };
    let body = Json(ErrorResponse::new(error, e.to_string()));
    (status, body).into_response()
}

fn p_to_response(e: &domain_pricing::PricingError) -> Response {
    let (status, error) = match e {
        domain_pricing::PricingError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        domain_pricing::PricingError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        domain_pricing::PricingError::ExternalUnavailable(_) => {
            (StatusCode::BAD_GATEWAY, "EXTERNAL_UNAVAILABLE")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    };
    let body = Json(ErrorResponse::new(error, e.to_string()));
    (status, body).into_response()
}
