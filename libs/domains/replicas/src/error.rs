use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_helpers::ErrorResponse;
use thiserror::Error;
use uuid::Uuid;

/// Result type for replica operations
pub type ReplicaResult<T> = Result<T, ReplicaError>;

/// Errors that can occur in the replicas domain
#[derive(Debug, Error)]
pub enum ReplicaError {
    /// Replica not found
    #[error("Replica not found: {0}")]
    NotFound(Uuid),

    /// Replica belongs to another agent or tenant
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// No pool could be selected for a replica launch
    #[error("No eligible pool: {0}")]
    NoEligiblePool(String),

    /// The replica is not in a state that allows the operation
    #[error("Invalid replica state: {0}")]
    InvalidState(String),

    /// An emergency procedure could not complete inside its deadline; the
    /// escalation is logged and a reconciler may need to clean up
    #[error("Deadline exceeded for agent {agent_id}: {reason}")]
    DeadlineExceeded { agent_id: Uuid, reason: String },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Agents-domain error bubbled through a composite operation
    #[error(transparent)]
    Agent(#[from] domain_agents::AgentError),

    /// Command queue error bubbled through a composite operation
    #[error(transparent)]
    Command(#[from] domain_commands::CommandError),

    /// Pricing error bubbled through a composite operation
    #[error(transparent)]
    Pricing(#[from] domain_pricing::PricingError),
}

impl IntoResponse for ReplicaError {
    fn into_response(self) -> Response {
        // Composite operations keep each domain's own HTTP mapping
        let err = match self {
            ReplicaError::Agent(e) => return e.into_response(),
            ReplicaError::Command(e) => return e.into_response(),
            ReplicaError::Pricing(e) => return e.into_response(),
            other => other,
        };

        let (status, error) = match &err {
            ReplicaError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ReplicaError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ReplicaError::NoEligiblePool(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "NO_ELIGIBLE_POOL")
            }
            ReplicaError::InvalidState(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_STATE"),
            ReplicaError::DeadlineExceeded { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "DEADLINE_EXCEEDED")
            }
            ReplicaError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            // Delegated above
            ReplicaError::Agent(_) | ReplicaError::Command(_) | ReplicaError::Pricing(_) => {
                unreachable!()
            }
        };

        let body = Json(ErrorResponse::new(error, err.to_string()));
        (status, body).into_response()
    }
}
