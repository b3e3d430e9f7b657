//! HTTP handlers for the operator-facing command browser.
//!
//! Agent-facing queue endpoints (poll, executed report) live with the agents
//! domain, which owns tenancy checks against the agent record.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use axum_helpers::errors::responses::InternalServerErrorResponse;
use std::sync::Arc;
use utoipa::OpenApi;

use crate::error::CommandResult;
use crate::models::{
    Command, CommandFilter, CommandKind, CommandPayload, CommandStatus, CommandTrigger,
    ExecutionResult, TargetMode,
};
use crate::repository::CommandRepository;
use crate::service::CommandQueue;
use domain_events::EventRepository;

/// OpenAPI documentation for the command queue API
#[derive(OpenApi)]
#[openapi(
    paths(list_commands),
    components(
        schemas(
            Command,
            CommandKind,
            CommandStatus,
            CommandTrigger,
            CommandPayload,
            TargetMode,
            ExecutionResult
        ),
        responses(InternalServerErrorResponse)
    ),
    tags(
        (name = "commands", description = "Command queue browsing")
    )
)]
pub struct ApiDoc;

/// Create the admin-facing commands router
pub fn admin_router<R, E>(queue: CommandQueue<R, E>) -> Router
where
    R: CommandRepository + 'static,
    E: EventRepository + 'static,
{
    Router::new()
        .route("/", get(list_commands))
        .with_state(Arc::new(queue))
}

/// Browse commands across the fleet
#[utoipa::path(
    get,
    path = "",
    tag = "commands",
    params(CommandFilter),
    responses(
        (status = 200, description = "Commands, newest first", body = Vec<Command>),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn list_commands<R, E>(
    State(queue): State<Arc<CommandQueue<R, E>>>,
    Query(filter): Query<CommandFilter>,
) -> CommandResult<Json<Vec<Command>>>
where
    R: CommandRepository + 'static,
    E: EventRepository + 'static,
{
    let commands = queue.list(filter).await?;
    Ok(Json(commands))
}
