//! Route composition: agent-facing, client-facing, and admin surfaces share
//! the bearer-token middleware; /ready stays outside it.

mod models;

use axum::{Json, Router, extract::State, http::StatusCode, middleware, routing::get};
use axum_helpers::auth::{AuthState, bearer_auth, require_admin};
use serde_json::Value;
use std::sync::Arc;

use crate::auth_store::DbAuthStore;
use crate::state::AppState;

/// All authenticated API routes.
pub fn routes(state: &AppState) -> Router {
    let auth = AuthState::new(
        Arc::new(DbAuthStore::new(state.agent_repository.clone())),
        &state.config.admin_token,
    );

    let agent_routes = domain_agents::handlers::agent_router(state.fleet.clone())
        .merge(domain_replicas::handlers::agent_router(state.replicas.clone()));

    let client_routes = domain_agents::handlers::client_router(state.fleet.clone())
        .nest(
            "/pricing",
            domain_pricing::handlers::router(state.pricing.clone()),
        )
        .nest(
            "/events",
            domain_events::handlers::router(state.events.clone()),
        );

    let admin_routes = domain_agents::handlers::admin_router(state.fleet.clone())
        .nest(
            "/commands",
            domain_commands::handlers::admin_router(state.commands.clone()),
        )
        .nest(
            "/events",
            domain_events::handlers::audit_router(state.events.clone()),
        )
        .nest(
            "/pricing/runs",
            domain_pricing::handlers::runs_router(state.pricing.clone()),
        )
        .nest("/models", models::router(&state.config.model_artifact_dir))
        .layer(middleware::from_fn(require_admin));

    Router::new()
        .nest("/agents", agent_routes)
        .nest("/client", client_routes)
        .nest("/admin", admin_routes)
        .layer(middleware::from_fn_with_state(auth, bearer_auth))
}

/// Readiness probe with a live database check; unauthenticated.
pub fn ready_router(state: AppState) -> Router {
    Router::new()
        .route("/ready", get(ready_handler))
        .with_state(state)
}

async fn ready_handler(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let checks: Vec<(&str, axum_helpers::health::HealthCheckFuture<'_>)> = vec![(
        "database",
        Box::pin(async {
            database::postgres::check_health(&state.db)
                .await
                .map_err(|e| e.to_string())
        }),
    )];

    axum_helpers::run_health_checks(checks).await
}
