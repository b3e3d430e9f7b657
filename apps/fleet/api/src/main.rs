use axum::{Router, middleware, routing::get};
use axum_helpers::health_router;
use core_config::app_info;
use core_config::tracing::{init_tracing, install_color_eyre};
use std::time::Duration;
use tracing::info;

mod api;
mod auth_store;
mod config;
mod openapi;
mod state;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Install color-eyre first for colored error output (before any fallible operations)
    install_color_eyre();

    // Load configuration from environment variables
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.environment);

    // Initialize Prometheus metrics recorder
    observability::init_metrics();
    info!("Prometheus metrics initialized");

    // Connect to PostgreSQL with retry and bring the schema up to date
    let db = database::postgres::connect_from_config_with_retry(config.database.clone(), None)
        .await
        .map_err(|e| eyre::eyre!("PostgreSQL connection failed: {}", e))?;
    database::postgres::run_migrations::<migration::Migrator>(&db, "fleet_api")
        .await
        .map_err(|e| eyre::eyre!("Migrations failed: {}", e))?;

    // Initialize the application state with database connections
    let state = AppState::new(config, db);

    // Build router with API routes (auth middleware applied inside)
    let api_routes = api::routes(&state);

    // create_router adds docs/middleware to our composed routes
    let router = axum_helpers::create_router::<openapi::ApiDoc>(api_routes).await?;

    // Metrics router is excluded from the metrics middleware to avoid recursion
    let metrics_router = Router::new().route("/metrics", get(observability::metrics_handler));

    // Merge health endpoints and metrics into the app
    // - /health: liveness check with app name/version
    // - /ready: readiness check with an actual db health check
    // - /metrics: Prometheus metrics endpoint
    let app = router
        .layer(middleware::from_fn(
            observability::middleware::metrics_middleware,
        ))
        .merge(health_router(app_info!()))
        .merge(api::ready_router(state.clone()))
        .merge(metrics_router);

    info!("Starting fleet API with graceful shutdown (30s timeout)");

    // Production-ready server with graceful shutdown and cleanup
    let server_config = state.config.server.clone();
    axum_helpers::create_production_app(
        app,
        &server_config,
        Duration::from_secs(30),
        async move {
            info!("Shutting down: closing database connections");
            match state.db.close().await {
                Ok(_) => info!("PostgreSQL connection closed successfully"),
                Err(e) => tracing::error!("Error closing PostgreSQL: {}", e),
            }
        },
    )
    .await
    .map_err(|e| eyre::eyre!("Server error: {}", e))?;

    info!("Fleet API shutdown complete");
    Ok(())
}
