//! HTTP handlers for the pricing read surface.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use axum_helpers::{
    UuidPath,
    errors::responses::{InternalServerErrorResponse, NotFoundResponse},
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, OpenApi};

use crate::error::PricingResult;
use crate::models::{
    CanonicalPrice, ConsolidationRun, HistoryQuery, Pool, PriceSource, RunStatus,
};
use crate::repository::PricingRepository;
use crate::service::PricingService;

/// OpenAPI documentation for the pricing API
#[derive(OpenApi)]
#[openapi(
    paths(list_pools, pool_history, list_runs),
    components(
        schemas(Pool, CanonicalPrice, ConsolidationRun, PriceSource, RunStatus),
        responses(NotFoundResponse, InternalServerErrorResponse)
    ),
    tags(
        (name = "pricing", description = "Spot pool pricing: pools, history, consolidation runs")
    )
)]
pub struct ApiDoc;

/// Create the client-facing pricing router
pub fn router<R: PricingRepository + 'static>(service: PricingService<R>) -> Router {
    Router::new()
        .route("/pools", get(list_pools))
        .route("/{id}/history", get(pool_history))
        .with_state(Arc::new(service))
}

/// Create the admin-facing consolidation-runs router
pub fn runs_router<R: PricingRepository + 'static>(service: PricingService<R>) -> Router {
    Router::new()
        .route("/", get(list_runs))
        .with_state(Arc::new(service))
}

/// Query parameters for listing pools
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct PoolsQuery {
    /// Narrow to one region
    pub region: Option<String>,
}

/// List known spot capacity pools
#[utoipa::path(
    get,
    path = "/pools",
    tag = "pricing",
    params(PoolsQuery),
    responses(
        (status = 200, description = "Known pools", body = Vec<Pool>),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn list_pools<R: PricingRepository>(
    State(service): State<Arc<PricingService<R>>>,
    Query(query): Query<PoolsQuery>,
) -> PricingResult<Json<Vec<Pool>>> {
    let pools = service.list_pools(query.region).await?;
    Ok(Json(pools))
}

/// Canonical price history for one pool (charts and the ML model read this)
#[utoipa::path(
    get,
    path = "/{id}/history",
    tag = "pricing",
    params(
        ("id" = Uuid, Path, description = "Pool ID"),
        HistoryQuery
    ),
    responses(
        (status = 200, description = "Canonical price series, oldest first", body = Vec<CanonicalPrice>),
        (status = 404, response = NotFoundResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn pool_history<R: PricingRepository>(
    State(service): State<Arc<PricingService<R>>>,
    UuidPath(id): UuidPath,
    Query(query): Query<HistoryQuery>,
) -> PricingResult<Json<Vec<CanonicalPrice>>> {
    let history = service.canonical_history(id, query.from, query.to).await?;
    Ok(Json(history))
}

/// Recent consolidation job executions with their counters
#[utoipa::path(
    get,
    path = "",
    tag = "pricing",
    responses(
        (status = 200, description = "Recent runs, newest first", body = Vec<ConsolidationRun>),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn list_runs<R: PricingRepository>(
    State(service): State<Arc<PricingService<R>>>,
) -> PricingResult<Json<Vec<ConsolidationRun>>> {
    let runs = service.recent_runs(50).await?;
    Ok(Json(runs))
}
