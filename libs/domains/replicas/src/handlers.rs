//! HTTP handlers for preemption notices and replica work orders.
//!
//! These routes are merged into the `/agents` surface next to the fleet
//! endpoints; tenancy is checked through the agents service before any
//! replica state moves.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use axum_helpers::{
    Identity, ValidatedJson,
    errors::responses::{NotFoundResponse, UnauthorizedResponse},
};
use std::sync::Arc;
use utoipa::OpenApi;
use uuid::Uuid;

use domain_agents::{AgentRepository, AgentService};
use domain_commands::CommandRepository;
use domain_events::EventRepository;
use domain_pricing::PricingRepository;

use crate::emergency::EmergencyOrchestrator;
use crate::error::{ReplicaError, ReplicaResult};
use crate::models::{
    BindReplicaRequest, NoticeRequest, ReplicaInstance, ReplicaKind, ReplicaQuery, ReplicaStatus,
    ReplicaStatusUpdate, TerminationNoticeRequest,
};
use crate::repository::ReplicaRepository;
use crate::service::ReplicaService;

/// Shared state for the replica/notice routes
pub struct ReplicasApi<Q, A, C, E, P>
where
    Q: ReplicaRepository,
    A: AgentRepository,
    C: CommandRepository,
    E: EventRepository,
    P: PricingRepository,
{
    pub orchestrator: EmergencyOrchestrator<Q, A, C, E, P>,
    pub replicas: ReplicaService<Q, C, E>,
    pub agents: AgentService<A, E, P>,
}

type ApiState<Q, A, C, E, P> = Arc<ReplicasApi<Q, A, C, E, P>>;

/// OpenAPI documentation for notices and replicas
#[derive(OpenApi)]
#[openapi(
    paths(
        rebalance_notice,
        termination_notice,
        list_replicas,
        bind_replica,
        replica_status
    ),
    components(
        schemas(
            ReplicaInstance,
            ReplicaKind,
            ReplicaStatus,
            BindReplicaRequest,
            ReplicaStatusUpdate,
            NoticeRequest,
            TerminationNoticeRequest
        ),
        responses(NotFoundResponse, UnauthorizedResponse)
    ),
    tags(
        (name = "replicas", description = "Preemption notices and replica work orders")
    )
)]
pub struct ApiDoc;

/// Router merged into the `/agents` surface
pub fn agent_router<Q, A, C, E, P>(state: ApiState<Q, A, C, E, P>) -> Router
where
    Q: ReplicaRepository + 'static,
    A: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    Router::new()
        .route("/{id}/rebalance-notice", post(rebalance_notice))
        .route("/{id}/termination-notice", post(termination_notice))
        .route("/{id}/replicas", get(list_replicas))
        .route("/{id}/replicas/{replica_id}", put(bind_replica))
        .route("/{id}/replicas/{replica_id}/status", post(replica_status))
        .with_state(state)
}

/// Rebalance notice: the cloud may reclaim this spot instance (120 s budget)
#[utoipa::path(
    post,
    path = "/{id}/rebalance-notice",
    tag = "replicas",
    params(("id" = Uuid, Path, description = "Agent ID")),
    request_body = NoticeRequest,
    responses(
        (status = 202, description = "Failover procedure started"),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn rebalance_notice<Q, A, C, E, P>(
    State(state): State<ApiState<Q, A, C, E, P>>,
    identity: Identity,
    Path(agent_id): Path<Uuid>,
    Json(notice): Json<NoticeRequest>,
) -> ReplicaResult<impl IntoResponse>
where
    Q: ReplicaRepository + 'static,
    A: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    let (client_id, agent) = owned_agent(&state, &identity, agent_id).await?;
    state
        .orchestrator
        .handle_rebalance(client_id, &agent, notice.notice_time)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

/// Termination notice: hard preemption announced (60 s budget or less)
#[utoipa::path(
    post,
    path = "/{id}/termination-notice",
    tag = "replicas",
    params(("id" = Uuid, Path, description = "Agent ID")),
    request_body = TerminationNoticeRequest,
    responses(
        (status = 202, description = "Emergency failover started"),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn termination_notice<Q, A, C, E, P>(
    State(state): State<ApiState<Q, A, C, E, P>>,
    identity: Identity,
    Path(agent_id): Path<Uuid>,
    Json(notice): Json<TerminationNoticeRequest>,
) -> ReplicaResult<impl IntoResponse>
where
    Q: ReplicaRepository + 'static,
    A: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    let (client_id, agent) = owned_agent(&state, &identity, agent_id).await?;
    state
        .orchestrator
        .handle_termination(client_id, &agent, notice.termination_time)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

/// Replica work orders for the agent to act on
#[utoipa::path(
    get,
    path = "/{id}/replicas",
    tag = "replicas",
    params(
        ("id" = Uuid, Path, description = "Agent ID"),
        ReplicaQuery
    ),
    responses(
        (status = 200, description = "Replicas, oldest first", body = Vec<ReplicaInstance>),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn list_replicas<Q, A, C, E, P>(
    State(state): State<ApiState<Q, A, C, E, P>>,
    identity: Identity,
    Path(agent_id): Path<Uuid>,
    Query(query): Query<ReplicaQuery>,
) -> ReplicaResult<Json<Vec<ReplicaInstance>>>
where
    Q: ReplicaRepository + 'static,
    A: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    let (_, agent) = owned_agent(&state, &identity, agent_id).await?;
    let replicas = state.replicas.list_for_agent(agent.id, query.status).await?;
    Ok(Json(replicas))
}

/// Bind the concrete cloud instance id to a replica
#[utoipa::path(
    put,
    path = "/{id}/replicas/{replica_id}",
    tag = "replicas",
    params(
        ("id" = Uuid, Path, description = "Agent ID"),
        ("replica_id" = Uuid, Path, description = "Replica ID")
    ),
    request_body = BindReplicaRequest,
    responses(
        (status = 200, description = "Instance bound", body = ReplicaInstance),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn bind_replica<Q, A, C, E, P>(
    State(state): State<ApiState<Q, A, C, E, P>>,
    identity: Identity,
    Path((agent_id, replica_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(request): ValidatedJson<BindReplicaRequest>,
) -> ReplicaResult<Json<ReplicaInstance>>
where
    Q: ReplicaRepository + 'static,
    A: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    let (_, agent) = owned_agent(&state, &identity, agent_id).await?;
    let replica = state
        .replicas
        .bind_instance(&agent, replica_id, request.instance_id)
        .await?;
    Ok(Json(replica))
}

/// Replica lifecycle status report. READY may immediately trigger promotion
/// under an outstanding notice; PROMOTED completes the control-plane side of
/// the failover.
#[utoipa::path(
    post,
    path = "/{id}/replicas/{replica_id}/status",
    tag = "replicas",
    params(
        ("id" = Uuid, Path, description = "Agent ID"),
        ("replica_id" = Uuid, Path, description = "Replica ID")
    ),
    request_body = ReplicaStatusUpdate,
    responses(
        (status = 200, description = "Status applied", body = ReplicaInstance),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse),
        (status = 422, description = "Replica state does not allow the update")
    )
)]
async fn replica_status<Q, A, C, E, P>(
    State(state): State<ApiState<Q, A, C, E, P>>,
    identity: Identity,
    Path((agent_id, replica_id)): Path<(Uuid, Uuid)>,
    Json(update): Json<ReplicaStatusUpdate>,
) -> ReplicaResult<Json<ReplicaInstance>>
where
    Q: ReplicaRepository + 'static,
    A: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    let (client_id, agent) = owned_agent(&state, &identity, agent_id).await?;

    let replica = match update.status {
        // The agent finished promoting: apply the control-plane side
        ReplicaStatus::Promoted => {
            let replica = state.replicas.get_owned(&agent, replica_id).await?;
            state
                .orchestrator
                .complete_promotion(client_id, &agent, &replica)
                .await?
        }
        // A failed emergency replica counts against the agent
        ReplicaStatus::Terminated => {
            let updated = state
                .replicas
                .update_status(client_id, &agent, replica_id, update)
                .await?;
            if agent.notice_status != domain_agents::NoticeStatus::None {
                state
                    .orchestrator
                    .record_promotion_failure(client_id, &agent)
                    .await?;
            }
            updated
        }
        _ => {
            let updated = state
                .replicas
                .update_status(client_id, &agent, replica_id, update)
                .await?;
            if updated.status == ReplicaStatus::Ready {
                state
                    .orchestrator
                    .on_replica_ready(client_id, &agent, &updated)
                    .await?;
            }
            updated
        }
    };

    Ok(Json(replica))
}

async fn owned_agent<Q, A, C, E, P>(
    state: &ReplicasApi<Q, A, C, E, P>,
    identity: &Identity,
    agent_id: Uuid,
) -> ReplicaResult<(Uuid, domain_agents::Agent)>
where
    Q: ReplicaRepository,
    A: AgentRepository,
    C: CommandRepository,
    E: EventRepository,
    P: PricingRepository,
{
    let client_id = identity
        .require_client_id()
        .map_err(|_| ReplicaError::Forbidden("a client token is required".to_string()))?;
    let agent = state.agents.get_agent(client_id, agent_id).await?;
    Ok((client_id, agent))
}
