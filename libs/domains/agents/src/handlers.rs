//! HTTP handlers for the fleet API.
//!
//! Three surfaces share one state:
//! - agent-facing (`agent_router`): register, heartbeat, pricing report,
//!   command poll/report, switch/termination reports
//! - client-facing (`client_router`): agent browsing, policy, manual switch
//! - admin-facing (`admin_router`): tenants, fleet-wide browsing, error clear

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use axum_helpers::{
    Identity, RequestIdHeader, UuidPath, ValidatedJson,
    errors::responses::{
        BadRequestValidationResponse, ConflictResponse, ForbiddenResponse,
        InternalServerErrorResponse, NotFoundResponse, UnauthorizedResponse,
    },
};
use std::sync::Arc;
use utoipa::OpenApi;
use uuid::Uuid;

use domain_commands::{Command, CommandQueue, CommandRepository, ExecutionResult};
use domain_events::EventRepository;
use domain_pricing::{PricingReport, PricingRepository, PricingService, SourceRole};

use crate::error::{AgentError, AgentResult};
use crate::models::{
    Agent, AgentFilter, AgentMode, AgentPolicy, AgentStatus, Client, ClientPlan, HeartbeatRequest,
    Instance, InstanceRole, ManualSwitchRequest, NewClient, NoticeStatus, PolicyUpdate,
    RegisterAgentRequest, RegisterAgentResponse, Switch, SwitchFilter, SwitchReportRequest,
    TerminationReportRequest,
};
use crate::repository::AgentRepository;
use crate::service::AgentService;
use crate::switching::SwitchingService;

/// Shared state for all fleet routers
pub struct FleetApi<R, C, E, P>
where
    R: AgentRepository,
    C: CommandRepository,
    E: EventRepository,
    P: PricingRepository,
{
    pub agents: AgentService<R, E, P>,
    pub switching: SwitchingService<R, C, E, P>,
    pub commands: CommandQueue<C, E>,
    pub pricing: PricingService<P>,
}

type ApiState<R, C, E, P> = Arc<FleetApi<R, C, E, P>>;

/// OpenAPI documentation for the fleet API
#[derive(OpenApi)]
#[openapi(
    paths(
        register,
        heartbeat,
        pricing_report,
        pending_commands,
        command_executed,
        switch_report,
        termination_report,
        list_client_agents,
        get_client_agent,
        list_agent_instances,
        update_agent_policy,
        manual_switch,
        list_client_switches,
        list_clients,
        create_client,
        list_all_agents,
        list_all_switches,
        clear_agent_error,
    ),
    components(
        schemas(
            Agent,
            AgentPolicy,
            AgentMode,
            AgentStatus,
            NoticeStatus,
            Instance,
            InstanceRole,
            Switch,
            Client,
            ClientPlan,
            NewClient,
            RegisterAgentRequest,
            RegisterAgentResponse,
            HeartbeatRequest,
            SwitchReportRequest,
            TerminationReportRequest,
            PolicyUpdate,
            ManualSwitchRequest,
        ),
        responses(
            NotFoundResponse,
            BadRequestValidationResponse,
            UnauthorizedResponse,
            ForbiddenResponse,
            ConflictResponse,
            InternalServerErrorResponse
        )
    ),
    tags(
        (name = "agents", description = "Agent-facing fleet endpoints"),
        (name = "client", description = "Operator endpoints scoped to one tenant"),
        (name = "admin", description = "Cross-tenant system operator endpoints")
    )
)]
pub struct ApiDoc;

/// Agent-facing router, nested under `/agents`
pub fn agent_router<R, C, E, P>(state: ApiState<R, C, E, P>) -> Router
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    Router::new()
        .route("/register", post(register))
        .route("/{id}/heartbeat", post(heartbeat))
        .route("/{id}/pricing-report", post(pricing_report))
        .route("/{id}/pending-commands", get(pending_commands))
        .route("/{id}/commands/{command_id}/executed", post(command_executed))
        .route("/{id}/switch-report", post(switch_report))
        .route("/{id}/termination-report", post(termination_report))
        .with_state(state)
}

/// Client-facing router, nested under `/client`
pub fn client_router<R, C, E, P>(state: ApiState<R, C, E, P>) -> Router
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    Router::new()
        .route("/agents", get(list_client_agents))
        .route("/agents/{id}", get(get_client_agent))
        .route("/agents/{id}/instances", get(list_agent_instances))
        .route("/agents/{id}/policy", put(update_agent_policy))
        .route("/agents/{id}/switch", post(manual_switch))
        .route("/switches", get(list_client_switches))
        .with_state(state)
}

/// Admin router, nested under `/admin`
pub fn admin_router<R, C, E, P>(state: ApiState<R, C, E, P>) -> Router
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    Router::new()
        .route("/clients", get(list_clients).post(create_client))
        .route("/agents", get(list_all_agents))
        .route("/switches", get(list_all_switches))
        .route("/agents/{id}/clear-error", post(clear_agent_error))
        .with_state(state)
}

async fn client_for<R, C, E, P>(
    state: &FleetApi<R, C, E, P>,
    identity: &Identity,
) -> AgentResult<Client>
where
    R: AgentRepository,
    C: CommandRepository,
    E: EventRepository,
    P: PricingRepository,
{
    let client_id = identity
        .require_client_id()
        .map_err(|_| AgentError::Forbidden("a client token is required".to_string()))?;
    state.agents.client_by_id(client_id).await
}

// ---------------------------------------------------------------------------
// Agent-facing handlers
// ---------------------------------------------------------------------------

/// Register an agent (create on first sight, reactivate otherwise)
#[utoipa::path(
    post,
    path = "/register",
    tag = "agents",
    request_body = RegisterAgentRequest,
    responses(
        (status = 200, description = "Agent registered", body = RegisterAgentResponse),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse)
    )
)]
async fn register<R, C, E, P>(
    State(state): State<ApiState<R, C, E, P>>,
    identity: Identity,
    ValidatedJson(request): ValidatedJson<RegisterAgentRequest>,
) -> AgentResult<Json<RegisterAgentResponse>>
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    let client = client_for(&state, &identity).await?;
    let response = state.agents.register(&client, request).await?;
    Ok(Json(response))
}

/// Agent liveness; reconciles instance context without touching roles
#[utoipa::path(
    post,
    path = "/{id}/heartbeat",
    tag = "agents",
    params(("id" = Uuid, Path, description = "Agent ID")),
    request_body = HeartbeatRequest,
    responses(
        (status = 200, description = "Heartbeat recorded", body = Agent),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn heartbeat<R, C, E, P>(
    State(state): State<ApiState<R, C, E, P>>,
    identity: Identity,
    UuidPath(agent_id): UuidPath,
    ValidatedJson(request): ValidatedJson<HeartbeatRequest>,
) -> AgentResult<Json<Agent>>
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    let client = client_for(&state, &identity).await?;
    let agent = state.agents.heartbeat(client.id, agent_id, request).await?;
    Ok(Json(agent))
}

/// Stage a price report from an agent
#[utoipa::path(
    post,
    path = "/{id}/pricing-report",
    tag = "agents",
    params(("id" = Uuid, Path, description = "Agent ID")),
    request_body = PricingReport,
    responses(
        (status = 202, description = "Snapshots staged"),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn pricing_report<R, C, E, P>(
    State(state): State<ApiState<R, C, E, P>>,
    identity: Identity,
    UuidPath(agent_id): UuidPath,
    ValidatedJson(report): ValidatedJson<PricingReport>,
) -> AgentResult<impl IntoResponse>
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    let client = client_for(&state, &identity).await?;
    let agent = state.agents.get_agent(client.id, agent_id).await?;

    let instance_type = agent.instance_type.clone().ok_or_else(|| {
        AgentError::InvalidInput("agent has no known instance type yet".to_string())
    })?;

    let staged = state
        .pricing
        .ingest_report(
            &instance_type,
            &agent.region,
            agent.current_instance_id.clone(),
            Some(SourceRole::Primary),
            report,
        )
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "staged": staged })),
    ))
}

/// Pending commands for this agent in priority-then-FIFO order
#[utoipa::path(
    get,
    path = "/{id}/pending-commands",
    tag = "agents",
    params(("id" = Uuid, Path, description = "Agent ID")),
    responses(
        (status = 200, description = "Commands to execute, in order", body = Vec<Command>),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn pending_commands<R, C, E, P>(
    State(state): State<ApiState<R, C, E, P>>,
    identity: Identity,
    UuidPath(agent_id): UuidPath,
) -> AgentResult<Json<Vec<Command>>>
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    let client = client_for(&state, &identity).await?;
    state.agents.get_agent(client.id, agent_id).await?;

    let commands = state.commands.take_for_agent(agent_id).await?;
    Ok(Json(commands))
}

/// Report the outcome of a command
#[utoipa::path(
    post,
    path = "/{id}/commands/{command_id}/executed",
    tag = "agents",
    params(
        ("id" = Uuid, Path, description = "Agent ID"),
        ("command_id" = Uuid, Path, description = "Command ID")
    ),
    request_body = ExecutionResult,
    responses(
        (status = 200, description = "Command closed", body = Command),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse)
    )
)]
async fn command_executed<R, C, E, P>(
    State(state): State<ApiState<R, C, E, P>>,
    identity: Identity,
    Path((agent_id, command_id)): Path<(Uuid, Uuid)>,
    Json(result): Json<ExecutionResult>,
) -> AgentResult<Json<Command>>
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    let client = client_for(&state, &identity).await?;
    state.agents.get_agent(client.id, agent_id).await?;

    let command = state.commands.get(command_id).await?;
    if command.agent_id != agent_id {
        return Err(AgentError::Forbidden(format!(
            "command {} does not belong to agent {}",
            command_id, agent_id
        )));
    }

    let command = state
        .commands
        .report_executed(client.id, command_id, result)
        .await?;
    Ok(Json(command))
}

/// Apply a completed switch: validate against the command record, promote the
/// new instance, demote or terminate the old one, record the switch
#[utoipa::path(
    post,
    path = "/{id}/switch-report",
    tag = "agents",
    params(("id" = Uuid, Path, description = "Agent ID")),
    request_body = SwitchReportRequest,
    responses(
        (status = 200, description = "Switch applied", body = Switch),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse),
        (status = 422, description = "Report does not match the command record")
    )
)]
async fn switch_report<R, C, E, P>(
    State(state): State<ApiState<R, C, E, P>>,
    identity: Identity,
    UuidPath(agent_id): UuidPath,
    ValidatedJson(report): ValidatedJson<SwitchReportRequest>,
) -> AgentResult<Json<Switch>>
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    let client = client_for(&state, &identity).await?;
    let agent = state.agents.get_agent(client.id, agent_id).await?;

    let switch = state
        .switching
        .process_switch_report(client.id, &agent, report)
        .await?;
    Ok(Json(switch))
}

/// Confirm termination of a specific instance
#[utoipa::path(
    post,
    path = "/{id}/termination-report",
    tag = "agents",
    params(("id" = Uuid, Path, description = "Agent ID")),
    request_body = TerminationReportRequest,
    responses(
        (status = 204, description = "Instance marked terminated"),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn termination_report<R, C, E, P>(
    State(state): State<ApiState<R, C, E, P>>,
    identity: Identity,
    UuidPath(agent_id): UuidPath,
    ValidatedJson(report): ValidatedJson<TerminationReportRequest>,
) -> AgentResult<impl IntoResponse>
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    let client = client_for(&state, &identity).await?;
    let agent = state.agents.get_agent(client.id, agent_id).await?;

    state
        .switching
        .process_termination_report(client.id, &agent, report)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Client-facing handlers
// ---------------------------------------------------------------------------

/// List this tenant's agents
#[utoipa::path(
    get,
    path = "/agents",
    tag = "client",
    params(AgentFilter),
    responses(
        (status = 200, description = "Agents", body = Vec<Agent>),
        (status = 401, response = UnauthorizedResponse)
    )
)]
async fn list_client_agents<R, C, E, P>(
    State(state): State<ApiState<R, C, E, P>>,
    identity: Identity,
    Query(filter): Query<AgentFilter>,
) -> AgentResult<Json<Vec<Agent>>>
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    let client = client_for(&state, &identity).await?;
    let agents = state.agents.list_agents(Some(client.id), filter).await?;
    Ok(Json(agents))
}

/// One agent with tenancy check
#[utoipa::path(
    get,
    path = "/agents/{id}",
    tag = "client",
    params(("id" = Uuid, Path, description = "Agent ID")),
    responses(
        (status = 200, description = "The agent", body = Agent),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn get_client_agent<R, C, E, P>(
    State(state): State<ApiState<R, C, E, P>>,
    identity: Identity,
    UuidPath(agent_id): UuidPath,
) -> AgentResult<Json<Agent>>
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    let client = client_for(&state, &identity).await?;
    let agent = state.agents.get_agent(client.id, agent_id).await?;
    Ok(Json(agent))
}

/// All instances ever observed for an agent (audit view)
#[utoipa::path(
    get,
    path = "/agents/{id}/instances",
    tag = "client",
    params(("id" = Uuid, Path, description = "Agent ID")),
    responses(
        (status = 200, description = "Instances, oldest first", body = Vec<Instance>),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn list_agent_instances<R, C, E, P>(
    State(state): State<ApiState<R, C, E, P>>,
    identity: Identity,
    UuidPath(agent_id): UuidPath,
) -> AgentResult<Json<Vec<Instance>>>
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    let client = client_for(&state, &identity).await?;
    state.agents.get_agent(client.id, agent_id).await?;
    let instances = state.agents.instances_for_agent(agent_id).await?;
    Ok(Json(instances))
}

/// Update an agent's switching policy (optimistic, mutually exclusive toggles)
#[utoipa::path(
    put,
    path = "/agents/{id}/policy",
    tag = "client",
    params(("id" = Uuid, Path, description = "Agent ID")),
    request_body = PolicyUpdate,
    responses(
        (status = 200, description = "Policy applied", body = Agent),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse)
    )
)]
async fn update_agent_policy<R, C, E, P>(
    State(state): State<ApiState<R, C, E, P>>,
    identity: Identity,
    UuidPath(agent_id): UuidPath,
    Json(update): Json<PolicyUpdate>,
) -> AgentResult<Json<Agent>>
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    let client = client_for(&state, &identity).await?;
    let agent = state
        .agents
        .update_policy(client.id, agent_id, update)
        .await?;
    Ok(Json(agent))
}

/// Trigger a manual switch (priority 75) under an idempotency key
#[utoipa::path(
    post,
    path = "/agents/{id}/switch",
    tag = "client",
    params(
        ("id" = Uuid, Path, description = "Agent ID"),
        ("X-Request-ID" = Option<String>, Header, description = "Idempotency key")
    ),
    request_body = ManualSwitchRequest,
    responses(
        (status = 202, description = "Switch command enqueued", body = Command),
        (status = 200, description = "Idempotent replay of the original command", body = Command),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse)
    )
)]
async fn manual_switch<R, C, E, P>(
    State(state): State<ApiState<R, C, E, P>>,
    identity: Identity,
    UuidPath(agent_id): UuidPath,
    RequestIdHeader(header_request_id): RequestIdHeader,
    Json(request): Json<ManualSwitchRequest>,
) -> AgentResult<impl IntoResponse>
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    let client = client_for(&state, &identity).await?;
    let agent = state.agents.get_agent(client.id, agent_id).await?;

    let outcome = state
        .switching
        .manual_switch(client.id, &agent, request, header_request_id, None)
        .await?;

    let status = if outcome.is_replay() {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(outcome.command().clone())))
}

/// This tenant's switch history
#[utoipa::path(
    get,
    path = "/switches",
    tag = "client",
    params(SwitchFilter),
    responses(
        (status = 200, description = "Switches, newest first", body = Vec<Switch>),
        (status = 401, response = UnauthorizedResponse)
    )
)]
async fn list_client_switches<R, C, E, P>(
    State(state): State<ApiState<R, C, E, P>>,
    identity: Identity,
    Query(filter): Query<SwitchFilter>,
) -> AgentResult<Json<Vec<Switch>>>
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    let client = client_for(&state, &identity).await?;
    let switches = state
        .agents
        .repository()
        .list_switches(Some(client.id), filter)
        .await?;
    Ok(Json(switches))
}

// ---------------------------------------------------------------------------
// Admin handlers
// ---------------------------------------------------------------------------

/// List tenants
#[utoipa::path(
    get,
    path = "/clients",
    tag = "admin",
    responses(
        (status = 200, description = "Tenants", body = Vec<Client>),
        (status = 403, response = ForbiddenResponse)
    )
)]
async fn list_clients<R, C, E, P>(
    State(state): State<ApiState<R, C, E, P>>,
    identity: Identity,
) -> AgentResult<Json<Vec<Client>>>
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    identity
        .require_admin()
        .map_err(|_| AgentError::Forbidden("admin token required".to_string()))?;
    let clients = state.agents.list_clients().await?;
    Ok(Json(clients))
}

/// Create a tenant; the bearer token is returned exactly once
#[utoipa::path(
    post,
    path = "/clients",
    tag = "admin",
    request_body = NewClient,
    responses(
        (status = 201, description = "Tenant created; token shown once", body = Client),
        (status = 403, response = ForbiddenResponse)
    )
)]
async fn create_client<R, C, E, P>(
    State(state): State<ApiState<R, C, E, P>>,
    identity: Identity,
    ValidatedJson(input): ValidatedJson<NewClient>,
) -> AgentResult<impl IntoResponse>
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    identity
        .require_admin()
        .map_err(|_| AgentError::Forbidden("admin token required".to_string()))?;

    let (client, token) = state.agents.create_client(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "client": client,
            "token": token,
        })),
    ))
}

/// Fleet-wide agent browsing
#[utoipa::path(
    get,
    path = "/agents",
    tag = "admin",
    params(AgentFilter),
    responses(
        (status = 200, description = "Agents across all tenants", body = Vec<Agent>),
        (status = 403, response = ForbiddenResponse)
    )
)]
async fn list_all_agents<R, C, E, P>(
    State(state): State<ApiState<R, C, E, P>>,
    identity: Identity,
    Query(filter): Query<AgentFilter>,
) -> AgentResult<Json<Vec<Agent>>>
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    identity
        .require_admin()
        .map_err(|_| AgentError::Forbidden("admin token required".to_string()))?;
    let agents = state.agents.list_agents(None, filter).await?;
    Ok(Json(agents))
}

/// Fleet-wide switch browsing
#[utoipa::path(
    get,
    path = "/switches",
    tag = "admin",
    params(SwitchFilter),
    responses(
        (status = 200, description = "Switches across all tenants", body = Vec<Switch>),
        (status = 403, response = ForbiddenResponse)
    )
)]
async fn list_all_switches<R, C, E, P>(
    State(state): State<ApiState<R, C, E, P>>,
    identity: Identity,
    Query(filter): Query<SwitchFilter>,
) -> AgentResult<Json<Vec<Switch>>>
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    identity
        .require_admin()
        .map_err(|_| AgentError::Forbidden("admin token required".to_string()))?;
    let switches = state.agents.repository().list_switches(None, filter).await?;
    Ok(Json(switches))
}

/// Clear the error flag set by repeated emergency failures
#[utoipa::path(
    post,
    path = "/agents/{id}/clear-error",
    tag = "admin",
    params(("id" = Uuid, Path, description = "Agent ID")),
    responses(
        (status = 200, description = "Error flag cleared", body = Agent),
        (status = 403, response = ForbiddenResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn clear_agent_error<R, C, E, P>(
    State(state): State<ApiState<R, C, E, P>>,
    identity: Identity,
    UuidPath(agent_id): UuidPath,
) -> AgentResult<Json<Agent>>
where
    R: AgentRepository + 'static,
    C: CommandRepository + 'static,
    E: EventRepository + 'static,
    P: PricingRepository + 'static,
{
    identity
        .require_admin()
        .map_err(|_| AgentError::Forbidden("admin token required".to_string()))?;
    let agent = state.agents.clear_error(agent_id).await?;
    Ok(Json(agent))
}
