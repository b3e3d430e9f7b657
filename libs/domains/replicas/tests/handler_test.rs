//! Handler tests for the notice and replica work-order routes, driven
//! through the actual router with an injected identity.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum_helpers::{AuthRole, Identity};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::json;
use std::sync::Arc;
use test_utils::{TestDatabase, TestDataBuilder};
use tower::ServiceExt; // For oneshot()

use domain_agents::repository::{AgentContext, NewAgent, PolicyFields};
use domain_agents::{
    Agent, AgentMode, AgentRepository, AgentService, AgentStatus, Client, ClientPlan,
    PgAgentRepository,
};
use domain_commands::{CommandQueue, PgCommandRepository};
use domain_events::{EventBus, PgEventRepository};
use domain_pricing::{PgPricingRepository, PoolKey, PricingRepository, PricingService};
use domain_replicas::emergency::{EmergencyConfig, EmergencyOrchestrator};
use domain_replicas::handlers::{self, ReplicasApi};
use domain_replicas::{PgReplicaRepository, ReplicaService};

type State = ReplicasApi<
    PgReplicaRepository,
    PgAgentRepository,
    PgCommandRepository,
    PgEventRepository,
    PgPricingRepository,
>;

fn replicas_state(db: &TestDatabase) -> Arc<State> {
    let agent_repository = Arc::new(PgAgentRepository::new(db.connection()));
    let events = EventBus::new(PgEventRepository::new(db.connection()));
    let commands = CommandQueue::new(PgCommandRepository::new(db.connection()), events.clone());
    let pricing = PricingService::new(PgPricingRepository::new(db.connection()));

    let agents = AgentService::new(agent_repository.clone(), events.clone(), pricing.clone());
    let replicas = ReplicaService::new(
        Arc::new(PgReplicaRepository::new(db.connection())),
        commands.clone(),
        events.clone(),
    );
    let orchestrator = EmergencyOrchestrator::new(
        replicas.clone(),
        agent_repository,
        commands,
        events,
        pricing,
        EmergencyConfig::default(),
    );

    Arc::new(ReplicasApi {
        orchestrator,
        replicas,
        agents,
    })
}

async fn seed_agent_with_pool(db: &TestDatabase, builder: &TestDataBuilder) -> (Client, Agent) {
    let repo = PgAgentRepository::new(db.connection());

    let client = repo
        .insert_client(Client {
            id: builder.client_id(),
            name: builder.name("client", "main"),
            auth_token_hash: format!("{:064x}", builder.client_id().as_u128()),
            plan: ClientPlan::Pro,
            max_agents: 100,
            default_auto_switch_enabled: true,
            default_manual_replica_enabled: false,
            default_auto_terminate: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await
        .expect("client insert");

    let pool = PgPricingRepository::new(db.connection())
        .upsert_pool(PoolKey::new("c5.large", "us-east-1", "us-east-1a"))
        .await
        .expect("pool upsert");

    let agent = repo
        .insert_agent(NewAgent {
            client_id: client.id,
            logical_id: builder.name("agent", "L1"),
            region: "us-east-1".to_string(),
            az: "us-east-1a".to_string(),
            instance_type: "c5.large".to_string(),
            mode: AgentMode::Spot,
            policy: PolicyFields {
                auto_switch_enabled: true,
                manual_replica_enabled: false,
                auto_terminate: true,
                terminate_wait_seconds: None,
            },
            context: AgentContext {
                current_instance_id: Some(builder.instance_id("a")),
                current_pool_id: Some(pool.id),
                ..Default::default()
            },
        })
        .await
        .expect("agent insert");

    let agent = repo
        .update_heartbeat(agent.id, AgentStatus::Online, Utc::now(), AgentContext::default())
        .await
        .expect("heartbeat");

    (client, agent)
}

fn authed(mut request: Request<Body>, client: &Client) -> Request<Body> {
    request.extensions_mut().insert(Identity {
        client_id: Some(client.id),
        role: AuthRole::Client,
    });
    request
}

async fn json_body(body: Body) -> serde_json::Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_notice_handler_rejects_missing_identity() {
    let db = TestDatabase::new().await;
    let app = handlers::agent_router(replicas_state(&db));
    let builder = TestDataBuilder::from_test_name("notice_unauth");
    let (_, agent) = seed_agent_with_pool(&db, &builder).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/{}/rebalance-notice", agent.id))
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rebalance_notice_launches_emergency_replica() {
    let db = TestDatabase::new().await;
    let app = handlers::agent_router(replicas_state(&db));
    let builder = TestDataBuilder::from_test_name("notice_rebalance");
    let (client, agent) = seed_agent_with_pool(&db, &builder).await;

    // No replica exists and no boot statistics: the fallback is the current
    // pool, and an emergency launch work order appears
    let notice = Request::builder()
        .method("POST")
        .uri(format!("/{}/rebalance-notice", agent.id))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "noticeTime": Utc::now() }).to_string()))
        .unwrap();

    let response = app.clone().oneshot(authed(notice, &client)).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let list = Request::builder()
        .uri(format!("/{}/replicas?status=launching", agent.id))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(authed(list, &client)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let replicas = json_body(response.into_body()).await;
    assert_eq!(replicas.as_array().unwrap().len(), 1);
    assert_eq!(replicas[0]["kind"], "emergency");
    assert_eq!(replicas[0]["pool_id"], json!(agent.current_pool_id.unwrap()));
}

#[tokio::test]
async fn test_bind_and_status_work_orders() {
    let db = TestDatabase::new().await;
    let state = replicas_state(&db);
    let app = handlers::agent_router(state.clone());
    let builder = TestDataBuilder::from_test_name("replica_bind_status");
    let (client, agent) = seed_agent_with_pool(&db, &builder).await;

    // Seed a work order through the termination path
    let notice = Request::builder()
        .method("POST")
        .uri(format!("/{}/termination-notice", agent.id))
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.clone().oneshot(authed(notice, &client)).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let list = Request::builder()
        .uri(format!("/{}/replicas", agent.id))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(authed(list, &client)).await.unwrap();
    let replicas = json_body(response.into_body()).await;
    let replica_id = replicas[0]["id"].as_str().unwrap().to_string();

    // Bind the launched cloud instance
    let bind = Request::builder()
        .method("PUT")
        .uri(format!("/{}/replicas/{}", agent.id, replica_id))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "instanceId": builder.instance_id("r") }).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(authed(bind, &client)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bound = json_body(response.into_body()).await;
    assert!(!bound["launched_at"].is_null());

    // Report it syncing
    let status = Request::builder()
        .method("POST")
        .uri(format!("/{}/replicas/{}/status", agent.id, replica_id))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "status": "syncing", "syncLagSeconds": 3.5 }).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(authed(status, &client)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated = json_body(response.into_body()).await;
    assert_eq!(updated["status"], "syncing");
    assert_eq!(updated["sync_lag_seconds"], json!(3.5));
}
