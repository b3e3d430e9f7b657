//! Handler tests for the fleet API
//!
//! These drive the actual axum routers (routes, extractors, status codes)
//! with `oneshot`, backed by a real database. The bearer-auth middleware is
//! an app-level layer, so tests inject the resolved [`Identity`] as a
//! request extension the way the middleware would.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum_helpers::{AuthRole, Identity};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::json;
use std::sync::Arc;
use test_utils::{TestDatabase, TestDataBuilder};
use tower::ServiceExt; // For oneshot()
use uuid::Uuid;

use domain_agents::handlers::{self, FleetApi};
use domain_agents::{
    AgentRepository, AgentService, Client, ClientPlan, PgAgentRepository, SwitchingService,
};
use domain_commands::{CommandQueue, PgCommandRepository};
use domain_events::{EventBus, PgEventRepository};
use domain_pricing::{PgPricingRepository, PricingService};

type Fleet =
    FleetApi<PgAgentRepository, PgCommandRepository, PgEventRepository, PgPricingRepository>;

fn fleet_state(db: &TestDatabase) -> Arc<Fleet> {
    let agent_repository = Arc::new(PgAgentRepository::new(db.connection()));
    let events = EventBus::new(PgEventRepository::new(db.connection()));
    let commands = CommandQueue::new(PgCommandRepository::new(db.connection()), events.clone());
    let pricing = PricingService::new(PgPricingRepository::new(db.connection()));

    let agents = AgentService::new(agent_repository.clone(), events.clone(), pricing.clone());
    let switching = SwitchingService::new(agent_repository, commands.clone(), events, pricing.clone());

    Arc::new(Fleet {
        agents,
        switching,
        commands,
        pricing,
    })
}

async fn seed_client(db: &TestDatabase, builder: &TestDataBuilder) -> Client {
    let repo = PgAgentRepository::new(db.connection());
    repo.insert_client(Client {
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
    .expect("client insert")
}

fn identity_for(client: &Client) -> Identity {
    Identity {
        client_id: Some(client.id),
        role: AuthRole::Client,
    }
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn authed(mut request: Request<Body>, identity: &Identity) -> Request<Body> {
    request.extensions_mut().insert(identity.clone());
    request
}

async fn json_body(body: Body) -> serde_json::Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn register_body(builder: &TestDataBuilder) -> serde_json::Value {
    json!({
        "logicalAgentId": builder.name("agent", "L1"),
        "instanceId": builder.instance_id("a"),
        "instanceType": "c5.large",
        "region": "us-east-1",
        "az": "us-east-1a",
        "mode": "spot"
    })
}

async fn register_agent(app: &Router, builder: &TestDataBuilder, identity: &Identity) -> Uuid {
    let response = app
        .clone()
        .oneshot(authed(
            json_request("POST", "/register", register_body(builder)),
            identity,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response.into_body()).await;
    body["agentId"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_register_handler_returns_agent_and_policy() {
    let db = TestDatabase::new().await;
    let state = fleet_state(&db);
    let app = handlers::agent_router(state);

    let builder = TestDataBuilder::from_test_name("handler_register");
    let client = seed_client(&db, &builder).await;
    let identity = identity_for(&client);

    let response = app
        .oneshot(authed(
            json_request("POST", "/register", register_body(&builder)),
            &identity,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response.into_body()).await;
    assert!(body["agentId"].as_str().is_some());
    // The tenant's default policy comes back to the agent
    assert_eq!(body["policy"]["autoSwitchEnabled"], json!(true));
    assert_eq!(body["policy"]["manualReplicaEnabled"], json!(false));
}

#[tokio::test]
async fn test_register_handler_validates_input() {
    let db = TestDatabase::new().await;
    let state = fleet_state(&db);
    let app = handlers::agent_router(state);

    let builder = TestDataBuilder::from_test_name("handler_register_invalid");
    let client = seed_client(&db, &builder).await;

    // Empty logicalAgentId fails validation before any state is touched
    let mut body = register_body(&builder);
    body["logicalAgentId"] = json!("");

    let response = app
        .oneshot(authed(
            json_request("POST", "/register", body),
            &identity_for(&client),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_handler_rejects_missing_identity() {
    let db = TestDatabase::new().await;
    let state = fleet_state(&db);
    let app = handlers::agent_router(state);

    let builder = TestDataBuilder::from_test_name("handler_register_unauth");

    // No identity extension: the request never passed the auth middleware
    let response = app
        .oneshot(json_request("POST", "/register", register_body(&builder)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_heartbeat_handler_updates_liveness() {
    let db = TestDatabase::new().await;
    let state = fleet_state(&db);
    let app = handlers::agent_router(state);

    let builder = TestDataBuilder::from_test_name("handler_heartbeat");
    let client = seed_client(&db, &builder).await;
    let identity = identity_for(&client);
    let agent_id = register_agent(&app, &builder, &identity).await;

    let response = app
        .oneshot(authed(
            json_request(
                "POST",
                &format!("/{}/heartbeat", agent_id),
                json!({ "status": "online" }),
            ),
            &identity,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response.into_body()).await;
    assert!(!body["last_heartbeat"].is_null());
    assert_eq!(body["status"], json!("online"));
}

#[tokio::test]
async fn test_manual_switch_handler_duplicate_request_conflicts() {
    let db = TestDatabase::new().await;
    let state = fleet_state(&db);
    let agent_app = handlers::agent_router(state.clone());
    let client_app = handlers::client_router(state);

    let builder = TestDataBuilder::from_test_name("handler_manual_switch");
    let client = seed_client(&db, &builder).await;
    let identity = identity_for(&client);
    let agent_id = register_agent(&agent_app, &builder, &identity).await;

    let switch_request = || {
        let mut request = json_request(
            "POST",
            &format!("/agents/{}/switch", agent_id),
            json!({ "targetMode": "ondemand" }),
        );
        request
            .headers_mut()
            .insert("X-Request-ID", "R-handler-1".parse().unwrap());
        authed(request, &identity)
    };

    // First submission is accepted and enqueued
    let first = client_app.clone().oneshot(switch_request()).await.unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);
    let first_body = json_body(first.into_body()).await;
    assert_eq!(first_body["status"], json!("pending"));

    // Same idempotency key while the command is in flight: 409, no new row
    let second = client_app.clone().oneshot(switch_request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let second_body = json_body(second.into_body()).await;
    assert_eq!(second_body["error"], json!("DUPLICATE_REQUEST"));
}

#[tokio::test]
async fn test_manual_switch_handler_requires_request_id() {
    let db = TestDatabase::new().await;
    let state = fleet_state(&db);
    let agent_app = handlers::agent_router(state.clone());
    let client_app = handlers::client_router(state);

    let builder = TestDataBuilder::from_test_name("handler_switch_no_key");
    let client = seed_client(&db, &builder).await;
    let identity = identity_for(&client);
    let agent_id = register_agent(&agent_app, &builder, &identity).await;

    // Neither an X-Request-ID header nor a requestId body field
    let response = client_app
        .oneshot(authed(
            json_request(
                "POST",
                &format!("/agents/{}/switch", agent_id),
                json!({ "targetMode": "spot" }),
            ),
            &identity,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pending_commands_handler_is_tenant_scoped() {
    let db = TestDatabase::new().await;
    let state = fleet_state(&db);
    let app = handlers::agent_router(state);

    let builder = TestDataBuilder::from_test_name("handler_tenancy");
    let client = seed_client(&db, &builder).await;
    let identity = identity_for(&client);
    let agent_id = register_agent(&app, &builder, &identity).await;

    // A different tenant polling this agent's queue is rejected
    let repo = PgAgentRepository::new(db.connection());
    let other_client = repo
        .insert_client(Client {
            id: Uuid::now_v7(),
            name: builder.name("client", "other"),
            auth_token_hash: format!("{:064x}", Uuid::now_v7().as_u128()),
            plan: ClientPlan::Free,
            max_agents: 10,
            default_auto_switch_enabled: true,
            default_manual_replica_enabled: false,
            default_auto_terminate: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

    let request = Request::builder()
        .method("GET")
        .uri(format!("/{}/pending-commands", agent_id))
        .body(Body::empty())
        .unwrap();

    let response = app
        .oneshot(authed(request, &identity_for(&other_client)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
