//! Handler tests for the event bus routers.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum_helpers::{AuthRole, Identity};
use http_body_util::BodyExt;
use test_utils::TestDatabase;
use tower::ServiceExt; // For oneshot()
use uuid::Uuid;

use domain_events::{
    EventBus, EventRepository, EventSeverity, PgEventRepository, RecordSystemEvent, event_types,
    handlers,
};

#[tokio::test]
async fn test_stream_handler_rejects_missing_identity() {
    let db = TestDatabase::new().await;
    let app = handlers::router(EventBus::new(PgEventRepository::new(db.connection())));

    // No identity extension: the request never passed the auth middleware
    let response = app
        .oneshot(Request::builder().uri("/stream").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_audit_handler_lists_entries_newest_first() {
    let db = TestDatabase::new().await;
    let repo = PgEventRepository::new(db.connection());
    let agent_id = Uuid::now_v7();

    repo.append_system_event(
        RecordSystemEvent::new(event_types::AGENT_ONLINE, EventSeverity::Info).agent(agent_id),
    )
    .await
    .unwrap();
    repo.append_system_event(
        RecordSystemEvent::new(event_types::REBALANCE_NOTICE, EventSeverity::Warning)
            .agent(agent_id),
    )
    .await
    .unwrap();

    let app = handlers::audit_router(EventBus::new(repo));

    let mut request = Request::builder()
        .uri("/?severity=warning")
        .body(Body::empty())
        .unwrap();
    request.extensions_mut().insert(Identity {
        client_id: None,
        role: AuthRole::Admin,
    });

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let entries: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(entries.as_array().unwrap().len(), 1);
    assert_eq!(entries[0]["event_type"], "REBALANCE_NOTICE");
    assert_eq!(entries[0]["severity"], "warning");
}
