//! Handler tests for the pricing read surface: routes, query parameters,
//! and status codes through the actual router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use test_utils::TestDatabase;
use tower::ServiceExt; // For oneshot()
use uuid::Uuid;

use domain_pricing::{
    PgPricingRepository, PoolKey, PricingRepository, PricingService, handlers,
};

async fn json_body(body: Body) -> serde_json::Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_list_pools_handler_filters_by_region() {
    let db = TestDatabase::new().await;
    let repo = PgPricingRepository::new(db.connection());

    repo.upsert_pool(PoolKey::new("c5.large", "us-east-1", "us-east-1a"))
        .await
        .unwrap();
    repo.upsert_pool(PoolKey::new("c5.large", "eu-west-1", "eu-west-1a"))
        .await
        .unwrap();

    let app = handlers::router(PricingService::new(repo));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/pools?region=us-east-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let pools = json_body(response.into_body()).await;
    assert_eq!(pools.as_array().unwrap().len(), 1);
    assert_eq!(pools[0]["az"], "us-east-1a");

    // Unfiltered listing sees both regions
    let all = app
        .oneshot(Request::builder().uri("/pools").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let pools = json_body(all.into_body()).await;
    assert_eq!(pools.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_history_handler_unknown_pool_is_404() {
    let db = TestDatabase::new().await;
    let app = handlers::router(PricingService::new(PgPricingRepository::new(db.connection())));

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/{}/history", Uuid::now_v7()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_history_handler_rejects_invalid_uuid() {
    let db = TestDatabase::new().await;
    let app = handlers::router(PricingService::new(PgPricingRepository::new(db.connection())));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/not-a-uuid/history")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
