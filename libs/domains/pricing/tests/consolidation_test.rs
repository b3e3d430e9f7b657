//! Three-tier pipeline integration test: staging with duplicates and gaps
//! consolidates to exactly one row per bucket, interpolated points are
//! flagged, and the canonical tier mirrors the series.

use chrono::{DateTime, Duration, DurationRound, Utc};
use domain_pricing::models::NewSnapshot;
use domain_pricing::{
    Consolidator, PgPricingRepository, PoolKey, PriceSource, PricingRepository, SourceRole,
};
use std::sync::Arc;
use test_utils::{TestDatabase, TestDataBuilder};

fn minute(base: DateTime<Utc>, offset_minutes: i64) -> DateTime<Utc> {
    base + Duration::minutes(offset_minutes)
}

#[tokio::test]
async fn test_consolidation_round_trip_with_duplicates_and_gaps() {
    let db = TestDatabase::new().await;
    let repo = Arc::new(PgPricingRepository::new(db.connection()));
    let builder = TestDataBuilder::from_test_name("consolidation_round_trip");

    let pool = repo
        .upsert_pool(PoolKey::new("c5.large", "us-east-1", "us-east-1a"))
        .await
        .unwrap();

    // t0 at a minute boundary, one hour in the past so the default window
    // covers the series
    let t0 = (Utc::now() - Duration::hours(1))
        .duration_trunc(Duration::minutes(1))
        .unwrap();

    // Three agents over-report the same bucket, then silence, then one report
    let snapshots = vec![
        snapshot(&builder, pool.id, minute(t0, 0), 0.032, "a"),
        snapshot(&builder, pool.id, minute(t0, 0), 0.033, "b"),
        snapshot(&builder, pool.id, minute(t0, 0), 0.032, "c"),
        snapshot(&builder, pool.id, minute(t0, 15), 0.031, "a"),
    ];
    repo.insert_snapshots(snapshots).await.unwrap();

    let consolidator = Consolidator::new(repo.clone(), None);
    let counters = consolidator.run(None).await.unwrap();

    assert_eq!(counters.snapshots_processed, 4);
    assert_eq!(counters.duplicates_removed, 2);
    assert_eq!(counters.gaps_filled, 2);
    assert_eq!(counters.backfills_added, 0);

    // Exactly one consolidated row per (pool, bucket)
    let consolidated = repo
        .consolidated_for_pool(pool.id, t0 - Duration::minutes(1), minute(t0, 16))
        .await
        .unwrap();
    assert_eq!(consolidated.len(), 4);

    let p0 = &consolidated[0];
    assert_eq!(p0.observed_at, minute(t0, 0));
    assert!((p0.price - 0.032).abs() < 1e-9, "median of duplicates");
    assert_eq!(p0.source_count, 3);
    assert!(!p0.is_interpolated);

    // The two filled points are flagged and linear between the neighbors
    let p1 = &consolidated[1];
    assert_eq!(p1.observed_at, minute(t0, 5));
    assert!(p1.is_interpolated);
    assert_eq!(p1.data_source, PriceSource::Interpolated);
    assert!((p1.price - (0.032 - 0.001 / 3.0)).abs() < 1e-9);

    let p2 = &consolidated[2];
    assert_eq!(p2.observed_at, minute(t0, 10));
    assert!(p2.is_interpolated);
    assert!((p2.price - (0.032 - 0.002 / 3.0)).abs() < 1e-9);

    let p3 = &consolidated[3];
    assert_eq!(p3.observed_at, minute(t0, 15));
    assert!((p3.price - 0.031).abs() < 1e-9);
    assert!(!p3.is_interpolated);

    // Canonical mirrors the same four points
    let canonical = repo
        .canonical_history(pool.id, t0 - Duration::minutes(1), minute(t0, 16))
        .await
        .unwrap();
    assert_eq!(canonical.len(), 4);
    for (c, k) in consolidated.iter().zip(canonical.iter()) {
        assert_eq!(c.observed_at, k.observed_at);
        assert!((c.price - k.price).abs() < 1e-12);
    }
    // Corroborated agent data is the most trusted
    assert!(canonical[0].confidence_score > canonical[1].confidence_score);

    // Losers of the dedup are flagged in staging and excluded from the next
    // window's input
    let remaining = repo
        .snapshots_in_window(t0 - Duration::minutes(1), minute(t0, 16))
        .await
        .unwrap();
    assert_eq!(remaining.len(), 2);
}

#[tokio::test]
async fn test_reconsolidation_is_idempotent_on_the_bucket_key() {
    let db = TestDatabase::new().await;
    let repo = Arc::new(PgPricingRepository::new(db.connection()));
    let builder = TestDataBuilder::from_test_name("reconsolidation");

    let pool = repo
        .upsert_pool(PoolKey::new("c5.large", "us-east-1", "us-east-1b"))
        .await
        .unwrap();

    let t0 = (Utc::now() - Duration::minutes(30))
        .duration_trunc(Duration::minutes(1))
        .unwrap();

    repo.insert_snapshots(vec![snapshot(&builder, pool.id, t0, 0.040, "a")])
        .await
        .unwrap();

    let consolidator = Consolidator::new(repo.clone(), None);
    consolidator.run(None).await.unwrap();

    // Re-writing the same bucket replaces the representative instead of
    // violating the unique key
    repo.upsert_consolidated(vec![domain_pricing::models::NewConsolidatedPrice {
        pool_id: pool.id,
        observed_at: t0,
        price: 0.042,
        is_interpolated: false,
        source_count: 2,
        data_source: PriceSource::Agent,
    }])
    .await
    .unwrap();

    let consolidated = repo
        .consolidated_for_pool(pool.id, t0 - Duration::minutes(1), t0 + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(consolidated.len(), 1, "unique on (pool, observed_at)");
    assert!((consolidated[0].price - 0.042).abs() < 1e-9);
    assert_eq!(consolidated[0].source_count, 2);
}

fn snapshot(
    builder: &TestDataBuilder,
    pool_id: uuid::Uuid,
    observed_at: DateTime<Utc>,
    price: f64,
    source: &str,
) -> NewSnapshot {
    NewSnapshot {
        pool_id,
        price,
        observed_at,
        source_instance_id: Some(builder.instance_id(source)),
        source_role: Some(SourceRole::Primary),
    }
}
