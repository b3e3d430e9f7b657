//! Replica lifecycle against the real schema: create → bind → ready →
//! promoted, and the boot observations that feed fastest-pool selection.

use chrono::Utc;
use domain_agents::repository::{AgentContext, NewAgent, PolicyFields};
use domain_agents::{Agent, AgentMode, AgentRepository, Client, ClientPlan, PgAgentRepository};
use domain_pricing::{PgPricingRepository, PoolKey, PricingRepository};
use domain_replicas::repository::fastest_boot_pool;
use domain_replicas::{
    NewReplica, PgReplicaRepository, ReplicaKind, ReplicaRepository, ReplicaStatus,
};
use test_utils::{TestDatabase, TestDataBuilder};

async fn seed_agent(db: &TestDatabase, builder: &TestDataBuilder) -> Agent {
    let repo = PgAgentRepository::new(db.connection());

    let client = repo
        .insert_client(Client {
            id: builder.client_id(),
            name: builder.name("client", "main"),
            auth_token_hash: format!("{:064x}", builder.client_id().as_u128()),
            plan: ClientPlan::Pro,
            max_agents: 100,
            default_auto_switch_enabled: false,
            default_manual_replica_enabled: true,
            default_auto_terminate: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await
        .expect("client insert");

    repo.insert_agent(NewAgent {
        client_id: client.id,
        logical_id: builder.name("agent", "L1"),
        region: "us-east-1".to_string(),
        az: "us-east-1a".to_string(),
        instance_type: "c5.large".to_string(),
        mode: AgentMode::Spot,
        policy: PolicyFields {
            auto_switch_enabled: false,
            manual_replica_enabled: true,
            auto_terminate: true,
            terminate_wait_seconds: None,
        },
        context: AgentContext::default(),
    })
    .await
    .expect("agent insert")
}

#[tokio::test]
async fn test_replica_lifecycle_and_boot_observations() {
    let db = TestDatabase::new().await;
    let builder = TestDataBuilder::from_test_name("replica_lifecycle");
    let agent = seed_agent(&db, &builder).await;

    let pricing = PgPricingRepository::new(db.connection());
    let pool = pricing
        .upsert_pool(PoolKey::new("c5.large", "us-east-1", "us-east-1b"))
        .await
        .unwrap();

    let replicas = PgReplicaRepository::new(db.connection());

    let replica = replicas
        .insert(NewReplica {
            agent_id: agent.id,
            parent_instance_id: None,
            pool_id: pool.id,
            kind: ReplicaKind::Manual,
        })
        .await
        .unwrap();
    assert_eq!(replica.status, ReplicaStatus::Launching);
    assert!(replica.instance_id.is_none());

    // The agent binds the launched cloud instance, then reports progress
    let bound = replicas
        .bind_instance(replica.id, builder.instance_id("r"))
        .await
        .unwrap();
    assert!(bound.launched_at.is_some());

    let syncing = replicas
        .set_status(replica.id, ReplicaStatus::Syncing, Some(4.2))
        .await
        .unwrap();
    assert_eq!(syncing.status, ReplicaStatus::Syncing);
    assert_eq!(syncing.sync_lag_seconds, Some(4.2));

    let ready = replicas
        .set_status(replica.id, ReplicaStatus::Ready, Some(0.0))
        .await
        .unwrap();
    assert!(ready.ready_at.is_some());
    assert!(ready.boot_seconds().is_some());

    // Active set contains exactly this replica until promotion
    let active = replicas.active_for_agent(agent.id).await.unwrap();
    assert_eq!(active.len(), 1);

    let promoted = replicas
        .set_status(replica.id, ReplicaStatus::Promoted, None)
        .await
        .unwrap();
    assert!(promoted.promoted_at.is_some());

    let active_after = replicas.active_for_agent(agent.id).await.unwrap();
    assert!(active_after.is_empty());

    // Promoted replicas feed the boot statistics
    let observations = replicas.boot_observations(vec![pool.id]).await.unwrap();
    assert_eq!(observations.len(), 1);
    assert_eq!(observations[0].pool_id, pool.id);
    assert!(observations[0].boot_seconds >= 0.0);

    // One observation is below the minimum sample count
    assert_eq!(fastest_boot_pool(&observations, 3), None);
    assert_eq!(fastest_boot_pool(&observations, 1), Some(pool.id));
}

#[tokio::test]
async fn test_status_filter_for_work_orders() {
    let db = TestDatabase::new().await;
    let builder = TestDataBuilder::from_test_name("replica_work_orders");
    let agent = seed_agent(&db, &builder).await;

    let pricing = PgPricingRepository::new(db.connection());
    let pool = pricing
        .upsert_pool(PoolKey::new("c5.large", "us-east-1", "us-east-1c"))
        .await
        .unwrap();

    let replicas = PgReplicaRepository::new(db.connection());
    let a = replicas
        .insert(NewReplica {
            agent_id: agent.id,
            parent_instance_id: None,
            pool_id: pool.id,
            kind: ReplicaKind::Emergency,
        })
        .await
        .unwrap();
    let b = replicas
        .insert(NewReplica {
            agent_id: agent.id,
            parent_instance_id: None,
            pool_id: pool.id,
            kind: ReplicaKind::Manual,
        })
        .await
        .unwrap();
    replicas
        .set_status(b.id, ReplicaStatus::Terminated, None)
        .await
        .unwrap();

    let launching = replicas
        .for_agent(agent.id, Some(ReplicaStatus::Launching))
        .await
        .unwrap();
    assert_eq!(launching.len(), 1);
    assert_eq!(launching[0].id, a.id);

    let terminated = replicas
        .for_agent(agent.id, Some(ReplicaStatus::Terminated))
        .await
        .unwrap();
    assert_eq!(terminated.len(), 1);
    assert_eq!(terminated[0].id, b.id);

    let all = replicas.for_agent(agent.id, None).await.unwrap();
    assert_eq!(all.len(), 2);
}
