//! Lifecycle integration tests against a real PostgreSQL schema:
//! registration, atomic promotion, optimistic conflicts, zombie retention.

use chrono::{Duration, Utc};
use domain_agents::models::{NewInstance, NewSwitch};
use domain_agents::repository::{AgentContext, NewAgent, PolicyFields};
use domain_agents::{
    Agent, AgentError, AgentMode, AgentRepository, AgentStatus, Client, ClientPlan, InstanceRole,
    PgAgentRepository,
};
use std::sync::Arc;
use test_utils::{TestDatabase, TestDataBuilder};
use uuid::Uuid;

async fn seed_client(repo: &PgAgentRepository, builder: &TestDataBuilder) -> Client {
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

async fn seed_agent(repo: &PgAgentRepository, client: &Client, logical_id: &str) -> Agent {
    repo.insert_agent(NewAgent {
        client_id: client.id,
        logical_id: logical_id.to_string(),
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
        context: AgentContext::default(),
    })
    .await
    .expect("agent insert")
}

async fn seed_instance(
    repo: &PgAgentRepository,
    agent: &Agent,
    id: &str,
    role: InstanceRole,
) -> domain_agents::Instance {
    repo.insert_instance(NewInstance {
        id: id.to_string(),
        agent_id: agent.id,
        role,
        instance_type: "c5.large".to_string(),
        region: "us-east-1".to_string(),
        az: "us-east-1a".to_string(),
        pool_id: None,
        spot_price: Some(0.032),
        ondemand_price: Some(0.096),
        launch_requested_at: None,
        launch_confirmed_at: Some(Utc::now()),
    })
    .await
    .expect("instance insert")
}

#[tokio::test]
async fn test_register_then_heartbeat_touches_liveness_only() {
    let db = TestDatabase::new().await;
    let repo = PgAgentRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("register_heartbeat");

    let client = seed_client(&repo, &builder).await;
    let agent = seed_agent(&repo, &client, &builder.name("agent", "L1")).await;
    let instance = seed_instance(&repo, &agent, &builder.instance_id("a"), InstanceRole::RunningPrimary).await;

    assert_eq!(instance.version, 1);
    assert!(instance.is_primary());

    let updated = repo
        .update_heartbeat(
            agent.id,
            AgentStatus::Online,
            Utc::now(),
            AgentContext {
                current_instance_id: Some(instance.id.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.last_heartbeat.is_some());

    // Heartbeats never touch role fields
    let after = repo.instance_by_id(&instance.id).await.unwrap().unwrap();
    assert_eq!(after.role, InstanceRole::RunningPrimary);
    assert_eq!(after.version, 1);
}

#[tokio::test]
async fn test_promotion_demotes_old_primary_to_zombie() {
    let db = TestDatabase::new().await;
    let repo = PgAgentRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("promotion_demotes");

    let client = seed_client(&repo, &builder).await;
    let agent = seed_agent(&repo, &client, &builder.name("agent", "L1")).await;
    let old = seed_instance(&repo, &agent, &builder.instance_id("a"), InstanceRole::RunningPrimary).await;
    let new = seed_instance(&repo, &agent, &builder.instance_id("b"), InstanceRole::RunningReplica).await;

    let promoted = repo
        .promote_to_primary(&new.id, agent.id, new.version)
        .await
        .unwrap();
    assert_eq!(promoted.role, InstanceRole::RunningPrimary);

    let demoted = repo.instance_by_id(&old.id).await.unwrap().unwrap();
    assert_eq!(demoted.role, InstanceRole::Zombie);
    assert!(demoted.terminated_at.is_some());

    // Exactly one primary for the agent
    let primary = repo.primary_for_agent(agent.id).await.unwrap().unwrap();
    assert_eq!(primary.id, new.id);
}

#[tokio::test]
async fn test_promotion_with_stale_version_is_rejected_and_rolled_back() {
    let db = TestDatabase::new().await;
    let repo = PgAgentRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("promotion_stale");

    let client = seed_client(&repo, &builder).await;
    let agent = seed_agent(&repo, &client, &builder.name("agent", "L1")).await;
    let old = seed_instance(&repo, &agent, &builder.instance_id("a"), InstanceRole::RunningPrimary).await;
    let new = seed_instance(&repo, &agent, &builder.instance_id("b"), InstanceRole::RunningReplica).await;

    let result = repo
        .promote_to_primary(&new.id, agent.id, new.version + 7)
        .await;
    assert!(matches!(
        result,
        Err(AgentError::OptimisticConflict { .. })
    ));

    // The failed transaction left the prior primary in place
    let primary = repo.primary_for_agent(agent.id).await.unwrap().unwrap();
    assert_eq!(primary.id, old.id);
    assert_eq!(primary.role, InstanceRole::RunningPrimary);
}

#[tokio::test]
async fn test_concurrent_promotions_exactly_one_wins() {
    let db = TestDatabase::new().await;
    let repo = Arc::new(PgAgentRepository::new(db.connection()));
    let builder = TestDataBuilder::from_test_name("concurrent_promotions");

    let client = seed_client(&repo, &builder).await;
    let agent = seed_agent(&repo, &client, &builder.name("agent", "L1")).await;
    seed_instance(&repo, &agent, &builder.instance_id("a"), InstanceRole::RunningPrimary).await;
    let target =
        seed_instance(&repo, &agent, &builder.instance_id("b"), InstanceRole::RunningReplica).await;

    // Race N promotions of the same instance with the same expected version
    let mut handles = Vec::new();
    for _ in 0..4 {
        let repo = repo.clone();
        let target_id = target.id.clone();
        let agent_id = agent.id;
        let version = target.version;
        handles.push(tokio::spawn(async move {
            repo.promote_to_primary(&target_id, agent_id, version).await
        }));
    }

    let mut wins = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(AgentError::OptimisticConflict { .. }) => conflicts += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(wins, 1, "exactly one promotion must win");
    assert_eq!(conflicts, 3);

    // The invariant holds afterwards
    let instances = repo.instances_for_agent(agent.id).await.unwrap();
    let primaries = instances.iter().filter(|i| i.is_primary()).count();
    assert_eq!(primaries, 1);
}

#[tokio::test]
async fn test_zombie_retention_purges_only_old_zombies() {
    let db = TestDatabase::new().await;
    let repo = PgAgentRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("zombie_retention");

    let client = seed_client(&repo, &builder).await;
    let agent = seed_agent(&repo, &client, &builder.name("agent", "L1")).await;

    // An old zombie (demoted 31 days ago) and a fresh one
    let old = seed_instance(&repo, &agent, &builder.instance_id("old"), InstanceRole::RunningPrimary).await;
    repo.update_role(
        &old.id,
        InstanceRole::Zombie,
        old.version,
        Some(Utc::now() - Duration::days(31)),
    )
    .await
    .unwrap();

    let fresh = seed_instance(&repo, &agent, &builder.instance_id("fresh"), InstanceRole::RunningPrimary).await;
    repo.update_role(
        &fresh.id,
        InstanceRole::Zombie,
        fresh.version,
        Some(Utc::now()),
    )
    .await
    .unwrap();

    let purged = repo
        .purge_zombies(Utc::now() - Duration::days(30))
        .await
        .unwrap();
    assert_eq!(purged, 1);

    let old_after = repo.instance_by_id(&old.id).await.unwrap().unwrap();
    assert_eq!(old_after.role, InstanceRole::Terminated);

    // No zombie younger than retention is ever terminated
    let fresh_after = repo.instance_by_id(&fresh.id).await.unwrap().unwrap();
    assert_eq!(fresh_after.role, InstanceRole::Zombie);
}

#[tokio::test]
async fn test_policy_update_is_optimistic_and_exclusive() {
    let db = TestDatabase::new().await;
    let repo = PgAgentRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("policy_optimistic");

    let client = seed_client(&repo, &builder).await;
    let agent = seed_agent(&repo, &client, &builder.name("agent", "L1")).await;

    // Both toggles on is rejected before touching the database
    let result = repo
        .update_policy(
            agent.id,
            PolicyFields {
                auto_switch_enabled: true,
                manual_replica_enabled: true,
                auto_terminate: true,
                terminate_wait_seconds: None,
            },
            agent.version,
        )
        .await;
    assert!(matches!(result, Err(AgentError::InvariantViolation(_))));

    // A valid flip succeeds and bumps the version
    let updated = repo
        .update_policy(
            agent.id,
            PolicyFields {
                auto_switch_enabled: false,
                manual_replica_enabled: true,
                auto_terminate: true,
                terminate_wait_seconds: Some(0),
            },
            agent.version,
        )
        .await
        .unwrap();
    assert!(updated.manual_replica_enabled);
    assert_eq!(updated.version, agent.version + 1);

    // Re-using the stale version conflicts
    let stale = repo
        .update_policy(
            agent.id,
            PolicyFields {
                auto_switch_enabled: true,
                manual_replica_enabled: false,
                auto_terminate: true,
                terminate_wait_seconds: None,
            },
            agent.version,
        )
        .await;
    assert!(matches!(stale, Err(AgentError::OptimisticConflict { .. })));
}

#[tokio::test]
async fn test_switch_history_round_trip() {
    let db = TestDatabase::new().await;
    let repo = PgAgentRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("switch_history");

    let client = seed_client(&repo, &builder).await;
    let agent = seed_agent(&repo, &client, &builder.name("agent", "L1")).await;
    seed_instance(&repo, &agent, &builder.instance_id("a"), InstanceRole::RunningPrimary).await;

    let recorded = repo
        .insert_switch(NewSwitch {
            agent_id: agent.id,
            command_id: None,
            request_id: "R1".to_string(),
            old_instance_id: builder.instance_id("a"),
            new_instance_id: builder.instance_id("b"),
            old_mode: AgentMode::Ondemand,
            new_mode: AgentMode::Spot,
            trigger: domain_commands::CommandTrigger::Manual,
            on_demand_price: Some(0.096),
            old_spot_price: None,
            new_spot_price: Some(0.031),
            downtime_seconds: Some(41.5),
            initiated_at: Utc::now() - Duration::seconds(60),
            completed_at: Utc::now(),
            old_terminated_at: None,
        })
        .await
        .unwrap();

    let listed = repo
        .list_switches(Some(client.id), domain_agents::SwitchFilter::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, recorded.id);
    assert_eq!(listed[0].new_mode, AgentMode::Spot);

    // Another tenant sees nothing
    let other = repo
        .list_switches(Some(Uuid::now_v7()), domain_agents::SwitchFilter::default())
        .await
        .unwrap();
    assert!(other.is_empty());
}
