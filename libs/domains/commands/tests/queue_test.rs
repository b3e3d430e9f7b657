//! Command queue integration tests: priority-then-FIFO ordering, request-id
//! idempotency, terminal-state protection, and the admin browsing handler.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use tower::ServiceExt; // For oneshot()
use domain_agents::repository::{AgentContext, NewAgent, PolicyFields};
use domain_agents::{Agent, AgentMode, AgentRepository, Client, ClientPlan, PgAgentRepository};
use domain_commands::{
    CommandError, CommandPayload, CommandQueue, CommandStatus, CommandTrigger, ExecutionResult,
    NewCommand, PgCommandRepository, TargetMode, priority,
};
use domain_events::{EventBus, PgEventRepository};
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
            default_auto_switch_enabled: true,
            default_manual_replica_enabled: false,
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

fn queue(db: &TestDatabase) -> CommandQueue<PgCommandRepository, PgEventRepository> {
    CommandQueue::new(
        PgCommandRepository::new(db.connection()),
        EventBus::new(PgEventRepository::new(db.connection())),
    )
}

fn switch_command(agent: &Agent, request_id: &str, prio: i16) -> NewCommand {
    NewCommand::new(
        agent.id,
        request_id,
        CommandPayload::Switch {
            target_mode: TargetMode::Spot,
            target_pool_id: None,
        },
    )
    .priority(prio)
    .trigger(CommandTrigger::Manual)
}

#[tokio::test]
async fn test_priority_then_fifo_ordering() {
    let db = TestDatabase::new().await;
    let builder = TestDataBuilder::from_test_name("queue_ordering");
    let agent = seed_agent(&db, &builder).await;
    let queue = queue(&db);

    // Enqueued low, emergency, manual, then a second emergency
    for (request_id, prio) in [
        ("O1", priority::SCHEDULED),
        ("O2", priority::EMERGENCY),
        ("O3", priority::MANUAL),
        ("O4", priority::EMERGENCY),
    ] {
        queue
            .enqueue(agent.client_id, switch_command(&agent, request_id, prio))
            .await
            .unwrap();
    }

    let served = queue.take_for_agent(agent.id).await.unwrap();
    let order: Vec<&str> = served.iter().map(|c| c.request_id.as_str()).collect();

    // Priority DESC, ties FIFO by created_at
    assert_eq!(order, vec!["O2", "O4", "O3", "O1"]);

    // A second poll sees the same order; delivery does not lock
    let again = queue.take_for_agent(agent.id).await.unwrap();
    let order_again: Vec<&str> = again.iter().map(|c| c.request_id.as_str()).collect();
    assert_eq!(order_again, order);
    assert!(again.iter().all(|c| c.status == CommandStatus::Executing));
}

#[tokio::test]
async fn test_duplicate_request_conflicts_until_completion_then_replays() {
    let db = TestDatabase::new().await;
    let builder = TestDataBuilder::from_test_name("queue_idempotency");
    let agent = seed_agent(&db, &builder).await;
    let queue = queue(&db);

    // First submission creates the command
    let first = queue
        .enqueue(agent.client_id, switch_command(&agent, "R2", priority::MANUAL))
        .await
        .unwrap();
    assert!(!first.is_replay());
    let command_id = first.command().id;

    // Second submission while pending: 409, no new row
    let duplicate = queue
        .enqueue(agent.client_id, switch_command(&agent, "R2", priority::MANUAL))
        .await;
    assert!(matches!(
        duplicate,
        Err(CommandError::DuplicateRequest { .. })
    ));

    // Complete the original
    queue
        .report_executed(
            agent.client_id,
            command_id,
            ExecutionResult {
                success: true,
                message: Some("done".to_string()),
            },
        )
        .await
        .unwrap();

    // Third submission replays the original result without a new execution
    let replay = queue
        .enqueue(agent.client_id, switch_command(&agent, "R2", priority::MANUAL))
        .await
        .unwrap();
    assert!(replay.is_replay());
    assert_eq!(replay.command().id, command_id);
    assert_eq!(replay.command().status, CommandStatus::Completed);
    assert!(replay.command().result.is_some());
}

#[tokio::test]
async fn test_terminal_commands_are_never_mutated() {
    let db = TestDatabase::new().await;
    let builder = TestDataBuilder::from_test_name("queue_terminal");
    let agent = seed_agent(&db, &builder).await;
    let queue = queue(&db);

    let outcome = queue
        .enqueue(agent.client_id, switch_command(&agent, "T1", priority::MANUAL))
        .await
        .unwrap();
    let command_id = outcome.command().id;

    queue
        .report_executed(
            agent.client_id,
            command_id,
            ExecutionResult {
                success: false,
                message: Some("boom".to_string()),
            },
        )
        .await
        .unwrap();

    // A second report against the failed command is rejected
    let again = queue
        .report_executed(
            agent.client_id,
            command_id,
            ExecutionResult {
                success: true,
                message: None,
            },
        )
        .await;
    assert!(matches!(again, Err(CommandError::TerminalState(_))));

    let stored = queue.get(command_id).await.unwrap();
    assert_eq!(stored.status, CommandStatus::Failed);
}

#[tokio::test]
async fn test_terminal_commands_leave_the_poll_queue() {
    let db = TestDatabase::new().await;
    let builder = TestDataBuilder::from_test_name("queue_drain");
    let agent = seed_agent(&db, &builder).await;
    let queue = queue(&db);

    let outcome = queue
        .enqueue(agent.client_id, switch_command(&agent, "D1", priority::MANUAL))
        .await
        .unwrap();

    queue
        .report_executed(
            agent.client_id,
            outcome.command().id,
            ExecutionResult {
                success: true,
                message: None,
            },
        )
        .await
        .unwrap();

    let served = queue.take_for_agent(agent.id).await.unwrap();
    assert!(served.is_empty());
}

#[tokio::test]
async fn test_admin_handler_browses_commands_with_filters() {
    let db = TestDatabase::new().await;
    let builder = TestDataBuilder::from_test_name("queue_admin_handler");
    let agent = seed_agent(&db, &builder).await;

    let queue_for_seed = queue(&db);
    queue_for_seed
        .enqueue(agent.client_id, switch_command(&agent, "A1", priority::MANUAL))
        .await
        .unwrap();
    queue_for_seed
        .enqueue(
            agent.client_id,
            switch_command(&agent, "A2", priority::EMERGENCY),
        )
        .await
        .unwrap();

    // Admin enforcement is an app-level layer; the router itself just browses
    let app = domain_commands::handlers::admin_router(queue(&db));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/?agent_id={}", agent.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let commands: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(commands.as_array().unwrap().len(), 2);

    // Kind and status filters narrow the listing
    let response = app
        .oneshot(
            Request::builder()
                .uri("/?status=pending&kind=switch&limit=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let commands: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(commands.as_array().unwrap().len(), 1);
    assert_eq!(commands[0]["status"], "pending");
}
