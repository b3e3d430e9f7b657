//! Replica coordinator: a single-flight periodic pass enforcing each agent's
//! replica policy.
//!
//! `auto_switch_enabled` agents get no standing replica (the orchestrator
//! creates emergency ones). `manual_replica_enabled` agents keep exactly one
//! active replica in the cheapest fresh pool; an existing replica whose pool
//! has drifted above the price margin is logged, never torn down.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use domain_agents::{Agent, AgentRepository};
use domain_commands::{CommandRepository, CommandTrigger, priority};
use domain_events::{EventBus, EventRepository, EventSeverity, event_types};
use domain_pricing::{PricingRepository, PricingService};

use crate::error::ReplicaResult;
use crate::models::ReplicaKind;
use crate::repository::ReplicaRepository;
use crate::service::ReplicaService;

/// Periodic replica policy enforcement
pub struct ReplicaCoordinator<Q, A, C, E, P>
where
    Q: ReplicaRepository,
    A: AgentRepository,
    C: CommandRepository,
    E: EventRepository,
    P: PricingRepository,
{
    replicas: ReplicaService<Q, C, E>,
    agents: Arc<A>,
    events: EventBus<E>,
    pricing: PricingService<P>,
    /// Replica pool more than this far above the cheapest is logged
    price_margin_percent: u32,
    interval: Duration,
}

impl<Q, A, C, E, P> ReplicaCoordinator<Q, A, C, E, P>
where
    Q: ReplicaRepository,
    A: AgentRepository,
    C: CommandRepository,
    E: EventRepository,
    P: PricingRepository,
{
    pub fn new(
        replicas: ReplicaService<Q, C, E>,
        agents: Arc<A>,
        events: EventBus<E>,
        pricing: PricingService<P>,
        price_margin_percent: u32,
        interval: Duration,
    ) -> Self {
        Self {
            replicas,
            agents,
            events,
            pricing,
            price_margin_percent,
            interval,
        }
    }

    /// The coordinator loop. At most one pass is in flight at any time: the
    /// next tick waits for the previous pass to finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(interval = ?self.interval, "Replica coordinator started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        warn!("Coordinator pass failed: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Replica coordinator stopping");
                        return;
                    }
                }
            }
        }
    }

    /// One coordinator pass; returns how many replicas were created.
    pub async fn run_once(&self) -> ReplicaResult<usize> {
        let agents = self.agents.agents_with_replica_policy().await?;
        let mut created = 0;

        for agent in agents {
            match self.reconcile_agent(&agent).await {
                Ok(true) => created += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(agent_id = %agent.id, "Replica reconciliation failed: {}", e);
                }
            }
        }

        Ok(created)
    }

    /// Enforce the policy for one agent. Returns true if a replica was
    /// created.
    async fn reconcile_agent(&self, agent: &Agent) -> ReplicaResult<bool> {
        let instance_type = match &agent.instance_type {
            Some(instance_type) => instance_type.clone(),
            None => {
                debug!(agent_id = %agent.id, "No instance type yet; skipping");
                return Ok(false);
            }
        };

        let active = self.replicas.active_for_agent(agent.id).await?;

        if active.is_empty() {
            let cheapest = self
                .pricing
                .cheapest_pool(&instance_type, &agent.region, agent.current_pool_id)
                .await?;

            let Some((pool, price)) = cheapest else {
                debug!(agent_id = %agent.id, "No fresh price for any other pool; skipping");
                return Ok(false);
            };

            info!(
                agent_id = %agent.id,
                pool_id = %pool.id,
                price = price.price,
                "Creating standing replica in cheapest pool"
            );
            self.replicas
                .create_replica(
                    agent.client_id,
                    agent,
                    pool.id,
                    ReplicaKind::Manual,
                    priority::SCHEDULED,
                    CommandTrigger::Scheduled,
                )
                .await?;
            return Ok(true);
        }

        // A replica exists: check price drift, log only. Recreation happens
        // after promotion or termination, never by teardown.
        let replica = &active[0];
        let prices = self.pricing.latest_prices(&instance_type, &agent.region).await?;

        let replica_price = prices
            .iter()
            .find(|(pool, _)| pool.id == replica.pool_id)
            .map(|(_, p)| p.price);
        let min_price = prices
            .iter()
            .map(|(_, p)| p.price)
            .min_by(|a, b| a.total_cmp(b));

        if let (Some(current), Some(cheapest)) = (replica_price, min_price) {
            let margin = 1.0 + self.price_margin_percent as f64 / 100.0;
            if current > cheapest * margin {
                warn!(
                    agent_id = %agent.id,
                    replica_id = %replica.id,
                    current_price = current,
                    cheapest_price = cheapest,
                    "Standing replica pool has drifted above the price margin"
                );
                self.events
                    .audit(
                        domain_events::RecordSystemEvent::new(
                            event_types::REPLICA_PRICE_DRIFT,
                            EventSeverity::Info,
                        )
                        .client(agent.client_id)
                        .agent(agent.id)
                        .context(serde_json::json!({
                            "replicaId": replica.id,
                            "replicaPoolPrice": current,
                            "cheapestPrice": cheapest,
                            "marginPercent": self.price_margin_percent,
                        })),
                    )
                    .await;
            }
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReplicaInstance, ReplicaStatus};
    use crate::repository::MockReplicaRepository;
    use chrono::Utc;
    use domain_agents::repository::MockAgentRepository;
    use domain_agents::{AgentMode, AgentStatus, NoticeStatus};
    use domain_commands::repository::MockCommandRepository;
    use domain_commands::{CommandPayload, NewCommand};
    use domain_events::repository::MockEventRepository;
    use domain_pricing::repository::MockPricingRepository;
    use domain_pricing::{ConsolidatedPrice, Pool, PriceSource};
    use uuid::Uuid;

    fn agent() -> Agent {
        Agent {
            id: Uuid::now_v7(),
            client_id: Uuid::now_v7(),
            logical_id: "L1".to_string(),
            current_instance_id: Some("i-A".to_string()),
            region: "us-east-1".to_string(),
            az: "us-east-1a".to_string(),
            instance_type: Some("c5.large".to_string()),
            mode: AgentMode::Spot,
            current_pool_id: Some(Uuid::now_v7()),
            auto_switch_enabled: false,
            manual_replica_enabled: true,
            auto_terminate: true,
            terminate_wait_seconds: None,
            last_heartbeat: None,
            status: AgentStatus::Online,
            notice_status: NoticeStatus::None,
            notice_deadline: None,
            failed_promotions: 0,
            fastest_pool_id: None,
            agent_version: None,
            hostname: None,
            private_ip: None,
            public_ip: None,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn pool(id: Uuid, az: &str) -> Pool {
        Pool {
            id,
            instance_type: "c5.large".to_string(),
            region: "us-east-1".to_string(),
            az: az.to_string(),
            mean_boot_seconds: None,
            boot_samples: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn price(pool_id: Uuid, value: f64) -> ConsolidatedPrice {
        ConsolidatedPrice {
            id: Uuid::now_v7(),
            pool_id,
            observed_at: Utc::now(),
            price: value,
            is_interpolated: false,
            source_count: 1,
            data_source: PriceSource::Agent,
            created_at: Utc::now(),
        }
    }

    fn replica(agent_id: Uuid, pool_id: Uuid) -> ReplicaInstance {
        ReplicaInstance {
            id: Uuid::now_v7(),
            agent_id,
            parent_instance_id: None,
            instance_id: Some("i-R".to_string()),
            pool_id,
            kind: ReplicaKind::Manual,
            status: ReplicaStatus::Ready,
            sync_lag_seconds: None,
            requested_at: Utc::now(),
            launched_at: None,
            ready_at: None,
            promoted_at: None,
            terminated_at: None,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn mock_events() -> EventBus<MockEventRepository> {
        let mut repo = MockEventRepository::new();
        repo.expect_append_system_event().returning(|_| Ok(()));
        repo.expect_insert_sse_event()
            .returning(|client_id, event_type, payload, expires_at| {
                Ok(domain_events::SseEvent {
                    id: Uuid::now_v7(),
                    client_id,
                    event_type,
                    payload,
                    delivered: false,
                    created_at: Utc::now(),
                    expires_at,
                })
            });
        EventBus::new(repo)
    }

    fn command_from(input: NewCommand) -> domain_commands::Command {
        domain_commands::Command {
            id: Uuid::now_v7(),
            agent_id: input.agent_id,
            request_id: input.request_id,
            kind: input.payload.kind(),
            target_mode: None,
            target_pool_id: None,
            priority: input.priority,
            terminate_wait_seconds: None,
            status: domain_commands::CommandStatus::Pending,
            payload: input.payload,
            pre_state: None,
            post_state: None,
            result: None,
            trigger: input.trigger,
            user_id: None,
            version: 1,
            created_at: Utc::now(),
            executed_at: None,
            completed_at: None,
        }
    }

    fn coordinator(
        replica_repo: MockReplicaRepository,
        agent_repo: MockAgentRepository,
        pricing_repo: MockPricingRepository,
        expect_launches: usize,
    ) -> ReplicaCoordinator<
        MockReplicaRepository,
        MockAgentRepository,
        MockCommandRepository,
        MockEventRepository,
        MockPricingRepository,
    > {
        let mut commands = MockCommandRepository::new();
        commands.expect_find_by_request_id().returning(|_| Ok(None));
        commands
            .expect_insert()
            .withf(|input| {
                matches!(input.payload, CommandPayload::LaunchInstance { .. })
                    && input.priority == priority::SCHEDULED
            })
            .times(expect_launches)
            .returning(|input| Ok(command_from(input)));

        let queue = domain_commands::CommandQueue::new(commands, mock_events());
        let replicas = ReplicaService::new(Arc::new(replica_repo), queue, mock_events());

        ReplicaCoordinator::new(
            replicas,
            Arc::new(agent_repo),
            mock_events(),
            PricingService::new(pricing_repo),
            20,
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn test_creates_replica_when_none_active() {
        let agent = agent();
        let cheap_pool = Uuid::now_v7();

        let mut replica_repo = MockReplicaRepository::new();
        replica_repo
            .expect_active_for_agent()
            .returning(|_| Ok(vec![]));
        replica_repo
            .expect_insert()
            .withf(move |input| input.pool_id == cheap_pool && input.kind == ReplicaKind::Manual)
            .times(1)
            .returning(|input| {
                let mut r = replica(input.agent_id, input.pool_id);
                r.status = ReplicaStatus::Launching;
                Ok(r)
            });

        let mut agent_repo = MockAgentRepository::new();
        let agents = vec![agent.clone()];
        agent_repo
            .expect_agents_with_replica_policy()
            .returning(move || Ok(agents.clone()));

        let mut pricing_repo = MockPricingRepository::new();
        pricing_repo
            .expect_latest_prices_for_region()
            .returning(move |_, _, _| {
                Ok(vec![(pool(cheap_pool, "us-east-1b"), price(cheap_pool, 0.03))])
            });

        let coordinator = coordinator(replica_repo, agent_repo, pricing_repo, 1);
        let created = coordinator.run_once().await.unwrap();
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_price_drift_logs_without_teardown() {
        let agent = agent();
        let replica_pool = Uuid::now_v7();
        let cheap_pool = Uuid::now_v7();

        let mut replica_repo = MockReplicaRepository::new();
        let agent_id = agent.id;
        replica_repo
            .expect_active_for_agent()
            .returning(move |_| Ok(vec![replica(agent_id, replica_pool)]));
        // Drift never creates or destroys anything
        replica_repo.expect_insert().times(0);

        let mut agent_repo = MockAgentRepository::new();
        let agents = vec![agent.clone()];
        agent_repo
            .expect_agents_with_replica_policy()
            .returning(move || Ok(agents.clone()));

        let mut pricing_repo = MockPricingRepository::new();
        pricing_repo
            .expect_latest_prices_for_region()
            .returning(move |_, _, _| {
                Ok(vec![
                    // Replica pool is 50% above the cheapest: over the margin
                    (pool(replica_pool, "us-east-1a"), price(replica_pool, 0.045)),
                    (pool(cheap_pool, "us-east-1b"), price(cheap_pool, 0.030)),
                ])
            });

        let coordinator = coordinator(replica_repo, agent_repo, pricing_repo, 0);
        let created = coordinator.run_once().await.unwrap();
        assert_eq!(created, 0);
    }

    #[tokio::test]
    async fn test_no_fresh_price_skips_creation() {
        let agent = agent();

        let mut replica_repo = MockReplicaRepository::new();
        replica_repo
            .expect_active_for_agent()
            .returning(|_| Ok(vec![]));
        replica_repo.expect_insert().times(0);

        let mut agent_repo = MockAgentRepository::new();
        let agents = vec![agent.clone()];
        agent_repo
            .expect_agents_with_replica_policy()
            .returning(move || Ok(agents.clone()));

        let mut pricing_repo = MockPricingRepository::new();
        pricing_repo
            .expect_latest_prices_for_region()
            .returning(|_, _, _| Ok(vec![]));

        let coordinator = coordinator(replica_repo, agent_repo, pricing_repo, 0);
        let created = coordinator.run_once().await.unwrap();
        assert_eq!(created, 0);
    }
}
