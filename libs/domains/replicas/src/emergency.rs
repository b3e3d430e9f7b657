//! Emergency orchestrator: preemption notices under hard deadlines.
//!
//! Rebalance gives ~120 s; termination often less than 60 s. The orchestrator
//! never waits inline: it records the deadline on the agent, lines up a
//! replica (preferring READY, else launching one in the fastest-boot pool),
//! and escalates by skipping the health check when the deadline would
//! otherwise be missed.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use domain_agents::{Agent, AgentMode, AgentRepository, InstanceRole, NoticeStatus};
use domain_agents::models::NewInstance;
use domain_commands::{
    CommandError, CommandPayload, CommandQueue, CommandRepository, CommandTrigger, NewCommand,
    priority,
};
use domain_events::{EventBus, EventRepository, EventSeverity, RecordSystemEvent, event_types};
use domain_pricing::{PricingRepository, PricingService};

use crate::error::{ReplicaError, ReplicaResult};
use crate::models::{ReplicaInstance, ReplicaKind, ReplicaStatus};
use crate::repository::{ReplicaRepository, fastest_boot_pool};
use crate::service::ReplicaService;

/// Tunables for the emergency procedures.
#[derive(Debug, Clone)]
pub struct EmergencyConfig {
    pub rebalance_deadline_seconds: u32,
    pub termination_deadline_seconds: u32,
    /// Consecutive failed emergency promotions before the agent is flagged
    pub failure_threshold: u32,
    /// Minimum promoted-replica samples before a pool counts as "fastest"
    pub min_boot_samples: usize,
    /// Budget a pre-promotion health check needs; skipped if the remaining
    /// deadline is smaller
    pub health_check_budget_seconds: u32,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            rebalance_deadline_seconds: 120,
            termination_deadline_seconds: 60,
            failure_threshold: 3,
            min_boot_samples: 3,
            health_check_budget_seconds: 10,
        }
    }
}

/// Handles rebalance and termination notices end to end
pub struct EmergencyOrchestrator<Q, A, C, E, P>
where
    Q: ReplicaRepository,
    A: AgentRepository,
    C: CommandRepository,
    E: EventRepository,
    P: PricingRepository,
{
    replicas: ReplicaService<Q, C, E>,
    agents: Arc<A>,
    commands: CommandQueue<C, E>,
    events: EventBus<E>,
    pricing: PricingService<P>,
    config: EmergencyConfig,
}

impl<Q, A, C, E, P> Clone for EmergencyOrchestrator<Q, A, C, E, P>
where
    Q: ReplicaRepository,
    A: AgentRepository,
    C: CommandRepository,
    E: EventRepository,
    P: PricingRepository,
{
    fn clone(&self) -> Self {
        Self {
            replicas: self.replicas.clone(),
            agents: self.agents.clone(),
            commands: self.commands.clone(),
            events: self.events.clone(),
            pricing: self.pricing.clone(),
            config: self.config.clone(),
        }
    }
}

impl<Q, A, C, E, P> EmergencyOrchestrator<Q, A, C, E, P>
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
        commands: CommandQueue<C, E>,
        events: EventBus<E>,
        pricing: PricingService<P>,
        config: EmergencyConfig,
    ) -> Self {
        Self {
            replicas,
            agents,
            commands,
            events,
            pricing,
            config,
        }
    }

    /// Rebalance notice: soft preemption warning, 120 s budget.
    pub async fn handle_rebalance(
        &self,
        client_id: Uuid,
        agent: &Agent,
        notice_time: Option<DateTime<Utc>>,
    ) -> ReplicaResult<()> {
        let deadline =
            Utc::now() + Duration::seconds(self.config.rebalance_deadline_seconds as i64);
        self.agents
            .set_notice(agent.id, NoticeStatus::Rebalance, Some(deadline))
            .await?;

        self.events
            .publish(
                client_id,
                Some(agent.id),
                EventSeverity::Warning,
                event_types::REBALANCE_NOTICE,
                serde_json::json!({
                    "noticeTime": notice_time,
                    "deadline": deadline,
                }),
            )
            .await;

        let active = self.replicas.active_for_agent(agent.id).await?;
        let ready = active
            .iter()
            .find(|r| r.status == ReplicaStatus::Ready && r.instance_id.is_some());

        match ready {
            // Fast health check: a READY replica with a bound instance
            Some(replica) => {
                info!(agent_id = %agent.id, replica_id = %replica.id, "Rebalance: promoting ready replica");
                self.enqueue_promotion(client_id, agent, replica, false)
                    .await?;
            }
            None if active.is_empty() => {
                let pool_id = self.select_launch_pool(agent).await?;
                self.replicas
                    .create_replica(
                        client_id,
                        agent,
                        pool_id,
                        ReplicaKind::Emergency,
                        priority::EMERGENCY,
                        CommandTrigger::Emergency,
                    )
                    .await?;
            }
            // A replica is already launching or syncing; promotion follows
            // its READY report
            None => {
                info!(agent_id = %agent.id, "Rebalance: replica already in flight");
            }
        }

        Ok(())
    }

    /// Termination notice: hard preemption, 60 s budget or less.
    pub async fn handle_termination(
        &self,
        client_id: Uuid,
        agent: &Agent,
        termination_time: Option<DateTime<Utc>>,
    ) -> ReplicaResult<()> {
        let deadline = termination_time
            .unwrap_or_else(|| {
                Utc::now() + Duration::seconds(self.config.termination_deadline_seconds as i64)
            })
            .min(Utc::now() + Duration::seconds(self.config.termination_deadline_seconds as i64));
        self.agents
            .set_notice(agent.id, NoticeStatus::Termination, Some(deadline))
            .await?;

        self.events
            .publish(
                client_id,
                Some(agent.id),
                EventSeverity::Critical,
                event_types::TERMINATION_NOTICE,
                serde_json::json!({
                    "terminationTime": termination_time,
                    "deadline": deadline,
                }),
            )
            .await;

        let mut active = self.replicas.active_for_agent(agent.id).await?;
        // Bind to the most advanced replica in any state
        active.sort_by_key(|r| match r.status {
            ReplicaStatus::Ready => 0,
            ReplicaStatus::Syncing => 1,
            _ => 2,
        });

        match active.first() {
            Some(replica) => {
                let skip_health_check =
                    self.must_skip_health_check(replica, deadline);
                if skip_health_check {
                    self.log_health_check_skip(client_id, agent, replica, deadline)
                        .await;
                }
                self.enqueue_promotion(client_id, agent, replica, skip_health_check)
                    .await?;
            }
            None => {
                let pool_id = self.select_launch_pool(agent).await?;
                self.replicas
                    .create_replica(
                        client_id,
                        agent,
                        pool_id,
                        ReplicaKind::Emergency,
                        priority::EMERGENCY,
                        CommandTrigger::Emergency,
                    )
                    .await?;
            }
        }

        Ok(())
    }

    /// Called when a replica reports READY while a notice is outstanding.
    pub async fn on_replica_ready(
        &self,
        client_id: Uuid,
        agent: &Agent,
        replica: &ReplicaInstance,
    ) -> ReplicaResult<()> {
        if agent.notice_status == NoticeStatus::None {
            return Ok(());
        }

        let deadline = agent.notice_deadline.unwrap_or_else(Utc::now);
        let skip_health_check = agent.notice_status == NoticeStatus::Termination
            && self.must_skip_health_check(replica, deadline);
        if skip_health_check {
            self.log_health_check_skip(client_id, agent, replica, deadline)
                .await;
        }

        self.enqueue_promotion(client_id, agent, replica, skip_health_check)
            .await
    }

    /// Scheduler entry: escalate agents whose notice deadline has passed.
    pub async fn escalate_overdue(&self) -> ReplicaResult<usize> {
        let overdue = self.agents.agents_with_overdue_notice(Utc::now()).await?;
        let count = overdue.len();

        for agent in overdue {
            let deadline = agent.notice_deadline.unwrap_or_else(Utc::now);
            let active = self.replicas.active_for_agent(agent.id).await?;

            match active.first() {
                Some(replica) => {
                    self.log_health_check_skip(agent.client_id, &agent, replica, deadline)
                        .await;
                    self.enqueue_promotion(agent.client_id, &agent, replica, true)
                        .await?;
                }
                None => {
                    self.events
                        .audit(
                            RecordSystemEvent::new(
                                event_types::DEADLINE_EXCEEDED,
                                EventSeverity::Critical,
                            )
                            .client(agent.client_id)
                            .agent(agent.id)
                            .context(serde_json::json!({
                                "deadline": deadline,
                                "reason": "no replica available at deadline",
                            })),
                        )
                        .await;
                    warn!(agent_id = %agent.id, "Notice deadline passed with no replica");
                }
            }
        }

        Ok(count)
    }

    /// Control-plane side of a completed promotion: the agent promoted the
    /// replica; make it the primary here, force-terminate the old primary on
    /// a termination notice, and feed the boot-time statistics.
    pub async fn complete_promotion(
        &self,
        client_id: Uuid,
        agent: &Agent,
        replica: &ReplicaInstance,
    ) -> ReplicaResult<ReplicaInstance> {
        let instance_id = replica.instance_id.clone().ok_or_else(|| {
            ReplicaError::InvalidState(format!(
                "replica {} has no bound instance id",
                replica.id
            ))
        })?;

        let pool = self.pricing.pool(replica.pool_id).await?;
        let old_primary = agent.current_instance_id.clone();

        // Make sure the instance row exists, then promote atomically
        let instance = match self.agents.instance_by_id(&instance_id).await? {
            Some(instance) => instance,
            None => {
                self.agents
                    .insert_instance(NewInstance {
                        id: instance_id.clone(),
                        agent_id: agent.id,
                        role: InstanceRole::Launching,
                        instance_type: pool.instance_type.clone(),
                        region: pool.region.clone(),
                        az: pool.az.clone(),
                        pool_id: Some(pool.id),
                        spot_price: None,
                        ondemand_price: None,
                        launch_requested_at: Some(replica.requested_at),
                        launch_confirmed_at: replica.launched_at,
                    })
                    .await?
            }
        };

        self.agents
            .promote_to_primary(&instance.id, agent.id, instance.version)
            .await?;

        // The old primary is forced out on a termination notice regardless of
        // policy; on other failovers the auto-terminate flag decides. The
        // reclaimed instance cannot be drained, so no grace period applies.
        let terminate_old =
            agent.notice_status == NoticeStatus::Termination || agent.auto_terminate;
        if terminate_old
            && let Some(old_id) = old_primary
            && old_id != instance.id
            && let Some(old) = self.agents.instance_by_id(&old_id).await?
            && old.role != InstanceRole::Terminated
        {
            self.agents
                .update_role(
                    &old.id,
                    InstanceRole::Terminated,
                    old.version,
                    Some(Utc::now()),
                )
                .await?;
        }

        let promoted = self
            .replicas
            .repository()
            .set_status(replica.id, ReplicaStatus::Promoted, None)
            .await?;

        // Feed the rolling boot-time statistics and refresh the cached
        // fastest-boot hint; stale reads of the hint are acceptable
        if let Some(boot_seconds) = promoted.boot_seconds() {
            self.pricing
                .record_boot_sample(promoted.pool_id, boot_seconds)
                .await?;
        }
        if let Ok(Some(fastest)) = self.compute_fastest_pool(agent).await {
            let _ = self.agents.set_fastest_pool(agent.id, fastest).await;
        }

        self.agents
            .set_current_instance(agent.id, instance.id.clone(), AgentMode::Spot, Some(pool.id))
            .await?;
        self.agents.reset_failed_promotions(agent.id).await?;

        self.events
            .publish(
                client_id,
                Some(agent.id),
                EventSeverity::Info,
                event_types::ROLE_CHANGED,
                serde_json::json!({
                    "instanceId": instance.id,
                    "to": InstanceRole::RunningPrimary,
                    "replicaId": replica.id,
                }),
            )
            .await;

        Ok(promoted)
    }

    /// A failed emergency promotion: count it, and quarantine the agent once
    /// the threshold is crossed (operator clears the flag).
    pub async fn record_promotion_failure(
        &self,
        client_id: Uuid,
        agent: &Agent,
    ) -> ReplicaResult<()> {
        let failures = self.agents.increment_failed_promotions(agent.id).await?;

        self.events
            .audit(
                RecordSystemEvent::new(
                    event_types::EMERGENCY_PROMOTION_FAILED,
                    EventSeverity::Warning,
                )
                .client(client_id)
                .agent(agent.id)
                .context(serde_json::json!({ "consecutiveFailures": failures })),
            )
            .await;

        if failures >= self.config.failure_threshold as i32 {
            self.agents.quarantine(agent.id).await?;
            self.events
                .publish(
                    client_id,
                    Some(agent.id),
                    EventSeverity::Critical,
                    event_types::AGENT_ERROR,
                    serde_json::json!({
                        "reason": "emergency promotion failures exceeded threshold",
                        "failures": failures,
                    }),
                )
                .await;
        }

        Ok(())
    }

    /// The fastest-boot pool for this agent's instance type and region:
    /// lowest rolling mean boot time with at least `min_boot_samples`
    /// promoted replicas, falling back to the current pool.
    async fn select_launch_pool(&self, agent: &Agent) -> ReplicaResult<Uuid> {
        if let Some(fastest) = self.compute_fastest_pool(agent).await? {
            return Ok(fastest);
        }

        agent.current_pool_id.ok_or_else(|| {
            ReplicaError::NoEligiblePool(format!(
                "agent {} has no boot statistics and no current pool",
                agent.id
            ))
        })
    }

    async fn compute_fastest_pool(&self, agent: &Agent) -> ReplicaResult<Option<Uuid>> {
        let instance_type = match &agent.instance_type {
            Some(instance_type) => instance_type.clone(),
            None => return Ok(None),
        };

        let pools = self.pricing.list_pools(Some(agent.region.clone())).await?;
        let pool_ids: Vec<Uuid> = pools
            .into_iter()
            .filter(|p| p.instance_type == instance_type)
            .map(|p| p.id)
            .collect();

        let observations = self.replicas.repository().boot_observations(pool_ids).await?;
        Ok(fastest_boot_pool(&observations, self.config.min_boot_samples))
    }

    fn must_skip_health_check(&self, replica: &ReplicaInstance, deadline: DateTime<Utc>) -> bool {
        let remaining = deadline - Utc::now();
        replica.status != ReplicaStatus::Ready
            || remaining < Duration::seconds(self.config.health_check_budget_seconds as i64)
    }

    async fn log_health_check_skip(
        &self,
        client_id: Uuid,
        agent: &Agent,
        replica: &ReplicaInstance,
        deadline: DateTime<Utc>,
    ) {
        warn!(
            agent_id = %agent.id,
            replica_id = %replica.id,
            "EMERGENCY_PROMOTION_WITHOUT_HEALTH_CHECK"
        );
        self.events
            .audit(
                RecordSystemEvent::new(
                    event_types::EMERGENCY_PROMOTION_WITHOUT_HEALTH_CHECK,
                    EventSeverity::Warning,
                )
                .client(client_id)
                .agent(agent.id)
                .context(serde_json::json!({
                    "replicaId": replica.id,
                    "replicaStatus": replica.status,
                    "deadline": deadline,
                })),
            )
            .await;
    }

    async fn enqueue_promotion(
        &self,
        client_id: Uuid,
        agent: &Agent,
        replica: &ReplicaInstance,
        skip_health_check: bool,
    ) -> ReplicaResult<()> {
        let command = NewCommand::new(
            agent.id,
            format!("promote-replica-{}", replica.id),
            CommandPayload::PromoteReplica {
                replica_id: replica.id,
                skip_health_check,
            },
        )
        .priority(priority::EMERGENCY)
        .trigger(CommandTrigger::Emergency);

        match self.commands.enqueue(client_id, command).await {
            Ok(_) => Ok(()),
            // The promotion is already queued or done; notices can repeat
            Err(CommandError::DuplicateRequest { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
