use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use domain_events::{EventBus, EventRepository, EventSeverity, RecordSystemEvent, event_types};
use domain_pricing::{PoolKey, PricingRepository, PricingService};

use crate::error::{AgentError, AgentResult};
use crate::models::{
    Agent, AgentFilter, AgentStatus, Client, ClientPlan, HeartbeatRequest, Instance, InstanceRole,
    NewClient, NewInstance, PolicyUpdate, RegisterAgentRequest, RegisterAgentResponse,
};
use crate::repository::{AgentContext, AgentRepository, NewAgent, PolicyFields};

/// Fleet bookkeeping: tenants, registration, liveness, policy.
///
/// Switch execution and failover live in [`crate::switching`]; this service
/// never moves instance roles except through first registration.
pub struct AgentService<R, E, P>
where
    R: AgentRepository,
    E: EventRepository,
    P: PricingRepository,
{
    repository: Arc<R>,
    events: EventBus<E>,
    pricing: PricingService<P>,
}

impl<R, E, P> Clone for AgentService<R, E, P>
where
    R: AgentRepository,
    E: EventRepository,
    P: PricingRepository,
{
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            events: self.events.clone(),
            pricing: self.pricing.clone(),
        }
    }
}

impl<R, E, P> AgentService<R, E, P>
where
    R: AgentRepository,
    E: EventRepository,
    P: PricingRepository,
{
    pub fn new(repository: Arc<R>, events: EventBus<E>, pricing: PricingService<P>) -> Self {
        Self {
            repository,
            events,
            pricing,
        }
    }

    pub fn repository(&self) -> Arc<R> {
        self.repository.clone()
    }

    // ---------------------------------------------------------------- clients

    /// Create a tenant. The raw bearer token is returned exactly once; only
    /// its hash is stored.
    pub async fn create_client(&self, input: NewClient) -> AgentResult<(Client, String)> {
        let token = format!("ss_{}", Uuid::new_v4().simple());
        let client = Client {
            id: Uuid::now_v7(),
            name: input.name,
            auth_token_hash: axum_helpers::hash_token(&token),
            plan: input.plan,
            max_agents: input.max_agents.unwrap_or(match input.plan {
                ClientPlan::Free => 10,
                ClientPlan::Pro => 100,
                ClientPlan::Enterprise => 1000,
            }),
            default_auto_switch_enabled: true,
            default_manual_replica_enabled: false,
            default_auto_terminate: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let created = self.repository.insert_client(client).await?;
        Ok((created, token))
    }

    pub async fn list_clients(&self) -> AgentResult<Vec<Client>> {
        self.repository.list_clients().await
    }

    pub async fn client_by_id(&self, id: Uuid) -> AgentResult<Client> {
        self.repository
            .client_by_id(id)
            .await?
            .ok_or_else(|| AgentError::NotFound(format!("client {}", id)))
    }

    // ----------------------------------------------------------- registration

    /// Agent registration: create on first sight of `(client, logicalAgentId)`,
    /// reactivate and reconcile context otherwise.
    pub async fn register(
        &self,
        client: &Client,
        request: RegisterAgentRequest,
    ) -> AgentResult<RegisterAgentResponse> {
        let pool = self
            .pricing
            .resolve_pool(PoolKey::new(
                &request.instance_type,
                &request.region,
                &request.az,
            ))
            .await?;

        let existing = self
            .repository
            .agent_by_logical_id(client.id, &request.logical_agent_id)
            .await?;

        let agent = match existing {
            Some(agent) => {
                let context = AgentContext {
                    current_instance_id: Some(request.instance_id.clone()),
                    instance_type: Some(request.instance_type.clone()),
                    mode: Some(request.mode),
                    az: Some(request.az.clone()),
                    current_pool_id: Some(pool.id),
                    agent_version: request.agent_version.clone(),
                    hostname: request.hostname.clone(),
                    private_ip: request.private_ip.clone(),
                    public_ip: request.public_ip.clone(),
                };
                self.repository
                    .update_heartbeat(agent.id, AgentStatus::Online, Utc::now(), context)
                    .await?
            }
            None => {
                let count = self.repository.count_agents_for_client(client.id).await?;
                if count >= client.max_agents as u64 {
                    return Err(AgentError::LimitExceeded(format!(
                        "client {} has reached its agent limit of {}",
                        client.id, client.max_agents
                    )));
                }

                self.repository
                    .insert_agent(NewAgent {
                        client_id: client.id,
                        logical_id: request.logical_agent_id.clone(),
                        region: request.region.clone(),
                        az: request.az.clone(),
                        instance_type: request.instance_type.clone(),
                        mode: request.mode,
                        policy: PolicyFields {
                            auto_switch_enabled: client.default_auto_switch_enabled,
                            manual_replica_enabled: client.default_manual_replica_enabled,
                            auto_terminate: client.default_auto_terminate,
                            terminate_wait_seconds: None,
                        },
                        context: AgentContext {
                            current_instance_id: Some(request.instance_id.clone()),
                            current_pool_id: Some(pool.id),
                            agent_version: request.agent_version.clone(),
                            hostname: request.hostname.clone(),
                            private_ip: request.private_ip.clone(),
                            public_ip: request.public_ip.clone(),
                            ..Default::default()
                        },
                    })
                    .await?
            }
        };

        self.ensure_primary_instance(&agent, &request, pool.id)
            .await?;

        self.events
            .publish(
                client.id,
                Some(agent.id),
                EventSeverity::Info,
                event_types::AGENT_REGISTERED,
                serde_json::json!({
                    "logicalAgentId": request.logical_agent_id,
                    "instanceId": request.instance_id,
                    "mode": request.mode,
                }),
            )
            .await;

        // Re-read: ensure_primary_instance may have repointed the agent
        let agent = self.get_agent(client.id, agent.id).await?;
        Ok(RegisterAgentResponse {
            agent_id: agent.id,
            policy: agent.policy(),
        })
    }

    /// Make the registered instance the agent's primary. First registration
    /// inserts it directly as primary; re-registration under a new instance
    /// id goes through the atomic promotion so the old primary is demoted,
    /// never duplicated.
    async fn ensure_primary_instance(
        &self,
        agent: &Agent,
        request: &RegisterAgentRequest,
        pool_id: Uuid,
    ) -> AgentResult<()> {
        let current_primary = self.repository.primary_for_agent(agent.id).await?;

        if let Some(primary) = &current_primary
            && primary.id == request.instance_id
        {
            return Ok(());
        }

        let known = self.repository.instance_by_id(&request.instance_id).await?;
        let instance = match known {
            Some(instance) => instance,
            None => {
                let role = if current_primary.is_some() {
                    InstanceRole::Launching
                } else {
                    InstanceRole::RunningPrimary
                };
                self.repository
                    .insert_instance(NewInstance {
                        id: request.instance_id.clone(),
                        agent_id: agent.id,
                        role,
                        instance_type: request.instance_type.clone(),
                        region: request.region.clone(),
                        az: request.az.clone(),
                        pool_id: Some(pool_id),
                        spot_price: None,
                        ondemand_price: None,
                        launch_requested_at: None,
                        launch_confirmed_at: Some(Utc::now()),
                    })
                    .await?
            }
        };

        if !instance.is_primary() {
            self.repository
                .promote_to_primary(&instance.id, agent.id, instance.version)
                .await?;
        }

        self.repository
            .set_current_instance(agent.id, instance.id, request.mode, Some(pool_id))
            .await?;

        Ok(())
    }

    // --------------------------------------------------------------- liveness

    /// Heartbeat: updates liveness and reconciles instance context. Role
    /// fields are never touched, even when the instance is mid-promotion.
    pub async fn heartbeat(
        &self,
        client_id: Uuid,
        agent_id: Uuid,
        request: HeartbeatRequest,
    ) -> AgentResult<Agent> {
        let agent = self.get_agent(client_id, agent_id).await?;

        let pool_id = match (&request.az, agent.instance_type.as_deref()) {
            (Some(az), Some(instance_type)) => Some(
                self.pricing
                    .resolve_pool(PoolKey::new(instance_type, &agent.region, az))
                    .await?
                    .id,
            ),
            _ => None,
        };

        let was_offline = agent.status != AgentStatus::Online;
        let status = match request.status {
            AgentStatus::Error => AgentStatus::Error,
            _ => AgentStatus::Online,
        };

        let updated = self
            .repository
            .update_heartbeat(
                agent_id,
                status,
                Utc::now(),
                AgentContext {
                    current_instance_id: request.instance_id,
                    instance_type: request.instance_type,
                    mode: request.mode,
                    az: request.az,
                    current_pool_id: pool_id,
                    ..Default::default()
                },
            )
            .await?;

        if was_offline && updated.status == AgentStatus::Online {
            self.events
                .publish(
                    client_id,
                    Some(agent_id),
                    EventSeverity::Info,
                    event_types::AGENT_ONLINE,
                    serde_json::json!({ "logicalAgentId": updated.logical_id }),
                )
                .await;
        }

        Ok(updated)
    }

    /// Mark online agents with stale heartbeats offline; returns how many.
    pub async fn mark_stale_offline(&self, stale_seconds: u32) -> AgentResult<usize> {
        let cutoff = Utc::now() - Duration::seconds(stale_seconds as i64);
        let stale = self.repository.agents_with_stale_heartbeat(cutoff).await?;
        let count = stale.len();

        for agent in stale {
            self.repository
                .set_status(agent.id, AgentStatus::Offline)
                .await?;
            self.events
                .publish(
                    agent.client_id,
                    Some(agent.id),
                    EventSeverity::Warning,
                    event_types::AGENT_OFFLINE,
                    serde_json::json!({ "logicalAgentId": agent.logical_id }),
                )
                .await;
        }

        Ok(count)
    }

    // ----------------------------------------------------------------- policy

    /// Apply a policy update under optimistic concurrency. Mutual exclusivity
    /// of the toggles is enforced unconditionally, on every write path.
    pub async fn update_policy(
        &self,
        client_id: Uuid,
        agent_id: Uuid,
        update: PolicyUpdate,
    ) -> AgentResult<Agent> {
        let agent = self.get_agent(client_id, agent_id).await?;

        let policy = PolicyFields {
            auto_switch_enabled: update
                .auto_switch_enabled
                .unwrap_or(agent.auto_switch_enabled),
            manual_replica_enabled: update
                .manual_replica_enabled
                .unwrap_or(agent.manual_replica_enabled),
            auto_terminate: update.auto_terminate.unwrap_or(agent.auto_terminate),
            terminate_wait_seconds: update
                .terminate_wait_seconds
                .or(agent.terminate_wait_seconds),
        };

        if policy.auto_switch_enabled && policy.manual_replica_enabled {
            return Err(AgentError::InvariantViolation(
                "auto_switch_enabled and manual_replica_enabled are mutually exclusive".to_string(),
            ));
        }

        let updated = self
            .repository
            .update_policy(agent_id, policy, update.expected_version)
            .await?;

        self.events
            .publish(
                client_id,
                Some(agent_id),
                EventSeverity::Info,
                event_types::POLICY_UPDATED,
                serde_json::json!({
                    "autoSwitchEnabled": updated.auto_switch_enabled,
                    "manualReplicaEnabled": updated.manual_replica_enabled,
                    "autoTerminate": updated.auto_terminate,
                }),
            )
            .await;

        Ok(updated)
    }

    /// Operator clears the error flag set by repeated emergency failures.
    pub async fn clear_error(&self, agent_id: Uuid) -> AgentResult<Agent> {
        self.repository.reset_failed_promotions(agent_id).await?;
        let agent = self.repository.set_status(agent_id, AgentStatus::Offline).await?;

        self.events
            .audit(
                RecordSystemEvent::new(event_types::AGENT_ERROR, EventSeverity::Info)
                    .client(agent.client_id)
                    .agent(agent_id)
                    .context(serde_json::json!({ "cleared": true })),
            )
            .await;

        Ok(agent)
    }

    // ------------------------------------------------------------------ reads

    /// Fetch an agent, verifying tenancy.
    pub async fn get_agent(&self, client_id: Uuid, agent_id: Uuid) -> AgentResult<Agent> {
        let agent = self
            .repository
            .agent_by_id(agent_id)
            .await?
            .ok_or_else(|| AgentError::NotFound(format!("agent {}", agent_id)))?;

        if agent.client_id != client_id {
            return Err(AgentError::Forbidden(format!(
                "agent {} does not belong to this client",
                agent_id
            )));
        }

        Ok(agent)
    }

    /// Admin fetch without tenancy scoping.
    pub async fn get_agent_unscoped(&self, agent_id: Uuid) -> AgentResult<Agent> {
        self.repository
            .agent_by_id(agent_id)
            .await?
            .ok_or_else(|| AgentError::NotFound(format!("agent {}", agent_id)))
    }

    pub async fn list_agents(
        &self,
        client_id: Option<Uuid>,
        filter: AgentFilter,
    ) -> AgentResult<Vec<Agent>> {
        self.repository.list_agents(client_id, filter).await
    }

    pub async fn instances_for_agent(&self, agent_id: Uuid) -> AgentResult<Vec<Instance>> {
        self.repository.instances_for_agent(agent_id).await
    }

    // ---------------------------------------------------------------- cleanup

    /// Flip zombies past the retention period to terminated.
    pub async fn purge_zombies(&self, retention_days: u32) -> AgentResult<u64> {
        let cutoff = Utc::now() - Duration::days(retention_days as i64);
        let purged = self.repository.purge_zombies(cutoff).await?;

        if purged > 0 {
            self.events
                .audit(
                    RecordSystemEvent::new(event_types::ZOMBIES_PURGED, EventSeverity::Info)
                        .context(serde_json::json!({ "purged": purged })),
                )
                .await;
        }

        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentMode;
    use crate::repository::MockAgentRepository;
    use domain_events::repository::MockEventRepository;
    use domain_pricing::repository::MockPricingRepository;

    fn test_client() -> Client {
        Client {
            id: Uuid::now_v7(),
            name: "acme".to_string(),
            auth_token_hash: "x".repeat(64),
            plan: ClientPlan::Free,
            max_agents: 2,
            default_auto_switch_enabled: true,
            default_manual_replica_enabled: false,
            default_auto_terminate: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_agent(client_id: Uuid) -> Agent {
        Agent {
            id: Uuid::now_v7(),
            client_id,
            logical_id: "L1".to_string(),
            current_instance_id: Some("i-A".to_string()),
            region: "us-east-1".to_string(),
            az: "us-east-1a".to_string(),
            instance_type: Some("c5.large".to_string()),
            mode: AgentMode::Spot,
            current_pool_id: None,
            auto_switch_enabled: true,
            manual_replica_enabled: false,
            auto_terminate: true,
            terminate_wait_seconds: None,
            last_heartbeat: None,
            status: AgentStatus::Online,
            notice_status: crate::models::NoticeStatus::None,
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

    fn events() -> EventBus<MockEventRepository> {
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

    fn pricing() -> PricingService<MockPricingRepository> {
        let mut repo = MockPricingRepository::new();
        repo.expect_upsert_pool().returning(|key| {
            Ok(domain_pricing::Pool {
                id: Uuid::now_v7(),
                instance_type: key.instance_type,
                region: key.region,
                az: key.az,
                mean_boot_seconds: None,
                boot_samples: 0,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
        });
        PricingService::new(repo)
    }

    #[tokio::test]
    async fn test_policy_exclusivity_rejected_before_any_write() {
        let client = test_client();
        let agent = test_agent(client.id);
        let agent_id = agent.id;

        let mut repo = MockAgentRepository::new();
        repo.expect_agent_by_id()
            .returning(move |_| Ok(Some(agent.clone())));
        repo.expect_update_policy().times(0);

        let service = AgentService::new(Arc::new(repo), events(), pricing());

        let result = service
            .update_policy(
                client.id,
                agent_id,
                PolicyUpdate {
                    auto_switch_enabled: Some(true),
                    manual_replica_enabled: Some(true),
                    auto_terminate: None,
                    terminate_wait_seconds: None,
                    expected_version: 1,
                },
            )
            .await;

        assert!(matches!(result, Err(AgentError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn test_get_agent_enforces_tenancy() {
        let client = test_client();
        let agent = test_agent(client.id);
        let agent_id = agent.id;

        let mut repo = MockAgentRepository::new();
        repo.expect_agent_by_id()
            .returning(move |_| Ok(Some(agent.clone())));

        let service = AgentService::new(Arc::new(repo), events(), pricing());

        let other_client = Uuid::now_v7();
        let result = service.get_agent(other_client, agent_id).await;
        assert!(matches!(result, Err(AgentError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_register_respects_agent_limit() {
        let client = test_client();

        let mut repo = MockAgentRepository::new();
        repo.expect_agent_by_logical_id().returning(|_, _| Ok(None));
        repo.expect_count_agents_for_client().returning(|_| Ok(2));
        repo.expect_insert_agent().times(0);

        let service = AgentService::new(Arc::new(repo), events(), pricing());

        let result = service
            .register(
                &client,
                RegisterAgentRequest {
                    logical_agent_id: "L3".to_string(),
                    instance_id: "i-C".to_string(),
                    instance_type: "c5.large".to_string(),
                    region: "us-east-1".to_string(),
                    az: "us-east-1a".to_string(),
                    ami_id: None,
                    mode: AgentMode::Spot,
                    hostname: None,
                    private_ip: None,
                    public_ip: None,
                    agent_version: None,
                },
            )
            .await;

        assert!(matches!(result, Err(AgentError::LimitExceeded(_))));
    }
}
