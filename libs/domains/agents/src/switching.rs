//! Switch execution: manual switch commands and agent switch reports.
//!
//! A switch is never performed inline. The operator (or the decision engine)
//! enqueues a `switch` command; the agent executes the replacement workflow
//! on its side and reports back; this module validates the report against
//! the command record and applies the role changes through the atomic
//! promotion primitive.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use domain_commands::{
    Command, CommandError, CommandKind, CommandPayload, CommandQueue, CommandRepository,
    CommandStatus, CommandTrigger, EnqueueOutcome, NewCommand, priority,
};
use domain_events::{EventBus, EventRepository, EventSeverity, event_types};
use domain_pricing::{PoolKey, PricingRepository, PricingService};

use crate::error::{AgentError, AgentResult};
use crate::models::{
    Agent, AgentMode, InstanceRole, ManualSwitchRequest, NewInstance, NewSwitch, Switch,
    SwitchReportRequest, TerminationReportRequest,
};
use crate::repository::AgentRepository;

/// Orchestrates switch commands and their execution reports
pub struct SwitchingService<R, C, E, P>
where
    R: AgentRepository,
    C: CommandRepository,
    E: EventRepository,
    P: PricingRepository,
{
    repository: Arc<R>,
    commands: CommandQueue<C, E>,
    events: EventBus<E>,
    pricing: PricingService<P>,
}

impl<R, C, E, P> Clone for SwitchingService<R, C, E, P>
where
    R: AgentRepository,
    C: CommandRepository,
    E: EventRepository,
    P: PricingRepository,
{
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            commands: self.commands.clone(),
            events: self.events.clone(),
            pricing: self.pricing.clone(),
        }
    }
}

impl<R, C, E, P> SwitchingService<R, C, E, P>
where
    R: AgentRepository,
    C: CommandRepository,
    E: EventRepository,
    P: PricingRepository,
{
    pub fn new(
        repository: Arc<R>,
        commands: CommandQueue<C, E>,
        events: EventBus<E>,
        pricing: PricingService<P>,
    ) -> Self {
        Self {
            repository,
            commands,
            events,
            pricing,
        }
    }

    /// Operator-initiated switch: enqueue at manual priority under the
    /// caller's idempotency key.
    pub async fn manual_switch(
        &self,
        client_id: Uuid,
        agent: &Agent,
        request: ManualSwitchRequest,
        header_request_id: Option<String>,
        user_id: Option<Uuid>,
    ) -> AgentResult<EnqueueOutcome> {
        let request_id = header_request_id
            .or(request.request_id)
            .ok_or_else(|| {
                AgentError::InvalidInput(
                    "a requestId (X-Request-ID header or body field) is required".to_string(),
                )
            })?;

        let mut command = NewCommand::new(
            agent.id,
            request_id,
            CommandPayload::Switch {
                target_mode: request.target_mode,
                target_pool_id: request.target_pool_id,
            },
        )
        .priority(priority::MANUAL)
        .trigger(CommandTrigger::Manual);
        if let Some(user_id) = user_id {
            command = command.user(user_id);
        }
        command.pre_state = Some(serde_json::json!({
            "instanceId": agent.current_instance_id,
            "mode": agent.mode,
        }));

        let outcome = self.commands.enqueue(client_id, command).await?;
        Ok(outcome)
    }

    /// Validate and apply an agent's switch report.
    ///
    /// The report must match the command record on agent, kind, request id,
    /// and modes; a mismatch is rejected and logged, leaving the command
    /// untouched. The old instance becomes TERMINATED only when the agent's
    /// auto-terminate flag is on AND the report carries `oldTerminatedAt`;
    /// in every other case it stays a zombie.
    pub async fn process_switch_report(
        &self,
        client_id: Uuid,
        agent: &Agent,
        report: SwitchReportRequest,
    ) -> AgentResult<Switch> {
        let command = self.commands.get(report.command_id).await?;

        if let Err(reason) = validate_report(agent, &command, &report) {
            self.events
                .publish(
                    client_id,
                    Some(agent.id),
                    EventSeverity::Warning,
                    event_types::SWITCH_REPORT_REJECTED,
                    serde_json::json!({
                        "commandId": report.command_id,
                        "reason": reason,
                    }),
                )
                .await;
            return Err(AgentError::Command(CommandError::ReportMismatch(reason)));
        }

        if command.status.is_terminal() {
            return Err(AgentError::Command(CommandError::TerminalState(command.id)));
        }

        // Resolve the pool the new instance landed in
        let new_az = report.new_instance.az.clone().unwrap_or(agent.az.clone());
        let new_type = report
            .new_instance
            .instance_type
            .clone()
            .or(agent.instance_type.clone())
            .ok_or_else(|| {
                AgentError::InvalidInput("instance type unknown for new instance".to_string())
            })?;
        let pool = self
            .pricing
            .resolve_pool(PoolKey::new(&new_type, &agent.region, &new_az))
            .await?;

        // Make sure the new instance exists, then promote it atomically
        let new_instance = match self
            .repository
            .instance_by_id(&report.new_instance.id)
            .await?
        {
            Some(instance) => instance,
            None => {
                self.repository
                    .insert_instance(NewInstance {
                        id: report.new_instance.id.clone(),
                        agent_id: agent.id,
                        role: InstanceRole::Launching,
                        instance_type: new_type.clone(),
                        region: agent.region.clone(),
                        az: new_az.clone(),
                        pool_id: Some(pool.id),
                        spot_price: report.pricing.new_spot,
                        ondemand_price: report.pricing.on_demand,
                        launch_requested_at: Some(report.timing.initiated_at),
                        launch_confirmed_at: report
                            .timing
                            .instance_launched_at
                            .or(Some(report.timing.instance_ready_at)),
                    })
                    .await?
            }
        };

        let promoted = self
            .repository
            .promote_to_primary(&new_instance.id, agent.id, new_instance.version)
            .await?;

        // Old instance: terminated only with the flag AND the timestamp;
        // otherwise it stays a zombie for audit
        let old_terminated = agent.auto_terminate && report.timing.old_terminated_at.is_some();
        if old_terminated
            && let Some(old) = self.repository.instance_by_id(&report.old_instance.id).await?
        {
            self.repository
                .update_role(
                    &old.id,
                    InstanceRole::Terminated,
                    old.version,
                    report.timing.old_terminated_at,
                )
                .await?;
        }

        self.repository
            .set_current_instance(
                agent.id,
                promoted.id.clone(),
                report.new_instance.mode,
                Some(pool.id),
            )
            .await?;

        let downtime_seconds = (report.timing.instance_ready_at - report.timing.initiated_at)
            .num_milliseconds() as f64
            / 1000.0;

        let switch = self
            .repository
            .insert_switch(NewSwitch {
                agent_id: agent.id,
                command_id: Some(command.id),
                request_id: command.request_id.clone(),
                old_instance_id: report.old_instance.id.clone(),
                new_instance_id: promoted.id.clone(),
                old_mode: report.old_instance.mode,
                new_mode: report.new_instance.mode,
                trigger: report.trigger,
                on_demand_price: report.pricing.on_demand,
                old_spot_price: report.pricing.old_spot,
                new_spot_price: report.pricing.new_spot,
                downtime_seconds: Some(downtime_seconds),
                initiated_at: report.timing.initiated_at,
                completed_at: report.timing.instance_ready_at,
                old_terminated_at: report.timing.old_terminated_at,
            })
            .await?;

        self.commands
            .finish_with_state(
                command.id,
                CommandStatus::Completed,
                serde_json::json!({ "success": true, "switchId": switch.id }),
                serde_json::json!({
                    "instanceId": promoted.id,
                    "mode": report.new_instance.mode,
                    "poolId": pool.id,
                }),
            )
            .await?;

        self.events
            .publish(
                client_id,
                Some(agent.id),
                EventSeverity::Info,
                event_types::SWITCH_COMPLETED,
                serde_json::json!({
                    "switchId": switch.id,
                    "oldInstanceId": switch.old_instance_id,
                    "newInstanceId": switch.new_instance_id,
                    "newMode": switch.new_mode,
                    "downtimeSeconds": switch.downtime_seconds,
                }),
            )
            .await;

        Ok(switch)
    }

    /// Confirmation that a specific instance is gone for good.
    pub async fn process_termination_report(
        &self,
        client_id: Uuid,
        agent: &Agent,
        report: TerminationReportRequest,
    ) -> AgentResult<()> {
        let instance = self
            .repository
            .instance_by_id(&report.instance_id)
            .await?
            .ok_or_else(|| AgentError::NotFound(format!("instance {}", report.instance_id)))?;

        if instance.agent_id != agent.id {
            return Err(AgentError::Forbidden(format!(
                "instance {} does not belong to agent {}",
                report.instance_id, agent.id
            )));
        }

        if instance.role == InstanceRole::Terminated {
            return Ok(()); // already there; confirmation is idempotent
        }

        self.repository
            .update_role(
                &instance.id,
                InstanceRole::Terminated,
                instance.version,
                Some(report.terminated_at.unwrap_or_else(Utc::now)),
            )
            .await?;

        self.events
            .publish(
                client_id,
                Some(agent.id),
                EventSeverity::Info,
                event_types::ROLE_CHANGED,
                serde_json::json!({
                    "instanceId": instance.id,
                    "from": instance.role,
                    "to": InstanceRole::Terminated,
                }),
            )
            .await;

        Ok(())
    }
}

/// Report validation per the execution-report contract: reported ids, modes,
/// and request id must match the command record.
fn validate_report(
    agent: &Agent,
    command: &Command,
    report: &SwitchReportRequest,
) -> Result<(), String> {
    if command.agent_id != agent.id {
        return Err(format!(
            "command {} belongs to another agent",
            command.id
        ));
    }

    if command.kind != CommandKind::Switch {
        return Err(format!("command {} is not a switch command", command.id));
    }

    if let Some(request_id) = &report.request_id
        && request_id != &command.request_id
    {
        return Err(format!(
            "request id {} does not match command record",
            request_id
        ));
    }

    if let Some(target_mode) = command.target_mode
        && AgentMode::from(target_mode) != report.new_instance.mode
    {
        return Err(format!(
            "reported new mode {} does not match command target {}",
            report.new_instance.mode, target_mode
        ));
    }

    if let Some(current) = &agent.current_instance_id
        && current != &report.old_instance.id
        && current != &report.new_instance.id
    {
        return Err(format!(
            "reported old instance {} is not the agent's current instance",
            report.old_instance.id
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentStatus, Instance, NoticeStatus, SwitchInstanceInfo, SwitchPricing, SwitchTiming};
    use crate::repository::MockAgentRepository;
    use chrono::{Duration, Utc};
    use domain_commands::repository::MockCommandRepository;
    use domain_events::repository::MockEventRepository;
    use domain_pricing::repository::MockPricingRepository;
    use mockall::predicate::*;

    fn agent(auto_terminate: bool) -> Agent {
        Agent {
            id: Uuid::now_v7(),
            client_id: Uuid::now_v7(),
            logical_id: "L1".to_string(),
            current_instance_id: Some("i-A".to_string()),
            region: "us-east-1".to_string(),
            az: "us-east-1a".to_string(),
            instance_type: Some("c5.large".to_string()),
            mode: AgentMode::Ondemand,
            current_pool_id: None,
            auto_switch_enabled: true,
            manual_replica_enabled: false,
            auto_terminate,
            terminate_wait_seconds: Some(0),
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

    fn instance(id: &str, agent_id: Uuid, role: InstanceRole) -> Instance {
        Instance {
            id: id.to_string(),
            agent_id,
            role,
            instance_type: "c5.large".to_string(),
            region: "us-east-1".to_string(),
            az: "us-east-1a".to_string(),
            pool_id: None,
            spot_price: None,
            ondemand_price: None,
            baseline_ondemand_price: None,
            launch_requested_at: None,
            launch_confirmed_at: None,
            last_switch_at: None,
            terminate_requested_at: None,
            terminated_at: None,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn switch_command(agent_id: Uuid, request_id: &str) -> Command {
        Command {
            id: Uuid::now_v7(),
            agent_id,
            request_id: request_id.to_string(),
            kind: CommandKind::Switch,
            target_mode: Some(domain_commands::TargetMode::Spot),
            target_pool_id: None,
            priority: priority::MANUAL,
            terminate_wait_seconds: None,
            status: CommandStatus::Executing,
            payload: CommandPayload::Switch {
                target_mode: domain_commands::TargetMode::Spot,
                target_pool_id: None,
            },
            pre_state: None,
            post_state: None,
            result: None,
            trigger: CommandTrigger::Manual,
            user_id: None,
            version: 1,
            created_at: Utc::now(),
            executed_at: None,
            completed_at: None,
        }
    }

    fn report(command_id: Uuid, old_terminated_at: Option<chrono::DateTime<Utc>>) -> SwitchReportRequest {
        let initiated = Utc::now() - Duration::seconds(45);
        SwitchReportRequest {
            command_id,
            request_id: None,
            old_instance: SwitchInstanceInfo {
                id: "i-A".to_string(),
                mode: AgentMode::Ondemand,
                az: None,
                instance_type: None,
            },
            new_instance: SwitchInstanceInfo {
                id: "i-B".to_string(),
                mode: AgentMode::Spot,
                az: Some("us-east-1b".to_string()),
                instance_type: None,
            },
            timing: SwitchTiming {
                initiated_at: initiated,
                ami_created_at: None,
                instance_launched_at: None,
                instance_ready_at: Utc::now(),
                old_terminated_at,
            },
            pricing: SwitchPricing {
                on_demand: Some(0.096),
                old_spot: None,
                new_spot: Some(0.031),
            },
            trigger: CommandTrigger::Manual,
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

    fn command_queue(
        command: Command,
    ) -> CommandQueue<MockCommandRepository, MockEventRepository> {
        let mut repo = MockCommandRepository::new();
        let for_get = command.clone();
        repo.expect_find_by_id()
            .returning(move |_| Ok(Some(for_get.clone())));
        let for_finish = command.clone();
        repo.expect_finish().returning(move |_, status, result, post_state| {
            let mut c = for_finish.clone();
            c.status = status;
            c.result = Some(result);
            c.post_state = post_state;
            Ok(c)
        });
        let mut events = MockEventRepository::new();
        events.expect_append_system_event().returning(|_| Ok(()));
        events
            .expect_insert_sse_event()
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
        CommandQueue::new(repo, EventBus::new(events))
    }

    fn base_repo(agent_id: Uuid) -> MockAgentRepository {
        let mut repo = MockAgentRepository::new();

        repo.expect_instance_by_id()
            .with(eq("i-B"))
            .returning(move |id| Ok(Some(instance(id, agent_id, InstanceRole::Launching))));
        repo.expect_promote_to_primary()
            .returning(move |id, agent_id, _| {
                Ok(instance(id, agent_id, InstanceRole::RunningPrimary))
            });
        repo.expect_set_current_instance()
            .returning(move |agent_id, _, _, _| {
                let mut a = agent(true);
                a.id = agent_id;
                Ok(a)
            });
        repo.expect_insert_switch().returning(|s| {
            Ok(Switch {
                id: Uuid::now_v7(),
                agent_id: s.agent_id,
                command_id: s.command_id,
                request_id: s.request_id,
                old_instance_id: s.old_instance_id,
                new_instance_id: s.new_instance_id,
                old_mode: s.old_mode,
                new_mode: s.new_mode,
                trigger: s.trigger,
                on_demand_price: s.on_demand_price,
                old_spot_price: s.old_spot_price,
                new_spot_price: s.new_spot_price,
                downtime_seconds: s.downtime_seconds,
                initiated_at: s.initiated_at,
                completed_at: s.completed_at,
                old_terminated_at: s.old_terminated_at,
                created_at: Utc::now(),
            })
        });

        repo
    }

    #[tokio::test]
    async fn test_switch_report_terminates_old_when_flag_and_timestamp() {
        let agent = agent(true);
        let command = switch_command(agent.id, "R1");
        let terminated_at = Some(Utc::now());

        let mut repo = base_repo(agent.id);
        let agent_id = agent.id;
        repo.expect_instance_by_id()
            .with(eq("i-A"))
            .returning(move |id| Ok(Some(instance(id, agent_id, InstanceRole::Zombie))));
        repo.expect_update_role()
            .withf(|id, to, _, terminated_at| {
                id == "i-A" && *to == InstanceRole::Terminated && terminated_at.is_some()
            })
            .times(1)
            .returning(move |id, _, _, _| {
                Ok(instance(id, agent_id, InstanceRole::Terminated))
            });

        let service = SwitchingService::new(
            Arc::new(repo),
            command_queue(command.clone()),
            events(),
            pricing(),
        );

        let switch = service
            .process_switch_report(agent.client_id, &agent, report(command.id, terminated_at))
            .await
            .unwrap();

        assert_eq!(switch.new_instance_id, "i-B");
        assert_eq!(switch.new_mode, AgentMode::Spot);
    }

    #[tokio::test]
    async fn test_switch_report_without_terminated_at_leaves_zombie() {
        let agent = agent(true);
        let command = switch_command(agent.id, "R1");

        let mut repo = base_repo(agent.id);
        // No oldTerminatedAt in the report: the old instance must not be
        // flipped to terminated, whatever the policy says
        repo.expect_update_role().times(0);

        let service = SwitchingService::new(
            Arc::new(repo),
            command_queue(command.clone()),
            events(),
            pricing(),
        );

        let switch = service
            .process_switch_report(agent.client_id, &agent, report(command.id, None))
            .await
            .unwrap();

        assert!(switch.old_terminated_at.is_none());
    }

    #[tokio::test]
    async fn test_switch_report_mode_mismatch_rejected() {
        let agent = agent(true);
        let command = switch_command(agent.id, "R1");

        let repo = base_repo(agent.id);
        let service = SwitchingService::new(
            Arc::new(repo),
            command_queue(command.clone()),
            events(),
            pricing(),
        );

        let mut bad = report(command.id, None);
        bad.new_instance.mode = AgentMode::Ondemand; // command targets spot

        let result = service
            .process_switch_report(agent.client_id, &agent, bad)
            .await;
        assert!(matches!(
            result,
            Err(AgentError::Command(CommandError::ReportMismatch(_)))
        ));
    }

    #[tokio::test]
    async fn test_manual_switch_requires_request_id() {
        let agent = agent(true);
        let repo = MockAgentRepository::new();
        let command = switch_command(agent.id, "R9");

        let service = SwitchingService::new(
            Arc::new(repo),
            command_queue(command),
            events(),
            pricing(),
        );

        let result = service
            .manual_switch(
                agent.client_id,
                &agent,
                ManualSwitchRequest {
                    target_mode: domain_commands::TargetMode::Spot,
                    target_pool_id: None,
                    request_id: None,
                },
                None,
                None,
            )
            .await;

        assert!(matches!(result, Err(AgentError::InvalidInput(_))));
    }
}
