use std::sync::Arc;
use uuid::Uuid;

use domain_agents::Agent;
use domain_commands::{
    CommandPayload, CommandQueue, CommandRepository, CommandTrigger, NewCommand,
};
use domain_events::{EventBus, EventRepository, EventSeverity, event_types};

use crate::error::{ReplicaError, ReplicaResult};
use crate::models::{NewReplica, ReplicaInstance, ReplicaKind, ReplicaStatus, ReplicaStatusUpdate};
use crate::repository::ReplicaRepository;

/// Replica bookkeeping: creation with its launch work order, agent work-order
/// polling, binding, and status updates.
pub struct ReplicaService<Q, C, E>
where
    Q: ReplicaRepository,
    C: CommandRepository,
    E: EventRepository,
{
    repository: Arc<Q>,
    commands: CommandQueue<C, E>,
    events: EventBus<E>,
}

impl<Q, C, E> Clone for ReplicaService<Q, C, E>
where
    Q: ReplicaRepository,
    C: CommandRepository,
    E: EventRepository,
{
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            commands: self.commands.clone(),
            events: self.events.clone(),
        }
    }
}

impl<Q, C, E> ReplicaService<Q, C, E>
where
    Q: ReplicaRepository,
    C: CommandRepository,
    E: EventRepository,
{
    pub fn new(repository: Arc<Q>, commands: CommandQueue<C, E>, events: EventBus<E>) -> Self {
        Self {
            repository,
            commands,
            events,
        }
    }

    pub fn repository(&self) -> Arc<Q> {
        self.repository.clone()
    }

    /// Create a replica record and enqueue its `launch_instance` work order.
    /// The launch command's request id is derived from the replica id, so a
    /// coordinator or orchestrator retry can never double-launch.
    pub async fn create_replica(
        &self,
        client_id: Uuid,
        agent: &Agent,
        pool_id: Uuid,
        kind: ReplicaKind,
        priority: i16,
        trigger: CommandTrigger,
    ) -> ReplicaResult<ReplicaInstance> {
        let replica = self
            .repository
            .insert(NewReplica {
                agent_id: agent.id,
                parent_instance_id: agent.current_instance_id.clone(),
                pool_id,
                kind,
            })
            .await?;

        let command = NewCommand::new(
            agent.id,
            format!("launch-replica-{}", replica.id),
            CommandPayload::LaunchInstance {
                pool_id,
                replica_id: replica.id,
                emergency: kind == ReplicaKind::Emergency,
            },
        )
        .priority(priority)
        .trigger(trigger);

        self.commands.enqueue(client_id, command).await?;

        self.events
            .publish(
                client_id,
                Some(agent.id),
                EventSeverity::Info,
                event_types::REPLICA_CREATED,
                serde_json::json!({
                    "replicaId": replica.id,
                    "poolId": pool_id,
                    "kind": kind,
                }),
            )
            .await;

        Ok(replica)
    }

    /// Work orders for the agent to act on.
    pub async fn list_for_agent(
        &self,
        agent_id: Uuid,
        status: Option<ReplicaStatus>,
    ) -> ReplicaResult<Vec<ReplicaInstance>> {
        self.repository.for_agent(agent_id, status).await
    }

    /// Replicas still bindable for failover.
    pub async fn active_for_agent(&self, agent_id: Uuid) -> ReplicaResult<Vec<ReplicaInstance>> {
        self.repository.active_for_agent(agent_id).await
    }

    pub async fn get_owned(&self, agent: &Agent, replica_id: Uuid) -> ReplicaResult<ReplicaInstance> {
        let replica = self
            .repository
            .by_id(replica_id)
            .await?
            .ok_or(ReplicaError::NotFound(replica_id))?;

        if replica.agent_id != agent.id {
            return Err(ReplicaError::Forbidden(format!(
                "replica {} does not belong to agent {}",
                replica_id, agent.id
            )));
        }

        Ok(replica)
    }

    /// Bind the concrete cloud instance id the agent launched.
    pub async fn bind_instance(
        &self,
        agent: &Agent,
        replica_id: Uuid,
        instance_id: String,
    ) -> ReplicaResult<ReplicaInstance> {
        self.get_owned(agent, replica_id).await?;
        self.repository.bind_instance(replica_id, instance_id).await
    }

    /// Apply a replica lifecycle status report from the agent.
    pub async fn update_status(
        &self,
        client_id: Uuid,
        agent: &Agent,
        replica_id: Uuid,
        update: ReplicaStatusUpdate,
    ) -> ReplicaResult<ReplicaInstance> {
        let current = self.get_owned(agent, replica_id).await?;

        let updated = self
            .repository
            .set_status(replica_id, update.status, update.sync_lag_seconds)
            .await?;

        if current.status != ReplicaStatus::Ready && updated.status == ReplicaStatus::Ready {
            self.events
                .publish(
                    client_id,
                    Some(agent.id),
                    EventSeverity::Info,
                    event_types::REPLICA_READY,
                    serde_json::json!({
                        "replicaId": updated.id,
                        "poolId": updated.pool_id,
                        "bootSeconds": updated.boot_seconds(),
                    }),
                )
                .await;
        }

        Ok(updated)
    }
}
