use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::{Condition, Expr, ExprTrait};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::entity::{agents, clients, instances, switches};
use crate::error::{AgentError, AgentResult};
use crate::lifecycle;
use crate::models::{
    Agent, AgentFilter, AgentStatus, Client, Instance, InstanceRole, NewInstance, NewSwitch,
    NoticeStatus, Switch, SwitchFilter,
};
use crate::repository::{AgentContext, AgentRepository, NewAgent, PolicyFields};

type Tz = sea_orm::prelude::DateTimeWithTimeZone;

/// PostgreSQL implementation of AgentRepository
#[derive(Clone)]
pub struct PgAgentRepository {
    db: DatabaseConnection,
}

impl PgAgentRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn apply_context(model: &mut agents::ActiveModel, context: AgentContext) {
        if let Some(instance_id) = context.current_instance_id {
            model.current_instance_id = Set(Some(instance_id));
        }
        if let Some(instance_type) = context.instance_type {
            model.instance_type = Set(Some(instance_type));
        }
        if let Some(mode) = context.mode {
            model.mode = Set(mode);
        }
        if let Some(az) = context.az {
            model.az = Set(az);
        }
        if let Some(pool_id) = context.current_pool_id {
            model.current_pool_id = Set(Some(pool_id));
        }
        if let Some(agent_version) = context.agent_version {
            model.agent_version = Set(Some(agent_version));
        }
        if let Some(hostname) = context.hostname {
            model.hostname = Set(Some(hostname));
        }
        if let Some(private_ip) = context.private_ip {
            model.private_ip = Set(Some(private_ip));
        }
        if let Some(public_ip) = context.public_ip {
            model.public_ip = Set(Some(public_ip));
        }
    }

    async fn agent_model(&self, agent_id: Uuid) -> AgentResult<agents::Model> {
        agents::Entity::find_by_id(agent_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AgentError::NotFound(format!("agent {}", agent_id)))
    }
}

#[async_trait]
impl AgentRepository for PgAgentRepository {
    async fn insert_client(&self, client: Client) -> AgentResult<Client> {
        let model = clients::ActiveModel {
            id: Set(client.id),
            name: Set(client.name),
            auth_token_hash: Set(client.auth_token_hash),
            plan: Set(client.plan),
            max_agents: Set(client.max_agents),
            default_auto_switch_enabled: Set(client.default_auto_switch_enabled),
            default_manual_replica_enabled: Set(client.default_manual_replica_enabled),
            default_auto_terminate: Set(client.default_auto_terminate),
            created_at: Set(Utc::now().into()),
            updated_at: Set(Utc::now().into()),
        };

        let created = model.insert(&self.db).await?;
        Ok(created.into())
    }

    async fn client_by_id(&self, id: Uuid) -> AgentResult<Option<Client>> {
        let found = clients::Entity::find_by_id(id).one(&self.db).await?;
        Ok(found.map(Into::into))
    }

    async fn client_by_token_hash(&self, token_hash: &str) -> AgentResult<Option<Client>> {
        let found = clients::Entity::find()
            .filter(clients::Column::AuthTokenHash.eq(token_hash))
            .one(&self.db)
            .await?;
        Ok(found.map(Into::into))
    }

    async fn list_clients(&self) -> AgentResult<Vec<Client>> {
        let rows = clients::Entity::find()
            .order_by_asc(clients::Column::Name)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count_agents_for_client(&self, client_id: Uuid) -> AgentResult<u64> {
        use sea_orm::PaginatorTrait;

        let count = agents::Entity::find()
            .filter(agents::Column::ClientId.eq(client_id))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn insert_agent(&self, agent: NewAgent) -> AgentResult<Agent> {
        if agent.policy.auto_switch_enabled && agent.policy.manual_replica_enabled {
            return Err(AgentError::InvariantViolation(
                "auto_switch_enabled and manual_replica_enabled are mutually exclusive".to_string(),
            ));
        }

        let now = Utc::now();
        let mut model = agents::ActiveModel {
            id: Set(Uuid::now_v7()),
            client_id: Set(agent.client_id),
            logical_id: Set(agent.logical_id),
            current_instance_id: Set(None),
            region: Set(agent.region),
            az: Set(agent.az),
            instance_type: Set(Some(agent.instance_type)),
            mode: Set(agent.mode),
            current_pool_id: Set(None),
            auto_switch_enabled: Set(agent.policy.auto_switch_enabled),
            manual_replica_enabled: Set(agent.policy.manual_replica_enabled),
            auto_terminate: Set(agent.policy.auto_terminate),
            terminate_wait_seconds: Set(agent.policy.terminate_wait_seconds),
            last_heartbeat: Set(Some(now.into())),
            status: Set(AgentStatus::Online),
            notice_status: Set(NoticeStatus::None),
            notice_deadline: Set(None),
            failed_promotions: Set(0),
            fastest_pool_id: Set(None),
            agent_version: Set(None),
            hostname: Set(None),
            private_ip: Set(None),
            public_ip: Set(None),
            version: Set(1),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        Self::apply_context(&mut model, agent.context);

        let created = model.insert(&self.db).await?;
        Ok(created.into())
    }

    async fn agent_by_id(&self, id: Uuid) -> AgentResult<Option<Agent>> {
        let found = agents::Entity::find_by_id(id).one(&self.db).await?;
        Ok(found.map(Into::into))
    }

    async fn agent_by_logical_id(
        &self,
        client_id: Uuid,
        logical_id: &str,
    ) -> AgentResult<Option<Agent>> {
        let found = agents::Entity::find()
            .filter(agents::Column::ClientId.eq(client_id))
            .filter(agents::Column::LogicalId.eq(logical_id))
            .one(&self.db)
            .await?;
        Ok(found.map(Into::into))
    }

    async fn update_heartbeat(
        &self,
        agent_id: Uuid,
        status: AgentStatus,
        heartbeat_at: DateTime<Utc>,
        context: AgentContext,
    ) -> AgentResult<Agent> {
        let existing = self.agent_model(agent_id).await?;

        let mut model: agents::ActiveModel = existing.into();
        model.status = Set(status);
        model.last_heartbeat = Set(Some(heartbeat_at.into()));
        Self::apply_context(&mut model, context);

        let updated = model.update(&self.db).await?;
        Ok(updated.into())
    }

    async fn update_policy(
        &self,
        agent_id: Uuid,
        policy: PolicyFields,
        expected_version: i64,
    ) -> AgentResult<Agent> {
        if policy.auto_switch_enabled && policy.manual_replica_enabled {
            return Err(AgentError::InvariantViolation(
                "auto_switch_enabled and manual_replica_enabled are mutually exclusive".to_string(),
            ));
        }

        let updated = agents::Entity::update_many()
            .col_expr(
                agents::Column::AutoSwitchEnabled,
                Expr::value(policy.auto_switch_enabled),
            )
            .col_expr(
                agents::Column::ManualReplicaEnabled,
                Expr::value(policy.manual_replica_enabled),
            )
            .col_expr(
                agents::Column::AutoTerminate,
                Expr::value(policy.auto_terminate),
            )
            .col_expr(
                agents::Column::TerminateWaitSeconds,
                Expr::value(policy.terminate_wait_seconds),
            )
            .col_expr(
                agents::Column::Version,
                Expr::col(agents::Column::Version).add(1),
            )
            .filter(agents::Column::Id.eq(agent_id))
            .filter(agents::Column::Version.eq(expected_version))
            .exec(&self.db)
            .await?;

        if updated.rows_affected == 0 {
            // Distinguish a stale version from a missing agent
            self.agent_model(agent_id).await?;
            return Err(AgentError::OptimisticConflict {
                entity: "agent",
                id: agent_id.to_string(),
            });
        }

        Ok(self.agent_model(agent_id).await?.into())
    }

    async fn set_notice(
        &self,
        agent_id: Uuid,
        notice: NoticeStatus,
        deadline: Option<DateTime<Utc>>,
    ) -> AgentResult<Agent> {
        let existing = self.agent_model(agent_id).await?;

        let mut model: agents::ActiveModel = existing.into();
        model.notice_status = Set(notice);
        model.notice_deadline = Set(deadline.map(Into::into));

        let updated = model.update(&self.db).await?;
        Ok(updated.into())
    }

    async fn set_status(&self, agent_id: Uuid, status: AgentStatus) -> AgentResult<Agent> {
        let existing = self.agent_model(agent_id).await?;

        let mut model: agents::ActiveModel = existing.into();
        model.status = Set(status);

        let updated = model.update(&self.db).await?;
        Ok(updated.into())
    }

    async fn increment_failed_promotions(&self, agent_id: Uuid) -> AgentResult<i32> {
        agents::Entity::update_many()
            .col_expr(
                agents::Column::FailedPromotions,
                Expr::col(agents::Column::FailedPromotions).add(1),
            )
            .filter(agents::Column::Id.eq(agent_id))
            .exec(&self.db)
            .await?;

        Ok(self.agent_model(agent_id).await?.failed_promotions)
    }

    async fn reset_failed_promotions(&self, agent_id: Uuid) -> AgentResult<()> {
        agents::Entity::update_many()
            .col_expr(agents::Column::FailedPromotions, Expr::value(0))
            .filter(agents::Column::Id.eq(agent_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn quarantine(&self, agent_id: Uuid) -> AgentResult<Agent> {
        let existing = self.agent_model(agent_id).await?;

        let mut model: agents::ActiveModel = existing.into();
        model.status = Set(AgentStatus::Error);
        model.auto_switch_enabled = Set(false);

        let updated = model.update(&self.db).await?;
        Ok(updated.into())
    }

    async fn set_fastest_pool(&self, agent_id: Uuid, pool_id: Uuid) -> AgentResult<()> {
        agents::Entity::update_many()
            .col_expr(agents::Column::FastestPoolId, Expr::value(pool_id))
            .filter(agents::Column::Id.eq(agent_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn set_current_instance(
        &self,
        agent_id: Uuid,
        instance_id: String,
        mode: crate::models::AgentMode,
        pool_id: Option<Uuid>,
    ) -> AgentResult<Agent> {
        let existing = self.agent_model(agent_id).await?;

        let mut model: agents::ActiveModel = existing.into();
        model.current_instance_id = Set(Some(instance_id));
        model.mode = Set(mode);
        model.current_pool_id = Set(pool_id);
        model.notice_status = Set(NoticeStatus::None);
        model.notice_deadline = Set(None);

        let updated = model.update(&self.db).await?;
        Ok(updated.into())
    }

    async fn list_agents(
        &self,
        client_id: Option<Uuid>,
        filter: AgentFilter,
    ) -> AgentResult<Vec<Agent>> {
        let mut query = agents::Entity::find();

        if let Some(client_id) = client_id {
            query = query.filter(agents::Column::ClientId.eq(client_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(agents::Column::Status.eq(status));
        }
        if let Some(mode) = filter.mode {
            query = query.filter(agents::Column::Mode.eq(mode));
        }
        if let Some(region) = filter.region {
            query = query.filter(agents::Column::Region.eq(region));
        }

        let rows = query
            .order_by_asc(agents::Column::CreatedAt)
            .limit(filter.limit)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn agents_with_stale_heartbeat(&self, cutoff: DateTime<Utc>) -> AgentResult<Vec<Agent>> {
        let rows = agents::Entity::find()
            .filter(agents::Column::Status.eq(AgentStatus::Online))
            .filter(
                Condition::any()
                    .add(agents::Column::LastHeartbeat.lt::<Tz>(cutoff.into()))
                    .add(agents::Column::LastHeartbeat.is_null()),
            )
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn agents_with_overdue_notice(&self, now: DateTime<Utc>) -> AgentResult<Vec<Agent>> {
        let rows = agents::Entity::find()
            .filter(agents::Column::NoticeStatus.ne(NoticeStatus::None))
            .filter(agents::Column::NoticeDeadline.lt::<Tz>(now.into()))
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn agents_with_replica_policy(&self) -> AgentResult<Vec<Agent>> {
        let rows = agents::Entity::find()
            .filter(agents::Column::ManualReplicaEnabled.eq(true))
            .filter(agents::Column::Status.ne(AgentStatus::Error))
            .order_by_asc(agents::Column::CreatedAt)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_instance(&self, instance: NewInstance) -> AgentResult<Instance> {
        let now = Utc::now();
        let model = instances::ActiveModel {
            id: Set(instance.id),
            agent_id: Set(instance.agent_id),
            role: Set(instance.role),
            instance_type: Set(instance.instance_type),
            region: Set(instance.region),
            az: Set(instance.az),
            pool_id: Set(instance.pool_id),
            spot_price: Set(instance.spot_price),
            ondemand_price: Set(instance.ondemand_price),
            baseline_ondemand_price: Set(instance.ondemand_price),
            launch_requested_at: Set(instance.launch_requested_at.map(Into::into)),
            launch_confirmed_at: Set(instance.launch_confirmed_at.map(Into::into)),
            last_switch_at: Set(None),
            terminate_requested_at: Set(None),
            terminated_at: Set(None),
            version: Set(1),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let created = model.insert(&self.db).await?;
        Ok(created.into())
    }

    async fn instance_by_id(&self, id: &str) -> AgentResult<Option<Instance>> {
        let found = instances::Entity::find_by_id(id).one(&self.db).await?;
        Ok(found.map(Into::into))
    }

    async fn instances_for_agent(&self, agent_id: Uuid) -> AgentResult<Vec<Instance>> {
        let rows = instances::Entity::find()
            .filter(instances::Column::AgentId.eq(agent_id))
            .order_by_asc(instances::Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn primary_for_agent(&self, agent_id: Uuid) -> AgentResult<Option<Instance>> {
        let found = instances::Entity::find()
            .filter(instances::Column::AgentId.eq(agent_id))
            .filter(
                instances::Column::Role
                    .is_in([InstanceRole::RunningPrimary, InstanceRole::Promoting]),
            )
            .one(&self.db)
            .await?;
        Ok(found.map(Into::into))
    }

    async fn update_role(
        &self,
        instance_id: &str,
        to: InstanceRole,
        expected_version: i64,
        terminated_at: Option<DateTime<Utc>>,
    ) -> AgentResult<Instance> {
        let current = instances::Entity::find_by_id(instance_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AgentError::NotFound(format!("instance {}", instance_id)))?;

        if !lifecycle::can_transition(current.role, to) {
            return Err(AgentError::IllegalTransition(format!(
                "instance {}: {} → {}",
                instance_id, current.role, to
            )));
        }

        let mut update = instances::Entity::update_many()
            .col_expr(instances::Column::Role, Expr::value(to))
            .col_expr(
                instances::Column::Version,
                Expr::col(instances::Column::Version).add(1),
            )
            .filter(instances::Column::Id.eq(instance_id))
            .filter(instances::Column::Version.eq(expected_version));

        if let Some(terminated_at) = terminated_at {
            update = update.col_expr(
                instances::Column::TerminatedAt,
                Expr::value(Tz::from(terminated_at)),
            );
        }

        let result = update.exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(AgentError::OptimisticConflict {
                entity: "instance",
                id: instance_id.to_string(),
            });
        }

        self.instance_by_id(instance_id)
            .await?
            .ok_or_else(|| AgentError::NotFound(format!("instance {}", instance_id)))
    }

    async fn promote_to_primary(
        &self,
        new_instance_id: &str,
        agent_id: Uuid,
        expected_version: i64,
    ) -> AgentResult<Instance> {
        let new_id = new_instance_id.to_string();

        let promoted = self
            .db
            .transaction::<_, instances::Model, AgentError>(move |txn| {
                Box::pin(async move {
                    let now = Tz::from(Utc::now());

                    // Demote whatever currently holds the primary role for
                    // this agent; the demoted instance keeps history as a
                    // zombie with its demotion time stamped
                    instances::Entity::update_many()
                        .col_expr(instances::Column::Role, Expr::value(InstanceRole::Zombie))
                        .col_expr(instances::Column::TerminatedAt, Expr::value(now))
                        .col_expr(
                            instances::Column::Version,
                            Expr::col(instances::Column::Version).add(1),
                        )
                        .filter(instances::Column::AgentId.eq(agent_id))
                        .filter(instances::Column::Role.is_in([
                            InstanceRole::RunningPrimary,
                            InstanceRole::Promoting,
                        ]))
                        .filter(instances::Column::Id.ne(new_id.clone()))
                        .exec(txn)
                        .await?;

                    // Promote the target iff the caller's version is current;
                    // zero rows aborts the whole transaction
                    let updated = instances::Entity::update_many()
                        .col_expr(
                            instances::Column::Role,
                            Expr::value(InstanceRole::RunningPrimary),
                        )
                        .col_expr(instances::Column::LastSwitchAt, Expr::value(now))
                        .col_expr(
                            instances::Column::Version,
                            Expr::col(instances::Column::Version).add(1),
                        )
                        .filter(instances::Column::Id.eq(new_id.clone()))
                        .filter(instances::Column::Version.eq(expected_version))
                        .filter(instances::Column::Role.is_in([
                            InstanceRole::Launching,
                            InstanceRole::RunningReplica,
                            InstanceRole::Promoting,
                            InstanceRole::RunningPrimary,
                        ]))
                        .exec(txn)
                        .await?;

                    if updated.rows_affected == 0 {
                        return Err(AgentError::OptimisticConflict {
                            entity: "instance",
                            id: new_id.clone(),
                        });
                    }

                    instances::Entity::find_by_id(new_id.clone())
                        .one(txn)
                        .await?
                        .ok_or_else(|| AgentError::NotFound(format!("instance {}", new_id)))
                })
            })
            .await
            .map_err(|e| match e {
                sea_orm::TransactionError::Connection(db) => AgentError::Database(db),
                sea_orm::TransactionError::Transaction(inner) => inner,
            })?;

        Ok(promoted.into())
    }

    async fn purge_zombies(&self, cutoff: DateTime<Utc>) -> AgentResult<u64> {
        let result = instances::Entity::update_many()
            .col_expr(
                instances::Column::Role,
                Expr::value(InstanceRole::Terminated),
            )
            .col_expr(
                instances::Column::Version,
                Expr::col(instances::Column::Version).add(1),
            )
            .filter(instances::Column::Role.eq(InstanceRole::Zombie))
            .filter(
                Condition::any()
                    .add(instances::Column::TerminatedAt.lt::<Tz>(cutoff.into()))
                    .add(
                        Condition::all()
                            .add(instances::Column::TerminatedAt.is_null())
                            .add(instances::Column::UpdatedAt.lt::<Tz>(cutoff.into())),
                    ),
            )
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    async fn insert_switch(&self, switch: NewSwitch) -> AgentResult<Switch> {
        let model = switches::ActiveModel {
            id: Set(Uuid::now_v7()),
            agent_id: Set(switch.agent_id),
            command_id: Set(switch.command_id),
            request_id: Set(switch.request_id),
            old_instance_id: Set(switch.old_instance_id),
            new_instance_id: Set(switch.new_instance_id),
            old_mode: Set(switch.old_mode.to_string()),
            new_mode: Set(switch.new_mode.to_string()),
            trigger: Set(switch.trigger.to_string()),
            on_demand_price: Set(switch.on_demand_price),
            old_spot_price: Set(switch.old_spot_price),
            new_spot_price: Set(switch.new_spot_price),
            downtime_seconds: Set(switch.downtime_seconds),
            initiated_at: Set(switch.initiated_at.into()),
            completed_at: Set(switch.completed_at.into()),
            old_terminated_at: Set(switch.old_terminated_at.map(Into::into)),
            created_at: Set(Utc::now().into()),
        };

        let created = model.insert(&self.db).await?;
        Ok(created.into())
    }

    async fn list_switches(
        &self,
        client_id: Option<Uuid>,
        filter: SwitchFilter,
    ) -> AgentResult<Vec<Switch>> {
        let mut query = switches::Entity::find();

        if let Some(agent_id) = filter.agent_id {
            query = query.filter(switches::Column::AgentId.eq(agent_id));
        }

        // Tenant scoping joins through the agent table
        if let Some(client_id) = client_id {
            let agent_ids: Vec<Uuid> = agents::Entity::find()
                .filter(agents::Column::ClientId.eq(client_id))
                .all(&self.db)
                .await?
                .into_iter()
                .map(|a| a.id)
                .collect();
            query = query.filter(switches::Column::AgentId.is_in(agent_ids));
        }

        let rows = query
            .order_by_desc(switches::Column::CreatedAt)
            .limit(filter.limit)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
