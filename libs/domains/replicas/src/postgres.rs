use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use uuid::Uuid;

use crate::entity::{self, Column, Entity};
use crate::error::{ReplicaError, ReplicaResult};
use crate::models::{NewReplica, ReplicaInstance, ReplicaStatus};
use crate::repository::{BootObservation, ReplicaRepository};

/// PostgreSQL implementation of ReplicaRepository
#[derive(Clone)]
pub struct PgReplicaRepository {
    db: DatabaseConnection,
}

impl PgReplicaRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn model(&self, id: Uuid) -> ReplicaResult<entity::Model> {
        Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(ReplicaError::NotFound(id))
    }
}

#[async_trait]
impl ReplicaRepository for PgReplicaRepository {
    async fn insert(&self, replica: NewReplica) -> ReplicaResult<ReplicaInstance> {
        let now = Utc::now();
        let model = entity::ActiveModel {
            id: Set(Uuid::now_v7()),
            agent_id: Set(replica.agent_id),
            parent_instance_id: Set(replica.parent_instance_id),
            instance_id: Set(None),
            pool_id: Set(replica.pool_id),
            kind: Set(replica.kind),
            status: Set(ReplicaStatus::Launching),
            sync_lag_seconds: Set(None),
            requested_at: Set(now.into()),
            launched_at: Set(None),
            ready_at: Set(None),
            promoted_at: Set(None),
            terminated_at: Set(None),
            version: Set(1),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let created = model.insert(&self.db).await?;
        Ok(created.into())
    }

    async fn by_id(&self, id: Uuid) -> ReplicaResult<Option<ReplicaInstance>> {
        let found = Entity::find_by_id(id).one(&self.db).await?;
        Ok(found.map(Into::into))
    }

    async fn active_for_agent(&self, agent_id: Uuid) -> ReplicaResult<Vec<ReplicaInstance>> {
        let rows = Entity::find()
            .filter(Column::AgentId.eq(agent_id))
            .filter(Column::Status.is_in([
                ReplicaStatus::Launching,
                ReplicaStatus::Syncing,
                ReplicaStatus::Ready,
            ]))
            .order_by_asc(Column::RequestedAt)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn for_agent(
        &self,
        agent_id: Uuid,
        status: Option<ReplicaStatus>,
    ) -> ReplicaResult<Vec<ReplicaInstance>> {
        let mut query = Entity::find().filter(Column::AgentId.eq(agent_id));

        if let Some(status) = status {
            query = query.filter(Column::Status.eq(status));
        }

        let rows = query
            .order_by_asc(Column::RequestedAt)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn bind_instance(&self, id: Uuid, instance_id: String) -> ReplicaResult<ReplicaInstance> {
        let existing = self.model(id).await?;

        let mut model: entity::ActiveModel = existing.into();
        model.instance_id = Set(Some(instance_id));
        model.launched_at = Set(Some(Utc::now().into()));

        let updated = model.update(&self.db).await?;
        Ok(updated.into())
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: ReplicaStatus,
        sync_lag_seconds: Option<f64>,
    ) -> ReplicaResult<ReplicaInstance> {
        let existing = self.model(id).await?;

        let now = Utc::now();
        let mut model: entity::ActiveModel = existing.into();
        model.status = Set(status);
        if sync_lag_seconds.is_some() {
            model.sync_lag_seconds = Set(sync_lag_seconds);
        }
        match status {
            ReplicaStatus::Ready => model.ready_at = Set(Some(now.into())),
            ReplicaStatus::Promoted => model.promoted_at = Set(Some(now.into())),
            ReplicaStatus::Terminated => model.terminated_at = Set(Some(now.into())),
            _ => {}
        }
        model.version = Set(model.version.clone().unwrap() + 1);

        let updated = model.update(&self.db).await?;
        Ok(updated.into())
    }

    async fn boot_observations(&self, pool_ids: Vec<Uuid>) -> ReplicaResult<Vec<BootObservation>> {
        if pool_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = Entity::find()
            .filter(Column::PoolId.is_in(pool_ids))
            .filter(Column::Status.eq(ReplicaStatus::Promoted))
            .order_by_desc(Column::PromotedAt)
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let replica: ReplicaInstance = row.into();
                let boot_seconds = replica.boot_seconds()?;
                Some(BootObservation {
                    pool_id: replica.pool_id,
                    boot_seconds,
                    promoted_at: replica.promoted_at?,
                })
            })
            .collect())
    }
}
