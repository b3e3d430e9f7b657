use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::{ReplicaKind, ReplicaStatus};

/// Sea-ORM entity for the replica_instances table
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "replica_instances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub agent_id: Uuid,
    #[sea_orm(column_type = "String(StringLen::N(255))", nullable)]
    pub parent_instance_id: Option<String>,
    #[sea_orm(column_type = "String(StringLen::N(255))", nullable)]
    pub instance_id: Option<String>,
    pub pool_id: Uuid,
    pub kind: ReplicaKind,
    pub status: ReplicaStatus,
    pub sync_lag_seconds: Option<f64>,
    pub requested_at: DateTimeWithTimeZone,
    pub launched_at: Option<DateTimeWithTimeZone>,
    pub ready_at: Option<DateTimeWithTimeZone>,
    pub promoted_at: Option<DateTimeWithTimeZone>,
    pub terminated_at: Option<DateTimeWithTimeZone>,
    pub version: i64,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::models::ReplicaInstance {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            agent_id: model.agent_id,
            parent_instance_id: model.parent_instance_id,
            instance_id: model.instance_id,
            pool_id: model.pool_id,
            kind: model.kind,
            status: model.status,
            sync_lag_seconds: model.sync_lag_seconds,
            requested_at: model.requested_at.into(),
            launched_at: model.launched_at.map(Into::into),
            ready_at: model.ready_at.map(Into::into),
            promoted_at: model.promoted_at.map(Into::into),
            terminated_at: model.terminated_at.map(Into::into),
            version: model.version,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }
}
