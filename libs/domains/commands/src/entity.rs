use std::str::FromStr;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::{Command, CommandKind, CommandPayload, CommandStatus, CommandTrigger, TargetMode};

/// Sea-ORM entity for the commands table
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "commands")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub agent_id: Uuid,
    #[sea_orm(column_type = "String(StringLen::N(255))")]
    pub request_id: String,
    pub kind: CommandKind,
    #[sea_orm(column_type = "String(StringLen::N(32))", nullable)]
    pub target_mode: Option<String>,
    pub target_pool_id: Option<Uuid>,
    pub priority: i16,
    pub terminate_wait_seconds: Option<i32>,
    pub status: CommandStatus,
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Json,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub pre_state: Option<Json>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub post_state: Option<Json>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub result: Option<Json>,
    pub trigger: CommandTrigger,
    pub user_id: Option<Uuid>,
    pub version: i64,
    pub created_at: DateTimeWithTimeZone,
    pub executed_at: Option<DateTimeWithTimeZone>,
    pub completed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Command {
    type Error = serde_json::Error;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let payload: CommandPayload = serde_json::from_value(model.payload)?;

        Ok(Self {
            id: model.id,
            agent_id: model.agent_id,
            request_id: model.request_id,
            kind: model.kind,
            target_mode: model
                .target_mode
                .as_deref()
                .and_then(|m| TargetMode::from_str(m).ok()),
            target_pool_id: model.target_pool_id,
            priority: model.priority,
            terminate_wait_seconds: model.terminate_wait_seconds,
            status: model.status,
            payload,
            pre_state: model.pre_state,
            post_state: model.post_state,
            result: model.result,
            trigger: model.trigger,
            user_id: model.user_id,
            version: model.version,
            created_at: model.created_at.into(),
            executed_at: model.executed_at.map(Into::into),
            completed_at: model.completed_at.map(Into::into),
        })
    }
}
