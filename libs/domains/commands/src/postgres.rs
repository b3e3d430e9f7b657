use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use uuid::Uuid;

use crate::entity::{self, Column, Entity};
use crate::error::{CommandError, CommandResult};
use crate::models::{Command, CommandFilter, CommandStatus, NewCommand};
use crate::repository::CommandRepository;

/// PostgreSQL implementation of CommandRepository
#[derive(Clone)]
pub struct PgCommandRepository {
    db: DatabaseConnection,
}

impl PgCommandRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CommandRepository for PgCommandRepository {
    async fn insert(&self, input: NewCommand) -> CommandResult<Command> {
        let kind = input.payload.kind();
        let target_mode = match &input.payload {
            crate::models::CommandPayload::Switch { target_mode, .. } => {
                Some(target_mode.to_string())
            }
            _ => None,
        };
        let target_pool_id = match &input.payload {
            crate::models::CommandPayload::Switch { target_pool_id, .. } => *target_pool_id,
            crate::models::CommandPayload::LaunchInstance { pool_id, .. } => Some(*pool_id),
            _ => None,
        };

        let model = entity::ActiveModel {
            id: Set(Uuid::now_v7()),
            agent_id: Set(input.agent_id),
            request_id: Set(input.request_id),
            kind: Set(kind),
            target_mode: Set(target_mode),
            target_pool_id: Set(target_pool_id),
            priority: Set(input.priority),
            terminate_wait_seconds: Set(input.terminate_wait_seconds),
            status: Set(CommandStatus::Pending),
            payload: Set(serde_json::to_value(&input.payload)?),
            pre_state: Set(input.pre_state),
            post_state: Set(None),
            result: Set(None),
            trigger: Set(input.trigger),
            user_id: Set(input.user_id),
            version: Set(1),
            created_at: Set(Utc::now().into()),
            executed_at: Set(None),
            completed_at: Set(None),
        };

        let created = model.insert(&self.db).await?;
        Ok(created.try_into()?)
    }

    async fn find_by_id(&self, id: Uuid) -> CommandResult<Option<Command>> {
        let found = Entity::find_by_id(id).one(&self.db).await?;
        found.map(TryInto::try_into).transpose().map_err(Into::into)
    }

    async fn find_by_request_id(&self, request_id: &str) -> CommandResult<Option<Command>> {
        let found = Entity::find()
            .filter(Column::RequestId.eq(request_id))
            .one(&self.db)
            .await?;
        found.map(TryInto::try_into).transpose().map_err(Into::into)
    }

    async fn pending_for_agent(&self, agent_id: Uuid) -> CommandResult<Vec<Command>> {
        let rows = Entity::find()
            .filter(Column::AgentId.eq(agent_id))
            .filter(
                Column::Status
                    .is_in([CommandStatus::Pending, CommandStatus::Executing]),
            )
            .order_by_desc(Column::Priority)
            .order_by_asc(Column::CreatedAt)
            .all(&self.db)
            .await?;

        rows.into_iter()
            .map(|m| m.try_into().map_err(CommandError::from))
            .collect()
    }

    async fn mark_delivered(&self, ids: Vec<Uuid>) -> CommandResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        Entity::update_many()
            .col_expr(Column::Status, Expr::value(CommandStatus::Executing))
            .col_expr(
                Column::ExecutedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
            )
            .col_expr(Column::Version, Expr::col(Column::Version).add(1))
            .filter(Column::Id.is_in(ids))
            .filter(Column::Status.eq(CommandStatus::Pending))
            .exec(&self.db)
            .await?;

        Ok(())
    }

    async fn finish(
        &self,
        id: Uuid,
        status: CommandStatus,
        result: serde_json::Value,
        post_state: Option<serde_json::Value>,
    ) -> CommandResult<Command> {
        if !status.is_terminal() {
            return Err(CommandError::ReportMismatch(format!(
                "finish() requires a terminal status, got {}",
                status
            )));
        }

        // Guarded update: terminal rows never match the filter, so a repeat
        // report cannot mutate them
        let updated = Entity::update_many()
            .col_expr(Column::Status, Expr::value(status))
            .col_expr(Column::Result, Expr::value(result))
            .col_expr(Column::PostState, Expr::value(post_state))
            .col_expr(
                Column::CompletedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
            )
            .col_expr(Column::Version, Expr::col(Column::Version).add(1))
            .filter(Column::Id.eq(id))
            .filter(
                Column::Status
                    .is_in([CommandStatus::Pending, CommandStatus::Executing]),
            )
            .exec(&self.db)
            .await?;

        if updated.rows_affected == 0 {
            return match self.find_by_id(id).await? {
                Some(_) => Err(CommandError::TerminalState(id)),
                None => Err(CommandError::NotFound(id)),
            };
        }

        self.find_by_id(id)
            .await?
            .ok_or(CommandError::NotFound(id))
    }

    async fn list(&self, filter: CommandFilter) -> CommandResult<Vec<Command>> {
        let mut query = Entity::find();

        if let Some(agent_id) = filter.agent_id {
            query = query.filter(Column::AgentId.eq(agent_id));
        }

        if let Some(status) = filter.status {
            query = query.filter(Column::Status.eq(status));
        }

        if let Some(kind) = filter.kind {
            query = query.filter(Column::Kind.eq(kind));
        }

        if let Some(trigger) = filter.trigger {
            query = query.filter(Column::Trigger.eq(trigger));
        }

        let rows = query
            .order_by_desc(Column::CreatedAt)
            .limit(filter.limit)
            .all(&self.db)
            .await?;

        rows.into_iter()
            .map(|m| m.try_into().map_err(CommandError::from))
            .collect()
    }
}
