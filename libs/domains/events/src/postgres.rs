use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use uuid::Uuid;

use crate::entity::{sse_events, system_events};
use crate::error::EventResult;
use crate::models::{RecordSystemEvent, SseEvent, SystemEvent, SystemEventFilter};
use crate::repository::EventRepository;

/// PostgreSQL implementation of EventRepository
#[derive(Clone)]
pub struct PgEventRepository {
    db: DatabaseConnection,
}

impl PgEventRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn append_system_event(&self, input: RecordSystemEvent) -> EventResult<()> {
        let model = system_events::ActiveModel {
            id: NotSet,
            client_id: Set(input.client_id),
            agent_id: Set(input.agent_id),
            severity: Set(input.severity),
            event_type: Set(input.event_type),
            context: Set(input.context),
            created_at: Set(Utc::now().into()),
        };
        model.insert(&self.db).await?;
        Ok(())
    }

    async fn insert_sse_event(
        &self,
        client_id: Uuid,
        event_type: String,
        payload: serde_json::Value,
        expires_at: DateTime<Utc>,
    ) -> EventResult<SseEvent> {
        let model = sse_events::ActiveModel {
            id: Set(Uuid::now_v7()),
            client_id: Set(client_id),
            event_type: Set(event_type),
            payload: Set(payload),
            delivered: Set(false),
            created_at: Set(Utc::now().into()),
            expires_at: Set(expires_at.into()),
        };
        let result = model.insert(&self.db).await?;
        Ok(result.into())
    }

    async fn pending_sse_for_client(
        &self,
        client_id: Uuid,
        now: DateTime<Utc>,
    ) -> EventResult<Vec<SseEvent>> {
        let rows = sse_events::Entity::find()
            .filter(sse_events::Column::ClientId.eq(client_id))
            .filter(sse_events::Column::Delivered.eq(false))
            .filter(sse_events::Column::ExpiresAt.gt::<sea_orm::prelude::DateTimeWithTimeZone>(
                now.into(),
            ))
            .order_by_asc(sse_events::Column::CreatedAt)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_delivered(&self, ids: Vec<Uuid>) -> EventResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        sse_events::Entity::update_many()
            .col_expr(sse_events::Column::Delivered, sea_orm::sea_query::Expr::value(true))
            .filter(sse_events::Column::Id.is_in(ids))
            .exec(&self.db)
            .await?;

        Ok(())
    }

    async fn delete_expired_sse(&self, now: DateTime<Utc>) -> EventResult<u64> {
        let result = sse_events::Entity::delete_many()
            .filter(sse_events::Column::ExpiresAt.lte::<sea_orm::prelude::DateTimeWithTimeZone>(
                now.into(),
            ))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    async fn list_system_events(&self, filter: SystemEventFilter) -> EventResult<Vec<SystemEvent>> {
        let mut query = system_events::Entity::find();

        if let Some(agent_id) = filter.agent_id {
            query = query.filter(system_events::Column::AgentId.eq(agent_id));
        }

        if let Some(event_type) = filter.event_type {
            query = query.filter(system_events::Column::EventType.eq(event_type));
        }

        if let Some(severity) = filter.severity {
            query = query.filter(system_events::Column::Severity.eq(severity));
        }

        let rows = query
            .order_by_desc(system_events::Column::CreatedAt)
            .limit(filter.limit)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
