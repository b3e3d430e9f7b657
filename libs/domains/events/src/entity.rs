use crate::models::EventSeverity;

/// Sea-ORM entity for the sse_events table
pub mod sse_events {
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "sse_events")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub client_id: Uuid,
        #[sea_orm(column_type = "String(StringLen::N(64))")]
        pub event_type: String,
        #[sea_orm(column_type = "JsonBinary")]
        pub payload: Json,
        pub delivered: bool,
        pub created_at: DateTimeWithTimeZone,
        pub expires_at: DateTimeWithTimeZone,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Sea-ORM entity for the system_events audit table
pub mod system_events {
    use super::EventSeverity;
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "system_events")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub client_id: Option<Uuid>,
        pub agent_id: Option<Uuid>,
        pub severity: EventSeverity,
        #[sea_orm(column_type = "String(StringLen::N(64))")]
        pub event_type: String,
        #[sea_orm(column_type = "JsonBinary")]
        pub context: Json,
        pub created_at: DateTimeWithTimeZone,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

// Conversions from Sea-ORM models to domain types

impl From<sse_events::Model> for crate::models::SseEvent {
    fn from(model: sse_events::Model) -> Self {
        Self {
            id: model.id,
            client_id: model.client_id,
            event_type: model.event_type,
            payload: model.payload,
            delivered: model.delivered,
            created_at: model.created_at.into(),
            expires_at: model.expires_at.into(),
        }
    }
}

impl From<system_events::Model> for crate::models::SystemEvent {
    fn from(model: system_events::Model) -> Self {
        Self {
            id: model.id,
            client_id: model.client_id,
            agent_id: model.agent_id,
            severity: model.severity,
            event_type: model.event_type,
            context: model.context,
            created_at: model.created_at.into(),
        }
    }
}
