use chrono::{DateTime, Utc};
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use strum::Display;
use utoipa::ToSchema;
use uuid::Uuid;

/// Audit severity
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    Default,
    DeriveActiveEnum,
    EnumIter,
    ToSchema,
    Hash,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "event_severity")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EventSeverity {
    #[sea_orm(string_value = "debug")]
    Debug,
    #[default]
    #[sea_orm(string_value = "info")]
    Info,
    #[sea_orm(string_value = "warning")]
    Warning,
    #[sea_orm(string_value = "critical")]
    Critical,
}

/// Well-known event type tags shared by both channels.
pub mod event_types {
    pub const AGENT_REGISTERED: &str = "AGENT_REGISTERED";
    pub const AGENT_ONLINE: &str = "AGENT_ONLINE";
    pub const AGENT_OFFLINE: &str = "AGENT_OFFLINE";
    pub const AGENT_ERROR: &str = "AGENT_ERROR";
    pub const ROLE_CHANGED: &str = "ROLE_CHANGED";
    pub const COMMAND_CREATED: &str = "COMMAND_CREATED";
    pub const COMMAND_COMPLETED: &str = "COMMAND_COMPLETED";
    pub const COMMAND_FAILED: &str = "COMMAND_FAILED";
    pub const SWITCH_COMPLETED: &str = "SWITCH_COMPLETED";
    pub const SWITCH_REPORT_REJECTED: &str = "SWITCH_REPORT_REJECTED";
    pub const REBALANCE_NOTICE: &str = "REBALANCE_NOTICE";
    pub const TERMINATION_NOTICE: &str = "TERMINATION_NOTICE";
    pub const EMERGENCY_PROMOTION_WITHOUT_HEALTH_CHECK: &str =
        "EMERGENCY_PROMOTION_WITHOUT_HEALTH_CHECK";
    pub const EMERGENCY_PROMOTION_FAILED: &str = "EMERGENCY_PROMOTION_FAILED";
    pub const DEADLINE_EXCEEDED: &str = "DEADLINE_EXCEEDED";
    pub const REPLICA_CREATED: &str = "REPLICA_CREATED";
    pub const REPLICA_READY: &str = "REPLICA_READY";
    pub const REPLICA_PRICE_DRIFT: &str = "REPLICA_PRICE_DRIFT";
    pub const ZOMBIES_PURGED: &str = "ZOMBIES_PURGED";
    pub const CONSOLIDATION_COMPLETED: &str = "CONSOLIDATION_COMPLETED";
    pub const CONSOLIDATION_FAILED: &str = "CONSOLIDATION_FAILED";
    pub const INVARIANT_VIOLATION: &str = "INVARIANT_VIOLATION";
    pub const POLICY_UPDATED: &str = "POLICY_UPDATED";
    pub const MODEL_ACTIVATED: &str = "MODEL_ACTIVATED";
}

/// One audit entry, reconstructable after the fact.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SystemEvent {
    pub id: i64,
    pub client_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub severity: EventSeverity,
    pub event_type: String,
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Input for appending an audit entry.
#[derive(Debug, Clone)]
pub struct RecordSystemEvent {
    pub client_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub severity: EventSeverity,
    pub event_type: String,
    pub context: serde_json::Value,
}

impl RecordSystemEvent {
    pub fn new(event_type: &str, severity: EventSeverity) -> Self {
        Self {
            client_id: None,
            agent_id: None,
            severity,
            event_type: event_type.to_string(),
            context: serde_json::json!({}),
        }
    }

    pub fn client(mut self, client_id: Uuid) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn agent(mut self, agent_id: Uuid) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

/// A pending UI notification row.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SseEvent {
    pub id: Uuid,
    pub client_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Filter for browsing the audit log.
#[derive(Debug, Clone, Default, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct SystemEventFilter {
    pub agent_id: Option<Uuid>,
    pub event_type: Option<String>,
    pub severity: Option<EventSeverity>,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_serializes_lowercase() {
        let json = serde_json::to_string(&EventSeverity::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
    }

    #[test]
    fn test_record_builder() {
        let agent_id = Uuid::now_v7();
        let record = RecordSystemEvent::new(event_types::ROLE_CHANGED, EventSeverity::Info)
            .agent(agent_id)
            .context(serde_json::json!({"from": "running_replica", "to": "running_primary"}));

        assert_eq!(record.agent_id, Some(agent_id));
        assert_eq!(record.event_type, "ROLE_CHANGED");
        assert_eq!(record.context["to"], "running_primary");
    }
}
