use chrono::{DateTime, Utc};
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Priority levels; higher wins, ties broken by created_at ascending.
pub mod priority {
    /// Emergency / termination-imminent
    pub const EMERGENCY: i16 = 100;
    /// Operator-initiated
    pub const MANUAL: i16 = 75;
    /// ML urgent
    pub const ML_URGENT: i16 = 50;
    /// ML normal
    pub const ML_NORMAL: i16 = 25;
    /// Scheduled
    pub const SCHEDULED: i16 = 10;
}

/// Command kinds
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    DeriveActiveEnum,
    EnumIter,
    ToSchema,
    Hash,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "command_kind")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommandKind {
    #[sea_orm(string_value = "switch")]
    Switch,
    #[sea_orm(string_value = "launch_instance")]
    LaunchInstance,
    #[sea_orm(string_value = "terminate_instance")]
    TerminateInstance,
    #[sea_orm(string_value = "promote_replica")]
    PromoteReplica,
    #[sea_orm(string_value = "apply_config")]
    ApplyConfig,
    #[sea_orm(string_value = "self_destruct")]
    SelfDestruct,
}

/// Command lifecycle status; terminal states are never mutated again
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    Default,
    DeriveActiveEnum,
    EnumIter,
    ToSchema,
    Hash,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "command_status")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CommandStatus {
    #[default]
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "executing")]
    Executing,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandStatus::Completed | CommandStatus::Failed)
    }
}

/// What initiated a command
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    Default,
    DeriveActiveEnum,
    EnumIter,
    ToSchema,
    Hash,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "command_trigger")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CommandTrigger {
    #[default]
    #[sea_orm(string_value = "manual")]
    Manual,
    #[sea_orm(string_value = "ml")]
    Ml,
    #[sea_orm(string_value = "emergency")]
    Emergency,
    #[sea_orm(string_value = "scheduled")]
    Scheduled,
}

impl std::str::FromStr for CommandTrigger {
    type Err = sea_orm::DbErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as std::convert::TryFrom<&str>>::try_from(s)
    }
}

/// Capacity tier a switch targets
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema, Hash,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TargetMode {
    Ondemand,
    Spot,
}

/// Closed sum of command payloads. Unknown tags fail deserialization, so a
/// malformed submission never reaches the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandPayload {
    /// Replace the primary with an instance in another pool or tier
    Switch {
        target_mode: TargetMode,
        target_pool_id: Option<Uuid>,
    },
    /// Launch a replica instance in a pool (replica work order)
    LaunchInstance {
        pool_id: Uuid,
        replica_id: Uuid,
        emergency: bool,
    },
    /// Terminate a specific instance
    TerminateInstance { instance_id: String },
    /// Promote a standby replica to primary
    PromoteReplica {
        replica_id: Uuid,
        skip_health_check: bool,
    },
    /// Push a policy/config update to the agent
    ApplyConfig { config: serde_json::Value },
    /// Tear the agent down entirely
    SelfDestruct,
}

impl CommandPayload {
    pub fn kind(&self) -> CommandKind {
        match self {
            CommandPayload::Switch { .. } => CommandKind::Switch,
            CommandPayload::LaunchInstance { .. } => CommandKind::LaunchInstance,
            CommandPayload::TerminateInstance { .. } => CommandKind::TerminateInstance,
            CommandPayload::PromoteReplica { .. } => CommandKind::PromoteReplica,
            CommandPayload::ApplyConfig { .. } => CommandKind::ApplyConfig,
            CommandPayload::SelfDestruct => CommandKind::SelfDestruct,
        }
    }
}

/// A queued directive for an agent
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Command {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub request_id: String,
    pub kind: CommandKind,
    pub target_mode: Option<TargetMode>,
    pub target_pool_id: Option<Uuid>,
    pub priority: i16,
    pub terminate_wait_seconds: Option<i32>,
    pub status: CommandStatus,
    pub payload: CommandPayload,
    pub pre_state: Option<serde_json::Value>,
    pub post_state: Option<serde_json::Value>,
    /// Cached response for idempotent replay
    pub result: Option<serde_json::Value>,
    pub trigger: CommandTrigger,
    pub user_id: Option<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input for enqueueing a command
#[derive(Debug, Clone)]
pub struct NewCommand {
    pub agent_id: Uuid,
    /// Client-generated idempotency key, globally unique
    pub request_id: String,
    pub payload: CommandPayload,
    pub priority: i16,
    pub trigger: CommandTrigger,
    pub terminate_wait_seconds: Option<i32>,
    pub user_id: Option<Uuid>,
    pub pre_state: Option<serde_json::Value>,
}

impl NewCommand {
    pub fn new(agent_id: Uuid, request_id: impl Into<String>, payload: CommandPayload) -> Self {
        Self {
            agent_id,
            request_id: request_id.into(),
            payload,
            priority: priority::SCHEDULED,
            trigger: CommandTrigger::Scheduled,
            terminate_wait_seconds: None,
            user_id: None,
            pre_state: None,
        }
    }

    pub fn priority(mut self, priority: i16) -> Self {
        self.priority = priority;
        self
    }

    pub fn trigger(mut self, trigger: CommandTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn terminate_wait(mut self, seconds: i32) -> Self {
        self.terminate_wait_seconds = Some(seconds);
        self
    }
}

/// How an enqueue resolved
#[derive(Debug, Clone)]
pub enum EnqueueOutcome {
    /// A new command row was created
    Created(Command),
    /// The request id was seen before and its command already completed;
    /// this is the cached original
    Replayed(Command),
}

impl EnqueueOutcome {
    pub fn command(&self) -> &Command {
        match self {
            EnqueueOutcome::Created(c) | EnqueueOutcome::Replayed(c) => c,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, EnqueueOutcome::Replayed(_))
    }
}

/// Agent-reported outcome of a command
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ExecutionResult {
    pub success: bool,
    pub message: Option<String>,
}

/// Filter for browsing commands
#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
pub struct CommandFilter {
    pub agent_id: Option<Uuid>,
    pub status: Option<CommandStatus>,
    pub kind: Option<CommandKind>,
    pub trigger: Option<CommandTrigger>,
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
    fn test_payload_tags_are_closed() {
        let ok: Result<CommandPayload, _> = serde_json::from_value(serde_json::json!({
            "type": "switch",
            "target_mode": "spot",
            "target_pool_id": null
        }));
        assert!(ok.is_ok());

        // Unknown tag fails validation instead of being carried opaquely
        let unknown: Result<CommandPayload, _> = serde_json::from_value(serde_json::json!({
            "type": "reboot_instance"
        }));
        assert!(unknown.is_err());
    }

    #[test]
    fn test_payload_kind_mapping() {
        let payload = CommandPayload::PromoteReplica {
            replica_id: Uuid::now_v7(),
            skip_health_check: false,
        };
        assert_eq!(payload.kind(), CommandKind::PromoteReplica);
        assert_eq!(CommandPayload::SelfDestruct.kind(), CommandKind::SelfDestruct);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(priority::EMERGENCY > priority::MANUAL);
        assert!(priority::MANUAL > priority::ML_URGENT);
        assert!(priority::ML_URGENT > priority::ML_NORMAL);
        assert!(priority::ML_NORMAL > priority::SCHEDULED);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!CommandStatus::Pending.is_terminal());
        assert!(!CommandStatus::Executing.is_terminal());
        assert!(CommandStatus::Completed.is_terminal());
        assert!(CommandStatus::Failed.is_terminal());
    }
}
