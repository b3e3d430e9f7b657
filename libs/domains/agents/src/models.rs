use chrono::{DateTime, Utc};
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use strum::Display;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use domain_commands::{CommandTrigger, TargetMode};

/// Capacity tier an agent's primary currently runs on
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
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "agent_mode")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AgentMode {
    #[default]
    #[sea_orm(string_value = "unknown")]
    Unknown,
    #[sea_orm(string_value = "ondemand")]
    Ondemand,
    #[sea_orm(string_value = "spot")]
    Spot,
}

impl std::str::FromStr for AgentMode {
    type Err = sea_orm::DbErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as std::convert::TryFrom<&str>>::try_from(s)
    }
}

impl AgentMode {
    pub fn as_target(&self) -> Option<TargetMode> {
        match self {
            AgentMode::Ondemand => Some(TargetMode::Ondemand),
            AgentMode::Spot => Some(TargetMode::Spot),
            AgentMode::Unknown => None,
        }
    }
}

impl From<TargetMode> for AgentMode {
    fn from(mode: TargetMode) -> Self {
        match mode {
            TargetMode::Ondemand => AgentMode::Ondemand,
            TargetMode::Spot => AgentMode::Spot,
        }
    }
}

/// Agent liveness
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
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "agent_status")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    #[sea_orm(string_value = "offline")]
    Offline,
    #[sea_orm(string_value = "online")]
    Online,
    #[sea_orm(string_value = "error")]
    Error,
}

/// Outstanding preemption warning for an agent
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
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "notice_status")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NoticeStatus {
    #[default]
    #[sea_orm(string_value = "none")]
    None,
    #[sea_orm(string_value = "rebalance")]
    Rebalance,
    #[sea_orm(string_value = "termination")]
    Termination,
}

/// Instance lifecycle role
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
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "instance_role")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InstanceRole {
    #[default]
    #[sea_orm(string_value = "launching")]
    Launching,
    #[sea_orm(string_value = "running_primary")]
    RunningPrimary,
    #[sea_orm(string_value = "running_replica")]
    RunningReplica,
    #[sea_orm(string_value = "promoting")]
    Promoting,
    #[sea_orm(string_value = "terminating")]
    Terminating,
    #[sea_orm(string_value = "terminated")]
    Terminated,
    #[sea_orm(string_value = "zombie")]
    Zombie,
}

impl InstanceRole {
    /// A primary in the exactly-one-primary sense: serving or about to serve
    pub fn is_primary(&self) -> bool {
        matches!(self, InstanceRole::RunningPrimary | InstanceRole::Promoting)
    }
}

/// Tenant plan
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
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "client_plan")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ClientPlan {
    #[default]
    #[sea_orm(string_value = "free")]
    Free,
    #[sea_orm(string_value = "pro")]
    Pro,
    #[sea_orm(string_value = "enterprise")]
    Enterprise,
}

/// An organization tenant
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing)]
    pub auth_token_hash: String,
    pub plan: ClientPlan,
    pub max_agents: i32,
    pub default_auto_switch_enabled: bool,
    pub default_manual_replica_enabled: bool,
    pub default_auto_terminate: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a tenant
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewClient {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub plan: ClientPlan,
    pub max_agents: Option<i32>,
}

/// The per-agent switching policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentPolicy {
    pub auto_switch_enabled: bool,
    pub manual_replica_enabled: bool,
    pub auto_terminate: bool,
    pub terminate_wait_seconds: Option<i32>,
}

/// The logical identity of a managed workload, stable across instance
/// replacement
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Agent {
    pub id: Uuid,
    pub client_id: Uuid,
    pub logical_id: String,
    pub current_instance_id: Option<String>,
    pub region: String,
    pub az: String,
    pub instance_type: Option<String>,
    pub mode: AgentMode,
    pub current_pool_id: Option<Uuid>,
    pub auto_switch_enabled: bool,
    pub manual_replica_enabled: bool,
    pub auto_terminate: bool,
    pub terminate_wait_seconds: Option<i32>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub status: AgentStatus,
    pub notice_status: NoticeStatus,
    pub notice_deadline: Option<DateTime<Utc>>,
    pub failed_promotions: i32,
    pub fastest_pool_id: Option<Uuid>,
    pub agent_version: Option<String>,
    pub hostname: Option<String>,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn policy(&self) -> AgentPolicy {
        AgentPolicy {
            auto_switch_enabled: self.auto_switch_enabled,
            manual_replica_enabled: self.manual_replica_enabled,
            auto_terminate: self.auto_terminate,
            terminate_wait_seconds: self.terminate_wait_seconds,
        }
    }
}

/// A single cloud VM observed or owned by an agent
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Instance {
    /// Cloud-assigned id, or a temporary id before launch confirmation
    pub id: String,
    pub agent_id: Uuid,
    pub role: InstanceRole,
    pub instance_type: String,
    pub region: String,
    pub az: String,
    pub pool_id: Option<Uuid>,
    pub spot_price: Option<f64>,
    pub ondemand_price: Option<f64>,
    pub baseline_ondemand_price: Option<f64>,
    pub launch_requested_at: Option<DateTime<Utc>>,
    pub launch_confirmed_at: Option<DateTime<Utc>>,
    pub last_switch_at: Option<DateTime<Utc>>,
    pub terminate_requested_at: Option<DateTime<Utc>>,
    pub terminated_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    pub fn is_primary(&self) -> bool {
        self.role.is_primary()
    }
}

/// Input for creating an instance row
#[derive(Debug, Clone)]
pub struct NewInstance {
    pub id: String,
    pub agent_id: Uuid,
    pub role: InstanceRole,
    pub instance_type: String,
    pub region: String,
    pub az: String,
    pub pool_id: Option<Uuid>,
    pub spot_price: Option<f64>,
    pub ondemand_price: Option<f64>,
    pub launch_requested_at: Option<DateTime<Utc>>,
    pub launch_confirmed_at: Option<DateTime<Utc>>,
}

/// Historical record of one completed role change
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Switch {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub command_id: Option<Uuid>,
    pub request_id: String,
    pub old_instance_id: String,
    pub new_instance_id: String,
    pub old_mode: AgentMode,
    pub new_mode: AgentMode,
    pub trigger: CommandTrigger,
    pub on_demand_price: Option<f64>,
    pub old_spot_price: Option<f64>,
    pub new_spot_price: Option<f64>,
    pub downtime_seconds: Option<f64>,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub old_terminated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for recording a switch
#[derive(Debug, Clone)]
pub struct NewSwitch {
    pub agent_id: Uuid,
    pub command_id: Option<Uuid>,
    pub request_id: String,
    pub old_instance_id: String,
    pub new_instance_id: String,
    pub old_mode: AgentMode,
    pub new_mode: AgentMode,
    pub trigger: CommandTrigger,
    pub on_demand_price: Option<f64>,
    pub old_spot_price: Option<f64>,
    pub new_spot_price: Option<f64>,
    pub downtime_seconds: Option<f64>,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub old_terminated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Agent-facing request/response DTOs (wire contract preserved for existing
// agents: camelCase field names)
// ---------------------------------------------------------------------------

/// Body of `POST /api/agents/register`
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgentRequest {
    #[validate(length(min = 1, max = 255))]
    pub logical_agent_id: String,
    #[validate(length(min = 1, max = 255))]
    pub instance_id: String,
    #[validate(length(min = 1, max = 255))]
    pub instance_type: String,
    #[validate(length(min = 1, max = 100))]
    pub region: String,
    #[validate(length(min = 1, max = 100))]
    pub az: String,
    pub ami_id: Option<String>,
    #[serde(default)]
    pub mode: AgentMode,
    pub hostname: Option<String>,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub agent_version: Option<String>,
}

/// Response of `POST /api/agents/register`
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgentResponse {
    pub agent_id: Uuid,
    pub policy: AgentPolicy,
}

/// Body of `POST /api/agents/{id}/heartbeat`
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    #[serde(default)]
    pub status: AgentStatus,
    pub instance_id: Option<String>,
    pub instance_type: Option<String>,
    pub mode: Option<AgentMode>,
    pub az: Option<String>,
}

/// Instance half of a switch report
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SwitchInstanceInfo {
    #[validate(length(min = 1, max = 255))]
    pub id: String,
    pub mode: AgentMode,
    pub az: Option<String>,
    pub instance_type: Option<String>,
}

/// Timing half of a switch report
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SwitchTiming {
    pub initiated_at: DateTime<Utc>,
    pub ami_created_at: Option<DateTime<Utc>>,
    pub instance_launched_at: Option<DateTime<Utc>>,
    pub instance_ready_at: DateTime<Utc>,
    /// Absent when the agent left the old instance running; the old
    /// instance is then a zombie, never terminated
    pub old_terminated_at: Option<DateTime<Utc>>,
}

/// Pricing half of a switch report
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SwitchPricing {
    pub on_demand: Option<f64>,
    pub old_spot: Option<f64>,
    pub new_spot: Option<f64>,
}

/// Body of `POST /api/agents/{id}/switch-report`
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SwitchReportRequest {
    pub command_id: Uuid,
    pub request_id: Option<String>,
    #[validate(nested)]
    pub old_instance: SwitchInstanceInfo,
    #[validate(nested)]
    pub new_instance: SwitchInstanceInfo,
    pub timing: SwitchTiming,
    pub pricing: SwitchPricing,
    #[serde(default)]
    pub trigger: CommandTrigger,
}

/// Body of `POST /api/agents/{id}/termination-report`
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TerminationReportRequest {
    #[validate(length(min = 1, max = 255))]
    pub instance_id: String,
    pub terminated_at: Option<DateTime<Utc>>,
}

/// Body of `PUT /api/client/agents/{id}/policy`
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyUpdate {
    pub auto_switch_enabled: Option<bool>,
    pub manual_replica_enabled: Option<bool>,
    pub auto_terminate: Option<bool>,
    pub terminate_wait_seconds: Option<i32>,
    /// Optimistic concurrency: the version the caller read
    pub expected_version: i64,
}

/// Body of `POST /api/client/agents/{id}/switch`
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManualSwitchRequest {
    pub target_mode: TargetMode,
    pub target_pool_id: Option<Uuid>,
    /// Idempotency key; may also arrive as the X-Request-ID header
    pub request_id: Option<String>,
}

/// Filter for browsing agents
#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
pub struct AgentFilter {
    pub status: Option<AgentStatus>,
    pub mode: Option<AgentMode>,
    pub region: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

/// Filter for browsing switch history
#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
pub struct SwitchFilter {
    pub agent_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    100
}
