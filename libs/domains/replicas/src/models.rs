use chrono::{DateTime, Utc};
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use strum::Display;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Why a replica exists
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
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "replica_kind")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReplicaKind {
    /// Standing replica maintained by the coordinator
    #[sea_orm(string_value = "manual")]
    Manual,
    /// Created under a preemption deadline by the orchestrator
    #[sea_orm(string_value = "emergency")]
    Emergency,
}

/// Replica lifecycle status
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
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "replica_status")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReplicaStatus {
    #[default]
    #[sea_orm(string_value = "launching")]
    Launching,
    #[sea_orm(string_value = "syncing")]
    Syncing,
    #[sea_orm(string_value = "ready")]
    Ready,
    #[sea_orm(string_value = "promoted")]
    Promoted,
    #[sea_orm(string_value = "terminated")]
    Terminated,
}

impl ReplicaStatus {
    /// Still bindable for failover
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ReplicaStatus::Launching | ReplicaStatus::Syncing | ReplicaStatus::Ready
        )
    }
}

/// A standby instance bound to an agent
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReplicaInstance {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub parent_instance_id: Option<String>,
    /// Concrete cloud instance id, bound by the agent once launched
    pub instance_id: Option<String>,
    pub pool_id: Uuid,
    pub kind: ReplicaKind,
    pub status: ReplicaStatus,
    pub sync_lag_seconds: Option<f64>,
    pub requested_at: DateTime<Utc>,
    pub launched_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub promoted_at: Option<DateTime<Utc>>,
    pub terminated_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReplicaInstance {
    /// Boot-to-ready seconds, once known
    pub fn boot_seconds(&self) -> Option<f64> {
        let ready = self.ready_at?;
        Some((ready - self.requested_at).num_milliseconds() as f64 / 1000.0)
    }
}

/// Input for creating a replica record
#[derive(Debug, Clone)]
pub struct NewReplica {
    pub agent_id: Uuid,
    pub parent_instance_id: Option<String>,
    pub pool_id: Uuid,
    pub kind: ReplicaKind,
}

/// Body of `POST /api/agents/{id}/rebalance-notice`
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NoticeRequest {
    pub notice_time: Option<DateTime<Utc>>,
}

/// Body of `POST /api/agents/{id}/termination-notice`
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TerminationNoticeRequest {
    pub termination_time: Option<DateTime<Utc>>,
}

/// Body of `PUT /api/agents/{id}/replicas/{replicaId}`: binds the cloud
/// instance id
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BindReplicaRequest {
    #[validate(length(min = 1, max = 255))]
    pub instance_id: String,
}

/// Body of `POST /api/agents/{id}/replicas/{replicaId}/status`
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaStatusUpdate {
    pub status: ReplicaStatus,
    pub sync_lag_seconds: Option<f64>,
}

/// Query for `GET /api/agents/{id}/replicas`
#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
pub struct ReplicaQuery {
    pub status: Option<ReplicaStatus>,
}
