use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AgentResult;
use crate::models::{
    Agent, AgentFilter, AgentMode, AgentStatus, Client, Instance, InstanceRole, NewInstance,
    NewSwitch, NoticeStatus, Switch, SwitchFilter,
};

/// Context fields reconciled on register and heartbeat. Role fields are
/// never touched through this path.
#[derive(Debug, Clone, Default)]
pub struct AgentContext {
    pub current_instance_id: Option<String>,
    pub instance_type: Option<String>,
    pub mode: Option<AgentMode>,
    pub az: Option<String>,
    pub current_pool_id: Option<Uuid>,
    pub agent_version: Option<String>,
    pub hostname: Option<String>,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
}

/// Policy fields applied under optimistic concurrency.
#[derive(Debug, Clone)]
pub struct PolicyFields {
    pub auto_switch_enabled: bool,
    pub manual_replica_enabled: bool,
    pub auto_terminate: bool,
    pub terminate_wait_seconds: Option<i32>,
}

/// Input for creating an agent row.
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub client_id: Uuid,
    pub logical_id: String,
    pub region: String,
    pub az: String,
    pub instance_type: String,
    pub mode: AgentMode,
    pub policy: PolicyFields,
    pub context: AgentContext,
}

/// Repository trait for clients, agents, instances, and switches.
///
/// Role-changing writes use optimistic concurrency (`expected_version`);
/// a mismatch is an `OptimisticConflict`, never retried automatically.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait AgentRepository: Send + Sync {
    // ---------------------------------------------------------------- clients

    async fn insert_client(&self, client: Client) -> AgentResult<Client>;

    async fn client_by_id(&self, id: Uuid) -> AgentResult<Option<Client>>;

    async fn client_by_token_hash(&self, token_hash: &str) -> AgentResult<Option<Client>>;

    async fn list_clients(&self) -> AgentResult<Vec<Client>>;

    async fn count_agents_for_client(&self, client_id: Uuid) -> AgentResult<u64>;

    // ----------------------------------------------------------------- agents

    async fn insert_agent(&self, agent: NewAgent) -> AgentResult<Agent>;

    async fn agent_by_id(&self, id: Uuid) -> AgentResult<Option<Agent>>;

    async fn agent_by_logical_id(
        &self,
        client_id: Uuid,
        logical_id: &str,
    ) -> AgentResult<Option<Agent>>;

    /// Reconcile instance context and liveness; never touches role fields.
    async fn update_heartbeat(
        &self,
        agent_id: Uuid,
        status: AgentStatus,
        heartbeat_at: DateTime<Utc>,
        context: AgentContext,
    ) -> AgentResult<Agent>;

    /// Apply policy under optimistic concurrency.
    async fn update_policy(
        &self,
        agent_id: Uuid,
        policy: PolicyFields,
        expected_version: i64,
    ) -> AgentResult<Agent>;

    /// Record a preemption notice and its deadline.
    async fn set_notice(
        &self,
        agent_id: Uuid,
        notice: NoticeStatus,
        deadline: Option<DateTime<Utc>>,
    ) -> AgentResult<Agent>;

    async fn set_status(&self, agent_id: Uuid, status: AgentStatus) -> AgentResult<Agent>;

    /// Bump the consecutive emergency-failure counter; returns the new count.
    async fn increment_failed_promotions(&self, agent_id: Uuid) -> AgentResult<i32>;

    async fn reset_failed_promotions(&self, agent_id: Uuid) -> AgentResult<()>;

    /// Flip the agent into `error` and disable auto-switching, keeping the
    /// policy CHECK satisfied. Cleared by an operator.
    async fn quarantine(&self, agent_id: Uuid) -> AgentResult<Agent>;

    /// Cache the fastest-boot pool hint; stale reads are acceptable.
    async fn set_fastest_pool(&self, agent_id: Uuid, pool_id: Uuid) -> AgentResult<()>;

    /// Point the agent at its new serving instance after a switch.
    async fn set_current_instance(
        &self,
        agent_id: Uuid,
        instance_id: String,
        mode: AgentMode,
        pool_id: Option<Uuid>,
    ) -> AgentResult<Agent>;

    async fn list_agents(&self, client_id: Option<Uuid>, filter: AgentFilter)
    -> AgentResult<Vec<Agent>>;

    /// Online agents whose last heartbeat is older than the cutoff.
    async fn agents_with_stale_heartbeat(&self, cutoff: DateTime<Utc>) -> AgentResult<Vec<Agent>>;

    /// Agents eligible for the replica coordinator pass.
    async fn agents_with_replica_policy(&self) -> AgentResult<Vec<Agent>>;

    /// Agents with an outstanding preemption notice whose deadline has
    /// passed; the orchestrator escalates these.
    async fn agents_with_overdue_notice(&self, now: DateTime<Utc>) -> AgentResult<Vec<Agent>>;

    // -------------------------------------------------------------- instances

    async fn insert_instance(&self, instance: NewInstance) -> AgentResult<Instance>;

    async fn instance_by_id(&self, id: &str) -> AgentResult<Option<Instance>>;

    async fn instances_for_agent(&self, agent_id: Uuid) -> AgentResult<Vec<Instance>>;

    /// The agent's current primary (running_primary or promoting), if any.
    async fn primary_for_agent(&self, agent_id: Uuid) -> AgentResult<Option<Instance>>;

    /// Apply a guarded role transition under optimistic concurrency.
    async fn update_role(
        &self,
        instance_id: &str,
        to: InstanceRole,
        expected_version: i64,
        terminated_at: Option<DateTime<Utc>>,
    ) -> AgentResult<Instance>;

    /// Atomic promotion: within one transaction, demote any current primary
    /// of the agent to zombie (stamping terminated_at), then set the target
    /// instance to running_primary iff its version matches. The single entry
    /// point for promotions.
    async fn promote_to_primary(
        &self,
        new_instance_id: &str,
        agent_id: Uuid,
        expected_version: i64,
    ) -> AgentResult<Instance>;

    /// Zombies whose demotion happened before the cutoff flip to terminated;
    /// returns how many were purged.
    async fn purge_zombies(&self, cutoff: DateTime<Utc>) -> AgentResult<u64>;

    // --------------------------------------------------------------- switches

    async fn insert_switch(&self, switch: NewSwitch) -> AgentResult<Switch>;

    async fn list_switches(
        &self,
        client_id: Option<Uuid>,
        filter: SwitchFilter,
    ) -> AgentResult<Vec<Switch>>;
}
