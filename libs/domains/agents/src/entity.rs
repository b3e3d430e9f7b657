use std::str::FromStr;

use crate::models::{AgentMode, AgentStatus, ClientPlan, InstanceRole, NoticeStatus};
use domain_commands::CommandTrigger;

/// Sea-ORM entity for the clients table
pub mod clients {
    use super::ClientPlan;
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "clients")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        #[sea_orm(column_type = "String(StringLen::N(255))")]
        pub name: String,
        #[sea_orm(column_type = "String(StringLen::N(64))")]
        pub auth_token_hash: String,
        pub plan: ClientPlan,
        pub max_agents: i32,
        pub default_auto_switch_enabled: bool,
        pub default_manual_replica_enabled: bool,
        pub default_auto_terminate: bool,
        pub created_at: DateTimeWithTimeZone,
        pub updated_at: DateTimeWithTimeZone,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Sea-ORM entity for the agents table
pub mod agents {
    use super::{AgentMode, AgentStatus, NoticeStatus};
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "agents")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub client_id: Uuid,
        #[sea_orm(column_type = "String(StringLen::N(255))")]
        pub logical_id: String,
        #[sea_orm(column_type = "String(StringLen::N(255))", nullable)]
        pub current_instance_id: Option<String>,
        #[sea_orm(column_type = "String(StringLen::N(100))")]
        pub region: String,
        #[sea_orm(column_type = "String(StringLen::N(100))")]
        pub az: String,
        #[sea_orm(column_type = "String(StringLen::N(255))", nullable)]
        pub instance_type: Option<String>,
        pub mode: AgentMode,
        pub current_pool_id: Option<Uuid>,
        pub auto_switch_enabled: bool,
        pub manual_replica_enabled: bool,
        pub auto_terminate: bool,
        pub terminate_wait_seconds: Option<i32>,
        pub last_heartbeat: Option<DateTimeWithTimeZone>,
        pub status: AgentStatus,
        pub notice_status: NoticeStatus,
        pub notice_deadline: Option<DateTimeWithTimeZone>,
        pub failed_promotions: i32,
        pub fastest_pool_id: Option<Uuid>,
        #[sea_orm(column_type = "String(StringLen::N(64))", nullable)]
        pub agent_version: Option<String>,
        #[sea_orm(column_type = "String(StringLen::N(255))", nullable)]
        pub hostname: Option<String>,
        #[sea_orm(column_type = "String(StringLen::N(64))", nullable)]
        pub private_ip: Option<String>,
        #[sea_orm(column_type = "String(StringLen::N(64))", nullable)]
        pub public_ip: Option<String>,
        pub version: i64,
        pub created_at: DateTimeWithTimeZone,
        pub updated_at: DateTimeWithTimeZone,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Sea-ORM entity for the instances table
pub mod instances {
    use super::InstanceRole;
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "instances")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub agent_id: Uuid,
        pub role: InstanceRole,
        #[sea_orm(column_type = "String(StringLen::N(255))")]
        pub instance_type: String,
        #[sea_orm(column_type = "String(StringLen::N(100))")]
        pub region: String,
        #[sea_orm(column_type = "String(StringLen::N(100))")]
        pub az: String,
        pub pool_id: Option<Uuid>,
        pub spot_price: Option<f64>,
        pub ondemand_price: Option<f64>,
        pub baseline_ondemand_price: Option<f64>,
        pub launch_requested_at: Option<DateTimeWithTimeZone>,
        pub launch_confirmed_at: Option<DateTimeWithTimeZone>,
        pub last_switch_at: Option<DateTimeWithTimeZone>,
        pub terminate_requested_at: Option<DateTimeWithTimeZone>,
        pub terminated_at: Option<DateTimeWithTimeZone>,
        pub version: i64,
        pub created_at: DateTimeWithTimeZone,
        pub updated_at: DateTimeWithTimeZone,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Sea-ORM entity for the switches history table
pub mod switches {
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "switches")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub agent_id: Uuid,
        pub command_id: Option<Uuid>,
        #[sea_orm(column_type = "String(StringLen::N(255))")]
        pub request_id: String,
        #[sea_orm(column_type = "String(StringLen::N(255))")]
        pub old_instance_id: String,
        #[sea_orm(column_type = "String(StringLen::N(255))")]
        pub new_instance_id: String,
        #[sea_orm(column_type = "String(StringLen::N(32))")]
        pub old_mode: String,
        #[sea_orm(column_type = "String(StringLen::N(32))")]
        pub new_mode: String,
        #[sea_orm(column_type = "String(StringLen::N(32))")]
        pub trigger: String,
        pub on_demand_price: Option<f64>,
        pub old_spot_price: Option<f64>,
        pub new_spot_price: Option<f64>,
        pub downtime_seconds: Option<f64>,
        pub initiated_at: DateTimeWithTimeZone,
        pub completed_at: DateTimeWithTimeZone,
        pub old_terminated_at: Option<DateTimeWithTimeZone>,
        pub created_at: DateTimeWithTimeZone,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

// Conversions from Sea-ORM models to domain types

impl From<clients::Model> for crate::models::Client {
    fn from(model: clients::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            auth_token_hash: model.auth_token_hash,
            plan: model.plan,
            max_agents: model.max_agents,
            default_auto_switch_enabled: model.default_auto_switch_enabled,
            default_manual_replica_enabled: model.default_manual_replica_enabled,
            default_auto_terminate: model.default_auto_terminate,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }
}

impl From<agents::Model> for crate::models::Agent {
    fn from(model: agents::Model) -> Self {
        Self {
            id: model.id,
            client_id: model.client_id,
            logical_id: model.logical_id,
            current_instance_id: model.current_instance_id,
            region: model.region,
            az: model.az,
            instance_type: model.instance_type,
            mode: model.mode,
            current_pool_id: model.current_pool_id,
            auto_switch_enabled: model.auto_switch_enabled,
            manual_replica_enabled: model.manual_replica_enabled,
            auto_terminate: model.auto_terminate,
            terminate_wait_seconds: model.terminate_wait_seconds,
            last_heartbeat: model.last_heartbeat.map(Into::into),
            status: model.status,
            notice_status: model.notice_status,
            notice_deadline: model.notice_deadline.map(Into::into),
            failed_promotions: model.failed_promotions,
            fastest_pool_id: model.fastest_pool_id,
            agent_version: model.agent_version,
            hostname: model.hostname,
            private_ip: model.private_ip,
            public_ip: model.public_ip,
            version: model.version,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }
}

impl From<instances::Model> for crate::models::Instance {
    fn from(model: instances::Model) -> Self {
        Self {
            id: model.id,
            agent_id: model.agent_id,
            role: model.role,
            instance_type: model.instance_type,
            region: model.region,
            az: model.az,
            pool_id: model.pool_id,
            spot_price: model.spot_price,
            ondemand_price: model.ondemand_price,
            baseline_ondemand_price: model.baseline_ondemand_price,
            launch_requested_at: model.launch_requested_at.map(Into::into),
            launch_confirmed_at: model.launch_confirmed_at.map(Into::into),
            last_switch_at: model.last_switch_at.map(Into::into),
            terminate_requested_at: model.terminate_requested_at.map(Into::into),
            terminated_at: model.terminated_at.map(Into::into),
            version: model.version,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }
}

impl From<switches::Model> for crate::models::Switch {
    fn from(model: switches::Model) -> Self {
        Self {
            id: model.id,
            agent_id: model.agent_id,
            command_id: model.command_id,
            request_id: model.request_id,
            old_instance_id: model.old_instance_id,
            new_instance_id: model.new_instance_id,
            old_mode: AgentMode::from_str(&model.old_mode).unwrap_or(AgentMode::Unknown),
            new_mode: AgentMode::from_str(&model.new_mode).unwrap_or(AgentMode::Unknown),
            trigger: CommandTrigger::from_str(&model.trigger).unwrap_or(CommandTrigger::Manual),
            on_demand_price: model.on_demand_price,
            old_spot_price: model.old_spot_price,
            new_spot_price: model.new_spot_price,
            downtime_seconds: model.downtime_seconds,
            initiated_at: model.initiated_at.into(),
            completed_at: model.completed_at.into(),
            old_terminated_at: model.old_terminated_at.map(Into::into),
            created_at: model.created_at.into(),
        }
    }
}
