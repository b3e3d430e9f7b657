//! Agents Domain
//!
//! The fleet's source of truth: tenants, logical agents, the instances that
//! serve them, and the switch history.
//!
//! ```text
//! ┌─────────┐ 1:n ┌────────┐ 1:n ┌───────────┐
//! │ clients │ ──▶ │ agents │ ──▶ │ instances │  role: launching →
//! └─────────┘     └────────┘     └───────────┘  running_primary/replica →
//!                      │                         zombie → terminated
//!                      └──▶ switches (history)
//! ```
//!
//! Role changes are guarded by the [`lifecycle`] transition table and applied
//! through optimistic versioned writes; promotion to primary goes through a
//! single atomic repository operation that can never leave two primaries.

pub mod entity;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod service;
pub mod switching;

pub use error::{AgentError, AgentResult};
pub use models::{
    Agent, AgentFilter, AgentMode, AgentStatus, Client, ClientPlan, HeartbeatRequest, Instance,
    InstanceRole, NewClient, NoticeStatus, PolicyUpdate, RegisterAgentRequest,
    RegisterAgentResponse, Switch, SwitchFilter, SwitchReportRequest,
};
pub use postgres::PgAgentRepository;
pub use repository::AgentRepository;
pub use service::AgentService;
pub use switching::SwitchingService;
