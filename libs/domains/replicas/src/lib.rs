//! Replicas Domain
//!
//! Standby instances and the two engines that manage them:
//!
//! - the **replica coordinator**, a single-flight periodic pass that keeps
//!   exactly one warm replica for every `manual_replica_enabled` agent in the
//!   cheapest fresh pool;
//! - the **emergency orchestrator**, entered on rebalance (120 s budget) and
//!   termination (60 s budget) notices, which binds or creates a replica and
//!   drives its promotion, skipping the health check when the deadline would
//!   otherwise be missed.
//!
//! Both funnel every role change through the agents domain's atomic
//! promotion, so their interleavings cannot produce two primaries.

pub mod coordinator;
pub mod emergency;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod service;

pub use coordinator::ReplicaCoordinator;
pub use emergency::EmergencyOrchestrator;
pub use error::{ReplicaError, ReplicaResult};
pub use models::{
    BindReplicaRequest, NewReplica, NoticeRequest, ReplicaInstance, ReplicaKind, ReplicaStatus,
    ReplicaStatusUpdate, TerminationNoticeRequest,
};
pub use postgres::PgReplicaRepository;
pub use repository::ReplicaRepository;
pub use service::ReplicaService;
