//! Command Queue Domain
//!
//! Priority-ordered, idempotent, at-most-once command delivery to agents.
//!
//! ```text
//! enqueue(request_id, …)  ──▶  commands (status=pending)
//!                                   │ agent polls: priority DESC, created_at ASC
//!                                   ▼
//!                              executing ──▶ completed | failed
//! ```
//!
//! Idempotency: `request_id` is globally unique. A duplicate submission
//! while the original is pending or executing is rejected with
//! `DUPLICATE_REQUEST`; after the original reaches a terminal state, the
//! cached result is replayed. Terminal commands are never mutated again.

pub mod entity;
pub mod error;
pub mod handlers;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod service;

pub use error::{CommandError, CommandResult};
pub use models::{
    Command, CommandFilter, CommandKind, CommandPayload, CommandStatus, CommandTrigger,
    EnqueueOutcome, ExecutionResult, NewCommand, TargetMode, priority,
};
pub use postgres::PgCommandRepository;
pub use repository::CommandRepository;
pub use service::CommandQueue;
