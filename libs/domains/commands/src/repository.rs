use async_trait::async_trait;
use uuid::Uuid;

use crate::error::CommandResult;
use crate::models::{Command, CommandFilter, CommandStatus, NewCommand};

/// Repository trait for command persistence
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait CommandRepository: Send + Sync {
    /// Insert a new pending command. A unique violation on request_id maps
    /// to a re-read by the caller, never a second insert.
    async fn insert(&self, input: NewCommand) -> CommandResult<Command>;

    async fn find_by_id(&self, id: Uuid) -> CommandResult<Option<Command>>;

    /// Resolve an idempotency key to its command, if any
    async fn find_by_request_id(&self, request_id: &str) -> CommandResult<Option<Command>>;

    /// Undelivered and in-flight commands for an agent, priority DESC then
    /// created_at ASC. Does not lock.
    async fn pending_for_agent(&self, agent_id: Uuid) -> CommandResult<Vec<Command>>;

    /// Flip freshly delivered commands from pending to executing, stamping
    /// executed_at. Already-executing rows are left untouched.
    async fn mark_delivered(&self, ids: Vec<Uuid>) -> CommandResult<()>;

    /// Transition a non-terminal command to completed or failed, recording
    /// the result for idempotent replay. Returns the updated command;
    /// `TerminalState` if it was already terminal.
    async fn finish(
        &self,
        id: Uuid,
        status: CommandStatus,
        result: serde_json::Value,
        post_state: Option<serde_json::Value>,
    ) -> CommandResult<Command>;

    /// Browse commands for the operator surface, newest first
    async fn list(&self, filter: CommandFilter) -> CommandResult<Vec<Command>>;
}
