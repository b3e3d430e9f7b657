use std::sync::Arc;
use uuid::Uuid;

use domain_events::{EventBus, EventRepository, EventSeverity, event_types};

use crate::error::{CommandError, CommandResult};
use crate::models::{
    Command, CommandFilter, CommandStatus, EnqueueOutcome, ExecutionResult, NewCommand,
};
use crate::repository::CommandRepository;

/// The priority command queue
pub struct CommandQueue<R: CommandRepository, E: EventRepository> {
    repository: Arc<R>,
    events: EventBus<E>,
}

impl<R: CommandRepository, E: EventRepository> Clone for CommandQueue<R, E> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            events: self.events.clone(),
        }
    }
}

impl<R: CommandRepository, E: EventRepository> CommandQueue<R, E> {
    pub fn new(repository: R, events: EventBus<E>) -> Self {
        Self {
            repository: Arc::new(repository),
            events,
        }
    }

    /// Enqueue a command under its idempotency key.
    ///
    /// - unseen `request_id`: a pending command is created
    /// - in-flight `request_id`: `DuplicateRequest` (409), no state change
    /// - terminal `request_id`: the original command is replayed
    pub async fn enqueue(
        &self,
        client_id: Uuid,
        input: NewCommand,
    ) -> CommandResult<EnqueueOutcome> {
        if let Some(existing) = self
            .repository
            .find_by_request_id(&input.request_id)
            .await?
        {
            return resolve_existing(existing);
        }

        let agent_id = input.agent_id;
        let request_id = input.request_id.clone();

        match self.repository.insert(input).await {
            Ok(command) => {
                self.events
                    .publish(
                        client_id,
                        Some(agent_id),
                        EventSeverity::Info,
                        event_types::COMMAND_CREATED,
                        serde_json::json!({
                            "commandId": command.id,
                            "kind": command.kind,
                            "priority": command.priority,
                            "trigger": command.trigger,
                        }),
                    )
                    .await;
                Ok(EnqueueOutcome::Created(command))
            }
            // Lost a race on the unique request_id index: resolve against the
            // winner instead of surfacing the database error
            Err(CommandError::Database(_)) => {
                match self.repository.find_by_request_id(&request_id).await? {
                    Some(existing) => resolve_existing(existing),
                    None => Err(CommandError::ReportMismatch(format!(
                        "request {} vanished during enqueue race",
                        request_id
                    ))),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Commands for an agent in priority-then-FIFO order. Freshly delivered
    /// commands move to `executing`; delivery does not lock, so an agent that
    /// re-polls sees the same order again until it reports.
    pub async fn take_for_agent(&self, agent_id: Uuid) -> CommandResult<Vec<Command>> {
        let commands = self.repository.pending_for_agent(agent_id).await?;

        let fresh: Vec<Uuid> = commands
            .iter()
            .filter(|c| c.status == CommandStatus::Pending)
            .map(|c| c.id)
            .collect();
        self.repository.mark_delivered(fresh).await?;

        Ok(commands)
    }

    /// Record the agent-reported outcome of a command.
    pub async fn report_executed(
        &self,
        client_id: Uuid,
        command_id: Uuid,
        result: ExecutionResult,
    ) -> CommandResult<Command> {
        let status = if result.success {
            CommandStatus::Completed
        } else {
            CommandStatus::Failed
        };

        let command = self
            .repository
            .finish(command_id, status, serde_json::to_value(&result)?, None)
            .await?;

        let event_type = if result.success {
            event_types::COMMAND_COMPLETED
        } else {
            event_types::COMMAND_FAILED
        };
        self.events
            .publish(
                client_id,
                Some(command.agent_id),
                if result.success {
                    EventSeverity::Info
                } else {
                    EventSeverity::Warning
                },
                event_type,
                serde_json::json!({
                    "commandId": command.id,
                    "kind": command.kind,
                    "message": result.message,
                }),
            )
            .await;

        Ok(command)
    }

    /// Close a command from inside the control plane (e.g. a validated
    /// switch report), attaching the post state.
    pub async fn finish_with_state(
        &self,
        command_id: Uuid,
        status: CommandStatus,
        result: serde_json::Value,
        post_state: serde_json::Value,
    ) -> CommandResult<Command> {
        self.repository
            .finish(command_id, status, result, Some(post_state))
            .await
    }

    pub async fn get(&self, command_id: Uuid) -> CommandResult<Command> {
        self.repository
            .find_by_id(command_id)
            .await?
            .ok_or(CommandError::NotFound(command_id))
    }

    pub async fn find_by_request_id(&self, request_id: &str) -> CommandResult<Option<Command>> {
        self.repository.find_by_request_id(request_id).await
    }

    pub async fn list(&self, filter: CommandFilter) -> CommandResult<Vec<Command>> {
        self.repository.list(filter).await
    }
}

fn resolve_existing(existing: Command) -> CommandResult<EnqueueOutcome> {
    if existing.status.is_terminal() {
        Ok(EnqueueOutcome::Replayed(existing))
    } else {
        Err(CommandError::DuplicateRequest {
            request_id: existing.request_id,
            command_id: existing.id,
        })
    }
}
