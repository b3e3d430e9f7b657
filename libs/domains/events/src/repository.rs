use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EventResult;
use crate::models::{RecordSystemEvent, SseEvent, SystemEvent, SystemEventFilter};

/// Repository trait for the event & notification bus
///
/// The audit channel is append-only; the SSE channel supports the flush
/// loop (pending → delivered) and TTL expiry.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Append an audit entry
    async fn append_system_event(&self, input: RecordSystemEvent) -> EventResult<()>;

    /// Insert a pending UI notification with the given expiry
    async fn insert_sse_event(
        &self,
        client_id: Uuid,
        event_type: String,
        payload: serde_json::Value,
        expires_at: DateTime<Utc>,
    ) -> EventResult<SseEvent>;

    /// Undelivered, unexpired notifications for a client in created_at order
    async fn pending_sse_for_client(&self, client_id: Uuid, now: DateTime<Utc>)
    -> EventResult<Vec<SseEvent>>;

    /// Mark a batch of notifications as delivered
    async fn mark_delivered(&self, ids: Vec<Uuid>) -> EventResult<()>;

    /// Delete notifications past their TTL; returns how many were removed
    async fn delete_expired_sse(&self, now: DateTime<Utc>) -> EventResult<u64>;

    /// Browse the audit log
    async fn list_system_events(&self, filter: SystemEventFilter) -> EventResult<Vec<SystemEvent>>;
}
