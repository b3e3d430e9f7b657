use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::EventResult;
use crate::models::{EventSeverity, RecordSystemEvent, SseEvent, SystemEvent, SystemEventFilter};
use crate::repository::EventRepository;

/// Undelivered UI notifications auto-expire after this long.
const SSE_TTL_MINUTES: i64 = 60;

/// Service for publishing to both event channels
pub struct EventBus<R: EventRepository> {
    repository: Arc<R>,
}

impl<R: EventRepository> Clone for EventBus<R> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
        }
    }
}

impl<R: EventRepository> EventBus<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository: Arc::new(repository),
        }
    }

    /// Append an audit entry. Audit failures are logged, never propagated:
    /// the bus must not take down the operation it is recording.
    pub async fn audit(&self, record: RecordSystemEvent) {
        if let Err(e) = self.repository.append_system_event(record.clone()).await {
            tracing::error!(
                event_type = %record.event_type,
                "Failed to append audit event: {}",
                e
            );
        }
    }

    /// Queue a UI notification for a client.
    pub async fn notify(
        &self,
        client_id: Uuid,
        event_type: &str,
        payload: serde_json::Value,
    ) -> EventResult<SseEvent> {
        let expires_at = Utc::now() + Duration::minutes(SSE_TTL_MINUTES);
        self.repository
            .insert_sse_event(client_id, event_type.to_string(), payload, expires_at)
            .await
    }

    /// Publish to both channels at once: audit entry plus UI notification.
    pub async fn publish(
        &self,
        client_id: Uuid,
        agent_id: Option<Uuid>,
        severity: EventSeverity,
        event_type: &str,
        payload: serde_json::Value,
    ) {
        let mut record =
            RecordSystemEvent::new(event_type, severity).client(client_id).context(payload.clone());
        if let Some(agent_id) = agent_id {
            record = record.agent(agent_id);
        }
        self.audit(record).await;

        if let Err(e) = self.notify(client_id, event_type, payload).await {
            tracing::error!(event_type, "Failed to queue UI notification: {}", e);
        }
    }

    /// Fetch pending notifications for a client and mark them delivered.
    pub async fn drain_pending(&self, client_id: Uuid) -> EventResult<Vec<SseEvent>> {
        let events = self
            .repository
            .pending_sse_for_client(client_id, Utc::now())
            .await?;

        if !events.is_empty() {
            let ids = events.iter().map(|e| e.id).collect();
            self.repository.mark_delivered(ids).await?;
        }

        Ok(events)
    }

    /// Remove notifications past their TTL; returns the number removed.
    pub async fn cleanup_expired(&self) -> EventResult<u64> {
        self.repository.delete_expired_sse(Utc::now()).await
    }

    /// Browse the audit log.
    pub async fn list_audit(&self, filter: SystemEventFilter) -> EventResult<Vec<SystemEvent>> {
        self.repository.list_system_events(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event_types;
    use crate::repository::MockEventRepository;
    use mockall::predicate::*;

    fn sse_event(client_id: Uuid) -> SseEvent {
        SseEvent {
            id: Uuid::now_v7(),
            client_id,
            event_type: event_types::AGENT_ONLINE.to_string(),
            payload: serde_json::json!({}),
            delivered: false,
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::minutes(60),
        }
    }

    #[tokio::test]
    async fn test_notify_sets_one_hour_ttl() {
        let client_id = Uuid::now_v7();
        let mut repo = MockEventRepository::new();

        repo.expect_insert_sse_event()
            .withf(move |cid, event_type, _, expires_at| {
                let ttl = *expires_at - Utc::now();
                *cid == client_id
                    && event_type == event_types::AGENT_ONLINE
                    && ttl > Duration::minutes(59)
                    && ttl <= Duration::minutes(60)
            })
            .returning(|cid, _, _, _| Ok(sse_event(cid)));

        let bus = EventBus::new(repo);
        let result = bus
            .notify(client_id, event_types::AGENT_ONLINE, serde_json::json!({}))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_drain_marks_delivered() {
        let client_id = Uuid::now_v7();
        let pending = vec![sse_event(client_id), sse_event(client_id)];
        let ids: Vec<Uuid> = pending.iter().map(|e| e.id).collect();

        let mut repo = MockEventRepository::new();
        let pending_clone = pending.clone();
        repo.expect_pending_sse_for_client()
            .returning(move |_, _| Ok(pending_clone.clone()));
        repo.expect_mark_delivered()
            .with(eq(ids))
            .times(1)
            .returning(|_| Ok(()));

        let bus = EventBus::new(repo);
        let drained = bus.drain_pending(client_id).await.unwrap();
        assert_eq!(drained.len(), 2);
    }

    #[tokio::test]
    async fn test_drain_skips_mark_when_empty() {
        let mut repo = MockEventRepository::new();
        repo.expect_pending_sse_for_client().returning(|_, _| Ok(vec![]));
        repo.expect_mark_delivered().times(0);

        let bus = EventBus::new(repo);
        let drained = bus.drain_pending(Uuid::now_v7()).await.unwrap();
        assert!(drained.is_empty());
    }
}
