//! HTTP handlers for the event bus: the SSE stream and the audit browser.

use axum::{
    Json, Router,
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use axum_helpers::{AppError, Identity, errors::responses::UnauthorizedResponse};
use futures::Stream;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use utoipa::OpenApi;
use uuid::Uuid;

use crate::error::EventResult;
use crate::models::{SseEvent, SystemEvent, SystemEventFilter};
use crate::repository::EventRepository;
use crate::service::EventBus;

/// How often an idle SSE connection polls for new rows.
const SSE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// OpenAPI documentation for the event bus API
#[derive(OpenApi)]
#[openapi(
    paths(stream_events, list_audit_events),
    components(
        schemas(SseEvent, SystemEvent, crate::models::EventSeverity),
        responses(UnauthorizedResponse)
    ),
    tags(
        (name = "events", description = "Server-push notifications and audit log")
    )
)]
pub struct ApiDoc;

/// Create the client-facing events router (`/stream`)
pub fn router<R: EventRepository + 'static>(bus: EventBus<R>) -> Router {
    Router::new()
        .route("/stream", get(stream_events))
        .with_state(Arc::new(bus))
}

/// Create the admin-facing audit router (`/`)
pub fn audit_router<R: EventRepository + 'static>(bus: EventBus<R>) -> Router {
    Router::new()
        .route("/", get(list_audit_events))
        .with_state(Arc::new(bus))
}

struct StreamState<R: EventRepository> {
    bus: Arc<EventBus<R>>,
    client_id: Uuid,
    buffer: VecDeque<SseEvent>,
}

/// Long-lived server-sent-events stream of per-client notifications.
///
/// Pending rows are flushed in `created_at` order; the connection then polls
/// for new rows. Delivery is at-least-once; rows not read within their TTL
/// expire server-side.
#[utoipa::path(
    get,
    path = "/stream",
    tag = "events",
    responses(
        (status = 200, description = "SSE stream of notification events", content_type = "text/event-stream"),
        (status = 401, response = UnauthorizedResponse)
    )
)]
async fn stream_events<R: EventRepository + 'static>(
    State(bus): State<Arc<EventBus<R>>>,
    identity: Identity,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let client_id = identity.require_client_id()?;

    let state = StreamState {
        bus,
        client_id,
        buffer: VecDeque::new(),
    };

    let stream = futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.buffer.pop_front() {
                let sse_event = to_sse(&event);
                return Some((Ok::<_, Infallible>(sse_event), state));
            }

            match state.bus.drain_pending(state.client_id).await {
                Ok(events) if !events.is_empty() => {
                    state.buffer.extend(events);
                }
                Ok(_) => {
                    tokio::time::sleep(SSE_POLL_INTERVAL).await;
                }
                Err(e) => {
                    tracing::error!(client_id = %state.client_id, "SSE flush failed: {}", e);
                    tokio::time::sleep(SSE_POLL_INTERVAL).await;
                }
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &SseEvent) -> Event {
    Event::default()
        .id(event.id.to_string())
        .event(event.event_type.clone())
        .data(event.payload.to_string())
}

/// Browse the append-only audit log.
#[utoipa::path(
    get,
    path = "",
    tag = "events",
    params(SystemEventFilter),
    responses(
        (status = 200, description = "Audit entries, newest first", body = Vec<SystemEvent>),
        (status = 401, response = UnauthorizedResponse)
    )
)]
async fn list_audit_events<R: EventRepository + 'static>(
    State(bus): State<Arc<EventBus<R>>>,
    Query(filter): Query<SystemEventFilter>,
) -> EventResult<Json<Vec<SystemEvent>>> {
    let events = bus.list_audit(filter).await?;
    Ok(Json(events))
}
