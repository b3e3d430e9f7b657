//! Event & Notification Bus
//!
//! Two channels with different delivery semantics:
//!
//! ```text
//! ┌──────────────┐   at-least-once, 1 h TTL   ┌─────────────┐
//! │  sse_events  │ ─────────────────────────▶ │ operator UI │
//! └──────────────┘        (SSE flush)         └─────────────┘
//! ┌───────────────┐   append-only, partitioned
//! │ system_events │   (post-mortem audit log)
//! └───────────────┘
//! ```
//!
//! Every other domain publishes through [`EventBus`]; nothing reads its own
//! writes back except the SSE flush loop and the admin audit endpoints.

pub mod entity;
pub mod error;
pub mod handlers;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod service;

pub use error::{EventError, EventResult};
pub use models::{
    EventSeverity, RecordSystemEvent, SseEvent, SystemEvent, SystemEventFilter, event_types,
};
pub use postgres::PgEventRepository;
pub use repository::EventRepository;
pub use service::EventBus;
