//! Server setup: router composition, docs, middleware, graceful shutdown.

mod app;

pub use app::{create_app, create_production_app, create_router};
pub use crate::health::{health_router, run_health_checks};
