//! # Axum Helpers
//!
//! A collection of utilities, middleware, and helpers for building the
//! control plane's Axum services.
//!
//! ## Features
//!
//! - **Server Management**: Easy server setup with graceful shutdown
//! - **Auth**: Bearer-token authentication middleware over a pluggable store
//! - **Error Handling**: Structured error responses with proper HTTP status codes
//! - **Health Checks**: Built-in health and readiness endpoints
//! - **OpenAPI Documentation**: Integrated Swagger UI
//! - **Extractors**: Validated JSON, UUID path parameters, idempotency keys

pub mod auth;
pub mod errors;
pub mod extractors;
pub mod health;
pub mod server;
pub mod shutdown;

// Re-export commonly used types
pub use auth::{AuthRole, AuthState, AuthStore, Identity, bearer_auth, hash_token, require_admin};
pub use errors::{AppError, ErrorResponse};
pub use health::{HealthResponse, health_router, run_health_checks};
pub use server::{create_app, create_production_app, create_router};
pub use shutdown::{ShutdownCoordinator, shutdown_signal};

// Re-export extractors
pub use extractors::{RequestIdHeader, UuidPath, ValidatedJson};
