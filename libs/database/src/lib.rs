//! Database library providing the PostgreSQL connector and shared utilities
//!
//! All control-plane state lives in a single PostgreSQL database; this crate
//! owns pool configuration, connection retry, health checks, and migration
//! running. Domain crates depend on it for a `DatabaseConnection` and nothing
//! else.
//!
//! # Example
//!
//! ```ignore
//! use core_config::FromEnv;
//! use database::postgres::{self, PostgresConfig};
//!
//! let config = PostgresConfig::from_env()?;
//! let db = postgres::connect_from_config_with_retry(config, None).await?;
//! postgres::run_migrations::<migration::Migrator>(&db, "fleet_api").await?;
//! ```

pub mod common;
pub mod postgres;

pub use common::{DatabaseError, DatabaseResult, RetryConfig};
