//! Pricing Domain
//!
//! Three-tier pricing pipeline for spot capacity pools:
//!
//! ```text
//! ┌──────────────────────┐  raw agent pushes, over-reporting allowed
//! │ spot_price_snapshots │  (staging, partitioned)
//! └──────────┬───────────┘
//!            │ consolidation job (12 h): dedupe to median,
//!            │ interpolate gaps, backfill from the cloud API
//! ┌──────────▼───────────┐
//! │ pricing_consolidated │  one row per (pool, bucket)
//! └──────────┬───────────┘
//!            │ derive confidence + volatility
//! ┌──────────▼───────────┐
//! │  pricing_canonical   │  read surface for ML and charts
//! └──────────────────────┘
//! ```

pub mod backfill;
pub mod consolidation;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod service;

pub use backfill::{BackfillProvider, HttpBackfillProvider};
pub use consolidation::Consolidator;
pub use error::{PricingError, PricingResult};
pub use models::{
    CanonicalPrice, ConsolidatedPrice, ConsolidationRun, NewSnapshot, Pool, PoolKey, PriceSource,
    PricingReport, PricingReportItem, RunStatus, SourceRole, SpotPriceSnapshot,
};
pub use postgres::PgPricingRepository;
pub use repository::PricingRepository;
pub use service::PricingService;
