use chrono::{DateTime, Utc};
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Where a consolidated price point came from
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    Default,
    DeriveActiveEnum,
    EnumIter,
    ToSchema,
    Hash,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "price_source")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PriceSource {
    #[default]
    #[sea_orm(string_value = "agent")]
    Agent,
    #[sea_orm(string_value = "interpolated")]
    Interpolated,
    #[sea_orm(string_value = "backfill")]
    Backfill,
}

/// Consolidation job state
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    Default,
    DeriveActiveEnum,
    EnumIter,
    ToSchema,
    Hash,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "run_status")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RunStatus {
    #[default]
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// Which role of instance reported a snapshot.
///
/// Primary and replica on the same pool may both report the same price in
/// the same minute; deduplication is the consolidator's job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema, Hash,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SourceRole {
    Primary,
    Replica,
}

/// A spot capacity pool: the (instance_type, region, az) triple
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Pool {
    pub id: Uuid,
    pub instance_type: String,
    pub region: String,
    pub az: String,
    /// Rolling mean boot-to-ready seconds across promoted replicas
    pub mean_boot_seconds: Option<f64>,
    pub boot_samples: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity of a pool independent of its row id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct PoolKey {
    pub instance_type: String,
    pub region: String,
    pub az: String,
}

impl PoolKey {
    pub fn new(
        instance_type: impl Into<String>,
        region: impl Into<String>,
        az: impl Into<String>,
    ) -> Self {
        Self {
            instance_type: instance_type.into(),
            region: region.into(),
            az: az.into(),
        }
    }
}

/// A raw staged price point
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SpotPriceSnapshot {
    pub id: i64,
    pub pool_id: Uuid,
    pub price: f64,
    pub observed_at: DateTime<Utc>,
    pub source_instance_id: Option<String>,
    pub source_role: Option<SourceRole>,
    pub is_duplicate: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for staging a price point
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub pool_id: Uuid,
    pub price: f64,
    pub observed_at: DateTime<Utc>,
    pub source_instance_id: Option<String>,
    pub source_role: Option<SourceRole>,
}

/// One row of the consolidated tier
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConsolidatedPrice {
    pub id: Uuid,
    pub pool_id: Uuid,
    pub observed_at: DateTime<Utc>,
    pub price: f64,
    pub is_interpolated: bool,
    /// How many raw snapshots were merged into this point
    pub source_count: i32,
    pub data_source: PriceSource,
    pub created_at: DateTime<Utc>,
}

/// Input for writing a consolidated point
#[derive(Debug, Clone, PartialEq)]
pub struct NewConsolidatedPrice {
    pub pool_id: Uuid,
    pub observed_at: DateTime<Utc>,
    pub price: f64,
    pub is_interpolated: bool,
    pub source_count: i32,
    pub data_source: PriceSource,
}

/// One row of the canonical tier
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CanonicalPrice {
    pub id: Uuid,
    pub pool_id: Uuid,
    pub observed_at: DateTime<Utc>,
    pub price: f64,
    pub confidence_score: f64,
    pub volatility_index: f64,
    pub created_at: DateTime<Utc>,
}

/// Input for writing a canonical point
#[derive(Debug, Clone)]
pub struct NewCanonicalPrice {
    pub pool_id: Uuid,
    pub observed_at: DateTime<Utc>,
    pub price: f64,
    pub confidence_score: f64,
    pub volatility_index: f64,
}

/// Tracking row for one consolidation job execution
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConsolidationRun {
    pub id: Uuid,
    pub status: RunStatus,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub snapshots_processed: i32,
    pub duplicates_removed: i32,
    pub gaps_filled: i32,
    pub backfills_added: i32,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Counters accumulated over one consolidation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RunCounters {
    pub snapshots_processed: i32,
    pub duplicates_removed: i32,
    pub gaps_filled: i32,
    pub backfills_added: i32,
}

/// Agent price report body: prices for the agent's instance type across the
/// availability zones it can see, plus the current on-demand price.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PricingReport {
    #[validate(length(min = 1))]
    pub pools: Vec<PricingReportItem>,
    pub on_demand_price: Option<f64>,
    /// Defaults to the server's receive time
    pub observed_at: Option<DateTime<Utc>>,
}

/// One pool's price inside a report. `id` is the availability zone of the
/// pool; instance type and region come from the reporting agent's context.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct PricingReportItem {
    #[validate(length(min = 1, max = 100))]
    pub id: String,
    #[validate(range(min = 0.0))]
    pub price: f64,
}

/// Query range for canonical price history
#[derive(Debug, Clone, Deserialize, ToSchema, IntoParams)]
pub struct HistoryQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_key_equality() {
        let a = PoolKey::new("c5.large", "us-east-1", "us-east-1a");
        let b = PoolKey::new("c5.large", "us-east-1", "us-east-1a");
        let c = PoolKey::new("c5.large", "us-east-1", "us-east-1b");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_price_source_roundtrip() {
        let json = serde_json::to_string(&PriceSource::Backfill).unwrap();
        assert_eq!(json, "\"backfill\"");
        let parsed: PriceSource = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, PriceSource::Backfill);
    }

    #[test]
    fn test_pricing_report_validation() {
        use validator::Validate;

        let report = PricingReport {
            pools: vec![],
            on_demand_price: None,
            observed_at: None,
        };
        assert!(report.validate().is_err());

        let report = PricingReport {
            pools: vec![PricingReportItem {
                id: "us-east-1a".to_string(),
                price: 0.032,
            }],
            on_demand_price: Some(0.096),
            observed_at: None,
        };
        assert!(report.validate().is_ok());
    }
}
