use std::str::FromStr;

use crate::models::{PriceSource, RunStatus, SourceRole};

/// Sea-ORM entity for the pools table
pub mod pools {
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "pools")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        #[sea_orm(column_type = "String(StringLen::N(255))")]
        pub instance_type: String,
        #[sea_orm(column_type = "String(StringLen::N(100))")]
        pub region: String,
        #[sea_orm(column_type = "String(StringLen::N(100))")]
        pub az: String,
        pub mean_boot_seconds: Option<f64>,
        pub boot_samples: i32,
        pub created_at: DateTimeWithTimeZone,
        pub updated_at: DateTimeWithTimeZone,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Sea-ORM entity for the staging tier (partitioned)
pub mod spot_price_snapshots {
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "spot_price_snapshots")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub pool_id: Uuid,
        pub price: f64,
        pub observed_at: DateTimeWithTimeZone,
        #[sea_orm(column_type = "String(StringLen::N(255))", nullable)]
        pub source_instance_id: Option<String>,
        #[sea_orm(column_type = "String(StringLen::N(16))", nullable)]
        pub source_role: Option<String>,
        pub is_duplicate: bool,
        pub created_at: DateTimeWithTimeZone,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Sea-ORM entity for the consolidated tier
pub mod pricing_consolidated {
    use super::PriceSource;
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "pricing_consolidated")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub pool_id: Uuid,
        pub observed_at: DateTimeWithTimeZone,
        pub price: f64,
        pub is_interpolated: bool,
        pub source_count: i32,
        pub data_source: PriceSource,
        pub created_at: DateTimeWithTimeZone,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Sea-ORM entity for the canonical tier
pub mod pricing_canonical {
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "pricing_canonical")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub pool_id: Uuid,
        pub observed_at: DateTimeWithTimeZone,
        pub price: f64,
        pub confidence_score: f64,
        pub volatility_index: f64,
        pub created_at: DateTimeWithTimeZone,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Sea-ORM entity for consolidation job tracking
pub mod consolidation_runs {
    use super::RunStatus;
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "consolidation_runs")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub status: RunStatus,
        pub window_start: DateTimeWithTimeZone,
        pub window_end: DateTimeWithTimeZone,
        pub snapshots_processed: i32,
        pub duplicates_removed: i32,
        pub gaps_filled: i32,
        pub backfills_added: i32,
        #[sea_orm(column_type = "Text", nullable)]
        pub error: Option<String>,
        pub started_at: DateTimeWithTimeZone,
        pub finished_at: Option<DateTimeWithTimeZone>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

// Conversions from Sea-ORM models to domain types

impl From<pools::Model> for crate::models::Pool {
    fn from(model: pools::Model) -> Self {
        Self {
            id: model.id,
            instance_type: model.instance_type,
            region: model.region,
            az: model.az,
            mean_boot_seconds: model.mean_boot_seconds,
            boot_samples: model.boot_samples,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }
}

impl From<spot_price_snapshots::Model> for crate::models::SpotPriceSnapshot {
    fn from(model: spot_price_snapshots::Model) -> Self {
        Self {
            id: model.id,
            pool_id: model.pool_id,
            price: model.price,
            observed_at: model.observed_at.into(),
            source_instance_id: model.source_instance_id,
            source_role: model
                .source_role
                .as_deref()
                .and_then(|s| SourceRole::from_str(s).ok()),
            is_duplicate: model.is_duplicate,
            created_at: model.created_at.into(),
        }
    }
}

impl From<pricing_consolidated::Model> for crate::models::ConsolidatedPrice {
    fn from(model: pricing_consolidated::Model) -> Self {
        Self {
            id: model.id,
            pool_id: model.pool_id,
            observed_at: model.observed_at.into(),
            price: model.price,
            is_interpolated: model.is_interpolated,
            source_count: model.source_count,
            data_source: model.data_source,
            created_at: model.created_at.into(),
        }
    }
}

impl From<pricing_canonical::Model> for crate::models::CanonicalPrice {
    fn from(model: pricing_canonical::Model) -> Self {
        Self {
            id: model.id,
            pool_id: model.pool_id,
            observed_at: model.observed_at.into(),
            price: model.price,
            confidence_score: model.confidence_score,
            volatility_index: model.volatility_index,
            created_at: model.created_at.into(),
        }
    }
}

impl From<consolidation_runs::Model> for crate::models::ConsolidationRun {
    fn from(model: consolidation_runs::Model) -> Self {
        Self {
            id: model.id,
            status: model.status,
            window_start: model.window_start.into(),
            window_end: model.window_end.into(),
            snapshots_processed: model.snapshots_processed,
            duplicates_removed: model.duplicates_removed,
            gaps_filled: model.gaps_filled,
            backfills_added: model.backfills_added,
            error: model.error,
            started_at: model.started_at.into(),
            finished_at: model.finished_at.map(Into::into),
        }
    }
}
