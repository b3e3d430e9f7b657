//! Partition maintenance for the range-partitioned tables.
//!
//! `spot_price_snapshots` and `system_events` are partitioned by month on
//! `created_at`; this task creates the current and next month's partitions
//! ahead of time and drops partitions past retention in O(1).

use chrono::{Datelike, Months, NaiveDate, Utc};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr};
use tracing::{debug, info};

const PARTITIONED_TABLES: [&str; 2] = ["spot_price_snapshots", "system_events"];

/// How many whole months of partitions are kept before dropping.
const RETENTION_MONTHS: u32 = 3;

fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).expect("first of month is valid")
}

fn partition_name(table: &str, month: NaiveDate) -> String {
    format!("{}_y{}m{:02}", table, month.year(), month.month())
}

/// Create current and next month's partitions if missing, and drop partitions
/// older than retention.
pub async fn maintain(db: &DatabaseConnection) -> Result<(), DbErr> {
    let this_month = month_start(Utc::now().date_naive());

    for table in PARTITIONED_TABLES {
        for offset in 0..2u32 {
            let from = this_month + Months::new(offset);
            let to = from + Months::new(1);
            let name = partition_name(table, from);

            db.execute_unprepared(&format!(
                "CREATE TABLE IF NOT EXISTS {name} PARTITION OF {table} \
                 FOR VALUES FROM ('{from}') TO ('{to}')"
            ))
            .await?;
            debug!(partition = %name, "Partition ensured");
        }

        let drop_month = this_month - Months::new(RETENTION_MONTHS);
        let drop_name = partition_name(table, drop_month);
        db.execute_unprepared(&format!("DROP TABLE IF EXISTS {drop_name}"))
            .await?;
        info!(table, dropped = %drop_name, "Old partition dropped if present");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_name() {
        let month = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert_eq!(
            partition_name("spot_price_snapshots", month),
            "spot_price_snapshots_y2026m03"
        );
    }

    #[test]
    fn test_month_start() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        assert_eq!(month_start(date), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }
}
