use crate::{ConfigError, FromEnv, env_or_default, env_parse_or_default};
use std::path::PathBuf;

/// Control-plane engine tunables.
///
/// Every knob is environment-driven with the documented default; a subset
/// (currently `terminate_wait_seconds`) can also be overridden per agent.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Grace period before a demoted primary is terminated.
    pub terminate_wait_seconds: u32,
    /// Cadence of the replica coordinator loop.
    pub replica_coordinator_interval_seconds: u64,
    /// Cadence of the pricing consolidation job.
    pub consolidation_interval_hours: u64,
    /// How long zombies are retained before the cleanup job terminates them.
    pub zombie_retention_days: u32,
    /// Failover deadline after a rebalance notice.
    pub emergency_rebalance_deadline_seconds: u32,
    /// Failover deadline after a termination notice.
    pub emergency_termination_deadline_seconds: u32,
    /// An agent with no heartbeat for this long is marked offline.
    pub heartbeat_stale_seconds: u32,
    /// Consecutive failed emergency promotions before the agent is flagged `error`.
    pub emergency_failure_threshold: u32,
    /// A standing replica whose pool is this much above the cheapest is logged.
    pub replica_price_margin_percent: u32,
    /// Directory where operator-uploaded decision-model artifacts live.
    pub model_artifact_dir: PathBuf,
}

impl FromEnv for EngineConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            terminate_wait_seconds: env_parse_or_default("TERMINATE_WAIT_SECONDS", 300)?,
            replica_coordinator_interval_seconds: env_parse_or_default(
                "REPLICA_COORDINATOR_INTERVAL_SECONDS",
                10,
            )?,
            consolidation_interval_hours: env_parse_or_default("CONSOLIDATION_INTERVAL_HOURS", 12)?,
            zombie_retention_days: env_parse_or_default("ZOMBIE_RETENTION_DAYS", 30)?,
            emergency_rebalance_deadline_seconds: env_parse_or_default(
                "EMERGENCY_REBALANCE_DEADLINE_SECONDS",
                120,
            )?,
            emergency_termination_deadline_seconds: env_parse_or_default(
                "EMERGENCY_TERMINATION_DEADLINE_SECONDS",
                60,
            )?,
            heartbeat_stale_seconds: env_parse_or_default("HEARTBEAT_STALE_SECONDS", 600)?,
            emergency_failure_threshold: env_parse_or_default("EMERGENCY_FAILURE_THRESHOLD", 3)?,
            replica_price_margin_percent: env_parse_or_default("REPLICA_PRICE_MARGIN_PERCENT", 20)?,
            model_artifact_dir: PathBuf::from(env_or_default(
                "MODEL_ARTIFACT_DIR",
                "./model-artifacts",
            )),
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            terminate_wait_seconds: 300,
            replica_coordinator_interval_seconds: 10,
            consolidation_interval_hours: 12,
            zombie_retention_days: 30,
            emergency_rebalance_deadline_seconds: 120,
            emergency_termination_deadline_seconds: 60,
            heartbeat_stale_seconds: 600,
            emergency_failure_threshold: 3,
            replica_price_margin_percent: 20,
            model_artifact_dir: PathBuf::from("./model-artifacts"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        temp_env::with_vars(
            [
                ("TERMINATE_WAIT_SECONDS", None::<&str>),
                ("ZOMBIE_RETENTION_DAYS", None),
                ("EMERGENCY_REBALANCE_DEADLINE_SECONDS", None),
            ],
            || {
                let config = EngineConfig::from_env().unwrap();
                assert_eq!(config.terminate_wait_seconds, 300);
                assert_eq!(config.replica_coordinator_interval_seconds, 10);
                assert_eq!(config.consolidation_interval_hours, 12);
                assert_eq!(config.zombie_retention_days, 30);
                assert_eq!(config.emergency_rebalance_deadline_seconds, 120);
                assert_eq!(config.emergency_termination_deadline_seconds, 60);
                assert_eq!(config.heartbeat_stale_seconds, 600);
            },
        );
    }

    #[test]
    fn test_engine_config_overrides() {
        temp_env::with_vars(
            [
                ("TERMINATE_WAIT_SECONDS", Some("0")),
                ("ZOMBIE_RETENTION_DAYS", Some("7")),
                ("REPLICA_PRICE_MARGIN_PERCENT", Some("35")),
            ],
            || {
                let config = EngineConfig::from_env().unwrap();
                assert_eq!(config.terminate_wait_seconds, 0);
                assert_eq!(config.zombie_retention_days, 7);
                assert_eq!(config.replica_price_margin_percent, 35);
            },
        );
    }

    #[test]
    fn test_engine_config_rejects_garbage() {
        temp_env::with_var("ZOMBIE_RETENTION_DAYS", Some("a month"), || {
            let result = EngineConfig::from_env();
            assert!(result.is_err());
        });
    }
}
