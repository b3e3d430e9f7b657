use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ReplicaResult;
use crate::models::{NewReplica, ReplicaInstance, ReplicaStatus};

/// One promoted replica's boot observation, used for fastest-boot-pool
/// selection.
#[derive(Debug, Clone, PartialEq)]
pub struct BootObservation {
    pub pool_id: Uuid,
    pub boot_seconds: f64,
    pub promoted_at: DateTime<Utc>,
}

/// Repository trait for replica persistence
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ReplicaRepository: Send + Sync {
    async fn insert(&self, replica: NewReplica) -> ReplicaResult<ReplicaInstance>;

    async fn by_id(&self, id: Uuid) -> ReplicaResult<Option<ReplicaInstance>>;

    /// Replicas still bindable for failover (launching/syncing/ready)
    async fn active_for_agent(&self, agent_id: Uuid) -> ReplicaResult<Vec<ReplicaInstance>>;

    /// Replicas for the agent work-order poll, optionally narrowed by status
    async fn for_agent(
        &self,
        agent_id: Uuid,
        status: Option<ReplicaStatus>,
    ) -> ReplicaResult<Vec<ReplicaInstance>>;

    /// Bind the concrete cloud instance id; stamps launched_at
    async fn bind_instance(&self, id: Uuid, instance_id: String) -> ReplicaResult<ReplicaInstance>;

    /// Move a replica through its lifecycle, stamping the status timestamp
    async fn set_status(
        &self,
        id: Uuid,
        status: ReplicaStatus,
        sync_lag_seconds: Option<f64>,
    ) -> ReplicaResult<ReplicaInstance>;

    /// Boot observations of promoted replicas across the given pools,
    /// most recent first
    async fn boot_observations(&self, pool_ids: Vec<Uuid>) -> ReplicaResult<Vec<BootObservation>>;
}

/// Fastest-boot pool selection: among pools with at least `min_samples`
/// promoted-replica observations, the lowest mean boot time wins; ties break
/// by the most recent observation.
pub fn fastest_boot_pool(
    observations: &[BootObservation],
    min_samples: usize,
) -> Option<Uuid> {
    use std::collections::HashMap;

    let mut per_pool: HashMap<Uuid, (Vec<f64>, DateTime<Utc>)> = HashMap::new();
    for obs in observations {
        let entry = per_pool
            .entry(obs.pool_id)
            .or_insert_with(|| (Vec::new(), obs.promoted_at));
        entry.0.push(obs.boot_seconds);
        if obs.promoted_at > entry.1 {
            entry.1 = obs.promoted_at;
        }
    }

    per_pool
        .into_iter()
        .filter(|(_, (samples, _))| samples.len() >= min_samples)
        .map(|(pool_id, (samples, latest))| {
            let mean = samples.iter().sum::<f64>() / samples.len() as f64;
            (pool_id, mean, latest)
        })
        .min_by(|(_, mean_a, latest_a), (_, mean_b, latest_b)| {
            mean_a
                .total_cmp(mean_b)
                .then_with(|| latest_b.cmp(latest_a))
        })
        .map(|(pool_id, _, _)| pool_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn obs(pool_id: Uuid, boot_seconds: f64, age_minutes: i64) -> BootObservation {
        BootObservation {
            pool_id,
            boot_seconds,
            promoted_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    #[test]
    fn test_requires_minimum_samples() {
        let pool = Uuid::now_v7();
        let observations = vec![obs(pool, 30.0, 1), obs(pool, 35.0, 2)];
        assert_eq!(fastest_boot_pool(&observations, 3), None);
    }

    #[test]
    fn test_lowest_mean_wins() {
        let fast = Uuid::now_v7();
        let slow = Uuid::now_v7();
        let observations = vec![
            obs(fast, 30.0, 5),
            obs(fast, 32.0, 4),
            obs(fast, 34.0, 3),
            obs(slow, 60.0, 2),
            obs(slow, 62.0, 1),
            obs(slow, 64.0, 6),
        ];

        assert_eq!(fastest_boot_pool(&observations, 3), Some(fast));
    }

    #[test]
    fn test_tie_breaks_by_most_recent_sample() {
        let older = Uuid::now_v7();
        let newer = Uuid::now_v7();
        let observations = vec![
            obs(older, 30.0, 60),
            obs(older, 30.0, 50),
            obs(older, 30.0, 40),
            obs(newer, 30.0, 30),
            obs(newer, 30.0, 20),
            obs(newer, 30.0, 1),
        ];

        assert_eq!(fastest_boot_pool(&observations, 3), Some(newer));
    }
}
