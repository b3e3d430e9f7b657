//! Historical spot-price backfill from the cloud provider.
//!
//! The provider API is only consulted for holes the agents could not cover;
//! a failed call fails the specific consolidation run and the next run
//! resumes the window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{PricingError, PricingResult};
use crate::models::PoolKey;

/// Source of historical spot prices for a pool
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait BackfillProvider: Send + Sync {
    /// Price points for a pool in [from, to), ascending
    async fn historical_prices(
        &self,
        pool: &PoolKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PricingResult<Vec<(DateTime<Utc>, f64)>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryPoint {
    timestamp: DateTime<Utc>,
    price: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryResponse {
    prices: Vec<HistoryPoint>,
}

/// HTTP client for the provider's spot-price-history endpoint
#[derive(Clone)]
pub struct HttpBackfillProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackfillProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl BackfillProvider for HttpBackfillProvider {
    async fn historical_prices(
        &self,
        pool: &PoolKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PricingResult<Vec<(DateTime<Utc>, f64)>> {
        let url = format!("{}/spot-price-history", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("instanceType", pool.instance_type.as_str()),
                ("region", pool.region.as_str()),
                ("availabilityZone", pool.az.as_str()),
                ("startTime", &from.to_rfc3339()),
                ("endTime", &to.to_rfc3339()),
            ])
            .send()
            .await
            .map_err(|e| PricingError::ExternalUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PricingError::ExternalUnavailable(format!(
                "spot-price-history returned {}",
                response.status()
            )));
        }

        let body: HistoryResponse = response
            .json()
            .await
            .map_err(|e| PricingError::ExternalUnavailable(e.to_string()))?;

        let mut points: Vec<(DateTime<Utc>, f64)> = body
            .prices
            .into_iter()
            .map(|p| (p.timestamp, p.price))
            .collect();
        points.sort_by_key(|(at, _)| *at);

        Ok(points)
    }
}
