//! Analytics caching
//!
//! Summary statistics per provider and period, memoized in `analytics_cache`
//! and recomputed from an external [`MetricSource`] when stale or invalidated.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod cache;
pub mod stats;

pub use cache::{AnalyticsCacheManager, AnalyticsSnapshot, RefreshReport};
pub use stats::SummaryStats;

/// Aggregation window for summary statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Today,
    Week,
    Month,
    Quarter,
    Year,
}

impl Period {
    /// Finest to coarsest.
    pub const ALL: [Period; 5] = [
        Period::Today,
        Period::Week,
        Period::Month,
        Period::Quarter,
        Period::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Today => "today",
            Period::Week => "week",
            Period::Month => "month",
            Period::Quarter => "quarter",
            Period::Year => "year",
        }
    }

    pub fn window(&self) -> Duration {
        let days = match self {
            Period::Today => 1,
            Period::Week => 7,
            Period::Month => 30,
            Period::Quarter => 90,
            Period::Year => 365,
        };
        Duration::days(days)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown period: {s}"))
    }
}

/// One observation of a provider metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub recorded_at: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct MetricSourceError(pub String);

/// Supplier of raw samples the statistics are computed from.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Samples recorded in `[from, to)` for the user's provider.
    async fn load_samples(
        &self,
        user_id: Uuid,
        provider: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>, MetricSourceError>;
}

/// Source with no data, for deployments where analytics are not wired up yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyMetricSource;

#[async_trait]
impl MetricSource for EmptyMetricSource {
    async fn load_samples(
        &self,
        _user_id: Uuid,
        _provider: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>, MetricSourceError> {
        Ok(Vec::new())
    }
}
