//! Time-indexed metrics samples (spec §3 "Server Metrics Sample", "Pod
//! Metrics Sample").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PodId, ServerId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMetricsSample {
    pub server_id: ServerId,
    pub cpu_usage_percent: f64,
    pub memory_usage_mb: f64,
    pub disk_usage_gb: f64,
    pub active_pods_count: u32,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodMetricsSample {
    pub pod_id: PodId,
    pub container_id: String,
    pub cpu_usage_percent: f64,
    pub memory_usage_mb: f64,
    pub disk_usage_mb: f64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregation bucket width, selected by query horizon (spec §3 retention
/// note: 1/2/5/15/30 minute buckets over a rolling 7-day window).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationBucket {
    OneMinute,
    TwoMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
}

impl AggregationBucket {
    pub fn seconds(self) -> i64 {
        match self {
            AggregationBucket::OneMinute => 60,
            AggregationBucket::TwoMinutes => 120,
            AggregationBucket::FiveMinutes => 300,
            AggregationBucket::FifteenMinutes => 900,
            AggregationBucket::ThirtyMinutes => 1800,
        }
    }

    /// Pick the coarsest bucket that still yields a reasonable number of
    /// points over the requested horizon (target: a few hundred points).
    pub fn for_horizon(horizon: chrono::Duration) -> Self {
        let hours = horizon.num_hours();
        if hours <= 2 {
            AggregationBucket::OneMinute
        } else if hours <= 6 {
            AggregationBucket::TwoMinutes
        } else if hours <= 24 {
            AggregationBucket::FiveMinutes
        } else if hours <= 72 {
            AggregationBucket::FifteenMinutes
        } else {
            AggregationBucket::ThirtyMinutes
        }
    }
}

pub const RETENTION: chrono::Duration = chrono::Duration::days(7);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_coarser_buckets_for_longer_horizons() {
        assert_eq!(AggregationBucket::for_horizon(chrono::Duration::hours(1)), AggregationBucket::OneMinute);
        assert_eq!(AggregationBucket::for_horizon(chrono::Duration::hours(12)), AggregationBucket::FiveMinutes);
        assert_eq!(AggregationBucket::for_horizon(chrono::Duration::days(6)), AggregationBucket::ThirtyMinutes);
    }
}
