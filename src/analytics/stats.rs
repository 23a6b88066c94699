//! Summary statistics over two adjacent windows.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::MetricSample;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SummaryStats {
    pub count: u64,
    pub sum: f64,
    pub avg: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub latest: Option<f64>,
    /// Percent change of `avg` against the previous window's average
    pub trend: f64,
}

impl SummaryStats {
    /// Statistics for `current`, with `trend` measured against `previous`.
    /// Non-finite sample values are ignored.
    pub fn compute(current: &[MetricSample], previous: &[MetricSample]) -> Self {
        let mut count = 0u64;
        let mut sum = 0.0;
        let mut min: Option<f64> = None;
        let mut max: Option<f64> = None;
        let mut latest: Option<&MetricSample> = None;

        for sample in current.iter().filter(|s| s.value.is_finite()) {
            count += 1;
            sum += sample.value;
            min = Some(min.map_or(sample.value, |m| m.min(sample.value)));
            max = Some(max.map_or(sample.value, |m| m.max(sample.value)));
            if latest.is_none_or(|l| sample.recorded_at >= l.recorded_at) {
                latest = Some(sample);
            }
        }

        let avg = if count == 0 { 0.0 } else { sum / count as f64 };

        Self {
            count,
            sum,
            avg,
            min,
            max,
            latest: latest.map(|s| s.value),
            trend: trend(avg, previous),
        }
    }
}

fn trend(current_avg: f64, previous: &[MetricSample]) -> f64 {
    let values: Vec<f64> = previous
        .iter()
        .map(|s| s.value)
        .filter(|v| v.is_finite())
        .collect();
    if values.is_empty() {
        return 0.0;
    }

    let previous_avg = values.iter().sum::<f64>() / values.len() as f64;
    if previous_avg == 0.0 {
        return 0.0;
    }

    (current_avg - previous_avg) / previous_avg * 100.0
}
