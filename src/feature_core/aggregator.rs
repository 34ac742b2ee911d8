//! Backward-looking window aggregation over the raw series

use super::series::DerivedSeries;
use super::stats::{checked_div, mean, sample_std_dev};

/// Summary of the slice `[i-W, i)` relative to the current value `v[i]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateFeature {
    /// Σ(past − current) / current
    pub cumulative_return: Option<f64>,
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    pub stdev: Option<f64>,
    /// (first_past − current) / current
    pub endpoint: Option<f64>,
}

impl AggregateFeature {
    /// Values in column order: return, max, min, mean, stdev, endpoint
    pub fn columns(&self) -> [Option<f64>; 6] {
        [
            self.cumulative_return,
            Some(self.max),
            Some(self.min),
            Some(self.mean),
            self.stdev,
            self.endpoint,
        ]
    }
}

pub struct WindowAggregator {
    window: usize,
}

impl WindowAggregator {
    pub fn new(window_minutes: u32) -> Self {
        Self {
            window: window_minutes as usize,
        }
    }

    /// Aggregate at index `i`; `None` while fewer than W prior contiguous
    /// observations exist
    pub fn aggregate_at(&self, series: &DerivedSeries, i: usize) -> Option<AggregateFeature> {
        let w = self.window;
        if w == 0 || i < w || i >= series.len() || !series.is_contiguous(i - w, i) {
            return None;
        }

        let past = &series.values[i - w..i];
        let current = series.values[i];

        let max = past.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = past.iter().copied().fold(f64::INFINITY, f64::min);
        let deviation_sum: f64 = past.iter().map(|p| p - current).sum();

        Some(AggregateFeature {
            cumulative_return: checked_div(deviation_sum, current),
            max,
            min,
            mean: mean(past)?,
            stdev: sample_std_dev(past),
            endpoint: checked_div(past[0] - current, current),
        })
    }

    pub fn compute(&self, series: &DerivedSeries) -> Vec<Option<AggregateFeature>> {
        (0..series.len())
            .map(|i| self.aggregate_at(series, i))
            .collect()
    }
}
