//! Observations and the per-instrument derived series every stage reads
//!
//! A `DerivedSeries` holds the raw close values, the momentum signal built
//! from them, and contiguity bookkeeping so windows that straddle a gap in
//! the minute grid are reported as incomplete rather than silently used.

use crate::instruments::Instrument;
use std::collections::HashMap;

/// Sampling interval of every source series
pub const SAMPLE_INTERVAL_SECS: i64 = 60;

/// One minute bar as stored upstream
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp: i64,
    /// Close of the bar; the value every feature is computed from
    pub value: f64,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<f64>,
}

impl Observation {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self {
            timestamp,
            value,
            open: None,
            high: None,
            low: None,
            volume: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DerivedSeries {
    pub instrument: Instrument,
    pub timestamps: Vec<i64>,
    pub values: Vec<f64>,
    pub momentum: Vec<Option<f64>>,
    /// runs[i] = number of contiguous observations ending at i
    runs: Vec<usize>,
    index: HashMap<i64, usize>,
}

impl DerivedSeries {
    /// Build from time-ordered observations
    ///
    /// Duplicate timestamps keep the first occurrence; non-finite values are
    /// dropped so they surface as gaps.
    pub fn from_observations(
        instrument: Instrument,
        observations: &[Observation],
        momentum_period: usize,
    ) -> Self {
        let mut timestamps = Vec::with_capacity(observations.len());
        let mut values = Vec::with_capacity(observations.len());

        for obs in observations {
            if !obs.value.is_finite() {
                continue;
            }
            if let Some(last) = timestamps.last() {
                if obs.timestamp <= *last {
                    continue;
                }
            }
            timestamps.push(obs.timestamp);
            values.push(obs.value);
        }

        let runs = contiguous_runs(&timestamps);
        let momentum = momentum_series(&values, &runs, momentum_period);
        let index = timestamps
            .iter()
            .enumerate()
            .map(|(i, ts)| (*ts, i))
            .collect();

        Self {
            instrument,
            timestamps,
            values,
            momentum,
            runs,
            index,
        }
    }

    /// Contiguous minute series starting at `start_ts`
    pub fn from_values(
        instrument: Instrument,
        start_ts: i64,
        values: &[f64],
        momentum_period: usize,
    ) -> Self {
        let observations: Vec<Observation> = values
            .iter()
            .enumerate()
            .map(|(i, v)| Observation::new(start_ts + i as i64 * SAMPLE_INTERVAL_SECS, *v))
            .collect();
        Self::from_observations(instrument, &observations, momentum_period)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// True when indices `start..=end` sit on an unbroken minute grid
    pub fn is_contiguous(&self, start: usize, end: usize) -> bool {
        if end < start || end >= self.runs.len() {
            return false;
        }
        self.runs[end] > end - start
    }

    pub fn index_of(&self, timestamp: i64) -> Option<usize> {
        self.index.get(&timestamp).copied()
    }

    pub fn momentum_at(&self, timestamp: i64) -> Option<f64> {
        self.index_of(timestamp).and_then(|i| self.momentum[i])
    }

    /// Whether any observation falls inside `[start_ts, end_ts)`
    pub fn has_rows_between(&self, start_ts: i64, end_ts: i64) -> bool {
        let first = self.timestamps.partition_point(|ts| *ts < start_ts);
        first < self.timestamps.len() && self.timestamps[first] < end_ts
    }

    /// Shift a column aligned with this series back by `lag_minutes`
    ///
    /// The value at `t` becomes the column's value at `t - lag`, or `None`
    /// when no observation exists there.
    pub fn lagged(&self, column: &[Option<f64>], lag_minutes: u32) -> Vec<Option<f64>> {
        let lag_secs = lag_minutes as i64 * SAMPLE_INTERVAL_SECS;
        self.timestamps
            .iter()
            .map(|ts| {
                self.index_of(ts - lag_secs)
                    .and_then(|j| column.get(j).copied().flatten())
            })
            .collect()
    }
}

pub fn contiguous_runs(timestamps: &[i64]) -> Vec<usize> {
    let mut runs = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let run = if i > 0 && ts - timestamps[i - 1] == SAMPLE_INTERVAL_SECS {
            runs[i - 1] + 1
        } else {
            1
        };
        runs.push(run);
    }
    runs
}

/// Percentage rate of change over `period` observations
///
/// `m[i] = 100 * (v[i] - v[i-p]) / v[i-p]`; `None` before the first full
/// period, across gaps, or on a zero base.
pub fn momentum_series(values: &[f64], runs: &[usize], period: usize) -> Vec<Option<f64>> {
    let period = period.max(1);
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            if i < period || runs[i] <= period {
                return None;
            }
            let base = values[i - period];
            super::stats::checked_div(v - base, base).map(|r| r * 100.0)
        })
        .collect()
}
