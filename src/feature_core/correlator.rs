//! Cross-series correlation against related instruments
//!
//! For a target instrument and one peer group (instruments sharing its base
//! or its quote currency) this computes, per trailing window:
//! - mean Pearson correlation of target momentum vs. each member's momentum
//! - mean sample covariance
//! - stability: 1 / stdev of the per-member correlations
//! - relative strength of the target against the group-average momentum
//!
//! plus an unwindowed divergence at the last strictly-earlier point.

use super::series::DerivedSeries;
use super::stats::{checked_div, mean, pearson, sample_covariance, sample_std_dev};
use crate::instruments::Component;
use std::sync::Arc;

/// Minimum aligned points for a correlation to be defined
pub const DEFAULT_MIN_CORRELATION_POINTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelatedGroup {
    SharesBase,
    SharesQuote,
}

impl RelatedGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelatedGroup::SharesBase => "base",
            RelatedGroup::SharesQuote => "quote",
        }
    }

    pub fn component(&self) -> Component {
        match self {
            RelatedGroup::SharesBase => Component::Base,
            RelatedGroup::SharesQuote => Component::Quote,
        }
    }

    pub fn all() -> [RelatedGroup; 2] {
        [RelatedGroup::SharesBase, RelatedGroup::SharesQuote]
    }
}

/// Group statistics for one (target, window, group) at one timestamp
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GroupWindowStats {
    pub corr: Option<f64>,
    pub cov: Option<f64>,
    pub stability: Option<f64>,
    pub relative_strength: Option<f64>,
}

impl GroupWindowStats {
    /// Values in column order: corr, cov, stability, relative_strength
    pub fn columns(&self) -> [Option<f64>; 4] {
        [self.corr, self.cov, self.stability, self.relative_strength]
    }
}

/// Outcome of correlating the target against one group member
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MemberCorrelation {
    Defined { corr: f64, cov: Option<f64> },
    /// Window incomplete or fewer aligned pairs than the minimum
    TooFewPoints,
    /// Zero variance on either side
    Degenerate,
}

pub struct CrossSeriesCorrelator {
    min_points: usize,
}

impl CrossSeriesCorrelator {
    pub fn new(min_points: usize) -> Self {
        Self {
            min_points: min_points.max(2),
        }
    }

    /// Trailing window `[i-W, i)` of the target, if complete
    fn window_range(&self, target: &DerivedSeries, i: usize, window: usize) -> Option<std::ops::Range<usize>> {
        if window == 0 || i < window || i > target.len() || !target.is_contiguous(i - window, i - 1) {
            return None;
        }
        Some(i - window..i)
    }

    /// Correlation and covariance of target vs. one member over `[i-W, i)`
    ///
    /// Pairs are aligned by timestamp; pairs with a missing or non-finite side
    /// are dropped.
    pub fn member_correlation(
        &self,
        target: &DerivedSeries,
        member: &DerivedSeries,
        i: usize,
        window: usize,
    ) -> MemberCorrelation {
        let Some(range) = self.window_range(target, i, window) else {
            return MemberCorrelation::TooFewPoints;
        };

        let mut xs = Vec::with_capacity(window);
        let mut ys = Vec::with_capacity(window);
        for j in range {
            let Some(x) = target.momentum[j] else { continue };
            let Some(y) = member.momentum_at(target.timestamps[j]) else { continue };
            if x.is_finite() && y.is_finite() {
                xs.push(x);
                ys.push(y);
            }
        }

        if xs.len() < self.min_points {
            return MemberCorrelation::TooFewPoints;
        }

        match pearson(&xs, &ys) {
            Some(corr) => MemberCorrelation::Defined {
                corr,
                cov: sample_covariance(&xs, &ys),
            },
            None => MemberCorrelation::Degenerate,
        }
    }

    /// Mean momentum of the group members at `timestamp`
    pub fn group_momentum_at(&self, members: &[Arc<DerivedSeries>], timestamp: i64) -> Option<f64> {
        let values: Vec<f64> = members
            .iter()
            .filter_map(|m| m.momentum_at(timestamp))
            .filter(|v| v.is_finite())
            .collect();
        mean(&values)
    }

    pub fn group_window_stats(
        &self,
        target: &DerivedSeries,
        members: &[Arc<DerivedSeries>],
        i: usize,
        window: usize,
    ) -> GroupWindowStats {
        self.window_stats(target, members, i, window, &mut 0)
    }

    /// Group statistics, counting zero-variance member windows into `degenerate`
    fn window_stats(
        &self,
        target: &DerivedSeries,
        members: &[Arc<DerivedSeries>],
        i: usize,
        window: usize,
        degenerate: &mut usize,
    ) -> GroupWindowStats {
        let Some(range) = self.window_range(target, i, window) else {
            return GroupWindowStats::default();
        };

        let mut corrs = Vec::with_capacity(members.len());
        let mut covs = Vec::with_capacity(members.len());
        for member in members {
            match self.member_correlation(target, member, i, window) {
                MemberCorrelation::Defined { corr, cov } => {
                    corrs.push(corr);
                    if let Some(cov) = cov {
                        covs.push(cov);
                    }
                }
                MemberCorrelation::Degenerate => *degenerate += 1,
                MemberCorrelation::TooFewPoints => {}
            }
        }

        let corr = mean(&corrs).map(|c| c.clamp(-1.0, 1.0));
        let cov = mean(&covs);
        let stability = sample_std_dev(&corrs)
            .filter(|sd| *sd > 0.0)
            .and_then(|sd| checked_div(1.0, sd));

        GroupWindowStats {
            corr,
            cov,
            stability,
            relative_strength: self.relative_strength(target, members, range),
        }
    }

    /// (mean target momentum − mean group momentum) / stdev of group momentum
    fn relative_strength(
        &self,
        target: &DerivedSeries,
        members: &[Arc<DerivedSeries>],
        range: std::ops::Range<usize>,
    ) -> Option<f64> {
        let mut target_values = Vec::with_capacity(range.len());
        let mut group_values = Vec::with_capacity(range.len());
        for j in range {
            if let Some(t) = target.momentum[j].filter(|v| v.is_finite()) {
                target_values.push(t);
            }
            if let Some(g) = self.group_momentum_at(members, target.timestamps[j]) {
                group_values.push(g);
            }
        }

        if target_values.len() < self.min_points || group_values.len() < self.min_points {
            return None;
        }

        let spread = mean(&target_values)? - mean(&group_values)?;
        let sd = sample_std_dev(&group_values)?;
        checked_div(spread, sd)
    }

    /// Target momentum minus group-average momentum at index `i - 1`
    pub fn divergence(&self, target: &DerivedSeries, members: &[Arc<DerivedSeries>], i: usize) -> Option<f64> {
        if i == 0 || i > target.len() {
            return None;
        }
        let j = i - 1;
        let t = target.momentum[j].filter(|v| v.is_finite())?;
        let g = self.group_momentum_at(members, target.timestamps[j])?;
        Some(t - g)
    }

    pub fn compute(
        &self,
        target: &DerivedSeries,
        members: &[Arc<DerivedSeries>],
        window_minutes: u32,
    ) -> Vec<GroupWindowStats> {
        let window = window_minutes as usize;
        let mut degenerate = 0usize;

        let out = (0..target.len())
            .map(|i| self.window_stats(target, members, i, window, &mut degenerate))
            .collect();

        if degenerate > 0 {
            log::warn!(
                "⚠️  {} zero-variance member correlations nulled ({} w{})",
                degenerate,
                target.instrument,
                window_minutes
            );
        }

        out
    }

    pub fn compute_divergence(&self, target: &DerivedSeries, members: &[Arc<DerivedSeries>]) -> Vec<Option<f64>> {
        (0..target.len())
            .map(|i| self.divergence(target, members, i))
            .collect()
    }
}

impl Default for CrossSeriesCorrelator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CORRELATION_POINTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::Instrument;

    fn series(id: &str, values: &[f64]) -> Arc<DerivedSeries> {
        Arc::new(DerivedSeries::from_values(
            Instrument::parse(id).unwrap(),
            1_700_000_040,
            values,
            1,
        ))
    }

    fn wave(n: usize, amplitude: f64, phase: f64) -> Vec<f64> {
        (0..n)
            .map(|i| 1.0 + amplitude * ((i as f64 * 0.37) + phase).sin())
            .collect()
    }

    #[test]
    fn test_proportional_momentum_correlates_to_one() {
        // Scaled prices share the same percentage momentum
        let target = series("EURUSD", &wave(120, 0.01, 0.0));
        let scaled: Vec<f64> = wave(120, 0.01, 0.0).iter().map(|v| v * 1.7).collect();
        let member = series("GBPUSD", &scaled);

        let correlator = CrossSeriesCorrelator::default();
        let stats = correlator.group_window_stats(&target, &[member], 100, 60);

        assert!((stats.corr.unwrap() - 1.0).abs() < 1e-9);
        assert!(stats.cov.unwrap() > 0.0);
        // A single member has no spread of correlations
        assert_eq!(stats.stability, None);
    }

    #[test]
    fn test_correlations_bounded() {
        let target = series("EURUSD", &wave(200, 0.02, 0.0));
        let members = vec![
            series("GBPUSD", &wave(200, 0.015, 0.4)),
            series("NZDUSD", &wave(200, 0.03, 2.0)),
            series("AUDUSD", &wave(200, 0.01, 3.1)),
        ];
        let correlator = CrossSeriesCorrelator::default();

        for stats in correlator.compute(&target, &members, 60) {
            if let Some(c) = stats.corr {
                assert!((-1.0..=1.0).contains(&c));
            }
        }
        let at_end = correlator.group_window_stats(&target, &members, 199, 60);
        assert!(at_end.corr.is_some());
        assert!(at_end.stability.unwrap() > 0.0);
    }

    #[test]
    fn test_too_few_points_is_null_not_zero() {
        let target = series("EURUSD", &wave(40, 0.01, 0.0));
        let member = series("GBPUSD", &wave(40, 0.01, 1.0));
        let correlator = CrossSeriesCorrelator::new(10);

        // Window of 8 can hold at most 8 aligned points
        let stats = correlator.group_window_stats(&target, &[member.clone()], 30, 8);
        assert_eq!(stats.corr, None);
        assert_eq!(stats.cov, None);

        // Window not yet full
        assert_eq!(
            correlator.member_correlation(&target, &member, 10, 15),
            MemberCorrelation::TooFewPoints
        );
    }

    #[test]
    fn test_flat_member_is_filtered() {
        let target = series("EURUSD", &wave(80, 0.01, 0.0));
        let flat = series("GBPUSD", &[1.25; 80]);
        let moving = series("AUDUSD", &wave(80, 0.01, 0.0));
        let correlator = CrossSeriesCorrelator::default();

        let stats = correlator.group_window_stats(&target, &[flat.clone(), moving], 70, 60);
        assert!((stats.corr.unwrap() - 1.0).abs() < 1e-9);

        let only_flat = correlator.group_window_stats(&target, &[flat.clone()], 70, 60);
        assert_eq!(only_flat.corr, None);
        assert_eq!(only_flat.stability, None);

        assert_eq!(
            correlator.member_correlation(&target, &flat, 70, 60),
            MemberCorrelation::Degenerate
        );
    }

    #[test]
    fn test_divergence_uses_previous_point() {
        let target = series("EURUSD", &[1.0, 1.01, 1.03, 1.02]);
        let member = series("GBPUSD", &[2.0, 2.0, 2.02, 2.02]);
        let correlator = CrossSeriesCorrelator::default();

        let div = correlator.compute_divergence(&target, &[member.clone()]);
        assert_eq!(div[0], None);
        assert_eq!(div[1], None); // momentum at index 0 is undefined

        // i = 3 looks at index 2: target +1.9802%, member +1%
        let expected = (1.03 - 1.01) / 1.01 * 100.0 - 1.0;
        assert!((div[3].unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_relative_strength_sign() {
        let n = 80;
        let rising: Vec<f64> = (0..n).map(|i| 1.0005f64.powi(i)).collect();
        let noisy: Vec<f64> = wave(n as usize, 0.002, 0.0);
        let target = series("EURUSD", &rising);
        let member = series("GBPUSD", &noisy);
        let correlator = CrossSeriesCorrelator::default();

        let stats = correlator.group_window_stats(&target, &[member], 70, 60);
        assert!(stats.relative_strength.unwrap() > 0.0);
    }
}
