//! Causality lag policy
//!
//! A feature whose window reaches the prediction horizon overlaps the target
//! it is meant to predict. Such columns are re-emitted shifted back by
//! `horizon + 1` minutes, and the unshifted form is kept out of any training
//! selection for that horizon. The policy only looks at column metadata, so
//! aggregate, regression and correlation columns are treated the same way.

use super::schema::ColumnSpec;
use super::window::parse_window_token;

pub const DEFAULT_HORIZON_MINUTES: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CausalityPolicy {
    horizon_minutes: u32,
}

impl CausalityPolicy {
    pub fn new(horizon_minutes: u32) -> Self {
        Self { horizon_minutes }
    }

    pub fn horizon_minutes(&self) -> u32 {
        self.horizon_minutes
    }

    /// Minimum offset between a feature's window and the timestamp it is
    /// attached to
    pub fn min_lag_minutes(&self) -> u32 {
        self.horizon_minutes + 1
    }

    /// Windowless columns never need a lag
    pub fn requires_lag(&self, window_minutes: Option<u32>) -> bool {
        window_minutes.map_or(false, |w| w >= self.horizon_minutes)
    }

    pub fn lagged_name(&self, name: &str) -> String {
        format!("{}_lag{}", name, self.min_lag_minutes())
    }

    /// Append a lagged duplicate for every column that needs one
    ///
    /// Base columns keep their order; lagged columns follow in the same order.
    pub fn enforce(&self, columns: Vec<ColumnSpec>) -> Vec<ColumnSpec> {
        let lagged: Vec<ColumnSpec> = columns
            .iter()
            .filter(|c| c.lag_minutes.is_none() && self.requires_lag(c.window_minutes))
            .map(|c| ColumnSpec {
                name: self.lagged_name(&c.name),
                base_name: c.base_name.clone(),
                window_minutes: c.window_minutes,
                lag_minutes: Some(self.min_lag_minutes()),
            })
            .collect();

        let mut all = columns;
        all.extend(lagged);
        all
    }

    /// Whether a column may feed a model predicting `horizon` minutes ahead
    ///
    /// Works from the name alone: `w{N}` carries the window, `lag{N}` the shift.
    pub fn is_training_eligible(&self, column_name: &str) -> bool {
        !self.requires_lag(parse_column_window(column_name))
            || parse_column_lag(column_name).map_or(false, |lag| lag >= self.min_lag_minutes())
    }

    pub fn training_columns<'a, I>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .filter(|name| self.is_training_eligible(name))
            .map(str::to_string)
            .collect()
    }
}

impl Default for CausalityPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_HORIZON_MINUTES)
    }
}

pub fn parse_column_window(name: &str) -> Option<u32> {
    name.split('_').find_map(parse_window_token)
}

pub fn parse_column_lag(name: &str) -> Option<u32> {
    name.split('_').find_map(|token| {
        let digits = token.strip_prefix("lag")?;
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, window: Option<u32>) -> ColumnSpec {
        ColumnSpec {
            name: name.to_string(),
            base_name: name.to_string(),
            window_minutes: window,
            lag_minutes: None,
        }
    }

    #[test]
    fn test_min_lag_follows_horizon() {
        assert_eq!(CausalityPolicy::default().min_lag_minutes(), 61);
        assert_eq!(CausalityPolicy::new(30).min_lag_minutes(), 31);
    }

    #[test]
    fn test_enforce_adds_lag_for_long_windows_only() {
        let policy = CausalityPolicy::default();
        let columns = vec![
            column("w45_mean", Some(45)),
            column("w60_mean", Some(60)),
            column("w630_r2", Some(630)),
            column("base_divergence", None),
        ];

        let enforced = policy.enforce(columns);
        let names: Vec<&str> = enforced.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "w45_mean",
                "w60_mean",
                "w630_r2",
                "base_divergence",
                "w60_mean_lag61",
                "w630_r2_lag61",
            ]
        );
        assert_eq!(enforced[4].base_name, "w60_mean");
        assert_eq!(enforced[4].lag_minutes, Some(61));
    }

    #[test]
    fn test_name_parsing() {
        assert_eq!(parse_column_window("w60_return"), Some(60));
        assert_eq!(parse_column_window("quote_w15_relative_strength"), Some(15));
        assert_eq!(parse_column_window("base_divergence"), None);
        assert_eq!(parse_column_lag("w90_prediction_lag61"), Some(61));
        assert_eq!(parse_column_lag("w90_prediction"), None);
    }

    #[test]
    fn test_training_selection_excludes_unlagged_long_windows() {
        let policy = CausalityPolicy::default();
        let names = [
            "w15_return",
            "w60_return",
            "w60_return_lag61",
            "w75_stdev_lag30",
            "base_w60_corr",
            "base_w60_corr_lag61",
            "quote_divergence",
            "w15_return_lag5",
        ];

        let selected = policy.training_columns(names.iter().copied());
        assert_eq!(
            selected,
            vec![
                "w15_return",
                "w60_return_lag61",
                "base_w60_corr_lag61",
                "quote_divergence",
                "w15_return_lag5",
            ]
        );
    }

    #[test]
    fn test_short_window_eligible_with_any_lag() {
        let policy = CausalityPolicy::default();
        assert!(policy.is_training_eligible("w15_return_lag5"));
        assert!(policy.is_training_eligible("w45_mean_lag61"));
        assert!(!policy.is_training_eligible("w75_stdev_lag30"));
        assert!(!policy.is_training_eligible("w60_mean_lag60"));
        assert!(policy.is_training_eligible("w60_mean_lag61"));
    }
}
