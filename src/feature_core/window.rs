//! Typed window specifications shared by every feature family

use std::fmt;

/// Signal a window is computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Domain {
    Raw,
    Momentum,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Raw => "raw",
            Domain::Momentum => "momentum",
        }
    }

    pub fn all() -> [Domain; 2] {
        [Domain::Raw, Domain::Momentum]
    }
}

pub const AGGREGATION_WINDOWS: [u32; 5] = [15, 30, 45, 60, 75];
pub const REGRESSION_WINDOWS: [u32; 6] = [60, 90, 150, 240, 390, 630];
pub const CORRELATION_WINDOWS: [u32; 2] = [15, 60];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowSpec {
    pub length_minutes: u32,
    pub domain: Domain,
}

impl WindowSpec {
    pub fn new(length_minutes: u32, domain: Domain) -> Self {
        Self {
            length_minutes,
            domain,
        }
    }

    /// Number of one-minute observations the window spans
    pub fn observations(&self) -> usize {
        self.length_minutes as usize
    }

    /// Column-name prefix, e.g. `w60`
    pub fn prefix(&self) -> String {
        window_prefix(self.length_minutes)
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m/{}", self.length_minutes, self.domain.as_str())
    }
}

/// The enumerated window sets for each pipeline stage
///
/// Regression holds a single list: both domains are expanded from it, so the
/// raw and momentum tables cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSets {
    pub aggregation: Vec<u32>,
    pub regression: Vec<u32>,
    pub correlation: Vec<u32>,
}

impl Default for WindowSets {
    fn default() -> Self {
        Self {
            aggregation: AGGREGATION_WINDOWS.to_vec(),
            regression: REGRESSION_WINDOWS.to_vec(),
            correlation: CORRELATION_WINDOWS.to_vec(),
        }
    }
}

impl WindowSets {
    pub fn regression_specs(&self, domain: Domain) -> Vec<WindowSpec> {
        self.regression
            .iter()
            .map(|len| WindowSpec::new(*len, domain))
            .collect()
    }

    pub fn aggregation_specs(&self) -> Vec<WindowSpec> {
        self.aggregation
            .iter()
            .map(|len| WindowSpec::new(*len, Domain::Raw))
            .collect()
    }

    pub fn correlation_specs(&self) -> Vec<WindowSpec> {
        self.correlation
            .iter()
            .map(|len| WindowSpec::new(*len, Domain::Momentum))
            .collect()
    }

    /// Longest window of any stage, in minutes
    pub fn longest(&self) -> u32 {
        self.aggregation
            .iter()
            .chain(self.regression.iter())
            .chain(self.correlation.iter())
            .copied()
            .max()
            .unwrap_or(0)
    }
}

pub fn window_prefix(length_minutes: u32) -> String {
    format!("w{}", length_minutes)
}

/// Extract the window length from a column name token such as `w60`
pub fn parse_window_token(token: &str) -> Option<u32> {
    let digits = token.strip_prefix('w')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sets() {
        let sets = WindowSets::default();
        assert_eq!(sets.aggregation, vec![15, 30, 45, 60, 75]);
        assert_eq!(sets.regression, vec![60, 90, 150, 240, 390, 630]);
        assert_eq!(sets.correlation, vec![15, 60]);
        assert_eq!(sets.longest(), 630);
    }

    #[test]
    fn test_regression_specs_share_lengths_across_domains() {
        let sets = WindowSets::default();
        let raw: Vec<u32> = sets
            .regression_specs(Domain::Raw)
            .iter()
            .map(|s| s.length_minutes)
            .collect();
        let momentum: Vec<u32> = sets
            .regression_specs(Domain::Momentum)
            .iter()
            .map(|s| s.length_minutes)
            .collect();
        assert_eq!(raw, momentum);
    }

    #[test]
    fn test_window_token_parsing() {
        assert_eq!(parse_window_token("w60"), Some(60));
        assert_eq!(parse_window_token("w630"), Some(630));
        assert_eq!(parse_window_token("w"), None);
        assert_eq!(parse_window_token("wx"), None);
        assert_eq!(parse_window_token("lag61"), None);
        assert_eq!(WindowSpec::new(90, Domain::Momentum).prefix(), "w90");
    }
}
