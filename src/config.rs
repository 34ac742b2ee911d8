//! Feature engine configuration from environment variables

use crate::feature_core::{CausalityPolicy, WindowSets};
use std::env;

/// Extra minutes read before a partition on top of the computed lookback
pub const LOOKBACK_SLACK_MINUTES: u32 = 10;

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Runtime configuration for the batch feature engine
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureConfig {
    /// SQLite database holding observations and feature tables
    pub db_path: String,

    /// Bounded worker-pool size
    pub workers: usize,

    /// Prediction horizon; the minimum causality lag is one minute more
    pub horizon_minutes: u32,

    /// Look-back of the momentum series, in observations
    pub momentum_period: usize,

    /// Minimum aligned pairs for a correlation to be defined
    pub min_correlation_points: usize,

    pub read_max_retries: u32,
    pub read_retry_initial_ms: u64,
    pub read_retry_max_ms: u64,

    /// Directory of source-table migrations
    pub schema_dir: String,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            db_path: "data/fxflow.db".to_string(),
            workers: 4,
            horizon_minutes: 60,
            momentum_period: 5,
            min_correlation_points: 10,
            read_max_retries: 3,
            read_retry_initial_ms: 250,
            read_retry_max_ms: 4_000,
            schema_dir: "sql".to_string(),
        }
    }
}

impl FeatureConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `FXFLOW_DB_PATH` (default: data/fxflow.db)
    /// - `FEATURE_WORKERS` (default: 4)
    /// - `PREDICTION_HORIZON_MINUTES` (default: 60)
    /// - `MOMENTUM_PERIOD_MINUTES` (default: 5)
    /// - `MIN_CORRELATION_POINTS` (default: 10)
    /// - `READ_MAX_RETRIES` (default: 3)
    /// - `READ_RETRY_INITIAL_MS` (default: 250)
    /// - `READ_RETRY_MAX_MS` (default: 4000)
    /// - `SCHEMA_DIR` (default: sql)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` with an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            db_path: lookup("FXFLOW_DB_PATH").unwrap_or(defaults.db_path),
            workers: parse_var(&lookup, "FEATURE_WORKERS", defaults.workers)?,
            horizon_minutes: parse_var(&lookup, "PREDICTION_HORIZON_MINUTES", defaults.horizon_minutes)?,
            momentum_period: parse_var(&lookup, "MOMENTUM_PERIOD_MINUTES", defaults.momentum_period)?,
            min_correlation_points: parse_var(
                &lookup,
                "MIN_CORRELATION_POINTS",
                defaults.min_correlation_points,
            )?,
            read_max_retries: parse_var(&lookup, "READ_MAX_RETRIES", defaults.read_max_retries)?,
            read_retry_initial_ms: parse_var(&lookup, "READ_RETRY_INITIAL_MS", defaults.read_retry_initial_ms)?,
            read_retry_max_ms: parse_var(&lookup, "READ_RETRY_MAX_MS", defaults.read_retry_max_ms)?,
            schema_dir: lookup("SCHEMA_DIR").unwrap_or(defaults.schema_dir),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.trim().is_empty() {
            return Err(ConfigError::MissingVariable("FXFLOW_DB_PATH".to_string()));
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue("FEATURE_WORKERS must be at least 1".to_string()));
        }
        if self.horizon_minutes == 0 {
            return Err(ConfigError::InvalidValue(
                "PREDICTION_HORIZON_MINUTES must be at least 1".to_string(),
            ));
        }
        if self.momentum_period == 0 {
            return Err(ConfigError::InvalidValue(
                "MOMENTUM_PERIOD_MINUTES must be at least 1".to_string(),
            ));
        }
        if self.min_correlation_points < 2 {
            return Err(ConfigError::InvalidValue(
                "MIN_CORRELATION_POINTS must be at least 2".to_string(),
            ));
        }
        if self.read_retry_initial_ms > self.read_retry_max_ms {
            return Err(ConfigError::InvalidValue(format!(
                "READ_RETRY_INITIAL_MS ({}) exceeds READ_RETRY_MAX_MS ({})",
                self.read_retry_initial_ms, self.read_retry_max_ms
            )));
        }
        Ok(())
    }

    pub fn causality_policy(&self) -> CausalityPolicy {
        CausalityPolicy::new(self.horizon_minutes)
    }

    /// Minutes of history to read before a partition so every window,
    /// momentum base and lagged lookup at the partition start is populated
    pub fn required_lookback_minutes(&self, windows: &WindowSets) -> u32 {
        windows.longest()
            + self.momentum_period as u32
            + self.causality_policy().min_lag_minutes()
            + LOOKBACK_SLACK_MINUTES
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{}={:?} is not a valid number", key, raw))),
        None => Ok(default),
    }
}
