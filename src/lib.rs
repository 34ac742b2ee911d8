//! fxflow: causal temporal features for 28 FX pairs
//!
//! - `feature_core` - window aggregation, regression terms, cross-series
//!   correlation, causality lag policy and the feature schema
//! - `store` - series reader and feature writer seams with SQLite backends
//! - `pipeline` - month partitions, retries and the batch runner
//! - `config` - environment-driven configuration

pub mod config;
pub mod feature_core;
pub mod instruments;
pub mod pipeline;
pub mod sqlite_pragma;
pub mod store;

pub use config::{ConfigError, FeatureConfig};
pub use instruments::{all_instruments, related_instruments, Component, Currency, Instrument};
