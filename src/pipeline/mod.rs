//! # Batch Pipeline
//!
//! Drives the feature core over `(instrument, month)` units:
//!
//! ```text
//! SeriesReader ──read_with_retry──▶ DerivedSeries map (phase A, per month)
//!     ↓
//! compute_unit (spawn_blocking) ──▶ FeatureWriter::upsert_features (phase B)
//!     ↓
//! UnitOutcome ──mpsc──▶ aggregator ──▶ BatchReport
//! ```
//!
//! Schema preparation runs once, serialized, before any unit starts. Each
//! unit writes only its own partition, in one transaction.

pub mod partition;
pub mod retry;
pub mod runner;
pub mod unit;

pub use partition::MonthPartition;
pub use retry::{read_with_retry, ExponentialBackoff};
pub use runner::{BatchError, BatchReport, BatchRunner, UnitFailure, UnitOutcome, UnitStatus};
pub use unit::{compute_unit, PeerGroups};
