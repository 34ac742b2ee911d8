//! Feature Core - Temporal Feature Computation
//!
//! Pure, synchronous computation over one instrument's derived series. Nothing
//! in here touches storage or the runtime; the pipeline drives it from
//! `spawn_blocking` tasks.
//!
//! # Architecture
//!
//! ```text
//! Observations → DerivedSeries (values, momentum, contiguity)
//!     ↓
//! WindowAggregator        (return/max/min/mean/stdev/endpoint, raw)
//!     ↓
//! RegressionDecomposer    (quadratic/linear/constant terms, raw + momentum)
//!     ↓
//! CrossSeriesCorrelator   (corr/cov/stability/relative strength vs. peers)
//!     ↓
//! CausalityPolicy         (lagged duplicates for windows >= horizon)
//!     ↓
//! FeatureSchema → rows aligned to table columns
//! ```

pub mod aggregator;
pub mod causality;
pub mod correlator;
pub mod regression;
pub mod schema;
pub mod series;
pub mod stats;
pub mod window;

pub use aggregator::{AggregateFeature, WindowAggregator};
pub use causality::CausalityPolicy;
pub use correlator::{CrossSeriesCorrelator, GroupWindowStats, MemberCorrelation, RelatedGroup};
pub use regression::{fit_quadratic, FitError, QuadraticFit, RegressionDecomposer, RegressionTerm};
pub use schema::{ColumnSpec, FeatureRow, FeatureSchema, FeatureTable, TableRows, TableSchema, TrainingManifest};
pub use series::{DerivedSeries, Observation, SAMPLE_INTERVAL_SECS};
pub use window::{Domain, WindowSets, WindowSpec};
