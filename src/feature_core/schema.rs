//! Feature table schema
//!
//! `FeatureSchema::generate` is the only place column names are produced.
//! The writer creates and migrates tables from it, and unit computation
//! assembles row values in the same column order.

use super::causality::{parse_column_lag, parse_column_window, CausalityPolicy};
use super::correlator::RelatedGroup;
use super::window::{window_prefix, Domain, WindowSets};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const AGGREGATE_STATS: [&str; 6] = ["return", "max", "min", "mean", "stdev", "endpoint"];

pub const REGRESSION_STATS: [&str; 7] = [
    "quadratic_term",
    "linear_term",
    "constant_term",
    "residual",
    "r2",
    "rmse",
    "prediction",
];

pub const CORRELATION_STATS: [&str; 4] = ["corr", "cov", "stability", "relative_strength"];

pub const DIVERGENCE_STAT: &str = "divergence";

/// Key columns present on every feature table
pub const KEY_COLUMNS: [&str; 3] = ["instrument_id", "timestamp", "month"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureTable {
    Aggregate,
    RegressionRaw,
    RegressionMomentum,
    Correlation,
}

impl FeatureTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            FeatureTable::Aggregate => "features_aggregate",
            FeatureTable::RegressionRaw => "features_regression_raw",
            FeatureTable::RegressionMomentum => "features_regression_momentum",
            FeatureTable::Correlation => "features_correlation",
        }
    }

    pub fn regression(domain: Domain) -> Self {
        match domain {
            Domain::Raw => FeatureTable::RegressionRaw,
            Domain::Momentum => FeatureTable::RegressionMomentum,
        }
    }

    /// Position in `all()` and in `FeatureSchema::tables()`
    pub fn index(&self) -> usize {
        match self {
            FeatureTable::Aggregate => 0,
            FeatureTable::RegressionRaw => 1,
            FeatureTable::RegressionMomentum => 2,
            FeatureTable::Correlation => 3,
        }
    }

    pub fn all() -> [FeatureTable; 4] {
        [
            FeatureTable::Aggregate,
            FeatureTable::RegressionRaw,
            FeatureTable::RegressionMomentum,
            FeatureTable::Correlation,
        ]
    }
}

impl fmt::Display for FeatureTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    /// Name of the unlagged column this one is derived from (itself if unlagged)
    pub base_name: String,
    pub window_minutes: Option<u32>,
    pub lag_minutes: Option<u32>,
}

impl ColumnSpec {
    fn new(name: String, window_minutes: Option<u32>) -> Self {
        Self {
            base_name: name.clone(),
            name,
            window_minutes,
            lag_minutes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: FeatureTable,
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct FeatureSchema {
    windows: WindowSets,
    policy: CausalityPolicy,
    tables: Vec<TableSchema>,
}

impl FeatureSchema {
    pub fn generate(windows: &WindowSets, policy: CausalityPolicy) -> Self {
        let mut tables = Vec::with_capacity(4);

        let aggregate = windows
            .aggregation
            .iter()
            .flat_map(|w| {
                AGGREGATE_STATS
                    .iter()
                    .map(move |stat| ColumnSpec::new(format!("{}_{}", window_prefix(*w), stat), Some(*w)))
            })
            .collect();
        tables.push(TableSchema {
            table: FeatureTable::Aggregate,
            columns: policy.enforce(aggregate),
        });

        // Both domains expand the same window list with the same stat names
        for domain in Domain::all() {
            let columns = windows
                .regression_specs(domain)
                .into_iter()
                .flat_map(|spec| {
                    REGRESSION_STATS.iter().map(move |stat| {
                        ColumnSpec::new(format!("{}_{}", spec.prefix(), stat), Some(spec.length_minutes))
                    })
                })
                .collect();
            tables.push(TableSchema {
                table: FeatureTable::regression(domain),
                columns: policy.enforce(columns),
            });
        }

        let mut correlation = Vec::new();
        for group in RelatedGroup::all() {
            for w in &windows.correlation {
                for stat in CORRELATION_STATS {
                    correlation.push(ColumnSpec::new(
                        correlation_column(group, Some(*w), stat),
                        Some(*w),
                    ));
                }
            }
            correlation.push(ColumnSpec::new(correlation_column(group, None, DIVERGENCE_STAT), None));
        }
        tables.push(TableSchema {
            table: FeatureTable::Correlation,
            columns: policy.enforce(correlation),
        });

        Self {
            windows: windows.clone(),
            policy,
            tables,
        }
    }

    pub fn windows(&self) -> &WindowSets {
        &self.windows
    }

    pub fn policy(&self) -> CausalityPolicy {
        self.policy
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn table(&self, table: FeatureTable) -> &TableSchema {
        &self.tables[table.index()]
    }

    /// Columns each table may contribute to a training set at the policy horizon
    pub fn training_manifest(&self) -> TrainingManifest {
        let tables = self
            .tables
            .iter()
            .map(|t| {
                let names = self.policy.training_columns(t.columns.iter().map(|c| c.name.as_str()));
                (t.table.table_name().to_string(), names)
            })
            .collect();

        TrainingManifest {
            horizon_minutes: self.policy.horizon_minutes(),
            min_lag_minutes: self.policy.min_lag_minutes(),
            tables,
        }
    }
}

pub fn correlation_column(group: RelatedGroup, window_minutes: Option<u32>, stat: &str) -> String {
    match window_minutes {
        Some(w) => format!("{}_{}_{}", group.as_str(), window_prefix(w), stat),
        None => format!("{}_{}", group.as_str(), stat),
    }
}

/// Window lengths carried by unlagged columns of a stored table
pub fn stored_windows<'a, I>(column_names: I) -> BTreeSet<u32>
where
    I: IntoIterator<Item = &'a str>,
{
    column_names
        .into_iter()
        .filter(|name| parse_column_lag(name).is_none())
        .filter_map(parse_column_window)
        .collect()
}

/// One output row: values aligned with `TableSchema::columns`
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub timestamp: i64,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRows {
    pub table: FeatureTable,
    pub rows: Vec<FeatureRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingManifest {
    pub horizon_minutes: u32,
    pub min_lag_minutes: u32,
    pub tables: BTreeMap<String, Vec<String>>,
}
