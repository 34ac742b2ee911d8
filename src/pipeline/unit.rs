//! Feature computation for one `(instrument, month)` unit
//!
//! Every feature family is computed over the whole loaded series (lookback
//! included) so lagged columns can reach back before the month start. Only
//! timestamps inside the month become rows.

use super::partition::MonthPartition;
use crate::feature_core::correlator::CrossSeriesCorrelator;
use crate::feature_core::schema::{
    correlation_column, AGGREGATE_STATS, CORRELATION_STATS, DIVERGENCE_STAT, REGRESSION_STATS,
};
use crate::feature_core::window::window_prefix;
use crate::feature_core::{
    DerivedSeries, Domain, FeatureRow, FeatureSchema, FeatureTable, RegressionDecomposer, RelatedGroup,
    TableRows, WindowAggregator,
};
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::Arc;

/// Peer series per related group, as loaded for the month
pub type PeerGroups = BTreeMap<RelatedGroup, Vec<Arc<DerivedSeries>>>;

/// Unlagged columns of one table, keyed by column name
type BaseColumns = HashMap<String, Vec<Option<f64>>>;

/// Indices of `series` whose timestamps fall inside `month`
pub fn month_rows(series: &DerivedSeries, month: MonthPartition) -> Range<usize> {
    let start = series.timestamps.partition_point(|ts| *ts < month.start_ts());
    let end = series.timestamps.partition_point(|ts| *ts < month.end_ts());
    start..end
}

/// Spread per-index fixed-width results into one column per stat
fn insert_stat_columns<const N: usize>(
    columns: &mut BaseColumns,
    prefix: &str,
    stats: &[&str; N],
    per_index: &[Option<[Option<f64>; N]>],
) {
    for (k, stat) in stats.iter().enumerate() {
        let column = per_index.iter().map(|v| v.and_then(|values| values[k])).collect();
        columns.insert(format!("{}_{}", prefix, stat), column);
    }
}

fn aggregate_columns(schema: &FeatureSchema, target: &DerivedSeries) -> BaseColumns {
    let mut columns = BaseColumns::new();
    for w in &schema.windows().aggregation {
        let per_index: Vec<_> = WindowAggregator::new(*w)
            .compute(target)
            .into_iter()
            .map(|a| a.map(|f| f.columns()))
            .collect();
        insert_stat_columns(&mut columns, &window_prefix(*w), &AGGREGATE_STATS, &per_index);
    }
    columns
}

fn regression_columns(schema: &FeatureSchema, target: &DerivedSeries, domain: Domain) -> BaseColumns {
    let mut columns = BaseColumns::new();
    for spec in schema.windows().regression_specs(domain) {
        let per_index: Vec<_> = RegressionDecomposer::new(spec)
            .compute(target)
            .into_iter()
            .map(|t| t.map(|term| term.columns()))
            .collect();
        insert_stat_columns(&mut columns, &spec.prefix(), &REGRESSION_STATS, &per_index);
    }
    columns
}

fn correlation_columns(
    schema: &FeatureSchema,
    target: &DerivedSeries,
    peers: &PeerGroups,
    min_correlation_points: usize,
) -> BaseColumns {
    let correlator = CrossSeriesCorrelator::new(min_correlation_points);
    let mut columns = BaseColumns::new();

    for group in RelatedGroup::all() {
        let members: &[Arc<DerivedSeries>] = peers.get(&group).map(Vec::as_slice).unwrap_or(&[]);

        for w in &schema.windows().correlation {
            let per_index: Vec<_> = correlator
                .compute(target, members, *w)
                .into_iter()
                .map(|stats| Some(stats.columns()))
                .collect();
            let prefix = format!("{}_{}", group.as_str(), window_prefix(*w));
            insert_stat_columns(&mut columns, &prefix, &CORRELATION_STATS, &per_index);
        }

        columns.insert(
            correlation_column(group, None, DIVERGENCE_STAT),
            correlator.compute_divergence(target, members),
        );
    }
    columns
}

/// Lay base columns out in schema order, shifting lagged columns by timestamp
fn assemble_rows(
    schema: &FeatureSchema,
    table: FeatureTable,
    target: &DerivedSeries,
    base: &BaseColumns,
    rows: Range<usize>,
) -> TableRows {
    let empty = vec![None; target.len()];
    let columns: Vec<Vec<Option<f64>>> = schema
        .table(table)
        .columns
        .iter()
        .map(|spec| {
            let values = base.get(&spec.base_name).unwrap_or(&empty);
            match spec.lag_minutes {
                Some(lag) => target.lagged(values, lag),
                None => values.clone(),
            }
        })
        .collect();

    let rows = rows
        .map(|i| FeatureRow {
            timestamp: target.timestamps[i],
            values: columns.iter().map(|c| c[i]).collect(),
        })
        .collect();

    TableRows { table, rows }
}

/// Compute every feature table for one unit
///
/// Rows are ordered by timestamp and restricted to `month`. Tables come back
/// in schema order.
pub fn compute_unit(
    schema: &FeatureSchema,
    target: &DerivedSeries,
    peers: &PeerGroups,
    month: MonthPartition,
    min_correlation_points: usize,
) -> Vec<TableRows> {
    let rows = month_rows(target, month);
    if rows.is_empty() {
        return FeatureTable::all()
            .into_iter()
            .map(|table| TableRows { table, rows: Vec::new() })
            .collect();
    }

    FeatureTable::all()
        .into_iter()
        .map(|table| {
            let base = match table {
                FeatureTable::Aggregate => aggregate_columns(schema, target),
                FeatureTable::RegressionRaw => regression_columns(schema, target, Domain::Raw),
                FeatureTable::RegressionMomentum => regression_columns(schema, target, Domain::Momentum),
                FeatureTable::Correlation => {
                    correlation_columns(schema, target, peers, min_correlation_points)
                }
            };
            assemble_rows(schema, table, target, &base, rows.clone())
        })
        .collect()
}
