//! Batch orchestration over `(instrument, month)` units
//!
//! Per month:
//! 1. Phase A loads and derives every needed series through a bounded pool
//!    into an immutable map (peers must exist before any correlation runs).
//! 2. Phase B spawns one task per unit; each computes in `spawn_blocking`,
//!    upserts its own partition and sends a `UnitOutcome` to a single
//!    aggregator task that owns the `BatchReport`.

use super::partition::MonthPartition;
use super::retry::{read_with_retry, ExponentialBackoff};
use super::unit::{compute_unit, PeerGroups};
use crate::config::FeatureConfig;
use crate::feature_core::{DerivedSeries, FeatureSchema, RelatedGroup};
use crate::instruments::{related_instruments, Instrument};
use crate::store::{FeatureWriter, SchemaError, SeriesReader};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};

/// Result of loading one instrument's series for a month
#[derive(Debug, Clone)]
pub enum SeriesLoad {
    Loaded(Arc<DerivedSeries>),
    NoData,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnitStatus {
    Succeeded { rows: usize },
    SkippedNoData,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct UnitOutcome {
    pub instrument: Instrument,
    pub month: MonthPartition,
    pub status: UnitStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitFailure {
    pub instrument: String,
    pub month: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub succeeded: usize,
    pub skipped_no_data: usize,
    pub failed: usize,
    pub rows_written: usize,
    pub failures: Vec<UnitFailure>,
}

impl BatchReport {
    pub fn record(&mut self, outcome: UnitOutcome) {
        match outcome.status {
            UnitStatus::Succeeded { rows } => {
                self.succeeded += 1;
                self.rows_written += rows;
            }
            UnitStatus::SkippedNoData => self.skipped_no_data += 1,
            UnitStatus::Failed(error) => {
                self.failed += 1;
                self.failures.push(UnitFailure {
                    instrument: outcome.instrument.id(),
                    month: outcome.month.key(),
                    error,
                });
            }
        }
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.succeeded += other.succeeded;
        self.skipped_no_data += other.skipped_no_data;
        self.failed += other.failed;
        self.rows_written += other.rows_written;
        self.failures.extend(other.failures);
    }

    pub fn total_units(&self) -> usize {
        self.succeeded + self.skipped_no_data + self.failed
    }
}

#[derive(Debug)]
pub enum BatchError {
    Schema(SchemaError),
    Task(String),
}

impl From<SchemaError> for BatchError {
    fn from(err: SchemaError) -> Self {
        BatchError::Schema(err)
    }
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchError::Schema(e) => write!(f, "Schema error: {}", e),
            BatchError::Task(msg) => write!(f, "Batch task failed: {}", msg),
        }
    }
}

impl std::error::Error for BatchError {}

/// Everything a unit task needs, cheap to clone into `'static` tasks
#[derive(Clone)]
struct UnitContext {
    writer: Arc<dyn FeatureWriter>,
    schema: Arc<FeatureSchema>,
    loads: Arc<HashMap<Instrument, SeriesLoad>>,
    min_correlation_points: usize,
}

pub struct BatchRunner {
    reader: Arc<dyn SeriesReader>,
    writer: Arc<dyn FeatureWriter>,
    schema: Arc<FeatureSchema>,
    config: FeatureConfig,
}

impl BatchRunner {
    pub fn new(
        reader: Arc<dyn SeriesReader>,
        writer: Arc<dyn FeatureWriter>,
        schema: Arc<FeatureSchema>,
        config: FeatureConfig,
    ) -> Self {
        Self {
            reader,
            writer,
            schema,
            config,
        }
    }

    pub fn lookback_minutes(&self) -> u32 {
        self.config.required_lookback_minutes(self.schema.windows())
    }

    /// Prepare the schema, then run every unit of `instruments × months`
    ///
    /// A schema mismatch aborts before any unit writes; unit failures are
    /// counted in the report and never abort the batch.
    pub async fn run(
        &self,
        instruments: &[Instrument],
        months: &[MonthPartition],
    ) -> Result<BatchReport, BatchError> {
        let started = Instant::now();
        log::info!(
            "🚀 Starting feature batch: {} instruments × {} months",
            instruments.len(),
            months.len()
        );
        log::info!("   ├─ Workers: {}", self.config.workers);
        log::info!("   ├─ Horizon: {}m (min lag {}m)", self.schema.policy().horizon_minutes(), self.schema.policy().min_lag_minutes());
        log::info!("   └─ Lookback: {}m", self.lookback_minutes());

        self.writer.prepare_schema().await?;

        let mut report = BatchReport::default();
        for month in months {
            let month_report = self.run_month(instruments, *month).await?;
            log::info!(
                "📊 {}: {} succeeded, {} skipped (no data), {} failed",
                month,
                month_report.succeeded,
                month_report.skipped_no_data,
                month_report.failed
            );
            report.merge(month_report);
        }

        log::info!(
            "✅ Batch complete in {:.1}s: {} succeeded, {} skipped, {} failed ({} rows)",
            started.elapsed().as_secs_f64(),
            report.succeeded,
            report.skipped_no_data,
            report.failed,
            report.rows_written
        );
        Ok(report)
    }

    pub async fn run_month(
        &self,
        instruments: &[Instrument],
        month: MonthPartition,
    ) -> Result<BatchReport, BatchError> {
        // Targets plus every peer they correlate against
        let mut needed: BTreeSet<Instrument> = instruments.iter().copied().collect();
        for target in instruments {
            for group in RelatedGroup::all() {
                needed.extend(related_instruments(*target, group.component()));
            }
        }

        let loads = Arc::new(self.load_month(needed, month).await);
        self.compute_month(instruments, month, loads).await
    }

    /// Phase A: read and derive series through the bounded pool
    async fn load_month(
        &self,
        instruments: BTreeSet<Instrument>,
        month: MonthPartition,
    ) -> HashMap<Instrument, SeriesLoad> {
        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let (tx, mut rx) = mpsc::channel::<(Instrument, SeriesLoad)>(instruments.len().max(1));
        let lookback = self.lookback_minutes();
        let mut handles = Vec::with_capacity(instruments.len());

        for instrument in &instruments {
            let instrument = *instrument;
            let semaphore = Arc::clone(&semaphore);
            let reader = Arc::clone(&self.reader);
            let tx = tx.clone();
            let backoff = ExponentialBackoff::new(
                self.config.read_retry_initial_ms,
                self.config.read_retry_max_ms,
                self.config.read_max_retries,
            );
            let momentum_period = self.config.momentum_period;

            handles.push(tokio::spawn(async move {
                let load = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        load_series(reader.as_ref(), instrument, month, lookback, backoff, momentum_period).await
                    }
                    Err(e) => SeriesLoad::Failed(format!("worker pool closed: {}", e)),
                };
                let _ = tx.send((instrument, load)).await;
            }));
        }
        drop(tx);

        let mut loads = HashMap::with_capacity(instruments.len());
        while let Some((instrument, load)) = rx.recv().await {
            loads.insert(instrument, load);
        }
        for handle in handles {
            if let Err(e) = handle.await {
                log::error!("❌ Loader task failed for {}: {}", month, e);
            }
        }
        // A loader that died before sending still has to be accounted for
        for instrument in instruments {
            loads
                .entry(instrument)
                .or_insert_with(|| SeriesLoad::Failed("loader task did not complete".to_string()));
        }

        let loaded = loads.values().filter(|l| matches!(l, SeriesLoad::Loaded(_))).count();
        let failed = loads.values().filter(|l| matches!(l, SeriesLoad::Failed(_))).count();
        log::info!(
            "📥 {}: {} series loaded, {} empty, {} failed",
            month,
            loaded,
            loads.len() - loaded - failed,
            failed
        );
        loads
    }

    /// Phase B: one task per unit, outcomes folded by a single aggregator
    async fn compute_month(
        &self,
        instruments: &[Instrument],
        month: MonthPartition,
        loads: Arc<HashMap<Instrument, SeriesLoad>>,
    ) -> Result<BatchReport, BatchError> {
        let (tx, mut rx) = mpsc::channel::<UnitOutcome>(instruments.len().max(1));

        let aggregator = tokio::spawn(async move {
            let mut report = BatchReport::default();
            while let Some(outcome) = rx.recv().await {
                report.record(outcome);
            }
            report
        });

        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let ctx = UnitContext {
            writer: Arc::clone(&self.writer),
            schema: Arc::clone(&self.schema),
            loads,
            min_correlation_points: self.config.min_correlation_points,
        };

        let mut handles = Vec::with_capacity(instruments.len());
        for instrument in instruments {
            let instrument = *instrument;
            let ctx = ctx.clone();
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();

            let handle = tokio::spawn(async move {
                let status = match semaphore.acquire_owned().await {
                    Ok(_permit) => run_unit(&ctx, instrument, month).await,
                    Err(e) => UnitStatus::Failed(format!("worker pool closed: {}", e)),
                };
                if let UnitStatus::Failed(ref error) = status {
                    log::error!("❌ Unit failed: instrument={} month={} error={}", instrument, month, error);
                }
                let _ = tx
                    .send(UnitOutcome {
                        instrument,
                        month,
                        status,
                    })
                    .await;
            });
            handles.push((instrument, handle));
        }

        for (instrument, handle) in handles {
            if let Err(e) = handle.await {
                log::error!("❌ Unit failed: instrument={} month={} error=task panicked: {}", instrument, month, e);
                let _ = tx
                    .send(UnitOutcome {
                        instrument,
                        month,
                        status: UnitStatus::Failed(format!("unit task panicked: {}", e)),
                    })
                    .await;
            }
        }
        drop(tx);

        aggregator.await.map_err(|e| BatchError::Task(e.to_string()))
    }
}

async fn load_series(
    reader: &dyn SeriesReader,
    instrument: Instrument,
    month: MonthPartition,
    lookback_minutes: u32,
    backoff: ExponentialBackoff,
    momentum_period: usize,
) -> SeriesLoad {
    let observations = match read_with_retry(
        reader,
        instrument,
        month.start_ts(),
        month.end_ts(),
        lookback_minutes,
        backoff,
    )
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            log::error!("❌ Read failed: instrument={} month={} error={}", instrument, month, e);
            return SeriesLoad::Failed(e.to_string());
        }
    };

    if observations.is_empty() {
        return SeriesLoad::NoData;
    }

    let derived = tokio::task::spawn_blocking(move || {
        DerivedSeries::from_observations(instrument, &observations, momentum_period)
    })
    .await;

    match derived {
        Ok(series) => SeriesLoad::Loaded(Arc::new(series)),
        Err(e) => SeriesLoad::Failed(format!("derive task failed: {}", e)),
    }
}

async fn run_unit(ctx: &UnitContext, instrument: Instrument, month: MonthPartition) -> UnitStatus {
    let target = match ctx.loads.get(&instrument) {
        Some(SeriesLoad::Loaded(series)) => Arc::clone(series),
        Some(SeriesLoad::Failed(e)) => return UnitStatus::Failed(format!("read failed: {}", e)),
        Some(SeriesLoad::NoData) | None => return UnitStatus::SkippedNoData,
    };

    if !target.has_rows_between(month.start_ts(), month.end_ts()) {
        return UnitStatus::SkippedNoData;
    }

    // Peers without data thin the group; a peer whose read failed fails the unit
    let mut peers = PeerGroups::new();
    for group in RelatedGroup::all() {
        let mut members: Vec<Arc<DerivedSeries>> = Vec::new();
        for peer in related_instruments(instrument, group.component()) {
            match ctx.loads.get(&peer) {
                Some(SeriesLoad::Loaded(series)) => members.push(Arc::clone(series)),
                Some(SeriesLoad::Failed(e)) => {
                    return UnitStatus::Failed(format!("peer {} read failed: {}", peer, e));
                }
                Some(SeriesLoad::NoData) | None => {}
            }
        }
        peers.insert(group, members);
    }

    let schema = Arc::clone(&ctx.schema);
    let min_points = ctx.min_correlation_points;
    let computed = tokio::task::spawn_blocking(move || {
        compute_unit(&schema, &target, &peers, month, min_points)
    })
    .await;

    let tables = match computed {
        Ok(tables) => tables,
        Err(e) => return UnitStatus::Failed(format!("compute task failed: {}", e)),
    };

    match ctx.writer.upsert_features(instrument, month, tables).await {
        Ok(rows) => {
            log::debug!("✅ {} {}: {} rows", instrument, month, rows);
            UnitStatus::Succeeded { rows }
        }
        Err(e) => UnitStatus::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: &str, status: UnitStatus) -> UnitOutcome {
        UnitOutcome {
            instrument: Instrument::parse(id).unwrap(),
            month: MonthPartition::parse("2024-01").unwrap(),
            status,
        }
    }

    #[test]
    fn test_report_counts() {
        let mut report = BatchReport::default();
        report.record(outcome("EURUSD", UnitStatus::Succeeded { rows: 10 }));
        report.record(outcome("GBPUSD", UnitStatus::Succeeded { rows: 5 }));
        report.record(outcome("USDJPY", UnitStatus::SkippedNoData));
        report.record(outcome("AUDUSD", UnitStatus::Failed("boom".to_string())));

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.skipped_no_data, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.rows_written, 15);
        assert_eq!(report.total_units(), 4);
        assert_eq!(
            report.failures,
            vec![UnitFailure {
                instrument: "AUDUSD".to_string(),
                month: "2024-01".to_string(),
                error: "boom".to_string(),
            }]
        );
    }

    #[test]
    fn test_report_merge_and_json() {
        let mut a = BatchReport::default();
        a.record(outcome("EURUSD", UnitStatus::Succeeded { rows: 1 }));
        let mut b = BatchReport::default();
        b.record(outcome("EURUSD", UnitStatus::Failed("x".to_string())));

        a.merge(b);
        assert_eq!(a.total_units(), 2);

        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["succeeded"], 1);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["failures"][0]["instrument"], "EURUSD");
    }
}
