//! Feature Runner - Batch Temporal Feature Engine
//!
//! Computes aggregate, regression and cross-series correlation features for
//! every `(instrument, month)` unit in range and upserts them into the
//! feature tables.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin feature_runner -- --start-month 2024-01 --end-month 2024-03
//! cargo run --release --bin feature_runner -- --start-month 2024-01 --instruments EURUSD,GBPUSD
//! cargo run --release --bin feature_runner -- --rebuild --start-month 2024-01
//! cargo run --release --bin feature_runner -- --training-columns
//! ```
//!
//! ## Flags
//!
//! - `--start-month YYYY-MM` - first month (default: current month)
//! - `--end-month YYYY-MM` - last month, inclusive (default: start month)
//! - `--instruments A,B,...` - restrict targets (default: all 28)
//! - `--rebuild` - drop and recreate feature tables before running
//! - `--training-columns` - print the causal column manifest and exit
//!
//! ## Environment Variables
//!
//! See `FeatureConfig::from_env` (FXFLOW_DB_PATH, FEATURE_WORKERS,
//! PREDICTION_HORIZON_MINUTES, MOMENTUM_PERIOD_MINUTES, ...). RUST_LOG
//! defaults to info.

use fxflow::feature_core::{FeatureSchema, WindowSets};
use fxflow::pipeline::{BatchRunner, MonthPartition};
use fxflow::store::{run_schema_migrations, FeatureWriter, SqliteFeatureWriter, SqliteSeriesReader};
use fxflow::{all_instruments, FeatureConfig, Instrument};
use rusqlite::Connection;
use std::env;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug)]
struct RunnerArgs {
    start_month: MonthPartition,
    end_month: MonthPartition,
    instruments: Vec<Instrument>,
    rebuild: bool,
    training_columns: bool,
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|x| x == flag)
        .and_then(|idx| args.get(idx + 1))
        .cloned()
}

fn parse_month(raw: &str, flag: &str) -> Result<MonthPartition, Box<dyn std::error::Error>> {
    MonthPartition::parse(raw).ok_or_else(|| format!("{} expects YYYY-MM, got {:?}", flag, raw).into())
}

fn parse_args() -> Result<RunnerArgs, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let start_month = match arg_value(&args, "--start-month") {
        Some(raw) => parse_month(&raw, "--start-month")?,
        None => MonthPartition::containing(chrono::Utc::now().timestamp())
            .ok_or("system clock outside supported range")?,
    };
    let end_month = match arg_value(&args, "--end-month") {
        Some(raw) => parse_month(&raw, "--end-month")?,
        None => start_month,
    };
    if end_month < start_month {
        return Err(format!("--end-month {} precedes --start-month {}", end_month, start_month).into());
    }

    let instruments = match arg_value(&args, "--instruments") {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|id| Instrument::parse(id).ok_or_else(|| format!("unknown instrument: {}", id)))
            .collect::<Result<Vec<_>, _>>()?,
        None => all_instruments(),
    };

    Ok(RunnerArgs {
        start_month,
        end_month,
        instruments,
        rebuild: args.iter().any(|a| a == "--rebuild"),
        training_columns: args.iter().any(|a| a == "--training-columns"),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    dotenv::dotenv().ok();

    let config = FeatureConfig::from_env()?;
    let args = parse_args()?;
    let schema = Arc::new(FeatureSchema::generate(&WindowSets::default(), config.causality_policy()));

    if args.training_columns {
        println!("{}", serde_json::to_string_pretty(&schema.training_manifest())?);
        return Ok(());
    }

    let months = MonthPartition::range(args.start_month, args.end_month);

    log::info!("🚀 Feature Runner");
    log::info!("   ├─ Database: {}", config.db_path);
    log::info!("   ├─ Months: {} → {} ({})", args.start_month, args.end_month, months.len());
    log::info!("   ├─ Instruments: {}", args.instruments.len());
    log::info!("   ├─ Momentum period: {}m", config.momentum_period);
    log::info!("   └─ Rebuild: {}", args.rebuild);

    if let Some(parent) = Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Source tables (idempotent)
    {
        let mut conn = Connection::open(&config.db_path)?;
        run_schema_migrations(&mut conn, &config.schema_dir)?;
    }

    let reader = Arc::new(SqliteSeriesReader::new(&config.db_path)?);
    let writer = Arc::new(SqliteFeatureWriter::new(&config.db_path, Arc::clone(&schema))?);

    if args.rebuild {
        writer.rebuild_schema().await?;
    }

    let runner = BatchRunner::new(reader, writer, schema, config);
    let report = runner.run(&args.instruments, &months).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.failed > 0 {
        log::error!("❌ {} units failed", report.failed);
        std::process::exit(1);
    }

    Ok(())
}
