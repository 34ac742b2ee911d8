//! Synthetic Seeder - random-walk minute bars for all 28 instruments
//!
//! Each currency follows its own log random walk against USD; every pair is
//! the ratio of its two legs, so the cross rates stay arbitrage-consistent and
//! related pairs correlate the way real ones do.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin seed_synthetic -- --start-month 2024-01 --end-month 2024-02 --seed 7
//! ```
//!
//! ## Flags
//!
//! - `--start-month YYYY-MM` (required)
//! - `--end-month YYYY-MM` (default: start month)
//! - `--seed N` (default: 42)
//! - `--volatility X` per-minute log-return bound (default: 0.0004)

use fxflow::feature_core::{Observation, SAMPLE_INTERVAL_SECS};
use fxflow::pipeline::MonthPartition;
use fxflow::store::observations::insert_observations;
use fxflow::store::run_schema_migrations;
use fxflow::{all_instruments, Currency, FeatureConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::Connection;
use std::collections::HashMap;
use std::env;
use std::path::Path;

const DEFAULT_VOLATILITY: f64 = 0.0004;

/// Approximate USD value of one unit of each currency
fn usd_level(currency: Currency) -> f64 {
    match currency {
        Currency::Eur => 1.08,
        Currency::Gbp => 1.27,
        Currency::Aud => 0.66,
        Currency::Nzd => 0.61,
        Currency::Usd => 1.0,
        Currency::Cad => 1.0 / 1.36,
        Currency::Chf => 1.0 / 0.88,
        Currency::Jpy => 1.0 / 150.0,
    }
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|x| x == flag)
        .and_then(|idx| args.get(idx + 1))
        .cloned()
}

/// Per-minute log-return bound; must be a positive finite number
fn parse_volatility(raw: Option<&str>) -> Result<f64, String> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_VOLATILITY);
    };
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => Err(format!("--volatility expects a positive number, got {:?}", raw)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    dotenv::dotenv().ok();

    let config = FeatureConfig::from_env()?;
    let args: Vec<String> = env::args().collect();

    let start_month = arg_value(&args, "--start-month")
        .and_then(|raw| MonthPartition::parse(&raw))
        .ok_or("--start-month YYYY-MM is required")?;
    let end_month = match arg_value(&args, "--end-month") {
        Some(raw) => MonthPartition::parse(&raw).ok_or("--end-month expects YYYY-MM")?,
        None => start_month,
    };
    let seed: u64 = arg_value(&args, "--seed").and_then(|s| s.parse().ok()).unwrap_or(42);
    let volatility = parse_volatility(arg_value(&args, "--volatility").as_deref())?;

    log::info!("🌱 Seeding synthetic observations");
    log::info!("   ├─ Database: {}", config.db_path);
    log::info!("   ├─ Months: {} → {}", start_month, end_month);
    log::info!("   └─ Seed: {} (volatility {})", seed, volatility);

    if let Some(parent) = Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut conn = Connection::open(&config.db_path)?;
    fxflow::sqlite_pragma::apply_optimized_pragmas(&conn)?;
    run_schema_migrations(&mut conn, &config.schema_dir)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut log_levels: HashMap<Currency, f64> = Currency::all()
        .into_iter()
        .map(|c| (c, usd_level(c).ln()))
        .collect();

    let mut total = 0usize;
    for month in MonthPartition::range(start_month, end_month) {
        let mut bars: HashMap<String, Vec<Observation>> = HashMap::new();

        let mut ts = month.start_ts();
        while ts < month.end_ts() {
            for currency in Currency::all() {
                if currency == Currency::Usd {
                    continue;
                }
                let step = rng.gen_range(-volatility..volatility);
                if let Some(level) = log_levels.get_mut(&currency) {
                    *level += step;
                }
            }

            for instrument in all_instruments() {
                let base = log_levels.get(&instrument.base).copied().unwrap_or(0.0);
                let quote = log_levels.get(&instrument.quote).copied().unwrap_or(0.0);
                let mut obs = Observation::new(ts, (base - quote).exp());
                obs.volume = Some(rng.gen_range(10.0..1_000.0));
                bars.entry(instrument.id()).or_default().push(obs);
            }

            ts += SAMPLE_INTERVAL_SECS;
        }

        for instrument in all_instruments() {
            if let Some(series) = bars.get(&instrument.id()) {
                total += insert_observations(&mut conn, instrument, series)?;
            }
        }
        log::info!("   ├─ {} seeded", month);
    }

    log::info!("✅ Seeded {} observations", total);
    Ok(())
}
