//! SQLite-backed series reader over the `observations` table

use super::reader::{ReadError, SeriesReader};
use crate::feature_core::{Observation, SAMPLE_INTERVAL_SECS};
use crate::instruments::Instrument;
use crate::sqlite_pragma::apply_optimized_pragmas;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct SqliteSeriesReader {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSeriesReader {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, ReadError> {
        let conn = Connection::open(db_path)?;

        apply_optimized_pragmas(&conn)?;

        // Readers never take write locks (must be after PRAGMAs)
        conn.execute("PRAGMA query_only = ON", [])?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?;
        log::info!("📥 SQLite reader initialized: {} observations available", count);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

/// Blocking range query shared by the reader and the seeder's sanity checks
pub fn query_range(
    conn: &Connection,
    instrument: Instrument,
    from_ts: i64,
    to_ts: i64,
) -> Result<Vec<Observation>, ReadError> {
    let mut stmt = conn.prepare_cached(
        "SELECT timestamp, open, high, low, close, volume
         FROM observations
         WHERE instrument_id = ?1 AND timestamp >= ?2 AND timestamp < ?3
         ORDER BY timestamp ASC",
    )?;

    let rows = stmt.query_map(params![instrument.id(), from_ts, to_ts], |row| {
        Ok(Observation {
            timestamp: row.get(0)?,
            open: row.get(1)?,
            high: row.get(2)?,
            low: row.get(3)?,
            value: row.get(4)?,
            volume: row.get(5)?,
        })
    })?;

    let mut observations = Vec::new();
    for row in rows {
        observations.push(row?);
    }
    Ok(observations)
}

#[async_trait]
impl SeriesReader for SqliteSeriesReader {
    async fn read_series(
        &self,
        instrument: Instrument,
        start_ts: i64,
        end_ts: i64,
        lookback_minutes: u32,
    ) -> Result<Vec<Observation>, ReadError> {
        let conn = Arc::clone(&self.conn);
        let from_ts = start_ts - lookback_minutes as i64 * SAMPLE_INTERVAL_SECS;

        let observations = tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            query_range(&conn, instrument, from_ts, end_ts)
        })
        .await
        .map_err(|e| ReadError::Unavailable(format!("reader task failed: {}", e)))??;

        log::debug!(
            "📥 Read {} observations for {} [{}, {})",
            observations.len(),
            instrument,
            from_ts,
            end_ts
        );

        Ok(observations)
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}
