//! Source-table helpers: DDL and bulk insert of minute bars

use crate::feature_core::Observation;
use crate::instruments::Instrument;
use rusqlite::{params, Connection};

/// DDL of the `observations` table, as shipped in `sql/`
pub const OBSERVATIONS_DDL: &str = include_str!("../../sql/01_observations.sql");

/// Insert or replace bars for one instrument in a single transaction
pub fn insert_observations(
    conn: &mut Connection,
    instrument: Instrument,
    observations: &[Observation],
) -> rusqlite::Result<usize> {
    if observations.is_empty() {
        return Ok(0);
    }

    let id = instrument.id();
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO observations (instrument_id, timestamp, open, high, low, close, volume)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(instrument_id, timestamp) DO UPDATE SET
                open = excluded.open,
                high = excluded.high,
                low = excluded.low,
                close = excluded.close,
                volume = excluded.volume",
        )?;

        for obs in observations {
            stmt.execute(params![
                id,
                obs.timestamp,
                obs.open,
                obs.high,
                obs.low,
                obs.value,
                obs.volume,
            ])?;
        }
    }
    tx.commit()?;

    log::debug!("✅ Stored {} observations for {}", observations.len(), instrument);
    Ok(observations.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(OBSERVATIONS_DDL).unwrap();
        let eurusd = Instrument::parse("EURUSD").unwrap();

        let bars = vec![Observation::new(60, 1.1), Observation::new(120, 1.2)];
        insert_observations(&mut conn, eurusd, &bars).unwrap();
        insert_observations(&mut conn, eurusd, &[Observation::new(120, 1.3)]).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);

        let close: f64 = conn
            .query_row("SELECT close FROM observations WHERE timestamp = 120", [], |row| row.get(0))
            .unwrap();
        assert_eq!(close, 1.3);
    }
}
