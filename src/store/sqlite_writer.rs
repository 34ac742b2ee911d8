//! SQLite feature writer: schema preparation and per-unit upserts

use super::writer_backend::{FeatureWriter, SchemaError, WriteError};
use crate::feature_core::schema::{stored_windows, KEY_COLUMNS};
use crate::feature_core::{FeatureSchema, FeatureTable, TableRows, TableSchema};
use crate::instruments::Instrument;
use crate::pipeline::MonthPartition;
use crate::sqlite_pragma::apply_optimized_pragmas;
use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub struct SqliteFeatureWriter {
    conn: Arc<Mutex<Connection>>,
    schema: Arc<FeatureSchema>,
    prepared: AtomicBool,
}

impl SqliteFeatureWriter {
    pub fn new(db_path: impl AsRef<Path>, schema: Arc<FeatureSchema>) -> Result<Self, WriteError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;

        // Apply optimized PRAGMAs (WAL, NORMAL, MEMORY, mmap, cache, autocheckpoint)
        apply_optimized_pragmas(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            schema,
            prepared: AtomicBool::new(false),
        })
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.load(Ordering::SeqCst)
    }

    /// Reject rows outside the unit's month or of the wrong width
    fn validate_unit(
        &self,
        instrument: Instrument,
        month: MonthPartition,
        tables: &[TableRows],
    ) -> Result<(), WriteError> {
        for table_rows in tables {
            let expected = self.schema.table(table_rows.table).width();
            for row in &table_rows.rows {
                if !month.contains(row.timestamp) {
                    return Err(WriteError::PartitionViolation {
                        instrument: instrument.id(),
                        month: month.key(),
                        timestamp: row.timestamp,
                    });
                }
                if row.values.len() != expected {
                    return Err(WriteError::RowWidth {
                        table: table_rows.table.table_name().to_string(),
                        expected,
                        actual: row.values.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column names of a stored table; empty when the table does not exist
pub fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }
    Ok(columns)
}

fn create_table_sql(table: &TableSchema) -> String {
    let mut defs = vec![
        "instrument_id TEXT NOT NULL".to_string(),
        "timestamp INTEGER NOT NULL".to_string(),
        "month TEXT NOT NULL".to_string(),
    ];
    defs.extend(table.columns.iter().map(|c| format!("{} REAL", quote_ident(&c.name))));
    defs.push("PRIMARY KEY (instrument_id, timestamp)".to_string());

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote_ident(table.table.table_name()),
        defs.join(",\n    ")
    )
}

fn upsert_sql(table: &TableSchema) -> String {
    let mut names: Vec<String> = KEY_COLUMNS.iter().map(|k| quote_ident(k)).collect();
    names.extend(table.columns.iter().map(|c| quote_ident(&c.name)));

    let placeholders = vec!["?"; names.len()].join(", ");
    let updates: Vec<String> = names[2..]
        .iter()
        .map(|n| format!("{} = excluded.{}", n, n))
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({})
         ON CONFLICT(instrument_id, timestamp) DO UPDATE SET {}",
        quote_ident(table.table.table_name()),
        names.join(", "),
        placeholders,
        updates.join(", ")
    )
}

fn check_domain_parity(
    schema: &FeatureSchema,
    raw_columns: &[String],
    momentum_columns: &[String],
) -> Result<(), SchemaError> {
    let canonical: BTreeSet<u32> = schema.windows().regression.iter().copied().collect();
    let windows_of = |columns: &[String]| {
        if columns.is_empty() {
            None
        } else {
            Some(stored_windows(columns.iter().map(String::as_str)))
        }
    };

    let (raw, momentum) = match (windows_of(raw_columns), windows_of(momentum_columns)) {
        (None, None) => return Ok(()),
        (Some(raw), Some(momentum)) => (raw, momentum),
        (Some(raw), None) => (raw, canonical),
        (None, Some(momentum)) => (canonical, momentum),
    };

    if raw != momentum {
        return Err(SchemaError::DomainParity {
            raw: raw.into_iter().collect(),
            momentum: momentum.into_iter().collect(),
        });
    }
    Ok(())
}

/// Validate stored tables against the schema, then create or extend them
pub fn prepare_tables(conn: &mut Connection, schema: &FeatureSchema) -> Result<(), SchemaError> {
    let existing: Vec<Vec<String>> = schema
        .tables()
        .iter()
        .map(|t| table_columns(conn, t.table.table_name()))
        .collect::<Result<_, _>>()?;

    check_domain_parity(
        schema,
        &existing[FeatureTable::RegressionRaw.index()],
        &existing[FeatureTable::RegressionMomentum.index()],
    )?;

    for (table, stored) in schema.tables().iter().zip(&existing) {
        let unexpected: Vec<String> = stored
            .iter()
            .filter(|name| !KEY_COLUMNS.contains(&name.as_str()) && !table.contains(name))
            .cloned()
            .collect();
        if !unexpected.is_empty() {
            return Err(SchemaError::ColumnMismatch {
                table: table.table.table_name().to_string(),
                unexpected,
            });
        }
    }

    let tx = conn.transaction()?;
    for (table, stored) in schema.tables().iter().zip(&existing) {
        let name = table.table.table_name();
        if stored.is_empty() {
            tx.execute_batch(&create_table_sql(table))?;
            tx.execute_batch(&format!(
                "CREATE INDEX IF NOT EXISTS {} ON {}(month, instrument_id)",
                quote_ident(&format!("idx_{}_month", name)),
                quote_ident(name)
            ))?;
            log::info!("   ├─ Created {} ({} feature columns)", name, table.width());
            continue;
        }

        let missing: Vec<&str> = table
            .column_names()
            .into_iter()
            .filter(|c| !stored.iter().any(|s| s.as_str() == *c))
            .collect();
        for column in &missing {
            tx.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} REAL",
                quote_ident(name),
                quote_ident(column)
            ))?;
        }
        if missing.is_empty() {
            log::info!("   ├─ {} up to date", name);
        } else {
            log::info!("   ├─ Added {} columns to {}", missing.len(), name);
        }
    }
    tx.commit()?;

    Ok(())
}

fn drop_tables(conn: &Connection) -> rusqlite::Result<()> {
    for table in FeatureTable::all() {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(table.table_name())))?;
    }
    Ok(())
}

fn write_unit(
    conn: &mut Connection,
    schema: &FeatureSchema,
    instrument_id: &str,
    month_key: &str,
    tables: &[TableRows],
) -> Result<usize, WriteError> {
    let tx = conn.transaction()?;
    let mut written = 0;

    for table_rows in tables {
        let sql = upsert_sql(schema.table(table_rows.table));
        let mut stmt = tx.prepare_cached(&sql)?;

        for row in &table_rows.rows {
            let mut params: Vec<Value> = Vec::with_capacity(KEY_COLUMNS.len() + row.values.len());
            params.push(Value::Text(instrument_id.to_string()));
            params.push(Value::Integer(row.timestamp));
            params.push(Value::Text(month_key.to_string()));
            params.extend(row.values.iter().map(|v| match v {
                Some(x) if x.is_finite() => Value::Real(*x),
                _ => Value::Null,
            }));
            stmt.execute(params_from_iter(params))?;
        }
        written = written.max(table_rows.rows.len());
    }

    tx.commit()?;
    Ok(written)
}

#[async_trait]
impl FeatureWriter for SqliteFeatureWriter {
    async fn prepare_schema(&self) -> Result<(), SchemaError> {
        log::info!("🔧 Preparing feature schema");

        let mut conn = self.conn.lock().unwrap();
        self.prepared.store(false, Ordering::SeqCst);
        prepare_tables(&mut conn, &self.schema)?;
        self.prepared.store(true, Ordering::SeqCst);

        log::info!("   └─ ✅ Feature schema ready ({} tables)", self.schema.tables().len());
        Ok(())
    }

    async fn rebuild_schema(&self) -> Result<(), SchemaError> {
        log::warn!("⚠️  Dropping all feature tables for rebuild");
        {
            let conn = self.conn.lock().unwrap();
            self.prepared.store(false, Ordering::SeqCst);
            drop_tables(&conn)?;
        }
        self.prepare_schema().await
    }

    async fn upsert_features(
        &self,
        instrument: Instrument,
        month: MonthPartition,
        tables: Vec<TableRows>,
    ) -> Result<usize, WriteError> {
        if !self.is_prepared() {
            return Err(WriteError::Schema(SchemaError::NotPrepared));
        }
        self.validate_unit(instrument, month, &tables)?;

        if tables.iter().all(|t| t.rows.is_empty()) {
            return Ok(0);
        }

        let conn = Arc::clone(&self.conn);
        let schema = Arc::clone(&self.schema);
        let instrument_id = instrument.id();
        let month_key = month.key();

        let written = tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap();
            write_unit(&mut conn, &schema, &instrument_id, &month_key, &tables)
        })
        .await
        .map_err(|e| WriteError::Task(e.to_string()))??;

        log::debug!("✅ Upserted {} rows for {} {}", written, instrument, month);
        Ok(written)
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_core::{CausalityPolicy, FeatureRow, WindowSets};
    use tempfile::tempdir;

    fn schema() -> Arc<FeatureSchema> {
        Arc::new(FeatureSchema::generate(&WindowSets::default(), CausalityPolicy::default()))
    }

    fn month() -> MonthPartition {
        MonthPartition::parse("2024-01").unwrap()
    }

    fn eurusd() -> Instrument {
        Instrument::parse("EURUSD").unwrap()
    }

    fn unit_rows(schema: &FeatureSchema, timestamps: &[i64], value: Option<f64>) -> Vec<TableRows> {
        schema
            .tables()
            .iter()
            .map(|t| TableRows {
                table: t.table,
                rows: timestamps
                    .iter()
                    .map(|ts| FeatureRow {
                        timestamp: *ts,
                        values: vec![value; t.width()],
                    })
                    .collect(),
            })
            .collect()
    }

    fn count_rows(db_path: &Path, table: &str) -> i64 {
        let conn = Connection::open(db_path).unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .unwrap()
    }

    #[tokio::test]
    async fn test_prepare_creates_tables_with_parity() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("features.db");
        let writer = SqliteFeatureWriter::new(&db_path, schema()).unwrap();

        writer.prepare_schema().await.unwrap();
        assert!(writer.is_prepared());

        let conn = Connection::open(&db_path).unwrap();
        let raw = table_columns(&conn, "features_regression_raw").unwrap();
        let momentum = table_columns(&conn, "features_regression_momentum").unwrap();
        assert_eq!(raw, momentum);
        assert_eq!(&raw[..3], &["instrument_id", "timestamp", "month"]);

        // Preparing again is a no-op
        writer.prepare_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_requires_prepare() {
        let dir = tempdir().unwrap();
        let schema = schema();
        let writer = SqliteFeatureWriter::new(dir.path().join("f.db"), Arc::clone(&schema)).unwrap();

        let rows = unit_rows(&schema, &[month().start_ts()], Some(1.0));
        let err = writer.upsert_features(eurusd(), month(), rows).await.unwrap_err();
        assert!(matches!(err, WriteError::Schema(SchemaError::NotPrepared)));
    }

    #[tokio::test]
    async fn test_upsert_overwrites_with_nulls() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("features.db");
        let schema = schema();
        let writer = SqliteFeatureWriter::new(&db_path, Arc::clone(&schema)).unwrap();
        writer.prepare_schema().await.unwrap();

        let ts = [month().start_ts(), month().start_ts() + 60];
        let written = writer
            .upsert_features(eurusd(), month(), unit_rows(&schema, &ts, Some(0.5)))
            .await
            .unwrap();
        assert_eq!(written, 2);

        writer
            .upsert_features(eurusd(), month(), unit_rows(&schema, &ts, None))
            .await
            .unwrap();

        assert_eq!(count_rows(&db_path, "features_aggregate"), 2);
        let conn = Connection::open(&db_path).unwrap();
        let value: Option<f64> = conn
            .query_row(
                "SELECT w15_return FROM features_aggregate WHERE timestamp = ?1",
                [ts[0]],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_partition_violation_writes_nothing() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("features.db");
        let schema = schema();
        let writer = SqliteFeatureWriter::new(&db_path, Arc::clone(&schema)).unwrap();
        writer.prepare_schema().await.unwrap();

        let ts = [month().start_ts(), month().end_ts()];
        let err = writer
            .upsert_features(eurusd(), month(), unit_rows(&schema, &ts, Some(1.0)))
            .await
            .unwrap_err();

        assert!(matches!(err, WriteError::PartitionViolation { .. }));
        for table in FeatureTable::all() {
            assert_eq!(count_rows(&db_path, table.table_name()), 0);
        }
    }

    #[tokio::test]
    async fn test_row_width_checked() {
        let dir = tempdir().unwrap();
        let schema = schema();
        let writer = SqliteFeatureWriter::new(dir.path().join("f.db"), Arc::clone(&schema)).unwrap();
        writer.prepare_schema().await.unwrap();

        let rows = vec![TableRows {
            table: FeatureTable::Aggregate,
            rows: vec![FeatureRow {
                timestamp: month().start_ts(),
                values: vec![Some(1.0); 3],
            }],
        }];
        let err = writer.upsert_features(eurusd(), month(), rows).await.unwrap_err();
        assert!(matches!(err, WriteError::RowWidth { actual: 3, .. }));
    }

    #[tokio::test]
    async fn test_domain_parity_violation_requires_rebuild() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("features.db");
        let writer = SqliteFeatureWriter::new(&db_path, schema()).unwrap();
        writer.prepare_schema().await.unwrap();

        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch(
                "DROP TABLE features_regression_momentum;
                 CREATE TABLE features_regression_momentum (
                    instrument_id TEXT NOT NULL,
                    timestamp INTEGER NOT NULL,
                    month TEXT NOT NULL,
                    w60_r2 REAL,
                    PRIMARY KEY (instrument_id, timestamp)
                 );",
            )
            .unwrap();
        }

        let err = writer.prepare_schema().await.unwrap_err();
        match err {
            SchemaError::DomainParity { raw, momentum } => {
                assert_eq!(raw, vec![60, 90, 150, 240, 390, 630]);
                assert_eq!(momentum, vec![60]);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!writer.is_prepared());

        writer.rebuild_schema().await.unwrap();
        assert!(writer.is_prepared());
        let conn = Connection::open(&db_path).unwrap();
        assert_eq!(
            table_columns(&conn, "features_regression_raw").unwrap(),
            table_columns(&conn, "features_regression_momentum").unwrap()
        );
    }

    #[tokio::test]
    async fn test_unexpected_column_rejected() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("features.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch(
                "CREATE TABLE features_aggregate (
                    instrument_id TEXT NOT NULL,
                    timestamp INTEGER NOT NULL,
                    month TEXT NOT NULL,
                    w15_return REAL,
                    w20_return REAL,
                    PRIMARY KEY (instrument_id, timestamp)
                 );",
            )
            .unwrap();
        }

        let writer = SqliteFeatureWriter::new(&db_path, schema()).unwrap();
        let err = writer.prepare_schema().await.unwrap_err();
        match err {
            SchemaError::ColumnMismatch { table, unexpected } => {
                assert_eq!(table, "features_aggregate");
                assert_eq!(unexpected, vec!["w20_return".to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_columns_added_with_nulls() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("features.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch(
                "CREATE TABLE features_aggregate (
                    instrument_id TEXT NOT NULL,
                    timestamp INTEGER NOT NULL,
                    month TEXT NOT NULL,
                    w15_return REAL,
                    PRIMARY KEY (instrument_id, timestamp)
                 );
                 INSERT INTO features_aggregate VALUES ('EURUSD', 1704067200, '2024-01', 0.1);",
            )
            .unwrap();
        }

        let schema = schema();
        let writer = SqliteFeatureWriter::new(&db_path, Arc::clone(&schema)).unwrap();
        writer.prepare_schema().await.unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let columns = table_columns(&conn, "features_aggregate").unwrap();
        assert_eq!(columns.len(), KEY_COLUMNS.len() + schema.table(FeatureTable::Aggregate).width());

        let (kept, added): (Option<f64>, Option<f64>) = conn
            .query_row("SELECT w15_return, w75_stdev FROM features_aggregate", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(kept, Some(0.1));
        assert_eq!(added, None);
    }
}
