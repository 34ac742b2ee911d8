use crate::feature_core::TableRows;
use crate::instruments::Instrument;
use crate::pipeline::MonthPartition;
use async_trait::async_trait;

/// Stored feature tables disagree with the generated schema
///
/// Fatal at batch level: no unit writes until the tables are rebuilt.
#[derive(Debug)]
pub enum SchemaError {
    /// Raw and momentum regression tables carry different window sets
    DomainParity { raw: Vec<u32>, momentum: Vec<u32> },
    /// A stored table has columns the schema does not know
    ColumnMismatch { table: String, unexpected: Vec<String> },
    /// A write was attempted before `prepare_schema` succeeded
    NotPrepared,
    Database(rusqlite::Error),
}

impl From<rusqlite::Error> for SchemaError {
    fn from(err: rusqlite::Error) -> Self {
        SchemaError::Database(err)
    }
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaError::DomainParity { raw, momentum } => write!(
                f,
                "Regression domain parity violated: raw windows {:?}, momentum windows {:?} (rebuild required)",
                raw, momentum
            ),
            SchemaError::ColumnMismatch { table, unexpected } => write!(
                f,
                "Table {} has unexpected columns {:?} (rebuild required)",
                table, unexpected
            ),
            SchemaError::NotPrepared => write!(f, "Feature schema not prepared"),
            SchemaError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for SchemaError {}

#[derive(Debug)]
pub enum WriteError {
    Io(std::io::Error),
    Database(rusqlite::Error),
    Schema(SchemaError),
    /// A row's timestamp falls outside the unit's month
    PartitionViolation {
        instrument: String,
        month: String,
        timestamp: i64,
    },
    RowWidth {
        table: String,
        expected: usize,
        actual: usize,
    },
    Task(String),
}

impl From<std::io::Error> for WriteError {
    fn from(err: std::io::Error) -> Self {
        WriteError::Io(err)
    }
}

impl From<rusqlite::Error> for WriteError {
    fn from(err: rusqlite::Error) -> Self {
        WriteError::Database(err)
    }
}

impl From<SchemaError> for WriteError {
    fn from(err: SchemaError) -> Self {
        WriteError::Schema(err)
    }
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteError::Io(e) => write!(f, "IO error: {}", e),
            WriteError::Database(e) => write!(f, "Database error: {}", e),
            WriteError::Schema(e) => write!(f, "Schema error: {}", e),
            WriteError::PartitionViolation {
                instrument,
                month,
                timestamp,
            } => write!(
                f,
                "Row at {} lies outside partition {}/{}",
                timestamp, instrument, month
            ),
            WriteError::RowWidth {
                table,
                expected,
                actual,
            } => write!(f, "Row for {} has {} values, expected {}", table, actual, expected),
            WriteError::Task(msg) => write!(f, "Writer task failed: {}", msg),
        }
    }
}

impl std::error::Error for WriteError {}

#[async_trait]
pub trait FeatureWriter: Send + Sync {
    /// Create missing tables and columns; refuse on parity or column mismatch
    ///
    /// Must complete before any `upsert_features` call.
    async fn prepare_schema(&self) -> Result<(), SchemaError>;

    /// Drop every feature table and prepare from scratch
    async fn rebuild_schema(&self) -> Result<(), SchemaError>;

    /// Write one unit's rows for all tables in a single transaction
    ///
    /// Idempotent on `(instrument_id, timestamp)`. Every schema column is
    /// written, nulls included. Returns the number of timestamps written.
    async fn upsert_features(
        &self,
        instrument: Instrument,
        month: MonthPartition,
        tables: Vec<TableRows>,
    ) -> Result<usize, WriteError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
