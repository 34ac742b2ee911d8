use crate::feature_core::Observation;
use crate::instruments::Instrument;
use async_trait::async_trait;

#[derive(Debug)]
pub enum ReadError {
    Database(rusqlite::Error),
    Unavailable(String),
    MaxRetriesExceeded { attempts: u32, last: String },
}

impl From<rusqlite::Error> for ReadError {
    fn from(err: rusqlite::Error) -> Self {
        ReadError::Database(err)
    }
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::Database(e) => write!(f, "Database error: {}", e),
            ReadError::Unavailable(msg) => write!(f, "Source unavailable: {}", msg),
            ReadError::MaxRetriesExceeded { attempts, last } => {
                write!(f, "Read failed after {} attempts: {}", attempts, last)
            }
        }
    }
}

impl std::error::Error for ReadError {}

#[async_trait]
pub trait SeriesReader: Send + Sync {
    /// Observations for one instrument with `timestamp` in
    /// `[start_ts - lookback_minutes * 60, end_ts)`, ordered ascending
    async fn read_series(
        &self,
        instrument: Instrument,
        start_ts: i64,
        end_ts: i64,
        lookback_minutes: u32,
    ) -> Result<Vec<Observation>, ReadError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
