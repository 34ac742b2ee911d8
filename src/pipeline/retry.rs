//! Bounded exponential backoff for upstream range reads

use crate::feature_core::Observation;
use crate::instruments::Instrument;
use crate::store::{ReadError, SeriesReader};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay_ms: u64,
    max_delay_ms: u64,
    max_retries: u32,
    current_attempt: u32,
}

#[derive(Debug)]
pub struct MaxRetriesExceeded;

impl std::fmt::Display for MaxRetriesExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum retry attempts exceeded")
    }
}

impl std::error::Error for MaxRetriesExceeded {}

impl ExponentialBackoff {
    pub fn new(initial_ms: u64, max_ms: u64, retries: u32) -> Self {
        Self {
            initial_delay_ms: initial_ms,
            max_delay_ms: max_ms,
            max_retries: retries,
            current_attempt: 0,
        }
    }

    /// Delay before the next attempt, capped at the maximum
    pub fn next_delay(&self) -> Duration {
        let factor = 2_u64.saturating_pow(self.current_attempt);
        Duration::from_millis(std::cmp::min(
            self.initial_delay_ms.saturating_mul(factor),
            self.max_delay_ms,
        ))
    }

    pub async fn sleep(&mut self) -> Result<(), MaxRetriesExceeded> {
        if self.current_attempt >= self.max_retries {
            return Err(MaxRetriesExceeded);
        }

        let delay = self.next_delay();

        log::warn!(
            "⏳ Retry attempt {} of {} in {}ms",
            self.current_attempt + 1,
            self.max_retries,
            delay.as_millis()
        );

        sleep(delay).await;
        self.current_attempt += 1;
        Ok(())
    }

    pub fn attempts(&self) -> u32 {
        self.current_attempt
    }
}

/// `read_series` with bounded retries
///
/// Returns `ReadError::MaxRetriesExceeded` carrying the last failure once the
/// backoff is exhausted.
pub async fn read_with_retry(
    reader: &dyn SeriesReader,
    instrument: Instrument,
    start_ts: i64,
    end_ts: i64,
    lookback_minutes: u32,
    mut backoff: ExponentialBackoff,
) -> Result<Vec<Observation>, ReadError> {
    loop {
        match reader.read_series(instrument, start_ts, end_ts, lookback_minutes).await {
            Ok(rows) => return Ok(rows),
            Err(e) => {
                log::warn!("⚠️  Read failed for {} [{}, {}): {}", instrument, start_ts, end_ts, e);
                if backoff.sleep().await.is_err() {
                    return Err(ReadError::MaxRetriesExceeded {
                        attempts: backoff.attempts() + 1,
                        last: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyReader {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl SeriesReader for FlakyReader {
        async fn read_series(
            &self,
            _instrument: Instrument,
            start_ts: i64,
            _end_ts: i64,
            _lookback_minutes: u32,
        ) -> Result<Vec<Observation>, ReadError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(ReadError::Unavailable("connection reset".to_string()))
            } else {
                Ok(vec![Observation::new(start_ts, 1.1)])
            }
        }

        fn backend_type(&self) -> &'static str {
            "Flaky"
        }
    }

    fn eurusd() -> Instrument {
        Instrument::parse("EURUSD").unwrap()
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let mut backoff = ExponentialBackoff::new(100, 350, 5);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        backoff.current_attempt = 1;
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        backoff.current_attempt = 2;
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_read_recovers_within_budget() {
        let reader = FlakyReader {
            failures_before_success: 2,
            calls: AtomicU32::new(0),
        };
        let rows = read_with_retry(&reader, eurusd(), 0, 60, 0, ExponentialBackoff::new(1, 2, 3))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(reader.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_read_gives_up_after_max_retries() {
        let reader = FlakyReader {
            failures_before_success: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let err = read_with_retry(&reader, eurusd(), 0, 60, 0, ExponentialBackoff::new(1, 2, 2))
            .await
            .unwrap_err();

        match err {
            ReadError::MaxRetriesExceeded { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(last.contains("connection reset"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(reader.calls.load(Ordering::SeqCst), 3);
    }
}
