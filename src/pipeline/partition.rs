//! Month partitions: the time half of a unit of work

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthPartition {
    pub year: i32,
    pub month: u32,
}

impl MonthPartition {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)?;
        Some(Self { year, month })
    }

    /// Parse `YYYY-MM`
    pub fn parse(s: &str) -> Option<Self> {
        let (year, month) = s.trim().split_once('-')?;
        if year.len() != 4 || month.len() != 2 {
            return None;
        }
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }

    /// Partition holding a Unix timestamp (seconds, UTC)
    pub fn containing(timestamp: i64) -> Option<Self> {
        let dt = DateTime::<Utc>::from_timestamp(timestamp, 0)?;
        let date = dt.date_naive();
        Self::new(date.year(), date.month())
    }

    pub fn key(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    /// First second of the month (inclusive)
    pub fn start_ts(&self) -> i64 {
        month_start(self.year, self.month)
    }

    /// First second of the next month (exclusive)
    pub fn end_ts(&self) -> i64 {
        self.next().start_ts()
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start_ts() && timestamp < self.end_ts()
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Every month from `start` through `end`, inclusive
    pub fn range(start: MonthPartition, end: MonthPartition) -> Vec<MonthPartition> {
        let mut months = Vec::new();
        let mut current = start;
        while current <= end {
            months.push(current);
            current = current.next();
        }
        months
    }
}

fn month_start(year: i32, month: u32) -> i64 {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(i64::MAX)
}

impl fmt::Display for MonthPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}
