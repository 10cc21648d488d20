use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether `ts` in UTC millis maps to a calendar date. Instants outside
/// this range are rejected at the boundaries.
pub fn is_supported_ts(ts: i64) -> bool {
    Utc.timestamp_millis_opt(ts).single().is_some()
}

/// Half-open range of time `[start_ts, end_ts)` in UTC millis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSpan {
    start_ts: i64,
    end_ts: i64,
}

#[derive(Error, Debug, PartialEq)]
#[error("Provided timespan start_ts: {0} and end_ts: {1} is invalid. The end must be after the start.")]
pub struct InvalidTimeSpanError(pub i64, pub i64);

impl TimeSpan {
    pub fn create(start_ts: i64, end_ts: i64) -> Result<Self, InvalidTimeSpanError> {
        if end_ts <= start_ts {
            Err(InvalidTimeSpanError(start_ts, end_ts))
        } else {
            Ok(Self { start_ts, end_ts })
        }
    }

    pub fn start(&self) -> i64 {
        self.start_ts
    }

    pub fn end(&self) -> i64 {
        self.end_ts
    }

    pub fn duration(&self) -> i64 {
        self.end_ts.saturating_sub(self.start_ts)
    }

    pub fn contains_span(&self, other: &TimeSpan) -> bool {
        self.start_ts <= other.start_ts && other.end_ts <= self.end_ts
    }

    /// Two half-open spans overlap only if they share an instant, touching
    /// ends does not count.
    pub fn overlaps(&self, other: &TimeSpan) -> bool {
        self.start_ts < other.end_ts && other.start_ts < self.end_ts
    }
}
