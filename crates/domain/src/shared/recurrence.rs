use crate::timespan::{is_supported_ts, TimeSpan};
use chrono::{prelude::*, Duration};
use chrono_tz::Tz;
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// How an `Alarm` repeats after it has fired.
///
/// `Daily` and `Weekly` rules are wall-clock rules: they are evaluated in
/// their own `timezone` when given, otherwise in the origin timezone of
/// the `Alarm` they belong to, so that an alarm at 09:00 stays at 09:00
/// local time across DST transitions.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RecurrenceRule {
    #[serde(rename_all = "camelCase")]
    Daily {
        time: NaiveTime,
        timezone: Option<Tz>,
    },
    #[serde(rename_all = "camelCase")]
    Weekly {
        weekdays: Vec<Weekday>,
        time: NaiveTime,
        timezone: Option<Tz>,
    },
    /// Fixed period counted from `anchor_ts`, independent of when the
    /// scheduler actually ran.
    #[serde(rename_all = "camelCase")]
    Interval { every_millis: i64, anchor_ts: i64 },
    /// Cron expression with 5 (minute precision) or 6/7 fields.
    Cron { expression: String },
}

#[derive(Error, Debug, PartialEq)]
pub enum RecurrenceError {
    #[error("A weekly recurrence needs at least one weekday")]
    EmptyWeekdays,
    #[error("Interval of {0} millis is invalid, it must be positive")]
    InvalidInterval(i64),
    #[error("Invalid cron expression `{0}`: {1}")]
    InvalidCron(String, String),
    #[error("Timestamp {0} is out of the supported range")]
    OutOfRange(i64),
    #[error("Local time {0} does not exist in the given timezone")]
    NonExistentLocalTime(NaiveDateTime),
    #[error("The recurrence has no occurrences after {0}")]
    Exhausted(i64),
}

/// Upper bound on how many weekdays ahead a weekly rule is searched. One
/// extra week covers the case where the only matching day is today but the
/// time has already passed.
const WEEKLY_SEARCH_DAYS: i64 = 15;

/// DST gaps are skipped by probing forward in these steps.
const GAP_PROBE_MINUTES: i64 = 15;
const GAP_PROBE_STEPS: usize = 16;

impl RecurrenceRule {
    pub fn validate(&self) -> Result<(), RecurrenceError> {
        match self {
            Self::Daily { .. } => Ok(()),
            Self::Weekly { weekdays, .. } => {
                if weekdays.is_empty() {
                    Err(RecurrenceError::EmptyWeekdays)
                } else {
                    Ok(())
                }
            }
            Self::Interval {
                every_millis,
                anchor_ts,
            } => {
                if *every_millis <= 0 {
                    Err(RecurrenceError::InvalidInterval(*every_millis))
                } else if !is_supported_ts(*anchor_ts) {
                    Err(RecurrenceError::OutOfRange(*anchor_ts))
                } else {
                    Ok(())
                }
            }
            Self::Cron { expression } => parse_cron(expression).map(|_| ()),
        }
    }

    /// The first occurrence strictly after `reference_ts`.
    ///
    /// `tz` is the origin timezone of the owning alarm. It is used by
    /// wall-clock rules without their own timezone and by cron rules.
    pub fn next_after(&self, reference_ts: i64, tz: &Tz) -> Result<i64, RecurrenceError> {
        self.validate()?;
        match self {
            Self::Daily { time, timezone } => {
                next_daily(*time, &timezone.unwrap_or(*tz), reference_ts)
            }
            Self::Weekly {
                weekdays,
                time,
                timezone,
            } => next_weekly(weekdays, *time, &timezone.unwrap_or(*tz), reference_ts),
            Self::Interval {
                every_millis,
                anchor_ts,
            } => next_interval(*every_millis, *anchor_ts, reference_ts),
            Self::Cron { expression } => next_cron(expression, tz, reference_ts),
        }
    }

    /// All occurrences inside `span`, at most `max_count` of them.
    pub fn occurrences_between(
        &self,
        span: &TimeSpan,
        tz: &Tz,
        max_count: usize,
    ) -> Result<Vec<i64>, RecurrenceError> {
        let mut occurrences = Vec::new();
        let mut cursor = span.start().saturating_sub(1);
        while occurrences.len() < max_count {
            let next = match self.next_after(cursor, tz) {
                Ok(next) => next,
                Err(RecurrenceError::Exhausted(_)) => break,
                Err(e) => return Err(e),
            };
            if next >= span.end() {
                break;
            }
            occurrences.push(next);
            cursor = next;
        }
        Ok(occurrences)
    }
}

/// Computes the next occurrence of an optional rule. `None` means the
/// alarm does not repeat.
pub fn next_occurrence(
    rule: Option<&RecurrenceRule>,
    reference_ts: i64,
    tz: &Tz,
) -> Result<Option<i64>, RecurrenceError> {
    match rule {
        Some(rule) => rule.next_after(reference_ts, tz).map(Some),
        None => Ok(None),
    }
}

fn to_local(ts: i64, tz: &Tz) -> Result<DateTime<Tz>, RecurrenceError> {
    tz.timestamp_millis_opt(ts)
        .single()
        .ok_or(RecurrenceError::OutOfRange(ts))
}

/// Maps a local wall-clock time to UTC millis. Ambiguous times (DST fall
/// back) resolve to the earliest instant and times inside a DST gap are
/// moved forward past the gap.
fn resolve_local(tz: &Tz, local: NaiveDateTime) -> Result<i64, RecurrenceError> {
    if let Some(dt) = tz.from_local_datetime(&local).earliest() {
        return Ok(dt.timestamp_millis());
    }
    let mut probe = local;
    for _ in 0..GAP_PROBE_STEPS {
        probe += Duration::minutes(GAP_PROBE_MINUTES);
        if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
            return Ok(dt.timestamp_millis());
        }
    }
    Err(RecurrenceError::NonExistentLocalTime(local))
}

fn next_daily(time: NaiveTime, tz: &Tz, reference_ts: i64) -> Result<i64, RecurrenceError> {
    let mut date = to_local(reference_ts, tz)?.date_naive();
    for _ in 0..3 {
        let candidate = resolve_local(tz, date.and_time(time))?;
        if candidate > reference_ts {
            return Ok(candidate);
        }
        date = date
            .succ_opt()
            .ok_or(RecurrenceError::OutOfRange(reference_ts))?;
    }
    Err(RecurrenceError::Exhausted(reference_ts))
}

fn next_weekly(
    weekdays: &[Weekday],
    time: NaiveTime,
    tz: &Tz,
    reference_ts: i64,
) -> Result<i64, RecurrenceError> {
    let start = to_local(reference_ts, tz)?.date_naive();
    for offset in 0..WEEKLY_SEARCH_DAYS {
        let date = start + Duration::days(offset);
        if !weekdays.contains(&date.weekday()) {
            continue;
        }
        let candidate = resolve_local(tz, date.and_time(time))?;
        if candidate > reference_ts {
            return Ok(candidate);
        }
    }
    Err(RecurrenceError::Exhausted(reference_ts))
}

fn next_interval(every_millis: i64, anchor_ts: i64, reference_ts: i64) -> Result<i64, RecurrenceError> {
    if reference_ts < anchor_ts {
        return Ok(anchor_ts);
    }
    reference_ts
        .checked_sub(anchor_ts)
        .and_then(|elapsed| (elapsed / every_millis).checked_add(1))
        .and_then(|periods| periods.checked_mul(every_millis))
        .and_then(|offset| anchor_ts.checked_add(offset))
        .ok_or(RecurrenceError::OutOfRange(reference_ts))
}

fn parse_cron(expression: &str) -> Result<Schedule, RecurrenceError> {
    let expression = expression.trim();
    let normalized = if expression.split_whitespace().count() == 5 {
        format!("0 {}", expression)
    } else {
        expression.to_string()
    };
    Schedule::from_str(&normalized)
        .map_err(|e| RecurrenceError::InvalidCron(expression.to_string(), e.to_string()))
}

fn next_cron(expression: &str, tz: &Tz, reference_ts: i64) -> Result<i64, RecurrenceError> {
    let schedule = parse_cron(expression)?;
    let reference = to_local(reference_ts, tz)?;
    schedule
        .after(&reference)
        .map(|dt| dt.timestamp_millis())
        // The schedule works in whole seconds, sub-second references could
        // otherwise yield an occurrence that is not strictly later.
        .find(|ts| *ts > reference_ts)
        .ok_or(RecurrenceError::Exhausted(reference_ts))
}
