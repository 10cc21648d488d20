use crate::shared::entity::{Entity, ID};
use crate::shared::recurrence::{next_occurrence, RecurrenceError, RecurrenceRule};
use crate::timespan::{is_supported_ts, TimeSpan};
use chrono::prelude::*;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use thiserror::Error;

pub const MAX_MESSAGE_LENGTH: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmStatus {
    Pending,
    /// Claimed by a scheduler worker, the current occurrence is being
    /// delivered
    Firing,
    Fired,
    /// Delivery failed on every channel after all retries
    Failed,
    Cancelled,
}

impl AlarmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Firing => "firing",
            Self::Fired => "fired",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// States where the `Alarm` will never fire again unless an owner
    /// explicitly re-arms it
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Fired | Self::Failed | Self::Cancelled)
    }
}

impl Display for AlarmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("Unknown alarm status: {0}")]
pub struct InvalidAlarmStatusError(String);

impl FromStr for AlarmStatus {
    type Err = InvalidAlarmStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "firing" => Ok(Self::Firing),
            "fired" => Ok(Self::Fired),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(InvalidAlarmStatusError(s.to_string())),
        }
    }
}

/// An `Alarm` notifies its owner with `message` at `scheduled_ts`, and
/// again at every following occurrence of its `recurrence` rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Alarm {
    pub id: ID,
    /// User the alarm belongs to
    pub owner_id: String,
    /// Chat channel the alarm was created from, if any
    pub channel_id: Option<String>,
    pub message: String,
    /// Next occurrence in UTC millis
    pub scheduled_ts: i64,
    /// Timezone the alarm was created in, used when recomputing
    /// wall-clock recurrences and when rendering
    pub timezone: Tz,
    pub recurrence: Option<RecurrenceRule>,
    pub status: AlarmStatus,
    pub created: i64,
    pub updated: i64,
    /// When the current occurrence was claimed, only set while `Firing`
    pub claimed_at: Option<i64>,
    /// Number of occurrences delivered so far
    pub fire_count: i64,
    pub last_error: Option<String>,
}

impl Entity for Alarm {
    fn id(&self) -> &ID {
        &self.id
    }
}

/// Input for scheduling a new `Alarm`
#[derive(Debug, Clone)]
pub struct NewAlarm {
    pub owner_id: String,
    pub channel_id: Option<String>,
    pub message: String,
    /// When absent the first occurrence of `recurrence` is used
    pub scheduled_ts: Option<i64>,
    pub timezone: Tz,
    pub recurrence: Option<RecurrenceRule>,
}

#[derive(Error, Debug, PartialEq)]
pub enum AlarmValidationError {
    #[error("The alarm message can not be empty")]
    EmptyMessage,
    #[error("The alarm message is {0} characters long, the maximum is {}", MAX_MESSAGE_LENGTH)]
    MessageTooLong(usize),
    #[error("The owner of the alarm must be specified")]
    MissingOwner,
    #[error("Either a scheduled time or a recurrence rule is required")]
    MissingSchedule,
    #[error("The scheduled time {scheduled_ts} is in the past (now is {now})")]
    InThePast { scheduled_ts: i64, now: i64 },
    #[error("The scheduled time {0} is out of the supported range")]
    OutOfRange(i64),
    #[error("Invalid recurrence rule: {0}")]
    InvalidRecurrence(#[from] RecurrenceError),
}

/// Illegal state transitions of an `Alarm`
#[derive(Error, Debug, PartialEq)]
pub enum AlarmStateError {
    #[error("A cancelled alarm can not be made pending again")]
    Reactivation,
    #[error("The current occurrence of the alarm is already being delivered")]
    InFlight,
    #[error("The alarm is {0} and can not be claimed for occurrence {1}")]
    NotClaimable(AlarmStatus, i64),
    #[error("The alarm is {0}, only a firing alarm can be completed")]
    NotFiring(AlarmStatus),
    #[error("The alarm is {0}, only finished alarms can be deleted")]
    NotFinished(AlarmStatus),
    #[error("The claim taken at {0} was released and is no longer held")]
    ClaimLost(i64),
}

/// Result of delivering one occurrence of an `Alarm`
#[derive(Debug, Clone, PartialEq)]
pub enum FireOutcome {
    /// At least one channel received the notification
    Delivered,
    /// Every channel failed
    Failed(String),
}

impl Alarm {
    /// Builds a pending `Alarm` and resolves its first occurrence.
    ///
    /// A recurring alarm whose requested start is already in the past is
    /// moved to its next occurrence after `now`.
    pub fn new(input: NewAlarm, now: i64) -> Result<Self, AlarmValidationError> {
        if let Some(rule) = &input.recurrence {
            rule.validate()?;
        }
        if let Some(ts) = input.scheduled_ts.filter(|ts| !is_supported_ts(*ts)) {
            return Err(AlarmValidationError::OutOfRange(ts));
        }
        let scheduled_ts = match (input.scheduled_ts, &input.recurrence) {
            (Some(ts), Some(rule)) if ts < now => rule.next_after(now, &input.timezone)?,
            (Some(ts), _) => ts,
            (None, Some(rule)) => rule.next_after(now, &input.timezone)?,
            (None, None) => return Err(AlarmValidationError::MissingSchedule),
        };

        Ok(Self {
            id: Default::default(),
            owner_id: input.owner_id,
            channel_id: input.channel_id,
            message: input.message,
            scheduled_ts,
            timezone: input.timezone,
            recurrence: input.recurrence,
            status: AlarmStatus::Pending,
            created: now,
            updated: now,
            claimed_at: None,
            fire_count: 0,
            last_error: None,
        })
    }

    /// Checks that the `Alarm` can be stored as a new pending alarm at `now`
    pub fn validate_new(&self, now: i64) -> Result<(), AlarmValidationError> {
        self.validate_fields()?;
        if self.scheduled_ts < now && self.recurrence.is_none() {
            return Err(AlarmValidationError::InThePast {
                scheduled_ts: self.scheduled_ts,
                now,
            });
        }
        Ok(())
    }

    pub fn validate_fields(&self) -> Result<(), AlarmValidationError> {
        if self.owner_id.trim().is_empty() {
            return Err(AlarmValidationError::MissingOwner);
        }
        if self.message.trim().is_empty() {
            return Err(AlarmValidationError::EmptyMessage);
        }
        let len = self.message.chars().count();
        if len > MAX_MESSAGE_LENGTH {
            return Err(AlarmValidationError::MessageTooLong(len));
        }
        if !is_supported_ts(self.scheduled_ts) {
            return Err(AlarmValidationError::OutOfRange(self.scheduled_ts));
        }
        if let Some(rule) = &self.recurrence {
            rule.validate()?;
        }
        Ok(())
    }

    /// A cancelled alarm is terminal, nothing may make it pending again.
    pub fn check_transition(before: AlarmStatus, after: AlarmStatus) -> Result<(), AlarmStateError> {
        if before == AlarmStatus::Cancelled && after == AlarmStatus::Pending {
            return Err(AlarmStateError::Reactivation);
        }
        Ok(())
    }

    pub fn is_due(&self, as_of: i64) -> bool {
        self.status == AlarmStatus::Pending && self.scheduled_ts <= as_of
    }

    /// Grants the caller the exclusive right to deliver the occurrence at
    /// `occurrence_ts`.
    pub fn claim(&mut self, occurrence_ts: i64, now: i64) -> Result<(), AlarmStateError> {
        if self.status != AlarmStatus::Pending || self.scheduled_ts != occurrence_ts {
            return Err(AlarmStateError::NotClaimable(self.status, occurrence_ts));
        }
        self.status = AlarmStatus::Firing;
        self.claimed_at = Some(now);
        self.updated = now;
        Ok(())
    }

    /// Finishes the occurrence claimed at `claimed_at`. Recurring alarms are
    /// re-armed at their next occurrence after both the finished one and
    /// `now`, so a late scheduler never re-arms into the past.
    ///
    /// A claim that was released and taken by another worker in the
    /// meantime is rejected with `ClaimLost`.
    pub fn complete(
        &mut self,
        claimed_at: i64,
        outcome: FireOutcome,
        now: i64,
    ) -> Result<(), AlarmStateError> {
        if self.status != AlarmStatus::Firing {
            return Err(AlarmStateError::NotFiring(self.status));
        }
        if self.claimed_at != Some(claimed_at) {
            return Err(AlarmStateError::ClaimLost(claimed_at));
        }
        let delivered = match outcome {
            FireOutcome::Delivered => {
                self.fire_count += 1;
                self.last_error = None;
                true
            }
            FireOutcome::Failed(reason) => {
                self.last_error = Some(reason);
                false
            }
        };

        let reference = std::cmp::max(self.scheduled_ts, now);
        match next_occurrence(self.recurrence.as_ref(), reference, &self.timezone) {
            Ok(Some(next)) => {
                self.status = AlarmStatus::Pending;
                self.scheduled_ts = next;
            }
            Ok(None) | Err(RecurrenceError::Exhausted(_)) => {
                self.status = if delivered {
                    AlarmStatus::Fired
                } else {
                    AlarmStatus::Failed
                };
            }
            Err(e) => {
                self.status = AlarmStatus::Failed;
                self.last_error = Some(e.to_string());
            }
        }
        self.claimed_at = None;
        self.updated = now;
        Ok(())
    }

    /// Gives a stale claim back so the occurrence is picked up again
    pub fn release_claim(&mut self, now: i64) {
        if self.status == AlarmStatus::Firing {
            self.status = AlarmStatus::Pending;
            self.claimed_at = None;
            self.updated = now;
        }
    }

    /// Returns `false` if the alarm was already cancelled
    pub fn cancel(&mut self, now: i64) -> Result<bool, AlarmStateError> {
        match self.status {
            AlarmStatus::Cancelled => Ok(false),
            AlarmStatus::Firing => Err(AlarmStateError::InFlight),
            _ => {
                self.status = AlarmStatus::Cancelled;
                self.updated = now;
                Ok(true)
            }
        }
    }

    /// Moves the alarm to a new instant. This re-arms fired and failed
    /// alarms.
    pub fn reschedule(&mut self, scheduled_ts: i64, now: i64) -> Result<(), AlarmStateError> {
        if self.status == AlarmStatus::Firing {
            return Err(AlarmStateError::InFlight);
        }
        self.scheduled_ts = scheduled_ts;
        self.status = AlarmStatus::Pending;
        self.last_error = None;
        self.updated = now;
        Ok(())
    }

    /// Busy intervals of `busy_millis` starting at every occurrence of a
    /// pending alarm that overlaps `window`.
    pub fn busy_spans(&self, window: &TimeSpan, busy_millis: i64, max_count: usize) -> Vec<TimeSpan> {
        if self.status != AlarmStatus::Pending || busy_millis <= 0 {
            return Vec::new();
        }
        let mut occurrences = vec![self.scheduled_ts];
        if let Some(rule) = &self.recurrence {
            let from = std::cmp::max(self.scheduled_ts, window.start().saturating_sub(busy_millis));
            if let Ok(span) = TimeSpan::create(from, window.end()) {
                let upcoming = rule
                    .occurrences_between(&span, &self.timezone, max_count)
                    .unwrap_or_default();
                occurrences.extend(upcoming.into_iter().filter(|ts| *ts > self.scheduled_ts));
            }
        }

        occurrences
            .into_iter()
            .filter_map(|ts| TimeSpan::create(ts, ts.checked_add(busy_millis)?).ok())
            .filter(|span| span.overlaps(window))
            .take(max_count)
            .collect()
    }

    pub fn local_scheduled_time(&self) -> Option<DateTime<Tz>> {
        self.timezone.timestamp_millis_opt(self.scheduled_ts).single()
    }

    /// Text delivered to the notification channels
    pub fn notification_text(&self) -> String {
        match self.local_scheduled_time() {
            Some(local) => format!(
                "Reminder: {} ({} {})",
                self.message,
                local.format("%Y-%m-%d %H:%M"),
                self.timezone.name()
            ),
            None => format!("Reminder: {}", self.message),
        }
    }
}

impl Display for Alarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Alarm {}: {} (Triggers at {}, {})",
            self.id, self.message, self.scheduled_ts, self.status
        )
    }
}
