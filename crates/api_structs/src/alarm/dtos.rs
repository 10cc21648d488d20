use chime_scheduler_domain::{Alarm, AlarmStatus, RecurrenceRule, ID};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlarmDTO {
    pub id: ID,
    pub owner_id: String,
    pub channel_id: Option<String>,
    pub message: String,
    pub scheduled_ts: i64,
    pub timezone: String,
    pub recurrence: Option<RecurrenceRule>,
    pub status: AlarmStatus,
    pub created: i64,
    pub updated: i64,
    pub fire_count: i64,
    pub last_error: Option<String>,
}

impl AlarmDTO {
    pub fn new(alarm: Alarm) -> Self {
        Self {
            id: alarm.id,
            owner_id: alarm.owner_id,
            channel_id: alarm.channel_id,
            message: alarm.message,
            scheduled_ts: alarm.scheduled_ts,
            timezone: alarm.timezone.name().to_string(),
            recurrence: alarm.recurrence,
            status: alarm.status,
            created: alarm.created,
            updated: alarm.updated,
            fire_count: alarm.fire_count,
            last_error: alarm.last_error,
        }
    }
}
