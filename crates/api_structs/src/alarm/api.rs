use crate::dtos::AlarmDTO;
use chime_scheduler_domain::{Alarm, RecurrenceRule, ID};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmResponse {
    pub alarm: AlarmDTO,
}

impl AlarmResponse {
    pub fn new(alarm: Alarm) -> Self {
        Self {
            alarm: AlarmDTO::new(alarm),
        }
    }
}

pub mod create_alarm {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct RequestBody {
        pub owner_id: String,
        #[serde(default)]
        pub channel_id: Option<String>,
        pub message: String,
        /// When absent the first occurrence of `recurrence` is used
        #[serde(default)]
        pub scheduled_ts: Option<i64>,
        /// IANA timezone, the server default is used when absent
        #[serde(default)]
        pub timezone: Option<String>,
        #[serde(default)]
        pub recurrence: Option<RecurrenceRule>,
    }

    pub type APIResponse = AlarmResponse;
}

pub mod get_alarm {
    use super::*;

    #[derive(Deserialize)]
    pub struct PathParams {
        pub alarm_id: ID,
    }

    pub type APIResponse = AlarmResponse;
}

pub mod update_alarm {
    use super::*;

    #[derive(Deserialize)]
    pub struct PathParams {
        pub alarm_id: ID,
    }

    #[derive(Debug, Default, Serialize, Deserialize, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct RequestBody {
        #[serde(default)]
        pub message: Option<String>,
        /// Setting a new instant re-arms fired and failed alarms
        #[serde(default)]
        pub scheduled_ts: Option<i64>,
        #[serde(default)]
        pub timezone: Option<String>,
        #[serde(default)]
        pub recurrence: Option<RecurrenceRule>,
        /// Turns a recurring alarm into a one-off alarm
        #[serde(default)]
        pub remove_recurrence: bool,
    }

    pub type APIResponse = AlarmResponse;
}

pub mod cancel_alarm {
    use super::*;

    #[derive(Deserialize)]
    pub struct PathParams {
        pub alarm_id: ID,
    }

    pub type APIResponse = AlarmResponse;
}

pub mod delete_alarm {
    use super::*;

    #[derive(Deserialize)]
    pub struct PathParams {
        pub alarm_id: ID,
    }

    pub type APIResponse = AlarmResponse;
}

pub mod get_owner_alarms {
    use super::*;

    #[derive(Deserialize)]
    pub struct PathParams {
        pub owner_id: String,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct QueryParams {
        /// Include fired, failed and cancelled alarms
        #[serde(default)]
        pub include_past: Option<bool>,
    }

    #[derive(Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct APIResponse {
        pub alarms: Vec<AlarmDTO>,
    }

    impl APIResponse {
        pub fn new(alarms: Vec<Alarm>) -> Self {
            Self {
                alarms: alarms.into_iter().map(AlarmDTO::new).collect(),
            }
        }
    }
}
