use crate::{APIResponse, BaseClient};
use chime_scheduler_api_structs::*;
use chime_scheduler_domain::{RecurrenceRule, ID};
use reqwest::StatusCode;
use std::sync::Arc;

#[derive(Clone)]
pub struct AlarmClient {
    base: Arc<BaseClient>,
}

pub struct CreateAlarmInput {
    pub owner_id: String,
    pub channel_id: Option<String>,
    pub message: String,
    pub scheduled_ts: Option<i64>,
    pub timezone: Option<String>,
    pub recurrence: Option<RecurrenceRule>,
}

#[derive(Default)]
pub struct UpdateAlarmInput {
    pub alarm_id: ID,
    pub message: Option<String>,
    pub scheduled_ts: Option<i64>,
    pub timezone: Option<String>,
    pub recurrence: Option<RecurrenceRule>,
    pub remove_recurrence: bool,
}

pub struct GetOwnerAlarmsInput {
    pub owner_id: String,
    pub include_past: bool,
}

impl AlarmClient {
    pub(crate) fn new(base: Arc<BaseClient>) -> Self {
        Self { base }
    }

    pub async fn create(&self, input: CreateAlarmInput) -> APIResponse<create_alarm::APIResponse> {
        let body = create_alarm::RequestBody {
            owner_id: input.owner_id,
            channel_id: input.channel_id,
            message: input.message,
            scheduled_ts: input.scheduled_ts,
            timezone: input.timezone,
            recurrence: input.recurrence,
        };
        self.base
            .post(body, "alarms".into(), StatusCode::CREATED)
            .await
    }

    pub async fn get(&self, alarm_id: ID) -> APIResponse<get_alarm::APIResponse> {
        self.base
            .get(format!("alarms/{}", alarm_id), StatusCode::OK)
            .await
    }

    pub async fn update(&self, input: UpdateAlarmInput) -> APIResponse<update_alarm::APIResponse> {
        let body = update_alarm::RequestBody {
            message: input.message,
            scheduled_ts: input.scheduled_ts,
            timezone: input.timezone,
            recurrence: input.recurrence,
            remove_recurrence: input.remove_recurrence,
        };
        self.base
            .put(body, format!("alarms/{}", input.alarm_id), StatusCode::OK)
            .await
    }

    pub async fn cancel(&self, alarm_id: ID) -> APIResponse<cancel_alarm::APIResponse> {
        self.base
            .post((), format!("alarms/{}/cancel", alarm_id), StatusCode::OK)
            .await
    }

    pub async fn delete(&self, alarm_id: ID) -> APIResponse<delete_alarm::APIResponse> {
        self.base
            .delete(format!("alarms/{}", alarm_id), StatusCode::OK)
            .await
    }

    pub async fn get_by_owner(
        &self,
        input: GetOwnerAlarmsInput,
    ) -> APIResponse<get_owner_alarms::APIResponse> {
        self.base
            .get(
                format!(
                    "owners/{}/alarms?includePast={}",
                    input.owner_id, input.include_past
                ),
                StatusCode::OK,
            )
            .await
    }
}
