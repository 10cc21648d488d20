use crate::error::ChimeError;
use crate::shared::usecase::{execute, UseCase};
use actix_web::{web, HttpResponse};
use chime_scheduler_api_structs::create_alarm::*;
use chime_scheduler_domain::{Alarm, NewAlarm, RecurrenceRule};
use chime_scheduler_infra::{ChimeContext, StoreError};
use chrono_tz::Tz;

pub async fn create_alarm_controller(
    body: web::Json<RequestBody>,
    ctx: web::Data<ChimeContext>,
) -> Result<HttpResponse, ChimeError> {
    let body = body.0;
    let usecase = CreateAlarmUseCase {
        owner_id: body.owner_id,
        channel_id: body.channel_id,
        message: body.message,
        scheduled_ts: body.scheduled_ts,
        timezone: body.timezone,
        recurrence: body.recurrence,
    };

    execute(usecase, &ctx)
        .await
        .map(|alarm| HttpResponse::Created().json(APIResponse::new(alarm)))
        .map_err(ChimeError::from)
}

#[derive(Debug)]
pub struct CreateAlarmUseCase {
    pub owner_id: String,
    pub channel_id: Option<String>,
    pub message: String,
    pub scheduled_ts: Option<i64>,
    pub timezone: Option<String>,
    pub recurrence: Option<RecurrenceRule>,
}

#[derive(Debug, PartialEq)]
pub enum UseCaseError {
    InvalidTimezone(String),
    InvalidAlarm(String),
    Storage,
}

impl From<UseCaseError> for ChimeError {
    fn from(e: UseCaseError) -> Self {
        match e {
            UseCaseError::InvalidTimezone(tz) => Self::BadClientData(format!(
                "Invalid timezone: {}. It should be a valid IANA TimeZone.",
                tz
            )),
            UseCaseError::InvalidAlarm(msg) => Self::BadClientData(msg),
            UseCaseError::Storage => Self::InternalError,
        }
    }
}

impl From<StoreError> for UseCaseError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(e) => Self::InvalidAlarm(e.to_string()),
            _ => Self::Storage,
        }
    }
}

/// Resolves an optional IANA name, falling back to `default`
pub fn parse_timezone(timezone: Option<&str>, default: Tz) -> Result<Tz, String> {
    match timezone {
        Some(name) => name.parse::<Tz>().map_err(|_| name.to_string()),
        None => Ok(default),
    }
}

#[async_trait::async_trait(?Send)]
impl UseCase for CreateAlarmUseCase {
    type Response = Alarm;

    type Error = UseCaseError;

    const NAME: &'static str = "CreateAlarm";

    async fn execute(&mut self, ctx: &ChimeContext) -> Result<Self::Response, Self::Error> {
        let timezone = parse_timezone(self.timezone.as_deref(), ctx.config.default_timezone)
            .map_err(UseCaseError::InvalidTimezone)?;

        let input = NewAlarm {
            owner_id: self.owner_id.clone(),
            channel_id: self.channel_id.clone(),
            message: self.message.clone(),
            scheduled_ts: self.scheduled_ts,
            timezone,
            recurrence: self.recurrence.clone(),
        };
        let alarm = Alarm::new(input, ctx.sys.get_timestamp_millis())
            .map_err(|e| UseCaseError::InvalidAlarm(e.to_string()))?;

        Ok(ctx.store.create(alarm).await?)
    }
}
