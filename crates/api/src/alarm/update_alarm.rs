use super::create_alarm::parse_timezone;
use crate::error::ChimeError;
use crate::shared::usecase::{execute, UseCase};
use actix_web::{web, HttpResponse};
use chime_scheduler_api_structs::update_alarm::*;
use chime_scheduler_domain::{
    Alarm, AlarmStateError, AlarmStatus, AlarmValidationError, RecurrenceRule, ID,
};
use chime_scheduler_infra::{ChimeContext, StoreError};
use chrono_tz::Tz;

pub async fn update_alarm_controller(
    path: web::Path<PathParams>,
    body: web::Json<RequestBody>,
    ctx: web::Data<ChimeContext>,
) -> Result<HttpResponse, ChimeError> {
    let body = body.0;
    let usecase = UpdateAlarmUseCase {
        alarm_id: path.alarm_id.clone(),
        message: body.message,
        scheduled_ts: body.scheduled_ts,
        timezone: body.timezone,
        recurrence: body.recurrence,
        remove_recurrence: body.remove_recurrence,
    };

    execute(usecase, &ctx)
        .await
        .map(|alarm| HttpResponse::Ok().json(APIResponse::new(alarm)))
        .map_err(ChimeError::from)
}

#[derive(Debug, Default)]
pub struct UpdateAlarmUseCase {
    pub alarm_id: ID,
    pub message: Option<String>,
    pub scheduled_ts: Option<i64>,
    pub timezone: Option<String>,
    pub recurrence: Option<RecurrenceRule>,
    pub remove_recurrence: bool,
}

#[derive(Debug)]
pub enum UseCaseError {
    NotFound(ID),
    InvalidTimezone(String),
    InvalidAlarm(String),
    Conflict(String),
    Storage,
}

impl From<UseCaseError> for ChimeError {
    fn from(e: UseCaseError) -> Self {
        match e {
            UseCaseError::NotFound(id) => {
                Self::NotFound(format!("The alarm with id: {}, was not found.", id))
            }
            UseCaseError::InvalidTimezone(tz) => Self::BadClientData(format!(
                "Invalid timezone: {}. It should be a valid IANA TimeZone.",
                tz
            )),
            UseCaseError::InvalidAlarm(msg) => Self::BadClientData(msg),
            UseCaseError::Conflict(msg) => Self::Conflict(msg),
            UseCaseError::Storage => Self::InternalError,
        }
    }
}

impl From<StoreError> for UseCaseError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Validation(e) => Self::InvalidAlarm(e.to_string()),
            StoreError::Conflict(e) => Self::Conflict(e.to_string()),
            StoreError::Storage(_) => Self::Storage,
        }
    }
}

/// The instant a changed alarm should be scheduled at, if it changes.
/// `rule_changed` is set when the rule or the timezone it is evaluated in
/// was updated.
fn next_scheduled_ts(
    alarm: &Alarm,
    scheduled_ts: Option<i64>,
    rule_changed: bool,
    now: i64,
) -> Result<Option<i64>, AlarmValidationError> {
    let next = match (scheduled_ts, &alarm.recurrence) {
        (Some(ts), Some(rule)) if ts < now => Some(rule.next_after(now, &alarm.timezone)?),
        (Some(ts), None) if ts < now => {
            return Err(AlarmValidationError::InThePast {
                scheduled_ts: ts,
                now,
            })
        }
        (Some(ts), _) => Some(ts),
        (None, Some(rule)) if rule_changed && alarm.status == AlarmStatus::Pending => {
            Some(rule.next_after(now, &alarm.timezone)?)
        }
        (None, _) => None,
    };
    Ok(next)
}

#[async_trait::async_trait(?Send)]
impl UseCase for UpdateAlarmUseCase {
    type Response = Alarm;

    type Error = UseCaseError;

    const NAME: &'static str = "UpdateAlarm";

    async fn execute(&mut self, ctx: &ChimeContext) -> Result<Self::Response, Self::Error> {
        let timezone: Option<Tz> = match &self.timezone {
            Some(name) => Some(
                parse_timezone(Some(name), ctx.config.default_timezone)
                    .map_err(UseCaseError::InvalidTimezone)?,
            ),
            None => None,
        };
        let now = ctx.sys.get_timestamp_millis();
        let message = &self.message;
        let scheduled_ts = self.scheduled_ts;
        let recurrence = &self.recurrence;
        let remove_recurrence = self.remove_recurrence;

        let mutate = |alarm: &mut Alarm| -> Result<(), StoreError> {
            if alarm.status == AlarmStatus::Firing {
                return Err(AlarmStateError::InFlight.into());
            }
            if let Some(message) = message {
                alarm.message = message.clone();
            }
            if let Some(timezone) = timezone {
                alarm.timezone = timezone;
            }
            if remove_recurrence {
                alarm.recurrence = None;
            }
            if let Some(rule) = recurrence {
                rule.validate().map_err(AlarmValidationError::from)?;
                alarm.recurrence = Some(rule.clone());
            }
            let rule_changed = recurrence.is_some() || timezone.is_some();
            if let Some(ts) = next_scheduled_ts(alarm, scheduled_ts, rule_changed, now)? {
                alarm.reschedule(ts, now)?;
            }
            Ok(())
        };

        Ok(ctx.store.update(&self.alarm_id, &mutate).await?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chime_scheduler_domain::{FireOutcome, NewAlarm};
    use chime_scheduler_infra::{DisabledOracle, ManualSys};
    use chrono::NaiveTime;
    use std::sync::Arc;

    const HOUR: i64 = 1000 * 60 * 60;

    async fn setup() -> (ChimeContext, Arc<ManualSys>, Alarm) {
        let sys = Arc::new(ManualSys::new(0));
        let ctx = ChimeContext::create_for_test(sys.clone(), Arc::new(DisabledOracle), Vec::new());
        let alarm = Alarm::new(
            NewAlarm {
                owner_id: "alice".into(),
                channel_id: None,
                message: "Call mom".into(),
                scheduled_ts: Some(HOUR),
                timezone: chrono_tz::UTC,
                recurrence: None,
            },
            0,
        )
        .unwrap();
        let alarm = ctx.store.create(alarm).await.unwrap();
        (ctx, sys, alarm)
    }

    #[actix_web::main]
    #[test]
    async fn updates_message_and_time() {
        let (ctx, _, alarm) = setup().await;
        let usecase = UpdateAlarmUseCase {
            alarm_id: alarm.id.clone(),
            message: Some("Call dad".into()),
            scheduled_ts: Some(2 * HOUR),
            ..Default::default()
        };
        let res = execute(usecase, &ctx).await.unwrap();
        assert_eq!(res.message, "Call dad");
        assert_eq!(res.scheduled_ts, 2 * HOUR);
        assert_eq!(res.status, AlarmStatus::Pending);
    }

    #[actix_web::main]
    #[test]
    async fn rescheduling_rearms_fired_alarm() {
        let (ctx, sys, alarm) = setup().await;
        sys.set(HOUR);
        let claimed = ctx.store.claim(&alarm.id, HOUR).await.unwrap();
        let fired = ctx
            .store
            .complete(&claimed, FireOutcome::Delivered)
            .await
            .unwrap();
        assert_eq!(fired.status, AlarmStatus::Fired);

        let usecase = UpdateAlarmUseCase {
            alarm_id: alarm.id.clone(),
            scheduled_ts: Some(3 * HOUR),
            ..Default::default()
        };
        let res = execute(usecase, &ctx).await.unwrap();
        assert_eq!(res.status, AlarmStatus::Pending);
        assert_eq!(res.scheduled_ts, 3 * HOUR);
    }

    #[actix_web::main]
    #[test]
    async fn rejects_reactivation_and_past_times() {
        let (ctx, _, alarm) = setup().await;

        let usecase = UpdateAlarmUseCase {
            alarm_id: alarm.id.clone(),
            scheduled_ts: Some(-HOUR),
            ..Default::default()
        };
        let res = execute(usecase, &ctx).await;
        assert!(matches!(res, Err(UseCaseError::InvalidAlarm(_))));

        ctx.store.cancel(&alarm.id).await.unwrap();
        let usecase = UpdateAlarmUseCase {
            alarm_id: alarm.id.clone(),
            scheduled_ts: Some(2 * HOUR),
            ..Default::default()
        };
        let res = execute(usecase, &ctx).await;
        assert!(matches!(res, Err(UseCaseError::Conflict(_))));
        let stored = ctx.store.get(&alarm.id).await.unwrap();
        assert_eq!(stored.status, AlarmStatus::Cancelled);
        assert_eq!(stored.scheduled_ts, HOUR);
    }

    #[actix_web::main]
    #[test]
    async fn rejects_update_while_firing() {
        let (ctx, sys, alarm) = setup().await;
        sys.set(HOUR);
        ctx.store.claim(&alarm.id, HOUR).await.unwrap();

        let usecase = UpdateAlarmUseCase {
            alarm_id: alarm.id.clone(),
            message: Some("Too late".into()),
            ..Default::default()
        };
        let res = execute(usecase, &ctx).await;
        assert!(matches!(res, Err(UseCaseError::Conflict(_))));
    }

    #[actix_web::main]
    #[test]
    async fn new_recurrence_moves_to_first_occurrence() {
        let (ctx, _, alarm) = setup().await;
        let usecase = UpdateAlarmUseCase {
            alarm_id: alarm.id.clone(),
            recurrence: Some(RecurrenceRule::Daily {
                time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                timezone: None,
            }),
            ..Default::default()
        };
        let res = execute(usecase, &ctx).await.unwrap();
        assert_eq!(res.scheduled_ts, 9 * HOUR);
        assert!(res.recurrence.is_some());
    }

    #[actix_web::main]
    #[test]
    async fn new_timezone_keeps_local_time_of_rule() {
        let (ctx, _, alarm) = setup().await;
        let usecase = UpdateAlarmUseCase {
            alarm_id: alarm.id.clone(),
            recurrence: Some(RecurrenceRule::Daily {
                time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                timezone: None,
            }),
            ..Default::default()
        };
        let res = execute(usecase, &ctx).await.unwrap();
        assert_eq!(res.scheduled_ts, 9 * HOUR);

        let usecase = UpdateAlarmUseCase {
            alarm_id: alarm.id.clone(),
            timezone: Some("America/New_York".into()),
            ..Default::default()
        };
        let res = execute(usecase, &ctx).await.unwrap();
        assert_eq!(res.timezone, chrono_tz::America::New_York);
        // 09:00 EST on 1970-01-01
        assert_eq!(res.scheduled_ts, 14 * HOUR);
        assert_eq!(res.status, AlarmStatus::Pending);
    }
}
