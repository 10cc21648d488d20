use crate::notification::{NotificationDispatcher, RetryPolicy};
use crate::shared::usecase::UseCase;
use chime_scheduler_domain::{Alarm, AlarmStatus, FireOutcome};
use chime_scheduler_infra::{ChimeContext, StoreError};
use futures::future::join_all;
use tracing::{error, info, warn};

/// One pass of the alarm scheduler: gives back abandoned claims, claims
/// every due alarm and delivers the claimed occurrences concurrently.
#[derive(Debug)]
pub struct ProcessDueAlarmsUseCase;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessDueAlarmsReport {
    /// Stale claims made pending again
    pub released: usize,
    pub claimed: usize,
    /// One-off alarms that are done
    pub fired: usize,
    /// Recurring alarms moved to their next occurrence
    pub rearmed: usize,
    pub failed: usize,
    /// Due alarms someone else claimed or changed first
    pub skipped: usize,
}

#[derive(Debug)]
pub enum UseCaseError {
    Storage,
}

enum Completion {
    Fired,
    Rearmed,
    Failed,
    Lost,
}

async fn fire(alarm: Alarm, dispatcher: &NotificationDispatcher, ctx: &ChimeContext) -> Completion {
    let report = dispatcher.deliver(&alarm).await;
    let outcome = report.outcome();
    if let FireOutcome::Failed(reason) = &outcome {
        error!("Unable to deliver alarm: {} to any channel: {}", alarm.id, reason);
    }

    match ctx.store.complete(&alarm, outcome).await {
        Ok(completed) => match completed.status {
            AlarmStatus::Pending => Completion::Rearmed,
            AlarmStatus::Fired => Completion::Fired,
            _ => Completion::Failed,
        },
        Err(e) => {
            // The claim goes stale and a later pass delivers the occurrence again
            error!("Unable to complete alarm: {}: {}", alarm.id, e);
            Completion::Lost
        }
    }
}

#[async_trait::async_trait(?Send)]
impl UseCase for ProcessDueAlarmsUseCase {
    type Response = ProcessDueAlarmsReport;

    type Error = UseCaseError;

    const NAME: &'static str = "ProcessDueAlarms";

    async fn execute(&mut self, ctx: &ChimeContext) -> Result<Self::Response, Self::Error> {
        let now = ctx.sys.get_timestamp_millis();
        let mut report = ProcessDueAlarmsReport::default();

        match ctx
            .store
            .release_stale_claims(now - ctx.config.claim_timeout_millis)
            .await
        {
            Ok(released) => report.released = released.len(),
            Err(e) => warn!("Unable to release stale claims: {}", e),
        }

        let due = ctx.store.list_due(now).await.map_err(|e| {
            error!("Unable to list due alarms: {}", e);
            UseCaseError::Storage
        })?;

        let mut claimed = Vec::with_capacity(due.len());
        for alarm in due {
            match ctx.store.claim(&alarm.id, alarm.scheduled_ts).await {
                Ok(alarm) => claimed.push(alarm),
                Err(StoreError::Conflict(_)) | Err(StoreError::NotFound(_)) => report.skipped += 1,
                Err(e) => {
                    error!("Unable to claim alarm: {}: {}", alarm.id, e);
                    report.skipped += 1;
                }
            }
        }
        report.claimed = claimed.len();

        let dispatcher =
            NotificationDispatcher::new(ctx.channels.clone(), RetryPolicy::from(&ctx.config.delivery));
        let completions =
            join_all(claimed.into_iter().map(|alarm| fire(alarm, &dispatcher, ctx))).await;
        for completion in completions {
            match completion {
                Completion::Fired => report.fired += 1,
                Completion::Rearmed => report.rearmed += 1,
                Completion::Failed => report.failed += 1,
                Completion::Lost => {}
            }
        }

        if report.claimed > 0 || report.released > 0 {
            info!("Scheduler pass finished: {:?}", report);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::shared::usecase::execute;
    use chime_scheduler_domain::{NewAlarm, RecurrenceRule};
    use chime_scheduler_infra::{
        DeliveryError, DisabledOracle, IDeliveryChannel, ManualSys, Notification,
    };
    use std::sync::{Arc, Mutex};

    const MIN: i64 = 1000 * 60;

    #[derive(Default)]
    struct RecordingChannel {
        fail: bool,
        received: Mutex<Vec<Notification>>,
    }

    #[async_trait::async_trait]
    impl IDeliveryChannel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
            if self.fail {
                return Err(DeliveryError::Permanent("unreachable".into()));
            }
            self.received.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    struct TestContext {
        ctx: ChimeContext,
        sys: Arc<ManualSys>,
        channel: Arc<RecordingChannel>,
    }

    fn setup(fail: bool) -> TestContext {
        let sys = Arc::new(ManualSys::new(0));
        let channel = Arc::new(RecordingChannel {
            fail,
            ..Default::default()
        });
        let channels: Vec<Arc<dyn IDeliveryChannel>> = vec![channel.clone()];
        let ctx = ChimeContext::create_for_test(sys.clone(), Arc::new(DisabledOracle), channels);
        TestContext { ctx, sys, channel }
    }

    async fn create(ctx: &ChimeContext, scheduled_ts: i64, recurrence: Option<RecurrenceRule>) -> Alarm {
        let alarm = Alarm::new(
            NewAlarm {
                owner_id: "alice".into(),
                channel_id: None,
                message: "Take a break".into(),
                scheduled_ts: Some(scheduled_ts),
                timezone: chrono_tz::UTC,
                recurrence,
            },
            ctx.sys.get_timestamp_millis(),
        )
        .unwrap();
        ctx.store.create(alarm).await.unwrap()
    }

    #[actix_web::main]
    #[test]
    async fn fires_due_one_off_alarm_once() {
        let TestContext { ctx, sys, channel } = setup(false);
        let alarm = create(&ctx, MIN, None).await;

        let report = execute(ProcessDueAlarmsUseCase, &ctx).await.unwrap();
        assert_eq!(report.claimed, 0);

        sys.set(MIN);
        let report = execute(ProcessDueAlarmsUseCase, &ctx).await.unwrap();
        assert_eq!(report.claimed, 1);
        assert_eq!(report.fired, 1);
        let stored = ctx.store.get(&alarm.id).await.unwrap();
        assert_eq!(stored.status, AlarmStatus::Fired);
        assert_eq!(stored.fire_count, 1);

        sys.advance(MIN);
        let report = execute(ProcessDueAlarmsUseCase, &ctx).await.unwrap();
        assert_eq!(report.claimed, 0);
        assert_eq!(channel.received.lock().unwrap().len(), 1);
    }

    #[actix_web::main]
    #[test]
    async fn rearms_recurring_alarm_after_late_pass() {
        let TestContext { ctx, sys, channel } = setup(false);
        let rule = RecurrenceRule::Interval {
            every_millis: 10 * MIN,
            anchor_ts: 0,
        };
        let alarm = create(&ctx, 10 * MIN, Some(rule)).await;

        // The scheduler was down for a while
        sys.set(35 * MIN);
        let report = execute(ProcessDueAlarmsUseCase, &ctx).await.unwrap();
        assert_eq!(report.rearmed, 1);

        let stored = ctx.store.get(&alarm.id).await.unwrap();
        assert_eq!(stored.status, AlarmStatus::Pending);
        assert_eq!(stored.scheduled_ts, 40 * MIN);
        assert_eq!(channel.received.lock().unwrap().len(), 1);
    }

    #[actix_web::main]
    #[test]
    async fn failed_delivery_marks_one_off_alarm_failed() {
        let TestContext { ctx, sys, .. } = setup(true);
        let alarm = create(&ctx, MIN, None).await;

        sys.set(MIN);
        let report = execute(ProcessDueAlarmsUseCase, &ctx).await.unwrap();
        assert_eq!(report.failed, 1);
        let stored = ctx.store.get(&alarm.id).await.unwrap();
        assert_eq!(stored.status, AlarmStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some("recording: unreachable"));
    }

    #[actix_web::main]
    #[test]
    async fn skips_cancelled_and_claimed_alarms() {
        let TestContext { ctx, sys, channel } = setup(false);
        let cancelled = create(&ctx, MIN, None).await;
        let in_flight = create(&ctx, MIN, None).await;
        ctx.store.cancel(&cancelled.id).await.unwrap();

        sys.set(MIN);
        ctx.store.claim(&in_flight.id, MIN).await.unwrap();
        let report = execute(ProcessDueAlarmsUseCase, &ctx).await.unwrap();
        assert_eq!(report.claimed, 0);
        assert!(channel.received.lock().unwrap().is_empty());
    }

    #[actix_web::main]
    #[test]
    async fn releases_abandoned_claims() {
        let TestContext { ctx, sys, channel } = setup(false);
        let alarm = create(&ctx, MIN, None).await;

        sys.set(MIN);
        ctx.store.claim(&alarm.id, MIN).await.unwrap();

        sys.advance(ctx.config.claim_timeout_millis);
        let report = execute(ProcessDueAlarmsUseCase, &ctx).await.unwrap();
        assert_eq!(report.released, 1);
        assert_eq!(report.fired, 1);
        assert_eq!(channel.received.lock().unwrap().len(), 1);
    }
}
