use crate::scheduler::process_due_alarms::ProcessDueAlarmsUseCase;
use crate::shared::usecase::execute;
use actix_web::rt::time::interval;
use chime_scheduler_infra::ChimeContext;
use std::time::Duration;
use tracing::info;

/// Runs a scheduler pass every `scheduler_poll_interval_secs`. Passes may
/// overlap when deliveries are slow, claims keep them from firing the
/// same occurrence twice.
pub fn start_alarm_scheduler_job(ctx: ChimeContext) {
    actix_web::rt::spawn(async move {
        let period = Duration::from_secs(ctx.config.scheduler_poll_interval_secs.max(1));
        info!("Alarm scheduler polls every {:?}", period);
        let mut interval = interval(period);
        loop {
            interval.tick().await;
            let context = ctx.clone();
            actix_web::rt::spawn(async move {
                let _ = execute(ProcessDueAlarmsUseCase, &context).await;
            });
        }
    });
}
