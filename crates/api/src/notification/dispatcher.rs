use actix_web::rt::time::sleep;
use chime_scheduler_domain::{Alarm, ChannelDelivery, ChannelOutcome, DeliveryReport};
use chime_scheduler_infra::{DeliveryConfig, DeliveryError, IDeliveryChannel, Notification};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Exponential backoff between attempts on the same channel
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per channel, including the first one
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    /// Delay after the failed attempt number `attempt`, counted from 1
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        std::cmp::min(self.base.saturating_mul(factor), self.max)
    }
}

impl From<&DeliveryConfig> for RetryPolicy {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base: Duration::from_millis(config.backoff_base_millis),
            max: Duration::from_millis(config.backoff_max_millis),
        }
    }
}

/// Delivers one occurrence of an alarm to every configured channel. The
/// channels are independent of each other, a failing channel never stops
/// delivery to the others. It never touches the stored state of the alarm.
pub struct NotificationDispatcher {
    channels: Vec<Arc<dyn IDeliveryChannel>>,
    policy: RetryPolicy,
}

impl NotificationDispatcher {
    pub fn new(channels: Vec<Arc<dyn IDeliveryChannel>>, policy: RetryPolicy) -> Self {
        Self { channels, policy }
    }

    pub async fn deliver(&self, alarm: &Alarm) -> DeliveryReport {
        let notification = Notification {
            alarm_id: alarm.id.clone(),
            channel_id: alarm.channel_id.clone(),
            text: alarm.notification_text(),
        };

        let deliveries = join_all(
            self.channels
                .iter()
                .map(|channel| self.deliver_to(channel.as_ref(), &notification)),
        )
        .await;

        let mut report = DeliveryReport::new(alarm.id.clone());
        report.deliveries = deliveries;
        report
    }

    async fn deliver_to(
        &self,
        channel: &dyn IDeliveryChannel,
        notification: &Notification,
    ) -> ChannelDelivery {
        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            match channel.send(notification).await {
                Ok(()) => break ChannelOutcome::Delivered,
                Err(DeliveryError::Permanent(reason)) => {
                    warn!(
                        "Channel: {} rejected alarm: {}: {}",
                        channel.name(),
                        notification.alarm_id,
                        reason
                    );
                    break ChannelOutcome::PermanentFailure { reason };
                }
                Err(DeliveryError::Transient(reason)) => {
                    if attempts >= self.policy.max_attempts {
                        warn!(
                            "Giving up on channel: {} for alarm: {} after {} attempts: {}",
                            channel.name(),
                            notification.alarm_id,
                            attempts,
                            reason
                        );
                        break ChannelOutcome::RetriesExhausted { reason };
                    }
                    let delay = self.policy.backoff(attempts);
                    info!(
                        "Attempt {} on channel: {} failed: {}. Retrying in {:?}",
                        attempts,
                        channel.name(),
                        reason,
                        delay
                    );
                    sleep(delay).await;
                }
            }
        };

        ChannelDelivery {
            channel: channel.name().to_string(),
            attempts,
            outcome,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chime_scheduler_domain::{FireOutcome, NewAlarm};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Fails with the given errors first, then succeeds
    struct ScriptedChannel {
        name: String,
        failures: Mutex<Vec<DeliveryError>>,
        calls: AtomicU32,
        received: Mutex<Vec<String>>,
    }

    impl ScriptedChannel {
        fn new(name: &str, mut failures: Vec<DeliveryError>) -> Arc<Self> {
            failures.reverse();
            Arc::new(Self {
                name: name.into(),
                failures: Mutex::new(failures),
                calls: AtomicU32::new(0),
                received: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl IDeliveryChannel for ScriptedChannel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = self.failures.lock().unwrap().pop() {
                return Err(e);
            }
            self.received.lock().unwrap().push(notification.text.clone());
            Ok(())
        }
    }

    fn channels(list: &[&Arc<ScriptedChannel>]) -> Vec<Arc<dyn IDeliveryChannel>> {
        list.iter()
            .map(|c| Arc::clone(*c) as Arc<dyn IDeliveryChannel>)
            .collect()
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base: Duration::from_millis(1),
            max: Duration::from_millis(4),
        }
    }

    fn alarm() -> Alarm {
        Alarm::new(
            NewAlarm {
                owner_id: "alice".into(),
                channel_id: Some("general".into()),
                message: "Standup".into(),
                scheduled_ts: Some(1000),
                timezone: chrono_tz::UTC,
                recurrence: None,
            },
            0,
        )
        .unwrap()
    }

    #[test]
    fn backoff_doubles_up_to_max() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base: Duration::from_millis(500),
            max: Duration::from_millis(3000),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff(4), Duration::from_millis(3000));
        assert_eq!(policy.backoff(40), Duration::from_millis(3000));
    }

    #[actix_web::main]
    #[test]
    async fn failing_channel_does_not_block_the_others() {
        let healthy = ScriptedChannel::new("stdout", vec![]);
        let broken = ScriptedChannel::new(
            "chat",
            vec![DeliveryError::Permanent("channel not found".into())],
        );
        let dispatcher = NotificationDispatcher::new(channels(&[&healthy, &broken]), policy());

        let alarm = alarm();
        let report = dispatcher.deliver(&alarm).await;
        assert_eq!(report.alarm_id, alarm.id);
        assert_eq!(report.delivered_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.outcome(), FireOutcome::Delivered);
        assert_eq!(
            report.deliveries[1].outcome,
            ChannelOutcome::PermanentFailure {
                reason: "channel not found".into()
            }
        );
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            healthy.received.lock().unwrap().clone(),
            vec![alarm.notification_text()]
        );
    }

    #[actix_web::main]
    #[test]
    async fn retries_transient_failures() {
        let flaky = ScriptedChannel::new(
            "chat",
            vec![
                DeliveryError::Transient("502".into()),
                DeliveryError::Transient("timeout".into()),
            ],
        );
        let dispatcher = NotificationDispatcher::new(channels(&[&flaky]), policy());
        let report = dispatcher.deliver(&alarm()).await;
        assert_eq!(report.deliveries[0].attempts, 3);
        assert!(report.any_delivered());
    }

    #[actix_web::main]
    #[test]
    async fn gives_up_after_max_attempts() {
        let down = ScriptedChannel::new(
            "chat",
            vec![DeliveryError::Transient("503".into()); 5],
        );
        let dispatcher = NotificationDispatcher::new(channels(&[&down]), policy());
        let report = dispatcher.deliver(&alarm()).await;
        assert_eq!(down.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            report.deliveries[0].outcome,
            ChannelOutcome::RetriesExhausted {
                reason: "503".into()
            }
        );
        assert!(matches!(report.outcome(), FireOutcome::Failed(_)));
    }

    #[actix_web::main]
    #[test]
    async fn no_channels_is_a_failure() {
        let dispatcher = NotificationDispatcher::new(Vec::new(), policy());
        let report = dispatcher.deliver(&alarm()).await;
        assert!(matches!(report.outcome(), FireOutcome::Failed(_)));
    }
}
