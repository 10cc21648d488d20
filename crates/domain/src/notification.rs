use crate::alarm::FireOutcome;
use crate::shared::entity::ID;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ChannelOutcome {
    Delivered,
    /// The channel rejected the notification, retrying would not help
    PermanentFailure { reason: String },
    /// The channel kept failing until the attempt ceiling was reached
    RetriesExhausted { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDelivery {
    pub channel: String,
    pub attempts: u32,
    pub outcome: ChannelOutcome,
}

impl ChannelDelivery {
    pub fn is_delivered(&self) -> bool {
        self.outcome == ChannelOutcome::Delivered
    }
}

/// Per channel result of delivering one occurrence of an alarm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub alarm_id: ID,
    pub deliveries: Vec<ChannelDelivery>,
}

impl DeliveryReport {
    pub fn new(alarm_id: ID) -> Self {
        Self {
            alarm_id,
            deliveries: Vec::new(),
        }
    }

    pub fn delivered_count(&self) -> usize {
        self.deliveries.iter().filter(|d| d.is_delivered()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.deliveries.len() - self.delivered_count()
    }

    /// Partial success counts as success
    pub fn any_delivered(&self) -> bool {
        self.delivered_count() > 0
    }

    fn failure_summary(&self) -> String {
        if self.deliveries.is_empty() {
            return "No delivery channels are configured".into();
        }
        self.deliveries
            .iter()
            .filter_map(|d| match &d.outcome {
                ChannelOutcome::Delivered => None,
                ChannelOutcome::PermanentFailure { reason }
                | ChannelOutcome::RetriesExhausted { reason } => {
                    Some(format!("{}: {}", d.channel, reason))
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn outcome(&self) -> FireOutcome {
        if self.any_delivered() {
            FireOutcome::Delivered
        } else {
            FireOutcome::Failed(self.failure_summary())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn delivery(channel: &str, outcome: ChannelOutcome) -> ChannelDelivery {
        ChannelDelivery {
            channel: channel.into(),
            attempts: 1,
            outcome,
        }
    }

    #[test]
    fn partial_success_is_delivered() {
        let mut report = DeliveryReport::new(ID::new());
        report.deliveries.push(delivery("stdout", ChannelOutcome::Delivered));
        report.deliveries.push(delivery(
            "chat",
            ChannelOutcome::PermanentFailure {
                reason: "403".into(),
            },
        ));
        assert_eq!(report.delivered_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.outcome(), FireOutcome::Delivered);
    }

    #[test]
    fn all_failures_are_summarized() {
        let mut report = DeliveryReport::new(ID::new());
        report.deliveries.push(delivery(
            "chat",
            ChannelOutcome::RetriesExhausted {
                reason: "timeout".into(),
            },
        ));
        report.deliveries.push(delivery(
            "stdout",
            ChannelOutcome::PermanentFailure {
                reason: "closed".into(),
            },
        ));
        assert_eq!(
            report.outcome(),
            FireOutcome::Failed("chat: timeout; stdout: closed".into())
        );

        let empty = DeliveryReport::new(ID::new());
        assert!(matches!(empty.outcome(), FireOutcome::Failed(_)));
    }
}
