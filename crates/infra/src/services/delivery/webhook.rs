use super::{DeliveryError, IDeliveryChannel, Notification};
use crate::config::ChatWebhookConfig;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

const WEBHOOK_KEY_HEADER: &str = "chime-webhook-key";

/// Posts notifications to a chat integration
pub struct WebhookChannel {
    client: reqwest::Client,
    config: ChatWebhookConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    content: &'a str,
    channel_id: Option<&'a str>,
    alarm_id: String,
}

/// Server errors and rate limiting are worth another attempt, any other
/// rejection is final.
fn classify_status(status: StatusCode) -> Result<(), DeliveryError> {
    if status.is_success() {
        Ok(())
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(DeliveryError::Transient(format!("status code {}", status)))
    } else {
        Err(DeliveryError::Permanent(format!("status code {}", status)))
    }
}

impl WebhookChannel {
    pub fn new(config: ChatWebhookConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait::async_trait]
impl IDeliveryChannel for WebhookChannel {
    fn name(&self) -> &str {
        "chat"
    }

    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let payload = WebhookPayload {
            content: &notification.text,
            channel_id: notification.channel_id.as_deref(),
            alarm_id: notification.alarm_id.as_string(),
        };
        let mut req = self.client.post(&self.config.url).json(&payload);
        if let Some(key) = &self.config.key {
            req = req.header(WEBHOOK_KEY_HEADER, key);
        }
        let res = req
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(e.to_string()))?;
        classify_status(res.status())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classifies_status_codes() {
        assert!(classify_status(StatusCode::NO_CONTENT).is_ok());
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY),
            Err(DeliveryError::Transient(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            Err(DeliveryError::Transient(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN),
            Err(DeliveryError::Permanent(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_webhook_is_transient() {
        let channel = WebhookChannel::new(ChatWebhookConfig {
            // Nothing listens on port 9 locally
            url: "http://127.0.0.1:9/hook".into(),
            key: Some("secret".into()),
        })
        .unwrap();
        let res = channel
            .send(&Notification {
                alarm_id: Default::default(),
                channel_id: None,
                text: "Reminder: test".into(),
            })
            .await;
        assert!(matches!(res, Err(DeliveryError::Transient(_))));
    }
}
