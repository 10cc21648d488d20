mod stdout;
mod webhook;

use crate::config::Config;
use chime_scheduler_domain::ID;
pub use stdout::StdoutChannel;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
pub use webhook::WebhookChannel;

/// What a channel is asked to deliver for one occurrence of an alarm
#[derive(Debug, Clone)]
pub struct Notification {
    pub alarm_id: ID,
    /// Chat channel the alarm was created from
    pub channel_id: Option<String>,
    pub text: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    /// Worth retrying
    #[error("Transient delivery failure: {0}")]
    Transient(String),
    #[error("Permanent delivery failure: {0}")]
    Permanent(String),
}

/// A sink notifications can be sent to, e.g. stdout or a chat
#[async_trait::async_trait]
pub trait IDeliveryChannel: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// The channels enabled by the given `Config`
pub fn build_channels(config: &Config) -> anyhow::Result<Vec<Arc<dyn IDeliveryChannel>>> {
    let mut channels: Vec<Arc<dyn IDeliveryChannel>> = Vec::new();
    if config.stdout_delivery {
        channels.push(Arc::new(StdoutChannel::new()));
    }
    if let Some(webhook) = &config.chat_webhook {
        info!("Alarms will be delivered to the chat webhook: {}", webhook.url);
        channels.push(Arc::new(WebhookChannel::new(webhook.clone())?));
    }
    Ok(channels)
}
