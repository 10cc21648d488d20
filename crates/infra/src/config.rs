use chime_scheduler_domain::SuggestionOptions;
use chrono::NaiveTime;
use chrono_tz::Tz;
use std::{fmt::Display, str::FromStr};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base url of an OpenAI compatible api, e.g. `https://api.openai.com/v1`
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct ChatWebhookConfig {
    pub url: String,
    /// Sent in the `chime-webhook-key` header so that the receiver can
    /// verify the sender
    pub key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Attempts per channel, including the first one
    pub max_attempts: u32,
    pub backoff_base_millis: u64,
    pub backoff_max_millis: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the application to run on
    pub port: usize,
    /// Seconds between two passes of the alarm scheduler
    pub scheduler_poll_interval_secs: u64,
    /// A claim older than this is considered abandoned by a crashed worker
    /// and the alarm is made pending again
    pub claim_timeout_millis: i64,
    pub delivery: DeliveryConfig,
    pub suggestion_step_millis: i64,
    pub suggestion_preferred_time: Option<NaiveTime>,
    /// Maximum allowed duration in millis of a suggestion search window.
    /// This is used to avoid having clients ask for suggestions in a
    /// timespan of several years which will take a lot of time to compute.
    pub suggestion_window_limit_millis: i64,
    /// Timezone used when a request does not name one
    pub default_timezone: Tz,
    /// How long a pending alarm is considered to occupy its owner
    pub alarm_busy_millis: i64,
    pub llm: Option<LlmConfig>,
    pub chat_webhook: Option<ChatWebhookConfig>,
    pub stdout_delivery: bool,
}

/// Reads `name` from the environment and falls back to `default` when it
/// is missing or can not be parsed.
fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
{
    match std::env::var(name) {
        Ok(value) => match value.parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    "The given {}: {} is not valid, falling back to the default value: {}.",
                    name, value, default
                );
                default
            }
        },
        Err(_) => default,
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn new() -> Self {
        let port = env_or("PORT", 5000);
        let scheduler_poll_interval_secs = env_or("SCHEDULER_POLL_INTERVAL_SECS", 5u64).max(1);
        let claim_timeout_secs = env_or("CLAIM_TIMEOUT_SECS", 300i64);
        let delivery = DeliveryConfig {
            max_attempts: env_or("DELIVERY_MAX_ATTEMPTS", 4u32).max(1),
            backoff_base_millis: env_or("DELIVERY_BACKOFF_BASE_MILLIS", 500u64),
            backoff_max_millis: env_or("DELIVERY_BACKOFF_MAX_MILLIS", 8000u64),
        };
        let suggestion_step_minutes = env_or("SUGGESTION_STEP_MINUTES", 15i64).max(1);

        let suggestion_preferred_time = optional_env("SUGGESTION_PREFERRED_TIME").and_then(|t| {
            match NaiveTime::parse_from_str(&t, "%H:%M") {
                Ok(time) => Some(time),
                Err(_) => {
                    warn!(
                        "The given SUGGESTION_PREFERRED_TIME: {} is not a valid HH:MM time, ignoring it.",
                        t
                    );
                    None
                }
            }
        });

        let default_timezone = env_or("DEFAULT_TIMEZONE", Tz::UTC);
        let alarm_busy_minutes = env_or("ALARM_BUSY_MINUTES", 30i64);

        let llm = match optional_env("LLM_API_URL") {
            Some(api_url) => Some(LlmConfig {
                api_url,
                api_key: optional_env("LLM_API_KEY"),
                model: optional_env("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".into()),
            }),
            None => {
                info!("Did not find LLM_API_URL environment variable. Suggestions will be heuristic only.");
                None
            }
        };

        let chat_webhook = optional_env("CHAT_WEBHOOK_URL").map(|url| ChatWebhookConfig {
            url,
            key: optional_env("CHAT_WEBHOOK_KEY"),
        });
        let stdout_delivery = env_or("STDOUT_DELIVERY", true);
        if chat_webhook.is_none() && !stdout_delivery {
            warn!("No delivery channels are enabled, every alarm will fail to deliver.");
        }

        Self {
            port,
            scheduler_poll_interval_secs,
            claim_timeout_millis: claim_timeout_secs * 1000,
            delivery,
            suggestion_step_millis: suggestion_step_minutes * 1000 * 60,
            suggestion_preferred_time,
            suggestion_window_limit_millis: 1000 * 60 * 60 * 24 * 14, // 14 days
            default_timezone,
            alarm_busy_millis: alarm_busy_minutes * 1000 * 60,
            llm,
            chat_webhook,
            stdout_delivery,
        }
    }

    /// Heuristic options used for a request in `timezone`
    pub fn suggestion_options(&self, timezone: Tz) -> SuggestionOptions {
        SuggestionOptions {
            step_millis: self.suggestion_step_millis,
            preferred_time: self.suggestion_preferred_time,
            timezone,
            ..Default::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
