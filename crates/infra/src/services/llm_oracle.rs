use crate::config::LlmConfig;
use chime_scheduler_domain::TimeSpan;
use chrono::{DateTime, SecondsFormat, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = "You help people pick a time for a task. \
You are given the busy intervals of a person, a search window and the duration of the task. \
Answer with exactly one start time as an RFC 3339 timestamp and nothing else. \
The task must fit inside the window and must not overlap any busy interval.";

/// What the language model is asked about
#[derive(Debug, Clone)]
pub struct OracleQuery {
    pub busy: Vec<TimeSpan>,
    pub window: TimeSpan,
    pub duration: i64,
    pub hint: String,
    /// Timezone the person lives in, used to render the prompt
    pub timezone: Tz,
}

#[derive(Error, Debug, PartialEq)]
pub enum OracleError {
    #[error("The language model is unavailable: {0}")]
    Unavailable(String),
}

/// An external collaborator proposing at most one start time. Its answer
/// is untrusted and validated by the caller.
#[async_trait::async_trait]
pub trait ILlmOracle: Send + Sync {
    async fn propose(&self, query: &OracleQuery) -> Result<i64, OracleError>;
}

/// Used when no language model is configured
pub struct DisabledOracle;

#[async_trait::async_trait]
impl ILlmOracle for DisabledOracle {
    async fn propose(&self, _query: &OracleQuery) -> Result<i64, OracleError> {
        Err(OracleError::Unavailable(
            "no language model is configured".into(),
        ))
    }
}

/// Talks to an OpenAI compatible `/chat/completions` endpoint
pub struct OpenAiOracle {
    client: reqwest::Client,
    config: LlmConfig,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

fn format_ts(ts: i64, tz: &Tz) -> String {
    match tz.timestamp_millis_opt(ts).single() {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, false),
        None => ts.to_string(),
    }
}

fn user_prompt(query: &OracleQuery) -> String {
    let busy = if query.busy.is_empty() {
        "none".to_string()
    } else {
        query
            .busy
            .iter()
            .map(|b| {
                format!(
                    "- {} to {}",
                    format_ts(b.start(), &query.timezone),
                    format_ts(b.end(), &query.timezone)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "Window: {} to {}\nDuration: {} minutes\nBusy:\n{}\nRequest: {}",
        format_ts(query.window.start(), &query.timezone),
        format_ts(query.window.end(), &query.timezone),
        query.duration / (1000 * 60),
        busy,
        query.hint
    )
}

/// The answer must be a single RFC 3339 instant, possibly wrapped in
/// whitespace or quotes.
fn parse_answer(content: &str) -> Result<i64, OracleError> {
    let answer = content.trim().trim_matches(|c: char| c == '"' || c == '`').trim();
    DateTime::parse_from_rfc3339(answer)
        .map(|dt| dt.timestamp_millis())
        .map_err(|_| OracleError::Unavailable(format!("malformed answer: {}", answer)))
}

impl OpenAiOracle {
    pub fn new(config: LlmConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        info!(
            "Suggestions will consult the language model: {} at {}",
            config.model, config.api_url
        );
        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.api_url.trim_end_matches('/')
        )
    }
}

#[async_trait::async_trait]
impl ILlmOracle for OpenAiOracle {
    async fn propose(&self, query: &OracleQuery) -> Result<i64, OracleError> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt(query),
                },
            ],
            temperature: 0.0,
        };

        let mut req = self.client.post(self.completions_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }

        let res = req.send().await.map_err(|e| {
            warn!("Unable to reach the language model: {:?}", e);
            OracleError::Unavailable(e.to_string())
        })?;
        if !res.status().is_success() {
            warn!("Language model returned status: {}", res.status());
            return Err(OracleError::Unavailable(format!(
                "status code {}",
                res.status()
            )));
        }
        let completion = res
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| OracleError::Unavailable(e.to_string()))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OracleError::Unavailable("empty answer".into()))?;
        parse_answer(&content)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono_tz::Europe::Oslo;

    #[test]
    fn parses_rfc3339_answers() {
        assert_eq!(parse_answer("1970-01-01T00:00:01Z"), Ok(1000));
        assert_eq!(parse_answer("  \"1970-01-01T01:00:01+01:00\"\n"), Ok(1000));
        assert!(parse_answer("Tomorrow at nine").is_err());
        assert!(parse_answer("").is_err());
    }

    #[test]
    fn renders_prompt_in_local_time() {
        // 2021-06-01T08:00:00Z
        let start = 1622534400000;
        let hour = 1000 * 60 * 60;
        let query = OracleQuery {
            busy: vec![TimeSpan::create(start + hour, start + 2 * hour).unwrap()],
            window: TimeSpan::create(start, start + 4 * hour).unwrap(),
            duration: hour / 2,
            hint: "before lunch".into(),
            timezone: Oslo,
        };
        let prompt = user_prompt(&query);
        assert!(prompt.contains("Window: 2021-06-01T10:00:00+02:00 to 2021-06-01T14:00:00+02:00"));
        assert!(prompt.contains("- 2021-06-01T11:00:00+02:00 to 2021-06-01T12:00:00+02:00"));
        assert!(prompt.contains("Duration: 30 minutes"));
        assert!(prompt.ends_with("Request: before lunch"));
    }

    #[tokio::test]
    async fn disabled_oracle_is_unavailable() {
        let query = OracleQuery {
            busy: Vec::new(),
            window: TimeSpan::create(0, 1000).unwrap(),
            duration: 100,
            hint: "now".into(),
            timezone: Oslo,
        };
        assert!(DisabledOracle.propose(&query).await.is_err());
    }
}
