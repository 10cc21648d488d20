use crate::{APIResponse, BaseClient};
use chime_scheduler_api_structs::{dtos::IntervalDTO, *};
use reqwest::StatusCode;
use std::sync::Arc;

#[derive(Clone)]
pub struct SuggestionClient {
    base: Arc<BaseClient>,
}

pub struct GetSuggestionsInput {
    pub owner_id: Option<String>,
    /// `(start_ts, end_ts)` pairs
    pub busy: Vec<(i64, i64)>,
    pub duration: i64,
    pub start_ts: i64,
    pub end_ts: i64,
    pub hint: Option<String>,
    pub timezone: Option<String>,
    pub max_candidates: Option<usize>,
}

impl SuggestionClient {
    pub(crate) fn new(base: Arc<BaseClient>) -> Self {
        Self { base }
    }

    pub async fn get(&self, input: GetSuggestionsInput) -> APIResponse<get_suggestions::APIResponse> {
        let body = get_suggestions::RequestBody {
            owner_id: input.owner_id,
            busy: input
                .busy
                .into_iter()
                .map(|(start_ts, end_ts)| IntervalDTO { start_ts, end_ts })
                .collect(),
            duration: input.duration,
            start_ts: input.start_ts,
            end_ts: input.end_ts,
            hint: input.hint,
            timezone: input.timezone,
            max_candidates: input.max_candidates,
        };
        self.base
            .post(body, "suggestions".into(), StatusCode::OK)
            .await
    }
}
