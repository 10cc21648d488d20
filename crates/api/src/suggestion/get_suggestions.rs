use crate::alarm::parse_timezone;
use crate::error::ChimeError;
use crate::shared::usecase::{execute, UseCase};
use actix_web::{web, HttpResponse};
use chime_scheduler_api_structs::dtos::IntervalDTO;
use chime_scheduler_api_structs::get_suggestions::*;
use chime_scheduler_domain::{
    suggestion::suggest, OracleAnswer, SuggestionRequest, SuggestionResult, TimeSpan,
};
use chime_scheduler_infra::{ChimeContext, OracleQuery};
use chrono_tz::Tz;
use tracing::warn;

/// Upper bound of busy intervals a single recurring alarm contributes
const MAX_BUSY_SPANS_PER_ALARM: usize = 2000;

pub async fn get_suggestions_controller(
    body: web::Json<RequestBody>,
    ctx: web::Data<ChimeContext>,
) -> Result<HttpResponse, ChimeError> {
    let body = body.0;
    let usecase = GetSuggestionsUseCase {
        owner_id: body.owner_id,
        busy: body.busy,
        duration: body.duration,
        start_ts: body.start_ts,
        end_ts: body.end_ts,
        hint: body.hint,
        timezone: body.timezone,
        max_candidates: body.max_candidates,
    };

    execute(usecase, &ctx)
        .await
        .map(|res| HttpResponse::Ok().json(APIResponse::new(res)))
        .map_err(ChimeError::from)
}

#[derive(Debug)]
pub struct GetSuggestionsUseCase {
    pub owner_id: Option<String>,
    pub busy: Vec<IntervalDTO>,
    pub duration: i64,
    pub start_ts: i64,
    pub end_ts: i64,
    pub hint: Option<String>,
    pub timezone: Option<String>,
    pub max_candidates: Option<usize>,
}

#[derive(Debug, PartialEq)]
pub enum UseCaseError {
    InvalidTimespan(i64, i64),
    InvalidTimezone(String),
    InvalidRequest(String),
    Storage,
}

impl From<UseCaseError> for ChimeError {
    fn from(e: UseCaseError) -> Self {
        match e {
            UseCaseError::InvalidTimespan(start, end) => Self::BadClientData(format!(
                "The provided start_ts: {} and end_ts: {} is not a valid timespan",
                start, end
            )),
            UseCaseError::InvalidTimezone(tz) => Self::BadClientData(format!(
                "Invalid timezone: {}. It should be a valid IANA TimeZone.",
                tz
            )),
            UseCaseError::InvalidRequest(msg) => Self::BadClientData(msg),
            UseCaseError::Storage => Self::InternalError,
        }
    }
}

impl GetSuggestionsUseCase {
    fn busy_spans(&self) -> Result<Vec<TimeSpan>, UseCaseError> {
        self.busy
            .iter()
            .map(|b| {
                TimeSpan::create(b.start_ts, b.end_ts)
                    .map_err(|_| UseCaseError::InvalidTimespan(b.start_ts, b.end_ts))
            })
            .collect()
    }

    async fn ask_oracle(&self, request: &SuggestionRequest, timezone: Tz, ctx: &ChimeContext) -> OracleAnswer {
        let hint = match request.hint.as_deref().map(str::trim) {
            Some(hint) if !hint.is_empty() => hint.to_string(),
            _ => return OracleAnswer::NotAsked,
        };
        let query = OracleQuery {
            busy: request.busy.clone(),
            window: request.window,
            duration: request.duration,
            hint,
            timezone,
        };
        match ctx.oracle.propose(&query).await {
            Ok(ts) => OracleAnswer::Proposed(ts),
            Err(e) => {
                warn!("Serving heuristic suggestions only: {}", e);
                OracleAnswer::Unavailable
            }
        }
    }
}

#[async_trait::async_trait(?Send)]
impl UseCase for GetSuggestionsUseCase {
    type Response = SuggestionResult;

    type Error = UseCaseError;

    const NAME: &'static str = "GetSuggestions";

    async fn execute(&mut self, ctx: &ChimeContext) -> Result<Self::Response, Self::Error> {
        let timezone = parse_timezone(self.timezone.as_deref(), ctx.config.default_timezone)
            .map_err(UseCaseError::InvalidTimezone)?;
        let window = TimeSpan::create(self.start_ts, self.end_ts)
            .map_err(|_| UseCaseError::InvalidTimespan(self.start_ts, self.end_ts))?;

        let mut request = SuggestionRequest {
            busy: self.busy_spans()?,
            duration: self.duration,
            window,
            hint: self.hint.clone(),
        };
        request
            .validate(ctx.config.suggestion_window_limit_millis)
            .map_err(|e| UseCaseError::InvalidRequest(e.to_string()))?;

        if let Some(owner_id) = &self.owner_id {
            let alarms = ctx
                .store
                .find_by_owner(owner_id, false)
                .await
                .map_err(|_| UseCaseError::Storage)?;
            for alarm in &alarms {
                request.busy.extend(alarm.busy_spans(
                    &request.window,
                    ctx.config.alarm_busy_millis,
                    MAX_BUSY_SPANS_PER_ALARM,
                ));
            }
        }

        let mut options = ctx.config.suggestion_options(timezone);
        options.max_candidates = self.max_candidates;

        let answer = self.ask_oracle(&request, timezone, ctx).await;
        suggest(&request, &options, answer).map_err(|e| UseCaseError::InvalidRequest(e.to_string()))
    }
}
