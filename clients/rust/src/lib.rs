mod alarm;
mod base;
mod status;
mod suggestion;

use alarm::AlarmClient;
pub use alarm::{CreateAlarmInput, GetOwnerAlarmsInput, UpdateAlarmInput};
pub(crate) use base::BaseClient;
pub use base::{APIError, APIErrorVariant, APIResponse};
pub use chime_scheduler_api_structs::dtos::*;
pub use chime_scheduler_domain::{AlarmStatus, CandidateSource, RecurrenceRule, ID};
pub use reqwest::StatusCode;
use status::StatusClient;
use std::sync::Arc;
use suggestion::SuggestionClient;
pub use suggestion::GetSuggestionsInput;

// Domain
pub use chime_scheduler_api_structs::dtos::AlarmDTO as Alarm;
pub use chime_scheduler_api_structs::dtos::CandidateDTO as Candidate;
pub use chime_scheduler_api_structs::dtos::SuggestionResultDTO as SuggestionResult;

/// Chime Scheduler Server SDK
///
/// The SDK contains methods for interacting with the Chime Scheduler server
/// API.
#[derive(Clone)]
pub struct ChimeSDK {
    pub alarm: AlarmClient,
    pub suggestion: SuggestionClient,
    pub status: StatusClient,
}

impl ChimeSDK {
    pub fn new<T: Into<String>>(address: T) -> Self {
        let base = Arc::new(BaseClient::new(address.into()));
        let alarm = AlarmClient::new(base.clone());
        let suggestion = SuggestionClient::new(base.clone());
        let status = StatusClient::new(base);

        Self {
            alarm,
            suggestion,
            status,
        }
    }
}
