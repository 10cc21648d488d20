use crate::dtos::{IntervalDTO, SuggestionResultDTO};
use serde::{Deserialize, Serialize};

pub mod get_suggestions {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, Clone)]
    #[serde(rename_all = "camelCase")]
    pub struct RequestBody {
        /// Pending alarms of this owner count as busy
        #[serde(default)]
        pub owner_id: Option<String>,
        #[serde(default)]
        pub busy: Vec<IntervalDTO>,
        /// Length of the slot in millis
        pub duration: i64,
        pub start_ts: i64,
        pub end_ts: i64,
        /// Free text passed on to the language model
        #[serde(default)]
        pub hint: Option<String>,
        #[serde(default)]
        pub timezone: Option<String>,
        #[serde(default)]
        pub max_candidates: Option<usize>,
    }

    pub type APIResponse = SuggestionResultDTO;
}
