use chime_scheduler_domain::{Candidate, CandidateSource, SuggestionResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntervalDTO {
    pub start_ts: i64,
    pub end_ts: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDTO {
    pub start_ts: i64,
    pub end_ts: i64,
    pub source: CandidateSource,
    pub confidence: f64,
}

impl CandidateDTO {
    pub fn new(candidate: Candidate) -> Self {
        Self {
            start_ts: candidate.start_ts,
            end_ts: candidate.end_ts,
            source: candidate.source,
            confidence: candidate.confidence,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionResultDTO {
    pub candidates: Vec<CandidateDTO>,
    pub degraded: bool,
}

impl SuggestionResultDTO {
    pub fn new(result: SuggestionResult) -> Self {
        Self {
            candidates: result.candidates.into_iter().map(CandidateDTO::new).collect(),
            degraded: result.degraded,
        }
    }
}
