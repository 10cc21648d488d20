use crate::timespan::{is_supported_ts, TimeSpan};
use chrono::prelude::*;
use chrono_tz::{Tz, UTC};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SECONDS_PER_DAY: i64 = 60 * 60 * 24;

/// Weight of the buffer score when a preferred time of day is configured
const BUFFER_WEIGHT: f64 = 0.7;
const PREFERENCE_WEIGHT: f64 = 0.3;

/// A "when should I do X" query
#[derive(Debug, Clone)]
pub struct SuggestionRequest {
    pub busy: Vec<TimeSpan>,
    /// Desired length of the slot in millis
    pub duration: i64,
    pub window: TimeSpan,
    pub hint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SuggestionOptions {
    /// Distance between two heuristic candidates
    pub step_millis: i64,
    /// Local time of day the owner prefers
    pub preferred_time: Option<NaiveTime>,
    /// Timezone used to evaluate `preferred_time`
    pub timezone: Tz,
    /// Buffers larger than this are considered perfect
    pub buffer_cap_millis: i64,
    pub llm_confidence: f64,
    pub max_candidates: Option<usize>,
}

impl Default for SuggestionOptions {
    fn default() -> Self {
        Self {
            step_millis: 1000 * 60 * 15,
            preferred_time: None,
            timezone: UTC,
            buffer_cap_millis: 1000 * 60 * 60 * 2,
            llm_confidence: 0.75,
            max_candidates: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CandidateSource {
    Heuristic,
    Llm,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub start_ts: i64,
    pub end_ts: i64,
    pub source: CandidateSource,
    /// In `[0, 1]`
    pub confidence: f64,
}

/// What came back from the language model for a request
#[derive(Debug, Clone, PartialEq)]
pub enum OracleAnswer {
    /// The request had no hint so the oracle was never asked
    NotAsked,
    Proposed(i64),
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionResult {
    /// Ordered by descending confidence, then chronologically
    pub candidates: Vec<Candidate>,
    /// Served without the language model although a hint was given
    pub degraded: bool,
}

#[derive(Error, Debug, PartialEq)]
pub enum SuggestionError {
    #[error("Duration must be positive, got {0}")]
    InvalidDuration(i64),
    #[error("Duration of {duration} millis does not fit in a window of {window} millis")]
    DurationExceedsWindow { duration: i64, window: i64 },
    #[error("Search window of {0} millis is longer than the allowed {1} millis")]
    WindowTooLong(i64, i64),
    #[error("Step must be positive, got {0}")]
    InvalidStep(i64),
    #[error("Timestamp {0} is out of the supported range")]
    OutOfRange(i64),
}

impl SuggestionRequest {
    pub fn validate(&self, max_window_millis: i64) -> Result<(), SuggestionError> {
        if self.duration < 1 {
            return Err(SuggestionError::InvalidDuration(self.duration));
        }
        let bounds = std::iter::once(&self.window).chain(self.busy.iter());
        for ts in bounds.flat_map(|span| [span.start(), span.end()]) {
            if !is_supported_ts(ts) {
                return Err(SuggestionError::OutOfRange(ts));
            }
        }
        if self.duration > self.window.duration() {
            return Err(SuggestionError::DurationExceedsWindow {
                duration: self.duration,
                window: self.window.duration(),
            });
        }
        if self.window.duration() > max_window_millis {
            return Err(SuggestionError::WindowTooLong(
                self.window.duration(),
                max_window_millis,
            ));
        }
        Ok(())
    }

    fn slot(&self, start_ts: i64) -> Option<TimeSpan> {
        TimeSpan::create(start_ts, start_ts.checked_add(self.duration)?).ok()
    }

    /// A slot is acceptable if it lies inside the window and does not
    /// overlap any busy interval.
    pub fn is_free(&self, start_ts: i64) -> bool {
        match self.slot(start_ts) {
            Some(slot) => {
                self.window.contains_span(&slot) && !self.busy.iter().any(|b| b.overlaps(&slot))
            }
            None => false,
        }
    }
}

/// Smallest distance between the slot and its neighbouring busy
/// intervals, capped. The edges of the window are not busy.
fn buffer_score(slot: &TimeSpan, busy: &[TimeSpan], cap: i64) -> f64 {
    if cap <= 0 {
        return 1.0;
    }
    let before = busy
        .iter()
        .filter(|b| b.end() <= slot.start())
        .map(|b| slot.start().saturating_sub(b.end()))
        .min()
        .unwrap_or(cap);
    let after = busy
        .iter()
        .filter(|b| b.start() >= slot.end())
        .map(|b| b.start().saturating_sub(slot.end()))
        .min()
        .unwrap_or(cap);
    let buffer = std::cmp::min(std::cmp::min(before, after), cap);
    buffer as f64 / cap as f64
}

/// 1 at the preferred time of day, 0 twelve hours away from it.
fn preference_score(start_ts: i64, preferred: NaiveTime, tz: &Tz) -> f64 {
    let local = match tz.timestamp_millis_opt(start_ts).single() {
        Some(local) => local.time(),
        None => return 0.0,
    };
    let diff = (local.num_seconds_from_midnight() as i64
        - preferred.num_seconds_from_midnight() as i64)
        .rem_euclid(SECONDS_PER_DAY);
    let distance = std::cmp::min(diff, SECONDS_PER_DAY - diff);
    1.0 - distance as f64 / (SECONDS_PER_DAY / 2) as f64
}

fn score(slot: &TimeSpan, busy: &[TimeSpan], options: &SuggestionOptions) -> f64 {
    let buffer = buffer_score(slot, busy, options.buffer_cap_millis);
    match options.preferred_time {
        Some(preferred) => {
            BUFFER_WEIGHT * buffer
                + PREFERENCE_WEIGHT * preference_score(slot.start(), preferred, &options.timezone)
        }
        None => buffer,
    }
}

/// Slides the requested duration over the window in `step_millis` steps
/// and keeps every slot that is free.
pub fn heuristic_candidates(
    request: &SuggestionRequest,
    options: &SuggestionOptions,
) -> Result<Vec<Candidate>, SuggestionError> {
    if options.step_millis < 1 {
        return Err(SuggestionError::InvalidStep(options.step_millis));
    }
    if request.duration < 1 {
        return Err(SuggestionError::InvalidDuration(request.duration));
    }

    let mut candidates = Vec::new();
    let mut cursor = Some(request.window.start());
    while let Some(slot) = cursor.and_then(|start| request.slot(start)) {
        if slot.end() > request.window.end() {
            break;
        }
        if request.is_free(slot.start()) {
            candidates.push(Candidate {
                start_ts: slot.start(),
                end_ts: slot.end(),
                source: CandidateSource::Heuristic,
                confidence: score(&slot, &request.busy, options),
            });
        }
        cursor = slot.start().checked_add(options.step_millis);
    }

    Ok(candidates)
}

/// The language model proposal is untrusted, it is dropped unless it
/// passes the same checks as the heuristic slots.
pub fn validate_llm_candidate(
    proposed_ts: i64,
    request: &SuggestionRequest,
    options: &SuggestionOptions,
) -> Option<Candidate> {
    if !request.is_free(proposed_ts) {
        return None;
    }
    let slot = request.slot(proposed_ts)?;
    Some(Candidate {
        start_ts: slot.start(),
        end_ts: slot.end(),
        source: CandidateSource::Llm,
        confidence: options.llm_confidence.clamp(0.0, 1.0),
    })
}

/// Collapses candidates at the same instant to the most confident one and
/// orders the rest by descending confidence, then chronologically.
pub fn rank_candidates(candidates: Vec<Candidate>, max_candidates: Option<usize>) -> Vec<Candidate> {
    let mut deduped: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match deduped.iter_mut().find(|c| c.start_ts == candidate.start_ts) {
            Some(existing) if candidate.confidence > existing.confidence => *existing = candidate,
            Some(_) => {}
            None => deduped.push(candidate),
        }
    }
    deduped.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(a.start_ts.cmp(&b.start_ts))
    });
    if let Some(max) = max_candidates {
        deduped.truncate(max);
    }
    deduped
}

/// Turns a request and the oracle's answer into ranked candidates.
pub fn suggest(
    request: &SuggestionRequest,
    options: &SuggestionOptions,
    oracle: OracleAnswer,
) -> Result<SuggestionResult, SuggestionError> {
    let mut candidates = heuristic_candidates(request, options)?;
    let degraded = match oracle {
        OracleAnswer::NotAsked => false,
        OracleAnswer::Unavailable => true,
        OracleAnswer::Proposed(ts) => {
            candidates.extend(validate_llm_candidate(ts, request, options));
            false
        }
    };

    Ok(SuggestionResult {
        candidates: rank_candidates(candidates, options.max_candidates),
        degraded,
    })
}
