mod alarm;
mod notification;
mod shared;
pub mod suggestion;
mod timespan;

pub use alarm::{
    Alarm, AlarmStateError, AlarmStatus, AlarmValidationError, FireOutcome, NewAlarm,
    MAX_MESSAGE_LENGTH,
};
pub use notification::{ChannelDelivery, ChannelOutcome, DeliveryReport};
pub use shared::entity::{Entity, InvalidIDError, ID};
pub use shared::recurrence::{next_occurrence, RecurrenceError, RecurrenceRule};
pub use suggestion::{
    Candidate, CandidateSource, OracleAnswer, SuggestionError, SuggestionOptions,
    SuggestionRequest, SuggestionResult,
};
pub use timespan::{is_supported_ts, InvalidTimeSpanError, TimeSpan};
