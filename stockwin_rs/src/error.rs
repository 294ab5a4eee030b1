use chrono::NaiveDate;
use thiserror::Error;

/// Rejected feature/target requests and date ranges.
///
/// These are raised before any column is written, so a failed call leaves
/// previously accumulated columns untouched. Library functions surface them
/// through `anyhow::Error`; callers that need to tell them apart from I/O
/// failures can `downcast_ref::<ValidationError>()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("invalid aggregation type '{kind}' (expected one of: {allowed})")]
    UnsupportedAggregation { kind: String, allowed: &'static str },

    #[error("{what} must be at least 1")]
    ZeroLength { what: &'static str },

    #[error("malformed {what} spec '{raw}': expected column:length:aggregation")]
    MalformedSpec { what: &'static str, raw: String },

    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
}
