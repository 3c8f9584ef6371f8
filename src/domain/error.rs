//! Domain error types.

use chrono::NaiveDateTime;

/// Top-level error type for spxtrader.
///
/// Data-quality problems inside a run (zero risk distance, a bar with
/// inconsistent OHLC values, an indicator in warmup) are not errors: the
/// engine skips the entry or logs a warning and keeps going. Only the
/// variants below abort a run.
#[derive(Debug, thiserror::Error)]
pub enum SpxError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no data for {symbol} at interval {interval}")]
    NoData { symbol: String, interval: String },

    #[error("missing required column: {column}")]
    MissingColumn { column: String },

    #[error("price series is empty")]
    EmptySeries,

    #[error("timestamps not strictly ascending at bar {index}: {previous} then {current}")]
    NonMonotonicTimestamp {
        index: usize,
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },

    #[error("insufficient data: have {bars} bars, need {minimum}")]
    InsufficientData { bars: usize, minimum: usize },

    #[error("invalid {family} parameter: {reason}")]
    InvalidParameter { family: String, reason: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SpxError {
    pub fn invalid_parameter(family: &str, reason: impl Into<String>) -> Self {
        SpxError::InvalidParameter {
            family: family.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors a sweep driver may discard without aborting the sweep.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            SpxError::InsufficientData { .. } | SpxError::InvalidParameter { .. }
        )
    }
}

impl From<&SpxError> for std::process::ExitCode {
    fn from(err: &SpxError) -> Self {
        let code: u8 = match err {
            SpxError::Io(_) | SpxError::Json(_) => 1,
            SpxError::ConfigParse { .. }
            | SpxError::ConfigMissing { .. }
            | SpxError::ConfigInvalid { .. } => 2,
            SpxError::Data { .. }
            | SpxError::NoData { .. }
            | SpxError::MissingColumn { .. }
            | SpxError::EmptySeries
            | SpxError::NonMonotonicTimestamp { .. }
            | SpxError::Csv(_) => 3,
            SpxError::InvalidParameter { .. } => 4,
            SpxError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
