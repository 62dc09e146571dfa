//! Error taxonomy shared by every stage of microsegment filling.

use thiserror::Error;

/// Fatal failures while preparing a measure.
///
/// Any of these aborts the offending measure only. Incomplete sub-market
/// documentation is not an error; see
/// [`SubmarketWarning`](crate::measure::submarket::SubmarketWarning).
#[derive(Debug, Error)]
pub enum MsegError {
    /// A required reference or conversion entry is absent.
    #[error("no {what} found for '{key}'")]
    LookupMissing { what: String, key: String },

    /// Two series or result trees that must share a shape do not.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A cost or performance unit cannot be reconciled with the baseline.
    #[error("measure '{measure}' units '{found}' do not match baseline units '{expected}'")]
    UnitMismatch {
        measure: String,
        found: String,
        expected: String,
    },

    /// The measure definition itself is unusable.
    #[error("measure '{measure}': {reason}")]
    InvalidMeasure { measure: String, reason: String },

    /// Reference data violate a structural expectation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unsupported or malformed probability distribution.
    #[error("unsupported distribution: {0}")]
    Distribution(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl MsegError {
    /// Shorthand for a [`MsegError::LookupMissing`].
    pub fn missing(what: impl Into<String>, key: impl ToString) -> Self {
        Self::LookupMissing {
            what: what.into(),
            key: key.to_string(),
        }
    }

    /// Shorthand for a [`MsegError::InvalidMeasure`].
    pub fn invalid_measure(measure: &str, reason: impl Into<String>) -> Self {
        Self::InvalidMeasure {
            measure: measure.to_string(),
            reason: reason.into(),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, MsegError>;
