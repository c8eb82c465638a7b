//! Error types shared across the library

use thiserror::Error;

use crate::remediation::BackendError;

/// Errors produced by the analytics and remediation components
#[derive(Debug, Error)]
pub enum GuardError {
    /// Feature matrix does not have the column count a fitted model expects
    #[error("dimension mismatch: model expects {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Nothing to choose from when selecting an instance
    #[error("no candidate instances to select from")]
    NoCandidates,

    /// Every candidate came back without datapoints and strict mode is on
    #[error("no metric datapoints for any of {candidates} candidate instances")]
    NoMetricData { candidates: usize },

    /// Alarm event is missing the fields needed to identify a target
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Metric, scaling group or instance action call failed
    #[error("backend call failed: {0}")]
    Backend(#[from] BackendError),

    #[error("dataset is empty: {0}")]
    EmptyDataset(String),

    #[error("column not found: {0}")]
    MissingColumn(String),

    /// Setting outside the range the component can work with
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("model not loaded: {0}")]
    ModelNotLoaded(String),

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl GuardError {
    /// True when the error was caused by the caller's input rather than a
    /// failing collaborator
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            GuardError::InvalidEvent(_)
                | GuardError::DimensionMismatch { .. }
                | GuardError::NoCandidates
                | GuardError::EmptyDataset(_)
                | GuardError::MissingColumn(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_classification() {
        assert!(GuardError::InvalidEvent("missing".into()).is_invalid_input());
        assert!(GuardError::NoCandidates.is_invalid_input());
        assert!(!GuardError::Backend(BackendError::Unavailable("down".into())).is_invalid_input());
        assert!(!GuardError::ModelNotLoaded("anomaly".into()).is_invalid_input());
        assert!(!GuardError::InvalidConfig("window".into()).is_invalid_input());
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = GuardError::DimensionMismatch {
            expected: 5,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "dimension mismatch: model expects 5 features, got 3"
        );
    }
}
