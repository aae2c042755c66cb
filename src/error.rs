//! Error types for temporal generalization decoding

use thiserror::Error;

use crate::ml::estimator::EstimatorError;
use crate::ml::metrics::MetricError;

/// Broad category of a [`DecodingError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed configuration, raised at call time
    Configuration,
    /// Inconsistent data shapes or labels
    Data,
    /// Operation invoked in the wrong lifecycle state
    Runtime,
    /// Invalid cross-validation fold
    Fold,
    /// An estimator failed while fitting or predicting
    EstimatorFit,
}

/// Errors raised by the decoding pipeline
#[derive(Error, Debug)]
pub enum DecodingError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Cannot {operation}: {required} must be called first")]
    NotReady {
        operation: &'static str,
        required: &'static str,
    },

    #[error("Fold {fold} has no training trials")]
    EmptyTrainFold { fold: usize },

    #[error("Fit failed for training window {window}, fold {fold}: {source}")]
    EstimatorFit {
        window: usize,
        fold: usize,
        #[source]
        source: EstimatorError,
    },

    #[error("Prediction failed for training window {window}, fold {fold}: {source}")]
    EstimatorPredict {
        window: usize,
        fold: usize,
        #[source]
        source: EstimatorError,
    },

    #[error("Scoring failed for cell (train {train}, test {test}): {source}")]
    Scoring {
        train: usize,
        test: usize,
        #[source]
        source: MetricError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl DecodingError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        DecodingError::Configuration(msg.into())
    }

    pub(crate) fn data(msg: impl Into<String>) -> Self {
        DecodingError::Data(msg.into())
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodingError::Configuration(_) => ErrorKind::Configuration,
            DecodingError::NotReady { .. } => ErrorKind::Runtime,
            DecodingError::EmptyTrainFold { .. } => ErrorKind::Fold,
            DecodingError::EstimatorFit { .. } | DecodingError::EstimatorPredict { .. } => {
                ErrorKind::EstimatorFit
            }
            DecodingError::Data(_)
            | DecodingError::Scoring { .. }
            | DecodingError::Io(_)
            | DecodingError::Json(_)
            | DecodingError::Csv(_) => ErrorKind::Data,
        }
    }

    /// Runtime (lifecycle) errors are a subtype of data errors
    pub fn is_data_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Data | ErrorKind::Runtime)
    }

    pub fn is_configuration_error(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

/// Result type alias for decoding operations
pub type DecodingResult<T> = Result<T, DecodingError>;
