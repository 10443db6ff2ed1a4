//! Error types for the market-regimes pipeline

use thiserror::Error;

/// Result type alias for regime pipeline operations
pub type Result<T> = std::result::Result<T, RegimeError>;

/// Main error type for the regime pipeline
#[derive(Error, Debug)]
pub enum RegimeError {
    /// Search distribution bounds collapsed or inverted
    #[error("Invalid search space: [{low}, {high}] ({reason})")]
    InvalidSearchSpace { low: i64, high: i64, reason: String },

    /// A candidate hyperparameter value could not be fit on a fold
    #[error("Estimator fit failed for {param} = {value} on {split}: {reason}")]
    EstimatorFitError {
        param: String,
        value: usize,
        split: String,
        reason: String,
    },

    #[error("Not fitted: {0}")]
    NotFittedError(String),

    #[error("Cluster refinement did not converge after {iterations} iterations (shift {shift:.3e})")]
    ClusterFitError { iterations: usize, shift: f64 },

    #[error("Alignment error: {labels} labels vs {index} index entries")]
    AlignmentError { labels: usize, index: usize },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),
}

impl From<polars::error::PolarsError> for RegimeError {
    fn from(err: polars::error::PolarsError) -> Self {
        RegimeError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for RegimeError {
    fn from(err: serde_json::Error) -> Self {
        RegimeError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for RegimeError {
    fn from(err: ndarray::ShapeError) -> Self {
        RegimeError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegimeError::AlignmentError { labels: 3, index: 4 };
        assert_eq!(err.to_string(), "Alignment error: 3 labels vs 4 index entries");
    }

    #[test]
    fn test_invalid_search_space_display() {
        let err = RegimeError::InvalidSearchSpace {
            low: 1,
            high: 0,
            reason: "5x6 input".to_string(),
        };
        assert!(err.to_string().contains("[1, 0]"));
        assert!(err.to_string().contains("5x6"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RegimeError = io_err.into();
        assert!(matches!(err, RegimeError::IoError(_)));
    }
}
