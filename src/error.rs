//! Error types for the injury-severity pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, SeverityError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum SeverityError {
    /// Column missing, declared with the wrong kind, or incompatible with a fitted stage
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Data that cannot support training (empty, single class, too few rows for the folds)
    #[error("Degenerate data: {0}")]
    DegenerateData(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Preprocessing error: {0}")]
    PreprocessingError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Cancelled before stage '{stage}'")]
    Cancelled { stage: String },
}

impl SeverityError {
    /// Schema error raised when inference input lacks a column the model was built on
    pub fn incompatible_schema(column: &str) -> Self {
        SeverityError::SchemaError(format!(
            "incompatible schema: column '{}' is required by the fitted pipeline",
            column
        ))
    }

    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        SeverityError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<polars::error::PolarsError> for SeverityError {
    fn from(err: polars::error::PolarsError) -> Self {
        SeverityError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for SeverityError {
    fn from(err: serde_json::Error) -> Self {
        SeverityError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for SeverityError {
    fn from(err: bincode::Error) -> Self {
        SeverityError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for SeverityError {
    fn from(err: ndarray::ShapeError) -> Self {
        SeverityError::ShapeError {
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
        let err = SeverityError::DegenerateData("single class".to_string());
        assert_eq!(err.to_string(), "Degenerate data: single class");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SeverityError = io_err.into();
        assert!(matches!(err, SeverityError::IoError(_)));
    }

    #[test]
    fn test_incompatible_schema_message() {
        let err = SeverityError::incompatible_schema("sex");
        assert!(err.to_string().contains("incompatible schema"));
        assert!(err.to_string().contains("sex"));
    }
}
