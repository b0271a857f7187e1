//! Error types for the prediction service

use thiserror::Error;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, PredictError>;

/// Main error type for the prediction service
#[derive(Error, Debug)]
pub enum PredictError {
    /// The model could not be fetched, introspected or warmed up.
    /// The process must not serve traffic after this.
    #[error("Model initialization failed: {0}")]
    Init(String),

    #[error("Model {version} is not ready")]
    NotReady { version: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },
}

impl From<ndarray::ShapeError> for PredictError {
    fn from(err: ndarray::ShapeError) -> Self {
        PredictError::Shape {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<candle_core::Error> for PredictError {
    fn from(err: candle_core::Error) -> Self {
        PredictError::Execution(err.to_string())
    }
}
