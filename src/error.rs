//! Domain-specific error types for risk-predictor

use thiserror::Error;

/// Main error type for the risk prediction pipeline
#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Message already names the artifact and path that failed.
    #[error("{message}")]
    ModelLoad { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Preprocessing produced a malformed feature table: {message}")]
    Structural { message: String },

    #[error("Reconciliation error: {message}")]
    Reconciliation { message: String },

    #[error("Model evaluation error: {message}")]
    Model { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RiskError {
    /// True for failures that mean the models are unusable rather than the input.
    pub fn is_model_unavailable(&self) -> bool {
        matches!(self, RiskError::ModelLoad { .. })
    }
}

impl From<anyhow::Error> for RiskError {
    fn from(err: anyhow::Error) -> Self {
        RiskError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for RiskError {
    fn from(err: serde_json::Error) -> Self {
        RiskError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for RiskError {
    fn from(err: std::io::Error) -> Self {
        RiskError::Internal {
            message: format!("I/O failure: {}", err),
        }
    }
}

impl From<ndarray::ShapeError> for RiskError {
    fn from(err: ndarray::ShapeError) -> Self {
        RiskError::Reconciliation {
            message: format!("array shape error: {}", err),
        }
    }
}

/// Result type alias for risk-predictor operations
pub type Result<T> = std::result::Result<T, RiskError>;
