//! Error types for the askpipe question-answering pipeline.
//!
//! Stage-level failures are modelled by [`crate::taxonomy::StageFailure`] and
//! classified into [`ErrorClassification`]; `ApiError` covers what escapes a
//! request (fatal generation failure, invalid input) and the configuration layer.

use crate::taxonomy::ErrorClassification;
use thiserror::Error;

/// Request-level and configuration errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(ErrorClassification),

    #[error("Generation failed: {0}")]
    Generation(ErrorClassification),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Provider not configured: {}", .0.message)]
    ProviderNotConfigured(ErrorClassification),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Classification carried by the error, if it came out of a pipeline stage.
    pub fn classification(&self) -> Option<&ErrorClassification> {
        match self {
            ApiError::InvalidRequest(c)
            | ApiError::Generation(c)
            | ApiError::ProviderNotConfigured(c) => Some(c),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for ApiError {
    fn from(err: toml::ser::Error) -> Self {
        ApiError::Serialization(err.to_string())
    }
}
