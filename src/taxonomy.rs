//! Error taxonomy: maps a stage failure to a bounded (type, code, message) triple.
//!
//! The type and code sets are closed. Anything the classifier does not recognize
//! becomes `UNKNOWN/UNKNOWN` instead of leaking raw error text into span attributes.

use crate::types::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed set of error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    Timeout,
    RetrievalError,
    ToolError,
    RateLimit,
    LlmError,
    EvaluationError,
    RemediationError,
    ValidationError,
    ConfigError,
    Unknown,
}

impl ErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorType::Timeout => "TIMEOUT",
            ErrorType::RetrievalError => "RETRIEVAL_ERROR",
            ErrorType::ToolError => "TOOL_ERROR",
            ErrorType::RateLimit => "RATE_LIMIT",
            ErrorType::LlmError => "LLM_ERROR",
            ErrorType::EvaluationError => "EVALUATION_ERROR",
            ErrorType::RemediationError => "REMEDIATION_ERROR",
            ErrorType::ValidationError => "VALIDATION_ERROR",
            ErrorType::ConfigError => "CONFIG_ERROR",
            ErrorType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RetrievalTimeout,
    RetrievalProviderDown,
    RetrievalEmptyResult,
    ToolTimeout,
    ToolUnavailable,
    ToolBadResponse,
    LlmRateLimit,
    LlmProviderDown,
    LlmTimeout,
    LlmContextTooLarge,
    EvalModelFailure,
    RemediationFallbackFailed,
    InvalidRequest,
    ProviderNotConfigured,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::RetrievalTimeout => "RETRIEVAL_TIMEOUT",
            ErrorCode::RetrievalProviderDown => "RETRIEVAL_PROVIDER_DOWN",
            ErrorCode::RetrievalEmptyResult => "RETRIEVAL_EMPTY_RESULT",
            ErrorCode::ToolTimeout => "TOOL_TIMEOUT",
            ErrorCode::ToolUnavailable => "TOOL_UNAVAILABLE",
            ErrorCode::ToolBadResponse => "TOOL_BAD_RESPONSE",
            ErrorCode::LlmRateLimit => "LLM_RATE_LIMIT",
            ErrorCode::LlmProviderDown => "LLM_PROVIDER_DOWN",
            ErrorCode::LlmTimeout => "LLM_TIMEOUT",
            ErrorCode::LlmContextTooLarge => "LLM_CONTEXT_TOO_LARGE",
            ErrorCode::EvalModelFailure => "EVAL_MODEL_FAILURE",
            ErrorCode::RemediationFallbackFailed => "REMEDIATION_FALLBACK_FAILED",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::ProviderNotConfigured => "PROVIDER_NOT_CONFIGURED",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure, attached to a stage outcome and its span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassification {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorClassification {
    pub fn new(error_type: ErrorType, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error_type,
            code,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorType::ValidationError, ErrorCode::InvalidRequest, message)
    }

    pub fn provider_not_configured(message: impl Into<String>) -> Self {
        Self::new(
            ErrorType::ConfigError,
            ErrorCode::ProviderNotConfigured,
            message,
        )
    }
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Hint flags that steer classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureHints {
    pub timeout: bool,
    pub provider_down: bool,
    pub empty_result: bool,
    pub rate_limit: bool,
}

/// Raw failure reported by a stage collaborator.
///
/// `status` is an HTTP-like status code when the failure came from a remote
/// backend; `code` is a backend-specific error code such as `TOOL_TIMEOUT`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{}", .message.as_deref().unwrap_or(UNKNOWN_ERROR_MESSAGE))]
pub struct StageFailure {
    pub message: Option<String>,
    pub status: Option<u16>,
    pub code: Option<String>,
    pub hints: FailureHints,
}

pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

impl StageFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        let mut failure = Self::new(message);
        failure.hints.timeout = true;
        failure
    }

    pub fn provider_down(message: impl Into<String>) -> Self {
        let mut failure = Self::new(message);
        failure.hints.provider_down = true;
        failure
    }

    pub fn empty_result(message: impl Into<String>) -> Self {
        let mut failure = Self::new(message);
        failure.hints.empty_result = true;
        failure
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        let mut failure = Self::new(message);
        failure.hints.rate_limit = true;
        failure
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Explicit hints merged with hints implied by `status` and `code`.
    pub fn effective_hints(&self) -> FailureHints {
        let mut hints = self.hints;
        if let Some(status) = self.status {
            match status {
                429 => hints.rate_limit = true,
                408 | 504 => hints.timeout = true,
                500..=599 => hints.provider_down = true,
                _ => {}
            }
        }
        if let Some(code) = self.code.as_deref() {
            if code.eq_ignore_ascii_case("TIMEOUT") || code.eq_ignore_ascii_case("TOOL_TIMEOUT") {
                hints.timeout = true;
            }
        }
        hints
    }

    fn message_or_default(&self) -> String {
        match self.message.as_deref() {
            Some(message) if !message.trim().is_empty() => message.to_string(),
            _ => UNKNOWN_ERROR_MESSAGE.to_string(),
        }
    }
}

/// Classify a failure raised by `stage`. Total and deterministic.
pub fn classify(stage: Stage, failure: &StageFailure) -> ErrorClassification {
    let hints = failure.effective_hints();
    let (error_type, code) = match stage {
        Stage::Retrieval => {
            if hints.timeout {
                (ErrorType::Timeout, ErrorCode::RetrievalTimeout)
            } else if hints.provider_down {
                (ErrorType::RetrievalError, ErrorCode::RetrievalProviderDown)
            } else if hints.empty_result {
                (ErrorType::RetrievalError, ErrorCode::RetrievalEmptyResult)
            } else {
                (ErrorType::RetrievalError, ErrorCode::RetrievalProviderDown)
            }
        }
        Stage::Tool => {
            if hints.timeout {
                (ErrorType::Timeout, ErrorCode::ToolTimeout)
            } else if hints.provider_down {
                (ErrorType::ToolError, ErrorCode::ToolUnavailable)
            } else {
                (ErrorType::ToolError, ErrorCode::ToolBadResponse)
            }
        }
        Stage::Generation => {
            if hints.rate_limit {
                (ErrorType::RateLimit, ErrorCode::LlmRateLimit)
            } else if hints.provider_down {
                (ErrorType::LlmError, ErrorCode::LlmProviderDown)
            } else if hints.timeout {
                (ErrorType::Timeout, ErrorCode::LlmTimeout)
            } else {
                (ErrorType::LlmError, ErrorCode::LlmContextTooLarge)
            }
        }
        Stage::Evaluation => (ErrorType::EvaluationError, ErrorCode::EvalModelFailure),
        Stage::Remediation => (
            ErrorType::RemediationError,
            ErrorCode::RemediationFallbackFailed,
        ),
    };
    ErrorClassification::new(error_type, code, failure.message_or_default())
}

/// Classify by stage name. Unrecognized names yield `UNKNOWN/UNKNOWN`.
pub fn classify_named(stage: &str, failure: &StageFailure) -> ErrorClassification {
    match stage.parse::<Stage>() {
        Ok(stage) => classify(stage, failure),
        Err(_) => ErrorClassification::new(
            ErrorType::Unknown,
            ErrorCode::Unknown,
            failure.message_or_default(),
        ),
    }
}
