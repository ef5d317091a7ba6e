//! Configuration System
//!
//! Layered configuration for the pipeline: built-in defaults, the user's global
//! config file, an explicit config file, and `ASKPIPE__SECTION__KEY`
//! environment variables, in increasing precedence.

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::provider::{ExtractiveGenerator, KeywordRetriever, OpenAiGenerator, StatusTool};
use crate::remediation::RemediationPolicy;
use crate::telemetry::ServiceIdentity;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AskpipeConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub tool: ToolConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub remediation: RemediationPolicy,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity stamped on every span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub environment: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let identity = ServiceIdentity::default();
        Self {
            name: identity.name,
            environment: identity.environment,
        }
    }
}

impl ServiceConfig {
    pub fn identity(&self) -> ServiceIdentity {
        ServiceIdentity {
            name: self.name.clone(),
            environment: self.environment.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Backend name; only "keyword" is built in
    pub provider: String,
    pub top_k: usize,
    /// JSON array of `{id, title, text}` documents; built-in corpus when unset
    pub corpus: Option<PathBuf>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            provider: KeywordRetriever::PROVIDER.to_string(),
            top_k: 3,
            corpus: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub name: String,
    pub timeout_ms: u64,
    pub result: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            name: StatusTool::DEFAULT_NAME.to_string(),
            timeout_ms: 2000,
            result: StatusTool::DEFAULT_RESULT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// "extractive" (offline) or "openai"
    pub provider: String,
    /// Provider default when unset
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible API
    pub endpoint: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: ExtractiveGenerator::PROVIDER.to_string(),
            model: None,
            api_key: None,
            endpoint: None,
            temperature: None,
            max_tokens: None,
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
        }
    }
}

impl GenerationConfig {
    /// Configured model, or the provider's default.
    pub fn model_or_default(&self) -> String {
        match self.model.as_deref() {
            Some(model) if !model.trim().is_empty() => model.to_string(),
            _ if self.provider == OpenAiGenerator::PROVIDER => {
                OpenAiGenerator::DEFAULT_MODEL.to_string()
            }
            _ => ExtractiveGenerator::DEFAULT_MODEL.to_string(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Service(String),
    Retrieval(String),
    Tool(String),
    Generation(String),
    Remediation(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Service(msg) => write!(f, "service: {}", msg),
            ValidationError::Retrieval(msg) => write!(f, "retrieval: {}", msg),
            ValidationError::Tool(msg) => write!(f, "tool: {}", msg),
            ValidationError::Generation(msg) => write!(f, "generation: {}", msg),
            ValidationError::Remediation(msg) => write!(f, "remediation: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

fn check_unit(errors: &mut Vec<ValidationError>, name: &str, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(ValidationError::Remediation(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
}

impl AskpipeConfig {
    /// Validate the entire configuration, collecting every violation.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.service.name.trim().is_empty() {
            errors.push(ValidationError::Service("name cannot be empty".to_string()));
        }
        if self.service.environment.trim().is_empty() {
            errors.push(ValidationError::Service(
                "environment cannot be empty".to_string(),
            ));
        }

        if self.retrieval.top_k == 0 {
            errors.push(ValidationError::Retrieval(
                "top_k must be at least 1".to_string(),
            ));
        }

        if self.tool.name.trim().is_empty() {
            errors.push(ValidationError::Tool("name cannot be empty".to_string()));
        }
        if self.tool.timeout_ms == 0 {
            errors.push(ValidationError::Tool(
                "timeout_ms must be at least 1".to_string(),
            ));
        }

        let generation = &self.generation;
        if generation.provider == OpenAiGenerator::PROVIDER {
            if generation
                .api_key
                .as_deref()
                .map_or(true, |key| key.trim().is_empty())
            {
                errors.push(ValidationError::Generation(
                    "openai provider requires api_key".to_string(),
                ));
            }
            if let Some(model) = generation.model.as_deref() {
                if model.trim().is_empty() {
                    errors.push(ValidationError::Generation(
                        "model cannot be empty".to_string(),
                    ));
                }
            }
        }
        if let Some(endpoint) = generation.endpoint.as_deref() {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                errors.push(ValidationError::Generation(format!(
                    "endpoint must be an http(s) URL, got '{}'",
                    endpoint
                )));
            }
        }
        if generation.input_cost_per_1k < 0.0 || generation.output_cost_per_1k < 0.0 {
            errors.push(ValidationError::Generation(
                "token costs cannot be negative".to_string(),
            ));
        }

        let policy = &self.remediation;
        check_unit(&mut errors, "policy_risk_threshold", policy.policy_risk_threshold);
        check_unit(&mut errors, "quality_threshold", policy.quality_threshold);
        check_unit(&mut errors, "faithfulness_threshold", policy.faithfulness_threshold);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, folding all violations into one `ApiError`.
    pub fn validated(self) -> Result<Self, ApiError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(self)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ApiError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
