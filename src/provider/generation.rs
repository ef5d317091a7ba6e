//! Generation backends.

use crate::error::ApiError;
use crate::pipeline::prompt;
use crate::provider::{count_words, Generation, Generator};
use crate::taxonomy::StageFailure;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

/// Dollar cost per thousand tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl TokenPricing {
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1000.0) * self.input_per_1k
            + (output_tokens as f64 / 1000.0) * self.output_per_1k
    }
}

const MAX_EXTRACTED_SENTENCES: usize = 8;

/// Offline generator that answers by quoting the retrieved context.
#[derive(Debug, Clone)]
pub struct ExtractiveGenerator {
    model: String,
    pricing: TokenPricing,
}

impl Default for ExtractiveGenerator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MODEL, TokenPricing::default())
    }
}

impl ExtractiveGenerator {
    pub const PROVIDER: &'static str = "extractive";
    pub const DEFAULT_MODEL: &'static str = "extractive-v1";

    pub fn new(model: impl Into<String>, pricing: TokenPricing) -> Self {
        Self {
            model: model.into(),
            pricing,
        }
    }

    fn compose(question: &str, context: &str) -> String {
        let mut seen = HashSet::new();
        let quoted: Vec<&str> = context
            .split_inclusive(['.', '!', '?'])
            .map(str::trim)
            .filter(|sentence| !sentence.is_empty() && seen.insert(*sentence))
            .take(MAX_EXTRACTED_SENTENCES)
            .collect();
        if quoted.is_empty() {
            return format!("I could not find supporting documents for: {question}");
        }
        format!("{question} {}", quoted.join(" "))
    }
}

#[async_trait]
impl Generator for ExtractiveGenerator {
    fn provider_name(&self) -> &str {
        Self::PROVIDER
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt_text: &str) -> Result<Generation, StageFailure> {
        let parts = prompt::parse(prompt_text);
        if parts.question.trim().is_empty() {
            return Err(StageFailure::new("Prompt contains no question"));
        }
        let text = Self::compose(parts.question.trim(), parts.context);
        let input_tokens = count_words(prompt_text);
        let output_tokens = count_words(&text);
        Ok(Generation {
            cost_usd: self.pricing.cost(input_tokens, output_tokens),
            text,
            input_tokens,
            output_tokens,
        })
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<CompletionUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

const SYSTEM_PROMPT: &str =
    "Answer the question using only the supplied context. If the context is insufficient, say so.";

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PROVIDER_HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub const OPENAI_DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

fn build_provider_http_client() -> Result<Client, ApiError> {
    Client::builder()
        .no_proxy()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(PROVIDER_HTTP_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ApiError::ConfigError(format!("Failed to create HTTP client: {}", e)))
}

fn map_http_error(error: reqwest::Error) -> StageFailure {
    if error.is_timeout() {
        StageFailure::timeout(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        StageFailure::provider_down(format!("Connection error: {}", error))
    } else if let Some(status) = error.status() {
        StageFailure::new(format!("Request failed with status {}: {}", status, error))
            .with_status(status.as_u16())
    } else {
        StageFailure::new(format!("HTTP error: {}", error))
    }
}

/// OpenAI-compatible chat completions backend.
pub struct OpenAiGenerator {
    client: Client,
    model: String,
    api_key: String,
    endpoint: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    pricing: TokenPricing,
}

impl OpenAiGenerator {
    pub const PROVIDER: &'static str = "openai";
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

    pub fn new(
        model: String,
        api_key: String,
        endpoint: Option<String>,
        pricing: TokenPricing,
    ) -> Result<Self, ApiError> {
        let client = build_provider_http_client()?;
        let endpoint = endpoint
            .unwrap_or_else(|| OPENAI_DEFAULT_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client,
            model,
            api_key,
            endpoint,
            temperature: None,
            max_tokens: None,
            pricing,
        })
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn provider_name(&self) -> &str {
        Self::PROVIDER
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt_text: &str) -> Result<Generation, StageFailure> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt_text,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let url = format!("{}/chat/completions", self.endpoint);
        debug!(url = %url, model = %self.model, "sending chat completion request");
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(map_http_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StageFailure::new(format!(
                "Request failed with status {}: {}",
                status, error_text
            ))
            .with_status(status.as_u16()));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| StageFailure::new(format!("Failed to parse response: {}", e)))?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| StageFailure::new("No choices in response"))?;

        let (input_tokens, output_tokens) = match completion.usage {
            Some(usage) => (usage.prompt_tokens, usage.completion_tokens),
            None => (count_words(prompt_text), count_words(&text)),
        };

        Ok(Generation {
            cost_usd: self.pricing.cost(input_tokens, output_tokens),
            text,
            input_tokens,
            output_tokens,
        })
    }
}
