//! Stage collaborators.
//!
//! The pipeline depends only on the three traits here. Concrete backends live
//! in the child modules and are selected by name from configuration.

use crate::taxonomy::StageFailure;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod generation;
pub mod retrieval;
pub mod tool;

pub use generation::{ExtractiveGenerator, OpenAiGenerator, TokenPricing};
pub use retrieval::{Document, KeywordRetriever};
pub use tool::StatusTool;

/// Documents found for a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retrieval {
    pub context: String,
    pub docs: usize,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl Retrieval {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Text produced by a generation backend, with its accounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub result: String,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Backend name, reported as `retrieval.provider`.
    fn provider_name(&self) -> &str;

    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Retrieval, StageFailure>;
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;

    /// Single attempt; retries belong to the backend.
    async fn generate(&self, prompt: &str) -> Result<Generation, StageFailure>;
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn timeout_ms(&self) -> u64;

    async fn invoke(&self) -> Result<ToolOutput, StageFailure>;
}

/// Whitespace-separated word count, used where a backend reports no usage.
pub fn count_words(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}
