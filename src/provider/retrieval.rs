//! Keyword retrieval over an in-memory document corpus.

use crate::error::ApiError;
use crate::evaluation::tokenize;
use crate::provider::{Retrieval, Retriever};
use crate::taxonomy::StageFailure;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub text: String,
}

impl Document {
    pub fn new(id: &str, title: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            text: text.to_string(),
        }
    }
}

fn builtin_corpus() -> Vec<Document> {
    vec![
        Document::new(
            "observability-overview",
            "Observability overview",
            "Observability is the ability to understand the internal state of a system from the telemetry it emits. Traces, metrics and logs are the three primary telemetry signals.",
        ),
        Document::new(
            "distributed-tracing",
            "Distributed tracing",
            "A trace records the path of one request through a system as a tree of spans. Each span carries a name, timing data and a set of attributes.",
        ),
        Document::new(
            "service-level-objectives",
            "Service level objectives",
            "A service level objective sets a target for the share of requests that succeed within a latency budget. Degraded responses count against the objective but still return an answer.",
        ),
        Document::new(
            "counters-histograms",
            "Counters and histograms",
            "Counters only ever increase and are safe to update from many requests at once. Histograms summarize the distribution of values such as request latency.",
        ),
        Document::new(
            "answer-remediation",
            "Answer remediation",
            "Remediation replaces or annotates an answer when quality checks fail. Unsafe answers are refused and weak answers ask the user for clarification.",
        ),
    ]
}

/// Ranks documents by how many distinct query tokens they contain.
#[derive(Debug, Clone)]
pub struct KeywordRetriever {
    corpus: Vec<Document>,
}

impl Default for KeywordRetriever {
    fn default() -> Self {
        Self::builtin()
    }
}

impl KeywordRetriever {
    pub const PROVIDER: &'static str = "keyword";

    /// Retriever over the small built-in corpus.
    pub fn builtin() -> Self {
        Self {
            corpus: builtin_corpus(),
        }
    }

    pub fn from_documents(corpus: Vec<Document>) -> Self {
        Self { corpus }
    }

    /// Load a JSON array of documents.
    pub fn load(path: &Path) -> Result<Self, ApiError> {
        let raw = std::fs::read_to_string(path)?;
        let corpus: Vec<Document> = serde_json::from_str(&raw).map_err(|e| {
            ApiError::ConfigError(format!(
                "Failed to parse corpus {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self::from_documents(corpus))
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    fn rank(&self, query: &str, top_k: usize) -> Vec<&Document> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(usize, &Document)> = self
            .corpus
            .iter()
            .filter_map(|doc| {
                let doc_tokens = tokenize(&format!("{} {}", doc.title, doc.text));
                let hits = query_tokens.intersection(&doc_tokens).count();
                (hits > 0).then_some((hits, doc))
            })
            .collect();
        // Stable: ties keep corpus order.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(top_k).map(|(_, doc)| doc).collect()
    }
}

#[async_trait]
impl Retriever for KeywordRetriever {
    fn provider_name(&self) -> &str {
        Self::PROVIDER
    }

    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Retrieval, StageFailure> {
        let ranked = self.rank(query, top_k);
        debug!(docs = ranked.len(), top_k, "keyword retrieval ranked corpus");
        if ranked.is_empty() {
            return Ok(Retrieval::empty());
        }
        Ok(Retrieval {
            context: ranked
                .iter()
                .map(|doc| doc.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
            docs: ranked.len(),
            sources: ranked.iter().map(|doc| doc.id.clone()).collect(),
        })
    }
}
