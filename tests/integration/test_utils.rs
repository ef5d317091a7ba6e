//! Shared test utilities for integration tests
//!
//! A pipeline wired to an in-memory span sink and metrics registry, plus
//! collaborators that fail on demand.

#![allow(dead_code)]

use askpipe::evaluation::{EvalScores, Evaluator};
use askpipe::pipeline::{Pipeline, PipelineBuilder};
use askpipe::provider::{Generation, Generator, Retrieval, Retriever, Tool, ToolOutput};
use askpipe::remediation::{RemediationReport, Remediator};
use askpipe::taxonomy::StageFailure;
use askpipe::telemetry::{MetricsRegistry, RecordingSink};
use askpipe::{AskRequest, ChaosFlags};
use async_trait::async_trait;
use std::sync::Arc;

pub const TENANT: &str = "acme";
pub const QUESTION: &str = "What is observability?";

pub struct Harness {
    pub pipeline: Pipeline,
    pub spans: Arc<RecordingSink>,
    pub metrics: Arc<MetricsRegistry>,
}

pub fn harness() -> Harness {
    harness_with(|builder| builder)
}

pub fn harness_with(configure: impl FnOnce(PipelineBuilder) -> PipelineBuilder) -> Harness {
    let spans = Arc::new(RecordingSink::new());
    let metrics = Arc::new(MetricsRegistry::new());
    let builder = Pipeline::builder()
        .spans(spans.clone())
        .metrics(metrics.clone());
    Harness {
        pipeline: configure(builder).build(),
        spans,
        metrics,
    }
}

pub fn request() -> AskRequest {
    AskRequest::new(TENANT, QUESTION)
}

pub fn chaos_request(chaos: ChaosFlags) -> AskRequest {
    request().with_chaos(chaos)
}

pub struct FailingRetriever(pub StageFailure);

#[async_trait]
impl Retriever for FailingRetriever {
    fn provider_name(&self) -> &str {
        "failing"
    }

    async fn retrieve(&self, _query: &str, _top_k: usize) -> Result<Retrieval, StageFailure> {
        Err(self.0.clone())
    }
}

pub struct FailingGenerator(pub StageFailure);

#[async_trait]
impl Generator for FailingGenerator {
    fn provider_name(&self) -> &str {
        "failing"
    }

    fn model_name(&self) -> &str {
        "failing-v0"
    }

    async fn generate(&self, _prompt: &str) -> Result<Generation, StageFailure> {
        Err(self.0.clone())
    }
}

/// Returns the same text for every prompt.
pub struct FixedGenerator(pub &'static str);

#[async_trait]
impl Generator for FixedGenerator {
    fn provider_name(&self) -> &str {
        "fixed"
    }

    fn model_name(&self) -> &str {
        "fixed-v0"
    }

    async fn generate(&self, prompt: &str) -> Result<Generation, StageFailure> {
        Ok(Generation {
            text: self.0.to_string(),
            input_tokens: askpipe::provider::count_words(prompt),
            output_tokens: askpipe::provider::count_words(self.0),
            cost_usd: 0.0,
        })
    }
}

pub struct FailingTool(pub StageFailure);

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "failing_tool"
    }

    fn timeout_ms(&self) -> u64 {
        500
    }

    async fn invoke(&self) -> Result<ToolOutput, StageFailure> {
        Err(self.0.clone())
    }
}

pub struct FailingEvaluator;

impl Evaluator for FailingEvaluator {
    fn name(&self) -> &str {
        "failing"
    }

    fn evaluate(&self, _: &str, _: &str, _: &str) -> Result<EvalScores, StageFailure> {
        Err(StageFailure::new("evaluator crashed"))
    }
}

pub struct NanEvaluator;

impl Evaluator for NanEvaluator {
    fn name(&self) -> &str {
        "nan"
    }

    fn evaluate(&self, _: &str, _: &str, _: &str) -> Result<EvalScores, StageFailure> {
        Ok(EvalScores {
            faithfulness: f64::NAN,
            ..EvalScores::fallback()
        })
    }
}

pub struct FailingRemediator;

impl Remediator for FailingRemediator {
    fn name(&self) -> &str {
        "failing"
    }

    fn decide(&self, _: &EvalScores, _: bool) -> Result<RemediationReport, StageFailure> {
        Err(StageFailure::new("remediation crashed"))
    }
}
