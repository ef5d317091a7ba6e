//! Pipeline orchestrator.
//!
//! Runs retrieval, tool, generation, evaluation and remediation in order for
//! one request, each under [`run_stage`]. The per-stage failure policy is the
//! `match` on each stage result in [`Pipeline::execute`]:
//!
//! | stage       | on failure                                   |
//! |-------------|----------------------------------------------|
//! | retrieval   | continue with empty context                  |
//! | tool        | continue, remediation sees `tool_failed`     |
//! | generation  | abort, `ApiError::Generation`                |
//! | evaluation  | continue with [`EvalScores::fallback`]       |
//! | remediation | continue with no action                      |

use crate::config::AskpipeConfig;
use crate::error::ApiError;
use crate::evaluation::{DeterministicEvaluator, EvalScores, Evaluator};
use crate::provider::{
    ExtractiveGenerator, Generation, Generator, KeywordRetriever, OpenAiGenerator, Retrieval,
    Retriever, StatusTool, TokenPricing, Tool, ToolOutput,
};
use crate::remediation::{RemediationPolicy, RemediationReport, Remediator};
use crate::stage::{run_stage, StageContext, StageRun, StageSuccess};
use crate::status::{dominant_error, resolve};
use crate::taxonomy::{ErrorClassification, StageFailure};
use crate::telemetry::{
    new_trace_id, EvaluationAttrs, GenerationAttrs, LogSink, MetricsRegistry, MetricsSink,
    RemediationAttrs, RetrievalAttrs, ServiceIdentity, SpanGuard, SpanSink, StageAttrs,
    ToolAttrs, ToolResult, Tracer,
};
use crate::types::{
    AskRequest, AskResponse, ChaosFlags, RetrievalSummary, SpanStatus, Stage, StageOutcome,
    TraceInfo, Usage,
};
use std::sync::Arc;
use tracing::{info, warn, Instrument};

pub mod prompt;

/// Root span name.
pub const REQUEST_SPAN: &str = "core.request";

const DEFAULT_TOP_K: usize = 3;

/// The five-stage question-answering pipeline. Stateless across requests.
pub struct Pipeline {
    retriever: Arc<dyn Retriever>,
    tool: Arc<dyn Tool>,
    generator: Arc<dyn Generator>,
    evaluator: Arc<dyn Evaluator>,
    remediator: Arc<dyn Remediator>,
    tracer: Tracer,
    metrics: Arc<dyn MetricsSink>,
    top_k: usize,
}

/// Assembles a [`Pipeline`]; unset parts use the offline defaults.
#[derive(Default)]
pub struct PipelineBuilder {
    retriever: Option<Arc<dyn Retriever>>,
    tool: Option<Arc<dyn Tool>>,
    generator: Option<Arc<dyn Generator>>,
    evaluator: Option<Arc<dyn Evaluator>>,
    remediator: Option<Arc<dyn Remediator>>,
    spans: Option<Arc<dyn SpanSink>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    service: Option<ServiceIdentity>,
    top_k: Option<usize>,
}

impl PipelineBuilder {
    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tool = Some(tool);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn remediator(mut self, remediator: Arc<dyn Remediator>) -> Self {
        self.remediator = Some(remediator);
        self
    }

    /// Remediate with the rule-based `policy`.
    pub fn policy(self, policy: RemediationPolicy) -> Self {
        self.remediator(Arc::new(policy))
    }

    pub fn spans(mut self, spans: Arc<dyn SpanSink>) -> Self {
        self.spans = Some(spans);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn service(mut self, service: ServiceIdentity) -> Self {
        self.service = Some(service);
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn build(self) -> Pipeline {
        let spans = self.spans.unwrap_or_else(|| Arc::new(LogSink));
        Pipeline {
            retriever: self
                .retriever
                .unwrap_or_else(|| Arc::new(KeywordRetriever::builtin())),
            tool: self.tool.unwrap_or_else(|| Arc::new(StatusTool::default())),
            generator: self
                .generator
                .unwrap_or_else(|| Arc::new(ExtractiveGenerator::default())),
            evaluator: self
                .evaluator
                .unwrap_or_else(|| Arc::new(DeterministicEvaluator)),
            remediator: self
                .remediator
                .unwrap_or_else(|| Arc::new(RemediationPolicy::default())),
            tracer: Tracer::new(spans, self.service.unwrap_or_default()),
            metrics: self
                .metrics
                .unwrap_or_else(|| Arc::new(MetricsRegistry::new())),
            top_k: self.top_k.unwrap_or(DEFAULT_TOP_K).max(1),
        }
    }
}

fn not_configured(kind: &str, name: &str) -> ApiError {
    ApiError::ProviderNotConfigured(ErrorClassification::provider_not_configured(format!(
        "unknown {} provider '{}'",
        kind, name
    )))
}

/// Marks the root span with the first stage error without changing its status.
fn set_dominant_error(root: &mut SpanGuard, outcomes: &[StageOutcome], status: SpanStatus) {
    if let Some(error) = dominant_error(outcomes).and_then(|o| o.error.as_ref()) {
        root.set_error(error);
        root.set("error.stage", error_stage(outcomes).map_or("", Stage::as_str));
    }
    root.set_status(status);
}

fn error_stage(outcomes: &[StageOutcome]) -> Option<Stage> {
    dominant_error(outcomes).map(|o| o.stage)
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Wire collaborators by the provider names in `config`.
    pub fn from_config(
        config: &AskpipeConfig,
        spans: Arc<dyn SpanSink>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, ApiError> {
        let config = config.clone().validated()?;

        let retriever: Arc<dyn Retriever> = if config.retrieval.provider == KeywordRetriever::PROVIDER
        {
            match config.retrieval.corpus.as_deref() {
                Some(path) => Arc::new(KeywordRetriever::load(path)?),
                None => Arc::new(KeywordRetriever::builtin()),
            }
        } else {
            return Err(not_configured("retrieval", &config.retrieval.provider));
        };

        let generation = &config.generation;
        let pricing = TokenPricing {
            input_per_1k: generation.input_cost_per_1k,
            output_per_1k: generation.output_cost_per_1k,
        };
        let model = generation.model_or_default();
        let generator: Arc<dyn Generator> = if generation.provider == ExtractiveGenerator::PROVIDER
        {
            Arc::new(ExtractiveGenerator::new(model, pricing))
        } else if generation.provider == OpenAiGenerator::PROVIDER {
            Arc::new(
                OpenAiGenerator::new(
                    model,
                    generation.api_key.clone().unwrap_or_default(),
                    generation.endpoint.clone(),
                    pricing,
                )?
                .with_temperature(generation.temperature)
                .with_max_tokens(generation.max_tokens),
            )
        } else {
            return Err(not_configured("generation", &generation.provider));
        };

        let tool = StatusTool::new(
            config.tool.name.clone(),
            config.tool.timeout_ms,
            config.tool.result.clone(),
        );

        Ok(Self::builder()
            .retriever(retriever)
            .tool(Arc::new(tool))
            .generator(generator)
            .policy(config.remediation)
            .spans(spans)
            .metrics(metrics)
            .service(config.service.identity())
            .top_k(config.retrieval.top_k)
            .build())
    }

    /// Answer one request.
    ///
    /// Only an invalid request or a generation failure is an `Err`; every other
    /// stage failure degrades the response instead.
    pub async fn ask(&self, request: AskRequest) -> Result<AskResponse, ApiError> {
        if let Err(error) = request.validate() {
            warn!(
                request_id = %request.request_id,
                tenant_id = %request.tenant_id,
                error = %error,
                "rejecting invalid request"
            );
            return Err(ApiError::InvalidRequest(error));
        }

        let trace_id = new_trace_id(&request.request_id);
        let mut root = self.tracer.start_span(REQUEST_SPAN, &trace_id, None);
        root.set("request_id", request.request_id.as_str());
        root.set("tenant_id", request.tenant_id.as_str());
        root.set("stage", "request");
        root.set_status(SpanStatus::Ok);
        root.set("request.input.length", request.input_text.chars().count());
        let chaos = request.chaos_flags;
        root.set("chaos.break_tool", chaos.break_tool);
        root.set("chaos.bad_retrieval", chaos.bad_retrieval);
        root.set("chaos.policy_risk", chaos.policy_risk);
        root.set("chaos.token_spike", chaos.token_spike);

        let tracing_span = root.tracing_span().clone();
        let result = self
            .execute(&request, &trace_id, &mut root)
            .instrument(tracing_span)
            .await;
        root.end();
        result
    }

    /// Answer independent requests concurrently, in input order.
    pub async fn ask_batch(&self, requests: Vec<AskRequest>) -> Vec<Result<AskResponse, ApiError>> {
        futures::future::join_all(requests.into_iter().map(|request| self.ask(request))).await
    }

    async fn execute(
        &self,
        request: &AskRequest,
        trace_id: &str,
        root: &mut SpanGuard,
    ) -> Result<AskResponse, ApiError> {
        let root_span_id = root.span_id().to_string();
        let ctx = StageContext {
            tracer: &self.tracer,
            metrics: self.metrics.as_ref(),
            request_id: &request.request_id,
            tenant_id: &request.tenant_id,
            trace_id,
            parent_span_id: Some(root_span_id.as_str()),
        };
        let chaos = request.chaos_flags;
        let mut outcomes: Vec<StageOutcome> = Vec::with_capacity(Stage::ALL.len());

        let run = self.retrieve(&ctx, &request.input_text, chaos).await;
        outcomes.push(run.outcome);
        let retrieval = match run.result {
            Ok(retrieval) => retrieval,
            Err(_) => Retrieval::empty(),
        };

        let run = self.invoke_tool(&ctx, chaos).await;
        outcomes.push(run.outcome);
        let tool_failed = run.result.is_err();

        let run = self
            .generate(&ctx, &request.input_text, &retrieval.context, chaos)
            .await;
        outcomes.push(run.outcome);
        let generation = match run.result {
            Ok(generation) => generation,
            Err(error) => {
                let status = resolve(&outcomes, false, false, false);
                set_dominant_error(root, &outcomes, status);
                self.record_request(&request.tenant_id, status, &Usage::default(), root.elapsed_ms());
                warn!(
                    request_id = %request.request_id,
                    error_code = %error.code,
                    "generation failed; aborting request"
                );
                return Err(ApiError::Generation(error));
            }
        };

        let run = self
            .evaluate(&ctx, &request.input_text, &retrieval.context, &generation.text)
            .await;
        outcomes.push(run.outcome);
        let scores = match run.result {
            Ok(scores) => scores,
            Err(_) => EvalScores::fallback(),
        };

        let run = self.remediate(&ctx, &scores, tool_failed).await;
        outcomes.push(run.outcome);
        let (report, remediation_succeeded) = match run.result {
            Ok(report) => (report, true),
            Err(_) => (RemediationReport::normal(), false),
        };

        let answer = report.apply_to_answer(&generation.text);
        let has_usable_response = !answer.trim().is_empty();
        let status = resolve(
            &outcomes,
            report.triggered,
            remediation_succeeded,
            has_usable_response,
        );

        let usage = Usage {
            input_tokens: generation.input_tokens,
            output_tokens: generation.output_tokens,
            total_tokens: generation.input_tokens + generation.output_tokens,
            cost_usd: generation.cost_usd,
        };

        root.set("remediation.triggered", report.triggered);
        root.set("remediation.final_mode", report.final_mode.as_str());
        root.set("evaluation.overall", scores.overall);
        root.set("generation.tokens.total", usage.total_tokens);
        root.set("generation.cost.usd", usage.cost_usd);
        set_dominant_error(root, &outcomes, status);

        let latency_ms = root.elapsed_ms();
        self.record_request(&request.tenant_id, status, &usage, latency_ms);
        info!(
            request_id = %request.request_id,
            tenant_id = %request.tenant_id,
            status = %status,
            final_mode = report.final_mode.as_str(),
            latency_ms,
            "request completed"
        );

        Ok(AskResponse {
            request_id: request.request_id.clone(),
            tenant_id: request.tenant_id.clone(),
            answer,
            status,
            usage,
            eval: scores,
            remediation: report,
            retrieval: RetrievalSummary {
                docs: retrieval.docs,
                sources: retrieval.sources,
            },
            latency_ms,
            trace: TraceInfo {
                trace_id: trace_id.to_string(),
                span_id: root_span_id.clone(),
            },
        })
    }

    fn record_request(&self, tenant: &str, status: SpanStatus, usage: &Usage, latency_ms: u64) {
        let metrics = self.metrics.as_ref();
        metrics.increment(
            "core.requests",
            1.0,
            &[("tenant", tenant), ("status", status.as_str())],
        );
        metrics.increment("core.tokens", usage.total_tokens as f64, &[("tenant", tenant)]);
        metrics.increment("core.cost_usd", usage.cost_usd, &[("tenant", tenant)]);
        metrics.observe(
            "core.request.latency_ms",
            latency_ms as f64,
            &[("tenant", tenant), ("status", status.as_str())],
        );
    }

    async fn retrieve(
        &self,
        ctx: &StageContext<'_>,
        query: &str,
        chaos: ChaosFlags,
    ) -> StageRun<Retrieval> {
        let attrs = RetrievalAttrs {
            provider: self.retriever.provider_name().to_string(),
            top_k: self.top_k,
            docs_count: 0,
            query_length: query.chars().count(),
        };
        let top_k = self.top_k;
        run_stage(
            ctx,
            Stage::Retrieval,
            StageAttrs::Retrieval(attrs.clone()),
            move || async move {
                if chaos.bad_retrieval {
                    return Err(StageFailure::empty_result(
                        "Retrieval returned no documents (injected)",
                    ));
                }
                let retrieval = self.retriever.retrieve(query, top_k).await?;
                let attrs = StageAttrs::Retrieval(RetrievalAttrs {
                    docs_count: retrieval.docs,
                    ..attrs
                });
                let success = if retrieval.docs == 0 {
                    StageSuccess::degraded(retrieval)
                } else {
                    StageSuccess::ok(retrieval)
                };
                Ok(success.with_attrs(attrs))
            },
        )
        .await
    }

    async fn invoke_tool(&self, ctx: &StageContext<'_>, chaos: ChaosFlags) -> StageRun<ToolOutput> {
        let attrs = ToolAttrs {
            name: self.tool.name().to_string(),
            attempt: 1,
            timeout_ms: self.tool.timeout_ms(),
            result: ToolResult::Success,
        };
        run_stage(
            ctx,
            Stage::Tool,
            StageAttrs::Tool(attrs.clone()),
            move || async move {
                if chaos.break_tool {
                    return Err(StageFailure::new("Tool invocation timed out (injected)")
                        .with_code("TOOL_TIMEOUT"));
                }
                let output = self.tool.invoke().await?;
                if output.result.trim().is_empty() {
                    let attrs = StageAttrs::Tool(ToolAttrs {
                        result: ToolResult::Fallback,
                        ..attrs
                    });
                    return Ok(StageSuccess::degraded(output).with_attrs(attrs));
                }
                Ok(StageSuccess::ok(output))
            },
        )
        .await
    }

    async fn generate(
        &self,
        ctx: &StageContext<'_>,
        question: &str,
        context: &str,
        chaos: ChaosFlags,
    ) -> StageRun<Generation> {
        let repeat = if chaos.token_spike {
            prompt::TOKEN_SPIKE_REPEAT
        } else {
            1
        };
        let prompt_text = prompt::build(question, context, repeat);
        let attrs = GenerationAttrs {
            provider: self.generator.provider_name().to_string(),
            model: self.generator.model_name().to_string(),
            tokens_input: 0,
            tokens_output: 0,
            cost_usd: 0.0,
        };
        let prompt_ref = prompt_text.as_str();
        run_stage(
            ctx,
            Stage::Generation,
            StageAttrs::Generation(attrs.clone()),
            move || async move {
                let mut generation = self.generator.generate(prompt_ref).await?;
                if chaos.policy_risk {
                    generation.text = prompt::inject_policy_risk(&generation.text);
                }
                let attrs = StageAttrs::Generation(GenerationAttrs {
                    tokens_input: generation.input_tokens,
                    tokens_output: generation.output_tokens,
                    cost_usd: generation.cost_usd,
                    ..attrs
                });
                Ok(StageSuccess::ok(generation).with_attrs(attrs))
            },
        )
        .await
    }

    async fn evaluate(
        &self,
        ctx: &StageContext<'_>,
        query: &str,
        context: &str,
        answer: &str,
    ) -> StageRun<EvalScores> {
        let fallback = EvaluationAttrs::from(&EvalScores::fallback());
        run_stage(
            ctx,
            Stage::Evaluation,
            StageAttrs::Evaluation(fallback),
            move || async move {
                let scores = self.evaluator.evaluate(query, context, answer)?;
                if !scores.is_finite() {
                    return Err(StageFailure::new("Evaluator produced non-finite scores"));
                }
                let attrs = EvaluationAttrs::from(&scores);
                if StageAttrs::Evaluation(attrs.clone())
                    .validate(Stage::Evaluation)
                    .is_err()
                {
                    return Err(StageFailure::new("Evaluator produced scores outside [0, 1]"));
                }
                Ok(StageSuccess::ok(scores).with_attrs(StageAttrs::Evaluation(attrs)))
            },
        )
        .await
    }

    async fn remediate(
        &self,
        ctx: &StageContext<'_>,
        scores: &EvalScores,
        tool_failed: bool,
    ) -> StageRun<RemediationReport> {
        run_stage(
            ctx,
            Stage::Remediation,
            StageAttrs::Remediation(RemediationAttrs::pending()),
            move || async move {
                let report = self.remediator.decide(scores, tool_failed)?;
                let attrs = StageAttrs::Remediation(RemediationAttrs::from(&report));
                Ok(StageSuccess::ok(report).with_attrs(attrs))
            },
        )
        .await
    }
}
