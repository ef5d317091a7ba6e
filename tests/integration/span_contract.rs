//! Span contract: every stage span opens once, closes once, and carries its
//! fixed attribute set on every exit path.

use super::test_utils::*;
use askpipe::pipeline::REQUEST_SPAN;
use askpipe::provider::{Generation, Generator};
use askpipe::taxonomy::StageFailure;
use askpipe::telemetry::SpanRecord;
use askpipe::{ChaosFlags, SpanStatus};
use async_trait::async_trait;
use futures::FutureExt;
use std::sync::Arc;

const MANDATORY: [&str; 7] = [
    "request_id",
    "tenant_id",
    "stage",
    "status",
    "service.name",
    "deployment.environment",
    "latency_ms",
];

fn stage_keys(name: &str) -> &'static [&'static str] {
    match name {
        "core.retrieval" => &[
            "retrieval.provider",
            "retrieval.top_k",
            "retrieval.docs.count",
            "retrieval.query.length",
        ],
        "core.tool" => &["tool.name", "tool.attempt", "tool.timeout_ms", "tool.result"],
        "core.generation" => &[
            "generation.provider",
            "generation.model",
            "generation.tokens.input",
            "generation.tokens.output",
            "generation.tokens.total",
            "generation.cost.usd",
        ],
        "core.evaluation" => &[
            "evaluation.faithfulness",
            "evaluation.relevance",
            "evaluation.policy_risk",
            "evaluation.hallucination",
            "evaluation.overall",
        ],
        "core.remediation" => &[
            "remediation.triggered",
            "remediation.action",
            "remediation.reason",
        ],
        _ => &[
            "request.input.length",
            "chaos.break_tool",
            "chaos.bad_retrieval",
            "chaos.policy_risk",
            "chaos.token_spike",
            "remediation.triggered",
            "remediation.final_mode",
            "evaluation.overall",
            "generation.tokens.total",
            "generation.cost.usd",
        ],
    }
}

fn assert_contract(record: &SpanRecord) {
    for key in MANDATORY.iter().chain(stage_keys(&record.name)) {
        assert!(
            record.attr(key).is_some(),
            "{} is missing {}",
            record.name,
            key
        );
    }
    assert_eq!(record.attr_str("status"), Some(record.status.as_str()));
    if record.status == SpanStatus::Error {
        for key in ["error.type", "error.code", "error.message"] {
            assert!(record.attr(key).is_some(), "{} is missing {}", record.name, key);
        }
    }
}

fn all_chaos() -> Vec<ChaosFlags> {
    let mut flags = Vec::new();
    for bits in 0u8..16 {
        flags.push(ChaosFlags {
            break_tool: bits & 1 != 0,
            bad_retrieval: bits & 2 != 0,
            policy_risk: bits & 4 != 0,
            token_spike: bits & 8 != 0,
        });
    }
    flags
}

#[tokio::test]
async fn every_chaos_combination_honors_the_contract() {
    for chaos in all_chaos() {
        let h = harness();
        let response = h.pipeline.ask(chaos_request(chaos)).await.unwrap();

        assert_eq!(h.spans.opened(), 6, "{chaos:?}");
        assert_eq!(h.spans.closed(), 6, "{chaos:?}");

        let records = h.spans.records();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "core.retrieval",
                "core.tool",
                "core.generation",
                "core.evaluation",
                "core.remediation",
                REQUEST_SPAN,
            ]
        );

        for record in &records {
            assert_eq!(record.trace_id, response.trace.trace_id);
            assert_eq!(record.attr_str("request_id"), Some(response.request_id.as_str()));
            assert_eq!(record.attr_str("tenant_id"), Some(TENANT));
            assert_contract(record);
            if record.name == REQUEST_SPAN {
                assert!(record.parent_span_id.is_none());
                assert_eq!(record.attr_str("stage"), Some("request"));
                assert_eq!(record.status, response.status);
            } else {
                assert_eq!(
                    record.parent_span_id.as_deref(),
                    Some(response.trace.span_id.as_str())
                );
            }
        }
    }
}

#[tokio::test]
async fn span_ids_are_unique_within_a_trace() {
    let h = harness();
    h.pipeline.ask(request()).await.unwrap();
    let mut ids: Vec<String> = h.spans.records().into_iter().map(|r| r.span_id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 6);
}

#[tokio::test]
async fn failed_stage_carries_error_and_failure_result() {
    let h = harness();
    h.pipeline
        .ask(chaos_request(ChaosFlags {
            break_tool: true,
            ..ChaosFlags::default()
        }))
        .await
        .unwrap();

    let tool = &h.spans.records_named("core.tool")[0];
    assert_eq!(tool.status, SpanStatus::Error);
    assert_eq!(tool.attr_str("error.type"), Some("TIMEOUT"));
    assert_eq!(tool.attr_str("error.code"), Some("TOOL_TIMEOUT"));
    assert_eq!(tool.attr_str("tool.result"), Some("FAILURE"));

    let remediation = &h.spans.records_named("core.remediation")[0];
    assert_eq!(remediation.attr_str("remediation.action"), Some("FALLBACK_TOOL"));
    assert_eq!(
        remediation.attr("remediation.triggered").and_then(|v| v.as_bool()),
        Some(true)
    );
    assert_eq!(
        h.metrics
            .counter("core.stage.errors", &[("stage", "tool"), ("code", "TOOL_TIMEOUT")]),
        1.0
    );
}

#[tokio::test]
async fn empty_retrieval_marks_span_degraded() {
    let h = harness();
    h.pipeline
        .ask(askpipe::AskRequest::new(TENANT, "zzz qqq xyzzy"))
        .await
        .unwrap();
    let retrieval = &h.spans.records_named("core.retrieval")[0];
    assert_eq!(retrieval.status, SpanStatus::Degraded);
    assert_eq!(
        retrieval.attr("retrieval.docs.count").and_then(|v| v.as_i64()),
        Some(0)
    );
    assert!(retrieval.attr("error.code").is_none());
}

#[tokio::test]
async fn generation_span_reports_usage() {
    let h = harness();
    let response = h.pipeline.ask(request()).await.unwrap();
    let generation = &h.spans.records_named("core.generation")[0];
    assert_eq!(
        generation
            .attr("generation.tokens.total")
            .and_then(|v| v.as_i64()),
        Some(response.usage.total_tokens as i64)
    );
    assert_eq!(generation.attr_str("generation.model"), Some("extractive-v1"));
}

struct HangingGenerator;

#[async_trait]
impl Generator for HangingGenerator {
    fn provider_name(&self) -> &str {
        "hanging"
    }

    fn model_name(&self) -> &str {
        "hanging-v0"
    }

    async fn generate(&self, _prompt: &str) -> Result<Generation, StageFailure> {
        futures::future::pending().await
    }
}

#[test]
fn abandoned_request_closes_every_open_span() {
    let h = harness_with(|b| b.generator(Arc::new(HangingGenerator)));
    let polled = h.pipeline.ask(request()).now_or_never();

    assert!(polled.is_none());
    // root, retrieval, tool, generation
    assert_eq!(h.spans.opened(), 4);
    assert_eq!(h.spans.closed(), 4);
    assert_eq!(h.spans.open_spans(), 0);
}

#[tokio::test]
async fn stage_latency_is_observed_per_stage() {
    let h = harness();
    h.pipeline.ask(request()).await.unwrap();
    for stage in ["retrieval", "tool", "generation", "evaluation", "remediation"] {
        let histogram = h
            .metrics
            .histogram("core.stage.latency_ms", &[("stage", stage), ("status", "OK")])
            .unwrap_or_else(|| panic!("no latency for {stage}"));
        assert_eq!(histogram.count, 1);
    }
}
