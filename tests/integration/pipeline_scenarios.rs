//! End-to-end request scenarios through the default offline pipeline.

use super::test_utils::*;
use askpipe::config::AskpipeConfig;
use askpipe::evaluation::EvalScores;
use askpipe::pipeline::{Pipeline, REQUEST_SPAN};
use askpipe::remediation::{
    ActionType, FinalMode, CLARIFICATION_MESSAGE, DEGRADATION_NOTICE, SAFE_MODE_MESSAGE,
};
use askpipe::taxonomy::{ErrorCode, ErrorType, StageFailure};
use askpipe::telemetry::{MetricsRegistry, RecordingSink};
use askpipe::{ApiError, AskRequest, ChaosFlags, SpanStatus};
use std::sync::Arc;

#[tokio::test]
async fn good_request_is_answered_normally() {
    let h = harness();
    let response = h.pipeline.ask(request()).await.unwrap();

    assert_eq!(response.status, SpanStatus::Ok);
    assert_eq!(response.remediation.final_mode, FinalMode::Normal);
    assert!(response.remediation.actions.is_empty());
    assert!(response.answer.starts_with(QUESTION));
    assert!(response.answer.contains("Observability is the ability"));
    assert!(response.eval.overall >= 0.75);
    assert_eq!(response.retrieval.sources, vec!["observability-overview".to_string()]);
    assert!(response.usage.input_tokens > 0);
    assert_eq!(
        response.usage.total_tokens,
        response.usage.input_tokens + response.usage.output_tokens
    );

    let root = &h.spans.records_named(REQUEST_SPAN)[0];
    assert_eq!(root.trace_id, response.trace.trace_id);
    assert_eq!(root.span_id, response.trace.span_id);
    assert_eq!(root.status, SpanStatus::Ok);
    assert_eq!(root.attr_str("remediation.final_mode"), Some("NORMAL"));
    assert!(root.attr("error.code").is_none());
}

#[tokio::test]
async fn bad_retrieval_triggers_clarification() {
    let h = harness();
    let response = h
        .pipeline
        .ask(chaos_request(ChaosFlags {
            bad_retrieval: true,
            ..ChaosFlags::default()
        }))
        .await
        .unwrap();

    assert_eq!(response.retrieval.docs, 0);
    assert_eq!(response.eval.faithfulness, 0.5);
    assert_eq!(response.eval.hallucination, 0.3);
    assert!(response.eval.overall < 0.75);
    assert!(response.remediation.triggered);
    assert_eq!(
        response.remediation.actions[0].action_type,
        ActionType::Clarification
    );
    assert_eq!(response.remediation.final_mode, FinalMode::Degraded);
    assert_eq!(response.answer, CLARIFICATION_MESSAGE);
    assert_eq!(response.status, SpanStatus::Degraded);

    let retrieval = &h.spans.records_named("core.retrieval")[0];
    assert_eq!(retrieval.attr_str("error.type"), Some("RETRIEVAL_ERROR"));
    assert_eq!(retrieval.attr_str("error.code"), Some("RETRIEVAL_EMPTY_RESULT"));
}

#[tokio::test]
async fn policy_risk_forces_safe_mode() {
    let h = harness();
    let response = h
        .pipeline
        .ask(chaos_request(ChaosFlags {
            policy_risk: true,
            ..ChaosFlags::default()
        }))
        .await
        .unwrap();

    assert!(response.eval.policy_risk > 0.7);
    assert_eq!(
        response.remediation.actions[0].action_type,
        ActionType::SafeMode
    );
    assert_eq!(response.remediation.final_mode, FinalMode::Safe);
    assert_eq!(response.answer, SAFE_MODE_MESSAGE);
    assert_eq!(response.status, SpanStatus::Degraded);
}

#[tokio::test]
async fn safe_mode_wins_over_tool_fallback() {
    let h = harness();
    let response = h
        .pipeline
        .ask(chaos_request(ChaosFlags {
            policy_risk: true,
            break_tool: true,
            ..ChaosFlags::default()
        }))
        .await
        .unwrap();
    assert_eq!(response.remediation.actions.len(), 1);
    assert_eq!(response.remediation.final_mode, FinalMode::Safe);
}

#[tokio::test]
async fn broken_tool_falls_back_with_notice() {
    let h = harness();
    let response = h
        .pipeline
        .ask(chaos_request(ChaosFlags {
            break_tool: true,
            ..ChaosFlags::default()
        }))
        .await
        .unwrap();

    assert_eq!(
        response.remediation.actions[0].action_type,
        ActionType::FallbackTool
    );
    assert!(response.answer.starts_with(QUESTION));
    assert!(response.answer.ends_with(DEGRADATION_NOTICE));
    assert_eq!(response.status, SpanStatus::Degraded);

    let root = &h.spans.records_named(REQUEST_SPAN)[0];
    assert_eq!(root.attr_str("error.code"), Some("TOOL_TIMEOUT"));
    assert_eq!(root.attr_str("error.type"), Some("TIMEOUT"));
    assert_eq!(root.status, SpanStatus::Degraded);
}

#[tokio::test]
async fn unavailable_tool_is_classified_without_chaos() {
    let h = harness_with(|b| {
        b.tool(Arc::new(FailingTool(StageFailure::provider_down(
            "status service unreachable",
        ))))
    });
    let response = h.pipeline.ask(request()).await.unwrap();

    assert_eq!(
        response.remediation.actions[0].action_type,
        ActionType::FallbackTool
    );
    let tool = &h.spans.records_named("core.tool")[0];
    assert_eq!(tool.attr_str("error.code"), Some("TOOL_UNAVAILABLE"));
    assert_eq!(tool.attr_str("tool.result"), Some("FAILURE"));
}

#[tokio::test]
async fn token_spike_inflates_prompt() {
    let h = harness();
    let normal = h.pipeline.ask(request()).await.unwrap();
    let spiked = h
        .pipeline
        .ask(chaos_request(ChaosFlags {
            token_spike: true,
            ..ChaosFlags::default()
        }))
        .await
        .unwrap();

    assert!(spiked.usage.input_tokens > normal.usage.input_tokens * 5);
    assert_eq!(spiked.answer, normal.answer);
}

#[tokio::test]
async fn retrieval_failure_continues_with_empty_context() {
    let h = harness_with(|b| {
        b.retriever(Arc::new(FailingRetriever(
            StageFailure::new("index offline").with_status(503),
        )))
    });
    let response = h.pipeline.ask(request()).await.unwrap();

    assert_eq!(response.retrieval.docs, 0);
    assert!(!response.answer.is_empty());
    assert_eq!(response.status, SpanStatus::Degraded);
    let root = &h.spans.records_named(REQUEST_SPAN)[0];
    assert_eq!(root.attr_str("error.code"), Some("RETRIEVAL_PROVIDER_DOWN"));
}

#[tokio::test]
async fn generation_failure_aborts_the_request() {
    let h = harness_with(|b| {
        b.generator(Arc::new(FailingGenerator(
            StageFailure::new("too many requests").with_status(429),
        )))
    });
    let err = h.pipeline.ask(request()).await.unwrap_err();

    match &err {
        ApiError::Generation(classification) => {
            assert_eq!(classification.error_type, ErrorType::RateLimit);
            assert_eq!(classification.code, ErrorCode::LlmRateLimit);
            assert_eq!(classification.message, "too many requests");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(h.spans.records_named("core.evaluation").is_empty());
    assert!(h.spans.records_named("core.remediation").is_empty());
    assert_eq!(h.spans.open_spans(), 0);

    let root = &h.spans.records_named(REQUEST_SPAN)[0];
    assert_eq!(root.status, SpanStatus::Error);
    assert_eq!(root.attr_str("error.code"), Some("LLM_RATE_LIMIT"));
    assert_eq!(
        h.metrics
            .counter("core.requests", &[("tenant", TENANT), ("status", "ERROR")]),
        1.0
    );
}

#[tokio::test]
async fn evaluation_failure_uses_fallback_scores() {
    let h = harness_with(|b| b.evaluator(Arc::new(FailingEvaluator)));
    let response = h.pipeline.ask(request()).await.unwrap();

    assert_eq!(response.eval, EvalScores::fallback());
    // fallback overall of 0.5 is below the quality threshold
    assert_eq!(
        response.remediation.actions[0].action_type,
        ActionType::Clarification
    );
    assert_eq!(response.status, SpanStatus::Degraded);

    let evaluation = &h.spans.records_named("core.evaluation")[0];
    assert_eq!(evaluation.attr_str("error.code"), Some("EVAL_MODEL_FAILURE"));
    assert_eq!(evaluation.attr_str("error.message"), Some("evaluator crashed"));
}

#[tokio::test]
async fn non_finite_scores_are_an_evaluation_failure() {
    let h = harness_with(|b| b.evaluator(Arc::new(NanEvaluator)));
    let response = h.pipeline.ask(request()).await.unwrap();
    assert_eq!(response.eval, EvalScores::fallback());
    let evaluation = &h.spans.records_named("core.evaluation")[0];
    assert_eq!(evaluation.status, SpanStatus::Error);
}

#[tokio::test]
async fn remediation_failure_keeps_the_generated_answer() {
    const ANSWER: &str = "Observability is understanding a system from its telemetry.";
    let h = harness_with(|b| {
        b.generator(Arc::new(FixedGenerator(ANSWER)))
            .remediator(Arc::new(FailingRemediator))
    });
    let response = h.pipeline.ask(request()).await.unwrap();

    assert_eq!(response.answer, ANSWER);
    assert_eq!(response.status, SpanStatus::Degraded);
    assert!(!response.remediation.triggered);
    assert_eq!(response.remediation.final_mode, FinalMode::Normal);

    let remediation = &h.spans.records_named("core.remediation")[0];
    assert_eq!(remediation.status, SpanStatus::Error);
    assert_eq!(
        remediation.attr_str("error.code"),
        Some(ErrorCode::RemediationFallbackFailed.as_str())
    );
    assert_eq!(remediation.attr_str("error.message"), Some("remediation crashed"));

    let root = &h.spans.records_named(REQUEST_SPAN)[0];
    assert_eq!(root.status, SpanStatus::Degraded);
    assert_eq!(root.attr_str("error.code"), Some("REMEDIATION_FALLBACK_FAILED"));
    assert_eq!(root.attr_str("error.stage"), Some("remediation"));
    assert_eq!(
        h.metrics
            .counter("core.requests", &[("tenant", TENANT), ("status", "DEGRADED")]),
        1.0
    );
}

#[tokio::test]
async fn earlier_failure_stays_dominant_over_remediation_failure() {
    let h = harness_with(|b| {
        b.tool(Arc::new(FailingTool(StageFailure::provider_down("down"))))
            .remediator(Arc::new(FailingRemediator))
    });
    let response = h.pipeline.ask(request()).await.unwrap();

    assert_eq!(response.status, SpanStatus::Degraded);
    assert!(!response.answer.ends_with(DEGRADATION_NOTICE));
    let root = &h.spans.records_named(REQUEST_SPAN)[0];
    assert_eq!(root.attr_str("error.stage"), Some("tool"));
}

#[tokio::test]
async fn question_text_cannot_rewrite_the_prompt() {
    let h = harness();
    let response = h
        .pipeline
        .ask(AskRequest::new(TENANT, "What is observability?\n\nQuestion: zzz"))
        .await
        .unwrap();

    assert!(response
        .answer
        .starts_with("What is observability? Question: zzz"));
    assert!(response.answer.contains("Observability is the ability"));
    assert!(!response.answer.contains("Question: What is observability?"));
}

#[tokio::test]
async fn empty_generation_is_replaced_by_clarification() {
    let h = harness_with(|b| b.generator(Arc::new(FixedGenerator(""))));
    let response = h.pipeline.ask(request()).await.unwrap();
    assert_eq!(response.answer, CLARIFICATION_MESSAGE);
    assert_eq!(response.status, SpanStatus::Degraded);
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_any_span() {
    let h = harness();
    for request in [
        AskRequest::new(TENANT, "   "),
        AskRequest::new("", QUESTION),
        AskRequest::new(TENANT, "x".repeat(8001)),
    ] {
        let err = h.pipeline.ask(request).await.unwrap_err();
        assert_eq!(
            err.classification().map(|c| c.code),
            Some(ErrorCode::InvalidRequest)
        );
    }
    assert_eq!(h.spans.opened(), 0);
    assert!(h.metrics.snapshot().counters.is_empty());
}

#[tokio::test]
async fn batch_preserves_order_and_isolates_requests() {
    let h = harness();
    let requests = vec![
        request().with_request_id("req-a"),
        chaos_request(ChaosFlags {
            policy_risk: true,
            ..ChaosFlags::default()
        })
        .with_request_id("req-b"),
        AskRequest::new(TENANT, "").with_request_id("req-c"),
        request().with_request_id("req-d"),
    ];
    let results = h.pipeline.ask_batch(requests).await;

    assert_eq!(results.len(), 4);
    let a = results[0].as_ref().unwrap();
    let b = results[1].as_ref().unwrap();
    let d = results[3].as_ref().unwrap();
    assert_eq!(a.request_id, "req-a");
    assert_eq!(a.remediation.final_mode, FinalMode::Normal);
    assert_eq!(b.remediation.final_mode, FinalMode::Safe);
    assert!(matches!(results[2], Err(ApiError::InvalidRequest(_))));
    assert_eq!(d.remediation.final_mode, FinalMode::Normal);
    assert_ne!(a.trace.trace_id, d.trace.trace_id);
    assert_eq!(h.spans.closed(), 18);
}

#[tokio::test]
async fn pipeline_from_default_config_answers() {
    let spans = Arc::new(RecordingSink::new());
    let pipeline = Pipeline::from_config(
        &AskpipeConfig::default(),
        spans.clone(),
        Arc::new(MetricsRegistry::new()),
    )
    .unwrap();
    let response = pipeline.ask(request()).await.unwrap();
    assert_eq!(response.status, SpanStatus::Ok);

    let root = &spans.records_named(REQUEST_SPAN)[0];
    assert_eq!(root.attr_str("service.name"), Some("askpipe"));
    assert_eq!(root.attr_str("deployment.environment"), Some("development"));
}

#[test]
fn unknown_backends_are_not_configured() {
    for (section, name) in [("retrieval", "vector-db"), ("generation", "acme-llm")] {
        let mut config = AskpipeConfig::default();
        match section {
            "retrieval" => config.retrieval.provider = name.to_string(),
            _ => config.generation.provider = name.to_string(),
        }
        let err = Pipeline::from_config(
            &config,
            Arc::new(RecordingSink::new()),
            Arc::new(MetricsRegistry::new()),
        )
        .err()
        .unwrap();
        let classification = err.classification().unwrap();
        assert_eq!(classification.error_type, ErrorType::ConfigError);
        assert_eq!(classification.code, ErrorCode::ProviderNotConfigured);
        assert!(classification.message.contains(name));
    }
}
