//! Stage execution under the span contract.
//!
//! [`run_stage`] is the only way the pipeline executes a stage. For every call
//! it opens exactly one span, stamps the identity and stage attributes on it,
//! runs the work, classifies a failure through the taxonomy, and closes the
//! span exactly once on every exit path, including the caller dropping the
//! future before it completes.

use crate::taxonomy::{classify, ErrorClassification, StageFailure};
use crate::telemetry::{MetricsSink, SpanGuard, StageAttrs, Tracer};
use crate::types::{SpanStatus, Stage, StageOutcome};
use std::future::Future;
use tracing::{debug, warn, Instrument};

/// Identity shared by every stage span of one request.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub tracer: &'a Tracer,
    pub metrics: &'a dyn MetricsSink,
    pub request_id: &'a str,
    pub tenant_id: &'a str,
    pub trace_id: &'a str,
    pub parent_span_id: Option<&'a str>,
}

/// Successful stage work: the value plus the final span status and attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSuccess<T> {
    pub value: T,
    pub status: SpanStatus,
    pub attrs: Option<StageAttrs>,
}

impl<T> StageSuccess<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value,
            status: SpanStatus::Ok,
            attrs: None,
        }
    }

    /// The stage produced a usable but impaired result.
    pub fn degraded(value: T) -> Self {
        Self {
            value,
            status: SpanStatus::Degraded,
            attrs: None,
        }
    }

    /// Replace the stage attributes set when the span opened.
    pub fn with_attrs(mut self, attrs: StageAttrs) -> Self {
        self.attrs = Some(attrs);
        self
    }
}

/// Result of one stage run together with its outcome record.
#[derive(Debug, Clone, PartialEq)]
pub struct StageRun<T> {
    pub result: Result<T, ErrorClassification>,
    pub outcome: StageOutcome,
}

fn check_attrs(stage: Stage, attrs: &StageAttrs) {
    if cfg!(debug_assertions) {
        if let Err(problem) = attrs.validate(stage) {
            panic!("invalid {stage} span attributes: {problem}");
        }
    }
}

/// Run `work` as the `stage` stage of the request described by `ctx`.
///
/// Attribute completeness is checked only in debug builds, where an
/// incomplete set panics before any span is opened.
pub async fn run_stage<T, F, Fut>(
    ctx: &StageContext<'_>,
    stage: Stage,
    attrs: StageAttrs,
    work: F,
) -> StageRun<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<StageSuccess<T>, StageFailure>>,
{
    check_attrs(stage, &attrs);

    let mut span = ctx
        .tracer
        .start_span(stage.span_name(), ctx.trace_id, ctx.parent_span_id);
    span.set("request_id", ctx.request_id);
    span.set("tenant_id", ctx.tenant_id);
    span.set("stage", stage.as_str());
    span.set_status(SpanStatus::Ok);
    span.set_attrs(&attrs);

    let tracing_span = span.tracing_span().clone();
    let result = work().instrument(tracing_span).await;

    let run = match result {
        Ok(success) => {
            if let Some(updated) = success.attrs.as_ref() {
                check_attrs(stage, updated);
                span.set_attrs(updated);
            }
            span.set_status(success.status);
            debug!(stage = %stage, status = %success.status, "stage completed");
            let outcome = StageOutcome {
                stage,
                status: success.status,
                error: None,
                latency_ms: span.elapsed_ms(),
            };
            StageRun {
                result: Ok(success.value),
                outcome,
            }
        }
        Err(failure) => {
            let error = classify(stage, &failure);
            let mut failed_attrs = attrs;
            failed_attrs.mark_failed();
            span.set_attrs(&failed_attrs);
            span.set_error(&error);
            warn!(
                stage = %stage,
                error_type = %error.error_type,
                error_code = %error.code,
                error_message = %error.message,
                "stage failed"
            );
            let outcome = StageOutcome::failed(stage, error.clone(), span.elapsed_ms());
            StageRun {
                result: Err(error),
                outcome,
            }
        }
    };

    close(span, ctx.metrics, &run.outcome);
    run
}

fn close(span: SpanGuard, metrics: &dyn MetricsSink, outcome: &StageOutcome) {
    span.end();
    metrics.observe(
        "core.stage.latency_ms",
        outcome.latency_ms as f64,
        &[
            ("stage", outcome.stage.as_str()),
            ("status", outcome.status.as_str()),
        ],
    );
    if let Some(error) = outcome.error.as_ref() {
        metrics.increment(
            "core.stage.errors",
            1.0,
            &[("stage", outcome.stage.as_str()), ("code", error.code.as_str())],
        );
    }
}
