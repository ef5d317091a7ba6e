//! Telemetry domain: span contract primitives, span sinks, and process-wide metrics.

mod types;

pub mod attrs;
pub mod metrics;
pub mod sinks;
pub mod span;

pub use attrs::{
    AttrValue, EvaluationAttrs, GenerationAttrs, RemediationAttrs, RetrievalAttrs, StageAttrs,
    ToolAttrs, ToolResult,
};
pub use metrics::{HistogramSnapshot, MetricsRegistry, MetricsSink, MetricsSnapshot};
pub use sinks::{FanoutSink, LogSink, RecordingSink, SpanEvent};
pub use span::{ServiceIdentity, SpanGuard, SpanRecord, SpanSink, SpanStart, Tracer};
pub use types::{new_span_id, new_trace_id, now_millis};
