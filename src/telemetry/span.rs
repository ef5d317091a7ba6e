//! Traced units of work.
//!
//! A [`SpanGuard`] is opened by the [`Tracer`] and reports to a [`SpanSink`]
//! exactly once when it is closed, whether by `end`, by an early return, or by
//! being dropped mid-flight.

use crate::taxonomy::ErrorClassification;
use crate::telemetry::attrs::{AttrValue, StageAttrs};
use crate::telemetry::types::new_span_id;
use crate::types::SpanStatus;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Identity stamped on every span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub name: String,
    pub environment: String,
}

impl Default for ServiceIdentity {
    fn default() -> Self {
        Self {
            name: "askpipe".to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Emitted when a span opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanStart {
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub name: String,
}

/// A closed span with its attribute bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub name: String,
    pub start_time: String,
    pub duration_ms: u64,
    pub status: SpanStatus,
    pub attributes: BTreeMap<String, AttrValue>,
}

impl SpanRecord {
    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attr(key).and_then(AttrValue::as_str)
    }
}

/// Destination for span lifecycle events.
pub trait SpanSink: Send + Sync {
    fn on_start(&self, span: &SpanStart);

    fn on_end(&self, span: SpanRecord);
}

/// Opens spans stamped with the service identity.
#[derive(Clone)]
pub struct Tracer {
    sink: Arc<dyn SpanSink>,
    service: ServiceIdentity,
}

impl Tracer {
    pub fn new(sink: Arc<dyn SpanSink>, service: ServiceIdentity) -> Self {
        Self { sink, service }
    }

    pub fn service(&self) -> &ServiceIdentity {
        &self.service
    }

    /// Open a span. The returned guard closes it exactly once.
    pub fn start_span(
        &self,
        name: &'static str,
        trace_id: &str,
        parent_span_id: Option<&str>,
    ) -> SpanGuard {
        let span_id = new_span_id(trace_id);
        let start = SpanStart {
            trace_id: trace_id.to_string(),
            span_id: span_id.clone(),
            parent_span_id: parent_span_id.map(str::to_string),
            name: name.to_string(),
        };
        self.sink.on_start(&start);

        let tracing_span = tracing::info_span!(
            "span",
            otel.name = name,
            trace_id = %trace_id,
            span_id = %span_id,
            request_id = tracing::field::Empty,
            tenant_id = tracing::field::Empty,
            stage = tracing::field::Empty,
            status = tracing::field::Empty,
        );

        let mut guard = SpanGuard {
            sink: Arc::clone(&self.sink),
            trace_id: start.trace_id.clone(),
            span_id,
            record: Some(SpanRecord {
                trace_id: start.trace_id,
                span_id: start.span_id,
                parent_span_id: start.parent_span_id,
                name: start.name,
                start_time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                duration_ms: 0,
                status: SpanStatus::Ok,
                attributes: BTreeMap::new(),
            }),
            started: Instant::now(),
            tracing_span,
        };
        guard.set("service.name", self.service.name.as_str());
        guard.set("deployment.environment", self.service.environment.as_str());
        guard
    }
}

/// An open span. Closing happens on drop; `end` is the explicit spelling.
pub struct SpanGuard {
    sink: Arc<dyn SpanSink>,
    trace_id: String,
    span_id: String,
    record: Option<SpanRecord>,
    started: Instant,
    tracing_span: tracing::Span,
}

impl SpanGuard {
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    /// The `tracing` span mirroring this unit, for log correlation.
    pub fn tracing_span(&self) -> &tracing::Span {
        &self.tracing_span
    }

    pub fn set(&mut self, key: &str, value: impl Into<AttrValue>) {
        let value = value.into();
        match &value {
            AttrValue::Str(s) => {
                self.tracing_span.record(key, s.as_str());
            }
            AttrValue::Int(v) => {
                self.tracing_span.record(key, *v);
            }
            AttrValue::Float(v) => {
                self.tracing_span.record(key, *v);
            }
            AttrValue::Bool(v) => {
                self.tracing_span.record(key, *v);
            }
        }
        if let Some(record) = self.record.as_mut() {
            record.attributes.insert(key.to_string(), value);
        }
    }

    pub fn set_attrs(&mut self, attrs: &StageAttrs) {
        for (key, value) in attrs.entries() {
            self.set(key, value);
        }
    }

    pub fn set_status(&mut self, status: SpanStatus) {
        self.set("status", status.as_str());
        if let Some(record) = self.record.as_mut() {
            record.status = status;
        }
    }

    pub fn status(&self) -> Option<SpanStatus> {
        self.record.as_ref().map(|r| r.status)
    }

    /// Attach error attributes and mark the span `ERROR`.
    pub fn set_error(&mut self, error: &ErrorClassification) {
        self.set("error.type", error.error_type.as_str());
        self.set("error.code", error.code.as_str());
        self.set("error.message", error.message.as_str());
        self.set_status(SpanStatus::Error);
    }

    /// Milliseconds since the span opened.
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Close the span.
    pub fn end(self) {}

    fn close(&mut self) {
        if let Some(mut record) = self.record.take() {
            let latency_ms = self.elapsed_ms();
            record.duration_ms = latency_ms;
            record
                .attributes
                .insert("latency_ms".to_string(), AttrValue::from(latency_ms));
            record.attributes.insert(
                "status".to_string(),
                AttrValue::from(record.status.as_str()),
            );
            self.sink.on_end(record);
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.close();
    }
}
