//! Span sinks: in-memory recording, structured log export, and fan-out.

use crate::telemetry::span::{SpanRecord, SpanSink, SpanStart};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle event as seen by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SpanEvent {
    Opened(SpanStart),
    Closed(SpanRecord),
}

#[derive(Default)]
struct RecordingState {
    events: Vec<SpanEvent>,
    opened: usize,
    closed: usize,
}

/// Keeps every span event in memory.
#[derive(Default)]
pub struct RecordingSink {
    state: Mutex<RecordingState>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> usize {
        self.state.lock().opened
    }

    pub fn closed(&self) -> usize {
        self.state.lock().closed
    }

    /// Number of spans opened but not yet closed.
    pub fn open_spans(&self) -> usize {
        let state = self.state.lock();
        state.opened.saturating_sub(state.closed)
    }

    pub fn events(&self) -> Vec<SpanEvent> {
        self.state.lock().events.clone()
    }

    /// Closed spans, in close order.
    pub fn records(&self) -> Vec<SpanRecord> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                SpanEvent::Closed(record) => Some(record.clone()),
                SpanEvent::Opened(_) => None,
            })
            .collect()
    }

    pub fn records_named(&self, name: &str) -> Vec<SpanRecord> {
        self.records()
            .into_iter()
            .filter(|record| record.name == name)
            .collect()
    }

    pub fn records_for_trace(&self, trace_id: &str) -> Vec<SpanRecord> {
        self.records()
            .into_iter()
            .filter(|record| record.trace_id == trace_id)
            .collect()
    }

    pub fn clear(&self) {
        *self.state.lock() = RecordingState::default();
    }
}

impl SpanSink for RecordingSink {
    fn on_start(&self, span: &SpanStart) {
        let mut state = self.state.lock();
        state.opened += 1;
        state.events.push(SpanEvent::Opened(span.clone()));
    }

    fn on_end(&self, span: SpanRecord) {
        let mut state = self.state.lock();
        state.closed += 1;
        state.events.push(SpanEvent::Closed(span));
    }
}

/// Exports each closed span as one structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl SpanSink for LogSink {
    fn on_start(&self, span: &SpanStart) {
        debug!(
            target: "askpipe::spans",
            span = %span.name,
            trace_id = %span.trace_id,
            span_id = %span.span_id,
            "span opened"
        );
    }

    fn on_end(&self, span: SpanRecord) {
        let attributes = match serde_json::to_string(&span.attributes) {
            Ok(json) => json,
            Err(err) => {
                warn!(span = %span.name, error = %err, "failed to serialize span attributes");
                String::from("{}")
            }
        };
        info!(
            target: "askpipe::spans",
            span = %span.name,
            trace_id = %span.trace_id,
            span_id = %span.span_id,
            parent_span_id = span.parent_span_id.as_deref().unwrap_or(""),
            status = %span.status,
            duration_ms = span.duration_ms,
            attributes = %attributes,
            "span closed"
        );
    }
}

/// Forwards every event to each inner sink.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn SpanSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn SpanSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn SpanSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl SpanSink for FanoutSink {
    fn on_start(&self, span: &SpanStart) {
        for sink in &self.sinks {
            sink.on_start(span);
        }
    }

    fn on_end(&self, span: SpanRecord) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.on_end(span.clone());
            }
            last.on_end(span);
        }
    }
}
