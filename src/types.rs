//! Request, response and per-stage record types.

use crate::evaluation::EvalScores;
use crate::remediation::RemediationReport;
use crate::taxonomy::ErrorClassification;
use crate::telemetry::now_millis;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Longest accepted input text, in characters.
pub const MAX_INPUT_CHARS: usize = 8000;

/// Generate a unique request id.
pub fn new_request_id() -> String {
    let ts = now_millis();
    let pid = std::process::id();
    let seq = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("req-{ts}-{pid}-{seq}")
}

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Retrieval,
    Tool,
    Generation,
    Evaluation,
    Remediation,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Retrieval,
        Stage::Tool,
        Stage::Generation,
        Stage::Evaluation,
        Stage::Remediation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Retrieval => "retrieval",
            Stage::Tool => "tool",
            Stage::Generation => "generation",
            Stage::Evaluation => "evaluation",
            Stage::Remediation => "remediation",
        }
    }

    /// Span name for this stage.
    pub fn span_name(self) -> &'static str {
        match self {
            Stage::Retrieval => "core.retrieval",
            Stage::Tool => "core.tool",
            Stage::Generation => "core.generation",
            Stage::Evaluation => "core.evaluation",
            Stage::Remediation => "core.remediation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retrieval" => Ok(Stage::Retrieval),
            "tool" => Ok(Stage::Tool),
            "generation" => Ok(Stage::Generation),
            "evaluation" => Ok(Stage::Evaluation),
            "remediation" => Ok(Stage::Remediation),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

/// Outcome status of a span, a stage, or a whole request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanStatus {
    Ok,
    Degraded,
    Error,
}

impl SpanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SpanStatus::Ok => "OK",
            SpanStatus::Degraded => "DEGRADED",
            SpanStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fault-injection switches used for demos and resilience tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChaosFlags {
    pub break_tool: bool,
    pub bad_retrieval: bool,
    pub policy_risk: bool,
    pub token_spike: bool,
}

/// One question to answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    #[serde(default = "new_request_id")]
    pub request_id: String,
    pub tenant_id: String,
    pub input_text: String,
    #[serde(default)]
    pub chaos_flags: ChaosFlags,
}

impl AskRequest {
    pub fn new(tenant_id: impl Into<String>, input_text: impl Into<String>) -> Self {
        Self {
            request_id: new_request_id(),
            tenant_id: tenant_id.into(),
            input_text: input_text.into(),
            chaos_flags: ChaosFlags::default(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_chaos(mut self, chaos_flags: ChaosFlags) -> Self {
        self.chaos_flags = chaos_flags;
        self
    }

    /// Reject requests the pipeline cannot meaningfully run.
    pub fn validate(&self) -> Result<(), ErrorClassification> {
        if self.request_id.trim().is_empty() {
            return Err(ErrorClassification::invalid_request(
                "requestId must not be empty",
            ));
        }
        if self.tenant_id.trim().is_empty() {
            return Err(ErrorClassification::invalid_request(
                "tenantId must not be empty",
            ));
        }
        if self.input_text.trim().is_empty() {
            return Err(ErrorClassification::invalid_request(
                "inputText must not be empty",
            ));
        }
        let chars = self.input_text.chars().count();
        if chars > MAX_INPUT_CHARS {
            return Err(ErrorClassification::invalid_request(format!(
                "inputText is {chars} characters; the limit is {MAX_INPUT_CHARS}"
            )));
        }
        Ok(())
    }
}

/// Record of one completed stage. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    pub stage: Stage,
    pub status: SpanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorClassification>,
    pub latency_ms: u64,
}

impl StageOutcome {
    pub fn ok(stage: Stage, latency_ms: u64) -> Self {
        Self {
            stage,
            status: SpanStatus::Ok,
            error: None,
            latency_ms,
        }
    }

    pub fn failed(stage: Stage, error: ErrorClassification, latency_ms: u64) -> Self {
        Self {
            stage,
            status: SpanStatus::Error,
            error: Some(error),
            latency_ms,
        }
    }
}

/// Token and cost accounting for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

/// Trace correlation identifiers of the root span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceInfo {
    pub trace_id: String,
    pub span_id: String,
}

/// What retrieval contributed to the answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalSummary {
    pub docs: usize,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Response returned for every request that got past generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskResponse {
    pub request_id: String,
    pub tenant_id: String,
    pub answer: String,
    pub status: SpanStatus,
    pub usage: Usage,
    pub eval: EvalScores,
    pub remediation: RemediationReport,
    pub retrieval: RetrievalSummary,
    pub latency_ms: u64,
    pub trace: TraceInfo,
}
