//! Stage-specific span attributes.
//!
//! Each stage has a closed, typed attribute set. Keys are fixed strings so
//! downstream dashboards can rely on them.

use crate::evaluation::EvalScores;
use crate::remediation::RemediationReport;
use crate::types::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A primitive span attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Float(v) => Some(*v),
            AttrValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(v) => write!(f, "{v}"),
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::Str(v) => f.write_str(v),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        AttrValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<u32> for AttrValue {
    fn from(v: u32) -> Self {
        AttrValue::Int(i64::from(v))
    }
}

impl From<usize> for AttrValue {
    fn from(v: usize) -> Self {
        AttrValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalAttrs {
    pub provider: String,
    pub top_k: usize,
    pub docs_count: usize,
    pub query_length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ToolResult {
    Success,
    Failure,
    Fallback,
}

impl ToolResult {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolResult::Success => "SUCCESS",
            ToolResult::Failure => "FAILURE",
            ToolResult::Fallback => "FALLBACK",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolAttrs {
    pub name: String,
    pub attempt: u32,
    pub timeout_ms: u64,
    pub result: ToolResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationAttrs {
    pub provider: String,
    pub model: String,
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub cost_usd: f64,
}

impl GenerationAttrs {
    pub fn tokens_total(&self) -> u64 {
        self.tokens_input + self.tokens_output
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationAttrs {
    pub faithfulness: f64,
    pub relevance: f64,
    pub policy_risk: f64,
    pub hallucination: f64,
    pub overall: f64,
}

impl From<&EvalScores> for EvaluationAttrs {
    fn from(scores: &EvalScores) -> Self {
        Self {
            faithfulness: scores.faithfulness,
            relevance: scores.relevance,
            policy_risk: scores.policy_risk,
            hallucination: scores.hallucination,
            overall: scores.overall,
        }
    }
}

pub const NO_ACTION: &str = "NONE";

#[derive(Debug, Clone, PartialEq)]
pub struct RemediationAttrs {
    pub triggered: bool,
    pub action: String,
    pub reason: String,
}

impl RemediationAttrs {
    pub fn pending() -> Self {
        Self {
            triggered: false,
            action: NO_ACTION.to_string(),
            reason: String::new(),
        }
    }
}

impl From<&RemediationReport> for RemediationAttrs {
    fn from(report: &RemediationReport) -> Self {
        match report.action() {
            Some(action) => Self {
                triggered: report.triggered,
                action: action.action_type.as_str().to_string(),
                reason: action.reason.clone(),
            },
            None => Self {
                triggered: report.triggered,
                ..Self::pending()
            },
        }
    }
}

/// Required attributes for one stage span.
#[derive(Debug, Clone, PartialEq)]
pub enum StageAttrs {
    Retrieval(RetrievalAttrs),
    Tool(ToolAttrs),
    Generation(GenerationAttrs),
    Evaluation(EvaluationAttrs),
    Remediation(RemediationAttrs),
}

fn require_text(key: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{key} must not be empty"));
    }
    Ok(())
}

fn require_unit(key: &str, value: f64) -> Result<(), String> {
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("{key} must be within [0, 1], got {value}"));
    }
    Ok(())
}

impl StageAttrs {
    pub fn stage(&self) -> Stage {
        match self {
            StageAttrs::Retrieval(_) => Stage::Retrieval,
            StageAttrs::Tool(_) => Stage::Tool,
            StageAttrs::Generation(_) => Stage::Generation,
            StageAttrs::Evaluation(_) => Stage::Evaluation,
            StageAttrs::Remediation(_) => Stage::Remediation,
        }
    }

    /// Check that the attribute set belongs to `stage` and is complete.
    pub fn validate(&self, stage: Stage) -> Result<(), String> {
        if self.stage() != stage {
            return Err(format!(
                "{} attributes supplied for the {} stage",
                self.stage(),
                stage
            ));
        }
        match self {
            StageAttrs::Retrieval(a) => {
                require_text("retrieval.provider", &a.provider)?;
                if a.top_k == 0 {
                    return Err("retrieval.top_k must be at least 1".to_string());
                }
            }
            StageAttrs::Tool(a) => {
                require_text("tool.name", &a.name)?;
                if a.attempt == 0 {
                    return Err("tool.attempt must be at least 1".to_string());
                }
                if a.timeout_ms == 0 {
                    return Err("tool.timeout_ms must be at least 1".to_string());
                }
            }
            StageAttrs::Generation(a) => {
                require_text("generation.provider", &a.provider)?;
                require_text("generation.model", &a.model)?;
            }
            StageAttrs::Evaluation(a) => {
                require_unit("evaluation.faithfulness", a.faithfulness)?;
                require_unit("evaluation.relevance", a.relevance)?;
                require_unit("evaluation.policy_risk", a.policy_risk)?;
                require_unit("evaluation.hallucination", a.hallucination)?;
                require_unit("evaluation.overall", a.overall)?;
            }
            StageAttrs::Remediation(a) => {
                require_text("remediation.action", &a.action)?;
                if a.triggered && a.action == NO_ACTION {
                    return Err("remediation.action must name the action taken".to_string());
                }
            }
        }
        Ok(())
    }

    /// Adjust attributes for a failed stage run.
    pub fn mark_failed(&mut self) {
        if let StageAttrs::Tool(a) = self {
            a.result = ToolResult::Failure;
        }
    }

    /// Attribute key/value pairs, in a fixed order.
    pub fn entries(&self) -> Vec<(&'static str, AttrValue)> {
        match self {
            StageAttrs::Retrieval(a) => vec![
                ("retrieval.provider", a.provider.as_str().into()),
                ("retrieval.top_k", a.top_k.into()),
                ("retrieval.docs.count", a.docs_count.into()),
                ("retrieval.query.length", a.query_length.into()),
            ],
            StageAttrs::Tool(a) => vec![
                ("tool.name", a.name.as_str().into()),
                ("tool.attempt", a.attempt.into()),
                ("tool.timeout_ms", a.timeout_ms.into()),
                ("tool.result", a.result.as_str().into()),
            ],
            StageAttrs::Generation(a) => vec![
                ("generation.provider", a.provider.as_str().into()),
                ("generation.model", a.model.as_str().into()),
                ("generation.tokens.input", a.tokens_input.into()),
                ("generation.tokens.output", a.tokens_output.into()),
                ("generation.tokens.total", a.tokens_total().into()),
                ("generation.cost.usd", a.cost_usd.into()),
            ],
            StageAttrs::Evaluation(a) => vec![
                ("evaluation.faithfulness", a.faithfulness.into()),
                ("evaluation.relevance", a.relevance.into()),
                ("evaluation.policy_risk", a.policy_risk.into()),
                ("evaluation.hallucination", a.hallucination.into()),
                ("evaluation.overall", a.overall.into()),
            ],
            StageAttrs::Remediation(a) => vec![
                ("remediation.triggered", a.triggered.into()),
                ("remediation.action", a.action.as_str().into()),
                ("remediation.reason", a.reason.as_str().into()),
            ],
        }
    }
}
