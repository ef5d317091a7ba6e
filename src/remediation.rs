//! Remediation policy: decides from the evaluation scores whether the answer
//! must be overridden, and how the outcome is tagged.

use crate::evaluation::EvalScores;
use crate::taxonomy::StageFailure;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Answer returned instead of an unsafe one.
pub const SAFE_MODE_MESSAGE: &str = "I can't share that response because it may contain sensitive or unsafe content. Please rephrase your request.";

/// Answer returned instead of a low-confidence one.
pub const CLARIFICATION_MESSAGE: &str = "I'm not confident I can answer that accurately with the information available. Could you clarify or add more detail to your question?";

/// Appended when a supporting tool failed.
pub const DEGRADATION_NOTICE: &str =
    "\n\n[Note: a supporting tool was unavailable, so this answer may be incomplete.]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Clarification,
    SafeMode,
    FallbackTool,
    RetryLlm,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Clarification => "CLARIFICATION",
            ActionType::SafeMode => "SAFE_MODE",
            ActionType::FallbackTool => "FALLBACK_TOOL",
            ActionType::RetryLlm => "RETRY_LLM",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FinalMode {
    Normal,
    Safe,
    Degraded,
}

impl FinalMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FinalMode::Normal => "NORMAL",
            FinalMode::Safe => "SAFE",
            FinalMode::Degraded => "DEGRADED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationReport {
    pub triggered: bool,
    pub actions: Vec<RemediationAction>,
    pub final_mode: FinalMode,
}

impl RemediationReport {
    pub fn normal() -> Self {
        Self {
            triggered: false,
            actions: Vec::new(),
            final_mode: FinalMode::Normal,
        }
    }

    fn single(action_type: ActionType, reason: String, final_mode: FinalMode) -> Self {
        Self {
            triggered: true,
            actions: vec![RemediationAction {
                action_type,
                reason,
            }],
            final_mode,
        }
    }

    /// The action taken, if any. At most one is ever produced.
    pub fn action(&self) -> Option<&RemediationAction> {
        self.actions.first()
    }

    /// Apply the answer transform implied by this report.
    pub fn apply_to_answer(&self, answer: &str) -> String {
        match (self.final_mode, self.action().map(|a| a.action_type)) {
            (FinalMode::Safe, _) => SAFE_MODE_MESSAGE.to_string(),
            (FinalMode::Degraded, Some(ActionType::FallbackTool)) => {
                format!("{answer}{DEGRADATION_NOTICE}")
            }
            (FinalMode::Degraded, Some(ActionType::Clarification)) => {
                CLARIFICATION_MESSAGE.to_string()
            }
            _ => answer.to_string(),
        }
    }
}

/// Which score gates the clarification rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTrigger {
    /// `overall < quality_threshold`
    #[default]
    Overall,
    /// `faithfulness < faithfulness_threshold`
    Faithfulness,
}

/// Thresholds for the remediation rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationPolicy {
    pub policy_risk_threshold: f64,
    pub quality_threshold: f64,
    pub faithfulness_threshold: f64,
    pub trigger: QualityTrigger,
}

impl Default for RemediationPolicy {
    fn default() -> Self {
        Self {
            policy_risk_threshold: 0.7,
            quality_threshold: 0.75,
            faithfulness_threshold: 0.8,
            trigger: QualityTrigger::Overall,
        }
    }
}

impl RemediationPolicy {
    /// Decide the remediation for one request. First matching rule wins.
    ///
    /// Fails only when the scores are not finite numbers.
    pub fn decide(
        &self,
        scores: &EvalScores,
        tool_failed: bool,
    ) -> Result<RemediationReport, StageFailure> {
        if !scores.is_finite() {
            return Err(StageFailure::new(
                "Evaluation scores contain non-finite values",
            ));
        }

        if scores.policy_risk > self.policy_risk_threshold {
            return Ok(RemediationReport::single(
                ActionType::SafeMode,
                format!(
                    "Policy risk {:.2} exceeds {:.2}",
                    scores.policy_risk, self.policy_risk_threshold
                ),
                FinalMode::Safe,
            ));
        }
        if tool_failed {
            return Ok(RemediationReport::single(
                ActionType::FallbackTool,
                "Tool invocation failed".to_string(),
                FinalMode::Degraded,
            ));
        }
        let low_quality = match self.trigger {
            QualityTrigger::Overall => scores.overall < self.quality_threshold,
            QualityTrigger::Faithfulness => scores.faithfulness < self.faithfulness_threshold,
        };
        if low_quality {
            let reason = match self.trigger {
                QualityTrigger::Overall => format!(
                    "Overall score {:.2} below {:.2}",
                    scores.overall, self.quality_threshold
                ),
                QualityTrigger::Faithfulness => format!(
                    "Faithfulness {:.2} below {:.2}",
                    scores.faithfulness, self.faithfulness_threshold
                ),
            };
            return Ok(RemediationReport::single(
                ActionType::Clarification,
                reason,
                FinalMode::Degraded,
            ));
        }
        Ok(RemediationReport::normal())
    }
}

/// Decides the remediation for one request from its evaluation.
pub trait Remediator: Send + Sync {
    fn name(&self) -> &str;

    fn decide(
        &self,
        scores: &EvalScores,
        tool_failed: bool,
    ) -> Result<RemediationReport, StageFailure>;
}

impl Remediator for RemediationPolicy {
    fn name(&self) -> &str {
        "rules"
    }

    fn decide(
        &self,
        scores: &EvalScores,
        tool_failed: bool,
    ) -> Result<RemediationReport, StageFailure> {
        RemediationPolicy::decide(self, scores, tool_failed)
    }
}

/// Decide with the default thresholds.
pub fn remediate(
    scores: &EvalScores,
    tool_failed: bool,
) -> Result<RemediationReport, StageFailure> {
    RemediationPolicy::default().decide(scores, tool_failed)
}
