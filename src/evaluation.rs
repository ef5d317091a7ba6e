//! Deterministic answer evaluation.
//!
//! Scores a generated answer against the question and the retrieved context on
//! four dimensions plus a weighted composite. No network calls and no randomness:
//! identical inputs always produce bit-identical scores.

use crate::taxonomy::StageFailure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub mod patterns;

/// Weights applied to faithfulness, relevance, (1 - policy risk), (1 - hallucination).
pub const FAITHFULNESS_WEIGHT: f64 = 0.3;
pub const RELEVANCE_WEIGHT: f64 = 0.3;
pub const SAFETY_WEIGHT: f64 = 0.2;
pub const GROUNDING_WEIGHT: f64 = 0.2;

const SENTENCE_PREFIX_BOOST: f64 = 0.2;
const QUESTION_RESTATE_BOOST: f64 = 0.3;
const SENTENCE_PREFIX_CHARS: usize = 30;
const MIN_SENTENCE_PREFIX_CHARS: usize = 12;
const QUERY_PREFIX_CHARS: usize = 10;
const SENTENCES_CHECKED: usize = 3;
const RISK_PATTERNS_FOR_MAX: f64 = 3.0;

/// Faithfulness when there is no context to check against.
pub const UNVERIFIED_FAITHFULNESS: f64 = 0.5;
/// Hallucination when there is no context to check against.
pub const UNVERIFIED_HALLUCINATION: f64 = 0.3;

pub const EVALUATION_FAILURE_REASON: &str = "Evaluation engine failure";

/// Scores for one answer. All values lie in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalScores {
    pub faithfulness: f64,
    pub relevance: f64,
    pub policy_risk: f64,
    pub hallucination: f64,
    pub overall: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl EvalScores {
    /// Neutral scores used when the evaluation stage fails.
    pub fn fallback() -> Self {
        Self {
            faithfulness: 0.5,
            relevance: 0.5,
            policy_risk: 0.1,
            hallucination: 0.3,
            overall: 0.5,
            reasons: vec![EVALUATION_FAILURE_REASON.to_string()],
        }
    }

    /// True when every score is a finite number.
    pub fn is_finite(&self) -> bool {
        [
            self.faithfulness,
            self.relevance,
            self.policy_risk,
            self.hallucination,
            self.overall,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Weighted composite of the four dimensions, clamped to [0, 1].
pub fn composite(faithfulness: f64, relevance: f64, policy_risk: f64, hallucination: f64) -> f64 {
    clamp01(
        FAITHFULNESS_WEIGHT * faithfulness
            + RELEVANCE_WEIGHT * relevance
            + SAFETY_WEIGHT * (1.0 - policy_risk)
            + GROUNDING_WEIGHT * (1.0 - hallucination),
    )
}

/// Lowercased alphanumeric tokens longer than two characters, deduplicated.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

/// Jaccard overlap of two token sets; zero when both are empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn char_prefix(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect::<String>().trim().to_string()
}

fn quotes_leading_sentence(answer_lower: &str, context: &str) -> bool {
    sentences(context).take(SENTENCES_CHECKED).any(|sentence| {
        let prefix = char_prefix(&sentence.to_lowercase(), SENTENCE_PREFIX_CHARS);
        prefix.chars().count() >= MIN_SENTENCE_PREFIX_CHARS && answer_lower.contains(&prefix)
    })
}

fn restates_question(answer_lower: &str, query: &str) -> bool {
    let prefix = char_prefix(&query.trim().to_lowercase(), QUERY_PREFIX_CHARS);
    !prefix.is_empty() && answer_lower.contains(&prefix)
}

/// Score `answer` against `query` and retrieved `context`.
pub fn evaluate(query: &str, context: &str, answer: &str) -> EvalScores {
    let answer_lower = answer.to_lowercase();
    let answer_tokens = tokenize(answer);
    let has_context = !context.trim().is_empty();
    let mut reasons = Vec::new();

    let faithfulness = if has_context {
        let mut score = jaccard(&answer_tokens, &tokenize(context));
        if quotes_leading_sentence(&answer_lower, context) {
            score = (score + SENTENCE_PREFIX_BOOST).min(1.0);
            reasons.push("Answer quotes retrieved context".to_string());
        }
        if score < 0.5 {
            reasons.push("Answer is weakly supported by retrieved context".to_string());
        }
        score
    } else {
        reasons.push("No retrieved context; faithfulness cannot be verified".to_string());
        UNVERIFIED_FAITHFULNESS
    };

    let mut relevance = jaccard(&answer_tokens, &tokenize(query));
    if restates_question(&answer_lower, query) {
        relevance = (relevance + QUESTION_RESTATE_BOOST).min(1.0);
        reasons.push("Answer restates the question".to_string());
    }
    if relevance < 0.3 {
        reasons.push("Answer shares little vocabulary with the question".to_string());
    }

    let matched = patterns::matched_patterns(answer);
    let policy_risk = (matched.len() as f64 / RISK_PATTERNS_FOR_MAX).min(1.0);
    if !matched.is_empty() {
        reasons.push(format!("Policy risk patterns matched: {}", matched.join(", ")));
    }

    let hallucination = if has_context {
        1.0 - faithfulness
    } else {
        UNVERIFIED_HALLUCINATION
    };

    let faithfulness = clamp01(faithfulness);
    let relevance = clamp01(relevance);
    let policy_risk = clamp01(policy_risk);
    let hallucination = clamp01(hallucination);
    let overall = composite(faithfulness, relevance, policy_risk, hallucination);

    EvalScores {
        faithfulness,
        relevance,
        policy_risk,
        hallucination,
        overall,
        reasons,
    }
}

/// Evaluation backend used by the evaluation stage.
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, query: &str, context: &str, answer: &str)
        -> Result<EvalScores, StageFailure>;
}

/// The built-in rule-based evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicEvaluator;

impl Evaluator for DeterministicEvaluator {
    fn name(&self) -> &str {
        "deterministic"
    }

    fn evaluate(
        &self,
        query: &str,
        context: &str,
        answer: &str,
    ) -> Result<EvalScores, StageFailure> {
        Ok(evaluate(query, context, answer))
    }
}
