//! Policy risk pattern library scanned against generated answers.

use once_cell::sync::Lazy;
use regex::Regex;

/// A named pattern whose presence in an answer counts toward policy risk.
pub struct RiskPattern {
    pub name: &'static str,
    pub regex: Regex,
}

fn pattern(name: &'static str, source: &str) -> RiskPattern {
    RiskPattern {
        name,
        regex: Regex::new(source).expect("risk pattern must compile"),
    }
}

static RISK_PATTERNS: Lazy<Vec<RiskPattern>> = Lazy::new(|| {
    vec![
        pattern("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
        pattern("credit_card", r"\b(?:\d{4}[ -]?){3}\d{4}\b"),
        pattern(
            "email",
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
        ),
        pattern(
            "secret_assignment",
            r"(?i)\b(?:password|passwd|secret|api[_-]?key|key|token)\s*=\s*\S+",
        ),
        pattern(
            "destructive_action",
            r"(?i)\b(?:rm\s+-rf|drop\s+(?:table|database)|truncate\s+table|delete\s+all|format\s+(?:the\s+)?(?:disk|drive)|wipe\s+(?:the\s+)?(?:disk|database))\b",
        ),
        pattern("abuse", r"(?i)\b(?:hack|exploit|bypass)(?:s|ed|ing)?\b"),
    ]
});

/// All risk patterns, in a fixed order.
pub fn risk_patterns() -> &'static [RiskPattern] {
    &RISK_PATTERNS
}

/// Names of the patterns that match `text`, in library order. Each pattern counts once.
pub fn matched_patterns(text: &str) -> Vec<&'static str> {
    risk_patterns()
        .iter()
        .filter(|p| p.regex.is_match(text))
        .map(|p| p.name)
        .collect()
}
