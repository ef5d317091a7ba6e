//! CLI presentation: text and json formatters per command.

use crate::error::ApiError;
use crate::evaluation::EvalScores;
use crate::telemetry::SpanRecord;
use crate::types::{AskResponse, SpanStatus};
use comfy_table::presets::{UTF8_BORDERS_ONLY, UTF8_FULL};
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;

fn to_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn format_status(status: SpanStatus, color: bool) -> String {
    if !color {
        return status.as_str().to_string();
    }
    match status {
        SpanStatus::Ok => status.as_str().green().to_string(),
        SpanStatus::Degraded => status.as_str().yellow().to_string(),
        SpanStatus::Error => status.as_str().red().to_string(),
    }
}

fn format_header(title: &str, color: bool) -> String {
    if color {
        format!("{}", title.bold().underline())
    } else {
        title.to_string()
    }
}

/// Score table, one metric per row.
pub fn format_scores_table(scores: &EvalScores) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Metric", "Score"]);
    for (name, value) in [
        ("faithfulness", scores.faithfulness),
        ("relevance", scores.relevance),
        ("policy_risk", scores.policy_risk),
        ("hallucination", scores.hallucination),
        ("overall", scores.overall),
    ] {
        table.add_row(vec![name.to_string(), format!("{:.3}", value)]);
    }
    table.to_string()
}

/// Span table in emission order.
pub fn format_spans_table(spans: &[SpanRecord]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Span", "Status", "Latency (ms)", "Error"]);
    for span in spans {
        table.add_row(vec![
            span.name.clone(),
            span.status.as_str().to_string(),
            span.duration_ms.to_string(),
            span.attr_str("error.code").unwrap_or("-").to_string(),
        ]);
    }
    table.to_string()
}

pub fn format_ask_text(response: &AskResponse, spans: Option<&[SpanRecord]>, color: bool) -> String {
    let mut out = String::new();
    out.push_str(&format_header("Answer", color));
    out.push('\n');
    out.push_str(&response.answer);
    out.push_str("\n\n");

    out.push_str(&format!(
        "Status:      {}\n",
        format_status(response.status, color)
    ));
    out.push_str(&format!(
        "Mode:        {}\n",
        response.remediation.final_mode.as_str()
    ));
    if let Some(action) = response.remediation.action() {
        out.push_str(&format!(
            "Remediation: {} ({})\n",
            action.action_type, action.reason
        ));
    }
    out.push_str(&format!(
        "Retrieval:   {} doc(s) {}\n",
        response.retrieval.docs,
        response.retrieval.sources.join(", ")
    ));
    out.push_str(&format!(
        "Tokens:      {} in / {} out / {} total, ${:.6}\n",
        response.usage.input_tokens,
        response.usage.output_tokens,
        response.usage.total_tokens,
        response.usage.cost_usd
    ));
    out.push_str(&format!("Latency:     {} ms\n", response.latency_ms));
    out.push_str(&format!(
        "Trace:       {} / {}\n\n",
        response.trace.trace_id, response.trace.span_id
    ));
    out.push_str(&format_scores_table(&response.eval));

    if let Some(spans) = spans {
        out.push_str("\n\n");
        out.push_str(&format_header("Spans", color));
        out.push('\n');
        out.push_str(&format_spans_table(spans));
    }
    out
}

pub fn format_ask_json(response: &AskResponse, spans: Option<&[SpanRecord]>) -> Result<String, ApiError> {
    match spans {
        Some(spans) => to_json(&serde_json::json!({
            "response": response,
            "spans": spans,
        })),
        None => to_json(response),
    }
}

pub fn format_eval(scores: &EvalScores, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return to_json(scores);
    }
    let mut out = format_scores_table(scores);
    if !scores.reasons.is_empty() {
        out.push('\n');
        for reason in &scores.reasons {
            out.push_str(&format!("- {}\n", reason));
        }
    }
    Ok(out)
}
