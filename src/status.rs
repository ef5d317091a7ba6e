//! Status resolution: folds stage outcomes and the remediation result into the
//! final request status used for SLO accounting.

use crate::types::{SpanStatus, StageOutcome};

/// Resolve the final request status.
///
/// Rules are evaluated in priority order. A stage error on its own never
/// escalates to `Error` while an answer can still be returned; `Error` is
/// reserved for the no-usable-output case.
pub fn resolve(
    outcomes: &[StageOutcome],
    remediation_triggered: bool,
    remediation_succeeded: bool,
    has_usable_response: bool,
) -> SpanStatus {
    let any_stage_error = outcomes.iter().any(|outcome| outcome.error.is_some());

    if !has_usable_response {
        return SpanStatus::Error;
    }
    if any_stage_error && remediation_succeeded {
        return SpanStatus::Degraded;
    }
    if remediation_triggered && remediation_succeeded {
        return SpanStatus::Degraded;
    }
    if remediation_triggered && !remediation_succeeded && !has_usable_response {
        return SpanStatus::Error;
    }
    if any_stage_error && has_usable_response {
        return SpanStatus::Degraded;
    }
    SpanStatus::Ok
}

/// First stage error in pipeline order; reported on the root span.
pub fn dominant_error(outcomes: &[StageOutcome]) -> Option<&StageOutcome> {
    outcomes
        .iter()
        .filter(|outcome| outcome.error.is_some())
        .min_by_key(|outcome| outcome.stage)
}
