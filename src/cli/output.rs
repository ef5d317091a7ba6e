//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain errors to a string for CLI output. Classified errors lead with
/// their stable code.
pub fn map_error(e: &ApiError) -> String {
    match e.classification() {
        Some(classification) => format!("error[{}]: {}", classification.code, e),
        None => format!("error: {}", e),
    }
}
