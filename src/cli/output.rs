//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::AnalyzerError;
use std::error::Error;

/// Map domain errors to a one-line message prefixed with the error kind.
pub fn map_error(e: &AnalyzerError) -> String {
    format!("[{}] {}", e.kind(), e)
}

/// The error followed by every `source()` beneath it, one per line.
pub fn error_chain(e: &(dyn Error + 'static)) -> String {
    let mut out = e.to_string();
    let mut current = e.source();
    while let Some(cause) = current {
        out.push_str("\n  caused by: ");
        out.push_str(&cause.to_string());
        current = cause.source();
    }
    out
}
