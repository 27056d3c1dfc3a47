//! Coordinate mapping from model-relative lines to document lines.

use quill_types::{DiagnosticDraft, ReviewKind, Severity, TextRange};

use crate::document::Document;
use crate::parse::RawIssue;

/// Absolute 0-based document line for a 1-based, excerpt-relative model line.
///
/// Missing lines count as line 1. The result is always inside
/// `[0, line_count)`; an empty document is treated as a single line.
#[must_use]
pub fn map_line(line: Option<i64>, excerpt_start: usize, line_count: usize) -> usize {
    let last = line_count.max(1) - 1;
    let start = i64::try_from(excerpt_start).unwrap_or(i64::MAX);
    let absolute = line.unwrap_or(1).saturating_sub(1).saturating_add(start);
    usize::try_from(absolute).map_or(0, |line| line.min(last))
}

/// Position a raw issue on a whole document line.
#[must_use]
pub fn resolve(
    issue: RawIssue,
    excerpt_start: usize,
    document: &dyn Document,
    origin: ReviewKind,
) -> DiagnosticDraft {
    let line = map_line(issue.line, excerpt_start, document.line_count());
    let range = document
        .line_range(line)
        .unwrap_or(TextRange::full_line(line, 0));
    DiagnosticDraft {
        range,
        message: issue.message,
        severity: Severity::from_model(issue.severity.as_deref()),
        origin,
    }
}
