//! Positioned findings attached to documents.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Source label shown next to every diagnostic Quill produces.
pub const DIAGNOSTIC_SOURCE: &str = "AI Copilot";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    #[default]
    Warning,
    Information,
}

impl Severity {
    /// Map a model-reported severity string.
    ///
    /// Total: `"error"` and `"info"` map to their counterparts, anything else
    /// (including a missing value) is a warning.
    #[must_use]
    pub fn from_model(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("error") => Self::Error,
            Some("info") => Self::Information,
            _ => Self::Warning,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which review pass produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewKind {
    /// Whole-document review. Authoritative: replaces the document's set.
    Document,
    /// Explicit review of a selection. Also authoritative.
    Selection,
    /// Stricter selection review whose findings are appended.
    Quick,
}

impl ReviewKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Selection => "selection",
            Self::Quick => "quick",
        }
    }

    /// Whether a pass of this kind replaces the existing set instead of appending.
    #[must_use]
    pub const fn replaces_existing(self) -> bool {
        matches!(self, Self::Document | Self::Selection)
    }
}

/// Editor-supplied document identity (usually a URI or path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one diagnostic instance, assigned when it enters a document's set.
///
/// Two diagnostics with identical content still have distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagnosticId(u64);

impl DiagnosticId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DiagnosticId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("line span start {start} is after end {end}")]
pub struct LineSpanError {
    start: usize,
    end: usize,
}

/// Inclusive, 0-based range of whole lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawLineSpan")]
pub struct LineSpan {
    start: usize,
    end: usize,
}

/// Unchecked wire form; bounds are validated on the way in.
#[derive(Deserialize)]
struct RawLineSpan {
    start: usize,
    end: usize,
}

impl TryFrom<RawLineSpan> for LineSpan {
    type Error = LineSpanError;

    fn try_from(raw: RawLineSpan) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

impl LineSpan {
    pub fn new(start: usize, end: usize) -> Result<Self, LineSpanError> {
        if start > end {
            return Err(LineSpanError { start, end });
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub const fn single(line: usize) -> Self {
        Self {
            start: line,
            end: line,
        }
    }

    #[must_use]
    pub const fn start(&self) -> usize {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> usize {
        self.end
    }

    /// Number of lines covered (always at least 1).
    #[must_use]
    pub const fn line_count(&self) -> usize {
        self.end - self.start + 1
    }

    #[must_use]
    pub const fn contains(&self, line: usize) -> bool {
        line >= self.start && line <= self.end
    }
}

impl fmt::Display for LineSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start + 1, self.end + 1)
    }
}

/// Position of a diagnostic: one absolute line, column span in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub line: usize,
    pub start_col: usize,
    pub end_col: usize,
}

impl TextRange {
    /// Range covering a whole line of `len` characters.
    #[must_use]
    pub const fn full_line(line: usize, len: usize) -> Self {
        Self {
            line,
            start_col: 0,
            end_col: len,
        }
    }
}

/// A resolved finding that has not yet been registered with a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticDraft {
    pub range: TextRange,
    pub message: String,
    pub severity: Severity,
    pub origin: ReviewKind,
}

/// A positioned, severity-tagged finding attached to a document line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    id: DiagnosticId,
    range: TextRange,
    message: String,
    severity: Severity,
    source: &'static str,
    origin: ReviewKind,
}

impl Diagnostic {
    #[must_use]
    pub fn from_draft(id: DiagnosticId, draft: DiagnosticDraft) -> Self {
        Self {
            id,
            range: draft.range,
            message: draft.message,
            severity: draft.severity,
            source: DIAGNOSTIC_SOURCE,
            origin: draft.origin,
        }
    }

    #[must_use]
    pub const fn id(&self) -> DiagnosticId {
        self.id
    }

    #[must_use]
    pub const fn range(&self) -> TextRange {
        self.range
    }

    #[must_use]
    pub const fn line(&self) -> usize {
        self.range.line
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub const fn source(&self) -> &'static str {
        self.source
    }

    #[must_use]
    pub const fn origin(&self) -> ReviewKind {
        self.origin
    }

    /// Same finding moved to another line, keeping its identity.
    #[must_use]
    pub fn relocated(&self, range: TextRange) -> Self {
        Self {
            range,
            ..self.clone()
        }
    }

    /// Content equality ignoring identity.
    #[must_use]
    pub fn same_finding(&self, other: &Self) -> bool {
        self.range == other.range
            && self.message == other.message
            && self.severity == other.severity
            && self.origin == other.origin
    }
}
