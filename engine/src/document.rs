//! Document collaborator.
//!
//! The editor owns the text; the engine only sees it through [`Document`].
//! [`TextDocument`] is the in-memory implementation used by the CLI and tests.

use std::path::{Path, PathBuf};
use std::{fs, io};

use quill_types::{DocumentId, LineSpan, TextRange};

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("lines {span} are outside the document ({line_count} lines)")]
    SpanOutOfRange { span: LineSpan, line_count: usize },
}

/// Result of asking the editor to apply an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// The edit landed; the replaced span now holds `inserted_lines` lines.
    Applied { inserted_lines: usize },
    /// The editor declined (document not active, read-only, stale span).
    Rejected(String),
}

pub trait Document {
    /// Stable identity (URI or path).
    fn id(&self) -> &DocumentId;

    fn language_id(&self) -> &str;

    fn line_count(&self) -> usize;

    /// Text of line `index` without its line terminator.
    fn line_at(&self, index: usize) -> Option<&str>;

    /// Full-line range of `index`.
    fn line_range(&self, index: usize) -> Option<TextRange> {
        self.line_at(index)
            .map(|line| TextRange::full_line(index, line.chars().count()))
    }

    /// Whole document text.
    fn text(&self) -> String {
        (0..self.line_count())
            .map_while(|index| self.line_at(index))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Text of the lines in `span`, joined with `\n`. Lines past the end are skipped.
    fn text_in(&self, span: LineSpan) -> String {
        (span.start()..=span.end())
            .map_while(|index| self.line_at(index))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Replace the lines in `span` with `replacement`.
    fn replace_lines(&mut self, span: LineSpan, replacement: &str) -> EditOutcome;
}

/// In-memory document split into lines.
///
/// Line counting follows editors: `"a\nb\n"` has three lines, the last one empty,
/// and an empty text still has one line.
#[derive(Debug, Clone)]
pub struct TextDocument {
    id: DocumentId,
    language: String,
    lines: Vec<String>,
    crlf: bool,
    read_only: bool,
}

fn split_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

/// Language id from a file extension, in editor vocabulary.
#[must_use]
pub fn language_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("rs") => "rust",
        Some("py") => "python",
        Some("js" | "mjs" | "cjs") => "javascript",
        Some("ts" | "mts") => "typescript",
        Some("tsx") => "typescriptreact",
        Some("jsx") => "javascriptreact",
        Some("go") => "go",
        Some("java") => "java",
        Some("kt" | "kts") => "kotlin",
        Some("c" | "h") => "c",
        Some("cc" | "cpp" | "cxx" | "hpp") => "cpp",
        Some("cs") => "csharp",
        Some("rb") => "ruby",
        Some("php") => "php",
        Some("swift") => "swift",
        Some("sh" | "bash") => "shellscript",
        Some("sql") => "sql",
        _ => "plaintext",
    }
}

impl TextDocument {
    pub fn new(id: DocumentId, language: impl Into<String>, text: &str) -> Self {
        Self {
            id,
            language: language.into(),
            lines: split_lines(text),
            crlf: text.contains("\r\n"),
            read_only: false,
        }
    }

    /// Load a file from disk; the path doubles as the document identity.
    pub fn from_path(path: &Path) -> Result<Self, DocumentError> {
        let text = fs::read_to_string(path).map_err(|source| DocumentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let id = DocumentId::new(path.display().to_string());
        Ok(Self::new(id, language_for_path(path), &text))
    }

    /// A read-only document rejects every edit, like a buffer that is no longer active.
    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Text with the original line terminators.
    #[must_use]
    pub fn contents(&self) -> String {
        self.lines.join(if self.crlf { "\r\n" } else { "\n" })
    }
}

impl Document for TextDocument {
    fn id(&self) -> &DocumentId {
        &self.id
    }

    fn language_id(&self) -> &str {
        &self.language
    }

    fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn line_at(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    fn replace_lines(&mut self, span: LineSpan, replacement: &str) -> EditOutcome {
        if self.read_only {
            return EditOutcome::Rejected(format!("{} is read-only", self.id));
        }
        if span.end() >= self.lines.len() {
            return EditOutcome::Rejected(format!(
                "lines {span} are outside {} ({} lines)",
                self.id,
                self.lines.len()
            ));
        }

        let body = replacement
            .strip_suffix('\n')
            .map(|body| body.strip_suffix('\r').unwrap_or(body))
            .unwrap_or(replacement);
        let new_lines = split_lines(body);
        let inserted_lines = new_lines.len();
        self.lines.splice(span.start()..=span.end(), new_lines);
        EditOutcome::Applied { inserted_lines }
    }
}
