//! Plain-text rendering of engine results for the terminal.

use std::fmt::Write;

use quill_engine::{Diagnostic, ParseStatus, ReviewReport, TaskReply, TranscriptEntry};

/// One line per diagnostic, numbered from 1 in display order.
pub fn diagnostics(path: &str, diagnostics: &[Diagnostic]) -> String {
    if diagnostics.is_empty() {
        return "No issues found.\n".to_string();
    }
    let mut out = String::new();
    for (index, diagnostic) in diagnostics.iter().enumerate() {
        let range = diagnostic.range();
        let _ = writeln!(
            out,
            "{:>3}. {path}:{}:{}: {}: {} [{}]",
            index + 1,
            range.line + 1,
            range.start_col + 1,
            diagnostic.severity().as_str(),
            diagnostic.message(),
            diagnostic.source(),
        );
    }
    out
}

pub fn review_summary(report: &ReviewReport) -> String {
    let mut summary = match report.added.len() {
        0 => "Review complete: no issues.".to_string(),
        1 => "Review complete: 1 issue.".to_string(),
        n => format!("Review complete: {n} issues."),
    };
    if report.filtered > 0 {
        let _ = write!(summary, " ({} low-value findings dropped)", report.filtered);
    }
    if report.status != ParseStatus::Parsed {
        tracing::debug!(status = ?report.status, "Review reply was not an issue list");
    }
    summary
}

pub fn task_reply(reply: &TaskReply) -> String {
    let mut out = reply.text.trim_end().to_string();
    out.push('\n');
    out
}

pub fn transcript_entry(entry: &TranscriptEntry) -> String {
    match entry {
        TranscriptEntry::Turn(turn) => turn.content.clone(),
        TranscriptEntry::Notice(notice) => format!("[{notice}]"),
        TranscriptEntry::Error(error) => format!("[error] {error}"),
    }
}
