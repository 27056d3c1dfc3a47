//! Per-document diagnostic sets.
//!
//! The [`Reconciler`] owns one [`ReviewSession`] per open document and is the only
//! writer of diagnostics. Each pass lands as a single set update (replace or append)
//! followed by exactly one `DiagnosticsUpdated` event.
//!
//! Every stored diagnostic's line is inside `[0, line_count)` of its document as
//! last seen by the reconciler.

use std::collections::HashMap;

use quill_types::{Diagnostic, DiagnosticDraft, DiagnosticId, DocumentId, LineSpan, TextRange};

use crate::document::Document;
use crate::events::{CoreEvent, EventSink};

/// Diagnostics for one open document, in detection order.
#[derive(Debug, Clone)]
pub struct ReviewSession {
    document: DocumentId,
    diagnostics: Vec<Diagnostic>,
}

impl ReviewSession {
    fn new(document: DocumentId) -> Self {
        Self {
            document,
            diagnostics: Vec::new(),
        }
    }

    #[must_use]
    pub fn document(&self) -> &DocumentId {
        &self.document
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    #[must_use]
    pub fn find(&self, id: DiagnosticId) -> Option<&Diagnostic> {
        self.diagnostics.iter().find(|d| d.id() == id)
    }
}

#[derive(Debug)]
pub struct Reconciler {
    sessions: HashMap<DocumentId, ReviewSession>,
    next_id: u64,
    events: EventSink,
}

fn clamp_range(range: TextRange, line_count: usize) -> TextRange {
    let last = line_count.max(1) - 1;
    if range.line <= last {
        return range;
    }
    TextRange::full_line(last, 0)
}

impl Reconciler {
    #[must_use]
    pub fn new(events: EventSink) -> Self {
        Self {
            sessions: HashMap::new(),
            next_id: 1,
            events,
        }
    }

    /// Start tracking `document`. Opening an already open document keeps its set.
    pub fn open(&mut self, document: &DocumentId) -> &ReviewSession {
        self.sessions
            .entry(document.clone())
            .or_insert_with(|| {
                tracing::debug!(document = %document, "Opened review session");
                ReviewSession::new(document.clone())
            })
    }

    /// Stop tracking `document`, destroying its diagnostics.
    pub fn close(&mut self, document: &DocumentId) -> bool {
        let Some(session) = self.sessions.remove(document) else {
            return false;
        };
        tracing::debug!(document = %document, dropped = session.len(), "Closed review session");
        if !session.is_empty() {
            self.events.emit(CoreEvent::DiagnosticsUpdated {
                document: document.clone(),
                diagnostics: Vec::new(),
            });
        }
        true
    }

    #[must_use]
    pub fn is_open(&self, document: &DocumentId) -> bool {
        self.sessions.contains_key(document)
    }

    #[must_use]
    pub fn session(&self, document: &DocumentId) -> Option<&ReviewSession> {
        self.sessions.get(document)
    }

    /// Current diagnostics; empty for documents that are not open.
    #[must_use]
    pub fn get(&self, document: &DocumentId) -> &[Diagnostic] {
        self.sessions
            .get(document)
            .map(ReviewSession::diagnostics)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn find(&self, document: &DocumentId, id: DiagnosticId) -> Option<&Diagnostic> {
        self.sessions.get(document).and_then(|s| s.find(id))
    }

    fn admit(&mut self, drafts: Vec<DiagnosticDraft>, line_count: usize) -> Vec<Diagnostic> {
        drafts
            .into_iter()
            .map(|mut draft| {
                draft.range = clamp_range(draft.range, line_count);
                let id = DiagnosticId::new(self.next_id);
                self.next_id += 1;
                Diagnostic::from_draft(id, draft)
            })
            .collect()
    }

    fn publish(&self, document: &DocumentId) {
        let diagnostics = self.get(document).to_vec();
        self.events.emit(CoreEvent::DiagnosticsUpdated {
            document: document.clone(),
            diagnostics,
        });
    }

    /// Authoritative pass: the new list replaces the whole set. Opens the document
    /// if needed. Returns the stored diagnostics.
    pub fn replace(
        &mut self,
        document: &DocumentId,
        drafts: Vec<DiagnosticDraft>,
        line_count: usize,
    ) -> Vec<Diagnostic> {
        let admitted = self.admit(drafts, line_count);
        self.open(document);
        if let Some(session) = self.sessions.get_mut(document) {
            session.diagnostics.clone_from(&admitted);
        }
        tracing::debug!(document = %document, issues = admitted.len(), "Replaced diagnostics");
        self.publish(document);
        admitted
    }

    /// Additive pass: the new list is appended after existing findings, without
    /// deduplication. Returns the appended diagnostics.
    pub fn append(
        &mut self,
        document: &DocumentId,
        drafts: Vec<DiagnosticDraft>,
        line_count: usize,
    ) -> Vec<Diagnostic> {
        let admitted = self.admit(drafts, line_count);
        self.open(document);
        if let Some(session) = self.sessions.get_mut(document) {
            session.diagnostics.extend(admitted.iter().cloned());
        }
        tracing::debug!(document = %document, issues = admitted.len(), "Appended diagnostics");
        self.publish(document);
        admitted
    }

    /// Remove exactly the diagnostic with `id`.
    pub fn remove(&mut self, document: &DocumentId, id: DiagnosticId) -> Option<Diagnostic> {
        let session = self.sessions.get_mut(document)?;
        let index = session.diagnostics.iter().position(|d| d.id() == id)?;
        let removed = session.diagnostics.remove(index);
        tracing::debug!(document = %document, diagnostic = %id, "Removed diagnostic");
        self.publish(document);
        Some(removed)
    }

    /// Drop every diagnostic for `document`, keeping it open.
    pub fn clear(&mut self, document: &DocumentId) {
        let Some(session) = self.sessions.get_mut(document) else {
            return;
        };
        session.diagnostics.clear();
        self.publish(document);
    }

    /// Keep diagnostics attached to the right lines after `edited` was replaced by
    /// `inserted_lines` lines.
    ///
    /// Diagnostics below the edit move by the line delta, ones inside it stay within
    /// the new span, and all of them are clamped to the document and re-spanned to
    /// the full (new) line.
    pub fn rebase_after_edit(
        &mut self,
        document: &dyn Document,
        edited: LineSpan,
        inserted_lines: usize,
    ) {
        let Some(session) = self.sessions.get_mut(document.id()) else {
            return;
        };

        let removed_lines = edited.line_count();
        let new_last_in_span = edited.start() + inserted_lines.max(1) - 1;
        let line_count = document.line_count();
        let last = line_count.max(1) - 1;

        for diagnostic in &mut session.diagnostics {
            let line = diagnostic.line();
            let moved = if line > edited.end() {
                (line - removed_lines).saturating_add(inserted_lines)
            } else if line >= edited.start() {
                line.min(new_last_in_span)
            } else {
                line
            };
            let line = moved.min(last);
            let range = document
                .line_range(line)
                .unwrap_or(TextRange::full_line(line, 0));
            if range != diagnostic.range() {
                *diagnostic = diagnostic.relocated(range);
            }
        }

        tracing::debug!(
            document = %document.id(),
            edited = %edited,
            inserted_lines,
            "Rebased diagnostics after edit"
        );
        self.publish(document.id());
    }
}
