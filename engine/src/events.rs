//! Presentation events.

use quill_types::{Diagnostic, DocumentId, Turn};
use tokio::sync::mpsc;

/// Everything the presentation layer needs to render, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    DiagnosticsUpdated {
        document: DocumentId,
        diagnostics: Vec<Diagnostic>,
    },
    ChatTurnAppended(Turn),
    ChatError(String),
    ChatCancelled(String),
}

/// Ordered, fire-and-forget event delivery.
///
/// A dropped receiver is not an error: the core keeps working without a presenter.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<CoreEvent>>,
}

impl EventSink {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<CoreEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CoreEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Sink that discards everything.
    #[must_use]
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: CoreEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
