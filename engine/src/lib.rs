//! Core engine for Quill: review reconciliation, prompt building and chat.
//!
//! This crate has no terminal or editor dependencies. The host supplies a
//! [`Document`], a [`SecretStore`](quill_config::SecretStore) and an [`EventSink`],
//! then drives everything through [`Assistant`].

#![allow(clippy::missing_errors_doc)]

mod assistant;
pub mod chat;
pub mod document;
pub mod events;
pub mod mapper;
pub mod parse;
pub mod prompt;
pub mod reconcile;

pub use assistant::{Assistant, CommandError, FixOutcome, ReviewReport, TaskReply};
pub use chat::{CANCELLED_NOTICE, ChatOutcome, ChatSession, ChatState, TranscriptEntry};
pub use document::{Document, DocumentError, EditOutcome, TextDocument, language_for_path};
pub use events::{CoreEvent, EventSink};
pub use parse::{ParseOutcome, ParseStatus, QualityFilter, RawIssue, parse_issues};
pub use prompt::TaskKind;
pub use reconcile::{Reconciler, ReviewSession};

pub use quill_providers::{self, ApiConfig, CancellationToken, GatewayError, StreamHandle};
pub use quill_types::{
    ApiKey, Diagnostic, DiagnosticId, DocumentId, LineSpan, ModelName, ReviewKind, Severity, Turn,
};
