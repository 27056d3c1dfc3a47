//! Core domain types for Quill.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod conversation;
mod diagnostic;
mod model;
mod params;
mod proofs;
mod text;

pub use conversation::{Role, Turn};
pub use diagnostic::{
    DIAGNOSTIC_SOURCE, Diagnostic, DiagnosticDraft, DiagnosticId, DocumentId, LineSpan,
    LineSpanError, ReviewKind, Severity, TextRange,
};
pub use model::{ApiKey, DEFAULT_MODEL, KNOWN_MODELS, ModelName, ModelParseError};
pub use params::{GenerationParams, GenerationParamsError};
pub use proofs::{EmptyStringError, NonEmptyString};
pub use text::{truncate_to_fit, truncate_with_ellipsis};
