//! Command surface.
//!
//! Every presentation command enters here. Commands resolve the API key first and
//! fail with [`CommandError::MissingApiKey`] before touching any state. Gateway
//! failures come back as [`CommandError::Gateway`], the single point where they
//! become user-visible text. Parse failures never do: they read as a clean review.

use quill_config::{
    API_KEY_SECRET, ChatSettings, ReviewSettings, SecretStore, SecretStoreError,
};
use quill_providers::{
    ApiKey, CancellationToken, CompletionTransport, GatewayError, ModelGateway, ModelRequest,
};
use quill_types::{Diagnostic, DiagnosticId, DocumentId, LineSpan, NonEmptyString, ReviewKind};

use crate::chat::{ChatOutcome, ChatSession};
use crate::document::{Document, DocumentError, EditOutcome};
use crate::events::EventSink;
use crate::mapper;
use crate::parse::{ParseOutcome, ParseStatus, QualityFilter, first_code_block, parse_issues};
use crate::prompt::{self, FixContext, PromptRequest, TaskKind};
use crate::reconcile::Reconciler;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("no API key configured; run `quill set-key` or set GEMINI_API_KEY")]
    MissingApiKey,
    #[error("nothing to send: the selection is empty")]
    EmptySelection,
    #[error("document {0} is not open")]
    UnknownDocument(DocumentId),
    #[error("diagnostic {0} does not exist")]
    UnknownDiagnostic(DiagnosticId),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Secrets(#[from] SecretStoreError),
}

impl CommandError {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Gateway(GatewayError::Cancelled))
    }
}

/// Result of one review pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewReport {
    pub kind: ReviewKind,
    pub status: ParseStatus,
    /// Diagnostics this pass added, in detection order.
    pub added: Vec<Diagnostic>,
    /// Findings the quality filter dropped (quick review only).
    pub filtered: usize,
}

/// Free-text task reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReply {
    pub task: TaskKind,
    pub text: String,
    /// First fenced code block, if the reply had one.
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FixOutcome {
    /// The edit landed and the diagnostic is gone.
    Applied {
        fixed: Diagnostic,
        replaced: LineSpan,
        inserted_lines: usize,
    },
    /// The editor declined the edit; diagnostics are untouched.
    NotApplied { reason: String },
}

pub struct Assistant<T, S> {
    gateway: ModelGateway<T>,
    secrets: S,
    reconciler: Reconciler,
    chat: ChatSession,
    events: EventSink,
    review: ReviewSettings,
    filter: QualityFilter,
}

fn whole_document(document: &dyn Document) -> Result<LineSpan, CommandError> {
    let count = document.line_count();
    if count == 0 {
        return Err(CommandError::EmptySelection);
    }
    LineSpan::new(0, count - 1).map_err(|_| CommandError::EmptySelection)
}

fn selected_code(document: &dyn Document, span: LineSpan) -> Result<NonEmptyString, CommandError> {
    let line_count = document.line_count();
    if span.end() >= line_count {
        return Err(DocumentError::SpanOutOfRange { span, line_count }.into());
    }
    NonEmptyString::new(document.text_in(span)).map_err(|_| CommandError::EmptySelection)
}

impl<T: CompletionTransport, S: SecretStore> Assistant<T, S> {
    pub fn new(transport: T, secrets: S, events: EventSink) -> Self {
        Self {
            gateway: ModelGateway::new(transport),
            secrets,
            reconciler: Reconciler::new(events.clone()),
            chat: ChatSession::new(ChatSettings::default(), events.clone()),
            events,
            review: ReviewSettings::default(),
            filter: QualityFilter::default(),
        }
    }

    #[must_use]
    pub fn with_review_settings(mut self, review: ReviewSettings) -> Self {
        self.filter = QualityFilter::from_settings(&review);
        self.review = review;
        self
    }

    /// Replaces the chat session; call before the first message.
    #[must_use]
    pub fn with_chat_settings(mut self, chat: ChatSettings) -> Self {
        self.chat = ChatSession::new(chat, self.events.clone());
        self
    }

    pub fn gateway(&self) -> &ModelGateway<T> {
        &self.gateway
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    pub fn diagnostics(&self, document: &DocumentId) -> &[Diagnostic] {
        self.reconciler.get(document)
    }

    fn api_key(&self) -> Result<ApiKey, CommandError> {
        self.secrets
            .get_secret(API_KEY_SECRET)?
            .and_then(ApiKey::new)
            .ok_or(CommandError::MissingApiKey)
    }

    pub fn set_api_key(&self, raw: &str) -> Result<(), CommandError> {
        let key = ApiKey::new(raw).ok_or(CommandError::MissingApiKey)?;
        self.secrets.set_secret(API_KEY_SECRET, key.expose_secret())?;
        Ok(())
    }

    pub fn open_document(&mut self, document: &DocumentId) {
        self.reconciler.open(document);
    }

    pub fn close_document(&mut self, document: &DocumentId) {
        self.reconciler.close(document);
    }

    pub fn clear_diagnostics(&mut self, document: &DocumentId) {
        self.reconciler.clear(document);
    }

    async fn complete(
        &self,
        key: &ApiKey,
        prompt: prompt::Prompt,
        token: Option<CancellationToken>,
    ) -> Result<String, CommandError> {
        let request = ModelRequest::prompt(prompt.text, prompt.params);
        Ok(self.gateway.send(key, &request, token).await?)
    }

    /// Review the whole document; replaces its diagnostics.
    pub async fn review_document(
        &mut self,
        document: &dyn Document,
        token: Option<CancellationToken>,
    ) -> Result<ReviewReport, CommandError> {
        let key = self.api_key()?;
        let span = whole_document(document)?;
        self.run_review(&key, document, span, ReviewKind::Document, token)
            .await
    }

    /// Review a selection; replaces the document's diagnostics.
    pub async fn review_selection(
        &mut self,
        document: &dyn Document,
        span: LineSpan,
        token: Option<CancellationToken>,
    ) -> Result<ReviewReport, CommandError> {
        let key = self.api_key()?;
        self.run_review(&key, document, span, ReviewKind::Selection, token)
            .await
    }

    /// Stricter selection review; appends to the document's diagnostics.
    pub async fn quick_review_selection(
        &mut self,
        document: &dyn Document,
        span: LineSpan,
        token: Option<CancellationToken>,
    ) -> Result<ReviewReport, CommandError> {
        let key = self.api_key()?;
        self.run_review(&key, document, span, ReviewKind::Quick, token)
            .await
    }

    async fn run_review(
        &mut self,
        key: &ApiKey,
        document: &dyn Document,
        span: LineSpan,
        kind: ReviewKind,
        token: Option<CancellationToken>,
    ) -> Result<ReviewReport, CommandError> {
        let code = selected_code(document, span)?;
        let task = match kind {
            ReviewKind::Quick => TaskKind::QuickReview,
            ReviewKind::Document | ReviewKind::Selection => TaskKind::Review,
        };
        let prompt = prompt::build(
            &PromptRequest::new(task, &code).language(document.language_id()),
        );

        tracing::info!(
            document = %document.id(),
            task = task.as_str(),
            lines = %span,
            "Requesting review"
        );
        let reply = self.complete(key, prompt, token).await?;

        let outcome = parse_issues(&reply);
        let status = outcome.status();
        match &outcome {
            ParseOutcome::Parsed(_) => {}
            ParseOutcome::NoArray => {
                tracing::debug!(reply_bytes = reply.len(), "Review reply has no JSON array");
            }
            ParseOutcome::Invalid { error } => {
                tracing::warn!(reply_bytes = reply.len(), "Unparseable review reply: {error}");
            }
        }

        let mut issues = outcome.into_issues();
        let before = issues.len();
        if kind == ReviewKind::Quick {
            issues = self.filter.apply(issues);
        }
        let filtered = before - issues.len();

        let drafts = issues
            .into_iter()
            .map(|issue| mapper::resolve(issue, span.start(), document, kind))
            .collect();
        let line_count = document.line_count();
        let added = if kind.replaces_existing() {
            self.reconciler.replace(document.id(), drafts, line_count)
        } else {
            self.reconciler.append(document.id(), drafts, line_count)
        };

        tracing::info!(
            document = %document.id(),
            task = task.as_str(),
            issues = added.len(),
            filtered,
            "Review applied"
        );
        Ok(ReviewReport {
            kind,
            status,
            added,
            filtered,
        })
    }

    /// Ask the model to fix one diagnostic and apply the result to the document.
    pub async fn apply_fix(
        &mut self,
        document: &mut dyn Document,
        id: DiagnosticId,
        token: Option<CancellationToken>,
    ) -> Result<FixOutcome, CommandError> {
        let key = self.api_key()?;
        let doc_id = document.id().clone();
        let Some(session) = self.reconciler.session(&doc_id) else {
            return Err(CommandError::UnknownDocument(doc_id));
        };
        let diagnostic = session
            .find(id)
            .cloned()
            .ok_or(CommandError::UnknownDiagnostic(id))?;

        let context = FixContext::around(&*document, diagnostic.line(), self.review.fix_context_lines);
        let code = NonEmptyString::new(context.text()).map_err(|_| CommandError::EmptySelection)?;
        let prompt = prompt::build(
            &PromptRequest::new(TaskKind::FixDiagnostic, &code)
                .language(document.language_id())
                .fix_context(&context, diagnostic.message()),
        );

        tracing::info!(document = %doc_id, diagnostic = %id, "Requesting fix");
        let reply = self.complete(&key, prompt, token).await?;

        let replacement = match first_code_block(&reply) {
            Some(code) => code,
            // An opened fence with no closing one is a cut-off reply, not bare code.
            None if reply.contains("```") => {
                return Err(GatewayError::MalformedResponse(
                    "fix reply has an unterminated code block".to_string(),
                )
                .into());
            }
            None => reply.trim().to_string(),
        };
        if replacement.trim().is_empty() {
            return Err(GatewayError::MalformedResponse(
                "fix reply contained no code".to_string(),
            )
            .into());
        }

        let span = context.span();
        match document.replace_lines(span, &replacement) {
            EditOutcome::Applied { inserted_lines } => {
                self.reconciler.remove(&doc_id, id);
                self.reconciler
                    .rebase_after_edit(&*document, span, inserted_lines);
                tracing::info!(document = %doc_id, diagnostic = %id, "Fix applied");
                Ok(FixOutcome::Applied {
                    fixed: diagnostic,
                    replaced: span,
                    inserted_lines,
                })
            }
            EditOutcome::Rejected(reason) => {
                tracing::info!(document = %doc_id, diagnostic = %id, "Fix not applied: {reason}");
                Ok(FixOutcome::NotApplied { reason })
            }
        }
    }

    async fn run_task(
        &self,
        task: TaskKind,
        document: &dyn Document,
        span: LineSpan,
        token: Option<CancellationToken>,
    ) -> Result<TaskReply, CommandError> {
        let key = self.api_key()?;
        let code = selected_code(document, span)?;
        let prompt = prompt::build(
            &PromptRequest::new(task, &code).language(document.language_id()),
        );
        tracing::info!(document = %document.id(), task = task.as_str(), lines = %span, "Requesting task");
        let text = self.complete(&key, prompt, token).await?;
        let code = first_code_block(&text);
        Ok(TaskReply { task, text, code })
    }

    pub async fn explain(
        &self,
        document: &dyn Document,
        span: LineSpan,
        token: Option<CancellationToken>,
    ) -> Result<TaskReply, CommandError> {
        self.run_task(TaskKind::Explain, document, span, token).await
    }

    pub async fn fix(
        &self,
        document: &dyn Document,
        span: LineSpan,
        token: Option<CancellationToken>,
    ) -> Result<TaskReply, CommandError> {
        self.run_task(TaskKind::Fix, document, span, token).await
    }

    pub async fn refactor(
        &self,
        document: &dyn Document,
        span: LineSpan,
        token: Option<CancellationToken>,
    ) -> Result<TaskReply, CommandError> {
        self.run_task(TaskKind::Refactor, document, span, token).await
    }

    pub async fn generate_tests(
        &self,
        document: &dyn Document,
        span: LineSpan,
        token: Option<CancellationToken>,
    ) -> Result<TaskReply, CommandError> {
        self.run_task(TaskKind::GenerateTests, document, span, token)
            .await
    }

    /// Send a chat message. Cancel through the handle taken from `token`.
    pub async fn send_chat_message(
        &mut self,
        text: &str,
        token: CancellationToken,
    ) -> Result<ChatOutcome, CommandError> {
        let key = self.api_key()?;
        Ok(self.chat.send(&self.gateway, &key, text, token).await)
    }

    pub fn clear_chat(&mut self) {
        self.chat.clear();
    }
}
