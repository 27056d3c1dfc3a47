//! Conversation session.
//!
//! ```text
//! Idle -> Sending -> Receiving -> Idle
//!                 -> Cancelled -> Idle
//!                 -> Errored   -> Idle
//! ```
//!
//! `send` takes `&mut self`, so one session never has two requests in flight and
//! the caller's [`StreamHandle`](quill_providers::StreamHandle) is always the live one.

use quill_config::ChatSettings;
use quill_providers::{
    ApiKey, CancellationToken, CompletionTransport, GatewayError, ModelGateway, ModelRequest,
};
use quill_types::Turn;

use crate::events::{CoreEvent, EventSink};
use crate::prompt::{CHAT_PARAMS, CHAT_SYSTEM_INSTRUCTION};

pub const CANCELLED_NOTICE: &str = "Response cancelled.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    Sending,
    Receiving,
    Cancelled,
    Errored,
}

/// What the chat panel shows. Notices and errors never reach the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEntry {
    Turn(Turn),
    Notice(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatOutcome {
    Replied(Turn),
    Cancelled,
    Failed(GatewayError),
    /// Blank message; nothing was recorded or sent.
    Rejected,
}

#[derive(Debug)]
pub struct ChatSession {
    turns: Vec<Turn>,
    transcript: Vec<TranscriptEntry>,
    context_turns: usize,
    state: ChatState,
    events: EventSink,
}

impl ChatSession {
    #[must_use]
    pub fn new(settings: ChatSettings, events: EventSink) -> Self {
        Self {
            turns: Vec::new(),
            transcript: Vec::new(),
            context_turns: settings.context_turns.max(1),
            state: ChatState::Idle,
            events,
        }
    }

    #[must_use]
    pub fn state(&self) -> ChatState {
        self.state
    }

    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[must_use]
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// The most recent turns, oldest first, as sent with the next request.
    #[must_use]
    pub fn context_window(&self) -> &[Turn] {
        let skip = self.turns.len().saturating_sub(self.context_turns);
        &self.turns[skip..]
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.transcript.clear();
        tracing::debug!("Chat cleared");
    }

    fn transition(&mut self, next: ChatState) {
        tracing::debug!(from = ?self.state, to = ?next, "Chat state");
        self.state = next;
    }

    fn record(&mut self, turn: Turn) {
        self.turns.push(turn.clone());
        self.transcript.push(TranscriptEntry::Turn(turn.clone()));
        self.events.emit(CoreEvent::ChatTurnAppended(turn));
    }

    /// Send one user message and wait for the whole reply.
    ///
    /// The user turn is recorded before the request starts and is kept on failure
    /// so a resend has full context. A cancelled request records no assistant turn.
    pub async fn send<T: CompletionTransport>(
        &mut self,
        gateway: &ModelGateway<T>,
        key: &ApiKey,
        text: &str,
        token: CancellationToken,
    ) -> ChatOutcome {
        let text = text.trim();
        if text.is_empty() {
            return ChatOutcome::Rejected;
        }

        self.transition(ChatState::Sending);
        self.record(Turn::user(text));

        let request = ModelRequest::conversation(
            Some(CHAT_SYSTEM_INSTRUCTION),
            self.context_window(),
            CHAT_PARAMS,
        );
        tracing::debug!(
            context_turns = request.contents.len(),
            history = self.turns.len(),
            "Sending chat request"
        );

        let outcome = match gateway.send(key, &request, Some(token)).await {
            Ok(reply) => {
                self.transition(ChatState::Receiving);
                let turn = Turn::assistant(reply);
                self.record(turn.clone());
                ChatOutcome::Replied(turn)
            }
            Err(GatewayError::Cancelled) => {
                self.transition(ChatState::Cancelled);
                self.transcript
                    .push(TranscriptEntry::Notice(CANCELLED_NOTICE.to_string()));
                self.events
                    .emit(CoreEvent::ChatCancelled(CANCELLED_NOTICE.to_string()));
                ChatOutcome::Cancelled
            }
            Err(error) => {
                self.transition(ChatState::Errored);
                tracing::warn!("Chat request failed: {error}");
                let message = error.to_string();
                self.transcript.push(TranscriptEntry::Error(message.clone()));
                self.events.emit(CoreEvent::ChatError(message));
                ChatOutcome::Failed(error)
            }
        };

        self.transition(ChatState::Idle);
        outcome
    }
}
