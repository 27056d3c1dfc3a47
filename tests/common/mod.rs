//! Shared test utilities and fixtures
//!
//! Common infrastructure for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future;
use std::sync::Mutex;

use quill_config::{API_KEY_SECRET, MemorySecretStore};
use quill_engine::{Assistant, DocumentId, EventSink, TextDocument};
use quill_providers::{ApiKey, CompletionTransport, GatewayError, ModelRequest};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_KEY: &str = "test-api-key";

/// What the scripted transport does for one request.
#[derive(Debug, Clone)]
pub enum Step {
    Reply(String),
    Fail(GatewayError),
    /// Never resolves; only cancellation ends the request.
    Hang,
}

/// In-process stand-in for the Gemini endpoint. Plays queued steps in order and
/// records every request it receives.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            requests: Mutex::default(),
        }
    }

    pub fn replies(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Step::Reply((*r).to_string())))
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// User text of the most recent request.
    pub fn last_prompt(&self) -> String {
        let requests = self.requests.lock().unwrap();
        let request = requests.last().expect("at least one request");
        request.contents.last().unwrap().parts.join("\n")
    }
}

impl CompletionTransport for ScriptedTransport {
    async fn complete(&self, _key: &ApiKey, request: &ModelRequest) -> Result<String, GatewayError> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Step::Fail(GatewayError::Network("script exhausted".to_string())));
        match step {
            Step::Reply(text) => Ok(text),
            Step::Fail(err) => Err(err),
            Step::Hang => future::pending().await,
        }
    }
}

pub type TestAssistant = Assistant<ScriptedTransport, MemorySecretStore>;

pub fn keyed_store() -> MemorySecretStore {
    MemorySecretStore::new().with_secret(API_KEY_SECRET, TEST_KEY)
}

pub fn assistant(steps: impl IntoIterator<Item = Step>) -> TestAssistant {
    Assistant::new(
        ScriptedTransport::new(steps),
        keyed_store(),
        EventSink::disconnected(),
    )
}

pub fn assistant_with_replies(replies: &[&str]) -> TestAssistant {
    assistant(replies.iter().map(|r| Step::Reply((*r).to_string())))
}

/// `line_count` lines of the form `let vN = N;` (N is 1-based).
pub fn numbered_document(name: &str, line_count: usize) -> TextDocument {
    let text: Vec<String> = (1..=line_count)
        .map(|n| format!("let v{n} = {n};"))
        .collect();
    TextDocument::new(DocumentId::new(name), "rust", &text.join("\n"))
}

/// Canned `generateContent` payload carrying `text`.
pub fn gemini_body(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }],
        "usageMetadata": {
            "promptTokenCount": 42,
            "candidatesTokenCount": 7,
            "totalTokenCount": 49
        }
    })
}

/// Mount a successful `generateContent` reply for `model`.
pub async fn mount_gemini_reply(server: &MockServer, model: &str, text: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/models/{model}:generateContent")))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(text)))
        .mount(server)
        .await;
}

/// Mount an error response for `model`.
pub async fn mount_gemini_error(server: &MockServer, model: &str, status: u16, message: &str) {
    let body = serde_json::json!({
        "error": { "code": status, "message": message, "status": "INVALID_ARGUMENT" }
    });
    Mock::given(method("POST"))
        .and(path(format!("/models/{model}:generateContent")))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}
