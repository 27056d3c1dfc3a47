//! Completion endpoint gateway.
//!
//! # Architecture
//!
//! - [`CompletionTransport`] - the network collaborator: given a request, returns raw text or fails
//! - [`gemini`] - Google Gemini `generateContent` transport
//! - [`ModelGateway`] - single-attempt send with cooperative cancellation on top of a transport
//! - [`CancellationToken`] / [`StreamHandle`] - one token per request, cancelled through its handle
//!
//! # Error Handling
//!
//! Every failure is a [`GatewayError`]. The gateway never retries: one failed attempt
//! surfaces immediately, and callers convert it into a single user-visible notification.
//! A cancelled request always resolves as [`GatewayError::Cancelled`], even when the
//! transport would have produced a late success.

mod cancel;
pub mod gemini;
mod wire_types;

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use futures_util::future::Abortable;
use quill_types::{GenerationParams, Role, Turn, truncate_with_ellipsis};
use serde_json::Value;

pub use cancel::{CancellationToken, StreamHandle};
pub use quill_types;
pub use quill_types::{ApiKey, ModelName};

/// Canonical Gemini API base URL.
pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const CONNECT_TIMEOUT_SECS: u64 = 30;
const REQUEST_TIMEOUT_SECS: u64 = 120;

const TCP_KEEPALIVE_SECS: u64 = 60;

const POOL_MAX_IDLE_PER_HOST: usize = 16;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;
const MAX_ERROR_MESSAGE_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),
    #[error("endpoint error {status}: {message}")]
    Endpoint { status: u16, message: String },
    #[error("request cancelled")]
    Cancelled,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        base_client_builder().build().unwrap_or_else(|e| {
            tracing::error!(
                "Failed to build hardened HTTP client: {e}. Attempting minimal hardened fallback."
            );
            reqwest::Client::builder()
                .https_only(true)
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("Minimal hardened HTTP client must build; cannot proceed without TLS")
        })
    })
}

/// Client for a plain-http loopback endpoint override (local proxies, test servers).
pub fn loopback_http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        base_client_builder()
            .https_only(false)
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build loopback HTTP client: {e}. Using defaults.");
                reqwest::Client::new()
            })
    })
}

/// Whether `base_url` is plain http to this machine.
#[must_use]
pub fn is_loopback_http(base_url: &str) -> bool {
    let Some(rest) = base_url.strip_prefix("http://") else {
        return false;
    };
    let host = rest.split(['/', '?']).next().unwrap_or_default();
    let host = match host.rsplit_once(':') {
        Some((name, port)) if !name.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    matches!(host, "localhost" | "127.0.0.1" | "[::1]")
}

fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .https_only(true)
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
}

pub async fn read_capped_error_body(mut response: reqwest::Response) -> String {
    let mut body = Vec::new();
    while let Ok(Some(chunk)) = response.chunk().await {
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// Pull a human-readable message out of an endpoint error body.
///
/// Falls back to the (truncated) raw body when it is not the usual `{"error":{"message":..}}`.
#[must_use]
pub fn extract_error_message(body: &str) -> String {
    let extracted = serde_json::from_str::<Value>(body).ok().and_then(|payload| {
        payload
            .pointer("/error/message")
            .and_then(Value::as_str)
            .or_else(|| payload.pointer("/message").and_then(Value::as_str))
            .map(ToString::to_string)
    });
    match extracted {
        Some(message) if !message.trim().is_empty() => message.trim().to_string(),
        _ if body.trim().is_empty() => "no error details".to_string(),
        _ => truncate_with_ellipsis(body, MAX_ERROR_MESSAGE_CHARS),
    }
}

/// Model + endpoint selection for a transport.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    model: ModelName,
    base_url: String,
}

impl ApiConfig {
    #[must_use]
    pub fn new(model: ModelName) -> Self {
        Self {
            model,
            base_url: GEMINI_API_BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn model(&self) -> &ModelName {
        &self.model
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new(ModelName::default())
    }
}

/// Consecutive parts sent under one role.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<String>,
}

/// A fully assembled completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system_instruction: Option<String>,
    pub contents: Vec<Content>,
    pub params: GenerationParams,
}

impl ModelRequest {
    /// Single user prompt.
    pub fn prompt(text: impl Into<String>, params: GenerationParams) -> Self {
        Self {
            system_instruction: None,
            contents: vec![Content {
                role: Role::User,
                parts: vec![text.into()],
            }],
            params,
        }
    }

    /// Conversation request. Consecutive turns with the same role are grouped into
    /// one content entry so the endpoint always sees alternating roles.
    #[must_use]
    pub fn conversation(
        system_instruction: Option<&str>,
        turns: &[Turn],
        params: GenerationParams,
    ) -> Self {
        let mut contents: Vec<Content> = Vec::new();
        for turn in turns {
            match contents.last_mut() {
                Some(last) if last.role == turn.role => last.parts.push(turn.content.clone()),
                _ => contents.push(Content {
                    role: turn.role,
                    parts: vec![turn.content.clone()],
                }),
            }
        }
        Self {
            system_instruction: system_instruction
                .filter(|s| !s.trim().is_empty())
                .map(ToString::to_string),
            contents,
            params,
        }
    }
}

/// Network collaborator: given a request, returns the model's raw reply text.
pub trait CompletionTransport: Send + Sync {
    fn complete(
        &self,
        key: &ApiKey,
        request: &ModelRequest,
    ) -> impl Future<Output = Result<String, GatewayError>> + Send;
}

/// Single-attempt gateway with cooperative cancellation.
#[derive(Debug)]
pub struct ModelGateway<T> {
    transport: T,
}

impl<T: CompletionTransport> ModelGateway<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send one request.
    ///
    /// With a token attached, cancelling its [`StreamHandle`] resolves the call as
    /// [`GatewayError::Cancelled`]; a token cancelled before the call never reaches
    /// the transport.
    pub async fn send(
        &self,
        key: &ApiKey,
        request: &ModelRequest,
        token: Option<CancellationToken>,
    ) -> Result<String, GatewayError> {
        let Some(token) = token else {
            return self.send_once(key, request).await;
        };

        if token.is_cancelled() {
            tracing::debug!("Request cancelled before dispatch");
            return Err(GatewayError::Cancelled);
        }

        let (handle, registration) = token.into_parts();
        let outcome = Abortable::new(self.send_once(key, request), registration).await;
        match outcome {
            // A cancel that lands after the transport finished still wins.
            Ok(_) if handle.is_aborted() => Err(GatewayError::Cancelled),
            Ok(result) => result,
            Err(_aborted) => {
                tracing::debug!("Request cancelled in flight");
                Err(GatewayError::Cancelled)
            }
        }
    }

    async fn send_once(&self, key: &ApiKey, request: &ModelRequest) -> Result<String, GatewayError> {
        let result = self.transport.complete(key, request).await;
        match &result {
            Ok(text) => tracing::debug!(reply_bytes = text.len(), "Completion received"),
            Err(e) => tracing::warn!("Completion request failed: {e}"),
        }
        result
    }
}
