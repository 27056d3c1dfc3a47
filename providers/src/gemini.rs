//! Gemini `generateContent` transport.

use crate::wire_types::{FinishReason, Response};
use crate::{
    ApiConfig, ApiKey, CompletionTransport, GatewayError, ModelRequest, extract_error_message,
    http_client, is_loopback_http, loopback_http_client, read_capped_error_body,
};
use serde_json::{Value, json};

fn text_part(text: &str) -> Value {
    json!({ "text": text })
}

fn build_request_body(request: &ModelRequest) -> Value {
    let contents: Vec<Value> = request
        .contents
        .iter()
        .map(|content| {
            let parts: Vec<Value> = content.parts.iter().map(|p| text_part(p)).collect();
            json!({
                "role": content.role.api_role(),
                "parts": parts,
            })
        })
        .collect();

    let mut body = serde_json::Map::new();
    body.insert("contents".into(), json!(contents));

    if let Some(prompt) = request.system_instruction.as_deref()
        && !prompt.trim().is_empty()
    {
        // System instruction uses snake_case
        body.insert(
            "system_instruction".into(),
            json!({
                "parts": [text_part(prompt)]
            }),
        );
    }

    // Generation config uses camelCase
    body.insert(
        "generationConfig".into(),
        json!({
            "temperature": request.params.temperature(),
            "maxOutputTokens": request.params.max_output_tokens(),
        }),
    );

    Value::Object(body)
}

/// Join the non-thinking text parts of the first candidate.
fn extract_text(response: Response) -> Result<String, GatewayError> {
    if let Some(error) = response.error {
        return Err(GatewayError::MalformedResponse(
            error.message_or_default().to_string(),
        ));
    }

    let Some(candidate) = response.candidates.and_then(|c| c.into_iter().next()) else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .map_or_else(
                || "no candidates in response".to_string(),
                |reason| format!("prompt blocked: {reason}"),
            );
        return Err(GatewayError::MalformedResponse(reason));
    };

    if let Some(message) = candidate
        .finish_reason
        .as_deref()
        .map(FinishReason::parse)
        .and_then(FinishReason::error_message)
    {
        return Err(GatewayError::MalformedResponse(message.to_string()));
    }

    let text: String = candidate
        .content
        .and_then(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter(|part| !part.thought)
        .filter_map(|part| part.text)
        .collect();

    if text.is_empty() {
        return Err(GatewayError::MalformedResponse(
            "response contained no text".to_string(),
        ));
    }
    Ok(text)
}

/// Sends requests to `{base}/models/{model}:generateContent`.
#[derive(Debug, Clone)]
pub struct GeminiTransport {
    config: ApiConfig,
    client: reqwest::Client,
}

impl GeminiTransport {
    /// Transport on the shared hardened client. HTTPS-only unless the endpoint is
    /// a loopback http override.
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        let client = if is_loopback_http(config.base_url()) {
            loopback_http_client()
        } else {
            http_client()
        };
        Self::with_client(config, client.clone())
    }

    #[must_use]
    pub fn with_client(config: ApiConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url(),
            self.config.model()
        )
    }
}

impl CompletionTransport for GeminiTransport {
    async fn complete(&self, key: &ApiKey, request: &ModelRequest) -> Result<String, GatewayError> {
        let body = build_request_body(request);
        tracing::debug!(
            model = %self.config.model(),
            contents = request.contents.len(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", key.expose_secret())
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = read_capped_error_body(response).await;
            return Err(GatewayError::Endpoint {
                status: status.as_u16(),
                message: extract_error_message(&error_text),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        let parsed: Response = serde_json::from_slice(&bytes)
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        if let Some(usage) = &parsed.usage_metadata {
            tracing::debug!(
                prompt_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                "generateContent usage"
            );
        }
        extract_text(parsed)
    }
}
