//! Review and chat over real HTTP against a mocked `generateContent` endpoint.

use quill_engine::{
    ApiConfig, Assistant, CancellationToken, ChatOutcome, CommandError, Document, EventSink,
    GatewayError, ModelName, Severity,
};
use quill_providers::gemini::GeminiTransport;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{
    TEST_KEY, gemini_body, keyed_store, mount_gemini_error, mount_gemini_reply, numbered_document,
};

const MODEL: &str = "gemini-2.5-flash";

fn transport(server: &MockServer) -> GeminiTransport {
    let model = ModelName::parse(MODEL).unwrap();
    GeminiTransport::new(ApiConfig::new(model).with_base_url(server.uri()))
}

#[tokio::test]
async fn review_round_trip_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/models/{MODEL}:generateContent")))
        .and(header("x-goog-api-key", TEST_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(
            "```json\n[{\"line\": 2, \"message\": \"v2 is unused\", \"severity\": \"warning\"}]\n```",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let mut assistant = Assistant::new(transport(&server), keyed_store(), EventSink::disconnected());
    let doc = numbered_document("mem://http.rs", 4);
    assistant.review_document(&doc, None).await.unwrap();

    let diagnostics = assistant.diagnostics(doc.id());
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].line(), 1);
    assert_eq!(diagnostics[0].severity(), Severity::Warning);

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["generationConfig"]["temperature"], json!(0.0));
    assert_eq!(body["generationConfig"]["maxOutputTokens"], json!(2048));
    let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
    assert!(prompt.contains("2: let v2 = 2;"));
}

#[tokio::test]
async fn endpoint_error_surfaces_once_without_touching_diagnostics() {
    let server = MockServer::start().await;
    mount_gemini_error(&server, MODEL, 400, "API key not valid. Please pass a valid API key.").await;

    let mut assistant = Assistant::new(transport(&server), keyed_store(), EventSink::disconnected());
    let doc = numbered_document("mem://http.rs", 4);
    let err = assistant.review_document(&doc, None).await.unwrap_err();

    match err {
        CommandError::Gateway(GatewayError::Endpoint { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "API key not valid. Please pass a valid API key.");
        }
        other => panic!("expected endpoint error, got {other:?}"),
    }
    assert!(assistant.diagnostics(doc.id()).is_empty());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn blocked_prompt_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "promptFeedback": { "blockReason": "SAFETY" } })),
        )
        .mount(&server)
        .await;

    let mut assistant = Assistant::new(transport(&server), keyed_store(), EventSink::disconnected());
    let outcome = assistant
        .send_chat_message("hello", CancellationToken::new())
        .await
        .unwrap();

    match outcome {
        ChatOutcome::Failed(GatewayError::MalformedResponse(message)) => {
            assert!(message.contains("SAFETY"), "{message}");
        }
        other => panic!("expected malformed response, got {other:?}"),
    }
}

#[tokio::test]
async fn chat_sends_system_instruction_and_history() {
    let server = MockServer::start().await;
    mount_gemini_reply(&server, MODEL, "Use an iterator.").await;

    let mut assistant = Assistant::new(transport(&server), keyed_store(), EventSink::disconnected());
    for question in ["How do I sum a Vec?", "Without a loop?"] {
        assistant
            .send_chat_message(question, CancellationToken::new())
            .await
            .unwrap();
    }

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[1].body).unwrap();
    assert!(body["system_instruction"]["parts"][0]["text"].is_string());
    let roles: Vec<&str> = body["contents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["user", "model", "user"]);
    let temperature = body["generationConfig"]["temperature"].as_f64().unwrap();
    assert!((temperature - 0.7).abs() < 1e-6);
}
