//! Configuration and secret storage feeding a live assistant.

use std::fs;
use std::path::{Path, PathBuf};

use quill_config::{API_KEY_SECRET, EnvSecretStore, FileSecretStore, QuillConfig, SecretStore};
use quill_engine::{ApiConfig, Assistant, Document, EventSink, LineSpan};
use quill_providers::gemini::GeminiTransport;
use wiremock::MockServer;

use crate::common::{mount_gemini_reply, numbered_document};

fn write_config(dir: &tempfile::TempDir, server: &MockServer) -> PathBuf {
    let path = dir.path().join("config.toml");
    let body = format!(
        r#"
[app]
model = "gemini-2.5-pro"
endpoint = "{}/"

[api_keys]
google = "config-key"

[review]
min_message_chars = 20
low_value_keywords = ["Docs"]
"#,
        server.uri()
    );
    fs::write(&path, body).unwrap();
    path
}

fn assistant_from(
    config: &QuillConfig,
    secrets_path: &Path,
) -> Assistant<GeminiTransport, EnvSecretStore<FileSecretStore>> {
    let mut api = ApiConfig::new(config.model());
    if let Some(endpoint) = config.endpoint() {
        api = api.with_base_url(endpoint);
    }
    let mut secrets = EnvSecretStore::new(FileSecretStore::new(secrets_path));
    if let Some(key) = config.google_api_key() {
        secrets = secrets.with_default(API_KEY_SECRET, key.expose_secret());
    }
    Assistant::new(GeminiTransport::new(api), secrets, EventSink::disconnected())
        .with_review_settings(config.review_settings())
}

#[tokio::test]
async fn config_file_drives_model_endpoint_and_filter() {
    let server = MockServer::start().await;
    mount_gemini_reply(
        &server,
        "gemini-2.5-pro",
        r#"[
            {"line": 1, "message": "too short here"},
            {"line": 1, "message": "Missing docs for this public function"},
            {"line": 2, "message": "Integer division truncates the average"}
        ]"#,
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let config = QuillConfig::load_from(&write_config(&dir, &server))
        .unwrap()
        .unwrap();
    let mut assistant = assistant_from(&config, &dir.path().join("secrets.toml"));
    let doc = numbered_document("mem://avg.rs", 3);

    let report = assistant
        .quick_review_selection(&doc, LineSpan::new(0, 2).unwrap(), None)
        .await
        .unwrap();

    assert_eq!(report.filtered, 2);
    let diagnostics = assistant.diagnostics(doc.id());
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].line(), 1);

    let received = server.received_requests().await.unwrap();
    assert_eq!(
        received[0].headers.get("x-goog-api-key").unwrap(),
        "config-key"
    );
}

#[tokio::test]
async fn stored_key_takes_precedence_over_config() {
    let server = MockServer::start().await;
    mount_gemini_reply(&server, "gemini-2.5-pro", "[]").await;

    let dir = tempfile::tempdir().unwrap();
    let config = QuillConfig::load_from(&write_config(&dir, &server))
        .unwrap()
        .unwrap();
    let secrets_path = dir.path().join("secrets.toml");

    assistant_from(&config, &secrets_path)
        .set_api_key("  stored-key  ")
        .unwrap();
    assert_eq!(
        FileSecretStore::new(&secrets_path)
            .get_secret(API_KEY_SECRET)
            .unwrap()
            .as_deref(),
        Some("stored-key")
    );

    let mut assistant = assistant_from(&config, &secrets_path);
    let doc = numbered_document("mem://avg.rs", 2);
    assistant.review_document(&doc, None).await.unwrap();

    let received = server.received_requests().await.unwrap();
    assert_eq!(
        received[0].headers.get("x-goog-api-key").unwrap(),
        "stored-key"
    );
}
