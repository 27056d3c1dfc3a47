//! Review commands end to end: parsing, mapping and reconciliation.

use quill_config::MemorySecretStore;
use quill_engine::{
    Assistant, CommandError, CoreEvent, Document, EventSink, LineSpan, ParseStatus, ReviewKind,
    Severity,
};
use quill_types::DIAGNOSTIC_SOURCE;

use crate::common::{ScriptedTransport, assistant_with_replies, keyed_store, numbered_document};

const FENCED_REPLY: &str = "Here you go:\n```json\n[{\"line\":1,\"message\":\"null deref\",\"severity\":\"error\"}]\n```";

#[tokio::test]
async fn fenced_prose_reply_yields_one_error() {
    let mut assistant = assistant_with_replies(&[FENCED_REPLY]);
    let doc = numbered_document("mem://a.rs", 5);

    let report = assistant.review_document(&doc, None).await.unwrap();

    assert_eq!(report.status, ParseStatus::Parsed);
    let diagnostics = assistant.diagnostics(doc.id());
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].line(), 0);
    assert_eq!(diagnostics[0].message(), "null deref");
    assert_eq!(diagnostics[0].severity(), Severity::Error);
    assert_eq!(diagnostics[0].source(), DIAGNOSTIC_SOURCE);
    assert_eq!(diagnostics[0].range().end_col, "let v1 = 1;".len());
}

#[tokio::test]
async fn prose_without_array_clears_previous_findings() {
    let mut assistant = assistant_with_replies(&[
        FENCED_REPLY,
        "No issues found, code looks good!",
    ]);
    let doc = numbered_document("mem://a.rs", 5);

    assistant.review_document(&doc, None).await.unwrap();
    assert_eq!(assistant.diagnostics(doc.id()).len(), 1);

    let report = assistant.review_document(&doc, None).await.unwrap();
    assert_eq!(report.status, ParseStatus::NoArray);
    assert!(report.added.is_empty());
    assert!(assistant.diagnostics(doc.id()).is_empty());
}

#[tokio::test]
async fn malformed_json_reads_as_clean_review() {
    let mut assistant = assistant_with_replies(&[r#"[{"line": 2, "message": }]"#]);
    let doc = numbered_document("mem://a.rs", 5);

    let report = assistant.review_document(&doc, None).await.unwrap();
    assert_eq!(report.status, ParseStatus::Invalid);
    assert!(assistant.diagnostics(doc.id()).is_empty());
}

#[tokio::test]
async fn hallucinated_lines_are_clamped_into_the_document() {
    let mut assistant = assistant_with_replies(&[
        r#"[{"line": 500, "message": "past the end"}, {"line": -3, "message": "before the start"}, {"message": "no line at all"}]"#,
    ]);
    let doc = numbered_document("mem://a.rs", 10);

    assistant
        .review_selection(&doc, LineSpan::new(3, 6).unwrap(), None)
        .await
        .unwrap();

    let lines: Vec<usize> = assistant
        .diagnostics(doc.id())
        .iter()
        .map(|d| d.line())
        .collect();
    assert_eq!(lines, vec![9, 0, 3]);
    assert!(lines.iter().all(|line| *line < doc.line_count()));
}

#[tokio::test]
async fn quick_review_appends_without_dedup() {
    let reply = r#"[{"line": 2, "message": "index may be out of bounds", "severity": "warning"}]"#;
    let mut assistant = assistant_with_replies(&[reply, reply]);
    let doc = numbered_document("mem://a.rs", 8);
    let span = LineSpan::new(2, 4).unwrap();

    assistant
        .quick_review_selection(&doc, span, None)
        .await
        .unwrap();
    assistant
        .quick_review_selection(&doc, span, None)
        .await
        .unwrap();

    let diagnostics = assistant.diagnostics(doc.id());
    assert_eq!(diagnostics.len(), 2);
    assert!(diagnostics[0].same_finding(&diagnostics[1]));
    assert_ne!(diagnostics[0].id(), diagnostics[1].id());
    assert!(diagnostics.iter().all(|d| d.origin() == ReviewKind::Quick));
}

#[tokio::test]
async fn quick_review_drops_low_value_findings() {
    let mut assistant = assistant_with_replies(&[r#"[
        {"line": 1, "message": "Add a comment explaining this", "severity": "info"},
        {"line": 1, "message": "short"},
        {"line": 2, "message": "Division by zero when count is 0", "severity": "error"}
    ]"#]);
    let doc = numbered_document("mem://a.rs", 4);

    let report = assistant
        .quick_review_selection(&doc, LineSpan::new(0, 3).unwrap(), None)
        .await
        .unwrap();

    assert_eq!(report.filtered, 2);
    assert_eq!(report.added.len(), 1);
    assert_eq!(report.added[0].message(), "Division by zero when count is 0");
}

#[tokio::test]
async fn full_review_with_same_reply_is_idempotent() {
    let reply = r#"[{"line": 1, "message": "unused variable v1"}, {"line": 3, "message": "unused variable v3"}]"#;
    let mut assistant = assistant_with_replies(&[reply, reply]);
    let doc = numbered_document("mem://a.rs", 4);

    assistant.review_document(&doc, None).await.unwrap();
    let first: Vec<_> = assistant.diagnostics(doc.id()).to_vec();
    assistant.review_document(&doc, None).await.unwrap();
    let second = assistant.diagnostics(doc.id());

    assert_eq!(first.len(), second.len());
    assert!(first.iter().zip(second).all(|(a, b)| a.same_finding(b)));
}

#[tokio::test]
async fn selection_review_replaces_quick_findings() {
    let mut assistant = assistant_with_replies(&[
        r#"[{"line": 1, "message": "possible overflow in addition"}]"#,
        "[]",
    ]);
    let doc = numbered_document("mem://a.rs", 4);
    let span = LineSpan::new(0, 1).unwrap();

    assistant
        .quick_review_selection(&doc, span, None)
        .await
        .unwrap();
    assert_eq!(assistant.diagnostics(doc.id()).len(), 1);

    assistant.review_selection(&doc, span, None).await.unwrap();
    assert!(assistant.diagnostics(doc.id()).is_empty());
}

#[tokio::test]
async fn missing_key_changes_nothing() {
    let (sink, mut events) = EventSink::channel();
    let mut assistant = Assistant::new(
        ScriptedTransport::replies(&["[]"]),
        MemorySecretStore::new(),
        sink,
    );
    let doc = numbered_document("mem://a.rs", 3);

    for result in [
        assistant.review_document(&doc, None).await,
        assistant
            .quick_review_selection(&doc, LineSpan::single(0), None)
            .await,
    ] {
        assert!(matches!(result, Err(CommandError::MissingApiKey)));
    }
    assert!(matches!(
        assistant.explain(&doc, LineSpan::single(0), None).await,
        Err(CommandError::MissingApiKey)
    ));

    assert_eq!(assistant.gateway().transport().request_count(), 0);
    assert!(assistant.diagnostics(doc.id()).is_empty());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn every_review_publishes_the_full_set() {
    let (sink, mut events) = EventSink::channel();
    let mut assistant = Assistant::new(
        ScriptedTransport::replies(&[
            r#"[{"line": 1, "message": "first finding"}]"#,
            r#"[{"line": 2, "message": "second finding"}]"#,
        ]),
        keyed_store(),
        sink,
    );
    let doc = numbered_document("mem://a.rs", 3);
    let span = LineSpan::new(0, 2).unwrap();

    assistant
        .quick_review_selection(&doc, span, None)
        .await
        .unwrap();
    assistant
        .quick_review_selection(&doc, span, None)
        .await
        .unwrap();

    let mut sizes = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::DiagnosticsUpdated { document, diagnostics } = event {
            assert_eq!(&document, doc.id());
            sizes.push(diagnostics.len());
        }
    }
    assert_eq!(sizes, vec![1, 2]);
}

#[tokio::test]
async fn close_document_drops_its_diagnostics() {
    let mut assistant = assistant_with_replies(&[FENCED_REPLY]);
    let doc = numbered_document("mem://a.rs", 3);

    assistant.review_document(&doc, None).await.unwrap();
    assistant.close_document(doc.id());

    assert!(assistant.diagnostics(doc.id()).is_empty());
    assert!(!assistant.reconciler().is_open(doc.id()));
}
