//! Applying a fix for one diagnostic.

use quill_engine::{CommandError, Document, FixOutcome, GatewayError, LineSpan};

use crate::common::{Step, assistant, assistant_with_replies, numbered_document};

const REVIEW: &str = r#"[
    {"line": 3, "message": "v3 shadows an outer binding", "severity": "info"},
    {"line": 6, "message": "v6 overflows on 32-bit targets", "severity": "error"},
    {"line": 16, "message": "v16 is never read", "severity": "warning"}
]"#;

fn nine_line_fix() -> String {
    let body: Vec<String> = (1..=9).map(|n| format!("let fixed{n} = {n};")).collect();
    format!("Replace the block with:\n```rust\n{}\n```\n", body.join("\n"))
}

#[tokio::test]
async fn fix_removes_exactly_the_target_and_rebases_the_rest() {
    let fix = nine_line_fix();
    let mut assistant = assistant_with_replies(&[REVIEW, fix.as_str()]);
    let mut doc = numbered_document("mem://fix.rs", 20);

    assistant.review_document(&doc, None).await.unwrap();
    let before = assistant.diagnostics(doc.id()).to_vec();
    assert_eq!(before.len(), 3);
    let target = before[1].clone();
    assert_eq!(target.line(), 5);

    let outcome = assistant
        .apply_fix(&mut doc, target.id(), None)
        .await
        .unwrap();

    let FixOutcome::Applied {
        fixed,
        replaced,
        inserted_lines,
    } = outcome
    else {
        panic!("expected the fix to apply, got {outcome:?}");
    };
    assert_eq!(fixed.id(), target.id());
    assert_eq!(replaced, LineSpan::new(0, 10).unwrap());
    assert_eq!(inserted_lines, 9);
    assert_eq!(doc.line_count(), 18);
    assert_eq!(doc.line_at(0), Some("let fixed1 = 1;"));
    assert_eq!(doc.line_at(9), Some("let v12 = 12;"));

    let after = assistant.diagnostics(doc.id());
    assert_eq!(after.len(), 2);
    assert!(after.iter().all(|d| d.id() != target.id()));
    assert_eq!(after[0].id(), before[0].id());
    assert_eq!(after[0].line(), 2);
    assert_eq!(after[1].id(), before[2].id());
    assert_eq!(after[1].line(), 13);
    assert_eq!(doc.line_at(after[1].line()), Some("let v16 = 16;"));
    assert!(after.iter().all(|d| d.line() < doc.line_count()));

    let prompt = assistant.gateway().transport().last_prompt();
    assert!(prompt.contains("v6 overflows on 32-bit targets"));
}

#[tokio::test]
async fn rejected_edit_leaves_the_set_untouched() {
    let fix = nine_line_fix();
    let mut assistant = assistant_with_replies(&[REVIEW, fix.as_str()]);
    let mut doc = numbered_document("mem://fix.rs", 20).read_only(true);

    assistant.review_document(&doc, None).await.unwrap();
    let before = assistant.diagnostics(doc.id()).to_vec();

    let outcome = assistant
        .apply_fix(&mut doc, before[1].id(), None)
        .await
        .unwrap();

    assert!(matches!(outcome, FixOutcome::NotApplied { .. }));
    assert_eq!(assistant.diagnostics(doc.id()), before.as_slice());
    assert_eq!(doc.line_at(0), Some("let v1 = 1;"));
}

#[tokio::test]
async fn unfenced_reply_is_used_verbatim() {
    let mut assistant = assistant_with_replies(&[
        r#"[{"line": 1, "message": "v1 should be a constant"}]"#,
        "  const V1: i32 = 1;  \n",
    ]);
    let mut doc = numbered_document("mem://fix.rs", 3);
    assistant.review_document(&doc, None).await.unwrap();
    let id = assistant.diagnostics(doc.id())[0].id();

    let outcome = assistant.apply_fix(&mut doc, id, None).await.unwrap();

    assert!(matches!(outcome, FixOutcome::Applied { inserted_lines: 1, .. }));
    assert_eq!(doc.line_count(), 1);
    assert_eq!(doc.line_at(0), Some("const V1: i32 = 1;"));
    assert!(assistant.diagnostics(doc.id()).is_empty());
}

#[tokio::test]
async fn failed_fix_request_keeps_the_diagnostic() {
    let mut assistant = assistant([
        Step::Reply(REVIEW.to_string()),
        Step::Fail(GatewayError::Endpoint {
            status: 503,
            message: "overloaded".to_string(),
        }),
    ]);
    let mut doc = numbered_document("mem://fix.rs", 20);
    assistant.review_document(&doc, None).await.unwrap();
    let id = assistant.diagnostics(doc.id())[0].id();

    let err = assistant.apply_fix(&mut doc, id, None).await.unwrap_err();

    assert!(matches!(
        err,
        CommandError::Gateway(GatewayError::Endpoint { status: 503, .. })
    ));
    assert_eq!(assistant.diagnostics(doc.id()).len(), 3);
    assert_eq!(doc.line_count(), 20);
}
