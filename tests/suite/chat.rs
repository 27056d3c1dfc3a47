//! Chat through the command surface: context window and cancellation.

use quill_engine::{
    CANCELLED_NOTICE, CancellationToken, ChatOutcome, ChatState, GatewayError, TranscriptEntry,
    Turn,
};
use quill_types::Role;

use crate::common::{Step, assistant};

#[tokio::test]
async fn context_stays_bounded_over_a_long_conversation() {
    let mut assistant = assistant((0..25).map(|i| Step::Reply(format!("answer {i}"))));

    for i in 0..25 {
        let outcome = assistant
            .send_chat_message(&format!("question {i}"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, ChatOutcome::Replied(Turn::assistant(format!("answer {i}"))));
    }

    assert_eq!(assistant.chat().turns().len(), 50);
    let requests = assistant.gateway().transport().requests();
    assert_eq!(requests.len(), 25);
    for request in &requests {
        assert!(request.contents.len() <= 6);
        assert!(request.system_instruction.is_some());
        assert_eq!(request.contents.last().unwrap().role, Role::User);
    }
    let last = requests.last().unwrap();
    assert_eq!(last.contents.len(), 6);
    assert_eq!(last.contents[0].parts, vec!["answer 21"]);
    assert_eq!(last.contents[5].parts, vec!["question 24"]);
}

#[tokio::test]
async fn cancel_mid_request_records_notice_and_no_reply() {
    let mut assistant = assistant([Step::Hang, Step::Reply("second answer".to_string())]);
    let token = CancellationToken::new();
    let handle = token.handle();

    let (outcome, ()) = tokio::join!(assistant.send_chat_message("slow question", token), async {
        handle.cancel();
    });

    assert_eq!(outcome.unwrap(), ChatOutcome::Cancelled);
    assert_eq!(assistant.chat().state(), ChatState::Idle);
    assert_eq!(assistant.chat().turns(), &[Turn::user("slow question")]);
    assert_eq!(
        assistant.chat().transcript().last(),
        Some(&TranscriptEntry::Notice(CANCELLED_NOTICE.to_string()))
    );

    // The session is usable again and the unanswered question is still context.
    let outcome = assistant
        .send_chat_message("follow up", CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, ChatOutcome::Replied(Turn::assistant("second answer")));
    let last = assistant.gateway().transport().requests().pop().unwrap();
    assert_eq!(last.contents.len(), 1);
    assert_eq!(last.contents[0].parts, vec!["slow question", "follow up"]);
}

#[tokio::test]
async fn cancel_before_sending_never_reaches_the_endpoint() {
    let mut assistant = assistant([Step::Reply("unused".to_string())]);
    let token = CancellationToken::new();
    token.handle().cancel();

    let outcome = assistant.send_chat_message("hello", token).await.unwrap();

    assert_eq!(outcome, ChatOutcome::Cancelled);
    assert_eq!(assistant.gateway().transport().request_count(), 0);
    assert!(
        assistant
            .chat()
            .turns()
            .iter()
            .all(|turn| turn.role == Role::User)
    );
}

#[tokio::test]
async fn endpoint_failure_is_shown_once_and_keeps_the_question() {
    let mut assistant = assistant([Step::Fail(GatewayError::Endpoint {
        status: 429,
        message: "quota exceeded".to_string(),
    })]);

    let outcome = assistant
        .send_chat_message("anyone there?", CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        ChatOutcome::Failed(GatewayError::Endpoint { status: 429, .. })
    ));
    assert_eq!(assistant.chat().turns(), &[Turn::user("anyone there?")]);
    let errors = assistant
        .chat()
        .transcript()
        .iter()
        .filter(|entry| matches!(entry, TranscriptEntry::Error(_)))
        .count();
    assert_eq!(errors, 1);
    assert_eq!(assistant.gateway().transport().request_count(), 1);
}

#[tokio::test]
async fn clear_chat_starts_a_fresh_context() {
    let mut assistant = assistant([
        Step::Reply("one".to_string()),
        Step::Reply("two".to_string()),
    ]);
    assistant
        .send_chat_message("first", CancellationToken::new())
        .await
        .unwrap();
    assistant.clear_chat();
    assistant
        .send_chat_message("second", CancellationToken::new())
        .await
        .unwrap();

    let last = assistant.gateway().transport().requests().pop().unwrap();
    assert_eq!(last.contents.len(), 1);
    assert_eq!(last.contents[0].parts, vec!["second"]);
}
