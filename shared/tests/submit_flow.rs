use assert_matches::assert_matches;
use std::sync::Arc;

use chat_shared::capabilities::{ManualClock, MemoryKv, MemoryRemoteLog};
use chat_shared::{
    Author, Draft, MessageBody, MessageSubmitter, Notice, RetryPolicy, SubmitError, SyncConfig,
    SyncCoordinator, SyncEvent, UnixTimeMs, UserId, ValidationError,
};

fn setup() -> (
    Arc<MemoryRemoteLog>,
    SyncCoordinator<MemoryRemoteLog, MemoryKv>,
    MessageSubmitter<MemoryRemoteLog>,
) {
    let config = SyncConfig {
        retry: RetryPolicy::disabled(),
        max_text_len: 280,
        ..SyncConfig::default()
    };
    let log = Arc::new(MemoryRemoteLog::new());
    let coordinator =
        SyncCoordinator::new(&config, log.clone(), Arc::new(MemoryKv::new())).unwrap();
    let submitter = MessageSubmitter::new(
        log.clone(),
        config.collection.as_str(),
        Author::new(UserId::new("me"), "Grace", "#8A95A5"),
        Arc::new(ManualClock::new(UnixTimeMs(1_700_000_000_000))),
        config.max_text_len,
    );
    (log, coordinator, submitter)
}

#[tokio::test]
async fn sent_message_appears_only_with_next_snapshot() {
    let (log, mut coordinator, submitter) = setup();
    coordinator
        .handle(SyncEvent::ConnectivityChanged { online: true })
        .await;
    coordinator.process_pending().await;
    assert!(coordinator.current_messages().is_empty());

    // 1. Submit succeeds; nothing is inserted locally
    let id = submitter.submit(Draft::text("hi")).await.unwrap();
    assert!(!coordinator.current_messages().contains(&id));

    // 2. The remote echo arrives as a snapshot
    coordinator.process_pending().await;
    let current = coordinator.current_messages();
    assert!(current.contains(&id));
    assert_eq!(log.append_count().await, 1);

    let view = coordinator.view(&UserId::new("me"));
    assert_eq!(view.messages.len(), 1);
    assert!(view.messages[0].is_mine);
    assert_eq!(view.messages[0].author_color, "#8A95A5");
    assert_eq!(
        view.messages[0].body,
        MessageBody::Text {
            text: "hi".into()
        }
    );
}

#[tokio::test]
async fn all_payload_kinds_round_trip_through_the_log() {
    let (_log, mut coordinator, submitter) = setup();
    coordinator
        .handle(SyncEvent::ConnectivityChanged { online: true })
        .await;

    submitter.submit(Draft::text("look")).await.unwrap();
    submitter
        .submit(Draft::image("https://storage.example/u/me/1.jpg"))
        .await
        .unwrap();
    submitter.submit(Draft::location(40.7128, -74.006)).await.unwrap();
    coordinator.process_pending().await;

    let kinds: Vec<&str> = coordinator
        .current_messages()
        .chronological()
        .map(|m| m.payload.kind())
        .collect();
    assert_eq!(kinds.len(), 3);
    for kind in ["text", "image", "location"] {
        assert!(kinds.contains(&kind));
    }
}

#[tokio::test]
async fn empty_draft_never_reaches_the_log() {
    let (log, _coordinator, submitter) = setup();

    let err = submitter.submit(Draft::text("  \n ")).await.unwrap_err();

    assert_matches!(err, SubmitError::Validation(ValidationError::EmptyDraft));
    assert_eq!(Notice::from(&err).user_message(), "Please enter a message.");
    assert_eq!(log.append_count().await, 0);
}

#[tokio::test]
async fn offline_submit_fails_without_queueing() {
    let (log, _coordinator, submitter) = setup();
    log.set_online(false).await;

    let err = submitter.submit(Draft::text("hello?")).await.unwrap_err();

    assert_matches!(err, SubmitError::Submission(_));
    assert_eq!(Notice::from(&err).user_message(), "Message could not be sent.");

    log.set_online(true).await;
    assert!(log.documents("messages").await.is_empty());
}
