use std::time::Duration;

use super::*;
use crate::backend::{CreateChatResponse, CreateUserResponse};
use crate::platform::CHANNEL_TYPE;
use crate::test_helpers::{MockBackend, MockPlatform, RecordingAlerts, id};

struct Harness {
    app: Arc<ChatApp>,
    backend: Arc<MockBackend>,
    platform: Arc<MockPlatform>,
    alerts: Arc<RecordingAlerts>,
}

fn harness() -> Harness {
    let backend = Arc::new(MockBackend::default());
    let platform = Arc::new(MockPlatform::new());
    let alerts = Arc::new(RecordingAlerts::default());
    let app = Arc::new(ChatApp::new(backend.clone(), platform.clone(), alerts.clone(), Pairing::default()));
    Harness { app, backend, platform, alerts }
}

fn message(id: &str, text: &str) -> ChatMessage {
    ChatMessage { id: id.into(), text: text.into(), user_id: "bob".into(), user_name: None, created_at: None }
}

// =========================================================================
// login
// =========================================================================

#[tokio::test]
async fn login_reaches_ready_with_counterpart_channel() {
    let h = harness();

    h.app.login_as("alice").await.unwrap();

    let phase = h.app.phase();
    assert_eq!(phase.identity(), Some(&id("alice")));
    let channel = phase.channel().unwrap();
    assert_eq!(channel.id, "alice_bob");
    assert_eq!(channel.kind, CHANNEL_TYPE);
    assert_eq!(channel.members, vec!["alice".to_owned(), "bob".to_owned()]);

    assert_eq!(h.backend.calls(), vec!["create_user:alice:User alice", "create_chat:alice:bob:alice"]);
    assert_eq!(
        h.platform.log(),
        vec!["disconnect", "connect:alice:tok-alice", "watch:messaging:alice_bob:alice,bob"]
    );
}

#[tokio::test]
async fn login_unknown_user_pairs_with_alice() {
    let h = harness();

    h.app.login_as("carol").await.unwrap();

    assert_eq!(h.backend.calls()[1], "create_chat:carol:alice:carol");
    assert_eq!(h.app.phase().channel().unwrap().id, "alice_carol");
}

#[tokio::test]
async fn login_without_token_stays_logged_out_and_never_connects() {
    let h = harness();
    h.backend
        .user_replies
        .lock()
        .unwrap()
        .insert("alice".into(), CreateUserResponse::default());

    let err = h.app.login_as("alice").await.unwrap_err();

    assert!(matches!(err, ChatError::MissingField("token")));
    assert_eq!(h.app.phase(), Phase::LoggedOut);
    assert!(h.platform.connects().is_empty());
    assert_eq!(h.backend.calls(), vec!["create_user:alice:User alice"]);
}

#[tokio::test]
async fn login_with_empty_token_counts_as_missing() {
    let h = harness();
    h.backend
        .user_replies
        .lock()
        .unwrap()
        .insert("alice".into(), CreateUserResponse { token: Some(String::new()), ..Default::default() });

    assert!(h.app.login_as("alice").await.is_err());
    assert!(h.platform.connects().is_empty());
}

#[tokio::test]
async fn missing_channel_id_leaves_channel_loading() {
    let h = harness();
    *h.backend.chat_reply.lock().unwrap() = Some(CreateChatResponse::default());

    let err = h.app.login_as("alice").await.unwrap_err();

    assert!(matches!(err, ChatError::MissingField("channel_id")));
    assert_eq!(h.app.phase(), Phase::AwaitingChannel(id("alice")));
    assert!(!h.platform.log().iter().any(|entry| entry.starts_with("watch:")));
}

#[tokio::test]
async fn failed_watch_leaves_channel_loading() {
    let h = harness();
    *h.platform.fail_watch.lock().unwrap() = true;

    assert!(h.app.login_as("bob").await.is_err());

    assert_eq!(h.app.phase(), Phase::AwaitingChannel(id("bob")));
}

#[tokio::test]
async fn empty_identifier_makes_no_calls() {
    let h = harness();

    let err = h.app.login_as("  ").await.unwrap_err();

    assert!(matches!(err, ChatError::EmptyIdentity));
    assert!(h.backend.calls().is_empty());
    assert!(h.platform.log().is_empty());
}

#[tokio::test]
async fn login_uses_pending_identifier() {
    let h = harness();
    h.app.set_pending("bob");
    assert_eq!(h.app.pending(), "bob");

    h.app.login().await.unwrap();

    assert_eq!(h.app.phase().identity(), Some(&id("bob")));
}

#[tokio::test]
async fn relogin_disconnects_previous_before_connecting() {
    let h = harness();

    h.app.login_as("alice").await.unwrap();
    h.app.login_as("bob").await.unwrap();

    assert_eq!(
        h.platform.log(),
        vec![
            "disconnect",
            "connect:alice:tok-alice",
            "watch:messaging:alice_bob:alice,bob",
            "disconnect",
            "connect:bob:tok-bob",
            "watch:messaging:alice_bob:bob,alice",
        ]
    );
    assert_eq!(h.app.phase().identity(), Some(&id("bob")));
}

#[tokio::test]
async fn relogin_clears_state_before_network_resolves() {
    let h = harness();
    h.app.login_as("alice").await.unwrap();
    assert!(h.app.phase().channel().is_some());

    let gate = h.backend.gate("bob");
    let app = h.app.clone();
    let task = tokio::spawn(async move { app.login_as("bob").await });

    gate.entered.notified().await;
    assert_eq!(h.app.phase(), Phase::LoggedOut);

    gate.release.notify_one();
    task.await.unwrap().unwrap();
    assert_eq!(h.app.phase().identity(), Some(&id("bob")));
}

#[tokio::test]
async fn superseded_login_never_publishes() {
    let h = harness();
    let gate = h.backend.gate("alice");

    let app = h.app.clone();
    let slow = tokio::spawn(async move { app.login_as("alice").await });
    gate.entered.notified().await;

    h.app.login_as("bob").await.unwrap();
    gate.release.notify_one();

    let err = slow.await.unwrap().unwrap_err();
    assert!(matches!(err, ChatError::Superseded));
    assert_eq!(h.app.phase().identity(), Some(&id("bob")));
    assert_eq!(h.platform.connects(), vec!["connect:bob:tok-bob"]);
}

#[tokio::test]
async fn stalled_connect_does_not_block_newer_login() {
    let h = harness();
    let gate = h.platform.gate_connect("alice");

    let app = h.app.clone();
    let stalled = tokio::spawn(async move { app.login_as("alice").await });
    gate.entered.notified().await;

    tokio::time::timeout(Duration::from_secs(1), h.app.login_as("bob")).await.unwrap().unwrap();

    let err = tokio::time::timeout(Duration::from_secs(1), stalled).await.unwrap().unwrap().unwrap_err();
    assert!(matches!(err, ChatError::Superseded));
    assert_eq!(h.app.phase().identity(), Some(&id("bob")));
    assert_eq!(h.platform.connects(), vec!["connect:bob:tok-bob"]);
}

#[tokio::test]
async fn stale_login_never_watches_after_newer_login() {
    let h = harness();
    let gate = h.backend.gate("alice");

    let app = h.app.clone();
    let slow = tokio::spawn(async move { app.login_as("alice").await });
    gate.entered.notified().await;
    h.app.login_as("bob").await.unwrap();
    gate.release.notify_one();
    assert!(slow.await.unwrap().is_err());

    let watches: Vec<String> = h.platform.log().into_iter().filter(|entry| entry.starts_with("watch:")).collect();
    assert_eq!(watches, vec!["watch:messaging:alice_bob:bob,alice"]);
}

#[tokio::test]
async fn phase_watchers_see_progress() {
    let h = harness();
    let mut phases = h.app.watch_phase();

    h.app.login_as("alice").await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), phases.changed()).await.unwrap().unwrap();
    assert!(phases.borrow_and_update().channel().is_some());
}

// =========================================================================
// start_ai_chat
// =========================================================================

#[tokio::test]
async fn ai_chat_without_channel_alerts_once_and_sends_nothing() {
    let h = harness();

    let err = h.app.start_ai_chat().await.unwrap_err();

    assert!(matches!(err, ChatError::NoActiveChannel));
    assert_eq!(*h.alerts.0.lock().unwrap(), vec![NO_CHANNEL_ALERT.to_owned()]);
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn ai_chat_while_channel_loading_alerts() {
    let h = harness();
    *h.backend.chat_reply.lock().unwrap() = Some(CreateChatResponse::default());
    let _ = h.app.login_as("alice").await;
    let before = h.backend.calls().len();

    assert!(h.app.start_ai_chat().await.is_err());

    assert_eq!(h.alerts.0.lock().unwrap().len(), 1);
    assert_eq!(h.backend.calls().len(), before);
}

#[tokio::test]
async fn ai_chat_sends_channel_id_and_seed_prompt() {
    let h = harness();
    h.app.login_as("bob").await.unwrap();

    h.app.start_ai_chat().await.unwrap();
    h.app.start_ai_chat().await.unwrap();

    let calls = h.backend.calls();
    assert_eq!(calls[2], "ai_chat:alice_bob:Hello, AI!");
    assert_eq!(calls[3], "ai_chat:alice_bob:Hello, AI!");
    assert!(h.alerts.0.lock().unwrap().is_empty());
}

#[tokio::test]
async fn ai_chat_backend_error_is_returned_without_alert() {
    let h = harness();
    h.app.login_as("alice").await.unwrap();
    *h.backend.ai_error.lock().unwrap() = Some("quota exceeded".into());

    let err = h.app.start_ai_chat().await.unwrap_err();

    assert!(matches!(err, ChatError::Status { ref message, .. } if message == "quota exceeded"));
    assert!(h.alerts.0.lock().unwrap().is_empty());
}

// =========================================================================
// send_message
// =========================================================================

#[tokio::test]
async fn send_message_without_channel_alerts() {
    let h = harness();

    assert!(matches!(h.app.send_message("hi").await, Err(ChatError::NoActiveChannel)));
    assert_eq!(h.alerts.0.lock().unwrap().len(), 1);
    assert!(h.platform.log().is_empty());
}

#[tokio::test]
async fn send_message_posts_trimmed_text() {
    let h = harness();
    h.app.login_as("alice").await.unwrap();

    let sent = h.app.send_message("  hi bob ").await.unwrap().unwrap();

    assert_eq!(sent.text, "hi bob");
    assert_eq!(h.platform.log().last().unwrap(), "send:messaging:alice_bob:hi bob");
}

#[tokio::test]
async fn send_blank_message_is_ignored() {
    let h = harness();

    assert_eq!(h.app.send_message("   ").await.unwrap(), None);
    assert!(h.alerts.0.lock().unwrap().is_empty());
}

// =========================================================================
// apply_event
// =========================================================================

#[tokio::test]
async fn apply_event_appends_to_active_channel_once() {
    let h = harness();
    h.app.login_as("alice").await.unwrap();
    let event = PlatformEvent::MessageNew { cid: "messaging:alice_bob".into(), message: message("m1", "hey") };

    assert_eq!(h.app.apply_event(&event), Some(message("m1", "hey")));
    assert_eq!(h.app.apply_event(&event), None);
    assert_eq!(h.app.phase().channel().unwrap().messages, vec![message("m1", "hey")]);
}

#[tokio::test]
async fn apply_event_ignores_other_channels_and_kinds() {
    let h = harness();
    h.app.login_as("alice").await.unwrap();

    let elsewhere = PlatformEvent::MessageNew { cid: "messaging:carol_dave".into(), message: message("m1", "x") };
    assert_eq!(h.app.apply_event(&elsewhere), None);
    assert_eq!(h.app.apply_event(&PlatformEvent::Disconnected), None);
    assert!(h.app.phase().channel().unwrap().messages.is_empty());
}

#[test]
fn apply_event_before_login_is_ignored() {
    let h = harness();
    let event = PlatformEvent::MessageNew { cid: "messaging:alice_bob".into(), message: message("m1", "x") };
    assert_eq!(h.app.apply_event(&event), None);
}
