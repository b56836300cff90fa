//! Attempts that end without a session

use std::time::Duration;

use memberhub_connector::credentials::keys;
use memberhub_connector::oauth::CodeVerifier;
use memberhub_connector::{BackendError, CallbackResponse, ConnectError, DependenciesBuilder, PkceError};
use memberhub_core::{ConnectionStatus, ConnectorEvent, FailureKind, FlowState, SessionStore};
use pretty_assertions::assert_eq;
use tests::{events, test_config, TestConnector};
use tokio::time::Instant;

/// Elapsed paused time is `secs`, give or take timer rounding.
fn assert_within(started: Instant, secs: u64) {
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(secs), "ended early: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(secs + 1), "ended late: {:?}", elapsed);
}

/// Everything an ended attempt must have released.
fn assert_released(h: &TestConnector) {
    assert!(!h.verifier_stored(), "verifier left behind");
    assert_eq!(h.connector.channel().listener_count(), 0, "listener left behind");
    for i in 0..h.host.opened() {
        assert!(h.host.window(i).is_closed_now(), "popup {} left open", i);
    }
}

#[tokio::test(start_paused = true)]
async fn test_token_exchange_rejected() {
    let mut h = TestConnector::new();
    h.backend
        .set_callback(Err(BackendError::Rejected("invalid_grant".into())));

    let attempt = h.spawn_connect();
    h.wait_for_popups(1).await;
    h.post_success("abc123");

    let err = attempt.await.unwrap().unwrap_err();
    assert_eq!(err, ConnectError::Backend("invalid_grant".into()));
    assert_eq!(h.state(), FlowState::Failed);
    assert!(h.connector.credentials().load().await.is_none());
    assert!(h.repo.is_empty());
    assert_released(&h);
    assert!(h.backend.data_tokens().is_empty());

    let events = h.drain_events();
    assert_eq!(events::count_failures(&events), 1);
    assert!(events.contains(&ConnectorEvent::ConnectFailed {
        kind: FailureKind::Backend,
        message: "invalid_grant".into(),
    }));
    assert_eq!(
        h.controller().status(),
        ConnectionStatus::Failed {
            message: "invalid_grant".into()
        }
    );
    assert!(h.controller().can_connect());
}

#[tokio::test(start_paused = true)]
async fn test_popup_blocked_leaves_nothing_behind() {
    let mut h = TestConnector::new();
    h.host.block();

    let err = h.controller().connect().await.unwrap_err();
    assert_eq!(err, ConnectError::PopupBlocked);
    assert_eq!(h.host.opened(), 0);
    assert_eq!(h.connector.channel().listener_count(), 0);
    assert!(!h.verifier_stored());
    assert_eq!(h.state(), FlowState::Failed);
    assert_eq!(events::count_failures(&h.drain_events()), 1);
}

#[tokio::test(start_paused = true)]
async fn test_foreign_origin_does_not_settle_attempt() {
    let mut h = TestConnector::new();
    let attempt = h.spawn_connect();
    h.wait_for_popups(1).await;

    let success = r#"{"type":"OAUTH_SUCCESS","code":"stolen"}"#;
    assert!(!h.post_from("https://evil.example", success));
    assert!(!h.post_from("http://localhost:45819", success));
    assert!(!h.post_from("http://127.0.0.1:45819/", success));
    tokio::task::yield_now().await;

    assert_eq!(h.state(), FlowState::AwaitingPopup);
    assert!(h.backend.callbacks().is_empty());
    assert!(h.verifier_stored());

    assert!(h.controller().cancel().await);
    assert_eq!(attempt.await.unwrap(), Err(ConnectError::Superseded));
    assert_eq!(h.state(), FlowState::Idle);
    assert_released(&h);
    // A cancelled attempt is not a failure notification
    assert_eq!(events::count_failures(&h.drain_events()), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unrecognized_message_is_ignored() {
    let h = TestConnector::new();
    let attempt = h.spawn_connect();
    h.wait_for_popups(1).await;

    assert!(!h.post(r#"{"type":"PING"}"#));
    assert!(!h.post("not json"));
    assert!(!h.post(r#"{"type":"OAUTH_SUCCESS","code":""}"#));
    tokio::task::yield_now().await;
    assert_eq!(h.state(), FlowState::AwaitingPopup);

    h.controller().cancel().await;
    let _ = attempt.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_popup_closed_without_message() {
    let mut h = TestConnector::new();
    let attempt = h.spawn_connect();
    h.wait_for_popups(1).await;

    let closed_at = Instant::now();
    h.host.window(0).user_close();

    let err = attempt.await.unwrap().unwrap_err();
    assert_eq!(err, ConnectError::UserCancelled);
    assert!(closed_at.elapsed() < Duration::from_millis(1100));
    assert_eq!(h.state(), FlowState::Failed);
    assert_released(&h);
    // The user closed it; the controller did not
    assert_eq!(h.host.window(0).close_calls(), 0);

    let events = h.drain_events();
    assert_eq!(events::count_failures(&events), 1);
    assert!(events.contains(&ConnectorEvent::ConnectFailed {
        kind: FailureKind::UserCancelled,
        message: ConnectError::UserCancelled.to_string(),
    }));
}

#[tokio::test(start_paused = true)]
async fn test_popup_times_out() {
    let mut h = TestConnector::new();
    // Probes never report a close; only the timeout can end this
    h.host.fail_probes();
    let started = Instant::now();
    let attempt = h.spawn_connect();
    h.wait_for_popups(1).await;

    let err = attempt.await.unwrap().unwrap_err();
    assert_eq!(err, ConnectError::Timeout(300));
    assert_within(started, 300);
    assert_eq!(h.controller().status(), ConnectionStatus::TimedOut);
    assert_released(&h);
    assert_eq!(h.host.window(0).close_calls(), 1);
    assert_eq!(events::count_failures(&h.drain_events()), 1);

    // A message after the timeout finds nobody listening
    assert!(!h.post_success("too-late"));
    assert!(h.backend.callbacks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_custom_popup_timeout() {
    let mut config = test_config();
    config.popup_timeout = Duration::from_secs(30);
    let h = TestConnector::build(&config, DependenciesBuilder::new());
    h.host.fail_probes();

    let started = Instant::now();
    let attempt = h.spawn_connect();
    assert_eq!(attempt.await.unwrap(), Err(ConnectError::Timeout(30)));
    assert_within(started, 30);
}

#[tokio::test(start_paused = true)]
async fn test_authorization_error_message() {
    let mut h = TestConnector::new();
    let attempt = h.spawn_connect();
    h.wait_for_popups(1).await;

    assert!(h.post(r#"{"type":"OAUTH_ERROR","error":"access_denied"}"#));
    let err = attempt.await.unwrap().unwrap_err();
    assert_eq!(err, ConnectError::AuthorizationDenied("access_denied".into()));
    assert!(h.backend.callbacks().is_empty());
    assert_eq!(h.state(), FlowState::Failed);
    assert_released(&h);

    let events = h.drain_events();
    assert!(events.contains(&ConnectorEvent::StateChanged {
        from: FlowState::AwaitingPopup,
        to: FlowState::ExchangingCode,
    }));
    assert_eq!(events::count_failures(&events), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_verifier_is_integrity_error() {
    let mut h = TestConnector::new();
    let attempt = h.spawn_connect();
    h.wait_for_popups(1).await;

    h.session.remove(keys::PKCE_VERIFIER);
    h.post_success("abc123");

    let err = attempt.await.unwrap().unwrap_err();
    assert_eq!(err, ConnectError::Integrity);
    // Never retried with some other verifier
    assert!(h.backend.callbacks().is_empty());
    assert_eq!(h.state(), FlowState::Failed);
    assert_released(&h);

    let events = h.drain_events();
    assert!(events.contains(&ConnectorEvent::ConnectFailed {
        kind: FailureKind::Integrity,
        message: ConnectError::Integrity.to_string(),
    }));
}

#[tokio::test(start_paused = true)]
async fn test_response_without_user_is_protocol_error() {
    let h = TestConnector::new();
    h.backend.set_callback(Ok(CallbackResponse {
        access_token: Some("tok1".into()),
        ..Default::default()
    }));

    let attempt = h.spawn_connect();
    h.wait_for_popups(1).await;
    h.post_success("abc123");

    let err = attempt.await.unwrap().unwrap_err();
    assert!(matches!(err, ConnectError::Protocol(_)));
    assert!(h.repo.is_empty());
    assert_eq!(h.state(), FlowState::Failed);
    assert_released(&h);
}

#[tokio::test(start_paused = true)]
async fn test_response_without_token_is_protocol_error() {
    let h = TestConnector::new();
    h.backend.set_callback(Ok(CallbackResponse {
        user: Some(tests::fixtures::profile_json()),
        ..Default::default()
    }));

    let attempt = h.spawn_connect();
    h.wait_for_popups(1).await;
    h.post_success("abc123");

    assert!(matches!(
        attempt.await.unwrap(),
        Err(ConnectError::Protocol(_))
    ));
    assert!(h.repo.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_non_http_auth_url_is_protocol_error() {
    let h = TestConnector::new();
    h.backend.set_authorize(Ok("javascript:alert(1)".into()));

    let err = h.controller().connect().await.unwrap_err();
    assert!(matches!(err, ConnectError::Protocol(_)));
    assert_eq!(h.host.opened(), 0);
    assert!(!h.verifier_stored());
}

#[tokio::test(start_paused = true)]
async fn test_authorize_failure_surfaces_backend_message() {
    let h = TestConnector::new();
    h.backend
        .set_authorize(Err(BackendError::Rejected("SoundCloud client not configured".into())));

    let err = h.controller().connect().await.unwrap_err();
    assert_eq!(err, ConnectError::Backend("SoundCloud client not configured".into()));
    assert_eq!(h.host.opened(), 0);
    assert!(!h.verifier_stored());
    assert_eq!(h.state(), FlowState::Failed);
}

fn broken_random() -> Result<CodeVerifier, PkceError> {
    Err(PkceError::RandomUnavailable("no entropy".into()))
}

#[tokio::test(start_paused = true)]
async fn test_random_failure_aborts_attempt() {
    let h = TestConnector::build(
        &test_config(),
        DependenciesBuilder::new().with_verifier_generator(broken_random),
    );

    let err = h.controller().connect().await.unwrap_err();
    assert!(matches!(err, ConnectError::Pkce(_)));
    assert!(h.backend.authorize_requests().is_empty());
    assert_eq!(h.host.opened(), 0);
    assert!(!h.verifier_stored());
    assert_eq!(h.state(), FlowState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_storage_failure_fails_attempt() {
    let h = TestConnector::new();
    h.repo.fail_writes();

    let attempt = h.spawn_connect();
    h.wait_for_popups(1).await;
    h.post_success("abc123");

    let err = attempt.await.unwrap().unwrap_err();
    assert!(matches!(err, ConnectError::Storage(_)));
    assert_eq!(h.state(), FlowState::Failed);
    assert!(h.controller().snapshot().user.is_none());
    assert_released(&h);
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_failure_uses_fresh_pair() {
    let h = TestConnector::new();
    let first = h.spawn_connect();
    h.wait_for_popups(1).await;
    h.host.window(0).user_close();
    assert_eq!(first.await.unwrap(), Err(ConnectError::UserCancelled));

    let second = h.spawn_connect();
    h.wait_for_popups(2).await;
    assert_eq!(h.state(), FlowState::AwaitingPopup);
    // Failure detail cleared when the new attempt started
    assert_eq!(h.controller().snapshot().last_failure, None);
    h.post_success("abc123");
    second.await.unwrap().unwrap();

    let challenges = h.backend.challenges();
    assert_eq!(challenges.len(), 2);
    assert_ne!(challenges[0], challenges[1]);
    assert_eq!(h.state(), FlowState::Connected);
}
