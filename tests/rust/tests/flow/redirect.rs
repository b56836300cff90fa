//! Same-tab redirect entry point

use memberhub_connector::credentials::keys;
use memberhub_connector::ConnectError;
use memberhub_core::{ConnectionStatus, FlowState, SessionStore};
use pretty_assertions::assert_eq;
use tests::{fixtures, mocks::AUTH_URL, TestConnector};

#[tokio::test(start_paused = true)]
async fn test_redirect_with_query_code() {
    let h = TestConnector::new();

    let url = h.controller().begin_redirect().await.unwrap();
    assert_eq!(url, AUTH_URL);
    assert_eq!(h.state(), FlowState::RequestingUrl);
    assert!(h.verifier_stored());
    assert_eq!(h.host.opened(), 0);
    let verifier = h.session.get(keys::PKCE_VERIFIER).unwrap();

    let redirected = format!("{}?code=xyz&state=opaque", h.callback_uri());
    let user = h.controller().complete_from_redirect(&redirected).await.unwrap();
    assert_eq!(user.username, "dj-member");

    let callbacks = h.backend.callbacks();
    assert_eq!(callbacks.len(), 1);
    assert_eq!(callbacks[0].code, "xyz");
    assert_eq!(callbacks[0].verifier, verifier);
    assert_eq!(callbacks[0].redirect_uri, h.callback_uri());

    assert_eq!(h.state(), FlowState::Connected);
    assert!(!h.verifier_stored());
    assert_eq!(h.backend.data_tokens(), vec!["tok1".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_redirect_with_fragment_code() {
    let h = TestConnector::new();
    h.controller().begin_redirect().await.unwrap();

    let redirected = format!("{}#code=frag-code", h.callback_uri());
    h.controller().complete_from_redirect(&redirected).await.unwrap();

    assert_eq!(h.backend.callbacks()[0].code, "frag-code");
    assert_eq!(h.state(), FlowState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_redirect_with_error() {
    let h = TestConnector::new();
    h.controller().begin_redirect().await.unwrap();

    let redirected = format!(
        "{}?error=access_denied&error_description=User%20denied%20access",
        h.callback_uri()
    );
    let err = h.controller().complete_from_redirect(&redirected).await.unwrap_err();
    assert_eq!(
        err,
        ConnectError::AuthorizationDenied("access_denied: User denied access".into())
    );
    assert!(h.backend.callbacks().is_empty());
    assert!(!h.verifier_stored());
    assert_eq!(h.state(), FlowState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_redirect_without_params_is_protocol_error() {
    let h = TestConnector::new();
    h.controller().begin_redirect().await.unwrap();

    let err = h
        .controller()
        .complete_from_redirect(&h.callback_uri())
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectError::Protocol(_)));
    assert!(!h.verifier_stored());
}

#[tokio::test(start_paused = true)]
async fn test_redirect_without_pending_attempt_is_integrity_error() {
    let h = TestConnector::new();

    let redirected = format!("{}?code=replayed", h.callback_uri());
    let err = h.controller().complete_from_redirect(&redirected).await.unwrap_err();
    assert_eq!(err, ConnectError::Integrity);
    assert!(h.backend.callbacks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stray_redirect_leaves_connection_intact() {
    let h = TestConnector::new();
    h.connector
        .credentials()
        .save(&fixtures::session("stored-token"))
        .await
        .unwrap();
    let rehydration = h.connector.rehydrator().run().await;
    rehydration.refresh.unwrap().await.unwrap().unwrap();
    assert_eq!(h.state(), FlowState::Connected);

    let redirected = format!("{}?code=stray", h.callback_uri());
    let err = h.controller().complete_from_redirect(&redirected).await.unwrap_err();
    assert_eq!(err, ConnectError::AlreadyConnected);

    assert_eq!(h.state(), FlowState::Connected);
    assert!(matches!(
        h.controller().status(),
        ConnectionStatus::Connected { .. }
    ));
    assert!(h.controller().snapshot().last_failure.is_none());
    assert!(h.backend.callbacks().is_empty());
    let stored = h.connector.credentials().load().await.unwrap();
    assert_eq!(stored.access_token, "stored-token");
}

#[tokio::test(start_paused = true)]
async fn test_redirect_rejected_while_popup_in_flight() {
    let h = TestConnector::new();
    let attempt = h.spawn_connect();
    h.wait_for_popups(1).await;
    let verifier = h.session.get(keys::PKCE_VERIFIER).unwrap();

    assert_eq!(
        h.controller().begin_redirect().await,
        Err(ConnectError::AttemptInFlight)
    );
    let redirected = format!("{}?code=other", h.callback_uri());
    assert_eq!(
        h.controller().complete_from_redirect(&redirected).await,
        Err(ConnectError::AttemptInFlight)
    );

    // The popup attempt is untouched
    assert_eq!(h.state(), FlowState::AwaitingPopup);
    assert_eq!(h.session.get(keys::PKCE_VERIFIER).unwrap(), verifier);

    h.post_success("abc123");
    attempt.await.unwrap().unwrap();
    assert_eq!(h.backend.callbacks()[0].code, "abc123");
}

#[tokio::test(start_paused = true)]
async fn test_connect_discards_pending_redirect_verifier() {
    let h = TestConnector::new();
    h.controller().begin_redirect().await.unwrap();
    let redirect_verifier = h.session.get(keys::PKCE_VERIFIER).unwrap();

    let attempt = h.spawn_connect();
    h.wait_for_popups(1).await;
    let popup_verifier = h.session.get(keys::PKCE_VERIFIER).unwrap();
    assert_ne!(redirect_verifier, popup_verifier);

    h.post_success("abc123");
    attempt.await.unwrap().unwrap();
    assert_eq!(h.backend.callbacks()[0].verifier, popup_verifier);
}

#[tokio::test(start_paused = true)]
async fn test_new_redirect_replaces_pending_one() {
    let h = TestConnector::new();
    h.controller().begin_redirect().await.unwrap();
    let first = h.session.get(keys::PKCE_VERIFIER).unwrap();

    h.controller().begin_redirect().await.unwrap();
    let second = h.session.get(keys::PKCE_VERIFIER).unwrap();
    assert_ne!(first, second);

    let redirected = format!("{}?code=xyz", h.callback_uri());
    h.controller().complete_from_redirect(&redirected).await.unwrap();
    assert_eq!(h.backend.callbacks()[0].verifier, second);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_discards_pending_redirect() {
    let h = TestConnector::new();
    h.controller().begin_redirect().await.unwrap();

    assert!(h.controller().cancel().await);
    assert!(!h.verifier_stored());
    assert_eq!(h.state(), FlowState::Idle);
}
