//! Loopback message channel over real HTTP

use std::sync::Arc;

use memberhub_connector::MessageChannel;
use memberhub_core::{
    branding, AppSettingsRepository, AppSettingsService, CallbackPortService, FlowOutcome,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tests::MockAppSettingsRepository;

async fn started(channel: &MessageChannel) -> (u16, String) {
    let port = channel.ensure_started().await.unwrap();
    (port, channel.origin().unwrap())
}

fn collect(channel: &MessageChannel) -> (Arc<Mutex<Vec<FlowOutcome>>>, memberhub_connector::Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let subscription = channel.on_flow_message(move |outcome| sink.lock().push(outcome));
    (seen, subscription)
}

#[tokio::test]
async fn test_bridge_page_served_on_callback_path() {
    let channel = MessageChannel::new(None, Some(0));
    let (port, _) = started(&channel).await;

    let url = format!(
        "{}?code=abc123",
        branding::oauth_callback_uri_with_port(port)
    );
    let response = reqwest::get(&url).await.unwrap();
    assert!(response.status().is_success());
    let page = response.text().await.unwrap();
    assert!(page.contains(branding::OAUTH_MESSAGE_PATH));
    assert!(page.contains("OAUTH_REDIRECT"));

    channel.shutdown().await;
}

#[tokio::test]
async fn test_bridge_envelope_resolves_code_from_fragment() {
    let channel = MessageChannel::new(None, Some(0));
    let (port, origin) = started(&channel).await;
    let (seen, _subscription) = collect(&channel);

    let redirected = format!("{}#code=frag-code", branding::oauth_callback_uri_with_port(port));
    let response = reqwest::Client::new()
        .post(format!("{}{}", origin, branding::OAUTH_MESSAGE_PATH))
        .header("Origin", origin.as_str())
        .json(&serde_json::json!({"type": "OAUTH_REDIRECT", "url": redirected}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
    assert_eq!(
        *seen.lock(),
        vec![FlowOutcome::Success {
            code: "frag-code".into()
        }]
    );

    channel.shutdown().await;
}

#[tokio::test]
async fn test_response_does_not_reveal_rejection() {
    let channel = MessageChannel::new(None, Some(0));
    let (_, origin) = started(&channel).await;
    let (seen, _subscription) = collect(&channel);
    let client = reqwest::Client::new();
    let endpoint = format!("{}{}", origin, branding::OAUTH_MESSAGE_PATH);

    let no_origin = client
        .post(&endpoint)
        .body(r#"{"type":"OAUTH_SUCCESS","code":"x"}"#)
        .send()
        .await
        .unwrap();
    let garbage = client
        .post(&endpoint)
        .header("Origin", origin.as_str())
        .body("garbage")
        .send()
        .await
        .unwrap();

    assert_eq!(no_origin.status(), reqwest::StatusCode::NO_CONTENT);
    assert_eq!(garbage.status(), reqwest::StatusCode::NO_CONTENT);
    assert!(seen.lock().is_empty());

    channel.shutdown().await;
}

#[tokio::test]
async fn test_bound_port_is_persisted() {
    let repo = Arc::new(MockAppSettingsRepository::new());
    let ports = CallbackPortService::new(AppSettingsService::new(repo.clone())).with_default_port(0);
    let channel = MessageChannel::new(Some(ports), None);

    let (port, _) = started(&channel).await;
    assert_ne!(port, 0);
    assert_eq!(
        repo.get("oauth.callback_port").await.unwrap(),
        Some(port.to_string())
    );
    assert_eq!(
        channel.redirect_uri().unwrap(),
        branding::oauth_callback_uri_with_port(port)
    );

    // Starting again keeps the same listener
    assert_eq!(channel.ensure_started().await.unwrap(), port);
    channel.shutdown().await;
}
