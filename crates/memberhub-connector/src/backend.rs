//! Backend collaborator
//!
//! The hosted functions that talk to the content platform on our behalf:
//! build the authorization URL, exchange a code for tokens, and proxy data
//! reads. [`HttpPlatformBackend`] speaks their JSON-over-POST protocol.

use std::time::Duration;

use async_trait::async_trait;
use memberhub_core::{ConnectorConfig, PlatformData};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::oauth::CodeVerifier;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The token (or the caller) was rejected by the platform
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The backend answered with an error message
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Transport(String),
    /// A successful response with missing or malformed fields
    #[error("{0}")]
    Protocol(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    pub code_challenge: String,
    pub code_challenge_method: &'static str,
    pub redirect_uri: String,
}

pub struct CallbackRequest<'a> {
    pub code: &'a str,
    pub verifier: &'a CodeVerifier,
    pub redirect_uri: &'a str,
}

/// Raw token-exchange result. Fields are optional here; the flow controller
/// decides whether the response is complete.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<Value>,
}

#[async_trait]
pub trait PlatformBackend: Send + Sync {
    /// Returns the authorization URL for the given challenge.
    async fn authorize(&self, request: &AuthorizeRequest) -> Result<String, BackendError>;

    async fn callback(&self, request: &CallbackRequest<'_>) -> Result<CallbackResponse, BackendError>;

    async fn fetch_data(&self, access_token: &str) -> Result<PlatformData, BackendError>;
}

pub struct HttpPlatformBackend {
    client: reqwest::Client,
    auth_endpoint: String,
    data_endpoint: String,
    api_key: Option<String>,
}

impl HttpPlatformBackend {
    pub fn new(config: &ConnectorConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            auth_endpoint: config.auth_endpoint(),
            data_endpoint: config.data_endpoint(),
            api_key: config.api_key.clone(),
        })
    }

    async fn post(&self, endpoint: &str, body: Value) -> Result<Value, BackendError> {
        let mut request = self.client.post(endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key).header("apikey", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.without_url().to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.without_url().to_string()))?;
        let json: Option<Value> = serde_json::from_str(&text).ok();
        let message = json.as_ref().and_then(error_message);

        debug!(endpoint, status = status.as_u16(), "[Backend] Response received");

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BackendError::Unauthorized(
                message.unwrap_or_else(|| status.to_string()),
            ));
        }
        if !status.is_success() {
            warn!(endpoint, status = status.as_u16(), "[Backend] Request failed");
            return Err(BackendError::Rejected(
                message.unwrap_or_else(|| format!("backend returned {}", status)),
            ));
        }

        let json = json.ok_or_else(|| BackendError::Protocol("response is not JSON".into()))?;
        if embedded_status(&json) == Some(401) {
            return Err(BackendError::Unauthorized(
                message.unwrap_or_else(|| "token rejected".into()),
            ));
        }
        Ok(json)
    }
}

fn error_message(json: &Value) -> Option<String> {
    match json.get("error")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn embedded_status(json: &Value) -> Option<u64> {
    json.get("status").and_then(Value::as_u64)
}

#[async_trait]
impl PlatformBackend for HttpPlatformBackend {
    async fn authorize(&self, request: &AuthorizeRequest) -> Result<String, BackendError> {
        let mut body = serde_json::to_value(request)
            .map_err(|e| BackendError::Protocol(e.to_string()))?;
        body["action"] = json!("authorize");

        let json = self.post(&self.auth_endpoint, body).await?;
        match json.get("authUrl").and_then(Value::as_str) {
            Some(url) if !url.is_empty() => Ok(url.to_string()),
            _ => match error_message(&json) {
                Some(message) => Err(BackendError::Rejected(message)),
                None => Err(BackendError::Protocol("authorize response has no authUrl".into())),
            },
        }
    }

    async fn callback(&self, request: &CallbackRequest<'_>) -> Result<CallbackResponse, BackendError> {
        let body = json!({
            "action": "callback",
            "code": request.code,
            "codeVerifier": request.verifier.expose(),
            "redirectUri": request.redirect_uri,
        });

        let json = self.post(&self.auth_endpoint, body).await?;
        if json.get("accessToken").is_none() {
            if let Some(message) = error_message(&json) {
                return Err(BackendError::Rejected(message));
            }
        }
        serde_json::from_value(json).map_err(|e| BackendError::Protocol(e.to_string()))
    }

    async fn fetch_data(&self, access_token: &str) -> Result<PlatformData, BackendError> {
        let json = self
            .post(&self.data_endpoint, json!({ "accessToken": access_token }))
            .await?;
        if json.get("tracks").is_none() && json.get("playlists").is_none() {
            if let Some(message) = error_message(&json) {
                return Err(BackendError::Rejected(message));
            }
        }
        serde_json::from_value(json).map_err(|e| BackendError::Protocol(e.to_string()))
    }
}
