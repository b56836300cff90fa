//! Authorization attempt lifecycle types

use serde::{Deserialize, Serialize};

/// Result of one connection attempt, produced once and consumed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FlowOutcome {
    Success { code: String },
    Error { reason: String },
    Cancelled,
    Timeout,
}

impl FlowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FlowOutcome::Success { .. })
    }
}

/// Controller state machine.
///
/// ```text
/// Idle -> RequestingUrl -> AwaitingPopup -> ExchangingCode -> Connected
///            \                 \                  \
///             +-----------------+------------------+--> Failed
/// Connected -> Disconnected -> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Idle,
    RequestingUrl,
    AwaitingPopup,
    ExchangingCode,
    Connected,
    Failed,
    Disconnected,
}

impl FlowState {
    /// States during which an attempt owns the verifier slot.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            FlowState::RequestingUrl | FlowState::AwaitingPopup | FlowState::ExchangingCode
        )
    }

    /// Whether `self -> next` is an edge of the state machine.
    ///
    /// Idle is reachable from every state: it is where cancellation and
    /// failure recovery land. A new attempt may start from Connected only
    /// when the session needs reconnecting; that policy is checked by the
    /// controller, the edge itself is always legal.
    pub fn can_transition_to(self, next: FlowState) -> bool {
        use FlowState::*;
        match (self, next) {
            (_, Idle) => true,
            (Idle | Failed | Connected, RequestingUrl) => true,
            (RequestingUrl, AwaitingPopup) => true,
            // Same-tab redirect entry skips the popup
            (RequestingUrl | AwaitingPopup, ExchangingCode) => true,
            (ExchangingCode, Connected) => true,
            // Rehydration restores a stored session without a handshake
            (Idle, Connected) => true,
            (RequestingUrl | AwaitingPopup | ExchangingCode, Failed) => true,
            (Connected, Disconnected) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FlowState::Idle => "idle",
            FlowState::RequestingUrl => "requesting_url",
            FlowState::AwaitingPopup => "awaiting_popup",
            FlowState::ExchangingCode => "exchanging_code",
            FlowState::Connected => "connected",
            FlowState::Failed => "failed",
            FlowState::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Category of a failed attempt, used by UI text and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PopupBlocked,
    UserCancelled,
    Timeout,
    AuthorizationDenied,
    Protocol,
    Integrity,
    Backend,
    Internal,
}

/// What the UI shows: a coarse projection of the controller state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionStatus {
    NotConnected,
    Connecting,
    Connected { username: String, stale: bool },
    ReconnectRequired { username: String },
    Failed { message: String },
    TimedOut,
}

impl ConnectionStatus {
    pub fn status_text(&self) -> String {
        match self {
            ConnectionStatus::NotConnected => "Not connected".to_string(),
            ConnectionStatus::Connecting => "Connecting...".to_string(),
            ConnectionStatus::Connected { username, stale } => {
                if *stale {
                    format!("Connected as {} (data may be out of date)", username)
                } else {
                    format!("Connected as {}", username)
                }
            }
            ConnectionStatus::ReconnectRequired { username } => {
                format!("Session for {} expired, reconnect required", username)
            }
            ConnectionStatus::Failed { message } => format!("Connection failed: {}", message),
            ConnectionStatus::TimedOut => "Connection timed out".to_string(),
        }
    }

    /// Whether the Connect action should be enabled.
    pub fn can_connect(&self) -> bool {
        !matches!(
            self,
            ConnectionStatus::Connecting | ConnectionStatus::Connected { .. }
        )
    }
}
