//! Connector events
//!
//! Emitted by the flow controller and rehydrator for UI consumers. Event
//! payloads never carry tokens, codes or verifiers.

use serde::{Deserialize, Serialize};

use super::{FailureKind, FlowState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectorEvent {
    StateChanged {
        from: FlowState,
        to: FlowState,
    },
    Connected {
        user_id: String,
        username: String,
    },
    /// Exactly one per failed attempt
    ConnectFailed {
        kind: FailureKind,
        message: String,
    },
    Disconnected,
    DataLoaded {
        tracks: usize,
        playlists: usize,
    },
    DataLoadFailed {
        unauthorized: bool,
        message: String,
    },
    ReconnectRequired,
}

impl ConnectorEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            ConnectorEvent::StateChanged { .. } => "state_changed",
            ConnectorEvent::Connected { .. } => "connected",
            ConnectorEvent::ConnectFailed { .. } => "connect_failed",
            ConnectorEvent::Disconnected => "disconnected",
            ConnectorEvent::DataLoaded { .. } => "data_loaded",
            ConnectorEvent::DataLoadFailed { .. } => "data_load_failed",
            ConnectorEvent::ReconnectRequired => "reconnect_required",
        }
    }
}
