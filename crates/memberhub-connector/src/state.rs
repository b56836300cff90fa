//! In-memory connector state shared by the controller and the rehydrator.

use memberhub_core::{
    AuthSession, ConnectedUserProfile, ConnectionStatus, ConnectorEvent, EventSender, FailureKind,
    FlowState, PlatformData,
};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::loader::{DataLoadError, DataLoader};

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorSnapshot {
    pub state: FlowState,
    pub user: Option<ConnectedUserProfile>,
    pub data: PlatformData,
    pub data_stale: bool,
    pub reconnect_required: bool,
    pub last_failure: Option<(FailureKind, String)>,
}

struct Inner {
    state: FlowState,
    session: Option<AuthSession>,
    /// Bumped whenever the session is installed or cleared
    generation: u64,
    data: PlatformData,
    data_stale: bool,
    reconnect_required: bool,
    last_failure: Option<(FailureKind, String)>,
}

pub struct SharedState {
    inner: RwLock<Inner>,
    events: EventSender,
}

impl SharedState {
    pub fn new(events: EventSender) -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: FlowState::Idle,
                session: None,
                generation: 0,
                data: PlatformData::default(),
                data_stale: false,
                reconnect_required: false,
                last_failure: None,
            }),
            events,
        }
    }

    pub fn state(&self) -> FlowState {
        self.inner.read().state
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    /// Move along a state machine edge. Illegal edges are refused and logged.
    pub fn transition(&self, to: FlowState) -> bool {
        let from = {
            let mut inner = self.inner.write();
            let from = inner.state;
            if from == to {
                return true;
            }
            if !from.can_transition_to(to) {
                warn!("[State] Refused transition {} -> {}", from, to);
                return false;
            }
            inner.state = to;
            if to.is_in_flight() {
                inner.last_failure = None;
            }
            from
        };
        debug!("[State] {} -> {}", from, to);
        self.events.emit(ConnectorEvent::StateChanged { from, to });
        true
    }

    pub fn snapshot(&self) -> ConnectorSnapshot {
        let inner = self.inner.read();
        ConnectorSnapshot {
            state: inner.state,
            user: inner.session.as_ref().map(|s| s.user.clone()),
            data: inner.data.clone(),
            data_stale: inner.data_stale,
            reconnect_required: inner.reconnect_required,
            last_failure: inner.last_failure.clone(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        let inner = self.inner.read();
        let username = || {
            inner
                .session
                .as_ref()
                .map(|s| s.user.label().to_string())
                .unwrap_or_default()
        };
        match inner.state {
            FlowState::Connected if inner.reconnect_required => ConnectionStatus::ReconnectRequired {
                username: username(),
            },
            FlowState::Connected => ConnectionStatus::Connected {
                username: username(),
                stale: inner.data_stale,
            },
            s if s.is_in_flight() => ConnectionStatus::Connecting,
            FlowState::Failed => match &inner.last_failure {
                Some((FailureKind::Timeout, _)) => ConnectionStatus::TimedOut,
                Some((_, message)) => ConnectionStatus::Failed {
                    message: message.clone(),
                },
                None => ConnectionStatus::Failed {
                    message: "unknown error".to_string(),
                },
            },
            _ => ConnectionStatus::NotConnected,
        }
    }

    pub fn reconnect_required(&self) -> bool {
        self.inner.read().reconnect_required
    }

    /// Install a session (new or restored) and clear the reconnect flag.
    pub fn set_session(&self, session: AuthSession) {
        let mut inner = self.inner.write();
        inner.session = Some(session);
        inner.generation += 1;
        inner.reconnect_required = false;
    }

    /// Forget the session, tokens and loaded content.
    pub fn clear_session(&self) {
        let mut inner = self.inner.write();
        inner.session = None;
        inner.generation += 1;
        inner.data = PlatformData::default();
        inner.data_stale = false;
        inner.reconnect_required = false;
    }

    pub fn record_failure(&self, kind: FailureKind, message: String) {
        self.inner.write().last_failure = Some((kind, message.clone()));
        self.events.emit(ConnectorEvent::ConnectFailed { kind, message });
    }

    /// Fetch content with the in-memory token and fold the result into state.
    ///
    /// Success replaces the content wholesale. Any failure leaves the
    /// last-known content in place; `Unauthorized` additionally raises the
    /// reconnect prompt. A result that arrives after the session was
    /// replaced or cleared is dropped without touching state.
    pub async fn refresh_from(&self, loader: &DataLoader) -> Result<PlatformData, DataLoadError> {
        let (token, generation) = {
            let inner = self.inner.read();
            let token = inner
                .session
                .as_ref()
                .map(|s| s.access_token.clone())
                .ok_or(DataLoadError::NotConnected)?;
            (token, inner.generation)
        };

        let result = loader.load(&token).await;

        let mut inner = self.inner.write();
        if inner.generation != generation {
            debug!("[State] Session changed during data load, discarding result");
            return Err(DataLoadError::SessionChanged);
        }

        match result {
            Ok(data) => {
                inner.data = data.clone();
                inner.data_stale = false;
                drop(inner);
                self.events.emit(ConnectorEvent::DataLoaded {
                    tracks: data.tracks.len(),
                    playlists: data.playlists.len(),
                });
                Ok(data)
            }
            Err(err) => {
                let unauthorized = err.is_unauthorized();
                inner.data_stale = true;
                if unauthorized {
                    inner.reconnect_required = true;
                }
                drop(inner);
                self.events.emit(ConnectorEvent::DataLoadFailed {
                    unauthorized,
                    message: err.to_string(),
                });
                if unauthorized {
                    self.events.emit(ConnectorEvent::ReconnectRequired);
                }
                Err(err)
            }
        }
    }
}
