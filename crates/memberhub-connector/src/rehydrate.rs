//! Session Rehydrator
//!
//! Restores a stored session at startup without running the handshake.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use memberhub_core::{ConnectedUserProfile, ConnectorEvent, FlowState, PlatformData};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::credentials::CredentialStore;
use crate::loader::{DataLoadError, DataLoader};
use crate::state::SharedState;

/// Result of a rehydration pass.
#[derive(Debug, Default)]
pub struct Rehydration {
    /// The restored profile, if a session was found
    pub user: Option<ConnectedUserProfile>,
    /// Background data refresh started for the restored session
    pub refresh: Option<JoinHandle<Result<PlatformData, DataLoadError>>>,
}

impl Rehydration {
    pub fn is_connected(&self) -> bool {
        self.user.is_some()
    }
}

pub struct SessionRehydrator {
    credentials: Arc<CredentialStore>,
    loader: Arc<DataLoader>,
    state: Arc<SharedState>,
    done: AtomicBool,
}

impl SessionRehydrator {
    pub fn new(
        credentials: Arc<CredentialStore>,
        loader: Arc<DataLoader>,
        state: Arc<SharedState>,
    ) -> Self {
        Self {
            credentials,
            loader,
            state,
            done: AtomicBool::new(false),
        }
    }

    /// Restore the stored session, once per process.
    ///
    /// Connected state is set straight from the stored profile. The data
    /// refresh runs in the background; if it fails the session stays
    /// connected with stale data.
    pub async fn run(&self) -> Rehydration {
        if self.done.swap(true, Ordering::SeqCst) {
            debug!("[OAuth] Rehydration already ran");
            return Rehydration::default();
        }
        if self.state.state() != FlowState::Idle {
            debug!("[OAuth] Skipping rehydration, flow is {}", self.state.state());
            return Rehydration::default();
        }

        let Some(session) = self.credentials.load().await else {
            info!("[OAuth] No stored session");
            return Rehydration::default();
        };

        let user = session.user.clone();
        self.state.set_session(session);
        if !self.state.transition(FlowState::Connected) {
            // An attempt started while we were reading storage; it wins
            self.state.clear_session();
            return Rehydration::default();
        }
        self.state.events().emit(ConnectorEvent::Connected {
            user_id: user.id.clone(),
            username: user.username.clone(),
        });
        info!(user_id = %user.id, "[OAuth] Restored session for {}", user.label());

        let loader = self.loader.clone();
        let state = self.state.clone();
        let refresh = tokio::spawn(async move { state.refresh_from(&loader).await });

        Rehydration {
            user: Some(user),
            refresh: Some(refresh),
        }
    }
}
