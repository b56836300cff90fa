//! MemberHub Platform Connector
//!
//! OAuth 2.1 authorization code flow with PKCE against the content platform:
//! - PKCE verifier/challenge generation
//! - Credential storage (durable session, session-scoped verifier)
//! - Popup window lifecycle and loopback message channel
//! - Attempt orchestration, session rehydration and data loading

pub mod backend;
pub mod channel;
pub mod credentials;
pub mod dependencies;
pub mod error;
pub mod flow;
pub mod loader;
pub mod oauth;
pub mod popup;
pub mod rehydrate;
pub mod state;

use std::sync::Arc;

use memberhub_core::{
    AppSettingsService, CallbackPortService, ConnectorConfig, EventBus, EventReceiver,
};
use tracing::info;

pub use backend::{
    AuthorizeRequest, BackendError, CallbackRequest, CallbackResponse, HttpPlatformBackend,
    PlatformBackend,
};
pub use channel::{parse_redirect_url, ChannelError, FlowMessage, MessageChannel, Subscription};
pub use credentials::CredentialStore;
pub use dependencies::{ConnectorDependencies, DependenciesBuilder};
pub use error::ConnectError;
pub use flow::{AuthorizationFlowController, FlowOptions};
pub use loader::{DataLoadError, DataLoader};
pub use oauth::{CodeVerifier, PkceChallenge, PkceError};
pub use popup::{
    BrowserWindowHost, ExternalWindow, PopupCompletion, PopupCoordinator, PopupError,
    PopupHandle, PopupState, ProbeError, WindowFeatures, WindowHost,
};
pub use rehydrate::{Rehydration, SessionRehydrator};
pub use state::{ConnectorSnapshot, SharedState};

/// A fully wired connector: one controller, one rehydrator, one event bus.
pub struct Connector {
    events: EventBus,
    channel: Arc<MessageChannel>,
    credentials: Arc<CredentialStore>,
    controller: Arc<AuthorizationFlowController>,
    rehydrator: Arc<SessionRehydrator>,
}

impl Connector {
    pub fn new(config: &ConnectorConfig, deps: ConnectorDependencies) -> Self {
        let events = EventBus::new();
        let state = Arc::new(SharedState::new(events.sender()));
        let credentials = Arc::new(CredentialStore::new(deps.credential_repo, deps.session_store));
        let settings = deps.settings_repo.map(AppSettingsService::new);

        let popups = Arc::new(PopupCoordinator::new(
            deps.window_host,
            WindowFeatures::centered(
                config.popup_width,
                config.popup_height,
                config.screen_width,
                config.screen_height,
            ),
            config.poll_interval,
        ));

        let channel = deps.channel.unwrap_or_else(|| {
            let ports = settings.clone().map(CallbackPortService::new);
            Arc::new(MessageChannel::new(ports, config.callback_port))
        });

        let loader = Arc::new(DataLoader::new(deps.backend.clone()));

        let mut controller = AuthorizationFlowController::new(
            deps.backend,
            credentials.clone(),
            popups,
            channel.clone(),
            loader.clone(),
            state.clone(),
            FlowOptions::from(config),
        )
        .with_verifier_generator(deps.verifier_generator);
        if let Some(settings) = settings {
            controller = controller.with_settings(Arc::new(settings));
        }

        let rehydrator = Arc::new(SessionRehydrator::new(credentials.clone(), loader, state));

        info!("[OAuth] Connector ready ({})", memberhub_core::branding::PLATFORM_NAME);
        Self {
            events,
            channel,
            credentials,
            controller: Arc::new(controller),
            rehydrator,
        }
    }

    pub fn controller(&self) -> &Arc<AuthorizationFlowController> {
        &self.controller
    }

    pub fn rehydrator(&self) -> &Arc<SessionRehydrator> {
        &self.rehydrator
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn channel(&self) -> &Arc<MessageChannel> {
        &self.channel
    }

    /// Receive connector events from this point on.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Cancel any attempt and stop the loopback listener.
    pub async fn shutdown(&self) {
        self.controller.cancel().await;
        self.channel.shutdown().await;
    }
}
