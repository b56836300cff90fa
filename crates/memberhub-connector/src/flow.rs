//! Authorization Flow Controller
//!
//! Drives one connection attempt at a time through
//! `Idle -> RequestingUrl -> AwaitingPopup -> ExchangingCode -> Connected`.
//!
//! The controller owns a single attempt slot. Starting a new attempt cancels
//! the one in the slot and waits, up to a bound, until it has released its
//! resources. The stored verifier is tagged with its attempt, and only the
//! attempt holding the slot may settle shared state, so a predecessor that
//! releases late cannot touch its successor's verifier or state.
//!
//! Each running attempt holds its resources in an [`AttemptScope`]. Dropping
//! the scope releases them in a fixed order on every exit path: stop polling,
//! unsubscribe from the channel, close the popup, clear the verifier.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use memberhub_core::{
    branding, AppSettingsService, AuthSession, ConnectedUserProfile, ConnectionStatus,
    ConnectorConfig, ConnectorEvent, FailureKind, FlowOutcome, FlowState, PlatformData,
};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::backend::{AuthorizeRequest, CallbackRequest, CallbackResponse, PlatformBackend};
use crate::channel::{parse_redirect_url, MessageChannel, Subscription};
use crate::credentials::CredentialStore;
use crate::error::ConnectError;
use crate::loader::{DataLoadError, DataLoader};
use crate::oauth::{generate_verifier, PkceChallenge, VerifierGenerator};
use crate::popup::{PopupCompletion, PopupCoordinator, PopupError, PopupHandle};
use crate::state::{ConnectorSnapshot, SharedState};

#[derive(Debug, Clone, Copy)]
pub struct FlowOptions {
    /// Upper bound on how long an attempt may wait for the popup
    pub popup_timeout: Duration,
    /// How long a new attempt waits for its predecessor to release resources
    pub release_timeout: Duration,
}

impl From<&ConnectorConfig> for FlowOptions {
    fn from(config: &ConnectorConfig) -> Self {
        Self {
            popup_timeout: config.popup_timeout,
            release_timeout: config.release_timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptKind {
    Popup,
    /// Same-tab redirect: the verifier stays parked between
    /// `begin_redirect` and `complete_from_redirect`.
    Redirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    Popup,
    RedirectBegin,
    RedirectComplete,
}

struct AttemptSlot {
    id: u64,
    kind: AttemptKind,
    cancel: CancellationToken,
    released: CancellationToken,
}

struct Attempt {
    id: u64,
    cancel: CancellationToken,
    released: CancellationToken,
}

struct AttemptScope {
    id: u64,
    poll_cancel: CancellationToken,
    subscription: Option<Subscription>,
    popup: Option<Arc<PopupHandle>>,
    keep_verifier: bool,
    popups: Arc<PopupCoordinator>,
    credentials: Arc<CredentialStore>,
    released: CancellationToken,
}

impl AttemptScope {
    fn new(attempt: &Attempt, popups: Arc<PopupCoordinator>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            id: attempt.id,
            poll_cancel: attempt.cancel.child_token(),
            subscription: None,
            popup: None,
            keep_verifier: false,
            popups,
            credentials,
            released: attempt.released.clone(),
        }
    }

    fn unsubscribe(&mut self) {
        self.subscription.take();
    }

    fn close_popup(&mut self) {
        if let Some(popup) = self.popup.take() {
            self.popups.close(&popup);
        }
    }
}

impl Drop for AttemptScope {
    fn drop(&mut self) {
        self.poll_cancel.cancel();
        self.unsubscribe();
        self.close_popup();
        if !self.keep_verifier {
            self.credentials.release_verifier(self.id);
        }
        debug!(attempt = self.id, "[OAuth] Attempt resources released");
        self.released.cancel();
    }
}

/// Race `fut` against cancellation of the attempt.
async fn cancellable<F: std::future::Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, ConnectError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ConnectError::Superseded),
        out = fut => Ok(out),
    }
}

pub struct AuthorizationFlowController {
    backend: Arc<dyn PlatformBackend>,
    credentials: Arc<CredentialStore>,
    popups: Arc<PopupCoordinator>,
    channel: Arc<MessageChannel>,
    loader: Arc<DataLoader>,
    state: Arc<SharedState>,
    options: FlowOptions,
    settings: Option<Arc<AppSettingsService>>,
    generate_verifier: VerifierGenerator,
    current: Mutex<Option<AttemptSlot>>,
    next_attempt: AtomicU64,
}

impl AuthorizationFlowController {
    pub fn new(
        backend: Arc<dyn PlatformBackend>,
        credentials: Arc<CredentialStore>,
        popups: Arc<PopupCoordinator>,
        channel: Arc<MessageChannel>,
        loader: Arc<DataLoader>,
        state: Arc<SharedState>,
        options: FlowOptions,
    ) -> Self {
        Self {
            backend,
            credentials,
            popups,
            channel,
            loader,
            state,
            options,
            settings: None,
            generate_verifier,
            current: Mutex::new(None),
            next_attempt: AtomicU64::new(1),
        }
    }

    /// Record connection times in app settings.
    pub fn with_settings(mut self, settings: Arc<AppSettingsService>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_verifier_generator(mut self, generator: VerifierGenerator) -> Self {
        self.generate_verifier = generator;
        self
    }

    pub fn state(&self) -> FlowState {
        self.state.state()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.status()
    }

    pub fn snapshot(&self) -> ConnectorSnapshot {
        self.state.snapshot()
    }

    /// Whether the Connect action should be offered.
    pub fn can_connect(&self) -> bool {
        self.state.status().can_connect()
    }

    /// Run a popup-based connection attempt to completion.
    ///
    /// Cancels whatever attempt is in flight first. From `Connected` this is
    /// only allowed when the session needs reconnecting.
    pub async fn connect(&self) -> Result<ConnectedUserProfile, ConnectError> {
        self.check_can_start()?;
        let attempt = self.claim(Claim::Popup).await?;
        info!(attempt = attempt.id, "[OAuth] Starting connection attempt");

        let mut scope = AttemptScope::new(&attempt, self.popups.clone(), self.credentials.clone());
        let result = self.run_popup_attempt(&attempt, &mut scope).await;
        let result = self.settle(&attempt, result).await;
        drop(scope);

        let session = result?;
        self.after_connected().await;
        Ok(session.user)
    }

    /// Same-tab fallback, first half: store a verifier and return the
    /// authorization URL for the host to navigate to.
    ///
    /// Rejected while a popup attempt is in flight.
    pub async fn begin_redirect(&self) -> Result<String, ConnectError> {
        self.check_can_start()?;
        let attempt = self.claim(Claim::RedirectBegin).await?;
        info!(attempt = attempt.id, "[OAuth] Starting redirect attempt");

        let mut scope = AttemptScope::new(&attempt, self.popups.clone(), self.credentials.clone());
        match self.run_redirect_begin(&attempt).await {
            Ok(url) => {
                // Parked until complete_from_redirect or a newer attempt
                scope.keep_verifier = true;
                Ok(url)
            }
            Err(err) => Err(self.fail(&attempt, err).await),
        }
    }

    /// Same-tab fallback, second half: exchange the code carried by the URL
    /// the authorization server redirected to.
    ///
    /// Rejected while a popup attempt is in flight, and from a healthy
    /// connection unless a redirect attempt is parked.
    pub async fn complete_from_redirect(
        &self,
        redirect_url: &str,
    ) -> Result<ConnectedUserProfile, ConnectError> {
        let parked = self
            .current
            .lock()
            .await
            .as_ref()
            .is_some_and(|slot| slot.kind == AttemptKind::Redirect);
        if !parked {
            self.check_can_start()?;
        }

        let attempt = self.claim(Claim::RedirectComplete).await?;
        let scope = AttemptScope::new(&attempt, self.popups.clone(), self.credentials.clone());
        let result = self.run_redirect_complete(&attempt, redirect_url).await;
        let result = self.settle(&attempt, result).await;
        drop(scope);

        let session = result?;
        self.after_connected().await;
        Ok(session.user)
    }

    /// Abandon the in-flight attempt, if any. Returns whether one was running.
    pub async fn cancel(&self) -> bool {
        let previous = self.current.lock().await.take();
        match previous {
            Some(previous) => {
                self.retire(previous, false).await;
                if self.state.state().is_in_flight() {
                    self.state.transition(FlowState::Idle);
                }
                true
            }
            None => false,
        }
    }

    /// Drop the connection: cancel any attempt, clear stored and in-memory
    /// credentials and content, return to `Idle`.
    pub async fn disconnect(&self) -> Result<(), ConnectError> {
        self.cancel().await;

        self.state.clear_session();
        if self.state.state() == FlowState::Connected {
            self.state.transition(FlowState::Disconnected);
        }
        self.state.transition(FlowState::Idle);

        self.credentials.clear_verifier();
        let cleared = self.credentials.clear().await;
        self.state.events().emit(ConnectorEvent::Disconnected);

        cleared.map_err(|e| {
            error!("[OAuth] Failed to clear stored session: {}", e);
            ConnectError::Storage(e.to_string())
        })?;
        info!("[OAuth] Disconnected");
        Ok(())
    }

    /// Reload tracks and playlists with the current token.
    pub async fn refresh_data(&self) -> Result<PlatformData, DataLoadError> {
        self.state.refresh_from(&self.loader).await
    }

    fn check_can_start(&self) -> Result<(), ConnectError> {
        if self.state.state() == FlowState::Connected && !self.state.reconnect_required() {
            return Err(ConnectError::AlreadyConnected);
        }
        Ok(())
    }

    /// Take the attempt slot, retiring whatever holds it.
    ///
    /// A redirect completion inherits the verifier of the parked attempt it
    /// retires.
    async fn claim(&self, claim: Claim) -> Result<Attempt, ConnectError> {
        let mut inherited = None;
        loop {
            let previous = {
                let mut slot = self.current.lock().await;
                if let Some(existing) = slot.as_ref() {
                    if existing.kind == AttemptKind::Popup && claim != Claim::Popup {
                        return Err(ConnectError::AttemptInFlight);
                    }
                }
                match slot.take() {
                    Some(previous) => previous,
                    None => {
                        let attempt = Attempt {
                            id: self.next_attempt.fetch_add(1, Ordering::SeqCst),
                            cancel: CancellationToken::new(),
                            released: CancellationToken::new(),
                        };
                        *slot = Some(AttemptSlot {
                            id: attempt.id,
                            kind: match claim {
                                Claim::Popup => AttemptKind::Popup,
                                Claim::RedirectBegin | Claim::RedirectComplete => {
                                    AttemptKind::Redirect
                                }
                            },
                            cancel: attempt.cancel.clone(),
                            released: attempt.released.clone(),
                        });
                        if let Some(from) = inherited {
                            self.credentials.hand_over_verifier(from, attempt.id);
                        }
                        return Ok(attempt);
                    }
                }
            };

            let inherit = claim == Claim::RedirectComplete;
            let previous_id = previous.id;
            self.retire(previous, inherit).await;
            if inherit {
                inherited = Some(previous_id);
            } else if self.state.state().is_in_flight() {
                self.state.transition(FlowState::Idle);
            }
        }
    }

    /// Cancel an attempt removed from the slot and wait for its release.
    async fn retire(&self, previous: AttemptSlot, inherit_verifier: bool) {
        info!(attempt = previous.id, "[OAuth] Cancelling in-flight attempt");
        previous.cancel.cancel();

        let released = tokio::time::timeout(
            self.options.release_timeout,
            previous.released.cancelled(),
        )
        .await;
        if released.is_err() {
            warn!(
                attempt = previous.id,
                "[OAuth] Previous attempt did not release within {:?}",
                self.options.release_timeout
            );
        }

        if !inherit_verifier {
            self.credentials.release_verifier(previous.id);
        }
    }

    /// Apply an attempt's result to shared state and free the slot, but only
    /// while the attempt still holds the slot. `None` means it was retired.
    async fn finish<T>(&self, attempt: &Attempt, apply: impl FnOnce() -> T) -> Option<T> {
        let mut slot = self.current.lock().await;
        if !slot.as_ref().is_some_and(|s| s.id == attempt.id) {
            return None;
        }
        let out = apply();
        slot.take();
        Some(out)
    }

    async fn run_popup_attempt(
        &self,
        attempt: &Attempt,
        scope: &mut AttemptScope,
    ) -> Result<AuthSession, ConnectError> {
        let (pkce, redirect_uri) = self.prepare(attempt).await?;
        let auth_url = self.request_auth_url(attempt, &pkce, &redirect_uri).await?;

        let Some(popup) = self.popups.open(&auth_url) else {
            return Err(ConnectError::PopupBlocked);
        };
        scope.popup = Some(popup.clone());

        let (tx, mut rx) = mpsc::unbounded_channel();
        scope.subscription = Some(self.channel.on_flow_message(move |outcome| {
            let _ = tx.send(outcome);
        }));
        self.state.transition(FlowState::AwaitingPopup);

        let outcome = self
            .await_outcome(attempt, &popup, &scope.poll_cancel, &mut rx)
            .await?;
        // Settled: later messages for this attempt go nowhere
        scope.unsubscribe();

        let session = self.handle_outcome(attempt, outcome, &redirect_uri).await?;
        scope.close_popup();
        Ok(session)
    }

    /// The first of {message, window closed, timeout} decides the attempt.
    async fn await_outcome(
        &self,
        attempt: &Attempt,
        popup: &PopupHandle,
        poll_cancel: &CancellationToken,
        rx: &mut mpsc::UnboundedReceiver<FlowOutcome>,
    ) -> Result<FlowOutcome, ConnectError> {
        let wait = self
            .popups
            .await_completion(popup, self.options.popup_timeout, poll_cancel);
        tokio::pin!(wait);

        tokio::select! {
            biased;
            _ = attempt.cancel.cancelled() => Err(ConnectError::Superseded),
            Some(outcome) = rx.recv() => Ok(outcome),
            completion = &mut wait => match completion {
                // A message may have landed in the same tick as the close
                Ok(PopupCompletion::Closed) => Ok(rx.try_recv().unwrap_or(FlowOutcome::Cancelled)),
                Ok(PopupCompletion::TimedOut) => Ok(rx.try_recv().unwrap_or(FlowOutcome::Timeout)),
                Err(PopupError::Cancelled) => Err(ConnectError::Superseded),
                Err(e) => Err(ConnectError::Internal(e.to_string())),
            },
        }
    }

    async fn handle_outcome(
        &self,
        attempt: &Attempt,
        outcome: FlowOutcome,
        redirect_uri: &str,
    ) -> Result<AuthSession, ConnectError> {
        match outcome {
            FlowOutcome::Success { code } => self.exchange(attempt, &code, redirect_uri).await,
            FlowOutcome::Error { reason } => {
                self.state.transition(FlowState::ExchangingCode);
                Err(ConnectError::AuthorizationDenied(reason))
            }
            FlowOutcome::Cancelled => Err(ConnectError::UserCancelled),
            FlowOutcome::Timeout => Err(ConnectError::Timeout(self.options.popup_timeout.as_secs())),
        }
    }

    /// `-> RequestingUrl`, fresh PKCE pair, listener up, verifier stored.
    async fn prepare(&self, attempt: &Attempt) -> Result<(PkceChallenge, String), ConnectError> {
        self.state.transition(FlowState::RequestingUrl);

        let pkce = PkceChallenge::generate_with(self.generate_verifier)?;

        cancellable(&attempt.cancel, self.channel.ensure_started())
            .await?
            .map_err(|e| ConnectError::Channel(e.to_string()))?;
        let redirect_uri = self
            .channel
            .redirect_uri()
            .ok_or_else(|| ConnectError::Channel("listener has no origin".into()))?;

        self.credentials.save_verifier(attempt.id, &pkce.verifier);
        Ok((pkce, redirect_uri))
    }

    async fn request_auth_url(
        &self,
        attempt: &Attempt,
        pkce: &PkceChallenge,
        redirect_uri: &str,
    ) -> Result<String, ConnectError> {
        let request = AuthorizeRequest {
            code_challenge: pkce.challenge.clone(),
            code_challenge_method: pkce.method,
            redirect_uri: redirect_uri.to_string(),
        };
        let auth_url = cancellable(&attempt.cancel, self.backend.authorize(&request)).await??;

        match Url::parse(&auth_url) {
            Ok(url) if matches!(url.scheme(), "https" | "http") => Ok(auth_url),
            _ => Err(ConnectError::Protocol(
                "authorization URL is not an http(s) URL".into(),
            )),
        }
    }

    /// `-> ExchangingCode`: consume the verifier and trade the code for a session.
    async fn exchange(
        &self,
        attempt: &Attempt,
        code: &str,
        redirect_uri: &str,
    ) -> Result<AuthSession, ConnectError> {
        self.state.transition(FlowState::ExchangingCode);
        if attempt.cancel.is_cancelled() {
            return Err(ConnectError::Superseded);
        }

        let Some(verifier) = self.credentials.take_verifier(attempt.id) else {
            error!(
                attempt = attempt.id,
                integrity = true,
                "[OAuth] PKCE verifier missing at code exchange"
            );
            return Err(ConnectError::Integrity);
        };

        debug!(attempt = attempt.id, code_len = code.len(), "[OAuth] Exchanging authorization code");
        let request = CallbackRequest {
            code,
            verifier: &verifier,
            redirect_uri,
        };
        let response = cancellable(&attempt.cancel, self.backend.callback(&request)).await??;

        let session = session_from_response(response)?;
        self.credentials
            .save(&session)
            .await
            .map_err(|e| ConnectError::Storage(e.to_string()))?;
        Ok(session)
    }

    async fn run_redirect_begin(&self, attempt: &Attempt) -> Result<String, ConnectError> {
        let (pkce, redirect_uri) = self.prepare(attempt).await?;
        self.request_auth_url(attempt, &pkce, &redirect_uri).await
    }

    async fn run_redirect_complete(
        &self,
        attempt: &Attempt,
        redirect_url: &str,
    ) -> Result<AuthSession, ConnectError> {
        if self.state.state() != FlowState::RequestingUrl {
            self.state.transition(FlowState::RequestingUrl);
        }

        let outcome = parse_redirect_url(redirect_url).ok_or_else(|| {
            ConnectError::Protocol("redirect URL carries neither a code nor an error".into())
        })?;
        let redirect_uri = redirect_base(redirect_url)
            .or_else(|| self.channel.redirect_uri())
            .ok_or_else(|| ConnectError::Channel("no redirect URI known".into()))?;

        self.handle_outcome(attempt, outcome, &redirect_uri).await
    }

    /// Fold an attempt's result into shared state and free the slot.
    ///
    /// Runs before the attempt's scope is dropped, so a waiting successor
    /// only starts once the state reflects this attempt's end. A retired
    /// attempt leaves state to its successor; its session, if any, is
    /// discarded.
    async fn settle(
        &self,
        attempt: &Attempt,
        result: Result<AuthSession, ConnectError>,
    ) -> Result<AuthSession, ConnectError> {
        let session = match result {
            Ok(session) => session,
            Err(err) => return Err(self.fail(attempt, err).await),
        };

        let connected = self
            .finish(attempt, || {
                self.state.set_session(session.clone());
                self.state.transition(FlowState::Connected);
                self.state.events().emit(ConnectorEvent::Connected {
                    user_id: session.user.id.clone(),
                    username: session.user.username.clone(),
                });
            })
            .await;
        if connected.is_none() {
            info!(
                attempt = attempt.id,
                "[OAuth] Attempt was superseded after its exchange; result discarded"
            );
            return Err(ConnectError::Superseded);
        }

        info!(
            attempt = attempt.id,
            user_id = %session.user.id,
            "[OAuth] Connected to {}",
            branding::PLATFORM_NAME
        );
        Ok(session)
    }

    async fn fail(&self, attempt: &Attempt, err: ConnectError) -> ConnectError {
        let kind = err.failure_kind();
        match kind {
            None => info!(attempt = attempt.id, "[OAuth] Attempt ended: {}", err),
            Some(_) if err.is_benign() => {
                info!(attempt = attempt.id, "[OAuth] Attempt cancelled by user")
            }
            Some(FailureKind::Integrity) => {}
            Some(kind) => {
                warn!(attempt = attempt.id, kind = ?kind, "[OAuth] Attempt failed: {}", err)
            }
        }

        let recorded = self
            .finish(attempt, || match kind {
                None => {
                    if self.state.state().is_in_flight() {
                        self.state.transition(FlowState::Idle);
                    }
                }
                Some(kind) => {
                    self.state.transition(FlowState::Failed);
                    self.state.record_failure(kind, err.to_string());
                }
            })
            .await;
        if recorded.is_none() {
            debug!(attempt = attempt.id, "[OAuth] Retired attempt left state untouched");
        }
        err
    }

    async fn after_connected(&self) {
        if let Some(settings) = &self.settings {
            if let Err(e) = settings.record_connected_now().await {
                warn!("[OAuth] Failed to record connection time: {}", e);
            }
        }
        if let Err(e) = self.state.refresh_from(&self.loader).await {
            warn!("[OAuth] Connected, but the initial data load failed: {}", e);
        }
    }
}

/// Validate a token-exchange response into a session.
fn session_from_response(response: CallbackResponse) -> Result<AuthSession, ConnectError> {
    let access_token = response
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ConnectError::Protocol("token response has no accessToken".into()))?;
    let user = response
        .user
        .ok_or_else(|| ConnectError::Protocol("token response has no user".into()))?;
    let user: ConnectedUserProfile = serde_json::from_value(user)
        .map_err(|e| ConnectError::Protocol(format!("invalid user profile: {}", e)))?;
    if !user.is_valid() {
        return Err(ConnectError::Protocol(
            "user profile lacks an id or username".into(),
        ));
    }
    Ok(AuthSession::new(access_token, response.refresh_token, user))
}

/// The redirect URI a callback URL was sent to (query and fragment removed).
fn redirect_base(redirect_url: &str) -> Option<String> {
    if !branding::is_oauth_callback(redirect_url) {
        return None;
    }
    let mut url = Url::parse(redirect_url).ok()?;
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}
