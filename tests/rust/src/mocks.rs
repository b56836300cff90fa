//! Mock collaborators for testing
//!
//! In-memory stand-ins for the backend, the window host and the repositories.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use memberhub_connector::{
    AuthorizeRequest, BackendError, CallbackRequest, CallbackResponse, ExternalWindow,
    PlatformBackend, ProbeError, WindowFeatures, WindowHost,
};
use memberhub_core::{
    AppSettingsRepository, CredentialEntryRepository, EntryWrite, PlatformData, RepoResult,
};

pub const AUTH_URL: &str = "https://auth.example/authorize?client_id=memberhub&response_type=code";

// ============================================================================
// MockBackend
// ============================================================================

/// One recorded token exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCallback {
    pub code: String,
    pub verifier: String,
    pub redirect_uri: String,
}

pub struct MockBackend {
    authorize_result: Mutex<Result<String, BackendError>>,
    callback_result: Mutex<Result<CallbackResponse, BackendError>>,
    data_result: Mutex<Result<PlatformData, BackendError>>,
    authorize_requests: Mutex<Vec<AuthorizeRequest>>,
    callbacks: Mutex<Vec<RecordedCallback>>,
    data_tokens: Mutex<Vec<String>>,
    data_gate: Mutex<Option<Arc<Notify>>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            authorize_result: Mutex::new(Ok(AUTH_URL.to_string())),
            callback_result: Mutex::new(Ok(crate::fixtures::callback_response("tok1"))),
            data_result: Mutex::new(Ok(crate::fixtures::platform_data())),
            authorize_requests: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
            data_tokens: Mutex::new(Vec::new()),
            data_gate: Mutex::new(None),
        }
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_authorize(&self, result: Result<String, BackendError>) {
        *self.authorize_result.lock() = result;
    }

    pub fn set_callback(&self, result: Result<CallbackResponse, BackendError>) {
        *self.callback_result.lock() = result;
    }

    pub fn set_data(&self, result: Result<PlatformData, BackendError>) {
        *self.data_result.lock() = result;
    }

    /// Hold every `fetch_data` call until the returned gate is notified,
    /// once per held call.
    pub fn gate_data(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.data_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn authorize_requests(&self) -> Vec<AuthorizeRequest> {
        self.authorize_requests.lock().clone()
    }

    pub fn challenges(&self) -> Vec<String> {
        self.authorize_requests
            .lock()
            .iter()
            .map(|r| r.code_challenge.clone())
            .collect()
    }

    pub fn callbacks(&self) -> Vec<RecordedCallback> {
        self.callbacks.lock().clone()
    }

    pub fn data_tokens(&self) -> Vec<String> {
        self.data_tokens.lock().clone()
    }
}

#[async_trait]
impl PlatformBackend for MockBackend {
    async fn authorize(&self, request: &AuthorizeRequest) -> Result<String, BackendError> {
        self.authorize_requests.lock().push(request.clone());
        self.authorize_result.lock().clone()
    }

    async fn callback(&self, request: &CallbackRequest<'_>) -> Result<CallbackResponse, BackendError> {
        self.callbacks.lock().push(RecordedCallback {
            code: request.code.to_string(),
            verifier: request.verifier.expose().to_string(),
            redirect_uri: request.redirect_uri.to_string(),
        });
        self.callback_result.lock().clone()
    }

    async fn fetch_data(&self, access_token: &str) -> Result<PlatformData, BackendError> {
        self.data_tokens.lock().push(access_token.to_string());
        let gate = self.data_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.data_result.lock().clone()
    }
}

// ============================================================================
// MockWindowHost
// ============================================================================

#[derive(Default)]
pub struct MockWindow {
    pub url: String,
    closed: AtomicBool,
    probe_fails: AtomicBool,
    close_calls: AtomicUsize,
}

impl MockWindow {
    /// Simulate the user closing the window.
    pub fn user_close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Make liveness probes fail, like an uninspectable window.
    pub fn fail_probes(&self) {
        self.probe_fails.store(true, Ordering::SeqCst);
    }

    pub fn is_closed_now(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

/// Handle given to the coordinator; shares state with the test's [`MockWindow`].
struct MockWindowRef(Arc<MockWindow>);

impl ExternalWindow for MockWindowRef {
    fn is_closed(&self) -> Result<bool, ProbeError> {
        if self.0.probe_fails.load(Ordering::SeqCst) {
            return Err(ProbeError("cross-origin".into()));
        }
        Ok(self.0.closed.load(Ordering::SeqCst))
    }

    fn close(&self) {
        self.0.close_calls.fetch_add(1, Ordering::SeqCst);
        self.0.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockWindowHost {
    blocked: AtomicBool,
    fail_probes: AtomicBool,
    windows: Mutex<Vec<Arc<MockWindow>>>,
    features: Mutex<Vec<WindowFeatures>>,
}

impl MockWindowHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&self) {
        self.blocked.store(true, Ordering::SeqCst);
    }

    /// Windows opened from now on refuse liveness probes.
    pub fn fail_probes(&self) {
        self.fail_probes.store(true, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.windows.lock().len()
    }

    pub fn window(&self, index: usize) -> Arc<MockWindow> {
        self.windows.lock()[index].clone()
    }

    pub fn last_features(&self) -> Option<WindowFeatures> {
        self.features.lock().last().copied()
    }
}

impl WindowHost for MockWindowHost {
    fn open(&self, url: &str, features: &WindowFeatures) -> Option<Box<dyn ExternalWindow>> {
        if self.blocked.load(Ordering::SeqCst) {
            return None;
        }
        let window = Arc::new(MockWindow {
            url: url.to_string(),
            ..Default::default()
        });
        if self.fail_probes.load(Ordering::SeqCst) {
            window.fail_probes();
        }
        self.windows.lock().push(window.clone());
        self.features.lock().push(*features);
        Some(Box::new(MockWindowRef(window)))
    }
}

// ============================================================================
// InMemoryCredentialRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryCredentialRepo {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    write_delay: Mutex<Option<Duration>>,
}

impl InMemoryCredentialRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a raw value, bypassing the credential store.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write take `delay` before it lands.
    pub fn delay_writes(&self, delay: Duration) {
        *self.write_delay.lock() = Some(delay);
    }
}

#[async_trait]
impl CredentialEntryRepository for InMemoryCredentialRepo {
    async fn get(&self, key: &str) -> RepoResult<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("database is locked");
        }
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn apply(&self, writes: &[EntryWrite]) -> RepoResult<()> {
        let delay = *self.write_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        let mut entries = self.entries.lock();
        for write in writes {
            match write {
                EntryWrite::Put { key, value } => {
                    entries.insert(key.clone(), value.clone());
                }
                EntryWrite::Delete { key } => {
                    entries.remove(key);
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// MockAppSettingsRepository
// ============================================================================

#[derive(Default)]
pub struct MockAppSettingsRepository {
    settings: Mutex<HashMap<String, String>>,
}

impl MockAppSettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppSettingsRepository for MockAppSettingsRepository {
    async fn get(&self, key: &str) -> RepoResult<Option<String>> {
        Ok(self.settings.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> RepoResult<()> {
        self.settings
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> RepoResult<()> {
        self.settings.lock().remove(key);
        Ok(())
    }

    async fn list_by_prefix(&self, prefix: &str) -> RepoResult<Vec<(String, String)>> {
        Ok(self
            .settings
            .lock()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
