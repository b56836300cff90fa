//! Dependency Injection Container
//!
//! Collects the storage and host collaborators a [`crate::Connector`] is
//! built from. Tests swap any of them for in-memory doubles.

use std::sync::Arc;

use memberhub_core::{AppSettingsRepository, CredentialEntryRepository, SessionStore};

use crate::backend::PlatformBackend;
use crate::channel::MessageChannel;
use crate::oauth::{generate_verifier, VerifierGenerator};
use crate::popup::WindowHost;

#[derive(Clone)]
pub struct ConnectorDependencies {
    // Storage
    pub credential_repo: Arc<dyn CredentialEntryRepository>,
    pub session_store: Arc<dyn SessionStore>,
    /// App settings repository (callback port, last connection time)
    pub settings_repo: Option<Arc<dyn AppSettingsRepository>>,

    // Collaborators
    pub backend: Arc<dyn PlatformBackend>,
    pub window_host: Arc<dyn WindowHost>,

    /// Pre-built channel; built from config when absent
    pub channel: Option<Arc<MessageChannel>>,
    pub verifier_generator: VerifierGenerator,
}

pub struct DependenciesBuilder {
    credential_repo: Option<Arc<dyn CredentialEntryRepository>>,
    session_store: Option<Arc<dyn SessionStore>>,
    settings_repo: Option<Arc<dyn AppSettingsRepository>>,
    backend: Option<Arc<dyn PlatformBackend>>,
    window_host: Option<Arc<dyn WindowHost>>,
    channel: Option<Arc<MessageChannel>>,
    verifier_generator: VerifierGenerator,
}

impl DependenciesBuilder {
    pub fn new() -> Self {
        Self {
            credential_repo: None,
            session_store: None,
            settings_repo: None,
            backend: None,
            window_host: None,
            channel: None,
            verifier_generator: generate_verifier,
        }
    }

    pub fn with_credential_repo(mut self, repo: Arc<dyn CredentialEntryRepository>) -> Self {
        self.credential_repo = Some(repo);
        self
    }

    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    pub fn with_settings_repo(mut self, repo: Arc<dyn AppSettingsRepository>) -> Self {
        self.settings_repo = Some(repo);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn PlatformBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_window_host(mut self, host: Arc<dyn WindowHost>) -> Self {
        self.window_host = Some(host);
        self
    }

    pub fn with_channel(mut self, channel: Arc<MessageChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_verifier_generator(mut self, generator: VerifierGenerator) -> Self {
        self.verifier_generator = generator;
        self
    }

    pub fn build(self) -> Result<ConnectorDependencies, String> {
        Ok(ConnectorDependencies {
            credential_repo: self.credential_repo.ok_or("credential_repo is required")?,
            session_store: self.session_store.ok_or("session_store is required")?,
            settings_repo: self.settings_repo,
            backend: self.backend.ok_or("backend is required")?,
            window_host: self.window_host.ok_or("window_host is required")?,
            channel: self.channel,
            verifier_generator: self.verifier_generator,
        })
    }
}

impl Default for DependenciesBuilder {
    fn default() -> Self {
        Self::new()
    }
}
