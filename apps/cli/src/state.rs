//! Application state: storage, collaborators and the wired connector.

use std::sync::Arc;

use anyhow::Context;
use memberhub_connector::{BrowserWindowHost, Connector, DependenciesBuilder, HttpPlatformBackend};
use memberhub_core::{config, AppSettingsRepository, AppSettingsService, ConnectorConfig};
use memberhub_storage::{
    Database, FieldEncryptor, KeychainKeyProvider, MasterKeyProvider, MemorySessionStore,
    SqliteAppSettingsRepository, SqliteCredentialEntryRepository,
};
use tokio::sync::Mutex;
use tracing::info;

pub struct AppState {
    pub connector: Connector,
    pub settings: AppSettingsService,
}

impl AppState {
    pub async fn new(config: &ConnectorConfig) -> anyhow::Result<Self> {
        let db_path = config.resolved_database_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        info!("Retrieving master key...");
        let master_key = KeychainKeyProvider::new()?.get_or_create_key()?;
        let encryptor = Arc::new(FieldEncryptor::new(&master_key)?);

        info!("Opening database at {:?}", db_path);
        let db = Arc::new(Mutex::new(Database::open(&db_path)?));

        let settings_repo: Arc<dyn AppSettingsRepository> =
            Arc::new(SqliteAppSettingsRepository::new(db.clone()));

        let backend = HttpPlatformBackend::new(config)
            .map_err(|e| anyhow::anyhow!("Failed to create backend client: {}", e))?;
        let window_host = BrowserWindowHost::new(config.browser_command.clone())
            .with_profile_dir(config::data_dir().join("browser-profile"));

        let deps = DependenciesBuilder::new()
            .with_credential_repo(Arc::new(SqliteCredentialEntryRepository::new(db, encryptor)))
            .with_session_store(Arc::new(MemorySessionStore::new()))
            .with_settings_repo(settings_repo.clone())
            .with_backend(Arc::new(backend))
            .with_window_host(Arc::new(window_host))
            .build()
            .map_err(anyhow::Error::msg)?;

        Ok(Self {
            connector: Connector::new(config, deps),
            settings: AppSettingsService::new(settings_repo),
        })
    }
}
