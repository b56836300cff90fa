//! App Settings Service
//!
//! Typed access to application settings on top of [`AppSettingsRepository`].

use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use crate::{AppSettingsRepository, RepoResult};

/// Setting key constants.
pub mod keys {
    /// OAuth settings namespace
    pub mod oauth {
        /// Port the loopback listener last bound (u16)
        pub const CALLBACK_PORT: &str = "oauth.callback_port";
        /// Unix timestamp of the last successful connection
        pub const LAST_CONNECTED_AT: &str = "oauth.last_connected_at";
    }
}

#[derive(Clone)]
pub struct AppSettingsService {
    repository: Arc<dyn AppSettingsRepository>,
}

impl AppSettingsService {
    pub fn new(repository: Arc<dyn AppSettingsRepository>) -> Self {
        Self { repository }
    }

    /// Read and parse a setting.
    ///
    /// Unparseable values and read failures are logged and treated as unset.
    pub async fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        match self.repository.get(key).await {
            Ok(Some(value)) => match value.parse() {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    warn!(key, "[Settings] Ignoring unparseable setting value");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, "[Settings] Failed to read setting: {}", e);
                None
            }
        }
    }

    pub async fn set_value(&self, key: &str, value: impl ToString) -> RepoResult<()> {
        self.repository.set(key, &value.to_string()).await
    }

    pub async fn remove(&self, key: &str) -> RepoResult<()> {
        self.repository.delete(key).await
    }

    /// All OAuth settings, for diagnostics
    pub async fn oauth_settings(&self) -> RepoResult<Vec<(String, String)>> {
        self.repository.list_by_prefix("oauth.").await
    }

    pub async fn last_connected_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let ts: i64 = self.get_parsed(keys::oauth::LAST_CONNECTED_AT).await?;
        chrono::DateTime::from_timestamp(ts, 0)
    }

    pub async fn record_connected_now(&self) -> RepoResult<()> {
        self.set_value(keys::oauth::LAST_CONNECTED_AT, chrono::Utc::now().timestamp())
            .await
    }
}
