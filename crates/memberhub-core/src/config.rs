//! Connector configuration
//!
//! Defaults are compiled in; every field can be overridden with a
//! `MEMBERHUB_*` environment variable (a `.env` file is honored).

use std::path::PathBuf;
use std::time::Duration;

use crate::branding;

/// Errors raised while reading configuration overrides
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Base URL of the hosted backend functions
    pub functions_url: String,
    /// Public API key sent to the backend, if it requires one
    pub api_key: Option<String>,
    /// Function handling `authorize` and `callback`
    pub auth_function: String,
    /// Function proxying authenticated platform reads
    pub data_function: String,
    /// Force a specific loopback port instead of persisted/default/dynamic
    pub callback_port: Option<u16>,
    /// Upper bound on how long an attempt may hold the verifier
    pub popup_timeout: Duration,
    /// How often the popup's liveness is probed
    pub poll_interval: Duration,
    pub popup_width: u32,
    pub popup_height: u32,
    pub screen_width: u32,
    pub screen_height: u32,
    /// Chromium-family browser used for tracked app windows
    pub browser_command: Option<String>,
    /// How long a new attempt waits for the previous one to release its resources
    pub release_timeout: Duration,
    /// Timeout for backend HTTP requests
    pub request_timeout: Duration,
    /// SQLite database location; platform data dir when unset
    pub database_path: Option<PathBuf>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            functions_url: "http://127.0.0.1:54321/functions/v1".to_string(),
            api_key: None,
            auth_function: "soundcloud-auth".to_string(),
            data_function: "soundcloud-data".to_string(),
            callback_port: None,
            popup_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
            popup_width: 600,
            popup_height: 700,
            screen_width: 1920,
            screen_height: 1080,
            browser_command: None,
            release_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            database_path: None,
        }
    }
}

impl ConnectorConfig {
    /// Defaults overridden by the process environment (after loading `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("[Config] Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("MEMBERHUB_FUNCTIONS_URL") {
            url::Url::parse(&v).map_err(|e| ConfigError::Invalid {
                var: "MEMBERHUB_FUNCTIONS_URL",
                value: v.clone(),
                reason: e.to_string(),
            })?;
            config.functions_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("MEMBERHUB_API_KEY") {
            config.api_key = Some(v);
        }
        if let Some(v) = get("MEMBERHUB_AUTH_FUNCTION") {
            config.auth_function = v;
        }
        if let Some(v) = get("MEMBERHUB_DATA_FUNCTION") {
            config.data_function = v;
        }
        if let Some(v) = get("MEMBERHUB_CALLBACK_PORT") {
            config.callback_port = Some(parse_var("MEMBERHUB_CALLBACK_PORT", &v)?);
        }
        if let Some(v) = get("MEMBERHUB_POPUP_TIMEOUT_SECS") {
            config.popup_timeout =
                Duration::from_secs(parse_var("MEMBERHUB_POPUP_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("MEMBERHUB_POLL_INTERVAL_MS") {
            let ms: u64 = parse_var("MEMBERHUB_POLL_INTERVAL_MS", &v)?;
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    var: "MEMBERHUB_POLL_INTERVAL_MS",
                    value: v,
                    reason: "must be greater than zero".to_string(),
                });
            }
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(v) = get("MEMBERHUB_SCREEN_SIZE") {
            let (w, h) = parse_size("MEMBERHUB_SCREEN_SIZE", &v)?;
            config.screen_width = w;
            config.screen_height = h;
        }
        if let Some(v) = get("MEMBERHUB_POPUP_SIZE") {
            let (w, h) = parse_size("MEMBERHUB_POPUP_SIZE", &v)?;
            config.popup_width = w;
            config.popup_height = h;
        }
        if let Some(v) = get("MEMBERHUB_BROWSER") {
            config.browser_command = Some(v);
        }
        if let Some(v) = get("MEMBERHUB_DATABASE") {
            config.database_path = Some(PathBuf::from(v));
        }

        Ok(config)
    }

    pub fn auth_endpoint(&self) -> String {
        format!("{}/{}", self.functions_url, self.auth_function)
    }

    pub fn data_endpoint(&self) -> String {
        format!("{}/{}", self.functions_url, self.data_function)
    }

    /// Where the SQLite database lives
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| data_dir().join(format!("{}.db", branding::LOG_PREFIX)))
    }
}

/// Platform data directory for this app
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(branding::IDENTIFIER)
}

fn parse_var<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_size(var: &'static str, value: &str) -> Result<(u32, u32), ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| invalid("expected WIDTHxHEIGHT"))?;
    let w: u32 = w.trim().parse().map_err(|_| invalid("bad width"))?;
    let h: u32 = h.trim().parse().map_err(|_| invalid("bad height"))?;
    if w == 0 || h == 0 {
        return Err(invalid("dimensions must be non-zero"));
    }
    Ok((w, h))
}
