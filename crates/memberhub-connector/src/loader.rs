//! Data Loader

use std::sync::Arc;

use memberhub_core::PlatformData;
use tracing::{info, warn};

use crate::backend::{BackendError, PlatformBackend};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataLoadError {
    /// The access token was rejected; reconnecting is the way out.
    #[error("the platform rejected the stored access token")]
    Unauthorized,
    #[error("no connected account")]
    NotConnected,
    /// The session was replaced or cleared while the load was running; its
    /// result was discarded.
    #[error("the session changed while platform data was loading")]
    SessionChanged,
    /// Network or backend trouble; retrying later may work.
    #[error("platform data unavailable: {0}")]
    Unavailable(String),
}

impl DataLoadError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, DataLoadError::Unauthorized)
    }
}

pub struct DataLoader {
    backend: Arc<dyn PlatformBackend>,
}

impl DataLoader {
    pub fn new(backend: Arc<dyn PlatformBackend>) -> Self {
        Self { backend }
    }

    pub async fn load(&self, access_token: &str) -> Result<PlatformData, DataLoadError> {
        if access_token.is_empty() {
            return Err(DataLoadError::NotConnected);
        }

        match self.backend.fetch_data(access_token).await {
            Ok(data) => {
                info!(
                    tracks = data.tracks.len(),
                    playlists = data.playlists.len(),
                    "[Data] Platform data loaded"
                );
                Ok(data)
            }
            Err(BackendError::Unauthorized(reason)) => {
                warn!("[Data] Access token rejected: {}", reason);
                Err(DataLoadError::Unauthorized)
            }
            Err(e) => {
                warn!("[Data] Load failed: {}", e);
                Err(DataLoadError::Unavailable(e.to_string()))
            }
        }
    }
}
