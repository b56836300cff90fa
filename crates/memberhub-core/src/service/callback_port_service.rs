//! Callback Port Service
//!
//! Picks the port for the loopback OAuth listener and remembers it, so the
//! redirect URI registered with the platform stays the same across runs.
//!
//! Strategy: persisted port, then the branded default, then an OS-assigned
//! port.

use std::net::TcpListener;
use tracing::{info, warn};

use super::app_settings_service::{keys, AppSettingsService};
use crate::branding::DEFAULT_OAUTH_CALLBACK_PORT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortResolution {
    /// Use a specific port (explicit, persisted or default)
    Fixed(u16),
    /// Let the OS assign a port
    Dynamic,
}

impl PortResolution {
    pub fn port(&self) -> Option<u16> {
        match self {
            PortResolution::Fixed(port) => Some(*port),
            PortResolution::Dynamic => None,
        }
    }

    /// Port to pass to `bind`, 0 meaning "any"
    pub fn bind_port(&self) -> u16 {
        self.port().unwrap_or(0)
    }
}

/// Check if a loopback port is free right now.
pub fn is_port_available(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}

pub struct CallbackPortService {
    settings: AppSettingsService,
    default_port: u16,
}

impl CallbackPortService {
    pub fn new(settings: AppSettingsService) -> Self {
        Self {
            settings,
            default_port: DEFAULT_OAUTH_CALLBACK_PORT,
        }
    }

    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    pub async fn load_persisted_port(&self) -> Option<u16> {
        self.settings
            .get_parsed::<u16>(keys::oauth::CALLBACK_PORT)
            .await
            .filter(|p| *p != 0)
    }

    /// Decide which port to try. `explicit` wins and is not probed.
    pub async fn resolve(&self, explicit: Option<u16>) -> PortResolution {
        if let Some(port) = explicit {
            return PortResolution::Fixed(port);
        }

        if let Some(persisted) = self.load_persisted_port().await {
            if is_port_available(persisted) {
                info!("[PortService] Using persisted callback port {}", persisted);
                return PortResolution::Fixed(persisted);
            }
            info!("[PortService] Persisted callback port {} unavailable", persisted);
        }

        if self.default_port != 0 && is_port_available(self.default_port) {
            info!("[PortService] Using default callback port {}", self.default_port);
            return PortResolution::Fixed(self.default_port);
        }

        info!("[PortService] Will use dynamic callback port");
        PortResolution::Dynamic
    }

    /// Remember the port that was actually bound.
    ///
    /// Failure to persist is logged; the listener still works for this run.
    pub async fn remember(&self, port: u16) {
        if self.load_persisted_port().await == Some(port) {
            return;
        }
        if let Err(e) = self.settings.set_value(keys::oauth::CALLBACK_PORT, port).await {
            warn!("[PortService] Failed to persist callback port {}: {}", port, e);
        }
    }
}
