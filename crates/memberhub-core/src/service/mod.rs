//! Domain services

pub mod app_settings_service;
pub mod callback_port_service;

pub use app_settings_service::{keys, AppSettingsService};
pub use callback_port_service::{is_port_available, CallbackPortService, PortResolution};
