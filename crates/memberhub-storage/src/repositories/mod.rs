//! Repository implementations using SQLite.

mod app_settings_repository;
mod credential_entry_repository;

pub use app_settings_repository::SqliteAppSettingsRepository;
pub use credential_entry_repository::SqliteCredentialEntryRepository;
