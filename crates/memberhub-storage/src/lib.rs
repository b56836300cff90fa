//! MemberHub Storage Layer
//!
//! Durable credential storage in SQLite with field-level encryption, plus the
//! process-scoped session store.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │   CredentialEntryRepository / AppSettingsRepository  │
//! ├──────────────────────────────────────────────────────┤
//! │              SQLite implementations                  │
//! ├──────────────────────────────────────────────────────┤
//! │         FieldEncryptor (AES-256-GCM)                 │
//! ├──────────────────────────────────────────────────────┤
//! │   KeychainKeyProvider (OS keychain master key)       │
//! ├──────────────────────────────────────────────────────┤
//! │                   Database                           │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ```rust,ignore
//! let master_key = KeychainKeyProvider::new()?.get_or_create_key()?;
//! let db = Arc::new(Mutex::new(Database::open(&path)?));
//! let encryptor = Arc::new(FieldEncryptor::new(&master_key)?);
//! let credentials = SqliteCredentialEntryRepository::new(db.clone(), encryptor);
//! let settings = SqliteAppSettingsRepository::new(db);
//! ```

pub mod crypto;
mod database;
pub mod keychain;
mod repositories;
mod session_store;

pub use crypto::{generate_master_key, FieldEncryptor, KEY_SIZE};
pub use database::Database;
pub use keychain::{KeychainKeyProvider, MasterKeyProvider, MemoryKeyProvider};
pub use repositories::*;
pub use session_store::MemorySessionStore;
