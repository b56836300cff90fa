//! Repository traits for data access
//!
//! These traits define the interface for data storage without specifying
//! the implementation (SQLite, in-memory, etc.)

use async_trait::async_trait;

/// Result type for repository operations
pub type RepoResult<T> = anyhow::Result<T>;

/// One write in an atomic credential batch.
#[derive(Clone, PartialEq, Eq)]
pub enum EntryWrite {
    Put { key: String, value: String },
    Delete { key: String },
}

impl EntryWrite {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        EntryWrite::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        EntryWrite::Delete { key: key.into() }
    }

    pub fn key(&self) -> &str {
        match self {
            EntryWrite::Put { key, .. } | EntryWrite::Delete { key } => key,
        }
    }
}

impl std::fmt::Debug for EntryWrite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Values are secrets
        match self {
            EntryWrite::Put { key, value } => f
                .debug_struct("Put")
                .field("key", key)
                .field("value_len", &value.len())
                .finish(),
            EntryWrite::Delete { key } => f.debug_struct("Delete").field("key", key).finish(),
        }
    }
}

/// A stored entry exists but cannot be turned back into its value (wrong
/// key or damaged ciphertext). Distinct from a failed read.
#[derive(Debug, thiserror::Error)]
#[error("credential entry '{key}' is unreadable: {reason}")]
pub struct UnreadableEntry {
    pub key: String,
    pub reason: String,
}

/// Durable key/value storage for connected-account credentials.
///
/// Implementations must apply a batch all-or-nothing: readers never observe
/// half of a batch. An entry that exists but cannot be decoded is reported
/// as [`UnreadableEntry`].
#[async_trait]
pub trait CredentialEntryRepository: Send + Sync {
    /// Get an entry value by key
    async fn get(&self, key: &str) -> RepoResult<Option<String>>;

    /// Apply a batch of puts and deletes atomically
    async fn apply(&self, writes: &[EntryWrite]) -> RepoResult<()>;
}

/// App settings repository trait
#[async_trait]
pub trait AppSettingsRepository: Send + Sync {
    /// Get a setting value by key
    async fn get(&self, key: &str) -> RepoResult<Option<String>>;

    /// Set a setting value (insert or update)
    async fn set(&self, key: &str, value: &str) -> RepoResult<()>;

    /// Delete a setting by key
    async fn delete(&self, key: &str) -> RepoResult<()>;

    /// Get all settings with a given prefix (e.g., "oauth." returns all OAuth settings)
    async fn list_by_prefix(&self, prefix: &str) -> RepoResult<Vec<(String, String)>>;
}

/// Session-scoped storage: lives as long as the process and is never
/// written to disk.
///
/// Synchronous so it can be cleared from `Drop` implementations.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String);

    /// Read and remove in one step
    fn take(&self, key: &str) -> Option<String>;

    fn remove(&self, key: &str);
}
