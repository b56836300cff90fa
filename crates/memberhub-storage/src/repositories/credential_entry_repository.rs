//! SQLite implementation of CredentialEntryRepository.
//!
//! Values are encrypted with [`FieldEncryptor`] using the entry key as
//! associated data. A batch is applied inside one transaction.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use memberhub_core::{CredentialEntryRepository, EntryWrite, UnreadableEntry};
use rusqlite::params;
use tokio::sync::Mutex;
use tracing::debug;

use crate::crypto::FieldEncryptor;
use crate::Database;

pub struct SqliteCredentialEntryRepository {
    db: Arc<Mutex<Database>>,
    encryptor: Arc<FieldEncryptor>,
}

impl SqliteCredentialEntryRepository {
    pub fn new(db: Arc<Mutex<Database>>, encryptor: Arc<FieldEncryptor>) -> Self {
        Self { db, encryptor }
    }
}

#[async_trait]
impl CredentialEntryRepository for SqliteCredentialEntryRepository {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock().await;

        let result = db.connection().query_row(
            "SELECT value FROM credential_entries WHERE key = ?",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(ciphertext) => {
                let plaintext = self.encryptor.decrypt(key, &ciphertext).map_err(|e| {
                    UnreadableEntry {
                        key: key.to_string(),
                        reason: format!("{:#}", e),
                    }
                })?;
                Ok(Some(plaintext))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn apply(&self, writes: &[EntryWrite]) -> Result<()> {
        // Encrypt before taking the lock so a failure leaves the table untouched
        let mut prepared = Vec::with_capacity(writes.len());
        for write in writes {
            let ciphertext = match write {
                EntryWrite::Put { key, value } => Some(self.encryptor.encrypt(key, value)?),
                EntryWrite::Delete { .. } => None,
            };
            prepared.push((write.key(), ciphertext));
        }

        let db = self.db.lock().await;
        db.transaction(|conn| {
            for (key, ciphertext) in &prepared {
                match ciphertext {
                    Some(value) => {
                        conn.execute(
                            "INSERT INTO credential_entries (key, value, updated_at)
                             VALUES (?, ?, datetime('now'))
                             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                            params![key, value],
                        )?;
                    }
                    None => {
                        conn.execute(
                            "DELETE FROM credential_entries WHERE key = ?",
                            params![key],
                        )?;
                    }
                }
            }
            Ok(())
        })?;

        debug!(writes = writes.len(), "[Storage] Applied credential batch");
        Ok(())
    }
}
