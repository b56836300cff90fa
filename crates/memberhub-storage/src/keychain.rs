//! OS Keychain integration for master key storage.
//!
//! Uses the platform-native secure storage:
//! - Windows: Credential Manager
//! - macOS: Keychain
//! - Linux: Secret Service (GNOME Keyring, KWallet)

use anyhow::{Context, Result};
use keyring::Entry;
use memberhub_core::branding;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::{generate_master_key, KEY_SIZE};

const MASTER_KEY_NAME: &str = "credential-encryption-key";

/// Source of the master key used for credential field encryption.
pub trait MasterKeyProvider: Send + Sync {
    /// Get the master key, creating one if it doesn't exist.
    fn get_or_create_key(&self) -> Result<Zeroizing<[u8; KEY_SIZE]>>;

    fn key_exists(&self) -> bool;

    fn delete_key(&self) -> Result<()>;
}

pub struct KeychainKeyProvider {
    entry: Entry,
}

impl KeychainKeyProvider {
    pub fn new() -> Result<Self> {
        Self::with_names(branding::KEYCHAIN_SERVICE, MASTER_KEY_NAME)
    }

    pub fn with_names(service: &str, key_name: &str) -> Result<Self> {
        let entry = Entry::new(service, key_name).context("Failed to create keychain entry")?;
        Ok(Self { entry })
    }
}

impl MasterKeyProvider for KeychainKeyProvider {
    fn get_or_create_key(&self) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
        match self.entry.get_password() {
            Ok(hex_key) => {
                let hex_key = Zeroizing::new(hex_key);
                debug!("[Keychain] Retrieved existing master key");
                let key_bytes = Zeroizing::new(
                    hex::decode(hex_key.as_str()).context("Invalid key format in keychain")?,
                );

                if key_bytes.len() != KEY_SIZE {
                    anyhow::bail!(
                        "Invalid key size in keychain: expected {}, got {}",
                        KEY_SIZE,
                        key_bytes.len()
                    );
                }

                let mut key = Zeroizing::new([0u8; KEY_SIZE]);
                key.copy_from_slice(&key_bytes);
                Ok(key)
            }
            Err(keyring::Error::NoEntry) => {
                info!("[Keychain] No master key found, generating new key");
                let key = Zeroizing::new(generate_master_key()?);
                let hex_key = Zeroizing::new(hex::encode(&key[..]));

                self.entry
                    .set_password(&hex_key)
                    .context("Failed to store master key in keychain")?;

                info!("[Keychain] Master key generated and stored");
                Ok(key)
            }
            Err(e) => {
                warn!("[Keychain] Error accessing master key: {:?}", e);
                Err(anyhow::anyhow!("Failed to access keychain: {}", e))
            }
        }
    }

    fn key_exists(&self) -> bool {
        self.entry.get_password().is_ok()
    }

    fn delete_key(&self) -> Result<()> {
        match self.entry.delete_credential() {
            Ok(()) => {
                info!("[Keychain] Master key deleted");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::anyhow!("Failed to delete key from keychain: {}", e)),
        }
    }
}

/// Process-local key provider for tests and headless runs without a keychain.
///
/// Data encrypted with it is unreadable after the process exits.
#[derive(Default)]
pub struct MemoryKeyProvider {
    key: parking_lot::Mutex<Option<[u8; KEY_SIZE]>>,
}

impl MemoryKeyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: [u8; KEY_SIZE]) -> Self {
        Self {
            key: parking_lot::Mutex::new(Some(key)),
        }
    }
}

impl MasterKeyProvider for MemoryKeyProvider {
    fn get_or_create_key(&self) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
        let mut guard = self.key.lock();
        let key = match *guard {
            Some(key) => key,
            None => *guard.insert(generate_master_key()?),
        };
        Ok(Zeroizing::new(key))
    }

    fn key_exists(&self) -> bool {
        self.key.lock().is_some()
    }

    fn delete_key(&self) -> Result<()> {
        *self.key.lock() = None;
        Ok(())
    }
}
