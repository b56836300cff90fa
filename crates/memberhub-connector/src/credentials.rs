//! Credential Store
//!
//! The only component that touches credential storage. Durable entries (the
//! session) go through a [`CredentialEntryRepository`]; the transient PKCE
//! verifier lives in a [`SessionStore`] and is never written to disk.

use std::sync::Arc;

use anyhow::Context;
use memberhub_core::{
    AuthSession, ConnectedUserProfile, CredentialEntryRepository, EntryWrite, RepoResult,
    SessionStore, UnreadableEntry,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::oauth::CodeVerifier;

/// Storage keys. The three durable keys are always written and cleared together.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const USER_PROFILE: &str = "user_profile";

    /// Session-scoped
    pub const PKCE_VERIFIER: &str = "pkce_verifier";
    /// Session-scoped: id of the attempt the stored verifier belongs to
    pub const PKCE_VERIFIER_OWNER: &str = "pkce_verifier_owner";

    pub const DURABLE: [&str; 3] = [ACCESS_TOKEN, REFRESH_TOKEN, USER_PROFILE];
}

pub struct CredentialStore {
    durable: Arc<dyn CredentialEntryRepository>,
    session: Arc<dyn SessionStore>,
    /// Serializes owner checks against the verifier slot
    verifier_lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(durable: Arc<dyn CredentialEntryRepository>, session: Arc<dyn SessionStore>) -> Self {
        Self {
            durable,
            session,
            verifier_lock: Mutex::new(()),
        }
    }

    /// Persist a session, replacing any previous one in a single batch.
    pub async fn save(&self, session: &AuthSession) -> RepoResult<()> {
        if session.access_token.is_empty() {
            anyhow::bail!("refusing to store a session without an access token");
        }
        if !session.user.is_valid() {
            anyhow::bail!("refusing to store a session without a valid profile");
        }

        let profile =
            serde_json::to_string(&session.user).context("Failed to serialize user profile")?;

        let refresh = match &session.refresh_token {
            Some(token) => EntryWrite::put(keys::REFRESH_TOKEN, token.as_str()),
            None => EntryWrite::delete(keys::REFRESH_TOKEN),
        };

        self.durable
            .apply(&[
                EntryWrite::put(keys::ACCESS_TOKEN, session.access_token.as_str()),
                refresh,
                EntryWrite::put(keys::USER_PROFILE, profile),
            ])
            .await?;

        info!(
            user_id = %session.user.id,
            has_refresh_token = session.refresh_token.is_some(),
            "[Credentials] Session saved"
        );
        Ok(())
    }

    /// Restore the stored session.
    ///
    /// Returns `None` when nothing is stored. A partial, undecryptable or
    /// malformed record is cleared and also yields `None`. A failed read
    /// leaves the record in place.
    pub async fn load(&self) -> Option<AuthSession> {
        let session = match self.read_record().await {
            Ok(record) => record.map(StoredRecord::into_session).transpose(),
            Err(e) if e.is::<UnreadableEntry>() => Err(e),
            Err(e) => {
                warn!("[Credentials] Could not read stored session: {:#}", e);
                return None;
            }
        };

        match session {
            Ok(session) => session,
            Err(e) => {
                warn!("[Credentials] Discarding unusable stored session: {:#}", e);
                if let Err(clear_err) = self.clear().await {
                    warn!(
                        "[Credentials] Failed to clear unusable session: {}",
                        clear_err
                    );
                }
                None
            }
        }
    }

    /// Raw durable entries; `None` when no key is present at all.
    async fn read_record(&self) -> RepoResult<Option<StoredRecord>> {
        let record = StoredRecord {
            access_token: self.durable.get(keys::ACCESS_TOKEN).await?,
            refresh_token: self.durable.get(keys::REFRESH_TOKEN).await?,
            profile: self.durable.get(keys::USER_PROFILE).await?,
        };
        if record.access_token.is_none()
            && record.refresh_token.is_none()
            && record.profile.is_none()
        {
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Remove the whole session atomically.
    pub async fn clear(&self) -> RepoResult<()> {
        let writes: Vec<_> = keys::DURABLE.iter().map(|k| EntryWrite::delete(*k)).collect();
        self.durable.apply(&writes).await?;
        info!("[Credentials] Session cleared");
        Ok(())
    }

    /// Store `verifier` for `attempt`, replacing whatever was stored.
    pub fn save_verifier(&self, attempt: u64, verifier: &CodeVerifier) {
        let _guard = self.verifier_lock.lock();
        self.session
            .set(keys::PKCE_VERIFIER, verifier.expose().to_string());
        self.session
            .set(keys::PKCE_VERIFIER_OWNER, attempt.to_string());
        debug!(attempt, "[Credentials] PKCE verifier stored");
    }

    /// Read and remove the verifier stored for `attempt`; a second call
    /// returns `None`, as does a call from any other attempt.
    pub fn take_verifier(&self, attempt: u64) -> Option<CodeVerifier> {
        let _guard = self.verifier_lock.lock();
        if !self.owned_by(attempt) {
            return None;
        }
        self.session.remove(keys::PKCE_VERIFIER_OWNER);
        self.session
            .take(keys::PKCE_VERIFIER)
            .map(CodeVerifier::from_stored)
    }

    /// Move the stored verifier from one attempt to another.
    pub fn hand_over_verifier(&self, from: u64, to: u64) -> bool {
        let _guard = self.verifier_lock.lock();
        if !self.owned_by(from) {
            return false;
        }
        self.session
            .set(keys::PKCE_VERIFIER_OWNER, to.to_string());
        debug!(from, to, "[Credentials] PKCE verifier handed over");
        true
    }

    /// Clear the verifier only if `attempt` still owns it.
    pub fn release_verifier(&self, attempt: u64) {
        let _guard = self.verifier_lock.lock();
        if self.owned_by(attempt) {
            self.session.remove(keys::PKCE_VERIFIER);
            self.session.remove(keys::PKCE_VERIFIER_OWNER);
        }
    }

    /// Clear the verifier whoever owns it.
    pub fn clear_verifier(&self) {
        let _guard = self.verifier_lock.lock();
        self.session.remove(keys::PKCE_VERIFIER);
        self.session.remove(keys::PKCE_VERIFIER_OWNER);
    }

    pub fn has_verifier(&self) -> bool {
        self.session.get(keys::PKCE_VERIFIER).is_some()
    }

    fn owned_by(&self, attempt: u64) -> bool {
        self.session.get(keys::PKCE_VERIFIER_OWNER).as_deref() == Some(attempt.to_string().as_str())
    }
}

/// Durable entries as read, before validation.
struct StoredRecord {
    access_token: Option<String>,
    refresh_token: Option<String>,
    profile: Option<String>,
}

impl StoredRecord {
    fn into_session(self) -> anyhow::Result<AuthSession> {
        let (access_token, profile) = match (self.access_token, self.profile) {
            (Some(token), Some(profile)) => (token, profile),
            _ => anyhow::bail!("partial session record"),
        };

        if access_token.is_empty() {
            anyhow::bail!("empty access token");
        }

        let user: ConnectedUserProfile =
            serde_json::from_str(&profile).context("stored profile is not valid JSON")?;
        if !user.is_valid() {
            anyhow::bail!("stored profile is missing its id or username");
        }

        Ok(AuthSession::new(access_token, self.refresh_token, user))
    }
}
