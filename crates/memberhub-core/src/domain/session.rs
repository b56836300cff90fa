//! Connected session entities
//!
//! An [`AuthSession`] is the long-lived result of a successful authorization
//! attempt. It is written only by the credential store after a token exchange
//! and replaced wholesale on reconnect, never patched field by field.

use serde::{Deserialize, Deserializer, Serialize};

/// Snapshot of the connected platform account.
///
/// Immutable once captured; a refresh or reconnect replaces the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedUserProfile {
    /// Platform user ID (platforms send these as numbers or strings)
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub username: String,
    #[serde(default, alias = "full_name", alias = "display_name")]
    pub display_name: String,
    #[serde(default, alias = "avatar_url")]
    pub avatar_url: Option<String>,
    #[serde(default, alias = "followers_count", alias = "follower_count")]
    pub follower_count: u64,
    #[serde(default, alias = "followings_count", alias = "following_count")]
    pub following_count: u64,
    #[serde(default, alias = "track_count")]
    pub track_count: u64,
    #[serde(default, alias = "playlist_count")]
    pub playlist_count: u64,
}

impl ConnectedUserProfile {
    /// A profile is usable only if it identifies the account.
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty() && !self.username.trim().is_empty()
    }

    /// Name to show in the UI (display name, falling back to username)
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.username
        } else {
            &self.display_name
        }
    }
}

/// Delegated credentials for the content platform plus the owning profile.
///
/// The three fields are stored and cleared together; an access token without
/// its profile is never a valid session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: ConnectedUserProfile,
}

impl AuthSession {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        user: ConnectedUserProfile,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            user,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"[redacted]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("user", &self.user.username)
            .finish()
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}
