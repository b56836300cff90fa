//! Connector error types

use memberhub_core::FailureKind;

use crate::backend::BackendError;
use crate::oauth::PkceError;

/// Why a connection attempt did not produce a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("could not generate PKCE verifier: {0}")]
    Pkce(#[from] PkceError),

    #[error("the authorization window was blocked; allow pop-ups and try again")]
    PopupBlocked,

    #[error("authorization was cancelled or the window was closed")]
    UserCancelled,

    #[error("authorization timed out after {0} seconds")]
    Timeout(u64),

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("{0}")]
    Backend(String),

    #[error("unexpected backend response: {0}")]
    Protocol(String),

    #[error("PKCE verifier missing at code exchange")]
    Integrity,

    #[error("credential storage failed: {0}")]
    Storage(String),

    #[error("callback listener unavailable: {0}")]
    Channel(String),

    #[error("the connection attempt was cancelled before it finished")]
    Superseded,

    #[error("already connected; disconnect first")]
    AlreadyConnected,

    #[error("another connection attempt is in progress")]
    AttemptInFlight,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ConnectError {
    /// Failure category for a finished attempt.
    ///
    /// `None` for outcomes that are not attempt failures: a superseded
    /// attempt, or a request rejected before any attempt started.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        Some(match self {
            ConnectError::PopupBlocked => FailureKind::PopupBlocked,
            ConnectError::UserCancelled => FailureKind::UserCancelled,
            ConnectError::Timeout(_) => FailureKind::Timeout,
            ConnectError::AuthorizationDenied(_) => FailureKind::AuthorizationDenied,
            ConnectError::Protocol(_) => FailureKind::Protocol,
            ConnectError::Integrity => FailureKind::Integrity,
            ConnectError::Backend(_) => FailureKind::Backend,
            ConnectError::Pkce(_)
            | ConnectError::Storage(_)
            | ConnectError::Channel(_)
            | ConnectError::Internal(_) => FailureKind::Internal,
            ConnectError::Superseded
            | ConnectError::AlreadyConnected
            | ConnectError::AttemptInFlight => return None,
        })
    }

    /// Closing the window is an ordinary user choice, not a fault.
    pub fn is_benign(&self) -> bool {
        matches!(self, ConnectError::UserCancelled | ConnectError::Superseded)
    }
}

impl From<BackendError> for ConnectError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Protocol(msg) => ConnectError::Protocol(msg),
            BackendError::Unauthorized(msg) | BackendError::Rejected(msg) => {
                ConnectError::Backend(msg)
            }
            BackendError::Transport(msg) => ConnectError::Backend(format!("network error: {}", msg)),
        }
    }
}
