//! PKCE (Proof Key for Code Exchange)
//!
//! Implements RFC 7636 S256 for the authorization code flow. The verifier is
//! drawn from the OS random source only; if that source fails, generation
//! fails instead of degrading to a weaker generator.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// The only challenge method we send.
pub const PKCE_METHOD: &str = "S256";

/// 32 random bytes -> 43 base64url characters
const VERIFIER_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PkceError {
    #[error("secure random source unavailable: {0}")]
    RandomUnavailable(String),
}

/// Secret half of a PKCE pair. Wiped from memory on drop and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct CodeVerifier(String);

impl CodeVerifier {
    /// Wrap a verifier read back from session storage.
    pub fn from_stored(value: String) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn challenge(&self) -> String {
        derive_challenge(&self.0)
    }
}

impl std::fmt::Debug for CodeVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CodeVerifier([redacted; {}])", self.0.len())
    }
}

/// Signature of a verifier source, so callers can substitute one in tests.
pub type VerifierGenerator = fn() -> Result<CodeVerifier, PkceError>;

/// Generate a fresh verifier from the OS random source.
pub fn generate_verifier() -> Result<CodeVerifier, PkceError> {
    let mut bytes = Zeroizing::new([0u8; VERIFIER_BYTES]);
    OsRng
        .try_fill_bytes(&mut bytes[..])
        .map_err(|e| PkceError::RandomUnavailable(e.to_string()))?;
    Ok(CodeVerifier(URL_SAFE_NO_PAD.encode(&bytes[..])))
}

/// base64url(SHA-256(verifier)), no padding.
pub fn derive_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// PKCE code verifier and challenge pair
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Kept in session storage, sent only in the token exchange
    pub verifier: CodeVerifier,
    /// Sent in the authorization request
    pub challenge: String,
    pub method: &'static str,
}

impl PkceChallenge {
    pub fn generate() -> Result<Self, PkceError> {
        Self::generate_with(generate_verifier)
    }

    pub fn generate_with(generator: VerifierGenerator) -> Result<Self, PkceError> {
        let verifier = generator()?;
        let challenge = verifier.challenge();
        Ok(Self {
            verifier,
            challenge,
            method: PKCE_METHOD,
        })
    }

    /// Verify that a verifier matches a challenge
    pub fn verify(verifier: &str, challenge: &str) -> bool {
        derive_challenge(verifier) == challenge
    }
}
