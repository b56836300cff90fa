//! OAuth primitives

pub mod pkce;

pub use pkce::{
    derive_challenge, generate_verifier, CodeVerifier, PkceChallenge, PkceError,
    VerifierGenerator, PKCE_METHOD,
};
