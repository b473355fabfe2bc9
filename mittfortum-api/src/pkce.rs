//! PKCE (RFC 7636) verifier, challenge and state generation.

use base64::prelude::*;
use ring::digest::{SHA256, digest};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::ApiError;

/// Challenge method sent to the authorize endpoint.
pub const CHALLENGE_METHOD: &str = "S256";

/// Random bytes behind a verifier; encodes to 64 characters.
const VERIFIER_BYTES: usize = 48;

/// Random bytes behind the `state` parameter.
const STATE_BYTES: usize = 16;

/// A verifier and its S256 challenge.
#[derive(Clone, PartialEq, Eq)]
pub struct PkcePair {
    /// Sent with the token request.
    pub verifier: String,
    /// Sent with the authorize request.
    pub challenge: String,
}

impl PkcePair {
    /// Generates a fresh pair.
    pub fn generate() -> Result<Self, ApiError> {
        let verifier = random_url_safe(VERIFIER_BYTES)?;
        Ok(Self::from_verifier(verifier))
    }

    /// Derives the challenge for an existing verifier.
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"[redacted]")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// `BASE64URL(SHA256(verifier))` without padding.
pub fn challenge_for(verifier: &str) -> String {
    let hash = digest(&SHA256, verifier.as_bytes());
    BASE64_URL_SAFE_NO_PAD.encode(hash.as_ref())
}

/// Generates an opaque `state` value.
pub fn generate_state() -> Result<String, ApiError> {
    random_url_safe(STATE_BYTES)
}

fn random_url_safe(len: usize) -> Result<String, ApiError> {
    let mut bytes = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| ApiError::Config("system random source unavailable".to_string()))?;
    Ok(BASE64_URL_SAFE_NO_PAD.encode(bytes))
}
