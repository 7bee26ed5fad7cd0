//! PKCE (RFC 7636) challenge/verifier pairs and OAuth `state` nonces.
//!
//! Uses the `oauth2` crate's own PKCE type rather than hand-rolling the
//! SHA-256/base64url plumbing, the same choice
//! `oauth2::client::OAuth2Client::authorization_code_flow` makes.

use std::time::{Duration, Instant};

use base64::Engine as _;
use oauth2::PkceCodeChallenge;
use rand::RngCore as _;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{AuthError, Result};

/// Challenges are only valid for this long after creation.
pub const CHALLENGE_LIFETIME: Duration = Duration::from_secs(10 * 60);

/// A PKCE verifier/challenge pair generated for one authorisation attempt.
///
/// A verifier is used at most once: `PKCEChallenge::generate` must be called
/// again for every new authorisation flow.
#[derive(Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
    pub method: &'static str,
    created_at: Instant,
}

impl PkceChallenge {
    /// Generates a fresh S256 verifier/challenge pair.
    pub fn generate() -> Self {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        Self {
            verifier: verifier.secret().clone(),
            challenge: challenge.as_str().to_string(),
            method: "S256",
            created_at: Instant::now(),
        }
    }

    /// True once more than [`CHALLENGE_LIFETIME`] has elapsed since creation.
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() > CHALLENGE_LIFETIME
    }

    /// Validates `(verifier, challenge, method)` against this pair: method
    /// must match, the verifier must hash (or, for `plain`, equal) to the
    /// challenge, and the pair must not have expired.
    pub fn validate(&self, verifier: &str, challenge: &str, method: &str) -> Result<()> {
        if self.is_expired() {
            return Err(AuthError::PkceExpired);
        }
        if method != self.method {
            return Err(AuthError::PkceMethodMismatch);
        }
        let matches: bool = match method {
            "plain" => verifier.as_bytes().ct_eq(challenge.as_bytes()).into(),
            "S256" => {
                let computed = compute_s256_challenge(verifier);
                computed.as_bytes().ct_eq(challenge.as_bytes()).into()
            }
            other => return Err(AuthError::UnsupportedPkceMethod(other.to_string())),
        };
        if matches {
            Ok(())
        } else {
            Err(AuthError::PkceMismatch)
        }
    }
}

/// base64url-no-pad(SHA-256(verifier)), used independently of the `oauth2`
/// crate's type wrapper when validating an externally supplied pair.
pub fn compute_s256_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// Generates a cryptographically random `state` parameter: >=32 random bytes,
/// base64url-no-pad encoded, following the same nonce convention used for
/// PKCE verifiers in this crate.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_matches_sha256_of_verifier() {
        let pair = PkceChallenge::generate();
        assert_eq!(compute_s256_challenge(&pair.verifier), pair.challenge);
    }

    #[test]
    fn validates_fresh_pair() {
        let pair = PkceChallenge::generate();
        assert!(
            pair.validate(&pair.verifier, &pair.challenge, "S256")
                .is_ok()
        );
    }

    #[test]
    fn rejects_wrong_verifier() {
        let pair = PkceChallenge::generate();
        assert!(pair.validate("not-the-verifier", &pair.challenge, "S256").is_err());
    }

    #[test]
    fn rejects_after_expiry() {
        let mut pair = PkceChallenge::generate();
        pair.created_at = Instant::now() - CHALLENGE_LIFETIME - Duration::from_secs(1);
        assert!(matches!(
            pair.validate(&pair.verifier, &pair.challenge, "S256"),
            Err(AuthError::PkceExpired)
        ));
    }

    #[test]
    fn plain_method_compares_verifier_and_challenge_directly() {
        let pair = PkceChallenge {
            verifier: "abc".to_string(),
            challenge: "abc".to_string(),
            method: "plain",
            created_at: Instant::now(),
        };
        assert!(pair.validate("abc", "abc", "plain").is_ok());
    }

    #[test]
    fn state_values_are_unique() {
        assert_ne!(generate_state(), generate_state());
    }
}
