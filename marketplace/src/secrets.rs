//! One-time secrets: staff invite tokens and phone verification codes.
//!
//! Secrets are handed to the user once and only their SHA-256 hash is
//! stored. Comparison happens on the hashes in constant time.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

/// Source of one-time secrets.
pub trait SecretGenerator: Send + Sync {
    /// 256-bit random token, base64url without padding (43 chars).
    fn invite_token(&self) -> String;

    /// Six-digit numeric code, zero padded.
    fn phone_code(&self) -> String;
}

/// Secrets from the thread-local CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSecretGenerator;

impl SecretGenerator for OsSecretGenerator {
    fn invite_token(&self) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    fn phone_code(&self) -> String {
        let code: u32 = rand::thread_rng().gen_range(0..1_000_000);
        format!("{code:06}")
    }
}

/// Always returns the same secrets. For tests and local demos.
#[derive(Debug, Clone)]
pub struct FixedSecretGenerator {
    token: String,
    code: String,
}

impl FixedSecretGenerator {
    /// Generator returning `token` and `code`.
    #[must_use]
    pub fn new(token: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            code: code.into(),
        }
    }
}

impl SecretGenerator for FixedSecretGenerator {
    fn invite_token(&self) -> String {
        self.token.clone()
    }

    fn phone_code(&self) -> String {
        self.code.clone()
    }
}

/// Hex SHA-256 of `secret`, bound to `scope` so equal secrets in different
/// places hash differently.
#[must_use]
pub fn hash_secret(scope: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(scope.as_bytes());
    hasher.update(b":");
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether `secret` hashes to `expected_hash` under `scope`.
#[must_use]
pub fn verify_secret(scope: &str, secret: &str, expected_hash: &str) -> bool {
    let actual = hash_secret(scope, secret);
    constant_time_eq::constant_time_eq(actual.as_bytes(), expected_hash.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_tokens_are_url_safe_and_unique() {
        let generator = OsSecretGenerator;
        let a = generator.invite_token();
        let b = generator.invite_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn phone_codes_are_six_digits() {
        for _ in 0..50 {
            let code = OsSecretGenerator.phone_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn hashes_are_scoped() {
        assert_ne!(hash_secret("dest_1", "123456"), hash_secret("dest_2", "123456"));
        let hash = hash_secret("dest_1", "123456");
        assert!(verify_secret("dest_1", "123456", &hash));
        assert!(!verify_secret("dest_1", "654321", &hash));
        assert!(!verify_secret("dest_2", "123456", &hash));
    }
}
