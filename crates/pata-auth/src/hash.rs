use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::AuthError;

/// Hashing capability for stored secrets.
pub trait SecretHasher: Send + Sync {
    fn hash(&self, secret: &str) -> Result<String, AuthError>;
    fn verify(&self, secret: &str, hash: &str) -> bool;
}

/// Argon2id with a fresh salt per hash, stored as a PHC string.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

impl SecretHasher for Argon2Hasher {
    fn hash(&self, secret: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(AuthError::backend)
    }

    fn verify(&self, secret: &str, hash: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::debug!(%error, "stored hash is not a PHC string");
                return false;
            }
        };
        Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Deterministic stand-in for tests: `hash("pw") == "fake:pw"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeHash;

impl SecretHasher for FakeHash {
    fn hash(&self, secret: &str) -> Result<String, AuthError> {
        Ok(format!("fake:{secret}"))
    }

    fn verify(&self, secret: &str, hash: &str) -> bool {
        hash.strip_prefix("fake:") == Some(secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argon2_hash_is_phc_and_verifies() {
        let hash = Argon2Hasher.hash("hunter2").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(Argon2Hasher.verify("hunter2", &hash));
        assert!(!Argon2Hasher.verify("hunter3", &hash));
    }

    #[test]
    fn argon2_salts_every_hash() {
        let first = Argon2Hasher.hash("hunter2").unwrap();
        let second = Argon2Hasher.hash("hunter2").unwrap();
        assert_ne!(first, second);
        assert!(Argon2Hasher.verify("hunter2", &second));
    }

    #[test]
    fn argon2_refuses_malformed_hashes() {
        assert!(!Argon2Hasher.verify("hunter2", ""));
        assert!(!Argon2Hasher.verify("hunter2", "fake:hunter2"));
    }

    #[test]
    fn fake_hash_is_transparent() {
        assert_eq!(FakeHash.hash("pw").unwrap(), "fake:pw");
        assert!(FakeHash.verify("pw", "fake:pw"));
        assert!(!FakeHash.verify("pw", "pw"));
    }
}
