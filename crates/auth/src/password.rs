//! Argon2id password hashing.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
};
use rand::Rng;

use crate::{AuthError, AuthResult};

/// Default Argon2 memory cost in KiB (19 MiB).
pub const DEFAULT_PASSWORD_MEMORY_KIB: u32 = 19 * 1024;

/// Default Argon2 iteration count.
pub const DEFAULT_PASSWORD_ITERATIONS: u32 = 2;

/// Hashes and verifies user passwords.
///
/// Hashes are PHC strings, so the salt and parameters travel with the hash
/// and verification keeps working after the cost parameters change.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    /// Creates a hasher with the given memory cost (KiB) and iteration count.
    pub fn new(memory_kib: u32, iterations: u32) -> AuthResult<Self> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| AuthError::Configuration(format!("invalid argon2 params: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hashes a password with a fresh random salt.
    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        let mut salt_bytes = [0u8; 16];
        rand::rng().fill(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)?;

        let hash = self.argon2().hash_password(password.as_bytes(), &salt)?;
        Ok(hash.to_string())
    }

    /// Returns true if `password` matches `hash`.
    ///
    /// A malformed stored hash is an error, a wrong password is `Ok(false)`.
    pub fn verify_password(&self, password: &str, hash: &str) -> AuthResult<bool> {
        let parsed = PasswordHash::new(hash)?;
        match self.argon2().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            params: Params::new(
                DEFAULT_PASSWORD_MEMORY_KIB,
                DEFAULT_PASSWORD_ITERATIONS,
                1,
                None,
            )
            .unwrap_or_default(),
        }
    }
}
