//! One-way password hashing (`Argon2id`, PHC string output).

use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::{rngs::OsRng, RngCore};
use tracing::error;

use super::AuthError;

const SALT_LENGTH: usize = 16;

#[derive(Clone, Default)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}

impl PasswordHasher {
    /// Argon2id with explicit cost parameters instead of the crate defaults.
    ///
    /// # Errors
    /// Returns an error if the parameters are out of range.
    pub fn with_params(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Self, argon2::Error> {
        let params = Params::new(memory_kib, iterations, parallelism, None)?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash `plaintext` with a fresh random salt embedded in the output.
    ///
    /// # Errors
    /// Returns `AuthError::HashingUnavailable` if the OS RNG or the hasher fails.
    pub fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        let mut salt_bytes = [0u8; SALT_LENGTH];
        OsRng.try_fill_bytes(&mut salt_bytes).map_err(|err| {
            error!("failed to generate password salt: {err}");
            AuthError::HashingUnavailable
        })?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|err| {
            error!("failed to encode password salt: {err}");
            AuthError::HashingUnavailable
        })?;

        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| {
                error!("failed to hash password: {err}");
                AuthError::HashingUnavailable
            })
    }

    /// Check `plaintext` against a stored hash; a malformed hash never matches.
    #[must_use]
    pub fn verify(&self, plaintext: &str, hash: &str) -> bool {
        PasswordHash::new(hash).is_ok_and(|parsed| {
            self.argon2
                .verify_password(plaintext.as_bytes(), &parsed)
                .is_ok()
        })
    }
}
