use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::error::AppError;

/// One-way hash plus verify for passwords.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, AppError>;
    fn verify(&self, password: &str, hash: &str) -> Result<bool, AppError>;
}

/// Argon2id (19MB memory, 2 iterations, parallelism 1).
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

impl Argon2Hasher {
    fn argon2() -> Result<Argon2<'static>, AppError> {
        let params = Params::new(19 * 1024, 2, 1, None)
            .map_err(|e| AppError::internal(format!("Invalid argon2 params: {e}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        Self::argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AppError::internal(format!("Hashing failed: {e}")))
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, AppError> {
        let parsed =
            PasswordHash::new(hash).map_err(|e| AppError::internal(format!("Invalid hash: {e}")))?;
        Ok(Self::argon2()?
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}
