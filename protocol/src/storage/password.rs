//! Argon2id hashing of stored secrets.
//!
//! Hashes are kept in PHC string format (`$argon2id$v=19$m=...`), which
//! embeds the salt and parameters. Changing the default parameters later
//! does not invalidate existing hashes.

use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;

use super::DirectoryError;

/// Hashes `secret` with a fresh random salt.
pub fn hash_secret(secret: &str) -> Result<String, DirectoryError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DirectoryError::Hashing(e.to_string()))
}

/// Checks `secret` against a stored PHC hash.
///
/// A wrong secret is `Ok(false)`; only a malformed stored hash is an error.
pub fn verify_secret(secret: &str, stored: &str) -> Result<bool, DirectoryError> {
    let parsed = PasswordHash::new(stored).map_err(|e| DirectoryError::Hashing(e.to_string()))?;
    match Argon2::default().verify_password(secret.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(DirectoryError::Hashing(e.to_string())),
    }
}
