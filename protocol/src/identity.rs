//! # Identity Policy
//!
//! Usernames are the identity every session and every group membership is
//! keyed on. They are restricted to ASCII letters and digits so they can be
//! carried in HTTP headers, logged, and compared byte-for-byte without any
//! normalization surprises.
//!
//! Secrets (passwords) only have to be non-empty and free of whitespace.
//! They never leave this crate in plaintext: the storage layer keeps an
//! Argon2id hash, see [`crate::storage::password`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::{MAX_SECRET_LENGTH, MAX_USERNAME_LENGTH};

/// Reasons a username or secret is rejected by the character policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("username is empty")]
    EmptyUsername,

    #[error("username exceeds {max} bytes (got {len})")]
    UsernameTooLong { len: usize, max: usize },

    #[error("username contains a character outside [A-Za-z0-9]")]
    IllegalUsernameCharacter,

    #[error("secret is empty")]
    EmptySecret,

    #[error("secret exceeds {max} bytes")]
    SecretTooLong { max: usize },

    #[error("secret contains whitespace")]
    WhitespaceInSecret,
}

impl IdentityError {
    /// `true` when the offending value was the secret rather than the
    /// username.
    pub fn concerns_secret(&self) -> bool {
        matches!(
            self,
            Self::EmptySecret | Self::SecretTooLong { .. } | Self::WhitespaceInSecret
        )
    }
}

/// A username that satisfies the identity policy.
///
/// The only way to obtain one is [`Username::parse`], so holding a
/// `Username` is proof the policy was checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Validate `raw` against the policy.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        if raw.is_empty() {
            return Err(IdentityError::EmptyUsername);
        }
        if raw.len() > MAX_USERNAME_LENGTH {
            return Err(IdentityError::UsernameTooLong {
                len: raw.len(),
                max: MAX_USERNAME_LENGTH,
            });
        }
        if !raw.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(IdentityError::IllegalUsernameCharacter);
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Username {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}

/// Check a plaintext secret against the policy.
pub fn check_secret(secret: &str) -> Result<(), IdentityError> {
    if secret.is_empty() {
        return Err(IdentityError::EmptySecret);
    }
    if secret.len() > MAX_SECRET_LENGTH {
        return Err(IdentityError::SecretTooLong {
            max: MAX_SECRET_LENGTH,
        });
    }
    if secret.chars().any(char::is_whitespace) {
        return Err(IdentityError::WhitespaceInSecret);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_alphanumeric_usernames() {
        for raw in ["alice", "Bob42", "x", "0000"] {
            let name = Username::parse(raw).unwrap();
            assert_eq!(name.as_str(), raw);
        }
    }

    #[test]
    fn rejects_punctuation_and_whitespace() {
        for raw in ["al ice", "bob!", "carol_1", "dave-x", "eve\n", "zoë"] {
            assert_eq!(
                Username::parse(raw),
                Err(IdentityError::IllegalUsernameCharacter),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_empty_username() {
        assert_eq!(Username::parse(""), Err(IdentityError::EmptyUsername));
    }

    #[test]
    fn rejects_overlong_username() {
        let raw = "a".repeat(MAX_USERNAME_LENGTH + 1);
        assert!(matches!(
            Username::parse(&raw),
            Err(IdentityError::UsernameTooLong { .. })
        ));
        assert!(Username::parse(&"a".repeat(MAX_USERNAME_LENGTH)).is_ok());
    }

    #[test]
    fn secret_policy() {
        assert!(check_secret("hunter2").is_ok());
        assert!(check_secret("p@ss;w0rd!").is_ok());
        assert_eq!(check_secret(""), Err(IdentityError::EmptySecret));
        assert_eq!(check_secret("two words"), Err(IdentityError::WhitespaceInSecret));
        assert_eq!(check_secret("tab\there"), Err(IdentityError::WhitespaceInSecret));
        assert!(check_secret("")
            .unwrap_err()
            .concerns_secret());
    }

    #[test]
    fn serde_goes_through_the_policy() {
        let name: Username = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(name.as_str(), "alice");
        assert!(serde_json::from_str::<Username>("\"not valid\"").is_err());
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"alice\"");
    }
}
