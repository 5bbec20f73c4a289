//! Session tokens and the record they point to.

use chrono::{DateTime, Utc};
use std::borrow::Borrow;
use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

use crate::identity::Username;

/// An opaque session token.
///
/// Generated from a version 4 UUID, i.e. 122 bits drawn from the operating
/// system's CSPRNG. The token carries no information about its owner; all
/// binding lives in the [`Session`] record inside the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Draw a fresh random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SessionToken {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<SessionToken> for String {
    fn from(value: SessionToken) -> Self {
        value.0
    }
}

/// A live session: who it belongs to, where it was issued, and when it
/// stops being valid.
///
/// Fields are private; once created, a session's binding never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    token: SessionToken,
    owner: Username,
    address: IpAddr,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(
        token: SessionToken,
        owner: Username,
        address: IpAddr,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token,
            owner,
            address,
            issued_at,
            expires_at,
        }
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn owner(&self) -> &Username {
        &self.owner
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Valid strictly before the expiration instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
