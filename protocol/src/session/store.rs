//! # Credential Store
//!
//! The authoritative mapping from issued token to [`Session`], plus a
//! secondary index from owner to its current token so the
//! one-session-per-identity rule is enforced in O(1).
//!
//! Both maps live behind one `parking_lot::Mutex`. Every operation takes
//! the lock exactly once and performs its whole check-and-mutate sequence
//! while holding it, so two racing logins for the same user can never
//! leave two live tokens behind, and the reaper can never remove a session
//! that a concurrent validation is about to accept.
//!
//! Each operation has a `*_at` twin taking the current instant explicitly.
//! The plain versions call it with `Utc::now()`; tests use the explicit
//! form to step over expiration boundaries without sleeping.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use super::error::SessionError;
use super::token::{Session, SessionToken};
use crate::config::{SESSION_REAP_INTERVAL, SESSION_TTL};
use crate::identity::Username;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Session lifetime knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long an issued token stays valid.
    pub ttl: Duration,

    /// How often [`spawn_reaper`](super::spawn_reaper) sweeps the store.
    pub reap_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: SESSION_TTL,
            reap_interval: SESSION_REAP_INTERVAL,
        }
    }
}

// ---------------------------------------------------------------------------
// CredentialStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreInner {
    sessions: HashMap<SessionToken, Session>,
    by_owner: HashMap<Username, SessionToken>,
}

impl StoreInner {
    /// Removes a session and, if the owner index still points at it, the
    /// index entry too.
    fn evict(&mut self, token: &str) -> Option<Session> {
        let session = self.sessions.remove(token)?;
        let indexed = self
            .by_owner
            .get(session.owner())
            .is_some_and(|current| current.as_str() == token);
        if indexed {
            self.by_owner.remove(session.owner());
        }
        Some(session)
    }
}

/// Thread-safe store of live sessions.
///
/// Share it as `Arc<CredentialStore>`; all methods take `&self`.
pub struct CredentialStore {
    inner: Mutex<StoreInner>,
    ttl: chrono::Duration,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("live_sessions", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl CredentialStore {
    /// Creates an empty store whose sessions live for `config.ttl`.
    pub fn new(config: SessionConfig) -> Self {
        // Anything beyond a century is indistinguishable from "forever".
        let ttl = chrono::Duration::from_std(config.ttl)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        Self {
            inner: Mutex::new(StoreInner::default()),
            ttl,
        }
    }

    /// Issues a new session for `owner`, bound to `address`.
    ///
    /// Any session the owner already holds is removed first, so the token
    /// returned here is the owner's only valid token. Always succeeds.
    pub fn issue(&self, address: IpAddr, owner: Username) -> SessionToken {
        self.issue_at(address, owner, Utc::now())
    }

    /// [`issue`](Self::issue) with an explicit issuance instant.
    pub fn issue_at(&self, address: IpAddr, owner: Username, now: DateTime<Utc>) -> SessionToken {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut inner = self.inner.lock();

        let refreshed = match inner.by_owner.remove(&owner) {
            Some(previous) => inner.sessions.remove(previous.as_str()).is_some(),
            None => false,
        };

        let token = loop {
            let candidate = SessionToken::generate();
            if !inner.sessions.contains_key(candidate.as_str()) {
                break candidate;
            }
        };

        inner.by_owner.insert(owner.clone(), token.clone());
        inner.sessions.insert(
            token.clone(),
            Session::new(token.clone(), owner.clone(), address, now, expires_at),
        );
        drop(inner);

        if refreshed {
            tracing::info!(identity = %owner, %address, "refreshed session, previous token revoked");
        } else {
            tracing::info!(identity = %owner, %address, %expires_at, "session issued");
        }

        token
    }

    /// Checks that `token` is live, belongs to `claimed`, and was issued to
    /// `address`.
    ///
    /// Checks run in this order: existence, expiry, identity, address. Any
    /// failure other than [`SessionError::TokenNotFound`] evicts the
    /// session before returning, so the same token cannot be retried.
    pub fn validate(
        &self,
        token: &str,
        claimed: &Username,
        address: IpAddr,
    ) -> Result<(), SessionError> {
        self.validate_at(token, claimed, address, Utc::now())
    }

    /// [`validate`](Self::validate) with an explicit current instant.
    pub fn validate_at(
        &self,
        token: &str,
        claimed: &Username,
        address: IpAddr,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();

        let verdict = match inner.sessions.get(token) {
            None => Err(SessionError::TokenNotFound),
            Some(session) if session.is_expired_at(now) => Err(SessionError::TokenExpired),
            Some(session) if session.owner() != claimed => Err(SessionError::IdentityMismatch),
            Some(session) if session.address() != address => Err(SessionError::AddressMismatch),
            Some(_) => Ok(()),
        };

        let reason = match verdict {
            Ok(()) => return Ok(()),
            Err(SessionError::TokenNotFound) => {
                drop(inner);
                tracing::debug!(identity = %claimed, "session validation failed: token not found");
                return Err(SessionError::TokenNotFound);
            }
            Err(reason) => reason,
        };

        let evicted = inner.evict(token);
        drop(inner);

        let owner = evicted
            .as_ref()
            .map(|s| s.owner().to_string())
            .unwrap_or_default();
        if reason.is_compromise() {
            tracing::warn!(
                reason = reason.reason(),
                owner = %owner,
                claimed = %claimed,
                %address,
                "possible token compromise, session evicted"
            );
        } else {
            tracing::debug!(reason = reason.reason(), owner = %owner, "expired session evicted");
        }

        Err(reason)
    }

    /// Removes `token` if present. Returns whether anything was removed.
    pub fn revoke(&self, token: &str) -> bool {
        let evicted = self.inner.lock().evict(token);
        match evicted {
            Some(session) => {
                tracing::info!(identity = %session.owner(), "session revoked");
                true
            }
            None => false,
        }
    }

    /// Removes every session that is expired, returning how many went.
    pub fn reclaim_expired(&self) -> usize {
        self.reclaim_expired_at(Utc::now())
    }

    /// [`reclaim_expired`](Self::reclaim_expired) with an explicit instant.
    ///
    /// Expiry is decided under the same lock that performs the removal, so
    /// a session refreshed between scan and removal is never touched.
    pub fn reclaim_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.lock();
        let expired: Vec<SessionToken> = inner
            .sessions
            .values()
            .filter(|session| session.is_expired_at(now))
            .map(|session| session.token().clone())
            .collect();

        for token in &expired {
            inner.evict(token.as_str());
        }
        expired.len()
    }

    /// Snapshot of the session behind `token`, expired or not.
    pub fn session(&self, token: &str) -> Option<Session> {
        self.inner.lock().sessions.get(token).cloned()
    }

    /// The owner's current token, if they hold one.
    pub fn token_for(&self, owner: &Username) -> Option<SessionToken> {
        self.inner.lock().by_owner.get(owner).cloned()
    }

    /// Number of sessions currently held, including expired ones not yet
    /// reclaimed.
    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
