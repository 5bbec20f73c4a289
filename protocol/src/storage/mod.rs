//! # Storage Module
//!
//! Persistence for users, groups, memberships and coin state. The rest of
//! the crate talks to storage only through the two narrow traits defined
//! here, so the session and custody logic never depend on a particular
//! backend.
//!
//! ## Architecture
//!
//! ```text
//! mod.rs       — UserDirectory / GroupDirectory traits, DirectoryError
//! db.rs        — CoinDb: sled-backed implementation of both traits
//! password.rs  — Argon2id hashing for stored secrets
//! ```
//!
//! ## Atomicity
//!
//! Anything that reads a group and then writes it back (joining, passing
//! the coin) runs as a single storage transaction.
//! [`GroupDirectory::transfer_coin_if_holder`] is a conditional update keyed
//! on the holder *and* coin counter the caller observed, which is what lets
//! two racing transfers resolve to exactly one winner.

pub mod db;
pub mod password;

#[cfg(test)]
pub(crate) mod faulty;

pub use db::CoinDb;

use thiserror::Error;

use crate::group::{Group, GroupId};
use crate::identity::Username;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors returned by directory operations.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("user already registered: {0}")]
    UserExists(Username),

    #[error("group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("{member} is already a member of group {group}")]
    AlreadyMember { group: GroupId, member: Username },

    #[error("{member} is not a member of group {group}")]
    NotMember { group: GroupId, member: Username },

    /// The group's holder or coin counter no longer matches what the caller
    /// observed. Someone else's transfer committed first.
    #[error("coin of group {0} moved before the transfer committed")]
    StaleHolder(GroupId),

    #[error("storage unavailable: {source}")]
    Unavailable {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
        transient: bool,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("password hashing error: {0}")]
    Hashing(String),
}

impl DirectoryError {
    /// Whether retrying the same operation could plausibly succeed.
    ///
    /// Only storage faults qualify. Constraint violations (`AlreadyMember`,
    /// `StaleHolder`, ...) are answers, not faults, and must never be
    /// retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { transient: true, .. })
    }
}

impl From<sled::Error> for DirectoryError {
    fn from(err: sled::Error) -> Self {
        let transient = matches!(err, sled::Error::Io(_));
        Self::Unavailable {
            source: Box::new(err),
            transient,
        }
    }
}

pub type DirResult<T> = Result<T, DirectoryError>;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Registered users and their credentials.
pub trait UserDirectory: Send + Sync {
    /// Whether `username` has registered.
    fn user_exists(&self, username: &Username) -> DirResult<bool>;

    /// Registers a new user. Fails with [`DirectoryError::UserExists`] if
    /// the name is taken; the check and the insert are one atomic step.
    fn insert_user(&self, username: &Username, secret: &str) -> DirResult<()>;

    /// Whether `secret` is the password `username` registered with.
    /// Unknown users simply don't match.
    fn credentials_match(&self, username: &Username, secret: &str) -> DirResult<bool>;
}

/// Groups, their members, and who holds each group's coin.
pub trait GroupDirectory: Send + Sync {
    fn group_exists(&self, id: &GroupId) -> DirResult<bool>;

    fn get_group(&self, id: &GroupId) -> DirResult<Option<Group>>;

    /// Groups `member` belongs to, in the order they were joined.
    fn groups_of(&self, member: &Username) -> DirResult<Vec<GroupId>>;

    /// Creates a group whose sole member and coin holder is `creator`.
    fn create_group(&self, creator: &Username) -> DirResult<Group>;

    /// Adds `member` to the group. Fails with
    /// [`DirectoryError::AlreadyMember`] on a duplicate join and leaves the
    /// group untouched.
    fn add_member(&self, id: &GroupId, member: &Username) -> DirResult<Group>;

    /// Hands the coin to `new_holder` and increments the counter, but only
    /// if the group's holder is still `expected_holder` and its counter is
    /// still `expected_coin`. Otherwise fails with
    /// [`DirectoryError::StaleHolder`].
    fn transfer_coin_if_holder(
        &self,
        id: &GroupId,
        expected_holder: &Username,
        expected_coin: u64,
        new_holder: &Username,
    ) -> DirResult<Group>;
}
