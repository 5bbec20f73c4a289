//! # Groups & Coin Custody
//!
//! A group is a set of members sharing one coin. Exactly one member, the
//! **holder**, owns the coin at any time, and only the holder may pass it
//! on. Every pass increments the group's coin counter by one and hands the
//! coin to a member drawn uniformly at random.
//!
//! ## Architecture
//!
//! ```text
//! mod.rs         — Group / GroupId data model, GroupError
//! custody.rs     — CoinCustody: authorize and perform coin transfers
//! membership.rs  — Membership: create groups, join groups, look them up
//! ```
//!
//! ## Invariants
//!
//! - `holder ∈ members` at all times.
//! - `members` never contains the same username twice.
//! - `coin` starts at [`INITIAL_COIN`] and grows by exactly one per
//!   successful transfer.

pub mod custody;
pub mod membership;

pub use custody::{CoinCustody, CoinTransfer, ReselectionPolicy};
pub use membership::Membership;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::config::INITIAL_COIN;
use crate::identity::Username;
use crate::storage::DirectoryError;

// ---------------------------------------------------------------------------
// GroupId
// ---------------------------------------------------------------------------

/// Opaque group identifier. New groups get a random UUID; lookups accept
/// whatever string the client sent and simply find nothing if it is bogus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A group record as persisted by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    /// Number of transfers so far, plus one.
    pub coin: u64,
    pub creator: Username,
    /// The member currently allowed to pass the coin.
    #[serde(rename = "coin_holder")]
    pub holder: Username,
    /// Members in join order. The creator is always first.
    pub members: Vec<Username>,
}

impl Group {
    /// A fresh group: the creator is the only member and holds the coin.
    pub fn new(id: GroupId, creator: Username) -> Self {
        Self {
            id,
            coin: INITIAL_COIN,
            holder: creator.clone(),
            members: vec![creator.clone()],
            creator,
        }
    }

    pub fn is_member(&self, username: &Username) -> bool {
        self.members.contains(username)
    }

    pub fn is_holder(&self, username: &Username) -> bool {
        &self.holder == username
    }
}

// ---------------------------------------------------------------------------
// GroupError
// ---------------------------------------------------------------------------

/// Outcomes of group operations that the caller must handle.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error("group not found: {0}")]
    GroupNotFound(GroupId),

    /// A lookup by member found no group they belong to.
    #[error("{0} belongs to no group")]
    NoGroupFor(Username),

    #[error("{member} is already a member of group {group}")]
    AlreadyMember { group: GroupId, member: Username },

    /// The requester is a valid, authenticated user who simply does not
    /// hold this group's coin.
    #[error("{requester} does not hold the coin of group {group}")]
    NotAuthorizedHolder { group: GroupId, requester: Username },

    /// A concurrent transfer won the race.
    #[error("coin of group {0} moved before the transfer committed")]
    StaleHolder(GroupId),

    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),
}

impl From<DirectoryError> for GroupError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::GroupNotFound(id) => Self::GroupNotFound(id),
            DirectoryError::AlreadyMember { group, member } => Self::AlreadyMember { group, member },
            DirectoryError::StaleHolder(id) => Self::StaleHolder(id),
            // The chosen holder came from the group's own member list, so a
            // miss means the record changed underneath us.
            DirectoryError::NotMember { group, .. } => Self::StaleHolder(group),
            other => Self::PersistenceUnavailable(other.to_string()),
        }
    }
}
