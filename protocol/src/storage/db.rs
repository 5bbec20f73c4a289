//! # CoinDb: Persistent Directory
//!
//! The sled-backed implementation of [`UserDirectory`] and
//! [`GroupDirectory`]. All on-disk data flows through this module.
//!
//! ## Tree Layout
//!
//! | Tree          | Key               | Value                   |
//! |---------------|-------------------|-------------------------|
//! | `users`       | username (UTF-8)  | `bincode(UserRecord)`   |
//! | `groups`      | group id (UTF-8)  | `bincode(Group)`        |
//! | `memberships` | username (UTF-8)  | `bincode(Vec<GroupId>)` |
//!
//! `memberships` is a reverse index of `Group::members`; both sides are
//! always written in the same transaction.
//!
//! ## Atomicity
//!
//! Registration is a compare-and-swap against an empty slot, so two racing
//! registrations for one name cannot both succeed. Joins and coin transfers
//! run as sled transactions: the read, the precondition check and the write
//! are serialized against every other transaction touching the same keys,
//! and a conflicting commit makes sled re-run the closure against fresh
//! state.
//!
//! sled flushes to disk in the background; call [`CoinDb::flush`] before
//! shutting down to make the last writes durable.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionResult, TransactionalTree,
};
use sled::{Db, Transactional, Tree};
use std::path::Path;

use super::password::{hash_secret, verify_secret};
use super::{DirResult, DirectoryError, GroupDirectory, UserDirectory};
use crate::group::{Group, GroupId};
use crate::identity::Username;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A registered user as stored in the `users` tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: Username,
    /// Argon2id PHC string. Never the plaintext.
    pub password_hash: String,
    pub registered_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// CoinDb
// ---------------------------------------------------------------------------

/// Persistent storage for users, groups and memberships.
///
/// # Thread Safety
///
/// sled is internally synchronized. `CoinDb` is cheap to clone and can be
/// shared across threads via `Arc<CoinDb>` without external locking.
#[derive(Debug, Clone)]
pub struct CoinDb {
    db: Db,
    users: Tree,
    groups: Tree,
    memberships: Tree,
}

impl CoinDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DirResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    pub fn open_temporary() -> DirResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DirResult<Self> {
        let users = db.open_tree("users")?;
        let groups = db.open_tree("groups")?;
        let memberships = db.open_tree("memberships")?;

        Ok(Self {
            db,
            users,
            groups,
            memberships,
        })
    }

    /// Fetch the stored record for `username`.
    pub fn get_user(&self, username: &Username) -> DirResult<Option<UserRecord>> {
        match self.users.get(username.as_str())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Block until every pending write is durable.
    pub fn flush(&self) -> DirResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl UserDirectory for CoinDb {
    fn user_exists(&self, username: &Username) -> DirResult<bool> {
        Ok(self.users.contains_key(username.as_str())?)
    }

    fn insert_user(&self, username: &Username, secret: &str) -> DirResult<()> {
        let record = UserRecord {
            username: username.clone(),
            password_hash: hash_secret(secret)?,
            registered_at: Utc::now(),
        };
        let bytes = encode(&record)?;

        match self
            .users
            .compare_and_swap(username.as_str(), None::<&[u8]>, Some(bytes))?
        {
            Ok(()) => {
                tracing::info!(identity = %username, "user registered");
                Ok(())
            }
            Err(_) => Err(DirectoryError::UserExists(username.clone())),
        }
    }

    fn credentials_match(&self, username: &Username, secret: &str) -> DirResult<bool> {
        match self.get_user(username)? {
            Some(record) => verify_secret(secret, &record.password_hash),
            None => Ok(false),
        }
    }
}

impl GroupDirectory for CoinDb {
    fn group_exists(&self, id: &GroupId) -> DirResult<bool> {
        Ok(self.groups.contains_key(id.as_str())?)
    }

    fn get_group(&self, id: &GroupId) -> DirResult<Option<Group>> {
        match self.groups.get(id.as_str())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn groups_of(&self, member: &Username) -> DirResult<Vec<GroupId>> {
        match self.memberships.get(member.as_str())? {
            Some(bytes) => decode(&bytes),
            None => Ok(Vec::new()),
        }
    }

    fn create_group(&self, creator: &Username) -> DirResult<Group> {
        let group = Group::new(GroupId::generate(), creator.clone());
        let group_bytes = encode(&group)?;

        let result: TransactionResult<(), DirectoryError> = (&self.groups, &self.memberships)
            .transaction(|(groups, memberships)| {
                groups.insert(group.id.as_str(), group_bytes.clone())?;
                append_membership(memberships, creator, &group.id)?;
                Ok(())
            });
        flatten(result)?;

        tracing::info!(group = %group.id, creator = %creator, "group created");
        Ok(group)
    }

    fn add_member(&self, id: &GroupId, member: &Username) -> DirResult<Group> {
        let result = (&self.groups, &self.memberships).transaction(|(groups, memberships)| {
            let mut group = load_group(groups, id)?;
            if group.is_member(member) {
                return abort(DirectoryError::AlreadyMember {
                    group: id.clone(),
                    member: member.clone(),
                });
            }

            group.members.push(member.clone());
            groups.insert(id.as_str(), encode(&group).map_err(ConflictableTransactionError::Abort)?)?;
            append_membership(memberships, member, id)?;
            Ok(group)
        });
        flatten(result)
    }

    fn transfer_coin_if_holder(
        &self,
        id: &GroupId,
        expected_holder: &Username,
        expected_coin: u64,
        new_holder: &Username,
    ) -> DirResult<Group> {
        let result = self.groups.transaction(|groups| {
            let mut group = load_group(groups, id)?;
            if &group.holder != expected_holder || group.coin != expected_coin {
                return abort(DirectoryError::StaleHolder(id.clone()));
            }
            if !group.is_member(new_holder) {
                return abort(DirectoryError::NotMember {
                    group: id.clone(),
                    member: new_holder.clone(),
                });
            }

            group.holder = new_holder.clone();
            group.coin += 1;
            groups.insert(id.as_str(), encode(&group).map_err(ConflictableTransactionError::Abort)?)?;
            Ok(group)
        });
        flatten(result)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn encode<T: Serialize>(value: &T) -> DirResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DirectoryError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DirResult<T> {
    bincode::deserialize(bytes).map_err(|e| DirectoryError::Serialization(e.to_string()))
}

fn abort<T>(err: DirectoryError) -> ConflictableTransactionResult<T, DirectoryError> {
    Err(ConflictableTransactionError::Abort(err))
}

fn flatten<T>(result: TransactionResult<T, DirectoryError>) -> DirResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(err)) => Err(err),
        Err(TransactionError::Storage(err)) => Err(err.into()),
    }
}

fn load_group(
    groups: &TransactionalTree,
    id: &GroupId,
) -> ConflictableTransactionResult<Group, DirectoryError> {
    match groups.get(id.as_str())? {
        Some(bytes) => decode(&bytes).map_err(ConflictableTransactionError::Abort),
        None => abort(DirectoryError::GroupNotFound(id.clone())),
    }
}

fn append_membership(
    memberships: &TransactionalTree,
    member: &Username,
    id: &GroupId,
) -> ConflictableTransactionResult<(), DirectoryError> {
    let mut ids: Vec<GroupId> = match memberships.get(member.as_str())? {
        Some(bytes) => decode(&bytes).map_err(ConflictableTransactionError::Abort)?,
        None => Vec::new(),
    };
    if !ids.contains(id) {
        ids.push(id.clone());
    }
    let bytes = encode(&ids).map_err(ConflictableTransactionError::Abort)?;
    memberships.insert(member.as_str(), bytes)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
