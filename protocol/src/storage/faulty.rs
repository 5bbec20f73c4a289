//! A [`CoinDb`] wrapper whose user and group halves can be switched off,
//! for exercising the storage-fault paths above the directory traits.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::{CoinDb, DirResult, DirectoryError, GroupDirectory, UserDirectory};
use crate::group::{Group, GroupId};
use crate::identity::Username;
use crate::retry::RetryPolicy;

/// The error sled reports when the disk goes away.
pub(crate) fn transient_fault() -> DirectoryError {
    DirectoryError::Unavailable {
        source: Box::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "storage went away",
        )),
        transient: true,
    }
}

/// Three attempts with millisecond backoff.
pub(crate) fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
        jitter: Duration::ZERO,
    }
}

pub(crate) struct FlakyDirectory {
    inner: CoinDb,
    users_down: AtomicBool,
    groups_down: AtomicBool,
    failed_calls: AtomicUsize,
}

impl FlakyDirectory {
    pub fn new() -> Self {
        Self {
            inner: CoinDb::open_temporary().unwrap(),
            users_down: AtomicBool::new(false),
            groups_down: AtomicBool::new(false),
            failed_calls: AtomicUsize::new(0),
        }
    }

    /// The healthy store underneath, for seeding and inspecting state.
    pub fn inner(&self) -> &CoinDb {
        &self.inner
    }

    pub fn fail_users(&self, down: bool) {
        self.users_down.store(down, Ordering::SeqCst);
    }

    pub fn fail_groups(&self, down: bool) {
        self.groups_down.store(down, Ordering::SeqCst);
    }

    /// Calls answered with a fault so far.
    pub fn failed_calls(&self) -> usize {
        self.failed_calls.load(Ordering::SeqCst)
    }

    fn guard(&self, down: &AtomicBool) -> DirResult<()> {
        if down.load(Ordering::SeqCst) {
            self.failed_calls.fetch_add(1, Ordering::SeqCst);
            Err(transient_fault())
        } else {
            Ok(())
        }
    }
}

impl UserDirectory for FlakyDirectory {
    fn user_exists(&self, username: &Username) -> DirResult<bool> {
        self.guard(&self.users_down)?;
        self.inner.user_exists(username)
    }

    fn insert_user(&self, username: &Username, secret: &str) -> DirResult<()> {
        self.guard(&self.users_down)?;
        self.inner.insert_user(username, secret)
    }

    fn credentials_match(&self, username: &Username, secret: &str) -> DirResult<bool> {
        self.guard(&self.users_down)?;
        self.inner.credentials_match(username, secret)
    }
}

impl GroupDirectory for FlakyDirectory {
    fn group_exists(&self, id: &GroupId) -> DirResult<bool> {
        self.guard(&self.groups_down)?;
        self.inner.group_exists(id)
    }

    fn get_group(&self, id: &GroupId) -> DirResult<Option<Group>> {
        self.guard(&self.groups_down)?;
        self.inner.get_group(id)
    }

    fn groups_of(&self, member: &Username) -> DirResult<Vec<GroupId>> {
        self.guard(&self.groups_down)?;
        self.inner.groups_of(member)
    }

    fn create_group(&self, creator: &Username) -> DirResult<Group> {
        self.guard(&self.groups_down)?;
        self.inner.create_group(creator)
    }

    fn add_member(&self, id: &GroupId, member: &Username) -> DirResult<Group> {
        self.guard(&self.groups_down)?;
        self.inner.add_member(id, member)
    }

    fn transfer_coin_if_holder(
        &self,
        id: &GroupId,
        expected_holder: &Username,
        expected_coin: u64,
        new_holder: &Username,
    ) -> DirResult<Group> {
        self.guard(&self.groups_down)?;
        self.inner
            .transfer_coin_if_holder(id, expected_holder, expected_coin, new_holder)
    }
}
