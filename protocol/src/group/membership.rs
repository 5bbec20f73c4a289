//! Creating, joining and looking up groups.

use std::sync::Arc;

use super::{Group, GroupError, GroupId};
use crate::identity::Username;
use crate::retry::RetryPolicy;
use crate::storage::GroupDirectory;

pub struct Membership<G: GroupDirectory> {
    groups: Arc<G>,
    retry: RetryPolicy,
}

impl<G: GroupDirectory> Membership<G> {
    pub fn new(groups: Arc<G>, retry: RetryPolicy) -> Self {
        Self { groups, retry }
    }

    /// Creates a group owned by `creator`, who starts out holding coin 1.
    pub fn create(&self, creator: &Username) -> Result<Group, GroupError> {
        Ok(self
            .retry
            .run("create_group", || self.groups.create_group(creator))?)
    }

    /// Adds `member` to `group_id`. Holder and coin counter are untouched.
    pub fn join(&self, member: &Username, group_id: &GroupId) -> Result<Group, GroupError> {
        let result = self
            .retry
            .run("add_member", || self.groups.add_member(group_id, member))
            .map_err(GroupError::from);

        match &result {
            Ok(group) => tracing::info!(
                group = %group_id,
                member = %member,
                members = group.members.len(),
                "member joined group"
            ),
            Err(err) => tracing::info!(group = %group_id, member = %member, error = %err, "join rejected"),
        }
        result
    }

    /// The first group `member` belongs to, in join order.
    pub fn group_of(&self, member: &Username) -> Result<Group, GroupError> {
        let ids = self
            .retry
            .run("groups_of", || self.groups.groups_of(member))?;

        for id in ids {
            if let Some(group) = self.retry.run("get_group", || self.groups.get_group(&id))? {
                return Ok(group);
            }
        }
        Err(GroupError::NoGroupFor(member.clone()))
    }
}
