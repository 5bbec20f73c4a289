//! Coin custody: who may pass a group's coin, and to whom it goes.
//!
//! A transfer reads the group, checks that the requester is the current
//! holder, draws the next holder, then commits through
//! [`GroupDirectory::transfer_coin_if_holder`] conditioned on the holder and
//! counter it read. If another transfer committed in between, the condition
//! fails and this one is rejected with [`GroupError::StaleHolder`].

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use super::{Group, GroupError, GroupId};
use crate::identity::Username;
use crate::retry::RetryPolicy;
use crate::storage::GroupDirectory;

/// Whether the outgoing holder may be drawn as the next holder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReselectionPolicy {
    /// Draw from every member except the outgoing holder. A group of one
    /// keeps its holder.
    #[default]
    ExcludeOutgoing,
    /// Draw from every member, outgoing holder included.
    IncludeOutgoing,
}

impl FromStr for ReselectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exclude" | "exclude_outgoing" => Ok(Self::ExcludeOutgoing),
            "include" | "include_outgoing" => Ok(Self::IncludeOutgoing),
            other => Err(format!("unknown reselection policy: {other}")),
        }
    }
}

impl ReselectionPolicy {
    /// Members eligible to receive the coin from `group.holder`.
    pub fn candidates<'g>(&self, group: &'g Group) -> Vec<&'g Username> {
        match self {
            Self::IncludeOutgoing => group.members.iter().collect(),
            Self::ExcludeOutgoing => {
                let others: Vec<_> = group
                    .members
                    .iter()
                    .filter(|m| **m != group.holder)
                    .collect();
                if others.is_empty() {
                    vec![&group.holder]
                } else {
                    others
                }
            }
        }
    }
}

/// The committed outcome of a successful pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinTransfer {
    pub group_id: GroupId,
    pub previous_holder: Username,
    pub new_holder: Username,
    /// Counter value after the transfer.
    pub coin: u64,
}

/// Authorizes and performs coin transfers against a [`GroupDirectory`].
pub struct CoinCustody<G: GroupDirectory> {
    groups: Arc<G>,
    policy: ReselectionPolicy,
    retry: RetryPolicy,
}

impl<G: GroupDirectory> CoinCustody<G> {
    pub fn new(groups: Arc<G>, policy: ReselectionPolicy, retry: RetryPolicy) -> Self {
        Self {
            groups,
            policy,
            retry,
        }
    }

    pub fn policy(&self) -> ReselectionPolicy {
        self.policy
    }

    /// Passes the coin of `group_id` on behalf of `requester`.
    pub fn pass_coin(
        &self,
        requester: &Username,
        group_id: &GroupId,
    ) -> Result<CoinTransfer, GroupError> {
        self.pass_coin_with(requester, group_id, &mut rand::thread_rng())
    }

    /// [`pass_coin`](Self::pass_coin) with a caller-supplied RNG.
    pub fn pass_coin_with<R: Rng + ?Sized>(
        &self,
        requester: &Username,
        group_id: &GroupId,
        rng: &mut R,
    ) -> Result<CoinTransfer, GroupError> {
        let group = self
            .retry
            .run("get_group", || self.groups.get_group(group_id))?
            .ok_or_else(|| GroupError::GroupNotFound(group_id.clone()))?;

        if !group.is_holder(requester) {
            tracing::info!(
                group = %group_id,
                requester = %requester,
                holder = %group.holder,
                "coin transfer refused: requester is not the holder"
            );
            return Err(GroupError::NotAuthorizedHolder {
                group: group_id.clone(),
                requester: requester.clone(),
            });
        }

        // Never empty: the holder is always a member.
        let next = self
            .policy
            .candidates(&group)
            .choose(rng)
            .map(|m| (*m).clone())
            .unwrap_or_else(|| group.holder.clone());

        let committed = self
            .retry
            .run("transfer_coin_if_holder", || {
                self.groups
                    .transfer_coin_if_holder(group_id, requester, group.coin, &next)
            })
            .map_err(|err| {
                let err = GroupError::from(err);
                if matches!(err, GroupError::StaleHolder(_)) {
                    tracing::info!(
                        group = %group_id,
                        requester = %requester,
                        "coin transfer lost a race with a concurrent transfer"
                    );
                }
                err
            })?;

        tracing::info!(
            group = %group_id,
            from = %requester,
            to = %committed.holder,
            coin = committed.coin,
            "coin passed"
        );

        Ok(CoinTransfer {
            group_id: committed.id,
            previous_holder: requester.clone(),
            new_holder: committed.holder,
            coin: committed.coin,
        })
    }
}
