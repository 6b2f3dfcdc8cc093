//! Contribution groups: pooled funds with capacity, deadline, and
//! mutual-consent termination.

use crate::{AccountId, Amount, ContributionId, EntryToken, GroupId, MemberId, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A pooled contribution group.
///
/// `current_amount` only grows through member contributions; the single
/// exception is the audited disbursement that empties a terminated group.
/// Maturation is derived from the deadline at read time, never by a timer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolGroup {
    pub id: GroupId,
    pub name: String,
    pub creator: AccountId,
    /// Optional goal. When reached, the goal hook fires once per crossing.
    pub target_amount: Option<Amount>,
    pub current_amount: Amount,
    /// Effective member ceiling, already clamped by the creator's tier at
    /// creation time.
    pub max_capacity: u32,
    /// Creator tier when the group was created. Later tier changes do not
    /// retroactively resize the group.
    pub tier_snapshot: Tier,
    pub deadline: DateTime<Utc>,
    pub is_matured: bool,
    pub is_terminated: bool,
    pub is_active: bool,
    /// Members who have requested termination since the deadline passed.
    /// Cleared when the deadline is extended.
    pub termination_votes: BTreeSet<MemberId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PoolGroup {
    pub fn new(
        name: impl Into<String>,
        creator: AccountId,
        target_amount: Option<Amount>,
        max_capacity: u32,
        tier_snapshot: Tier,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: GroupId::generate(),
            name: name.into(),
            creator,
            target_amount,
            current_amount: Amount::zero(),
            max_capacity,
            tier_snapshot,
            deadline,
            is_matured: false,
            is_terminated: false,
            is_active: true,
            termination_votes: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }

    /// Whether the pooled total has reached the configured goal.
    pub fn target_reached(&self) -> bool {
        match self.target_amount {
            Some(target) => self.current_amount >= target,
            None => false,
        }
    }
}

/// Membership of one account in one group. Unique per (group, account).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupMember {
    pub id: MemberId,
    pub group_id: GroupId,
    pub account_id: AccountId,
    pub is_admin: bool,
    /// Lifetime sum of this member's contributions. Monotonic.
    pub total_contributed: Amount,
    pub joined_at: DateTime<Utc>,
}

impl GroupMember {
    pub fn new(group_id: GroupId, account_id: AccountId, is_admin: bool, now: DateTime<Utc>) -> Self {
        Self {
            id: MemberId::generate(),
            group_id,
            account_id,
            is_admin,
            total_contributed: Amount::zero(),
            joined_at: now,
        }
    }
}

/// One pooled contribution, linked to the ledger entry that debited the
/// member's wallet. Append-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Contribution {
    pub id: ContributionId,
    pub group_id: GroupId,
    pub member_id: MemberId,
    pub amount: Amount,
    pub entry_token: EntryToken,
    pub contributed_at: DateTime<Utc>,
}

impl Contribution {
    pub fn new(
        group_id: GroupId,
        member_id: MemberId,
        amount: Amount,
        entry_token: EntryToken,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ContributionId::generate(),
            group_id,
            member_id,
            amount,
            entry_token,
            contributed_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn target_reached_only_with_configured_goal() {
        let now = Utc::now();
        let mut group = PoolGroup::new(
            "trip",
            AccountId::new("acct-1"),
            None,
            5,
            Tier::Standard,
            now + Duration::days(30),
            now,
        );
        group.current_amount = Amount::from_major(1_000);
        assert!(!group.target_reached());

        group.target_amount = Some(Amount::from_major(300));
        assert!(group.target_reached());
    }

    #[test]
    fn deadline_boundary_is_inclusive() {
        let now = Utc::now();
        let group = PoolGroup::new(
            "rent",
            AccountId::new("acct-1"),
            None,
            5,
            Tier::Free,
            now,
            now - Duration::days(10),
        );
        assert!(group.deadline_passed(now));
        assert!(!group.deadline_passed(now - Duration::seconds(1)));
    }
}
