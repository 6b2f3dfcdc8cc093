use crate::groups::GroupDirectory;
use crate::storage::StateStore;
use chrono::{DateTime, Utc};
use purse_types::{AccountId, GroupId, PurseError, PurseResult};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// Outcome of one termination vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TerminationTally {
    pub agreed: usize,
    pub total_active: usize,
    pub terminated: bool,
}

/// Read-model of a group's lifecycle flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupStatus {
    pub is_matured: bool,
    pub is_terminated: bool,
    pub is_active: bool,
    pub termination_agreed: usize,
    pub termination_total: usize,
}

/// Unanimous-consent termination. A group past its deadline terminates the
/// instant every member has voted; there is no scheduled sweep, maturation
/// is derived whenever a row is read.
pub struct TerminationCoordinator {
    directory: Arc<GroupDirectory>,
    store: Arc<StateStore>,
}

impl TerminationCoordinator {
    pub fn new(directory: Arc<GroupDirectory>, store: Arc<StateStore>) -> Self {
        Self { directory, store }
    }

    /// Record one member's termination vote. Voting is idempotent per
    /// member; the vote that completes unanimity flips `is_terminated` and
    /// `is_active` in the same critical section.
    pub async fn request_termination(
        &self,
        group_id: &GroupId,
        account: &AccountId,
    ) -> PurseResult<TerminationTally> {
        let handle = self.directory.handle(group_id).await?;
        let mut guard = handle.lock().await;

        let member_id = guard
            .member_for(account)
            .map(|m| m.id.clone())
            .ok_or_else(|| PurseError::forbidden("request termination for this group"))?;

        if guard.group.is_terminated {
            return Ok(TerminationTally {
                agreed: guard.group.termination_votes.len(),
                total_active: guard.member_count(),
                terminated: true,
            });
        }

        let now = Utc::now();
        if !guard.group.deadline_passed(now) {
            return Err(PurseError::TooEarly {
                deadline: guard.group.deadline,
            });
        }

        let mut updated = guard.clone();
        updated.group.is_matured = true;
        updated.group.termination_votes.insert(member_id);

        let everyone: BTreeSet<_> = updated.members.iter().map(|m| m.id.clone()).collect();
        let unanimous = updated.group.termination_votes.is_superset(&everyone);
        if unanimous {
            updated.group.is_terminated = true;
            updated.group.is_active = false;
        }
        updated.group.updated_at = now;

        self.store.persist_group(&updated, None).await?;
        let tally = TerminationTally {
            agreed: updated.group.termination_votes.len(),
            total_active: updated.member_count(),
            terminated: updated.group.is_terminated,
        };
        *guard = updated;
        drop(guard);

        if tally.terminated {
            info!(group = %group_id, votes = tally.agreed, "group terminated by unanimous consent");
        } else {
            info!(
                group = %group_id,
                account = %account,
                agreed = tally.agreed,
                total = tally.total_active,
                "termination vote recorded"
            );
        }
        Ok(tally)
    }

    /// Push the deadline out. Clears the vote set and the maturation flag,
    /// opening a fresh consensus window.
    pub async fn extend_deadline(
        &self,
        group_id: &GroupId,
        caller: &AccountId,
        new_deadline: DateTime<Utc>,
    ) -> PurseResult<()> {
        let handle = self.directory.handle(group_id).await?;
        let mut guard = handle.lock().await;
        if !guard.is_admin(caller) {
            return Err(PurseError::forbidden("extend this group's deadline"));
        }
        if guard.group.is_terminated {
            return Err(PurseError::GroupInactive);
        }
        let now = Utc::now();
        if new_deadline <= now {
            return Err(PurseError::InvalidDeadline {
                reason: "new deadline must be in the future".into(),
            });
        }

        let mut updated = guard.clone();
        updated.group.deadline = new_deadline;
        updated.group.is_matured = false;
        updated.group.termination_votes.clear();
        updated.group.updated_at = now;

        self.store.persist_group(&updated, None).await?;
        *guard = updated;
        drop(guard);

        info!(group = %group_id, deadline = %new_deadline, "deadline extended");
        Ok(())
    }

    /// Lifecycle flags, with maturation derived on read. The first read
    /// past the deadline persists the flipped flag.
    pub async fn group_status(&self, group_id: &GroupId) -> PurseResult<GroupStatus> {
        let handle = self.directory.handle(group_id).await?;
        let mut guard = handle.lock().await;

        let now = Utc::now();
        if guard.group.deadline_passed(now) && !guard.group.is_matured {
            let mut updated = guard.clone();
            updated.group.is_matured = true;
            updated.group.updated_at = now;
            self.store.persist_group(&updated, None).await?;
            *guard = updated;
        }

        Ok(GroupStatus {
            is_matured: guard.group.is_matured,
            is_terminated: guard.group.is_terminated,
            is_active: guard.group.is_active,
            termination_agreed: guard.group.termination_votes.len(),
            termination_total: guard.member_count(),
        })
    }
}
