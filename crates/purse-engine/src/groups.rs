use crate::collaborators::CollaboratorSet;
use crate::policy::TierPolicy;
use crate::storage::StateStore;
use crate::transfer::{refuse_archived, TransferEngine};
use crate::vault::AccountVault;
use chrono::{DateTime, Utc};
use purse_types::{
    AccountId, Amount, Contribution, EntryKind, GroupId, GroupMember, LedgerEntry, PaymentMethod,
    PoolGroup, PurseError, PurseResult,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::info;

/// A pool group with its membership and contribution history. This is the
/// unit of locking and of persistence: one row guard covers all three, and
/// the whole value is mirrored as one snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupState {
    pub group: PoolGroup,
    pub members: Vec<GroupMember>,
    pub contributions: Vec<Contribution>,
}

impl GroupState {
    pub fn new(group: PoolGroup, creator_member: GroupMember) -> Self {
        Self {
            group,
            members: vec![creator_member],
            contributions: Vec::new(),
        }
    }

    pub fn member_for(&self, account: &AccountId) -> Option<&GroupMember> {
        self.members.iter().find(|m| &m.account_id == account)
    }

    fn member_for_mut(&mut self, account: &AccountId) -> Option<&mut GroupMember> {
        self.members.iter_mut().find(|m| &m.account_id == account)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Creator and promoted members both count as admins; the creator's
    /// own membership row is created with the flag set.
    pub fn is_admin(&self, account: &AccountId) -> bool {
        self.member_for(account).map(|m| m.is_admin).unwrap_or(false)
    }

    /// A group accepts contributions until it is terminated, even past the
    /// deadline.
    pub fn accepts_contributions(&self) -> bool {
        self.group.is_active && !self.group.is_terminated
    }
}

/// Registry of live group rows, keyed by group id. The map guard is only
/// ever held for map operations, never across a row-lock await.
#[derive(Default)]
pub struct GroupDirectory {
    groups: RwLock<HashMap<GroupId, Arc<AsyncMutex<GroupState>>>>,
}

impl GroupDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the registry from hydrated snapshots.
    pub fn from_states(states: Vec<GroupState>) -> Self {
        let groups = states
            .into_iter()
            .map(|state| (state.group.id.clone(), Arc::new(AsyncMutex::new(state))))
            .collect();
        Self {
            groups: RwLock::new(groups),
        }
    }

    pub async fn insert(&self, state: GroupState) -> Arc<AsyncMutex<GroupState>> {
        let handle = Arc::new(AsyncMutex::new(state.clone()));
        self.groups
            .write()
            .await
            .insert(state.group.id, handle.clone());
        handle
    }

    pub async fn handle(&self, id: &GroupId) -> PurseResult<Arc<AsyncMutex<GroupState>>> {
        self.groups
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| PurseError::GroupNotFound(id.clone()))
    }

    pub async fn snapshot(&self, id: &GroupId) -> PurseResult<GroupState> {
        let handle = self.handle(id).await?;
        let guard = handle.lock().await;
        Ok(guard.clone())
    }

    async fn remove(&self, id: &GroupId) {
        self.groups.write().await.remove(id);
    }

    pub async fn handles(&self) -> Vec<Arc<AsyncMutex<GroupState>>> {
        self.groups.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.groups.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.groups.read().await.is_empty()
    }
}

/// Pooled-contribution group lifecycle: creation, joining, contributions,
/// disbursement and deletion. Termination voting lives in the termination
/// coordinator; both operate on the same directory rows.
pub struct GroupManager {
    directory: Arc<GroupDirectory>,
    vault: Arc<AccountVault>,
    transfers: Arc<TransferEngine>,
    store: Arc<StateStore>,
    policy: TierPolicy,
    collaborators: CollaboratorSet,
}

impl GroupManager {
    pub fn new(
        directory: Arc<GroupDirectory>,
        vault: Arc<AccountVault>,
        transfers: Arc<TransferEngine>,
        store: Arc<StateStore>,
        policy: TierPolicy,
        collaborators: CollaboratorSet,
    ) -> Self {
        Self {
            directory,
            vault,
            transfers,
            store,
            policy,
            collaborators,
        }
    }

    /// Create a group. The creator joins as an admin member with zero
    /// contribution, the requested capacity is clamped to the creator's
    /// tier ceiling, and the tier is snapshotted so later subscription
    /// changes do not resize existing groups.
    pub async fn create_group(
        &self,
        creator: &AccountId,
        name: impl Into<String>,
        target_amount: Option<Amount>,
        requested_capacity: u32,
        deadline: DateTime<Utc>,
    ) -> PurseResult<GroupState> {
        if let Some(target) = target_amount {
            PurseError::require_positive(target)?;
        }
        let now = Utc::now();
        if deadline <= now {
            return Err(PurseError::InvalidDeadline {
                reason: "deadline must be in the future".into(),
            });
        }

        let handle = self.vault.handle(creator).await?;
        let mut guard = handle.lock().await;
        refuse_archived(&guard)?;
        self.policy
            .check_group_creation(guard.tier, guard.groups_created)?;
        let capacity = self
            .policy
            .effective_capacity(guard.tier, requested_capacity.max(1));

        let group = PoolGroup::new(
            name,
            creator.clone(),
            target_amount,
            capacity,
            guard.tier,
            deadline,
            now,
        );
        let creator_member = GroupMember::new(group.id.clone(), creator.clone(), true, now);
        let state = GroupState::new(group, creator_member);

        let mut updated = guard.clone();
        updated.groups_created += 1;
        updated.updated_at = now;

        self.store.persist_group(&state, Some(&updated)).await?;
        *guard = updated;
        drop(guard);

        self.directory.insert(state.clone()).await;
        info!(
            group = %state.group.id,
            creator = %creator,
            capacity = state.group.max_capacity,
            "group created"
        );
        Ok(state)
    }

    /// Join an existing group as a regular member. The block-policy
    /// collaborator is consulted before the group row is locked; capacity
    /// and duplicate membership are re-checked under the lock.
    pub async fn join_group(
        &self,
        group_id: &GroupId,
        account: &AccountId,
    ) -> PurseResult<GroupMember> {
        let joiner = self.vault.snapshot(account).await?;
        refuse_archived(&joiner)?;

        let handle = self.directory.handle(group_id).await?;
        let creator = handle.lock().await.group.creator.clone();
        if self
            .collaborators
            .block_policy
            .is_blocked(account, &creator)
            .await
        {
            return Err(PurseError::forbidden("join this group"));
        }

        let mut guard = handle.lock().await;
        if !guard.accepts_contributions() {
            return Err(PurseError::GroupInactive);
        }
        if guard.member_for(account).is_some() {
            return Err(PurseError::AlreadyMember);
        }
        if guard.member_count() >= guard.group.max_capacity as usize {
            return Err(PurseError::GroupFull {
                capacity: guard.group.max_capacity,
            });
        }

        let now = Utc::now();
        let mut updated = guard.clone();
        let member = GroupMember::new(group_id.clone(), account.clone(), false, now);
        updated.members.push(member.clone());
        updated.group.updated_at = now;

        self.store.persist_group(&updated, None).await?;
        *guard = updated;
        drop(guard);

        info!(group = %group_id, account = %account, member = %member.id, "member joined");
        Ok(member)
    }

    /// Contribute to the pool. The member's wallet is debited, the pool
    /// total and the member's lifetime total grow by the same amount, and
    /// the contribution row keeps the ledger entry token for audit. The
    /// goal hook fires after all locks are released, once per crossing.
    pub async fn contribute(
        &self,
        group_id: &GroupId,
        account: &AccountId,
        amount: Amount,
    ) -> PurseResult<Contribution> {
        PurseError::require_positive(amount)?;

        let handle = self.directory.handle(group_id).await?;
        let mut guard = handle.lock().await;
        if !guard.accepts_contributions() {
            return Err(PurseError::GroupInactive);
        }
        let member_id = guard
            .member_for(account)
            .map(|m| m.id.clone())
            .ok_or_else(|| PurseError::MemberNotFound {
                group: group_id.clone(),
                account: account.clone(),
            })?;

        let now = Utc::now();
        let entry = LedgerEntry::completed(
            EntryKind::Contribution,
            Some(account.clone()),
            None,
            amount,
            PaymentMethod::Wallet,
            now,
        );
        let contribution = Contribution::new(
            group_id.clone(),
            member_id,
            amount,
            entry.token.clone(),
            now,
        );

        let reached_before = guard.group.target_reached();
        let mut updated = guard.clone();
        updated.group.current_amount = updated
            .group
            .current_amount
            .checked_add(amount)
            .ok_or_else(|| PurseError::InvariantViolation("pool total overflow".into()))?;
        {
            let member = updated
                .member_for_mut(account)
                .ok_or_else(|| PurseError::InvariantViolation("member row vanished".into()))?;
            member.total_contributed = member
                .total_contributed
                .checked_add(amount)
                .ok_or_else(|| PurseError::InvariantViolation("member total overflow".into()))?;
        }
        updated.contributions.push(contribution.clone());
        updated.group.updated_at = now;

        // Debits the wallet and persists the entry, the account row and
        // this group snapshot in one storage transaction.
        self.transfers
            .debit_for_contribution(account, entry, &updated)
            .await?;

        let crossed = !reached_before && updated.group.target_reached();
        let goal_snapshot = crossed.then(|| updated.group.clone());
        *guard = updated;
        drop(guard);

        if let Some(group) = goal_snapshot {
            self.collaborators.goal_hook.goal_reached(&group).await;
        }

        info!(
            group = %group_id,
            account = %account,
            amount = %amount,
            token = %contribution.entry_token,
            "contribution recorded"
        );
        Ok(contribution)
    }

    /// Refund every member's total contribution after termination, one
    /// audited ledger entry per member. Refund amounts are exact minor
    /// units, so the pool drains to zero with no residue. Archived members
    /// are still refunded.
    pub async fn disburse_on_termination(
        &self,
        group_id: &GroupId,
        caller: &AccountId,
    ) -> PurseResult<Vec<LedgerEntry>> {
        let handle = self.directory.handle(group_id).await?;
        let mut guard = handle.lock().await;
        if !guard.is_admin(caller) {
            return Err(PurseError::forbidden("disburse this group"));
        }
        if !guard.group.is_terminated {
            return Err(PurseError::NotTerminated);
        }

        let refunds: Vec<(AccountId, Amount)> = guard
            .members
            .iter()
            .filter(|m| !m.total_contributed.is_zero())
            .map(|m| (m.account_id.clone(), m.total_contributed))
            .collect();

        let mut entries = Vec::with_capacity(refunds.len());
        for (member_account, refund) in refunds {
            let now = Utc::now();
            // Pool payouts are transfers with no source account; the pool
            // itself is not a wallet.
            let entry = LedgerEntry::completed(
                EntryKind::Transfer,
                None,
                Some(member_account.clone()),
                refund,
                PaymentMethod::Wallet,
                now,
            );

            let mut updated = guard.clone();
            updated.group.current_amount = updated
                .group
                .current_amount
                .checked_sub(refund)
                .ok_or_else(|| PurseError::InvariantViolation("pool refund underflow".into()))?;
            {
                let member = updated
                    .member_for_mut(&member_account)
                    .ok_or_else(|| PurseError::InvariantViolation("member row vanished".into()))?;
                member.total_contributed = Amount::zero();
            }
            updated.group.updated_at = now;

            let entry = self
                .transfers
                .credit_from_pool(&member_account, entry, &updated)
                .await?;
            *guard = updated;
            entries.push(entry);
        }
        drop(guard);

        info!(group = %group_id, refunds = entries.len(), "termination disbursement completed");
        Ok(entries)
    }

    /// Delete a terminated, past-deadline, fully disbursed group. Only the
    /// creator may delete; doing so frees one slot of their creation quota.
    pub async fn delete_group(&self, group_id: &GroupId, caller: &AccountId) -> PurseResult<()> {
        let handle = self.directory.handle(group_id).await?;
        let guard = handle.lock().await;
        if caller != &guard.group.creator {
            return Err(PurseError::forbidden("delete this group"));
        }
        let now = Utc::now();
        if !guard.group.deadline_passed(now) {
            return Err(PurseError::DeleteNotAllowed {
                reason: "deadline has not passed".into(),
            });
        }
        if !guard.group.is_terminated {
            return Err(PurseError::DeleteNotAllowed {
                reason: "group has not been terminated".into(),
            });
        }
        if !guard.group.current_amount.is_zero() {
            return Err(PurseError::FundsRemaining {
                amount: guard.group.current_amount,
            });
        }

        let account_handle = self.vault.handle(caller).await?;
        let mut account_guard = account_handle.lock().await;
        let mut updated_account = account_guard.clone();
        updated_account.groups_created = updated_account.groups_created.saturating_sub(1);
        updated_account.updated_at = now;

        self.store.remove_group(group_id, &updated_account).await?;
        *account_guard = updated_account;
        drop(account_guard);

        // Unmap while still holding the row guard so no new operation can
        // slip in between the mirror delete and the registry removal.
        self.directory.remove(group_id).await;
        drop(guard);

        info!(group = %group_id, creator = %caller, "group deleted");
        Ok(())
    }

    pub async fn group_snapshot(&self, group_id: &GroupId) -> PurseResult<GroupState> {
        self.directory.snapshot(group_id).await
    }

    pub async fn members(&self, group_id: &GroupId) -> PurseResult<Vec<GroupMember>> {
        Ok(self.directory.snapshot(group_id).await?.members)
    }

    pub async fn contributions(&self, group_id: &GroupId) -> PurseResult<Vec<Contribution>> {
        Ok(self.directory.snapshot(group_id).await?.contributions)
    }

    /// All groups the account belongs to, creator or member.
    pub async fn groups_for_account(&self, account: &AccountId) -> Vec<GroupState> {
        let mut memberships = Vec::new();
        for handle in self.directory.handles().await {
            let guard = handle.lock().await;
            if guard.member_for(account).is_some() {
                memberships.push(guard.clone());
            }
        }
        memberships
    }
}
