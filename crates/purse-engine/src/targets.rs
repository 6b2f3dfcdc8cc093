use crate::groups::GroupDirectory;
use crate::ledger::TransactionLedger;
use crate::storage::StateStore;
use crate::transfer::refuse_archived;
use crate::vault::AccountVault;
use chrono::{DateTime, Utc};
use purse_types::{
    AccountId, Amount, EntryKind, LedgerEntry, LockPolicy, PaymentMethod, PurseError, PurseResult,
    SavingsTarget, TargetId, TargetOwner,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::info;

/// Savings targets for accounts and groups: ring-fenced balances with a
/// goal and a withdrawal policy. Target rows follow the account-row locking
/// discipline; when both an account and a target move, the account row is
/// locked first.
pub struct TargetManager {
    targets: RwLock<HashMap<TargetId, Arc<AsyncMutex<SavingsTarget>>>>,
    by_owner: RwLock<HashMap<TargetOwner, TargetId>>,
    directory: Arc<GroupDirectory>,
    vault: Arc<AccountVault>,
    ledger: Arc<TransactionLedger>,
    store: Arc<StateStore>,
}

impl TargetManager {
    pub fn new(
        directory: Arc<GroupDirectory>,
        vault: Arc<AccountVault>,
        ledger: Arc<TransactionLedger>,
        store: Arc<StateStore>,
    ) -> Self {
        Self {
            targets: RwLock::new(HashMap::new()),
            by_owner: RwLock::new(HashMap::new()),
            directory,
            vault,
            ledger,
            store,
        }
    }

    /// Rehydrate the target registry at bootstrap.
    pub fn with_targets(self, targets: Vec<SavingsTarget>) -> Self {
        let mut rows = HashMap::new();
        let mut by_owner = HashMap::new();
        for target in targets {
            by_owner.insert(target.owner.clone(), target.id.clone());
            rows.insert(target.id.clone(), Arc::new(AsyncMutex::new(target)));
        }
        Self {
            targets: RwLock::new(rows),
            by_owner: RwLock::new(by_owner),
            ..self
        }
    }

    /// Create a savings target. An account owner creates their own; a
    /// group-owned target takes a group admin. One live target per owner.
    pub async fn create_target(
        &self,
        owner: TargetOwner,
        caller: &AccountId,
        name: impl Into<String>,
        target_amount: Amount,
        policy: LockPolicy,
        maturity_date: Option<DateTime<Utc>>,
    ) -> PurseResult<SavingsTarget> {
        PurseError::require_positive(target_amount)?;
        if policy == LockPolicy::LockedTime && maturity_date.is_none() {
            return Err(PurseError::MissingMaturityDate);
        }
        self.authorize_owner_action(&owner, caller, "create a target for this owner")
            .await?;
        if let TargetOwner::Account(account) = &owner {
            let snapshot = self.vault.snapshot(account).await?;
            refuse_archived(&snapshot)?;
        }

        let now = Utc::now();
        let target = SavingsTarget::new(owner.clone(), name, target_amount, policy, maturity_date, now);

        // The owner index write lock spans the uniqueness check and the
        // mirror write, so two racing creates cannot both land.
        let mut by_owner = self.by_owner.write().await;
        if by_owner.contains_key(&owner) {
            return Err(PurseError::TargetExists);
        }
        self.store.persist_target(&target).await?;
        by_owner.insert(owner, target.id.clone());
        self.targets
            .write()
            .await
            .insert(target.id.clone(), Arc::new(AsyncMutex::new(target.clone())));
        drop(by_owner);

        info!(target = %target.id, name = %target.name, "savings target created");
        Ok(target)
    }

    /// Move funds from the caller's wallet into the target. Crossing the
    /// goal latches `achieved` once; further contributions stay allowed.
    pub async fn contribute(
        &self,
        target_id: &TargetId,
        caller: &AccountId,
        amount: Amount,
    ) -> PurseResult<SavingsTarget> {
        PurseError::require_positive(amount)?;
        let owner = self.handle(target_id).await?.lock().await.owner.clone();
        self.authorize_contribution(&owner, caller).await?;

        let account_handle = self.vault.handle(caller).await?;
        let mut account_guard = account_handle.lock().await;
        refuse_archived(&account_guard)?;
        let target_handle = self.handle(target_id).await?;
        let mut target_guard = target_handle.lock().await;

        let now = Utc::now();
        let mut updated_account = account_guard.clone();
        let mut updated_target = target_guard.clone();
        updated_account.debit(amount, now)?;
        updated_target.credit(amount, now)?;

        let entry = LedgerEntry::completed(
            EntryKind::Contribution,
            Some(caller.clone()),
            None,
            amount,
            PaymentMethod::Wallet,
            now,
        );
        self.ledger
            .record(entry, &[&updated_account], None, Some(&updated_target))
            .await?;
        *account_guard = updated_account;
        let snapshot = updated_target.clone();
        *target_guard = updated_target;

        info!(target = %target_id, account = %caller, amount = %amount, "target contribution");
        Ok(snapshot)
    }

    /// Move funds from the target back to the caller's wallet, subject to
    /// the policy gate and the saved balance.
    pub async fn withdraw(
        &self,
        target_id: &TargetId,
        caller: &AccountId,
        amount: Amount,
    ) -> PurseResult<SavingsTarget> {
        PurseError::require_positive(amount)?;
        let owner = self.handle(target_id).await?.lock().await.owner.clone();
        self.authorize_owner_action(&owner, caller, "withdraw from this target")
            .await?;

        let account_handle = self.vault.handle(caller).await?;
        let mut account_guard = account_handle.lock().await;
        refuse_archived(&account_guard)?;
        let target_handle = self.handle(target_id).await?;
        let mut target_guard = target_handle.lock().await;

        let now = Utc::now();
        target_guard.withdrawal_gate(now)?;

        let mut updated_account = account_guard.clone();
        let mut updated_target = target_guard.clone();
        updated_target.debit(amount, now)?;
        updated_account.credit(amount, now)?;

        let entry = LedgerEntry::completed(
            EntryKind::Transfer,
            None,
            Some(caller.clone()),
            amount,
            PaymentMethod::Wallet,
            now,
        );
        self.ledger
            .record(entry, &[&updated_account], None, Some(&updated_target))
            .await?;
        *account_guard = updated_account;
        let snapshot = updated_target.clone();
        *target_guard = updated_target;

        info!(target = %target_id, account = %caller, amount = %amount, "target withdrawal");
        Ok(snapshot)
    }

    /// Change the withdrawal policy.
    pub async fn lock(
        &self,
        target_id: &TargetId,
        caller: &AccountId,
        policy: LockPolicy,
        maturity_date: Option<DateTime<Utc>>,
    ) -> PurseResult<SavingsTarget> {
        if policy == LockPolicy::LockedTime && maturity_date.is_none() {
            return Err(PurseError::MissingMaturityDate);
        }
        let handle = self.handle(target_id).await?;
        let owner = handle.lock().await.owner.clone();
        self.authorize_owner_action(&owner, caller, "lock this target")
            .await?;

        let mut guard = handle.lock().await;
        let mut updated = guard.clone();
        updated.policy = policy;
        updated.maturity_date = maturity_date;
        updated.updated_at = Utc::now();

        self.store.persist_target(&updated).await?;
        let snapshot = updated.clone();
        *guard = updated;

        info!(target = %target_id, policy = ?snapshot.policy, "target lock changed");
        Ok(snapshot)
    }

    /// Remove the lock. A plain lock lifts freely; a time or goal lock is
    /// re-validated, so it cannot be lifted before maturity or the goal.
    pub async fn unlock(&self, target_id: &TargetId, caller: &AccountId) -> PurseResult<SavingsTarget> {
        let handle = self.handle(target_id).await?;
        let owner = handle.lock().await.owner.clone();
        self.authorize_owner_action(&owner, caller, "unlock this target")
            .await?;

        let mut guard = handle.lock().await;
        match guard.policy {
            LockPolicy::Unlocked | LockPolicy::Locked => {}
            LockPolicy::LockedTime | LockPolicy::LockedGoal => {
                guard.withdrawal_gate(Utc::now())?;
            }
        }

        let mut updated = guard.clone();
        updated.policy = LockPolicy::Unlocked;
        updated.updated_at = Utc::now();

        self.store.persist_target(&updated).await?;
        let snapshot = updated.clone();
        *guard = updated;

        info!(target = %target_id, "target unlocked");
        Ok(snapshot)
    }

    pub async fn target(&self, target_id: &TargetId) -> PurseResult<SavingsTarget> {
        let handle = self.handle(target_id).await?;
        let guard = handle.lock().await;
        Ok(guard.clone())
    }

    pub async fn target_for_owner(&self, owner: &TargetOwner) -> Option<SavingsTarget> {
        let id = self.by_owner.read().await.get(owner).cloned()?;
        let handle = self.targets.read().await.get(&id).cloned()?;
        let guard = handle.lock().await;
        Some(guard.clone())
    }

    async fn handle(&self, id: &TargetId) -> PurseResult<Arc<AsyncMutex<SavingsTarget>>> {
        self.targets
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| PurseError::TargetNotFound(id.clone()))
    }

    /// Owner-level actions: the owning account itself, or any admin of the
    /// owning group.
    async fn authorize_owner_action(
        &self,
        owner: &TargetOwner,
        caller: &AccountId,
        action: &str,
    ) -> PurseResult<()> {
        match owner {
            TargetOwner::Account(account) => {
                if account != caller {
                    return Err(PurseError::forbidden(action));
                }
                Ok(())
            }
            TargetOwner::Group(group_id) => {
                let state = self.directory.snapshot(group_id).await?;
                if !state.is_admin(caller) {
                    return Err(PurseError::forbidden(action));
                }
                Ok(())
            }
        }
    }

    /// Contributions are wider than owner actions: any member of the owning
    /// group may pay into a group target.
    async fn authorize_contribution(
        &self,
        owner: &TargetOwner,
        caller: &AccountId,
    ) -> PurseResult<()> {
        match owner {
            TargetOwner::Account(account) => {
                if account != caller {
                    return Err(PurseError::forbidden("contribute to this target"));
                }
                Ok(())
            }
            TargetOwner::Group(group_id) => {
                let state = self.directory.snapshot(group_id).await?;
                if state.member_for(caller).is_none() {
                    return Err(PurseError::MemberNotFound {
                        group: group_id.clone(),
                        account: caller.clone(),
                    });
                }
                Ok(())
            }
        }
    }
}
