use crate::gateway::GatewayOutcome;
use crate::ledger::TransactionLedger;
use crate::policy::TierPolicy;
use crate::vault::AccountVault;
use chrono::Utc;
use purse_types::{
    Account, AccountId, Amount, EntryKind, EntryStatus, EntryToken, LedgerEntry, PaymentMethod,
    PurseError, PurseResult,
};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};

/// Atomic wallet operations.
///
/// Every operation validates its inputs before taking any lock, then holds
/// the affected account lock(s) across the whole read-check-write, recording
/// exactly one ledger entry in the same critical section. Validation and
/// precondition failures leave no trace in the ledger; the only persisted
/// failures are gateway entries that a provider declined.
pub struct TransferEngine {
    vault: Arc<AccountVault>,
    ledger: Arc<TransactionLedger>,
    policy: TierPolicy,
}

impl TransferEngine {
    pub fn new(vault: Arc<AccountVault>, ledger: Arc<TransactionLedger>, policy: TierPolicy) -> Self {
        Self {
            vault,
            ledger,
            policy,
        }
    }

    /// Credit `account` immediately. Wallet-internal deposits settle at
    /// creation; externally funded deposits go through the gateway flow.
    pub async fn deposit(
        &self,
        account: &AccountId,
        amount: Amount,
        method: PaymentMethod,
    ) -> PurseResult<LedgerEntry> {
        PurseError::require_positive(amount)?;
        let handle = self.vault.handle(account).await?;
        let mut guard = handle.lock().await;
        refuse_archived(&guard)?;

        let now = Utc::now();
        let mut updated = guard.clone();
        updated.credit(amount, now)?;

        let entry = LedgerEntry::completed(
            EntryKind::Deposit,
            None,
            Some(account.clone()),
            amount,
            method,
            now,
        );
        let entry = self.ledger.record(entry, &[&updated], None, None).await?;
        *guard = updated;

        info!(account = %account, amount = %amount, token = %entry.token, "deposit completed");
        Ok(entry)
    }

    /// Debit `account`, refusing to drive the balance negative.
    pub async fn withdraw(
        &self,
        account: &AccountId,
        amount: Amount,
        method: PaymentMethod,
    ) -> PurseResult<LedgerEntry> {
        PurseError::require_positive(amount)?;
        let handle = self.vault.handle(account).await?;
        let mut guard = handle.lock().await;
        refuse_archived(&guard)?;

        let now = Utc::now();
        let mut updated = guard.clone();
        updated.debit(amount, now)?;

        let entry = LedgerEntry::completed(
            EntryKind::Withdrawal,
            Some(account.clone()),
            None,
            amount,
            method,
            now,
        );
        let entry = self.ledger.record(entry, &[&updated], None, None).await?;
        *guard = updated;

        info!(account = %account, amount = %amount, token = %entry.token, "withdrawal completed");
        Ok(entry)
    }

    /// Move funds between two accounts. Both rows are locked for the whole
    /// operation, in ascending account-id order so concurrent transfers in
    /// opposite directions cannot deadlock. One entry records both sides.
    pub async fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> PurseResult<LedgerEntry> {
        PurseError::require_positive(amount)?;
        if from == to {
            return Err(PurseError::SelfTransfer);
        }

        let from_handle = self.vault.handle(from).await?;
        let to_handle = self.vault.handle(to).await?;
        let (mut from_guard, mut to_guard) =
            lock_ordered(from, from_handle, to, to_handle).await;
        refuse_archived(&from_guard)?;
        refuse_archived(&to_guard)?;

        let now = Utc::now();
        let mut updated_from = from_guard.clone();
        let mut updated_to = to_guard.clone();
        updated_from.debit(amount, now)?;
        updated_to.credit(amount, now)?;

        let entry = LedgerEntry::completed(
            EntryKind::Transfer,
            Some(from.clone()),
            Some(to.clone()),
            amount,
            PaymentMethod::Wallet,
            now,
        );
        let entry = self
            .ledger
            .record(entry, &[&updated_from, &updated_to], None, None)
            .await?;
        *from_guard = updated_from;
        *to_guard = updated_to;

        info!(from = %from, to = %to, amount = %amount, token = %entry.token, "transfer completed");
        Ok(entry)
    }

    /// Debit a purchase against the wallet, enforcing the tier's monthly
    /// purchase ceiling. The counter window is normalized lazily under the
    /// account lock; there is no scheduled reset.
    pub async fn record_purchase(
        &self,
        account: &AccountId,
        amount: Amount,
        method: PaymentMethod,
    ) -> PurseResult<LedgerEntry> {
        PurseError::require_positive(amount)?;
        let handle = self.vault.handle(account).await?;
        let mut guard = handle.lock().await;
        refuse_archived(&guard)?;

        let now = Utc::now();
        let mut updated = guard.clone();
        updated.normalize_purchase_window(now);
        self.policy
            .check_purchase(updated.tier, updated.purchases_this_month)?;
        updated.debit(amount, now)?;
        updated.purchases_this_month += 1;

        let entry = LedgerEntry::completed(
            EntryKind::Purchase,
            Some(account.clone()),
            None,
            amount,
            method,
            now,
        );
        let entry = self.ledger.record(entry, &[&updated], None, None).await?;
        *guard = updated;

        info!(
            account = %account,
            amount = %amount,
            purchases_this_month = guard.purchases_this_month,
            token = %entry.token,
            "purchase recorded"
        );
        Ok(entry)
    }

    /// Debit a pool contribution from the member's account. The caller holds
    /// the group lock and passes the post-contribution group state so the
    /// entry, the account row and the group snapshot land in one storage
    /// transaction.
    pub(crate) async fn debit_for_contribution(
        &self,
        account: &AccountId,
        entry: LedgerEntry,
        group_after: &crate::groups::GroupState,
    ) -> PurseResult<LedgerEntry> {
        let handle = self.vault.handle(account).await?;
        let mut guard = handle.lock().await;
        refuse_archived(&guard)?;

        let mut updated = guard.clone();
        updated.debit(entry.amount, entry.created_at)?;

        let entry = self
            .ledger
            .record(entry, &[&updated], Some(group_after), None)
            .await?;
        *guard = updated;
        Ok(entry)
    }

    /// Credit a pool refund back to a member's account. Archived members
    /// still receive refunds; the pool has to drain before deletion.
    pub(crate) async fn credit_from_pool(
        &self,
        account: &AccountId,
        entry: LedgerEntry,
        group_after: &crate::groups::GroupState,
    ) -> PurseResult<LedgerEntry> {
        let handle = self.vault.handle(account).await?;
        let mut guard = handle.lock().await;

        let mut updated = guard.clone();
        updated.credit(entry.amount, entry.created_at)?;

        let entry = self
            .ledger
            .record(entry, &[&updated], Some(group_after), None)
            .await?;
        *guard = updated;
        Ok(entry)
    }

    /// Open a pending gateway deposit. The entry is recorded before any
    /// provider call and the balance does not move.
    pub async fn initiate_gateway_deposit(
        &self,
        account: &AccountId,
        amount: Amount,
        method: PaymentMethod,
    ) -> PurseResult<LedgerEntry> {
        PurseError::require_positive(amount)?;
        let snapshot = self.vault.snapshot(account).await?;
        refuse_archived(&snapshot)?;

        let entry = LedgerEntry::pending(
            EntryKind::Deposit,
            account.clone(),
            amount,
            method,
            Utc::now(),
        );
        let entry = self.ledger.record_pending(entry).await?;

        info!(account = %account, amount = %amount, token = %entry.token, "gateway deposit pending");
        Ok(entry)
    }

    /// Settle a pending gateway deposit. Confirmation credits the balance
    /// and completes the entry in one critical section, exactly once;
    /// failure marks the entry failed and leaves the balance untouched.
    pub async fn settle_gateway_deposit(
        &self,
        token: &EntryToken,
        outcome: GatewayOutcome,
    ) -> PurseResult<LedgerEntry> {
        let pending = self.ledger.entry(token).await?;
        if pending.kind != EntryKind::Deposit {
            return Err(PurseError::InvariantViolation(format!(
                "entry {} is not a gateway deposit",
                token
            )));
        }
        let destination = pending.destination.clone().ok_or_else(|| {
            PurseError::InvariantViolation(format!("gateway entry {} has no destination", token))
        })?;

        let now = Utc::now();
        match outcome {
            GatewayOutcome::Confirmed => {
                let handle = self.vault.handle(&destination).await?;
                let mut guard = handle.lock().await;

                let mut updated = guard.clone();
                updated.credit(pending.amount, now)?;

                // The settle call re-checks pending status under the ledger
                // lock, so a racing settlement credits at most once.
                let entry = self
                    .ledger
                    .settle(token, EntryStatus::Completed, &[&updated], now)
                    .await?;
                *guard = updated;

                info!(
                    account = %destination,
                    amount = %entry.amount,
                    token = %token,
                    "gateway deposit completed"
                );
                Ok(entry)
            }
            GatewayOutcome::Failed { reason } => {
                let entry = self
                    .ledger
                    .settle(token, EntryStatus::Failed, &[], now)
                    .await?;
                warn!(account = %destination, token = %token, reason = %reason, "gateway deposit failed");
                Ok(entry)
            }
        }
    }
}

pub(crate) fn refuse_archived(account: &Account) -> PurseResult<()> {
    if account.archived {
        return Err(PurseError::AccountArchived);
    }
    Ok(())
}

/// Lock two account rows in ascending id order, returning the guards mapped
/// back to (from, to).
pub(crate) async fn lock_ordered(
    from_id: &AccountId,
    from: Arc<AsyncMutex<Account>>,
    to_id: &AccountId,
    to: Arc<AsyncMutex<Account>>,
) -> (OwnedMutexGuard<Account>, OwnedMutexGuard<Account>) {
    if from_id < to_id {
        let from_guard = from.lock_owned().await;
        let to_guard = to.lock_owned().await;
        (from_guard, to_guard)
    } else {
        let to_guard = to.lock_owned().await;
        let from_guard = from.lock_owned().await;
        (from_guard, to_guard)
    }
}
