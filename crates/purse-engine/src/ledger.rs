use crate::groups::GroupState;
use crate::storage::StateStore;
use chrono::{DateTime, Utc};
use purse_types::{
    Account, AccountId, EntryStatus, EntryToken, LedgerEntry, PurseError, PurseResult,
    SavingsTarget,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug)]
struct LedgerLog {
    entries: Vec<LedgerEntry>,
    index: HashMap<EntryToken, usize>,
}

impl LedgerLog {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn from_entries(entries: Vec<LedgerEntry>) -> PurseResult<Self> {
        let mut log = Self::new();
        for entry in entries {
            log.commit(entry)?;
        }
        Ok(log)
    }

    fn commit(&mut self, entry: LedgerEntry) -> PurseResult<()> {
        if self.index.contains_key(&entry.token) {
            return Err(PurseError::InvariantViolation(format!(
                "duplicate ledger token {}",
                entry.token
            )));
        }
        self.index.insert(entry.token.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    fn find(&self, token: &EntryToken) -> Option<&LedgerEntry> {
        self.index.get(token).map(|i| &self.entries[*i])
    }

    fn replace(&mut self, entry: LedgerEntry) {
        if let Some(i) = self.index.get(&entry.token) {
            self.entries[*i] = entry;
        }
    }
}

/// The transaction ledger: every balance movement, append-only.
///
/// The in-memory log is authoritative; the mirror write happens before the
/// in-memory commit so a successful return means the entry is durable on
/// persistent backends. Entries reach a terminal status exactly once.
#[derive(Debug)]
pub struct TransactionLedger {
    store: Arc<StateStore>,
    state: AsyncMutex<LedgerLog>,
}

impl TransactionLedger {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self {
            store,
            state: AsyncMutex::new(LedgerLog::new()),
        }
    }

    /// Rebuild from persisted entries at bootstrap.
    pub fn from_entries(store: Arc<StateStore>, entries: Vec<LedgerEntry>) -> PurseResult<Self> {
        Ok(Self {
            store,
            state: AsyncMutex::new(LedgerLog::from_entries(entries)?),
        })
    }

    /// Record a settled movement. `accounts` are the post-movement snapshots
    /// of every touched row; they are mirrored in the same transaction as
    /// the entry. The caller holds the row locks for all of them.
    pub async fn record(
        &self,
        entry: LedgerEntry,
        accounts: &[&Account],
        group: Option<&GroupState>,
        target: Option<&SavingsTarget>,
    ) -> PurseResult<LedgerEntry> {
        self.store
            .persist_movement(accounts, &entry, group, target)
            .await?;
        let mut state = self.state.lock().await;
        state.commit(entry.clone())?;
        Ok(entry)
    }

    /// Record a pending gateway entry. No account snapshot changes yet.
    pub async fn record_pending(&self, entry: LedgerEntry) -> PurseResult<LedgerEntry> {
        self.store.persist_pending_entry(&entry).await?;
        let mut state = self.state.lock().await;
        state.commit(entry.clone())?;
        Ok(entry)
    }

    /// Settle a pending entry to a terminal status, exactly once. Racing
    /// settlements fail with `AlreadyProcessed` after the first wins.
    pub async fn settle(
        &self,
        token: &EntryToken,
        to: EntryStatus,
        accounts: &[&Account],
        now: DateTime<Utc>,
    ) -> PurseResult<LedgerEntry> {
        let mut state = self.state.lock().await;
        let mut entry = state
            .find(token)
            .cloned()
            .ok_or_else(|| PurseError::EntryNotFound(token.clone()))?;
        entry.settle(to, now)?;

        self.store.persist_settlement(accounts, &entry).await?;
        state.replace(entry.clone());
        Ok(entry)
    }

    pub async fn entry(&self, token: &EntryToken) -> PurseResult<LedgerEntry> {
        self.state
            .lock()
            .await
            .find(token)
            .cloned()
            .ok_or_else(|| PurseError::EntryNotFound(token.clone()))
    }

    /// All entries that touched `account`, in append order.
    pub async fn entries_for_account(&self, account: &AccountId) -> Vec<LedgerEntry> {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .filter(|e| {
                e.source.as_ref() == Some(account) || e.destination.as_ref() == Some(account)
            })
            .cloned()
            .collect()
    }

    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().await.entries.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageConfig;
    use purse_types::{Amount, EntryKind, PaymentMethod};

    async fn ledger() -> TransactionLedger {
        let store = Arc::new(
            StateStore::bootstrap(StorageConfig::memory())
                .await
                .unwrap(),
        );
        TransactionLedger::new(store)
    }

    fn completed_entry(source: &str, destination: &str, minor: u64) -> LedgerEntry {
        LedgerEntry::completed(
            EntryKind::Transfer,
            Some(AccountId::new(source)),
            Some(AccountId::new(destination)),
            Amount::from_minor(minor),
            PaymentMethod::Wallet,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn record_and_query_by_account() {
        let ledger = ledger().await;
        ledger
            .record(completed_entry("a", "b", 100), &[], None, None)
            .await
            .unwrap();
        ledger
            .record(completed_entry("b", "c", 200), &[], None, None)
            .await
            .unwrap();

        let for_b = ledger.entries_for_account(&AccountId::new("b")).await;
        assert_eq!(for_b.len(), 2);
        let for_a = ledger.entries_for_account(&AccountId::new("a")).await;
        assert_eq!(for_a.len(), 1);
        assert_eq!(ledger.len().await, 2);
    }

    #[tokio::test]
    async fn settle_wins_exactly_once() {
        let ledger = ledger().await;
        let now = Utc::now();
        let pending = LedgerEntry::pending(
            EntryKind::Deposit,
            AccountId::new("a"),
            Amount::from_minor(5_000),
            PaymentMethod::Card,
            now,
        );
        let token = pending.token.clone();
        ledger.record_pending(pending).await.unwrap();

        let settled = ledger
            .settle(&token, EntryStatus::Completed, &[], now)
            .await
            .unwrap();
        assert_eq!(settled.status, EntryStatus::Completed);

        let err = ledger
            .settle(&token, EntryStatus::Failed, &[], now)
            .await
            .unwrap_err();
        assert!(matches!(err, PurseError::AlreadyProcessed { .. }));

        let stored = ledger.entry(&token).await.unwrap();
        assert_eq!(stored.status, EntryStatus::Completed);
    }

    #[tokio::test]
    async fn unknown_token_is_entry_not_found() {
        let ledger = ledger().await;
        let err = ledger.entry(&EntryToken::new("missing")).await.unwrap_err();
        assert!(matches!(err, PurseError::EntryNotFound(_)));
    }

    #[tokio::test]
    async fn hydration_refuses_duplicate_tokens() {
        let store = Arc::new(
            StateStore::bootstrap(StorageConfig::memory())
                .await
                .unwrap(),
        );
        let entry = completed_entry("a", "b", 100);
        let dup = entry.clone();
        let err = TransactionLedger::from_entries(store, vec![entry, dup]).unwrap_err();
        assert!(matches!(err, PurseError::InvariantViolation(_)));
    }
}
