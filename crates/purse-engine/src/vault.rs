use purse_types::{Account, AccountId, PurseError, PurseResult, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::info;

/// In-memory account registry with one async mutex per account row.
///
/// Balance mutations happen while holding the row lock end to end, which is
/// the in-process equivalent of a row-level `SELECT ... FOR UPDATE`. The
/// outer maps are only ever locked long enough to fetch or insert a handle;
/// they are never held across an await on a row lock.
pub struct AccountVault {
    accounts: RwLock<HashMap<AccountId, Arc<AsyncMutex<Account>>>>,
    by_user: RwLock<HashMap<UserId, AccountId>>,
}

impl AccountVault {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            by_user: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild the registry from persisted accounts at bootstrap.
    pub fn from_accounts(accounts: Vec<Account>) -> Self {
        let mut rows = HashMap::new();
        let mut by_user = HashMap::new();
        for account in accounts {
            by_user.insert(account.user_id.clone(), account.id.clone());
            rows.insert(account.id.clone(), Arc::new(AsyncMutex::new(account)));
        }
        Self {
            accounts: RwLock::new(rows),
            by_user: RwLock::new(by_user),
        }
    }

    /// Fetch the account for `user`, creating it on first touch.
    /// Returns the row handle and whether it was created by this call.
    pub async fn get_or_create(&self, user: &UserId) -> (Arc<AsyncMutex<Account>>, bool) {
        if let Some(id) = self.by_user.read().await.get(user).cloned() {
            if let Some(handle) = self.accounts.read().await.get(&id).cloned() {
                return (handle, false);
            }
        }

        let mut by_user = self.by_user.write().await;
        // Re-check under the write lock: another task may have created it.
        if let Some(id) = by_user.get(user).cloned() {
            if let Some(handle) = self.accounts.read().await.get(&id).cloned() {
                return (handle, false);
            }
        }

        let account = Account::new(user.clone());
        let id = account.id.clone();
        info!(account = %id, user = %user, "account created");

        let handle = Arc::new(AsyncMutex::new(account));
        by_user.insert(user.clone(), id.clone());
        self.accounts.write().await.insert(id, handle.clone());
        (handle, true)
    }

    /// Row handle by account id.
    pub async fn handle(&self, id: &AccountId) -> PurseResult<Arc<AsyncMutex<Account>>> {
        self.accounts
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| PurseError::AccountNotFound(id.clone()))
    }

    /// Point-in-time copy of an account row.
    pub async fn snapshot(&self, id: &AccountId) -> PurseResult<Account> {
        let handle = self.handle(id).await?;
        let account = handle.lock().await;
        Ok(account.clone())
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }
}

impl Default for AccountVault {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_is_lazy_and_idempotent() {
        let vault = AccountVault::new();
        let user = UserId::new("user-1");

        let (first, created) = vault.get_or_create(&user).await;
        assert!(created);
        let (second, created_again) = vault.get_or_create(&user).await;
        assert!(!created_again);

        let first_id = first.lock().await.id.clone();
        let second_id = second.lock().await.id.clone();
        assert_eq!(first_id, second_id);
        assert_eq!(vault.len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_first_touch_creates_one_account() {
        let vault = Arc::new(AccountVault::new());
        let user = UserId::new("user-racy");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let vault = vault.clone();
            let user = user.clone();
            handles.push(tokio::spawn(
                async move { vault.get_or_create(&user).await.1 },
            ));
        }

        let mut created_count = 0;
        for handle in handles {
            if handle.await.unwrap() {
                created_count += 1;
            }
        }
        assert_eq!(created_count, 1);
        assert_eq!(vault.len().await, 1);
    }

    #[tokio::test]
    async fn missing_account_is_a_validation_error() {
        let vault = AccountVault::new();
        let err = vault.handle(&AccountId::new("nope")).await.unwrap_err();
        assert!(matches!(err, PurseError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn hydration_restores_user_index() {
        let user = UserId::new("user-1");
        let account = Account::new(user.clone());
        let id = account.id.clone();

        let vault = AccountVault::from_accounts(vec![account]);
        let (handle, created) = vault.get_or_create(&user).await;
        assert!(!created);
        assert_eq!(handle.lock().await.id, id);
    }
}
