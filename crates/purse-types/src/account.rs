//! Wallet accounts and subscription tiers.

use crate::{AccountId, Amount, PurseError, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription tier of the owning user. Limits are not encoded here; the
/// policy engine maps tiers onto concrete ceilings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    Standard,
    Premium,
    Gold,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Tier::Free => "free",
            Tier::Standard => "standard",
            Tier::Premium => "premium",
            Tier::Gold => "gold",
        };
        write!(f, "{}", label)
    }
}

/// A user's wallet account.
///
/// One account per user, created lazily on first touch. The balance moves
/// only through ledger-backed operations; accounts are archived, never
/// hard-deleted, so historical entries always resolve.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserId,
    /// Current balance. Invariant: never negative (unsigned by construction,
    /// debits are checked).
    pub balance: Amount,
    pub tier: Tier,
    /// Purchases recorded in the window named by `counter_month`.
    pub purchases_this_month: u32,
    /// `"YYYY-MM"` marker for the purchase counter. Normalized lazily on the
    /// next purchase attempt; there is no midnight reset job.
    pub counter_month: String,
    /// Live groups created by this account, counted against the tier quota.
    pub groups_created: u32,
    /// Soft-archive flag. Archived accounts refuse financial operations.
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::generate(),
            user_id,
            balance: Amount::zero(),
            tier: Tier::default(),
            purchases_this_month: 0,
            counter_month: month_marker(now),
            groups_created: 0,
            archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_balance(mut self, balance: Amount) -> Self {
        self.balance = balance;
        self
    }

    /// Credit the balance. Overflow is a programming-error class failure.
    pub fn credit(&mut self, amount: Amount, now: DateTime<Utc>) -> Result<(), PurseError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| PurseError::InvariantViolation("balance overflow".into()))?;
        self.updated_at = now;
        Ok(())
    }

    /// Debit the balance, refusing to go negative.
    pub fn debit(&mut self, amount: Amount, now: DateTime<Utc>) -> Result<(), PurseError> {
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or(PurseError::InsufficientFunds {
                required: amount,
                available: self.balance,
            })?;
        self.updated_at = now;
        Ok(())
    }

    /// Reset the purchase counter if the calendar month rolled over since the
    /// last purchase. Called under the account lock before limit checks.
    pub fn normalize_purchase_window(&mut self, now: DateTime<Utc>) {
        let marker = month_marker(now);
        if self.counter_month != marker {
            self.counter_month = marker;
            self.purchases_this_month = 0;
        }
    }
}

/// `"YYYY-MM"` window marker for monthly counters.
pub fn month_marker(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn debit_below_zero_is_refused() {
        let mut account = Account::new(UserId::new("u-1")).with_balance(Amount::from_minor(100));
        let err = account
            .debit(Amount::from_minor(250), Utc::now())
            .unwrap_err();
        match err {
            PurseError::InsufficientFunds {
                required,
                available,
            } => {
                assert_eq!(required, Amount::from_minor(250));
                assert_eq!(available, Amount::from_minor(100));
            }
            other => panic!("expected InsufficientFunds, got {:?}", other),
        }
        assert_eq!(account.balance, Amount::from_minor(100));
    }

    #[test]
    fn purchase_window_resets_on_month_rollover() {
        let january = Utc.with_ymd_and_hms(2026, 1, 20, 12, 0, 0).unwrap();
        let february = Utc.with_ymd_and_hms(2026, 2, 2, 9, 0, 0).unwrap();

        let mut account = Account::new(UserId::new("u-1"));
        account.counter_month = month_marker(january);
        account.purchases_this_month = 4;

        account.normalize_purchase_window(january);
        assert_eq!(account.purchases_this_month, 4);

        account.normalize_purchase_window(february);
        assert_eq!(account.purchases_this_month, 0);
        assert_eq!(account.counter_month, "2026-02");
    }
}
