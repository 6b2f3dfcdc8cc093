//! Ledger entries: the immutable audit trail of every balance movement.

use crate::{AccountId, Amount, EntryToken, PurseError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a ledger entry records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Deposit,
    Withdrawal,
    Transfer,
    Purchase,
    Contribution,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EntryKind::Deposit => "deposit",
            EntryKind::Withdrawal => "withdrawal",
            EntryKind::Transfer => "transfer",
            EntryKind::Purchase => "purchase",
            EntryKind::Contribution => "contribution",
        };
        write!(f, "{}", label)
    }
}

/// Settlement state of an entry. `Completed` and `Failed` are terminal; an
/// entry in a terminal state is immutable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Awaiting external confirmation. Only gateway deposits sit here; the
    /// balance has not moved yet.
    Pending,
    Completed,
    Failed,
}

impl EntryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryStatus::Completed | EntryStatus::Failed)
    }
}

/// How the money moved, for audit and reconciliation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Internal wallet balance.
    Wallet,
    Card,
    BankTransfer,
    /// Provider-specific tag carried through from a gateway.
    Other(String),
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Wallet => write!(f, "wallet"),
            PaymentMethod::Card => write!(f, "card"),
            PaymentMethod::BankTransfer => write!(f, "bank_transfer"),
            PaymentMethod::Other(tag) => write!(f, "{}", tag),
        }
    }
}

/// One recorded balance movement.
///
/// `source` is `None` for pure deposits and pool payouts; `destination` is
/// `None` for pure withdrawals, purchases, and pooled contributions. The
/// receipt token is random and returned to callers; it is the only handle
/// needed to query or settle the entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub token: EntryToken,
    pub source: Option<AccountId>,
    pub destination: Option<AccountId>,
    pub amount: Amount,
    pub kind: EntryKind,
    pub method: PaymentMethod,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
    /// Set when a pending entry reaches a terminal status.
    pub settled_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    /// An entry that settled at creation time (wallet-internal operations).
    pub fn completed(
        kind: EntryKind,
        source: Option<AccountId>,
        destination: Option<AccountId>,
        amount: Amount,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token: EntryToken::generate(),
            source,
            destination,
            amount,
            kind,
            method,
            status: EntryStatus::Completed,
            created_at: now,
            settled_at: Some(now),
        }
    }

    /// A gateway entry awaiting provider confirmation. No balance has moved.
    pub fn pending(
        kind: EntryKind,
        destination: AccountId,
        amount: Amount,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token: EntryToken::generate(),
            source: None,
            destination: Some(destination),
            amount,
            kind,
            method,
            status: EntryStatus::Pending,
            created_at: now,
            settled_at: None,
        }
    }

    /// Move a pending entry to a terminal status. Terminal entries refuse
    /// any further transition.
    pub fn settle(&mut self, to: EntryStatus, now: DateTime<Utc>) -> Result<(), PurseError> {
        if self.status.is_terminal() {
            return Err(PurseError::AlreadyProcessed {
                what: format!("ledger entry {} is already {:?}", self.token, self.status),
            });
        }
        if to == EntryStatus::Pending {
            return Err(PurseError::InvariantViolation(
                "cannot settle an entry back to pending".into(),
            ));
        }
        self.status = to;
        self.settled_at = Some(now);
        Ok(())
    }
}
