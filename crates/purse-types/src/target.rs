//! Savings targets: ring-fenced funds with a goal and a locking policy.

use crate::{AccountId, Amount, GroupId, PurseError, TargetId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who the target belongs to. Exactly one of the two, by construction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetOwner {
    Account(AccountId),
    Group(GroupId),
}

/// Withdrawal policy of a savings target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    /// Withdraw any time.
    #[default]
    Unlocked,
    /// Withdrawals refused until explicitly unlocked.
    Locked,
    /// Withdrawals refused until the maturity date.
    LockedTime,
    /// Withdrawals refused until the target amount is reached.
    LockedGoal,
}

/// A savings target, owned by an account or by a group.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SavingsTarget {
    pub id: TargetId,
    pub owner: TargetOwner,
    pub name: String,
    pub target_amount: Amount,
    pub current_amount: Amount,
    pub policy: LockPolicy,
    /// Required when the policy is `LockedTime`.
    pub maturity_date: Option<DateTime<Utc>>,
    /// Latched the first time `current_amount` reaches `target_amount`.
    pub achieved: bool,
    pub achieved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SavingsTarget {
    pub fn new(
        owner: TargetOwner,
        name: impl Into<String>,
        target_amount: Amount,
        policy: LockPolicy,
        maturity_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TargetId::generate(),
            owner,
            name: name.into(),
            target_amount,
            current_amount: Amount::zero(),
            policy,
            maturity_date,
            achieved: false,
            achieved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the policy currently permits withdrawals. Checked before any
    /// funds move; also re-checked by `unlock`.
    pub fn withdrawal_gate(&self, now: DateTime<Utc>) -> Result<(), PurseError> {
        match self.policy {
            LockPolicy::Unlocked => Ok(()),
            LockPolicy::Locked => Err(PurseError::TargetLocked {
                reason: "target is locked".into(),
            }),
            LockPolicy::LockedTime => {
                let maturity = self.maturity_date.ok_or_else(|| {
                    PurseError::InvariantViolation(
                        "time-locked target is missing its maturity date".into(),
                    )
                })?;
                if now < maturity {
                    return Err(PurseError::TargetLocked {
                        reason: format!("target is locked until {}", maturity.to_rfc3339()),
                    });
                }
                Ok(())
            }
            LockPolicy::LockedGoal => {
                if self.current_amount < self.target_amount {
                    return Err(PurseError::TargetLocked {
                        reason: format!(
                            "target is locked until {} is saved, currently {}",
                            self.target_amount, self.current_amount
                        ),
                    });
                }
                Ok(())
            }
        }
    }

    /// Credit the target and latch `achieved` on the first crossing.
    /// Returns true when this credit crossed the goal.
    pub fn credit(&mut self, amount: Amount, now: DateTime<Utc>) -> Result<bool, PurseError> {
        self.current_amount = self
            .current_amount
            .checked_add(amount)
            .ok_or_else(|| PurseError::InvariantViolation("target balance overflow".into()))?;
        self.updated_at = now;
        if !self.achieved && self.current_amount >= self.target_amount {
            self.achieved = true;
            self.achieved_at = Some(now);
            return Ok(true);
        }
        Ok(false)
    }

    /// Debit the target. The policy gate must have passed already.
    pub fn debit(&mut self, amount: Amount, now: DateTime<Utc>) -> Result<(), PurseError> {
        self.current_amount =
            self.current_amount
                .checked_sub(amount)
                .ok_or(PurseError::InsufficientFunds {
                    required: amount,
                    available: self.current_amount,
                })?;
        self.updated_at = now;
        Ok(())
    }
}
