//! Error taxonomy shared by every engine operation.
//!
//! Callers route on [`ErrorKind`]: validation failures happen before any
//! transaction, preconditions fail inside the critical section before any
//! write, authorization failures are permission problems, provider failures
//! are the one class where a failed ledger entry exists, and internal errors
//! abort the transaction wholesale.

use crate::{AccountId, Amount, EntryToken, GroupId, InvitationId, TargetId};
use chrono::{DateTime, Utc};
use thiserror::Error;

pub type PurseResult<T> = Result<T, PurseError>;

/// Coarse error class for response routing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Precondition,
    Authorization,
    Provider,
    Internal,
}

/// Wallet and group engine errors.
#[derive(Debug, Error)]
pub enum PurseError {
    // Validation
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Cannot transfer to the same account")]
    SelfTransfer,

    #[error("Time-locked target requires a maturity date")]
    MissingMaturityDate,

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("Savings target not found: {0}")]
    TargetNotFound(TargetId),

    #[error("Invitation not found: {0}")]
    InvitationNotFound(InvitationId),

    #[error("Ledger entry not found: {0}")]
    EntryNotFound(EntryToken),

    #[error("Account {account} is not a member of group {group}")]
    MemberNotFound { group: GroupId, account: AccountId },

    // Preconditions
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Amount, available: Amount },

    #[error("Group is full: capacity {capacity}")]
    GroupFull { capacity: u32 },

    #[error("Account is already a member of this group")]
    AlreadyMember,

    #[error("Withdrawal refused: {reason}")]
    TargetLocked { reason: String },

    #[error("Too early: group deadline is {deadline}")]
    TooEarly { deadline: DateTime<Utc> },

    #[error("Expired: {what}")]
    Expired { what: String },

    #[error("Already processed: {what}")]
    AlreadyProcessed { what: String },

    #[error("Invalid deadline: {reason}")]
    InvalidDeadline { reason: String },

    #[error("Group cannot be deleted: {reason}")]
    DeleteNotAllowed { reason: String },

    #[error("Group still holds {amount}; disburse before deleting")]
    FundsRemaining { amount: Amount },

    #[error("Monthly purchase limit of {limit} reached for this tier")]
    PurchaseLimitReached { limit: u32 },

    #[error("Group creation quota of {limit} reached for this tier")]
    GroupQuotaReached { limit: u32 },

    #[error("Group is no longer active")]
    GroupInactive,

    #[error("Group has not been terminated")]
    NotTerminated,

    #[error("Account is archived")]
    AccountArchived,

    #[error("Owner already has a live savings target")]
    TargetExists,

    // Authorization
    #[error("Forbidden: {action}")]
    Forbidden { action: String },

    #[error("Invitation is addressed to a different account")]
    NotAddressee,

    // Provider
    #[error("Gateway '{provider}' failed: {message}")]
    GatewayFailure { provider: String, message: String },

    #[error("No gateway registered for provider '{0}'")]
    GatewayNotRegistered(String),

    #[error("Invite delivery failed: {0}")]
    NotifierFailure(String),

    // Internal
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PurseError {
    /// The taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PurseError::InvalidAmount(_)
            | PurseError::SelfTransfer
            | PurseError::MissingMaturityDate
            | PurseError::AccountNotFound(_)
            | PurseError::GroupNotFound(_)
            | PurseError::TargetNotFound(_)
            | PurseError::InvitationNotFound(_)
            | PurseError::EntryNotFound(_)
            | PurseError::MemberNotFound { .. } => ErrorKind::Validation,

            PurseError::InsufficientFunds { .. }
            | PurseError::GroupFull { .. }
            | PurseError::AlreadyMember
            | PurseError::TargetLocked { .. }
            | PurseError::TooEarly { .. }
            | PurseError::Expired { .. }
            | PurseError::AlreadyProcessed { .. }
            | PurseError::InvalidDeadline { .. }
            | PurseError::DeleteNotAllowed { .. }
            | PurseError::FundsRemaining { .. }
            | PurseError::PurchaseLimitReached { .. }
            | PurseError::GroupQuotaReached { .. }
            | PurseError::GroupInactive
            | PurseError::NotTerminated
            | PurseError::AccountArchived
            | PurseError::TargetExists => ErrorKind::Precondition,

            PurseError::Forbidden { .. } | PurseError::NotAddressee => ErrorKind::Authorization,

            PurseError::GatewayFailure { .. }
            | PurseError::GatewayNotRegistered(_)
            | PurseError::NotifierFailure(_) => ErrorKind::Provider,

            PurseError::InvariantViolation(_)
            | PurseError::Storage(_)
            | PurseError::Serialization(_) => ErrorKind::Internal,
        }
    }

    pub fn forbidden(action: impl Into<String>) -> Self {
        Self::Forbidden {
            action: action.into(),
        }
    }

    /// Positive-amount validation shared by every balance operation.
    pub fn require_positive(amount: Amount) -> PurseResult<()> {
        if amount.is_zero() {
            return Err(PurseError::InvalidAmount(
                "amount must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
