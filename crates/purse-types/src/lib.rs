//! Domain types for the purse wallet and pooled-contribution engine.
//!
//! Pure data model: money, accounts, ledger entries, contribution groups,
//! invitations, and savings targets, plus the error taxonomy shared by every
//! engine operation. No I/O and no async here.

#![deny(unsafe_code)]

pub mod account;
pub mod amount;
pub mod error;
pub mod group;
pub mod ids;
pub mod invite;
pub mod ledger;
pub mod target;

pub use account::{Account, Tier};
pub use amount::Amount;
pub use error::{ErrorKind, PurseError, PurseResult};
pub use group::{Contribution, GroupMember, PoolGroup};
pub use ids::{
    AccountId, ContributionId, EntryToken, GroupId, InvitationId, InviteToken, MemberId, TargetId,
    UserId,
};
pub use invite::{Invitation, InvitationStatus};
pub use ledger::{EntryKind, EntryStatus, LedgerEntry, PaymentMethod};
pub use target::{LockPolicy, SavingsTarget, TargetOwner};
