//! Wallet ledger and pooled-contribution engine.
//!
//! This crate enforces the financial invariants of the platform: balances
//! never go negative, every movement is recorded as exactly one ledger entry
//! in the same critical section as the balance write, pooled groups terminate
//! only by unanimous post-deadline consent, and savings targets gate
//! withdrawals through explicit lock policies.

#![deny(unsafe_code)]

pub mod collaborators;
pub mod engine;
pub mod gateway;
pub mod groups;
pub mod invites;
pub mod ledger;
pub mod policy;
pub mod storage;
pub mod targets;
pub mod termination;
pub mod transfer;
pub mod vault;

pub use collaborators::{
    AllowAll, BlockPolicy, CollaboratorSet, GoalHook, InviteNotifier, NoDirectory, NoopGoalHook,
    SilentNotifier, UserDirectory,
};
pub use engine::{PurseEngine, PurseEngineConfig};
pub use gateway::{GatewayCharge, GatewayOutcome, GatewayReceipt, GatewayRegistry, PaymentGateway};
pub use groups::{GroupDirectory, GroupManager, GroupState};
pub use invites::{InvitationManager, InviteOutcome};
pub use ledger::TransactionLedger;
pub use policy::{TierLimits, TierPolicy};
pub use storage::{PersistedState, StateStore, StorageConfig};
pub use targets::TargetManager;
pub use termination::{GroupStatus, TerminationCoordinator, TerminationTally};
pub use transfer::TransferEngine;
pub use vault::AccountVault;
