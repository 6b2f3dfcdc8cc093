//! Black-box collaborator seams.
//!
//! Identity, social-graph, email delivery, and commerce concerns live outside
//! this engine. Each is a trait with a no-op default so the engine runs
//! standalone; the platform wires real implementations at bootstrap.

use async_trait::async_trait;
use purse_types::{AccountId, Invitation, PoolGroup, PurseResult, UserId};
use std::sync::Arc;

/// Social-graph veto consulted before an account joins a group.
#[async_trait]
pub trait BlockPolicy: Send + Sync {
    /// Whether `joiner` is blocked with respect to `group_creator`.
    async fn is_blocked(&self, joiner: &AccountId, group_creator: &AccountId) -> bool;
}

/// Default block policy: nobody is blocked.
pub struct AllowAll;

#[async_trait]
impl BlockPolicy for AllowAll {
    async fn is_blocked(&self, _joiner: &AccountId, _group_creator: &AccountId) -> bool {
        false
    }
}

/// Lookup from invitation email to a platform user, owned by the identity
/// system.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_for_email(&self, email: &str) -> Option<UserId>;
}

/// Default directory: every email is unknown, so all invitations take the
/// external path.
pub struct NoDirectory;

#[async_trait]
impl UserDirectory for NoDirectory {
    async fn user_for_email(&self, _email: &str) -> Option<UserId> {
        None
    }
}

/// Outbound delivery of external invitations. Called after the invitation
/// row is written, with no engine locks held.
#[async_trait]
pub trait InviteNotifier: Send + Sync {
    async fn invite_sent(&self, invitation: &Invitation, group_name: &str) -> PurseResult<()>;
}

/// Default notifier: delivery is somebody else's problem.
pub struct SilentNotifier;

#[async_trait]
impl InviteNotifier for SilentNotifier {
    async fn invite_sent(&self, _invitation: &Invitation, _group_name: &str) -> PurseResult<()> {
        Ok(())
    }
}

/// Fired at most once per goal crossing, after all locks are released.
/// The commerce side can register a hook that places the pooled order.
#[async_trait]
pub trait GoalHook: Send + Sync {
    async fn goal_reached(&self, group: &PoolGroup);
}

pub struct NoopGoalHook;

#[async_trait]
impl GoalHook for NoopGoalHook {
    async fn goal_reached(&self, _group: &PoolGroup) {}
}

/// The full collaborator wiring handed to bootstrap.
#[derive(Clone)]
pub struct CollaboratorSet {
    pub block_policy: Arc<dyn BlockPolicy>,
    pub directory: Arc<dyn UserDirectory>,
    pub notifier: Arc<dyn InviteNotifier>,
    pub goal_hook: Arc<dyn GoalHook>,
}

impl Default for CollaboratorSet {
    fn default() -> Self {
        Self {
            block_policy: Arc::new(AllowAll),
            directory: Arc::new(NoDirectory),
            notifier: Arc::new(SilentNotifier),
            goal_hook: Arc::new(NoopGoalHook),
        }
    }
}
