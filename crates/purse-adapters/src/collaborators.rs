//! In-memory collaborator implementations.

use async_trait::async_trait;
use purse_engine::{BlockPolicy, InviteNotifier, UserDirectory};
use purse_types::{AccountId, Invitation, PurseResult, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};
use tracing::info;

/// A fixed email-to-user directory.
#[derive(Default)]
pub struct StaticDirectory {
    users: HashMap<String, UserId>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, UserId)>,
        S: Into<String>,
    {
        Self {
            users: pairs.into_iter().map(|(e, u)| (e.into(), u)).collect(),
        }
    }

    pub fn add(&mut self, email: impl Into<String>, user: UserId) {
        self.users.insert(email.into(), user);
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn user_for_email(&self, email: &str) -> Option<UserId> {
        self.users.get(email).cloned()
    }
}

/// Captures invitation deliveries instead of sending anything.
#[derive(Default)]
pub struct RecordingNotifier {
    deliveries: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivered (email, group name) pairs, in order.
    pub fn deliveries(&self) -> Vec<(String, String)> {
        match self.deliveries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl InviteNotifier for RecordingNotifier {
    async fn invite_sent(&self, invitation: &Invitation, group_name: &str) -> PurseResult<()> {
        info!(
            invitation = %invitation.id,
            email = %invitation.invited_email,
            "recording invite delivery"
        );
        if let Ok(mut guard) = self.deliveries.lock() {
            guard.push((invitation.invited_email.clone(), group_name.to_string()));
        }
        Ok(())
    }
}

/// Blocks joins from a mutable set of accounts. Entries can be added and
/// removed while the engine is running.
#[derive(Default)]
pub struct DenyListPolicy {
    denied: RwLock<HashSet<AccountId>>,
}

impl DenyListPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&self, account: AccountId) {
        if let Ok(mut denied) = self.denied.write() {
            denied.insert(account);
        }
    }

    pub fn unblock(&self, account: &AccountId) {
        if let Ok(mut denied) = self.denied.write() {
            denied.remove(account);
        }
    }
}

#[async_trait]
impl BlockPolicy for DenyListPolicy {
    async fn is_blocked(&self, joiner: &AccountId, _group_creator: &AccountId) -> bool {
        match self.denied.read() {
            Ok(denied) => denied.contains(joiner),
            Err(poisoned) => poisoned.into_inner().contains(joiner),
        }
    }
}
