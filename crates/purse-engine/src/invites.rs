use crate::collaborators::CollaboratorSet;
use crate::groups::{GroupDirectory, GroupManager};
use crate::storage::StateStore;
use crate::vault::AccountVault;
use chrono::{Duration, Utc};
use purse_types::{
    AccountId, GroupId, GroupMember, Invitation, InvitationId, InvitationStatus, PurseError,
    PurseResult,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

/// Result of sending an invitation.
///
/// An email that resolves to no known user is not written on the first
/// attempt; the caller confirms the external path explicitly by retrying
/// with `force`.
#[derive(Clone, Debug)]
pub enum InviteOutcome {
    Sent(Invitation),
    RequiresConfirmation { email: String },
}

/// Group invitations: sending, accepting, rejecting and listing. All
/// invitation rows live behind one mutex, which is held across accept so
/// a token can be consumed at most once.
pub struct InvitationManager {
    invitations: AsyncMutex<HashMap<InvitationId, Invitation>>,
    directory: Arc<GroupDirectory>,
    groups: Arc<GroupManager>,
    vault: Arc<AccountVault>,
    store: Arc<StateStore>,
    collaborators: CollaboratorSet,
    validity: Duration,
}

impl InvitationManager {
    pub fn new(
        directory: Arc<GroupDirectory>,
        groups: Arc<GroupManager>,
        vault: Arc<AccountVault>,
        store: Arc<StateStore>,
        collaborators: CollaboratorSet,
        validity: Duration,
    ) -> Self {
        Self {
            invitations: AsyncMutex::new(HashMap::new()),
            directory,
            groups,
            vault,
            store,
            collaborators,
            validity,
        }
    }

    /// Rehydrate the invitation table at bootstrap.
    pub fn with_invitations(mut self, invitations: Vec<Invitation>) -> Self {
        let map = invitations.into_iter().map(|i| (i.id.clone(), i)).collect();
        self.invitations = AsyncMutex::new(map);
        self
    }

    /// Invite an email address to a group. Admins only. A known user gets
    /// an invitation bound to their account; an unknown email needs `force`
    /// to create an unbound invitation, which is then handed to the
    /// notifier for delivery.
    pub async fn invite(
        &self,
        group_id: &GroupId,
        inviter: &AccountId,
        email: &str,
        force: bool,
    ) -> PurseResult<InviteOutcome> {
        let group_name = {
            let handle = self.directory.handle(group_id).await?;
            let guard = handle.lock().await;
            if !guard.is_admin(inviter) {
                return Err(PurseError::forbidden("invite to this group"));
            }
            if !guard.accepts_contributions() {
                return Err(PurseError::GroupInactive);
            }
            guard.group.name.clone()
        };

        // Email resolution happens with no locks held.
        let known_user = self.collaborators.directory.user_for_email(email).await;

        let now = Utc::now();
        let expires_at = now + self.validity;
        match known_user {
            Some(user) => {
                let (handle, created) = self.vault.get_or_create(&user).await;
                let account = {
                    let guard = handle.lock().await;
                    guard.clone()
                };
                if created {
                    self.store.persist_account(&account).await?;
                }

                let invitation = Invitation::new(
                    group_id.clone(),
                    Some(account.id.clone()),
                    email,
                    inviter.clone(),
                    expires_at,
                    now,
                );
                self.store.persist_invitation(&invitation).await?;
                self.invitations
                    .lock()
                    .await
                    .insert(invitation.id.clone(), invitation.clone());

                info!(
                    invitation = %invitation.id,
                    group = %group_id,
                    account = %account.id,
                    "invitation sent"
                );
                Ok(InviteOutcome::Sent(invitation))
            }
            None if !force => Ok(InviteOutcome::RequiresConfirmation {
                email: email.to_string(),
            }),
            None => {
                let invitation =
                    Invitation::new(group_id.clone(), None, email, inviter.clone(), expires_at, now);
                self.store.persist_invitation(&invitation).await?;
                self.invitations
                    .lock()
                    .await
                    .insert(invitation.id.clone(), invitation.clone());

                // Delivery failure surfaces to the caller, but the
                // invitation row stays; the token can still be claimed.
                self.collaborators
                    .notifier
                    .invite_sent(&invitation, &group_name)
                    .await?;

                info!(
                    invitation = %invitation.id,
                    group = %group_id,
                    email = %email,
                    "external invitation sent"
                );
                Ok(InviteOutcome::Sent(invitation))
            }
        }
    }

    /// Accept an invitation and join the group. The invitation table lock
    /// is held across the join so the token is consumed exactly once; an
    /// unbound invitation is claimed by the accepting account.
    pub async fn accept(
        &self,
        invitation_id: &InvitationId,
        acting: &AccountId,
    ) -> PurseResult<GroupMember> {
        let mut table = self.invitations.lock().await;
        let invitation = table
            .get(invitation_id)
            .cloned()
            .ok_or_else(|| PurseError::InvitationNotFound(invitation_id.clone()))?;

        self.check_actionable(&mut table, invitation_id, &invitation, acting)
            .await?;

        let member = self.groups.join_group(&invitation.group_id, acting).await?;

        let mut accepted = invitation;
        accepted.status = InvitationStatus::Accepted;
        accepted.invited_account = Some(acting.clone());
        self.store.persist_invitation(&accepted).await?;
        table.insert(accepted.id.clone(), accepted.clone());
        drop(table);

        info!(
            invitation = %invitation_id,
            group = %accepted.group_id,
            account = %acting,
            "invitation accepted"
        );
        Ok(member)
    }

    /// Decline an invitation. No membership or balance effects.
    pub async fn reject(
        &self,
        invitation_id: &InvitationId,
        acting: &AccountId,
    ) -> PurseResult<()> {
        let mut table = self.invitations.lock().await;
        let invitation = table
            .get(invitation_id)
            .cloned()
            .ok_or_else(|| PurseError::InvitationNotFound(invitation_id.clone()))?;

        self.check_actionable(&mut table, invitation_id, &invitation, acting)
            .await?;

        let mut rejected = invitation;
        rejected.status = InvitationStatus::Rejected;
        self.store.persist_invitation(&rejected).await?;
        table.insert(rejected.id.clone(), rejected);
        drop(table);

        info!(invitation = %invitation_id, account = %acting, "invitation rejected");
        Ok(())
    }

    /// Pending, unexpired invitations bound to `account`. Stale pending
    /// rows encountered along the way are flipped to expired and persisted.
    pub async fn list_pending(&self, account: &AccountId) -> PurseResult<Vec<Invitation>> {
        let now = Utc::now();
        let mut table = self.invitations.lock().await;

        let mut stale: Vec<InvitationId> = Vec::new();
        let mut pending = Vec::new();
        for invitation in table.values() {
            if invitation.status != InvitationStatus::Pending {
                continue;
            }
            if invitation.is_expired(now) {
                stale.push(invitation.id.clone());
                continue;
            }
            if invitation.invited_account.as_ref() == Some(account) {
                pending.push(invitation.clone());
            }
        }

        for id in stale {
            if let Some(invitation) = table.get(&id) {
                let mut expired = invitation.clone();
                expired.status = InvitationStatus::Expired;
                self.store.persist_invitation(&expired).await?;
                table.insert(id, expired);
            }
        }

        pending.sort_by_key(|i| i.created_at);
        Ok(pending)
    }

    pub async fn invitation(&self, id: &InvitationId) -> PurseResult<Invitation> {
        self.invitations
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| PurseError::InvitationNotFound(id.clone()))
    }

    /// Shared addressee, status and expiry gate for accept and reject.
    /// Expiry observed here is recorded immediately.
    async fn check_actionable(
        &self,
        table: &mut HashMap<InvitationId, Invitation>,
        id: &InvitationId,
        invitation: &Invitation,
        acting: &AccountId,
    ) -> PurseResult<()> {
        if !invitation.addressed_to(acting) {
            return Err(PurseError::NotAddressee);
        }
        if invitation.status != InvitationStatus::Pending {
            return Err(PurseError::AlreadyProcessed {
                what: format!("invitation {}", id),
            });
        }
        if invitation.is_expired(Utc::now()) {
            let mut expired = invitation.clone();
            expired.status = InvitationStatus::Expired;
            self.store.persist_invitation(&expired).await?;
            table.insert(id.clone(), expired);
            return Err(PurseError::Expired {
                what: format!("invitation {}", id),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InviteNotifier, UserDirectory};
    use crate::ledger::TransactionLedger;
    use crate::policy::TierPolicy;
    use crate::storage::StorageConfig;
    use crate::transfer::TransferEngine;
    use async_trait::async_trait;
    use chrono::Duration;
    use purse_types::{Amount, PaymentMethod, UserId};
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex as StdMutex;

    struct FixedDirectory {
        users: StdHashMap<String, UserId>,
    }

    #[async_trait]
    impl UserDirectory for FixedDirectory {
        async fn user_for_email(&self, email: &str) -> Option<UserId> {
            self.users.get(email).cloned()
        }
    }

    struct CapturingNotifier {
        delivered: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl InviteNotifier for CapturingNotifier {
        async fn invite_sent(&self, invitation: &Invitation, _group_name: &str) -> PurseResult<()> {
            self.delivered
                .lock()
                .unwrap()
                .push(invitation.invited_email.clone());
            Ok(())
        }
    }

    struct Fixture {
        invites: InvitationManager,
        groups: Arc<GroupManager>,
        transfers: Arc<TransferEngine>,
        vault: Arc<AccountVault>,
        notifier: Arc<CapturingNotifier>,
    }

    async fn setup(known: &[(&str, &str)]) -> Fixture {
        let store = Arc::new(
            StateStore::bootstrap(StorageConfig::memory())
                .await
                .unwrap(),
        );
        let vault = Arc::new(AccountVault::new());
        let ledger = Arc::new(TransactionLedger::new(store.clone()));
        let transfers = Arc::new(TransferEngine::new(
            vault.clone(),
            ledger,
            TierPolicy::default(),
        ));
        let directory = Arc::new(GroupDirectory::new());
        let notifier = Arc::new(CapturingNotifier {
            delivered: StdMutex::new(Vec::new()),
        });
        let users = known
            .iter()
            .map(|(email, user)| (email.to_string(), UserId::new(*user)))
            .collect();
        let collaborators = CollaboratorSet {
            directory: Arc::new(FixedDirectory { users }),
            notifier: notifier.clone(),
            ..CollaboratorSet::default()
        };
        let groups = Arc::new(GroupManager::new(
            directory.clone(),
            vault.clone(),
            transfers.clone(),
            store.clone(),
            TierPolicy::default(),
            collaborators.clone(),
        ));
        let invites = InvitationManager::new(
            directory,
            groups.clone(),
            vault.clone(),
            store,
            collaborators,
            Duration::days(7),
        );
        Fixture {
            invites,
            groups,
            transfers,
            vault,
            notifier,
        }
    }

    async fn funded_account(fixture: &Fixture, user: &str) -> AccountId {
        let (handle, _) = fixture.vault.get_or_create(&UserId::new(user)).await;
        let id = handle.lock().await.id.clone();
        fixture
            .transfers
            .deposit(&id, Amount::from_minor(10_000), PaymentMethod::Wallet)
            .await
            .unwrap();
        id
    }

    async fn group_with_creator(fixture: &Fixture) -> (GroupId, AccountId) {
        let creator = funded_account(fixture, "creator").await;
        let state = fixture
            .groups
            .create_group(&creator, "club", None, 5, Utc::now() + Duration::days(30))
            .await
            .unwrap();
        (state.group.id, creator)
    }

    #[tokio::test]
    async fn known_user_gets_a_bound_invitation() {
        let fixture = setup(&[("friend@example.com", "friend")]).await;
        let (group_id, creator) = group_with_creator(&fixture).await;

        let outcome = fixture
            .invites
            .invite(&group_id, &creator, "friend@example.com", false)
            .await
            .unwrap();
        let invitation = match outcome {
            InviteOutcome::Sent(invitation) => invitation,
            other => panic!("expected a sent invitation, got {:?}", other),
        };
        assert!(invitation.invited_account.is_some());
        assert_eq!(invitation.status, InvitationStatus::Pending);

        let invited = invitation.invited_account.clone().unwrap();
        let pending = fixture.invites.list_pending(&invited).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, invitation.id);
    }

    #[tokio::test]
    async fn unknown_email_requires_confirmation_then_force_sends() {
        let fixture = setup(&[]).await;
        let (group_id, creator) = group_with_creator(&fixture).await;

        let outcome = fixture
            .invites
            .invite(&group_id, &creator, "new@example.com", false)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            InviteOutcome::RequiresConfirmation { .. }
        ));
        assert!(fixture.notifier.delivered.lock().unwrap().is_empty());

        let outcome = fixture
            .invites
            .invite(&group_id, &creator, "new@example.com", true)
            .await
            .unwrap();
        let invitation = match outcome {
            InviteOutcome::Sent(invitation) => invitation,
            other => panic!("expected a sent invitation, got {:?}", other),
        };
        assert!(invitation.invited_account.is_none());
        assert_eq!(
            fixture.notifier.delivered.lock().unwrap().as_slice(),
            ["new@example.com"]
        );
    }

    #[tokio::test]
    async fn only_admins_invite() {
        let fixture = setup(&[]).await;
        let (group_id, _) = group_with_creator(&fixture).await;
        let member = funded_account(&fixture, "member").await;
        fixture.groups.join_group(&group_id, &member).await.unwrap();

        let err = fixture
            .invites
            .invite(&group_id, &member, "x@example.com", true)
            .await
            .unwrap_err();
        assert!(matches!(err, PurseError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn accept_joins_and_consumes_the_invitation() {
        let fixture = setup(&[("friend@example.com", "friend")]).await;
        let (group_id, creator) = group_with_creator(&fixture).await;

        let outcome = fixture
            .invites
            .invite(&group_id, &creator, "friend@example.com", false)
            .await
            .unwrap();
        let invitation = match outcome {
            InviteOutcome::Sent(invitation) => invitation,
            other => panic!("expected a sent invitation, got {:?}", other),
        };
        let invited = invitation.invited_account.clone().unwrap();

        let member = fixture.invites.accept(&invitation.id, &invited).await.unwrap();
        assert_eq!(member.account_id, invited);
        assert!(fixture
            .groups
            .group_snapshot(&group_id)
            .await
            .unwrap()
            .member_for(&invited)
            .is_some());

        let err = fixture
            .invites
            .accept(&invitation.id, &invited)
            .await
            .unwrap_err();
        assert!(matches!(err, PurseError::AlreadyProcessed { .. }));
    }

    #[tokio::test]
    async fn unbound_invitation_is_claimed_by_the_acceptor() {
        let fixture = setup(&[]).await;
        let (group_id, creator) = group_with_creator(&fixture).await;
        let outcome = fixture
            .invites
            .invite(&group_id, &creator, "new@example.com", true)
            .await
            .unwrap();
        let invitation = match outcome {
            InviteOutcome::Sent(invitation) => invitation,
            other => panic!("expected a sent invitation, got {:?}", other),
        };

        // The invitee registered afterwards and now has an account.
        let late_joiner = funded_account(&fixture, "late-joiner").await;
        fixture
            .invites
            .accept(&invitation.id, &late_joiner)
            .await
            .unwrap();

        let stored = fixture.invites.invitation(&invitation.id).await.unwrap();
        assert_eq!(stored.status, InvitationStatus::Accepted);
        assert_eq!(stored.invited_account, Some(late_joiner));
    }

    #[tokio::test]
    async fn wrong_addressee_is_refused() {
        let fixture = setup(&[("friend@example.com", "friend")]).await;
        let (group_id, creator) = group_with_creator(&fixture).await;
        let outcome = fixture
            .invites
            .invite(&group_id, &creator, "friend@example.com", false)
            .await
            .unwrap();
        let invitation = match outcome {
            InviteOutcome::Sent(invitation) => invitation,
            other => panic!("expected a sent invitation, got {:?}", other),
        };

        let imposter = funded_account(&fixture, "imposter").await;
        let err = fixture
            .invites
            .accept(&invitation.id, &imposter)
            .await
            .unwrap_err();
        assert!(matches!(err, PurseError::NotAddressee));
    }

    #[tokio::test]
    async fn expired_invitation_fails_and_is_flipped_on_read() {
        let fixture = setup(&[("friend@example.com", "friend")]).await;
        let (group_id, creator) = group_with_creator(&fixture).await;
        let outcome = fixture
            .invites
            .invite(&group_id, &creator, "friend@example.com", false)
            .await
            .unwrap();
        let invitation = match outcome {
            InviteOutcome::Sent(invitation) => invitation,
            other => panic!("expected a sent invitation, got {:?}", other),
        };
        let invited = invitation.invited_account.clone().unwrap();

        {
            let mut table = fixture.invites.invitations.lock().await;
            let row = table.get_mut(&invitation.id).unwrap();
            row.expires_at = Utc::now() - Duration::hours(1);
        }

        let err = fixture
            .invites
            .accept(&invitation.id, &invited)
            .await
            .unwrap_err();
        assert!(matches!(err, PurseError::Expired { .. }));

        let stored = fixture.invites.invitation(&invitation.id).await.unwrap();
        assert_eq!(stored.status, InvitationStatus::Expired);
        assert!(fixture.invites.list_pending(&invited).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reject_leaves_membership_untouched() {
        let fixture = setup(&[("friend@example.com", "friend")]).await;
        let (group_id, creator) = group_with_creator(&fixture).await;
        let outcome = fixture
            .invites
            .invite(&group_id, &creator, "friend@example.com", false)
            .await
            .unwrap();
        let invitation = match outcome {
            InviteOutcome::Sent(invitation) => invitation,
            other => panic!("expected a sent invitation, got {:?}", other),
        };
        let invited = invitation.invited_account.clone().unwrap();

        fixture.invites.reject(&invitation.id, &invited).await.unwrap();

        let stored = fixture.invites.invitation(&invitation.id).await.unwrap();
        assert_eq!(stored.status, InvitationStatus::Rejected);
        assert_eq!(
            fixture
                .groups
                .group_snapshot(&group_id)
                .await
                .unwrap()
                .member_count(),
            1
        );
    }

    #[tokio::test]
    async fn accepting_into_a_full_group_fails_cleanly() {
        let fixture = setup(&[("friend@example.com", "friend")]).await;
        let creator = funded_account(&fixture, "creator").await;
        let state = fixture
            .groups
            .create_group(&creator, "duo", None, 2, Utc::now() + Duration::days(30))
            .await
            .unwrap();
        let group_id = state.group.id;
        let filler = funded_account(&fixture, "filler").await;
        fixture.groups.join_group(&group_id, &filler).await.unwrap();

        let outcome = fixture
            .invites
            .invite(&group_id, &creator, "friend@example.com", false)
            .await
            .unwrap();
        let invitation = match outcome {
            InviteOutcome::Sent(invitation) => invitation,
            other => panic!("expected a sent invitation, got {:?}", other),
        };
        let invited = invitation.invited_account.clone().unwrap();

        let err = fixture
            .invites
            .accept(&invitation.id, &invited)
            .await
            .unwrap_err();
        assert!(matches!(err, PurseError::GroupFull { capacity: 2 }));

        // The invitation survives the failed join and stays pending.
        let stored = fixture.invites.invitation(&invitation.id).await.unwrap();
        assert_eq!(stored.status, InvitationStatus::Pending);
    }
}
