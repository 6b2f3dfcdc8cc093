//! Group invitations, for existing accounts and external email invitees.

use crate::{AccountId, GroupId, InvitationId, InviteToken};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Invitation lifecycle. Transitions are one-way; `Expired` may also be
/// derived lazily from the clock when a stale pending row is read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Expired,
}

/// An invitation to join a contribution group.
///
/// `invited_account` is set when the email resolved to a known user at send
/// time; external invitations stay unbound until the invitee registers and
/// claims the token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub group_id: GroupId,
    pub invited_account: Option<AccountId>,
    pub invited_email: String,
    pub inviter: AccountId,
    /// Single-use claim token, random.
    pub token: InviteToken,
    pub status: InvitationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Invitation {
    pub fn new(
        group_id: GroupId,
        invited_account: Option<AccountId>,
        invited_email: impl Into<String>,
        inviter: AccountId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: InvitationId::generate(),
            group_id,
            invited_account,
            invited_email: invited_email.into(),
            inviter,
            token: InviteToken::generate(),
            status: InvitationStatus::Pending,
            expires_at,
            created_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whether `account` may act on this invitation. Unbound (external)
    /// invitations can be claimed by whoever presents the token.
    pub fn addressed_to(&self, account: &AccountId) -> bool {
        match &self.invited_account {
            Some(bound) => bound == account,
            None => true,
        }
    }
}
