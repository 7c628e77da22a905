//! Document types stored by the core and the caller identity shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capabilities::MembershipRole;

/// Authenticated identity produced by the external identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable identity-provider subject id.
    pub subject: String,
    pub email: String,
}

impl Identity {
    pub fn new(subject: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            email: email.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Identity-provider subject id; unique and stable.
    pub auth_id: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    /// Back-reference, not ownership; must point at an active membership or
    /// be healed.
    pub default_organization_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgStatus {
    Active,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    /// Mirror id in the external identity/directory provider.
    pub external_org_id: String,
    pub name: String,
    /// Globally unique, normalized.
    pub slug: String,
    pub logo_url: Option<String>,
    /// Gates non-billing capability checks.
    pub status: OrgStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Pending,
    Active,
    Inactive,
}

impl MembershipStatus {
    /// Legal transitions. Rows are soft-transitioned, never deleted, so the
    /// table is the whole lifecycle: nothing returns to `pending`.
    pub fn can_transition_to(self, next: MembershipStatus) -> bool {
        use MembershipStatus::*;
        matches!(
            (self, next),
            (Pending, Active) | (Pending, Inactive) | (Active, Inactive) | (Inactive, Active)
        )
    }
}

/// One membership row per (organization, user) pair; removal transitions to
/// `inactive` rather than deleting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: MembershipRole,
    pub status: MembershipStatus,
    pub joined_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }
}

/// Invitations never grant `owner` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteRole {
    Admin,
    Member,
}

impl InviteRole {
    pub fn as_membership_role(self) -> MembershipRole {
        match self {
            InviteRole::Admin => MembershipRole::Admin,
            InviteRole::Member => MembershipRole::Member,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

impl InvitationStatus {
    /// Once resolved an invitation never changes again.
    pub fn is_terminal(self) -> bool {
        self != InvitationStatus::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Uuid,
    pub organization_id: Uuid,
    /// Normalized to lowercase at creation; acceptance matches
    /// case-insensitively against the caller's authenticated email.
    pub email: String,
    pub role: InviteRole,
    pub invited_by: Uuid,
    /// Unguessable random identifier; the invite link is the secret.
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
}

impl Invitation {
    /// Expiry is observed lazily on read/accept, not swept by a timer.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_transition_table() {
        use MembershipStatus::*;

        assert!(Pending.can_transition_to(Active));
        assert!(Pending.can_transition_to(Inactive));
        assert!(Active.can_transition_to(Inactive));
        assert!(Inactive.can_transition_to(Active));

        // Nothing returns to pending, and self-transitions are not listed.
        assert!(!Inactive.can_transition_to(Pending));
        assert!(!Active.can_transition_to(Pending));
        assert!(!Active.can_transition_to(Active));
        assert!(!Inactive.can_transition_to(Inactive));
    }

    #[test]
    fn test_invitation_terminality() {
        assert!(!InvitationStatus::Pending.is_terminal());
        assert!(InvitationStatus::Accepted.is_terminal());
        assert!(InvitationStatus::Declined.is_terminal());
        assert!(InvitationStatus::Expired.is_terminal());
    }

    #[test]
    fn test_invite_role_never_maps_to_owner() {
        assert_eq!(
            InviteRole::Admin.as_membership_role(),
            MembershipRole::Admin
        );
        assert_eq!(
            InviteRole::Member.as_membership_role(),
            MembershipRole::Member
        );
    }

    #[test]
    fn test_status_serde_wire_format() {
        assert_eq!(
            serde_json::to_value(MembershipStatus::Inactive).unwrap(),
            "inactive"
        );
        assert_eq!(
            serde_json::to_value(InvitationStatus::Declined).unwrap(),
            "declined"
        );
        assert_eq!(serde_json::to_value(OrgStatus::Active).unwrap(), "active");
    }
}
