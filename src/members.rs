//! Membership mutation rules and the invitation state machine.
//!
//! Invitations move `pending -> accepted | declined | expired`, terminal
//! once resolved; expiry is observed lazily at read and accept time.
//! Membership rows soft-transition, and every mutation that could strip an
//! organization of its last active owner is refused.

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::authz;
use crate::capabilities::{Capability, MembershipRole};
use crate::email;
use crate::error::{AppError, AppResult};
use crate::helpers::{normalize_email, random_hex};
use crate::models::{
    Identity, Invitation, InvitationStatus, InviteRole, Membership, MembershipStatus,
};
use crate::organizations;
use crate::AppState;

/// Membership joined with the member's profile for listings.
#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    pub membership: Membership,
    pub user: MemberProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberProfile {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvitationView {
    pub id: Uuid,
    pub email: String,
    pub role: InviteRole,
    pub status: InvitationStatus,
    pub expires_at: chrono::DateTime<Utc>,
    pub created_at: chrono::DateTime<Utc>,
    pub invited_by: Option<MemberProfile>,
}

/// Invite landing-page view; the token itself is the access credential.
#[derive(Debug, Clone, Serialize)]
pub struct InvitePreview {
    pub organization_name: String,
    pub email: String,
    pub role: InviteRole,
    pub status: InvitationStatus,
    pub expires_at: chrono::DateTime<Utc>,
    pub invited_by_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InviteOutcome {
    pub invitation_id: Uuid,
    pub token: String,
    pub email_sent: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AcceptOutcome {
    pub organization_id: Uuid,
    pub membership_id: Uuid,
}

/// Membership mutations keep their owner/admin gate even when the strict
/// RBAC flag is off; the flag relaxes capability checks, not who may
/// manage members.
fn require_manager_role(access: &authz::OrgAccess) -> AppResult<()> {
    match access.context.role() {
        MembershipRole::Owner | MembershipRole::Admin => Ok(()),
        MembershipRole::Member => Err(AppError::OrgForbidden(
            "Only owners and admins can manage members.".into(),
        )),
    }
}

fn count_active_owners(state: &AppState, organization_id: Uuid) -> usize {
    state
        .store
        .list_memberships_for_org(organization_id)
        .iter()
        .filter(|m| m.is_active() && m.role == MembershipRole::Owner)
        .count()
}

fn profile_for(state: &AppState, user_id: Uuid) -> Option<MemberProfile> {
    state.store.get_user(user_id).map(|user| MemberProfile {
        id: user.id,
        email: user.email,
        name: user.name,
        avatar_url: user.avatar_url,
    })
}

/// Active and pending members of an organization. Degrades to an empty
/// list without read access.
pub async fn list(
    state: &AppState,
    identity: Option<&Identity>,
    organization_id: Option<Uuid>,
) -> AppResult<Vec<MemberView>> {
    let access =
        match authz::require_org_capability(state, identity, Capability::OrgRead, organization_id)
        {
            Ok(access) => access,
            Err(err) if err.is_access_denied() => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
    let organization_id = match access.context.organization_id() {
        Some(id) => id,
        None => return Ok(Vec::new()),
    };

    let mut memberships: Vec<_> = state
        .store
        .list_memberships_for_org(organization_id)
        .into_iter()
        .filter(|m| m.status != MembershipStatus::Inactive)
        .collect();
    memberships.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    Ok(memberships
        .into_iter()
        .filter_map(|membership| {
            profile_for(state, membership.user_id).map(|user| MemberView { membership, user })
        })
        .collect())
}

/// The caller's own membership in the resolved organization, or `None`.
pub async fn get_membership(
    state: &AppState,
    identity: Option<&Identity>,
    organization_id: Option<Uuid>,
) -> AppResult<Option<Membership>> {
    let access = match authz::resolve_org_context(state, identity, organization_id) {
        Ok(access) => access,
        Err(err) if err.is_access_denied() => return Ok(None),
        Err(err) => return Err(err),
    };
    let organization_id = match access.context.organization_id() {
        Some(id) => id,
        None => return Ok(None),
    };
    Ok(state.store.find_membership(organization_id, access.user.id))
}

/// Change a member's role.
///
/// Owner roles are owner-only territory in both directions: only an owner
/// may change another owner's role or promote anyone to owner. Demoting
/// the last active owner is refused.
pub async fn update_role(
    state: &AppState,
    identity: Option<&Identity>,
    membership_id: Uuid,
    new_role: MembershipRole,
) -> AppResult<Membership> {
    let mut target = state
        .store
        .get_membership(membership_id)
        .ok_or_else(|| AppError::validation("Membership not found."))?;

    let access = authz::require_org_capability(
        state,
        identity,
        Capability::OrgMembersManage,
        Some(target.organization_id),
    )?;
    require_manager_role(&access)?;

    if (target.role == MembershipRole::Owner || new_role == MembershipRole::Owner)
        && access.context.role() != MembershipRole::Owner
    {
        return Err(AppError::OrgForbidden(
            "Only owners can manage owner roles.".into(),
        ));
    }

    if target.role == new_role {
        return Ok(target);
    }

    if target.role == MembershipRole::Owner
        && target.is_active()
        && count_active_owners(state, target.organization_id) <= 1
    {
        return Err(AppError::validation("Cannot demote the only owner."));
    }

    target.role = new_role;
    target.updated_at = Utc::now();
    state
        .store
        .update_membership(target.clone())
        .map_err(|err| AppError::internal(err.to_string()))?;

    info!(
        membership_id = %target.id,
        organization_id = %target.organization_id,
        role = %new_role,
        changed_by = %access.user.id,
        "Member role updated"
    );
    Ok(target)
}

/// Remove a member: soft-transition to `inactive` and heal their default
/// organization. Self-removal is always permitted; removing anyone else
/// requires member management.
pub async fn remove(
    state: &AppState,
    identity: Option<&Identity>,
    membership_id: Uuid,
) -> AppResult<()> {
    let mut target = state
        .store
        .get_membership(membership_id)
        .ok_or_else(|| AppError::validation("Membership not found."))?;

    let user = authz::require_current_user(state, identity)?;
    let is_self = target.user_id == user.id;

    if is_self {
        if !state.config.get().is_org_enabled() {
            return Err(AppError::OrgDisabled(
                "Organization features are disabled by runtime configuration.".into(),
            ));
        }
    } else {
        let access = authz::require_org_capability(
            state,
            identity,
            Capability::OrgMembersManage,
            Some(target.organization_id),
        )?;
        require_manager_role(&access)?;
    }

    if !target.status.can_transition_to(MembershipStatus::Inactive) {
        return Err(AppError::validation("Member is already removed."));
    }

    if target.role == MembershipRole::Owner
        && target.is_active()
        && count_active_owners(state, target.organization_id) <= 1
    {
        return Err(AppError::validation("Cannot remove the only owner."));
    }

    target.status = MembershipStatus::Inactive;
    target.updated_at = Utc::now();
    state
        .store
        .update_membership(target.clone())
        .map_err(|err| AppError::internal(err.to_string()))?;

    organizations::heal_default_after_loss(state, target.user_id, target.organization_id)?;

    info!(
        membership_id = %target.id,
        organization_id = %target.organization_id,
        removed_by = %user.id,
        self_removal = is_self,
        "Member removed"
    );
    Ok(())
}

#[derive(Debug, Clone)]
pub struct InviteArgs {
    pub organization_id: Option<Uuid>,
    pub email: String,
    pub role: InviteRole,
}

/// Create a pending invitation and, when enabled, send the invite email.
///
/// The email send is best-effort: the invitation row is already committed
/// and the link stays valid, so delivery failure never fails the
/// mutation.
pub async fn invite(
    state: &AppState,
    identity: Option<&Identity>,
    args: InviteArgs,
) -> AppResult<InviteOutcome> {
    let access = authz::require_org_capability(
        state,
        identity,
        Capability::OrgMembersManage,
        args.organization_id,
    )?;
    let organization_id = access
        .context
        .organization_id()
        .ok_or_else(|| AppError::OrgDisabled("A real organization is required.".into()))?;

    let invite_email = normalize_email(&args.email);
    if invite_email.is_empty() || !invite_email.contains('@') {
        return Err(AppError::validation("A valid email address is required."));
    }

    if let Some(existing_user) = state.store.find_user_by_email(&invite_email) {
        let already_member = state
            .store
            .find_membership(organization_id, existing_user.id)
            .map(|m| m.is_active())
            .unwrap_or(false);
        if already_member {
            return Err(AppError::validation(
                "This email already belongs to a member of this organization.",
            ));
        }
    }

    if state
        .store
        .find_pending_invitation(organization_id, &invite_email)
        .is_some()
    {
        return Err(AppError::validation(
            "An invitation has already been sent to this email.",
        ));
    }

    let now = Utc::now();
    let invitation = Invitation {
        id: Uuid::new_v4(),
        organization_id,
        email: invite_email.clone(),
        role: args.role,
        invited_by: access.user.id,
        token: random_hex(32),
        expires_at: now + Duration::days(state.settings.invite_expiry_days),
        status: InvitationStatus::Pending,
        created_at: now,
    };
    let (invitation_id, token) = (invitation.id, invitation.token.clone());
    state
        .store
        .insert_invitation(invitation)
        .map_err(|err| AppError::internal(err.to_string()))?;

    let email_sent = if access
        .config
        .is_feature_enabled(crate::config::OrgFeatureFlag::InviteEmails)
    {
        send_invite_email(state, &access, organization_id, &invite_email, args.role, &token).await
    } else {
        false
    };

    info!(
        invitation_id = %invitation_id,
        organization_id = %organization_id,
        invited_by = %access.user.id,
        email_sent,
        "Invitation created"
    );
    Ok(InviteOutcome {
        invitation_id,
        token,
        email_sent,
    })
}

async fn send_invite_email(
    state: &AppState,
    access: &authz::OrgAccess,
    organization_id: Uuid,
    to: &str,
    role: InviteRole,
    token: &str,
) -> bool {
    let organization_name = state
        .store
        .get_organization(organization_id)
        .map(|o| o.name)
        .unwrap_or_else(|| "your team".to_string());
    let invite_url = format!(
        "{}/invite/{token}",
        state.settings.site_url.trim_end_matches('/')
    );
    let message = email::build_invite_email(
        &organization_name,
        access.user.name.as_deref(),
        role,
        &invite_url,
    );

    let outcome = state.email.send(to, &message.subject, &message.html).await;
    if !outcome.sent {
        warn!(
            organization_id = %organization_id,
            reason = outcome.reason.as_deref().unwrap_or("unknown"),
            "Invite email delivery failed; invitation link remains valid"
        );
    }
    outcome.sent
}

/// Shared pending-invitation gate for accept and decline: lazily expires
/// an overdue row, then enforces the email binding against the caller.
fn take_pending_invitation(
    state: &AppState,
    caller_email: &str,
    token: &str,
) -> AppResult<Invitation> {
    let invitation = state
        .store
        .find_invitation_by_token(token)
        .ok_or_else(|| AppError::validation("Invitation not found."))?;

    if invitation.status != InvitationStatus::Pending {
        return Err(AppError::validation("This invitation is no longer valid."));
    }

    if invitation.is_expired_at(Utc::now()) {
        let mut expired = invitation;
        expired.status = InvitationStatus::Expired;
        state
            .store
            .update_invitation(expired)
            .map_err(|err| AppError::internal(err.to_string()))?;
        return Err(AppError::validation("This invitation has expired."));
    }

    if !invitation.email.eq_ignore_ascii_case(caller_email) {
        return Err(AppError::validation(
            "This invitation was sent to a different email address.",
        ));
    }

    Ok(invitation)
}

/// Accept a pending invitation addressed to the caller's email.
///
/// An `inactive` membership for the same org is reactivated and re-roled
/// instead of inserting a second row.
pub async fn accept_invite(
    state: &AppState,
    identity: Option<&Identity>,
    token: &str,
) -> AppResult<AcceptOutcome> {
    let user = authz::require_current_user(state, identity)?;

    if !state.config.get().is_org_enabled() {
        return Err(AppError::OrgDisabled(
            "Organization features are disabled by runtime configuration.".into(),
        ));
    }

    let invitation = take_pending_invitation(state, &user.email, token)?;
    let organization_id = invitation.organization_id;

    if state.store.get_organization(organization_id).is_none() {
        return Err(AppError::OrgNotFound(
            "This organization no longer exists.".into(),
        ));
    }

    let now = Utc::now();
    let membership_id = match state.store.find_membership(organization_id, user.id) {
        // Already a member; accepting is a no-op beyond resolving the
        // invitation itself.
        Some(existing) if existing.is_active() => existing.id,
        Some(mut existing) => {
            existing.status = MembershipStatus::Active;
            existing.role = invitation.role.as_membership_role();
            existing.joined_at = Some(now);
            existing.updated_at = now;
            let id = existing.id;
            state
                .store
                .update_membership(existing)
                .map_err(|err| AppError::internal(err.to_string()))?;
            id
        }
        None => {
            let membership = Membership {
                id: Uuid::new_v4(),
                organization_id,
                user_id: user.id,
                role: invitation.role.as_membership_role(),
                status: MembershipStatus::Active,
                joined_at: Some(now),
                created_at: now,
                updated_at: now,
            };
            let id = membership.id;
            state
                .store
                .insert_membership(membership)
                .map_err(|err| AppError::internal(err.to_string()))?;
            id
        }
    };

    let mut accepted = invitation;
    accepted.status = InvitationStatus::Accepted;
    state
        .store
        .update_invitation(accepted)
        .map_err(|err| AppError::internal(err.to_string()))?;

    adopt_default_if_stale(state, user.id, organization_id)?;

    info!(
        organization_id = %organization_id,
        membership_id = %membership_id,
        user_id = %user.id,
        "Invitation accepted"
    );
    Ok(AcceptOutcome {
        organization_id,
        membership_id,
    })
}

/// Point the user's default at `organization_id` when their stored default
/// no longer maps to an active membership of a live organization.
fn adopt_default_if_stale(
    state: &AppState,
    user_id: Uuid,
    organization_id: Uuid,
) -> AppResult<()> {
    let user = match state.store.get_user(user_id) {
        Some(user) => user,
        None => return Ok(()),
    };
    let stored_valid = user
        .default_organization_id
        .map(|default_id| {
            state
                .store
                .find_membership(default_id, user.id)
                .map(|m| m.is_active())
                .unwrap_or(false)
                && state.store.get_organization(default_id).is_some()
        })
        .unwrap_or(false);
    if stored_valid {
        return Ok(());
    }

    let mut updated = user;
    updated.default_organization_id = Some(organization_id);
    updated.updated_at = Utc::now();
    state
        .store
        .update_user(updated)
        .map_err(|err| AppError::internal(err.to_string()))
}

/// Decline a pending invitation addressed to the caller. Terminal; no
/// membership change.
pub async fn decline_invite(
    state: &AppState,
    identity: Option<&Identity>,
    token: &str,
) -> AppResult<()> {
    let user = authz::require_current_user(state, identity)?;

    if !state.config.get().is_org_enabled() {
        return Err(AppError::OrgDisabled(
            "Organization features are disabled by runtime configuration.".into(),
        ));
    }

    let invitation = take_pending_invitation(state, &user.email, token)?;

    let mut declined = invitation;
    declined.status = InvitationStatus::Declined;
    state
        .store
        .update_invitation(declined.clone())
        .map_err(|err| AppError::internal(err.to_string()))?;

    info!(
        invitation_id = %declined.id,
        organization_id = %declined.organization_id,
        "Invitation declined"
    );
    Ok(())
}

/// Token-addressed invitation lookup for the invite landing page. The
/// expiry transition is applied lazily here too, so a stale pending row
/// reads back as `expired`.
pub async fn get_invite_by_token(
    state: &AppState,
    token: &str,
) -> AppResult<Option<InvitePreview>> {
    let invitation = match state.store.find_invitation_by_token(token) {
        Some(invitation) => invitation,
        None => return Ok(None),
    };

    let invitation = if invitation.status == InvitationStatus::Pending
        && invitation.is_expired_at(Utc::now())
    {
        let mut expired = invitation;
        expired.status = InvitationStatus::Expired;
        state
            .store
            .update_invitation(expired.clone())
            .map_err(|err| AppError::internal(err.to_string()))?;
        expired
    } else {
        invitation
    };

    let organization_name = state
        .store
        .get_organization(invitation.organization_id)
        .map(|o| o.name)
        .unwrap_or_default();
    let invited_by_name = state
        .store
        .get_user(invitation.invited_by)
        .and_then(|u| u.name);

    Ok(Some(InvitePreview {
        organization_name,
        email: invitation.email,
        role: invitation.role,
        status: invitation.status,
        expires_at: invitation.expires_at,
        invited_by_name,
    }))
}

/// Pending invitations for an organization with inviter profiles.
/// Degrades to an empty list without member-management access.
pub async fn list_invitations(
    state: &AppState,
    identity: Option<&Identity>,
    organization_id: Option<Uuid>,
) -> AppResult<Vec<InvitationView>> {
    let access = match authz::require_org_capability(
        state,
        identity,
        Capability::OrgMembersManage,
        organization_id,
    ) {
        Ok(access) => access,
        Err(err) if err.is_access_denied() => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let organization_id = match access.context.organization_id() {
        Some(id) => id,
        None => return Ok(Vec::new()),
    };

    let mut invitations: Vec<_> = state
        .store
        .list_invitations_for_org(organization_id)
        .into_iter()
        .filter(|i| i.status == InvitationStatus::Pending)
        .collect();
    invitations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    Ok(invitations
        .into_iter()
        .map(|invitation| InvitationView {
            invited_by: profile_for(state, invitation.invited_by),
            id: invitation.id,
            email: invitation.email,
            role: invitation.role,
            status: invitation.status,
            expires_at: invitation.expires_at,
            created_at: invitation.created_at,
        })
        .collect())
}

/// Delete a pending invitation outright; resolved invitations keep their
/// terminal row.
pub async fn cancel_invitation(
    state: &AppState,
    identity: Option<&Identity>,
    invitation_id: Uuid,
) -> AppResult<()> {
    let invitation = state
        .store
        .get_invitation(invitation_id)
        .ok_or_else(|| AppError::validation("Invitation not found."))?;

    let access = authz::require_org_capability(
        state,
        identity,
        Capability::OrgMembersManage,
        Some(invitation.organization_id),
    )?;

    if invitation.status != InvitationStatus::Pending {
        return Err(AppError::validation(
            "Only pending invitations can be cancelled.",
        ));
    }

    state
        .store
        .delete_invitation(invitation_id)
        .map_err(|err| AppError::internal(err.to_string()))?;

    info!(
        invitation_id = %invitation_id,
        organization_id = %invitation.organization_id,
        cancelled_by = %access.user.id,
        "Invitation cancelled"
    );
    Ok(())
}
