//! Organization lifecycle: creation, slug allocation, default resolution
//! and healing, and idempotent auto-provisioning of personal workspaces.

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::authz::{self, org_disabled_noop, Gated, OrgContext};
use crate::capabilities::{Capability, MembershipRole};
use crate::error::{AppError, AppResult};
use crate::helpers::random_hex;
use crate::models::{
    Identity, Membership, MembershipStatus, Organization, OrgStatus, User,
};
use crate::store::StoreError;
use crate::AppState;

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 100;
const SLUG_MIN: usize = 3;
const SLUG_MAX: usize = 40;
const SLUG_ATTEMPTS: u32 = 50;

/// Slugs that collide with top-level routes in the hosting application.
const RESERVED_SLUGS: &[&str] = &[
    "app",
    "api",
    "auth",
    "callback",
    "create",
    "invite",
    "members",
    "new",
    "onboarding",
    "organization",
    "settings",
];

pub(crate) fn normalize_organization_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn validate_organization_name(name: &str) -> AppResult<String> {
    let name = normalize_organization_name(name);
    if name.chars().count() < NAME_MIN {
        return Err(AppError::validation(
            "Organization name must be at least 2 characters.",
        ));
    }
    if name.chars().count() > NAME_MAX {
        return Err(AppError::validation(
            "Organization name must be at most 100 characters.",
        ));
    }
    Ok(name)
}

/// Lowercase slug derived from arbitrary input: alphanumerics kept, runs of
/// anything else collapsed to single dashes, edges trimmed.
pub(crate) fn to_slug(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_dash = true;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

pub(crate) fn validate_slug(slug: &str) -> AppResult<String> {
    let slug = slug.trim().to_lowercase();
    if slug.len() < SLUG_MIN {
        return Err(AppError::validation(
            "Organization slug must be at least 3 characters.",
        ));
    }
    if slug.len() > SLUG_MAX {
        return Err(AppError::validation(
            "Organization slug must be at most 40 characters.",
        ));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        || slug.starts_with('-')
        || slug.ends_with('-')
    {
        return Err(AppError::validation(
            "Organization slug may only contain lowercase letters, digits and dashes.",
        ));
    }
    if RESERVED_SLUGS.contains(&slug.as_str()) {
        return Err(AppError::validation("This slug is reserved."));
    }
    Ok(slug)
}

/// Candidate for the nth allocation attempt: the base itself, then
/// `base-2`, `base-3`, … with the base truncated to keep the suffix within
/// the length cap.
fn slug_candidate(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        return base.to_string();
    }
    let suffix = format!("-{}", attempt + 1);
    let room = SLUG_MAX.saturating_sub(suffix.len());
    let truncated: String = base.chars().take(room).collect();
    let truncated = truncated.trim_end_matches('-');
    format!("{truncated}{suffix}")
}

/// Best-effort unique slug allocation. The pre-check is advisory only; the
/// unique index at write time is the real arbiter, so callers must still
/// handle a conflict on insert.
fn allocate_slug(state: &AppState, base: &str, exclude: Option<Uuid>) -> String {
    for attempt in 0..SLUG_ATTEMPTS {
        let candidate = slug_candidate(base, attempt);
        let taken = state
            .store
            .find_organization_by_slug(&candidate)
            .map(|existing| Some(existing.id) != exclude)
            .unwrap_or(false);
        if !taken {
            return candidate;
        }
    }
    format!("workspace-{}", random_hex(5))
}

/// Personal-workspace name synthesized from the first word of the display
/// name, then the email local part, then a generic fallback.
pub(crate) fn build_workspace_name(user: &User) -> String {
    let base = user
        .name
        .as_deref()
        .and_then(|n| n.split_whitespace().next())
        .map(ToString::to_string)
        .or_else(|| {
            user.email
                .split('@')
                .next()
                .map(str::trim)
                .filter(|local| !local.is_empty())
                .map(ToString::to_string)
        });
    let name = match base {
        Some(base) => normalize_organization_name(&format!("{base}'s Workspace")),
        None => "Personal Workspace".to_string(),
    };
    if name.chars().count() > NAME_MAX {
        name.chars().take(NAME_MAX).collect()
    } else {
        name
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateOrganizationArgs {
    pub name: String,
    pub slug: Option<String>,
    pub logo_url: Option<String>,
    /// Mirror id in the external directory; a local placeholder is
    /// generated when absent.
    pub external_org_id: Option<String>,
}

/// Organization annotated with the caller's role in it.
#[derive(Debug, Clone, Serialize)]
pub struct OrganizationView {
    pub organization: Organization,
    pub role: MembershipRole,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganizationSummary {
    pub organization: Organization,
    pub role: MembershipRole,
    pub is_default: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnsureOutcome {
    pub organization_id: Uuid,
    pub created: bool,
}

/// Insert the organization and the creator's owner membership, retrying
/// slug allocation once if the unique index rejects a racing duplicate.
fn insert_organization_with_owner(
    state: &AppState,
    user: &User,
    name: String,
    slug_base: &str,
    logo_url: Option<String>,
    external_org_id: Option<String>,
) -> AppResult<Uuid> {
    let external_org_id = external_org_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("org_local_{}", random_hex(10)));

    // Checked before the new membership exists so a fresh workspace never
    // displaces a still-valid default.
    let had_valid_default = authz::resolve_default_organization_id(state, user).is_some();

    let mut slug = allocate_slug(state, slug_base, None);
    let now = Utc::now();
    let organization_id = Uuid::new_v4();

    for attempt in 0..2 {
        let organization = Organization {
            id: organization_id,
            external_org_id: external_org_id.clone(),
            name: name.clone(),
            slug: slug.clone(),
            logo_url: logo_url.clone(),
            status: OrgStatus::Active,
            created_by: user.id,
            created_at: now,
            updated_at: now,
        };
        match state.store.insert_organization(organization) {
            Ok(()) => break,
            Err(StoreError::Conflict { index: "slug" }) if attempt == 0 => {
                // Lost the race; reallocate against the now-current state.
                slug = allocate_slug(state, slug_base, None);
            }
            Err(StoreError::Conflict { .. }) => {
                return Err(AppError::validation("Organization slug already exists."));
            }
            Err(err) => return Err(AppError::internal(err.to_string())),
        }
    }

    let membership = Membership {
        id: Uuid::new_v4(),
        organization_id,
        user_id: user.id,
        role: MembershipRole::Owner,
        status: MembershipStatus::Active,
        joined_at: Some(now),
        created_at: now,
        updated_at: now,
    };
    state
        .store
        .insert_membership(membership)
        .map_err(|err| AppError::internal(err.to_string()))?;

    // Adopt the new org as default only when the user had none valid.
    if !had_valid_default {
        set_user_default(state, user, Some(organization_id))?;
    }

    info!(organization_id = %organization_id, slug = %slug, created_by = %user.id, "Organization created");
    Ok(organization_id)
}

fn set_user_default(state: &AppState, user: &User, target: Option<Uuid>) -> AppResult<()> {
    let mut updated = match state.store.get_user(user.id) {
        Some(u) => u,
        None => return Err(AppError::UserNotFound("User not found.".into())),
    };
    updated.default_organization_id = target;
    updated.updated_at = Utc::now();
    state
        .store
        .update_user(updated)
        .map_err(|err| AppError::internal(err.to_string()))
}

/// Create an organization with the caller as owner.
///
/// Soft no-op when org mode is globally disabled: callers treat it as
/// "nothing to do", not a failure.
pub async fn create(
    state: &AppState,
    identity: Option<&Identity>,
    args: CreateOrganizationArgs,
) -> AppResult<Gated<Uuid>> {
    let user = authz::require_current_user(state, identity)?;

    if !state.config.get().is_org_enabled() {
        return Ok(Gated::Skipped(org_disabled_noop("organizations.create")));
    }

    let name = validate_organization_name(&args.name)?;
    let slug_base = match args.slug {
        Some(slug) => validate_slug(&slug)?,
        None => validate_slug(&to_slug(&name))?,
    };

    let organization_id = insert_organization_with_owner(
        state,
        &user,
        name,
        &slug_base,
        args.logo_url,
        args.external_org_id,
    )?;
    Ok(Gated::Applied(organization_id))
}

/// Idempotent auto-provisioning: return the user's default organization,
/// creating a personal workspace when they have none.
///
/// `force_provision` provisions even while org mode is disabled, so that
/// re-enabling multi-tenancy later finds every user already in a
/// workspace.
pub async fn ensure_for_current_user(
    state: &AppState,
    identity: Option<&Identity>,
    force_provision: bool,
) -> AppResult<Gated<EnsureOutcome>> {
    let user = authz::require_current_user(state, identity)?;

    if !state.config.get().is_org_enabled() && !force_provision {
        return Ok(Gated::Skipped(org_disabled_noop(
            "organizations.ensure_for_current_user",
        )));
    }

    if let Some(organization_id) = authz::resolve_default_organization_id(state, &user) {
        // Heal a stale stored default so later reads agree with resolution.
        if user.default_organization_id != Some(organization_id) {
            set_user_default(state, &user, Some(organization_id))?;
        }
        return Ok(Gated::Applied(EnsureOutcome {
            organization_id,
            created: false,
        }));
    }

    let name = build_workspace_name(&user);
    let slug_base = match validate_slug(&to_slug(&name)) {
        Ok(slug) => slug,
        Err(_) => format!("workspace-{}", random_hex(5)),
    };
    let organization_id =
        insert_organization_with_owner(state, &user, name, &slug_base, None, None)?;
    set_user_default(state, &user, Some(organization_id))?;

    Ok(Gated::Applied(EnsureOutcome {
        organization_id,
        created: true,
    }))
}

/// Organization the caller can read, or `None` when access is denied.
pub async fn get(
    state: &AppState,
    identity: Option<&Identity>,
    organization_id: Option<Uuid>,
) -> AppResult<Option<OrganizationView>> {
    let access =
        match authz::require_org_capability(state, identity, Capability::OrgRead, organization_id)
        {
            Ok(access) => access,
            Err(err) if err.is_access_denied() => return Ok(None),
            Err(err) => return Err(err),
        };

    let organization_id = match access.context.organization_id() {
        Some(id) => id,
        None => return Ok(None),
    };
    Ok(state
        .store
        .get_organization(organization_id)
        .map(|organization| OrganizationView {
            organization,
            role: access.context.role(),
        }))
}

pub async fn get_by_slug(
    state: &AppState,
    identity: Option<&Identity>,
    slug: &str,
) -> AppResult<Option<OrganizationView>> {
    let organization = match state.store.find_organization_by_slug(&slug.to_lowercase()) {
        Some(organization) => organization,
        None => return Ok(None),
    };
    match authz::require_org_capability(
        state,
        identity,
        Capability::OrgRead,
        Some(organization.id),
    ) {
        Ok(access) => Ok(Some(OrganizationView {
            organization,
            role: access.context.role(),
        })),
        Err(err) if err.is_access_denied() => Ok(None),
        Err(err) => Err(err),
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOrganizationArgs {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub logo_url: Option<Option<String>>,
}

/// Update settings; slug changes re-validate and re-check uniqueness
/// excluding the organization's own row.
pub async fn update(
    state: &AppState,
    identity: Option<&Identity>,
    organization_id: Uuid,
    args: UpdateOrganizationArgs,
) -> AppResult<Organization> {
    let access = authz::require_org_capability(
        state,
        identity,
        Capability::OrgSettingsManage,
        Some(organization_id),
    )?;

    let mut organization = state
        .store
        .get_organization(organization_id)
        .ok_or_else(|| AppError::OrgNotFound("Organization not found.".into()))?;

    if let Some(name) = args.name {
        organization.name = validate_organization_name(&name)?;
    }
    if let Some(slug) = args.slug {
        let slug = validate_slug(&slug)?;
        let taken = state
            .store
            .find_organization_by_slug(&slug)
            .map(|existing| existing.id != organization_id)
            .unwrap_or(false);
        if taken {
            return Err(AppError::validation("Organization slug already exists."));
        }
        organization.slug = slug;
    }
    if let Some(logo_url) = args.logo_url {
        organization.logo_url = logo_url;
    }
    organization.updated_at = Utc::now();

    match state.store.update_organization(organization.clone()) {
        Ok(()) => {}
        Err(StoreError::Conflict { index: "slug" }) => {
            return Err(AppError::validation("Organization slug already exists."));
        }
        Err(err) => return Err(AppError::internal(err.to_string())),
    }

    info!(organization_id = %organization.id, updated_by = %access.user.id, "Organization updated");
    Ok(organization)
}

/// All organizations where the caller holds an active membership,
/// `is_default` computed with the same resolution rule the access
/// resolver uses. Degrades to an empty list without access.
pub async fn list_for_user(
    state: &AppState,
    identity: Option<&Identity>,
) -> AppResult<Vec<OrganizationSummary>> {
    let user = match authz::authenticated_user(state, identity) {
        Some(user) => user,
        None => return Ok(Vec::new()),
    };
    if !state.config.get().is_org_enabled() {
        return Ok(Vec::new());
    }

    let default_id = authz::resolve_default_organization_id(state, &user);
    let summaries = authz::active_memberships_oldest_first(state, user.id)
        .into_iter()
        .filter_map(|membership| {
            state
                .store
                .get_organization(membership.organization_id)
                .map(|organization| OrganizationSummary {
                    is_default: default_id == Some(organization.id),
                    role: membership.role,
                    organization,
                })
        })
        .collect();
    Ok(summaries)
}

/// Caller's effective org context, or `None` when access is denied.
pub async fn get_org_context(
    state: &AppState,
    identity: Option<&Identity>,
    organization_id: Option<Uuid>,
) -> AppResult<Option<OrgContext>> {
    match authz::resolve_org_context(state, identity, organization_id) {
        Ok(access) => Ok(Some(access.context)),
        Err(err) if err.is_access_denied() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Public slug availability probe. Invalid or reserved slugs read as
/// unavailable rather than erroring.
pub async fn check_slug_available(state: &AppState, slug: &str) -> bool {
    match validate_slug(slug) {
        Ok(slug) => state.store.find_organization_by_slug(&slug).is_none(),
        Err(_) => false,
    }
}

/// Pin the caller's default organization; requires readable membership.
pub async fn set_default_organization(
    state: &AppState,
    identity: Option<&Identity>,
    organization_id: Uuid,
) -> AppResult<Gated<()>> {
    let user = authz::require_current_user(state, identity)?;

    if !state.config.get().is_org_enabled() {
        return Ok(Gated::Skipped(org_disabled_noop(
            "organizations.set_default_organization",
        )));
    }

    authz::require_org_capability(state, identity, Capability::OrgRead, Some(organization_id))?;
    set_user_default(state, &user, Some(organization_id))?;
    Ok(Gated::Applied(()))
}

/// Heal a user's default after they lose a membership: next-oldest active
/// membership's organization, or cleared when none remain.
pub(crate) fn heal_default_after_loss(
    state: &AppState,
    user_id: Uuid,
    lost_organization_id: Uuid,
) -> AppResult<()> {
    let user = match state.store.get_user(user_id) {
        Some(user) => user,
        None => return Ok(()),
    };
    if user.default_organization_id != Some(lost_organization_id) {
        return Ok(());
    }
    let next = authz::active_memberships_oldest_first(state, user_id)
        .into_iter()
        .find(|m| {
            m.organization_id != lost_organization_id
                && state.store.get_organization(m.organization_id).is_some()
        })
        .map(|m| m.organization_id);
    set_user_default(state, &user, next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_slug() {
        assert_eq!(to_slug("Acme Inc."), "acme-inc");
        assert_eq!(to_slug("  --Hello__World--  "), "hello-world");
        assert_eq!(to_slug("ALLCAPS123"), "allcaps123");
        assert_eq!(to_slug("***"), "");
    }

    #[test]
    fn test_validate_organization_name() {
        assert_eq!(
            validate_organization_name("  Acme   Inc.  ").unwrap(),
            "Acme Inc."
        );
        assert!(validate_organization_name("A").is_err());
        assert!(validate_organization_name(&"x".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_slug_rules() {
        assert_eq!(validate_slug(" Acme ").unwrap(), "acme");
        assert!(validate_slug("ab").is_err());
        assert!(validate_slug("has space").is_err());
        assert!(validate_slug("-edge").is_err());
        assert!(validate_slug("edge-").is_err());
        assert!(validate_slug(&"a".repeat(41)).is_err());
    }

    #[test]
    fn test_reserved_slugs_rejected() {
        for reserved in RESERVED_SLUGS {
            if reserved.len() >= SLUG_MIN {
                assert!(validate_slug(reserved).is_err(), "{reserved} should be reserved");
            }
        }
    }

    #[test]
    fn test_slug_candidate_suffixes_and_truncates() {
        assert_eq!(slug_candidate("acme", 0), "acme");
        assert_eq!(slug_candidate("acme", 1), "acme-2");
        assert_eq!(slug_candidate("acme", 9), "acme-10");

        let long = "a".repeat(SLUG_MAX);
        let candidate = slug_candidate(&long, 1);
        assert!(candidate.len() <= SLUG_MAX);
        assert!(candidate.ends_with("-2"));
    }

    #[test]
    fn test_build_workspace_name() {
        let mut user = User {
            id: Uuid::new_v4(),
            auth_id: "auth_1".to_string(),
            email: "jamie@example.com".to_string(),
            name: Some("Jamie Rivera".to_string()),
            avatar_url: None,
            default_organization_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(build_workspace_name(&user), "Jamie's Workspace");

        user.name = None;
        assert_eq!(build_workspace_name(&user), "jamie's Workspace");

        user.name = Some("   ".to_string());
        assert_eq!(build_workspace_name(&user), "jamie's Workspace");
    }
}
