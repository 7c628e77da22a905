//! Caller-to-organization context resolution and capability enforcement.
//!
//! Every org-scoped operation starts here: resolve who the caller is, which
//! organization they are acting within, and what their role permits. When
//! multi-tenancy is disabled the resolver hands back a shim context instead
//! of failing, so downstream code holds an [`OrgContext`] either way and
//! only operations that need a real organization row have to care.

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::capabilities::{capabilities_for, has_capability, Capability, MembershipRole};
use crate::config::{AppConfig, OrgFeatureFlag};
use crate::error::{AppError, AppResult};
use crate::models::{Identity, OrgStatus, User};
use crate::AppState;

/// Effective organization context for a caller.
///
/// `Shim` stands in when multi-tenancy is globally disabled: a synthetic
/// owner context with the full capability set and no backing row. `Real`
/// is resolved from an actual membership. Consumers must match on the
/// variant; anything that mutates org-owned data requires `Real`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum OrgContext {
    Shim {
        role: MembershipRole,
        org_status: OrgStatus,
        capabilities: &'static [Capability],
    },
    Real {
        organization_id: Uuid,
        role: MembershipRole,
        org_status: OrgStatus,
        capabilities: &'static [Capability],
    },
}

impl OrgContext {
    fn shim() -> Self {
        OrgContext::Shim {
            role: MembershipRole::Owner,
            org_status: OrgStatus::Disabled,
            capabilities: capabilities_for(MembershipRole::Owner),
        }
    }

    pub fn is_shim(&self) -> bool {
        matches!(self, OrgContext::Shim { .. })
    }

    /// The backing organization id, absent for shim contexts.
    pub fn organization_id(&self) -> Option<Uuid> {
        match self {
            OrgContext::Shim { .. } => None,
            OrgContext::Real {
                organization_id, ..
            } => Some(*organization_id),
        }
    }

    pub fn role(&self) -> MembershipRole {
        match self {
            OrgContext::Shim { role, .. } | OrgContext::Real { role, .. } => *role,
        }
    }

    pub fn org_status(&self) -> OrgStatus {
        match self {
            OrgContext::Shim { org_status, .. } | OrgContext::Real { org_status, .. } => {
                *org_status
            }
        }
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            OrgContext::Shim { capabilities, .. } | OrgContext::Real { capabilities, .. } => {
                capabilities
            }
        }
    }
}

/// Resolved caller, their org context, and the config snapshot the
/// resolution was made under.
#[derive(Debug, Clone)]
pub struct OrgAccess {
    pub user: User,
    pub context: OrgContext,
    pub config: AppConfig,
}

/// Soft-fail result for mutations skipped while org mode is disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrgDisabledNoop {
    /// Always `false`.
    pub applied: bool,
    pub reason: &'static str,
    pub operation: &'static str,
}

pub fn org_disabled_noop(operation: &'static str) -> OrgDisabledNoop {
    OrgDisabledNoop {
        applied: false,
        reason: "org_disabled",
        operation,
    }
}

/// Outcome of a mutation that soft-fails when org mode is disabled.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Gated<T> {
    Applied(T),
    Skipped(OrgDisabledNoop),
}

impl<T> Gated<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Gated::Applied(value) => Some(value),
            Gated::Skipped(_) => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Gated::Skipped(_))
    }
}

pub(crate) fn authenticated_user(state: &AppState, identity: Option<&Identity>) -> Option<User> {
    let identity = identity?;
    state.store.find_user_by_auth_id(&identity.subject)
}

pub fn require_current_user(state: &AppState, identity: Option<&Identity>) -> AppResult<User> {
    authenticated_user(state, identity)
        .ok_or_else(|| AppError::unauthorized("Authentication is required."))
}

/// Default-organization resolution shared by the resolver, listings, and
/// auto-provisioning: the stored default if it still maps to an active
/// membership of a live organization, else the oldest active membership
/// whose organization still exists.
pub(crate) fn resolve_default_organization_id(state: &AppState, user: &User) -> Option<Uuid> {
    if let Some(default_org_id) = user.default_organization_id {
        let membership = state.store.find_membership(default_org_id, user.id);
        if membership.map(|m| m.is_active()).unwrap_or(false)
            && state.store.get_organization(default_org_id).is_some()
        {
            return Some(default_org_id);
        }
    }

    active_memberships_oldest_first(state, user.id)
        .into_iter()
        .find(|m| state.store.get_organization(m.organization_id).is_some())
        .map(|m| m.organization_id)
}

/// Active memberships for a user ordered by creation time (id as a
/// deterministic tie-break).
pub(crate) fn active_memberships_oldest_first(
    state: &AppState,
    user_id: Uuid,
) -> Vec<crate::models::Membership> {
    let mut memberships: Vec<_> = state
        .store
        .list_memberships_for_user(user_id)
        .into_iter()
        .filter(|m| m.is_active())
        .collect();
    memberships.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    memberships
}

/// Resolve the caller's effective organization context.
///
/// Never fails because multi-tenancy is disabled; that case yields a shim
/// context instead. Fails with `Unauthorized` for missing identity,
/// `OrgNotFound` when no organization context exists, and `OrgForbidden`
/// when the caller holds no active membership in the target organization.
pub fn resolve_org_context(
    state: &AppState,
    identity: Option<&Identity>,
    organization_id: Option<Uuid>,
) -> AppResult<OrgAccess> {
    let config = state.config.get();
    let user = require_current_user(state, identity)?;

    if !config.is_org_enabled() {
        return Ok(OrgAccess {
            user,
            context: OrgContext::shim(),
            config,
        });
    }

    let organization_id = organization_id
        .or_else(|| resolve_default_organization_id(state, &user))
        .ok_or_else(|| {
            AppError::OrgNotFound("No organization context is available for this user.".into())
        })?;

    let membership = state.store.find_membership(organization_id, user.id);
    let membership = match membership {
        Some(m) if m.is_active() => m,
        _ => {
            return Err(AppError::OrgForbidden(
                "You do not have access to this organization.".into(),
            ))
        }
    };

    let organization = state
        .store
        .get_organization(organization_id)
        .ok_or_else(|| AppError::OrgNotFound("Organization not found.".into()))?;

    Ok(OrgAccess {
        user,
        context: OrgContext::Real {
            organization_id,
            role: membership.role,
            org_status: organization.status,
            capabilities: capabilities_for(membership.role),
        },
        config,
    })
}

/// Resolve and enforce a capability against a real organization.
///
/// Shim contexts fail with `OrgDisabled`: org-scoped capability checks are
/// meaningless without real multi-tenancy. Disabled organizations accept
/// only `org:billing.manage` (they may still be billed or reactivated).
/// The role check itself applies only while the `rbac_strict` flag is on.
pub fn require_org_capability(
    state: &AppState,
    identity: Option<&Identity>,
    capability: Capability,
    organization_id: Option<Uuid>,
) -> AppResult<OrgAccess> {
    let access = resolve_org_context(state, identity, organization_id)?;

    if access.context.is_shim() {
        return Err(AppError::OrgDisabled(
            "Organization features are disabled by runtime configuration.".into(),
        ));
    }

    if access.context.org_status() == OrgStatus::Disabled
        && capability != Capability::OrgBillingManage
    {
        return Err(AppError::OrgDisabled(
            "This organization is currently disabled.".into(),
        ));
    }

    if access.config.is_feature_enabled(OrgFeatureFlag::RbacStrict)
        && !has_capability(access.context.role(), capability)
    {
        return Err(AppError::OrgForbidden(format!(
            "Missing capability: {capability}"
        )));
    }

    Ok(access)
}

/// Gate for global app-config mutation: the caller must hold an active
/// owner membership in any organization at all.
///
/// This is deliberately coarser than per-org checks and is a known
/// authorization smell inherited from the product design: owning any
/// organization, however unimportant, grants global config rights. Each
/// successful use is logged so operators can audit the grant; replacing
/// this with a dedicated platform-admin role only touches this function.
pub fn require_global_config_owner(
    state: &AppState,
    identity: Option<&Identity>,
) -> AppResult<User> {
    let user = require_current_user(state, identity)?;

    let is_owner = state
        .store
        .list_memberships_for_user(user.id)
        .iter()
        .any(|m| m.is_active() && m.role == MembershipRole::Owner);

    if !is_owner {
        return Err(AppError::OrgConfigForbidden(
            "Only organization owners can modify app configuration.".into(),
        ));
    }

    warn!(user_id = %user.id, "Global config access granted via any-org owner rule");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shim_context_shape() {
        let context = OrgContext::shim();
        assert!(context.is_shim());
        assert_eq!(context.organization_id(), None);
        assert_eq!(context.role(), MembershipRole::Owner);
        assert_eq!(context.org_status(), OrgStatus::Disabled);
        assert_eq!(
            context.capabilities(),
            capabilities_for(MembershipRole::Owner)
        );
    }

    #[test]
    fn test_context_serializes_with_source_tag() {
        let shim = serde_json::to_value(OrgContext::shim()).unwrap();
        assert_eq!(shim["source"], "shim");

        let real = OrgContext::Real {
            organization_id: Uuid::new_v4(),
            role: MembershipRole::Member,
            org_status: OrgStatus::Active,
            capabilities: capabilities_for(MembershipRole::Member),
        };
        let real = serde_json::to_value(real).unwrap();
        assert_eq!(real["source"], "real");
        assert_eq!(real["capabilities"][0], "org:read");
    }

    #[test]
    fn test_org_disabled_noop_shape() {
        let noop = org_disabled_noop("organizations.create");
        assert!(!noop.applied);
        assert_eq!(noop.reason, "org_disabled");

        let gated: Gated<Uuid> = Gated::Skipped(noop);
        assert!(gated.is_skipped());
        assert_eq!(gated.applied(), None);
    }
}
