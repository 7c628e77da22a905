//! Thin billing gate: billing-state queries behind the access resolver.
//!
//! The payment provider is an external collaborator; this module only
//! decides who may look at or manage billing, never how money moves.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::authz::{self, OrgAccess};
use crate::capabilities::{Capability, MembershipRole};
use crate::error::{AppError, AppResult};
use crate::models::Identity;
use crate::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingSnapshot {
    pub plan: String,
    pub active: bool,
    /// Provider-side customer reference, when one exists.
    pub customer_ref: Option<String>,
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    async fn snapshot(&self, external_org_id: &str) -> AppResult<BillingSnapshot>;
}

/// Provider used when payments are not wired up: everything reads as a
/// free active plan.
pub struct NullBilling;

#[async_trait]
impl BillingProvider for NullBilling {
    async fn snapshot(&self, _external_org_id: &str) -> AppResult<BillingSnapshot> {
        Ok(BillingSnapshot {
            plan: "free".to_string(),
            active: true,
            customer_ref: None,
        })
    }
}

/// Billing state for an organization, or `None` without billing access.
/// Billing stays readable for disabled organizations so they can be
/// reactivated.
pub async fn get_organization_billing(
    state: &AppState,
    identity: Option<&Identity>,
    organization_id: Option<Uuid>,
) -> AppResult<Option<BillingSnapshot>> {
    let access = match authz::require_org_capability(
        state,
        identity,
        Capability::OrgBillingManage,
        organization_id,
    ) {
        Ok(access) => access,
        Err(err) if err.is_access_denied() => return Ok(None),
        Err(err) => return Err(err),
    };

    let organization_id = match access.context.organization_id() {
        Some(id) => id,
        None => return Ok(None),
    };
    let organization = match state.store.get_organization(organization_id) {
        Some(organization) => organization,
        None => return Ok(None),
    };

    let snapshot = state
        .billing
        .snapshot(&organization.external_org_id)
        .await?;
    Ok(Some(snapshot))
}

/// Gate for billing mutations: a real organization context and an active
/// owner, regardless of the strict-RBAC flag.
pub async fn assert_billing_manager(
    state: &AppState,
    identity: Option<&Identity>,
    organization_id: Option<Uuid>,
) -> AppResult<OrgAccess> {
    let access = authz::require_org_capability(
        state,
        identity,
        Capability::OrgBillingManage,
        organization_id,
    )?;

    if access.context.role() != MembershipRole::Owner {
        return Err(AppError::OrgForbidden(
            "Only owners can manage billing.".into(),
        ));
    }
    Ok(access)
}
