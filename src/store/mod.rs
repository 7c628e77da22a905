//! Abstract document-store contract.
//!
//! The real deployment backs this with a hosted document database; the core
//! only assumes indexed unique lookups, atomic single-document writes, and
//! consistent reads within one operation. [`memory::MemoryStore`] is the
//! in-process implementation used for embedding and tests.

pub mod memory;

use uuid::Uuid;

use crate::config::AppConfigRow;
use crate::models::{Invitation, Membership, Organization, User};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Target document does not exist.
    NotFound,
    /// A unique index rejected the write; `index` names the offending key.
    Conflict { index: &'static str },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "document not found"),
            StoreError::Conflict { index } => write!(f, "unique index violation: {index}"),
        }
    }
}

impl std::error::Error for StoreError {}

pub type StoreResult<T> = Result<T, StoreError>;

/// Document-store operations the core depends on.
///
/// Every method is a single atomic round-trip; inserts enforce the unique
/// indexes (user auth id, user email, organization slug, invitation token,
/// one membership row per org+user pair) and report violations as
/// [`StoreError::Conflict`].
pub trait Store: Send + Sync {
    // users
    fn get_user(&self, id: Uuid) -> Option<User>;
    fn find_user_by_auth_id(&self, auth_id: &str) -> Option<User>;
    fn find_user_by_email(&self, email: &str) -> Option<User>;
    fn insert_user(&self, user: User) -> StoreResult<()>;
    fn update_user(&self, user: User) -> StoreResult<()>;

    // organizations
    fn get_organization(&self, id: Uuid) -> Option<Organization>;
    fn find_organization_by_slug(&self, slug: &str) -> Option<Organization>;
    fn insert_organization(&self, organization: Organization) -> StoreResult<()>;
    fn update_organization(&self, organization: Organization) -> StoreResult<()>;

    // memberships
    fn get_membership(&self, id: Uuid) -> Option<Membership>;
    fn find_membership(&self, organization_id: Uuid, user_id: Uuid) -> Option<Membership>;
    fn list_memberships_for_user(&self, user_id: Uuid) -> Vec<Membership>;
    fn list_memberships_for_org(&self, organization_id: Uuid) -> Vec<Membership>;
    fn insert_membership(&self, membership: Membership) -> StoreResult<()>;
    fn update_membership(&self, membership: Membership) -> StoreResult<()>;

    // invitations
    fn get_invitation(&self, id: Uuid) -> Option<Invitation>;
    fn find_invitation_by_token(&self, token: &str) -> Option<Invitation>;
    fn find_pending_invitation(&self, organization_id: Uuid, email: &str) -> Option<Invitation>;
    fn list_invitations_for_org(&self, organization_id: Uuid) -> Vec<Invitation>;
    fn insert_invitation(&self, invitation: Invitation) -> StoreResult<()>;
    fn update_invitation(&self, invitation: Invitation) -> StoreResult<()>;
    fn delete_invitation(&self, id: Uuid) -> StoreResult<()>;

    // runtime config singleton
    fn get_app_config(&self) -> Option<AppConfigRow>;
    fn upsert_app_config(&self, row: AppConfigRow);
}
