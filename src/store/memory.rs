//! In-process store backed by hash maps behind one lock.
//!
//! Each trait method takes the lock once, which gives the same
//! per-operation atomicity the hosted document database provides.

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::config::AppConfigRow;
use crate::models::{Invitation, Membership, Organization, User};

use super::{Store, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    organizations: HashMap<Uuid, Organization>,
    memberships: HashMap<Uuid, Membership>,
    invitations: HashMap<Uuid, Invitation>,
    app_config: Option<AppConfigRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get_user(&self, id: Uuid) -> Option<User> {
        self.inner.read().unwrap().users.get(&id).cloned()
    }

    fn find_user_by_auth_id(&self, auth_id: &str) -> Option<User> {
        let inner = self.inner.read().unwrap();
        inner.users.values().find(|u| u.auth_id == auth_id).cloned()
    }

    fn find_user_by_email(&self, email: &str) -> Option<User> {
        let inner = self.inner.read().unwrap();
        inner
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
    }

    fn insert_user(&self, user: User) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.users.values().any(|u| u.auth_id == user.auth_id) {
            return Err(StoreError::Conflict { index: "auth_id" });
        }
        if inner
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::Conflict { index: "email" });
        }
        inner.users.insert(user.id, user);
        Ok(())
    }

    fn update_user(&self, user: User) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.users.contains_key(&user.id) {
            return Err(StoreError::NotFound);
        }
        if inner
            .users
            .values()
            .any(|u| u.id != user.id && u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::Conflict { index: "email" });
        }
        inner.users.insert(user.id, user);
        Ok(())
    }

    fn get_organization(&self, id: Uuid) -> Option<Organization> {
        self.inner.read().unwrap().organizations.get(&id).cloned()
    }

    fn find_organization_by_slug(&self, slug: &str) -> Option<Organization> {
        let inner = self.inner.read().unwrap();
        inner
            .organizations
            .values()
            .find(|o| o.slug == slug)
            .cloned()
    }

    fn insert_organization(&self, organization: Organization) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        if inner
            .organizations
            .values()
            .any(|o| o.slug == organization.slug)
        {
            return Err(StoreError::Conflict { index: "slug" });
        }
        inner.organizations.insert(organization.id, organization);
        Ok(())
    }

    fn update_organization(&self, organization: Organization) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.organizations.contains_key(&organization.id) {
            return Err(StoreError::NotFound);
        }
        if inner
            .organizations
            .values()
            .any(|o| o.id != organization.id && o.slug == organization.slug)
        {
            return Err(StoreError::Conflict { index: "slug" });
        }
        inner.organizations.insert(organization.id, organization);
        Ok(())
    }

    fn get_membership(&self, id: Uuid) -> Option<Membership> {
        self.inner.read().unwrap().memberships.get(&id).cloned()
    }

    fn find_membership(&self, organization_id: Uuid, user_id: Uuid) -> Option<Membership> {
        let inner = self.inner.read().unwrap();
        inner
            .memberships
            .values()
            .find(|m| m.organization_id == organization_id && m.user_id == user_id)
            .cloned()
    }

    fn list_memberships_for_user(&self, user_id: Uuid) -> Vec<Membership> {
        let inner = self.inner.read().unwrap();
        inner
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect()
    }

    fn list_memberships_for_org(&self, organization_id: Uuid) -> Vec<Membership> {
        let inner = self.inner.read().unwrap();
        inner
            .memberships
            .values()
            .filter(|m| m.organization_id == organization_id)
            .cloned()
            .collect()
    }

    fn insert_membership(&self, membership: Membership) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        // Rows soft-transition instead of being deleted, so the pair is
        // unique regardless of status.
        if inner.memberships.values().any(|m| {
            m.organization_id == membership.organization_id && m.user_id == membership.user_id
        }) {
            return Err(StoreError::Conflict {
                index: "org_and_user",
            });
        }
        inner.memberships.insert(membership.id, membership);
        Ok(())
    }

    fn update_membership(&self, membership: Membership) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.memberships.contains_key(&membership.id) {
            return Err(StoreError::NotFound);
        }
        inner.memberships.insert(membership.id, membership);
        Ok(())
    }

    fn get_invitation(&self, id: Uuid) -> Option<Invitation> {
        self.inner.read().unwrap().invitations.get(&id).cloned()
    }

    fn find_invitation_by_token(&self, token: &str) -> Option<Invitation> {
        let inner = self.inner.read().unwrap();
        inner
            .invitations
            .values()
            .find(|i| i.token == token)
            .cloned()
    }

    fn find_pending_invitation(&self, organization_id: Uuid, email: &str) -> Option<Invitation> {
        let inner = self.inner.read().unwrap();
        inner
            .invitations
            .values()
            .find(|i| {
                i.organization_id == organization_id
                    && i.status == crate::models::InvitationStatus::Pending
                    && i.email.eq_ignore_ascii_case(email)
            })
            .cloned()
    }

    fn list_invitations_for_org(&self, organization_id: Uuid) -> Vec<Invitation> {
        let inner = self.inner.read().unwrap();
        inner
            .invitations
            .values()
            .filter(|i| i.organization_id == organization_id)
            .cloned()
            .collect()
    }

    fn insert_invitation(&self, invitation: Invitation) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        if inner
            .invitations
            .values()
            .any(|i| i.token == invitation.token)
        {
            return Err(StoreError::Conflict { index: "token" });
        }
        inner.invitations.insert(invitation.id, invitation);
        Ok(())
    }

    fn update_invitation(&self, invitation: Invitation) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.invitations.contains_key(&invitation.id) {
            return Err(StoreError::NotFound);
        }
        inner.invitations.insert(invitation.id, invitation);
        Ok(())
    }

    fn delete_invitation(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .invitations
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    fn get_app_config(&self) -> Option<AppConfigRow> {
        self.inner.read().unwrap().app_config.clone()
    }

    fn upsert_app_config(&self, row: AppConfigRow) {
        self.inner.write().unwrap().app_config = Some(row);
    }
}
