//! User records mirrored from the identity provider.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::authz;
use crate::error::{AppError, AppResult};
use crate::helpers::normalize_email;
use crate::models::{Identity, User};
use crate::store::StoreError;
use crate::AppState;

#[derive(Debug, Clone, Default)]
pub struct UpsertProfile {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Create or refresh the user row for a successful sign-in, keyed by the
/// identity provider's subject id.
pub async fn upsert_user(
    state: &AppState,
    identity: Option<&Identity>,
    profile: UpsertProfile,
) -> AppResult<User> {
    let identity =
        identity.ok_or_else(|| AppError::unauthorized("Authentication is required."))?;
    let email = normalize_email(&identity.email);
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::validation("A valid email address is required."));
    }

    let now = Utc::now();
    if let Some(mut existing) = state.store.find_user_by_auth_id(&identity.subject) {
        existing.email = email;
        if profile.name.is_some() {
            existing.name = profile.name;
        }
        if profile.avatar_url.is_some() {
            existing.avatar_url = profile.avatar_url;
        }
        existing.updated_at = now;
        return match state.store.update_user(existing.clone()) {
            Ok(()) => Ok(existing),
            Err(StoreError::Conflict { index: "email" }) => Err(AppError::validation(
                "This email is already in use by another account.",
            )),
            Err(err) => Err(AppError::internal(err.to_string())),
        };
    }

    let user = User {
        id: Uuid::new_v4(),
        auth_id: identity.subject.clone(),
        email,
        name: profile.name,
        avatar_url: profile.avatar_url,
        default_organization_id: None,
        created_at: now,
        updated_at: now,
    };
    match state.store.insert_user(user.clone()) {
        Ok(()) => {
            info!(user_id = %user.id, "User provisioned");
            Ok(user)
        }
        Err(StoreError::Conflict { index: "email" }) => Err(AppError::validation(
            "This email is already in use by another account.",
        )),
        Err(err) => Err(AppError::internal(err.to_string())),
    }
}

/// The caller's user row, or `None` when unauthenticated or unknown.
pub async fn get_current_user(
    state: &AppState,
    identity: Option<&Identity>,
) -> AppResult<Option<User>> {
    Ok(authz::authenticated_user(state, identity))
}
