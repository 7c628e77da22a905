#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use uuid::Uuid;

use orgkit::email::{EmailSender, SendOutcome};
use orgkit::models::{Membership, MembershipStatus, User};
use orgkit::{organizations, telemetry, users, AppState, Config, Identity, MembershipRole};

static TRACING: Lazy<()> = Lazy::new(|| {
    telemetry::init_tracing(&Config::default_for_testing().logging);
});

static COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct TestApp {
    pub state: AppState,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::spawn_with(Config::default_for_testing())
    }

    pub fn spawn_with(settings: Config) -> Self {
        Lazy::force(&TRACING);
        Self {
            state: AppState::in_memory(settings),
        }
    }

    /// App whose environment kill switch has org mode off.
    pub fn spawn_org_disabled() -> Self {
        let mut settings = Config::default_for_testing();
        settings.org_defaults.org.enabled = false;
        Self::spawn_with(settings)
    }

    pub fn spawn_rbac_relaxed() -> Self {
        let mut settings = Config::default_for_testing();
        settings.org_defaults.org.features.rbac_strict = false;
        Self::spawn_with(settings)
    }

    pub fn unique_identity() -> Identity {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tag = Uuid::new_v4().simple().to_string();
        Identity::new(format!("auth_{n}_{tag}"), format!("user{n}_{tag}@example.com"))
    }

    /// Provision a user row for a fresh identity.
    pub async fn signup(&self, name: &str) -> (Identity, User) {
        let identity = Self::unique_identity();
        let user = users::upsert_user(
            &self.state,
            Some(&identity),
            users::UpsertProfile {
                name: Some(name.to_string()),
                avatar_url: None,
            },
        )
        .await
        .expect("signup should succeed");
        (identity, user)
    }

    /// Provision a user with a caller-chosen email, for invite matching.
    pub async fn signup_with_email(&self, email: &str, name: &str) -> (Identity, User) {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let identity = Identity::new(format!("auth_mail_{n}"), email.to_string());
        let user = users::upsert_user(
            &self.state,
            Some(&identity),
            users::UpsertProfile {
                name: Some(name.to_string()),
                avatar_url: None,
            },
        )
        .await
        .expect("signup should succeed");
        (identity, user)
    }

    /// Sign up and create an organization owned by the new user.
    pub async fn signup_with_org(&self, org_name: &str, slug: &str) -> (Identity, User, Uuid) {
        let (identity, user) = self.signup(org_name).await;
        let organization_id = organizations::create(
            &self.state,
            Some(&identity),
            organizations::CreateOrganizationArgs {
                name: org_name.to_string(),
                slug: Some(slug.to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("org creation should succeed")
        .applied()
        .expect("org creation should not be skipped");
        let user = self
            .state
            .store
            .get_user(user.id)
            .expect("user should exist");
        (identity, user, organization_id)
    }

    /// Seed an active membership directly, bypassing the invite flow.
    pub async fn join_org(
        &self,
        organization_id: Uuid,
        role: MembershipRole,
        name: &str,
    ) -> (Identity, User) {
        let (identity, user) = self.signup(name).await;
        let now = Utc::now();
        self.state
            .store
            .insert_membership(Membership {
                id: Uuid::new_v4(),
                organization_id,
                user_id: user.id,
                role,
                status: MembershipStatus::Active,
                joined_at: Some(now),
                created_at: now,
                updated_at: now,
            })
            .expect("membership insert should succeed");
        (identity, user)
    }

    /// Blank out a user's stored default so resolution has to fall back.
    pub fn clear_default(&self, user_id: Uuid) {
        let mut user = self
            .state
            .store
            .get_user(user_id)
            .expect("user should exist");
        user.default_organization_id = None;
        self.state
            .store
            .update_user(user)
            .expect("user update should succeed");
    }
}

/// Email sender that records every message instead of delivering.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl EmailSender for RecordingSender {
    async fn send(&self, to: &str, subject: &str, _html: &str) -> SendOutcome {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        SendOutcome::sent()
    }
}

/// App with a recording email sender and invite emails enabled.
pub fn spawn_with_recording_email() -> (TestApp, Arc<RecordingSender>) {
    let mut settings = Config::default_for_testing();
    settings.org_defaults.org.features.invite_emails = true;

    let sender = Arc::new(RecordingSender::default());
    let state = AppState::new(
        Arc::new(orgkit::store::memory::MemoryStore::new()),
        sender.clone(),
        Arc::new(orgkit::billing::NullBilling),
        settings,
    );
    (TestApp { state }, sender)
}
