//! Multi-tenant organization core: access control, runtime feature
//! configuration, organization lifecycle, and the membership/invitation
//! state machine.
//!
//! Every public operation takes an [`AppState`] handle and the caller's
//! authenticated [`Identity`] (if any) and returns a typed
//! [`error::AppError`] on failure. Queries degrade to empty results when
//! the caller has no access; mutations always propagate the typed error.
//!
//! ```no_run
//! use orgkit::{organizations, users, AppState, Config, Identity};
//!
//! # async fn demo() -> Result<(), orgkit::error::AppError> {
//! let state = AppState::in_memory(Config::from_env());
//! let alice = Identity::new("auth_alice", "alice@example.com");
//!
//! users::upsert_user(&state, Some(&alice), Default::default()).await?;
//! let outcome = organizations::ensure_for_current_user(&state, Some(&alice), false).await?;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

pub mod authz;
pub mod billing;
pub mod capabilities;
pub mod config;
pub mod email;
pub mod error;
mod helpers;
pub mod members;
pub mod models;
pub mod organizations;
pub mod store;
pub mod telemetry;
pub mod users;

use std::sync::Arc;

use billing::{BillingProvider, NullBilling};
use config::ConfigStore;
use email::{EmailSender, NullSender};
use store::memory::MemoryStore;
use store::Store;

pub use capabilities::{Capability, MembershipRole};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::Identity;

/// Shared handle threaded through every operation.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: ConfigStore,
    pub email: Arc<dyn EmailSender>,
    pub billing: Arc<dyn BillingProvider>,
    pub settings: Config,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        email: Arc<dyn EmailSender>,
        billing: Arc<dyn BillingProvider>,
        settings: Config,
    ) -> Self {
        let config = ConfigStore::new(
            store.clone(),
            settings.org_defaults.clone(),
            settings.config_cache_ttl,
        );
        Self {
            store,
            config,
            email,
            billing,
            settings,
        }
    }

    /// Fully in-process state: memory store, no email delivery, null
    /// billing. Used for embedding and tests.
    pub fn in_memory(settings: Config) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(NullSender),
            Arc::new(NullBilling),
            settings,
        )
    }
}
