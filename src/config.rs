//! Runtime configuration: env-sourced defaults, overlay merge, cached store.
//!
//! The effective [`AppConfig`] is the compiled-in defaults (read from the
//! process environment at startup) merged with the persisted singleton
//! overlay. The merge lets the environment act as a kill switch: when the
//! defaults say org mode is off, no runtime override can turn it back on.

use std::env;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::authz;
use crate::error::AppResult;
use crate::models::Identity;
use crate::store::Store;
use crate::AppState;

/// Fixed key of the persisted singleton row.
pub const APP_CONFIG_KEY: &str = "default";

const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgFeatureFlag {
    RbacStrict,
    BillingEnforcement,
    InviteEmails,
    HardLocking,
    MirrorWrites,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgFeatureFlags {
    pub rbac_strict: bool,
    pub billing_enforcement: bool,
    pub invite_emails: bool,
    pub hard_locking: bool,
    pub mirror_writes: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgConfig {
    pub enabled: bool,
    pub features: OrgFeatureFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub config_version: u32,
    pub org: OrgConfig,
}

impl AppConfig {
    pub fn is_org_enabled(&self) -> bool {
        self.org.enabled
    }

    pub fn is_feature_enabled(&self, flag: OrgFeatureFlag) -> bool {
        let features = &self.org.features;
        match flag {
            OrgFeatureFlag::RbacStrict => features.rbac_strict,
            OrgFeatureFlag::BillingEnforcement => features.billing_enforcement,
            OrgFeatureFlag::InviteEmails => features.invite_emails,
            OrgFeatureFlag::HardLocking => features.hard_locking,
            OrgFeatureFlag::MirrorWrites => features.mirror_writes,
        }
    }

    fn is_valid(&self) -> bool {
        self.config_version == CONFIG_VERSION
    }
}

/// Partial override; every field is optional and missing fields fall back
/// to the base config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfigOverlay {
    pub org: Option<OrgOverlay>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgOverlay {
    pub enabled: Option<bool>,
    pub features: Option<OrgFeatureFlagsOverlay>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgFeatureFlagsOverlay {
    pub rbac_strict: Option<bool>,
    pub billing_enforcement: Option<bool>,
    pub invite_emails: Option<bool>,
    pub hard_locking: Option<bool>,
    pub mirror_writes: Option<bool>,
}

/// Persisted singleton document holding the runtime overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfigRow {
    pub key: String,
    pub config_version: u32,
    pub org: OrgConfig,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<Uuid>,
}

impl AppConfigRow {
    /// A stored row overrides every field it carries.
    pub fn as_overlay(&self) -> AppConfigOverlay {
        AppConfigOverlay {
            org: Some(OrgOverlay {
                enabled: Some(self.org.enabled),
                features: Some(OrgFeatureFlagsOverlay {
                    rbac_strict: Some(self.org.features.rbac_strict),
                    billing_enforcement: Some(self.org.features.billing_enforcement),
                    invite_emails: Some(self.org.features.invite_emails),
                    hard_locking: Some(self.org.features.hard_locking),
                    mirror_writes: Some(self.org.features.mirror_writes),
                }),
            }),
        }
    }
}

/// Merge `overlay` over `base`. Every overlay field wins except
/// `org.enabled`: a base of `false` is an operational kill switch that no
/// overlay can override. A merged result that fails validation is dropped
/// and `base` is returned unchanged.
pub fn merge_config(base: &AppConfig, overlay: Option<&AppConfigOverlay>) -> AppConfig {
    let org_overlay = overlay.and_then(|o| o.org.as_ref());
    let features_overlay = org_overlay.and_then(|o| o.features.as_ref());

    let enabled_from_overlay = org_overlay
        .and_then(|o| o.enabled)
        .unwrap_or(base.org.enabled);
    let org_enabled = if base.org.enabled {
        enabled_from_overlay
    } else {
        false
    };

    let pick = |value: Option<bool>, fallback: bool| value.unwrap_or(fallback);
    let base_features = &base.org.features;

    let merged = AppConfig {
        config_version: base.config_version,
        org: OrgConfig {
            enabled: org_enabled,
            features: OrgFeatureFlags {
                rbac_strict: pick(
                    features_overlay.and_then(|f| f.rbac_strict),
                    base_features.rbac_strict,
                ),
                billing_enforcement: pick(
                    features_overlay.and_then(|f| f.billing_enforcement),
                    base_features.billing_enforcement,
                ),
                invite_emails: pick(
                    features_overlay.and_then(|f| f.invite_emails),
                    base_features.invite_emails,
                ),
                hard_locking: pick(
                    features_overlay.and_then(|f| f.hard_locking),
                    base_features.hard_locking,
                ),
                mirror_writes: pick(
                    features_overlay.and_then(|f| f.mirror_writes),
                    base_features.mirror_writes,
                ),
            },
        },
    };

    if merged.is_valid() {
        merged
    } else {
        base.clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Crate settings resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Compiled-in config defaults; the merge base for every read.
    pub org_defaults: AppConfig,
    /// Base URL used when building invite links.
    pub site_url: String,
    pub config_cache_ttl: Duration,
    pub invite_expiry_days: i64,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            org_defaults: AppConfig {
                config_version: CONFIG_VERSION,
                org: OrgConfig {
                    enabled: parse_bool_env("ORG_ENABLED", true),
                    features: OrgFeatureFlags {
                        rbac_strict: parse_bool_env("ORG_FEATURE_RBAC_STRICT", true),
                        billing_enforcement: parse_bool_env(
                            "ORG_FEATURE_BILLING_ENFORCEMENT",
                            false,
                        ),
                        invite_emails: parse_bool_env("ORG_FEATURE_INVITE_EMAILS", false),
                        hard_locking: parse_bool_env("ORG_FEATURE_HARD_LOCKING", false),
                        mirror_writes: parse_bool_env("ORG_FEATURE_MIRROR_WRITES", false),
                    },
                },
            },
            site_url: env::var("SITE_URL").unwrap_or_else(|_| "http://localhost:3001".to_string()),
            config_cache_ttl: Duration::from_millis(
                env::var("CONFIG_CACHE_TTL_MS")
                    .unwrap_or_else(|_| "2000".to_string())
                    .parse()
                    .expect("CONFIG_CACHE_TTL_MS must be a valid number"),
            ),
            invite_expiry_days: env::var("INVITE_EXPIRY_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .expect("INVITE_EXPIRY_DAYS must be a valid number"),
            logging: LoggingConfig {
                level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                format: match env::var("LOG_FORMAT")
                    .unwrap_or_else(|_| "pretty".to_string())
                    .to_lowercase()
                    .as_str()
                {
                    "json" => LogFormat::Json,
                    _ => LogFormat::Pretty,
                },
            },
        }
    }

    pub fn default_for_testing() -> Self {
        Self {
            org_defaults: AppConfig {
                config_version: CONFIG_VERSION,
                org: OrgConfig {
                    enabled: true,
                    features: OrgFeatureFlags {
                        rbac_strict: true,
                        billing_enforcement: false,
                        invite_emails: false,
                        hard_locking: false,
                        mirror_writes: false,
                    },
                },
            },
            site_url: "http://localhost:3001".to_string(),
            // TTL zero keeps tests free of staleness windows; correctness
            // must hold either way.
            config_cache_ttl: Duration::ZERO,
            invite_expiry_days: 7,
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}

fn parse_bool_env(name: &str, fallback: bool) -> bool {
    match env::var(name) {
        Ok(value) => match value.to_lowercase().as_str() {
            "1" | "true" => true,
            "0" | "false" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

struct CacheEntry {
    value: AppConfig,
    expires_at: Instant,
}

struct ConfigStoreInner {
    store: Arc<dyn Store>,
    defaults: AppConfig,
    ttl: Duration,
    cache: Mutex<Option<CacheEntry>>,
}

/// Serves the effective config with a short-lived in-process cache.
///
/// The cache is a load shedder, not a correctness dependency: every
/// successful write calls [`ConfigStore::invalidate`], and a TTL of zero
/// disables caching entirely.
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<ConfigStoreInner>,
}

impl ConfigStore {
    pub fn new(store: Arc<dyn Store>, defaults: AppConfig, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(ConfigStoreInner {
                store,
                defaults,
                ttl,
                cache: Mutex::new(None),
            }),
        }
    }

    /// Effective config: defaults merged with the persisted overlay.
    pub fn get(&self) -> AppConfig {
        let now = Instant::now();
        if !self.inner.ttl.is_zero() {
            let cache = self.inner.cache.lock().unwrap();
            if let Some(entry) = cache.as_ref() {
                if entry.expires_at > now {
                    return entry.value.clone();
                }
            }
        }

        let overlay = self.inner.store.get_app_config().map(|row| row.as_overlay());
        let merged = merge_config(&self.inner.defaults, overlay.as_ref());

        if !self.inner.ttl.is_zero() {
            let mut cache = self.inner.cache.lock().unwrap();
            *cache = Some(CacheEntry {
                value: merged.clone(),
                expires_at: now + self.inner.ttl,
            });
        }

        merged
    }

    pub fn invalidate(&self) {
        let mut cache = self.inner.cache.lock().unwrap();
        *cache = None;
    }

    pub(crate) fn persist(&self, next: &AppConfig, updated_by: Option<Uuid>) {
        self.inner.store.upsert_app_config(AppConfigRow {
            key: APP_CONFIG_KEY.to_string(),
            config_version: next.config_version,
            org: next.org.clone(),
            updated_at: Utc::now(),
            updated_by,
        });
        self.invalidate();
    }
}

/// Effective app configuration. No capability required.
pub async fn get_config(state: &AppState) -> AppConfig {
    state.config.get()
}

/// Owner-gated config update. The caller must hold an active owner
/// membership in some organization (global privilege, not org-scoped).
pub async fn update_config(
    state: &AppState,
    identity: Option<&Identity>,
    overlay: AppConfigOverlay,
) -> AppResult<AppConfig> {
    let owner = authz::require_global_config_owner(state, identity)?;
    let current = state.config.get();
    let next = merge_config(&current, Some(&overlay));

    if overlay
        .org
        .as_ref()
        .and_then(|o| o.enabled)
        .map(|requested| requested != next.org.enabled)
        .unwrap_or(false)
    {
        warn!(
            requested = overlay.org.as_ref().and_then(|o| o.enabled),
            effective = next.org.enabled,
            "Org-enabled override rejected by environment kill switch"
        );
    }

    state.config.persist(&next, Some(owner.id));
    info!(updated_by = %owner.id, org_enabled = next.org.enabled, "App config updated");
    Ok(next)
}

/// Convenience toggle for global org mode.
pub async fn set_org_enabled(
    state: &AppState,
    identity: Option<&Identity>,
    enabled: bool,
) -> AppResult<AppConfig> {
    update_config(
        state,
        identity,
        AppConfigOverlay {
            org: Some(OrgOverlay {
                enabled: Some(enabled),
                features: None,
            }),
        },
    )
    .await
}

/// Config update for trusted internal workflows; skips the owner gate.
pub async fn update_config_internal(
    state: &AppState,
    overlay: AppConfigOverlay,
) -> AppResult<AppConfig> {
    let current = state.config.get();
    let next = merge_config(&current, Some(&overlay));
    state.config.persist(&next, None);
    info!(org_enabled = next.org.enabled, "App config updated internally");
    Ok(next)
}
