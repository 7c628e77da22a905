//! Typed errors crossing the core boundary.
//!
//! Every public operation returns one of these; internal store or service
//! failures are wrapped before they escape.

use serde::Serialize;

/// Error taxonomy exposed by every public operation.
///
/// Queries that render user-visible listings collapse the access-denied
/// class (see [`AppError::is_access_denied`]) into empty results; mutations
/// always propagate the typed error verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", content = "message")]
pub enum AppError {
    /// No identity, or the identity has no matching user record.
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized(String),
    #[serde(rename = "USER_NOT_FOUND")]
    UserNotFound(String),
    #[serde(rename = "ORG_NOT_FOUND")]
    OrgNotFound(String),
    /// Authenticated but not permitted.
    #[serde(rename = "ORG_FORBIDDEN")]
    OrgForbidden(String),
    /// Feature-flag or organization-status gate.
    #[serde(rename = "ORG_DISABLED")]
    OrgDisabled(String),
    /// Global app-config mutation gate.
    #[serde(rename = "ORG_CONFIG_FORBIDDEN")]
    OrgConfigForbidden(String),
    /// Malformed input or business-rule violation.
    #[serde(rename = "VALIDATION_ERROR")]
    Validation(String),
    /// Wrapped internal failure; never carries raw store errors outward.
    #[serde(rename = "INTERNAL_ERROR")]
    Internal(String),
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::UserNotFound(_) => "USER_NOT_FOUND",
            AppError::OrgNotFound(_) => "ORG_NOT_FOUND",
            AppError::OrgForbidden(_) => "ORG_FORBIDDEN",
            AppError::OrgDisabled(_) => "ORG_DISABLED",
            AppError::OrgConfigForbidden(_) => "ORG_CONFIG_FORBIDDEN",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Unauthorized(m)
            | AppError::UserNotFound(m)
            | AppError::OrgNotFound(m)
            | AppError::OrgForbidden(m)
            | AppError::OrgDisabled(m)
            | AppError::OrgConfigForbidden(m)
            | AppError::Validation(m)
            | AppError::Internal(m) => m,
        }
    }

    /// Whether this error belongs to the "nothing visible" class that
    /// listing queries convert into empty results.
    pub fn is_access_denied(&self) -> bool {
        matches!(
            self,
            AppError::Unauthorized(_)
                | AppError::OrgNotFound(_)
                | AppError::OrgForbidden(_)
                | AppError::OrgDisabled(_)
        )
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;
