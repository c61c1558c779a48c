//! Registry error types.
//!
//! Every variant maps to a stable [`code`](RegistryError::code) for the
//! transport boundary:
//!
//! | Variant | Code |
//! |---------|------|
//! | [`PermissionDenied`](RegistryError::PermissionDenied) | `permission_denied` |
//! | [`NotFound`](RegistryError::NotFound) | `not_found` |
//! | [`AlreadyExistsDiffers`](RegistryError::AlreadyExistsDiffers) | `already_exists` |
//! | [`Connection`](RegistryError::Connection) | `connection_failed` |
//! | [`InvalidArgument`](RegistryError::InvalidArgument) | `invalid_argument` |
//! | [`AppSource`](RegistryError::AppSource) | `app_source_error` |
//! | [`Storage`](RegistryError::Storage) | `storage_error` |
//! | [`Cancelled`](RegistryError::Cancelled) | `cancelled` |

use gitops_state_storage::StorageError;
use thiserror::Error;

use crate::{apps::AppSourceError, authz::Action, probe::ProbeError};

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors returned by the repository registry.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`: new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// The authorization oracle denied the operation.
    #[error("permission denied: {subject} may not {action} repositories/{object}")]
    PermissionDenied {
        /// Caller name.
        subject: String,
        /// Denied action.
        action: Action,
        /// Repository URL.
        object: String,
    },

    /// No record exists for the URL.
    #[error("repository not found: {url}")]
    NotFound {
        /// Requested URL.
        url: String,
    },

    /// A create collided with a stored record holding different content.
    #[error("existing {kind} spec is different; use upsert flag to force update")]
    AlreadyExistsDiffers {
        /// `"repository"` or `"repository credentials"`.
        kind: &'static str,
        /// Conflicting URL.
        url: String,
    },

    /// The repository failed its connectivity test.
    #[error("Unable to connect to repository {url}: {source}")]
    Connection {
        /// Repository URL.
        url: String,
        /// Probe diagnostic.
        #[source]
        source: ProbeError,
    },

    /// The request is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Application discovery failed.
    #[error("application source error: {0}")]
    AppSource(#[from] AppSourceError),

    /// The configuration store failed.
    #[error("storage error: {0}")]
    Storage(#[source] StorageError),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl RegistryError {
    /// Creates a `NotFound` error.
    #[must_use]
    pub fn not_found(url: impl Into<String>) -> Self {
        Self::NotFound { url: url.into() }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } => "permission_denied",
            Self::NotFound { .. } => "not_found",
            Self::AlreadyExistsDiffers { .. } => "already_exists",
            Self::Connection { .. } => "connection_failed",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::AppSource(_) => "app_source_error",
            Self::Storage(_) => "storage_error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` for `PermissionDenied`.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// Returns `true` for `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for `AlreadyExistsDiffers`.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyExistsDiffers { .. })
    }
}

impl From<StorageError> for RegistryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { key } => Self::NotFound { url: key },
            other => Self::Storage(other),
        }
    }
}
