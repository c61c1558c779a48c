//! Trust reconciliation error types.
//!
//! Errors fall into three groups:
//!
//! | Group | Variants | Effect |
//! |-------|----------|--------|
//! | Contention | [`Locked`](TrustError::Locked) | Another synchronization holds the keyring; retry later |
//! | Validation | [`InvalidKeyId`](TrustError::InvalidKeyId), [`KeyValidation`](TrustError::KeyValidation), [`AmbiguousKey`](TrustError::AmbiguousKey), [`KeyIdMismatch`](TrustError::KeyIdMismatch) | The declared configuration is wrong; nothing was mutated |
//! | Collaborator | [`KeySource`](TrustError::KeySource), [`Keyring`](TrustError::Keyring), [`ImportFailed`](TrustError::ImportFailed), [`Cancelled`](TrustError::Cancelled), [`Timeout`](TrustError::Timeout) | An external call failed |
//!
//! Per-key import and delete failures during synchronization are not errors:
//! they are reported in the [`SyncReport`](crate::SyncReport).

use std::sync::Arc;

use gitops_state_storage::{BoxError, StorageError};
use thiserror::Error;

/// Result type alias for trust operations.
pub type Result<T> = std::result::Result<T, TrustError>;

/// Errors returned by trust reconciliation.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`: new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrustError {
    /// Another synchronization currently holds the keyring.
    #[error("Keyring is locked by another synchronization, try again")]
    Locked,

    /// A declared key identifier is not a valid key ID or fingerprint.
    #[error("Invalid key ID: {value:?}")]
    InvalidKeyId {
        /// The rejected identifier.
        value: String,
    },

    /// The validator rejected a declared key's material.
    #[error("Key {key_id} failed validation: {message}")]
    KeyValidation {
        /// Declared key ID.
        key_id: String,
        /// Validator diagnostic.
        message: String,
    },

    /// Declared key material did not parse to exactly one key.
    #[error("Key {key_id} material must contain exactly one key, found {count}")]
    AmbiguousKey {
        /// Declared key ID.
        key_id: String,
        /// Number of keys the validator found.
        count: usize,
    },

    /// The key ID parsed from the material differs from the declared one.
    #[error("Declared key ID {declared} does not match key material ID {parsed}")]
    KeyIdMismatch {
        /// Identifier under which the key was declared.
        declared: String,
        /// Identifier parsed from the material.
        parsed: String,
    },

    /// Declared keys could not be loaded.
    #[error("Key source error: {message}")]
    KeySource {
        /// Description of the failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// A keyring command failed.
    #[error("Keyring error: {message}")]
    Keyring {
        /// Description of the failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// A key could not be imported while initializing the keyring.
    #[error("Failed to import key {key_id}")]
    ImportFailed {
        /// Key that failed to import.
        key_id: String,
        /// Why the import failed.
        #[source]
        source: Box<TrustError>,
    },

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// An external command did not finish within the configured timeout.
    #[error("Keyring command timed out: {operation}")]
    Timeout {
        /// The command that timed out.
        operation: &'static str,
    },
}

impl TrustError {
    /// Creates a new `KeySource` error with the given message.
    #[must_use]
    pub fn key_source(message: impl Into<String>) -> Self {
        Self::KeySource { message: message.into(), source: None }
    }

    /// Creates a new `Keyring` error with the given message.
    #[must_use]
    pub fn keyring(message: impl Into<String>) -> Self {
        Self::Keyring { message: message.into(), source: None }
    }

    /// Creates a new `Keyring` error with a message and source error.
    #[must_use]
    pub fn keyring_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Keyring { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Returns `true` if the keyring was busy. Callers should retry.
    #[must_use]
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::Locked)
    }

    /// Returns `true` if the declared configuration is invalid.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidKeyId { .. }
                | Self::KeyValidation { .. }
                | Self::AmbiguousKey { .. }
                | Self::KeyIdMismatch { .. }
        )
    }

    /// Returns `true` if the caller cancelled the operation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<StorageError> for TrustError {
    fn from(err: StorageError) -> Self {
        Self::KeySource {
            message: "failed to read declared keys".into(),
            source: Some(Arc::new(err)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_contention_is_distinct() {
        assert!(TrustError::Locked.is_contention());
        assert!(!TrustError::Locked.is_validation());
        assert!(!TrustError::keyring("gpg exited 2").is_contention());
        assert!(!TrustError::Cancelled.is_contention());
    }

    #[test]
    fn test_validation_classification() {
        assert!(TrustError::InvalidKeyId { value: "xyz".into() }.is_validation());
        assert!(TrustError::AmbiguousKey { key_id: "A".into(), count: 2 }.is_validation());
        assert!(
            TrustError::KeyIdMismatch { declared: "A".into(), parsed: "B".into() }.is_validation()
        );
        assert!(!TrustError::Timeout { operation: "import" }.is_validation());
    }

    #[test]
    fn test_storage_error_becomes_key_source() {
        let err: TrustError = StorageError::connection("refused").into();
        assert!(matches!(err, TrustError::KeySource { .. }));
        assert_eq!(err.source().unwrap().to_string(), "Connection error: refused");
    }

    #[test]
    fn test_import_failed_chains_cause() {
        let err = TrustError::ImportFailed {
            key_id: "4AEE18F83AFDEB23".into(),
            source: Box::new(TrustError::keyring("no valid OpenPGP data found")),
        };
        assert_eq!(err.to_string(), "Failed to import key 4AEE18F83AFDEB23");
        assert!(err.source().unwrap().to_string().contains("no valid OpenPGP data"));
    }
}
