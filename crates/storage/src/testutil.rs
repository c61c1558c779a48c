//! Shared test utilities for repository-store testing.
//!
//! This module provides sample records, pre-populated stores, and assertion
//! macros for [`StorageResult`] values. It is feature-gated behind `testutil`
//! to prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! gitops-state-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use gitops_state_storage::testutil::{populated_store, sample_repository};
//! ```

#![allow(clippy::expect_used, clippy::panic)]

pub use crate::{assert_already_exists, assert_not_found, assert_storage_ok};
use crate::{
    error::{StorageError, StorageResult},
    memory::MemoryBackend,
    repository::{
        BackendRepositoryStore, CredentialRecord, RepoCredentials, RepositoryRecord,
        RepositoryStore,
    },
};

/// Creates a repository record for `url` with no credentials and default flags.
#[must_use]
pub fn sample_repository(url: &str) -> RepositoryRecord {
    RepositoryRecord::builder().url(url).build()
}

/// Creates a credential set for `prefix` with a username and password.
#[must_use]
pub fn sample_credentials(prefix: &str, username: &str) -> CredentialRecord {
    CredentialRecord::builder()
        .url(prefix)
        .credentials(
            RepoCredentials::builder()
                .username(username)
                .password(format!("{username}-token"))
                .build(),
        )
        .build()
}

/// Creates a [`BackendRepositoryStore`] over a fresh [`MemoryBackend`] holding
/// one sample repository per URL.
///
/// # Panics
///
/// Panics if any create fails (duplicate URLs in `urls`).
pub async fn populated_store(urls: &[&str]) -> BackendRepositoryStore<MemoryBackend> {
    let store = BackendRepositoryStore::new(MemoryBackend::new());
    for url in urls {
        store.create_repository(&sample_repository(url)).await.expect("populate create failed");
    }
    store
}

/// Assert that a [`StorageResult`] is a [`StorageError::AlreadyExists`].
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use gitops_state_storage::testutil::assert_already_exists;
/// use gitops_state_storage::error::{StorageError, StorageResult};
///
/// let result: StorageResult<()> = Err(StorageError::already_exists("git@x/y"));
/// assert_already_exists!(result);
/// ```
#[macro_export]
macro_rules! assert_already_exists {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::AlreadyExists { .. })),
            "expected StorageError::AlreadyExists, got: {:?}",
            $result,
        );
    };
}

/// Assert that a [`StorageResult`] is a [`StorageError::NotFound`].
#[macro_export]
macro_rules! assert_not_found {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::NotFound { .. })),
            "expected StorageError::NotFound, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::NotFound { .. })),
            "{}: expected StorageError::NotFound, got: {:?}",
            $msg,
            $result,
        );
    };
}

/// Assert that a [`StorageResult`] is `Ok`, returning the inner value.
#[macro_export]
macro_rules! assert_storage_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got StorageError: {e:?}"),
        }
    };
}

/// Returns `true` if the result is a `Conflict` error.
pub fn is_conflict<T>(result: &StorageResult<T>) -> bool {
    matches!(result, Err(StorageError::Conflict))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_populated_store_holds_every_url() {
        let store = populated_store(&["https://a/x", "https://b/y"]).await;
        let repos = assert_storage_ok!(store.list_repositories().await);
        assert_eq!(repos.len(), 2);
        assert_already_exists!(store.create_repository(&sample_repository("https://a/x")).await);
        assert_not_found!(store.delete_repository("https://c/z").await);
    }

    #[test]
    fn test_sample_credentials_has_material() {
        let creds = sample_credentials("https://a/", "bot");
        assert!(creds.credentials.has_credentials());
        assert!(creds.matches("https://a/repo.git"));
        assert!(!is_conflict::<()>(&Ok(())));
    }
}
