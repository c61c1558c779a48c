//! Repository connectivity probe seam.

use std::sync::Arc;

use async_trait::async_trait;
use gitops_state_storage::{BoxError, repository::RepoCredentials};
use thiserror::Error;

/// Everything a probe needs to reach a repository.
#[derive(Debug, Clone, Copy)]
pub struct ProbeTarget<'a> {
    /// Repository URL.
    pub url: &'a str,
    /// Effective credentials (possibly from a matching credential set).
    pub credentials: &'a RepoCredentials,
    /// Skip TLS / host-key verification.
    pub insecure: bool,
    /// Fetch large-file-storage objects.
    pub enable_lfs: bool,
}

/// Why a repository could not be reached.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProbeError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ProbeError {
    /// Creates a probe error with a diagnostic message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), source: None }
    }

    /// Creates a probe error wrapping the underlying failure.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Returns the diagnostic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Tests whether a repository is reachable with the given credentials.
///
/// Implementations typically run `git ls-remote`.
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    /// Returns `Ok(())` if the repository answered.
    async fn test(&self, target: ProbeTarget<'_>) -> Result<(), ProbeError>;
}
