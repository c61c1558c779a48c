//! Repository and credential-set record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Authentication material for connecting to a source repository.
///
/// Secret fields are wrapped in [`Zeroizing`] so the material is scrubbed
/// from memory when the record is dropped. The [`Debug`] implementation
/// redacts every secret.
///
/// # Example
///
/// ```
/// use gitops_state_storage::repository::RepoCredentials;
///
/// let creds = RepoCredentials::builder()
///     .username("deploy")
///     .password("s3cret".to_owned())
///     .build();
///
/// assert!(creds.has_credentials());
/// assert!(!format!("{creds:?}").contains("s3cret"));
/// ```
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct RepoCredentials {
    /// Username for HTTPS basic authentication.
    #[serde(default)]
    #[builder(into, default)]
    pub username: String,

    /// Password or access token for HTTPS basic authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub password: Option<Zeroizing<String>>,

    /// PEM-encoded SSH private key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub ssh_private_key: Option<Zeroizing<String>>,

    /// PEM-encoded TLS client certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub tls_client_cert_data: Option<Zeroizing<String>>,

    /// PEM-encoded TLS client certificate key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub tls_client_cert_key: Option<Zeroizing<String>>,
}

impl RepoCredentials {
    /// Returns `true` if any authentication material is present.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        fn present(secret: &Option<Zeroizing<String>>) -> bool {
            secret.as_deref().is_some_and(|s| !s.is_empty())
        }

        !self.username.is_empty()
            || present(&self.password)
            || present(&self.ssh_private_key)
            || present(&self.tls_client_cert_data)
            || present(&self.tls_client_cert_key)
    }

    /// Returns a copy that keeps the username and drops every secret.
    #[must_use]
    pub fn redacted(&self) -> Self {
        Self { username: self.username.clone(), ..Self::default() }
    }
}

impl std::fmt::Debug for RepoCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn mask(secret: &Option<Zeroizing<String>>) -> &'static str {
            if secret.is_some() { "<redacted>" } else { "<none>" }
        }

        f.debug_struct("RepoCredentials")
            .field("username", &self.username)
            .field("password", &mask(&self.password))
            .field("ssh_private_key", &mask(&self.ssh_private_key))
            .field("tls_client_cert_data", &mask(&self.tls_client_cert_data))
            .field("tls_client_cert_key", &mask(&self.tls_client_cert_key))
            .finish()
    }
}

/// Outcome of the most recent connectivity probe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No probe has run yet.
    #[default]
    Unknown,
    /// The last probe connected successfully.
    Successful,
    /// The last probe failed; see [`ConnectionState::message`].
    Failed,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "Unknown",
            Self::Successful => "Successful",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Cached outcome of the last connectivity probe against a repository URL.
///
/// Overwritten on every probe. The `modified_at` timestamp records when the
/// probe that produced this state finished.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionState {
    /// Probe outcome.
    pub status: ConnectionStatus,

    /// Diagnostic message; empty on success.
    #[serde(default)]
    pub message: String,

    /// When the state was computed. `None` for [`ConnectionStatus::Unknown`].
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

impl ConnectionState {
    /// A successful probe finishing at `at`.
    #[must_use]
    pub fn successful(at: DateTime<Utc>) -> Self {
        Self { status: ConnectionStatus::Successful, message: String::new(), modified_at: Some(at) }
    }

    /// A failed probe finishing at `at` with a diagnostic message.
    #[must_use]
    pub fn failed(message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self { status: ConnectionStatus::Failed, message: message.into(), modified_at: Some(at) }
    }

    /// Returns `true` if the last probe succeeded.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.status == ConnectionStatus::Successful
    }
}

/// A registered source repository.
///
/// `url` is the unique identity of the record across the registry.
///
/// # Example
///
/// ```
/// use gitops_state_storage::repository::{ConnectionStatus, RepositoryRecord};
///
/// let repo = RepositoryRecord::builder()
///     .url("https://github.com/example/app.git")
///     .enable_lfs(true)
///     .build();
///
/// assert_eq!(repo.connection_state.status, ConnectionStatus::Unknown);
/// assert!(!repo.credentials.has_credentials());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct RepositoryRecord {
    /// Repository URL (record identity).
    #[builder(into)]
    pub url: String,

    /// Authentication material. Empty when the repository relies on a
    /// matching [`CredentialRecord`].
    #[serde(default)]
    #[builder(default)]
    pub credentials: RepoCredentials,

    /// Skip TLS / host-key verification.
    #[serde(default)]
    #[builder(default)]
    pub insecure: bool,

    /// Fetch large-file-storage objects.
    #[serde(default)]
    #[builder(default)]
    pub enable_lfs: bool,

    /// Volatile connection state, refreshed by probing.
    #[serde(default)]
    #[builder(default)]
    pub connection_state: ConnectionState,
}

impl RepositoryRecord {
    /// Returns the configured username (may be empty).
    #[must_use]
    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Returns a copy suitable for listing: URL, username, and flags only.
    #[must_use]
    pub fn redacted(&self) -> Self {
        Self { credentials: self.credentials.redacted(), ..self.clone() }
    }

    /// Returns `true` if `other` describes the same repository, ignoring the
    /// volatile connection state.
    #[must_use]
    pub fn same_spec(&self, other: &Self) -> bool {
        let mut normalized = other.clone();
        normalized.connection_state = self.connection_state.clone();
        *self == normalized
    }
}

/// A credential set shared by every repository whose URL starts with `url`.
///
/// # Example
///
/// ```
/// use gitops_state_storage::repository::{CredentialRecord, RepoCredentials};
///
/// let creds = CredentialRecord::builder()
///     .url("https://github.com/example/")
///     .credentials(RepoCredentials::builder().username("bot").build())
///     .build();
///
/// assert!(creds.matches("https://github.com/example/app.git"));
/// assert!(!creds.matches("https://gitlab.com/example/app.git"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct CredentialRecord {
    /// URL prefix this credential set applies to (record identity).
    #[builder(into)]
    pub url: String,

    /// Authentication material.
    #[serde(default)]
    #[builder(default)]
    pub credentials: RepoCredentials,
}

impl CredentialRecord {
    /// Returns `true` if this credential set applies to `repo_url`.
    #[must_use]
    pub fn matches(&self, repo_url: &str) -> bool {
        repo_url.starts_with(&self.url)
    }

    /// Returns a copy suitable for listing: URL and username only.
    #[must_use]
    pub fn redacted(&self) -> Self {
        Self { url: self.url.clone(), credentials: self.credentials.redacted() }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_has_credentials() {
        assert!(!RepoCredentials::default().has_credentials());
        assert!(RepoCredentials::builder().username("u").build().has_credentials());
        assert!(
            RepoCredentials::builder().ssh_private_key("KEY".to_owned()).build().has_credentials()
        );
        // An empty secret does not count.
        assert!(!RepoCredentials::builder().password(String::new()).build().has_credentials());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = RepoCredentials::builder()
            .username("deploy")
            .password("hunter2".to_owned())
            .tls_client_cert_key("PRIVATE".to_owned())
            .build();
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("deploy"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("PRIVATE"));
    }

    #[test]
    fn test_same_spec_ignores_connection_state() {
        let now = Utc::now();
        let a = RepositoryRecord::builder()
            .url("git@x/y")
            .connection_state(ConnectionState::successful(now))
            .build();
        let b = RepositoryRecord::builder()
            .url("git@x/y")
            .connection_state(ConnectionState::failed("nope", now + Duration::seconds(5)))
            .build();
        assert!(a.same_spec(&b));

        let c = RepositoryRecord::builder().url("git@x/y").insecure(true).build();
        assert!(!a.same_spec(&c));
    }

    #[test]
    fn test_redacted_keeps_username_and_flags() {
        let repo = RepositoryRecord::builder()
            .url("https://x/y")
            .credentials(
                RepoCredentials::builder().username("u").password("p".to_owned()).build(),
            )
            .enable_lfs(true)
            .build();
        let redacted = repo.redacted();
        assert_eq!(redacted.username(), "u");
        assert!(redacted.credentials.password.is_none());
        assert!(redacted.enable_lfs);
    }

    #[test]
    fn test_record_json_round_trip_preserves_secrets() {
        let repo = RepositoryRecord::builder()
            .url("https://x/y")
            .credentials(RepoCredentials::builder().password("p".to_owned()).build())
            .build();
        let json = serde_json::to_vec(&repo).unwrap();
        let back: RepositoryRecord = serde_json::from_slice(&json).unwrap();
        assert_eq!(repo, back);
    }
}
