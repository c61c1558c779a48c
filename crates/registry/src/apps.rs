//! Application discovery inside a registered repository.
//!
//! An application is a directory recognized by the manifest files it holds:
//!
//! | Type | Marker |
//! |------|--------|
//! | Ksonnet | `app.yaml` next to `components/params.libsonnet` |
//! | Helm | `Chart.yaml` |
//! | Kustomize | the first of [`KUSTOMIZATION_NAMES`] whose listing succeeds |
//!
//! File listings come from an [`AppSourceClient`], usually a repository
//! server that has the repository checked out.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

use async_trait::async_trait;
use gitops_state_storage::{BoxError, repository::RepositoryRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Recognized kustomization file names, in lookup order.
pub const KUSTOMIZATION_NAMES: [&str; 3] =
    ["kustomization.yaml", "kustomization.yml", "Kustomization"];

/// Manifest tooling an application directory uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AppSourceType {
    /// Ksonnet application.
    Ksonnet,
    /// Helm chart.
    Helm,
    /// Kustomize overlay.
    Kustomize,
}

impl fmt::Display for AppSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ksonnet => "Ksonnet",
            Self::Helm => "Helm",
            Self::Kustomize => "Kustomize",
        };
        f.write_str(s)
    }
}

/// A discovered application directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppInfo {
    /// Directory relative to the repository root (`.` for the root).
    pub path: String,
    /// Tooling detected in the directory.
    pub source_type: AppSourceType,
}

/// Request for [`RepositoryRegistry::get_app_details`](crate::RepositoryRegistry::get_app_details).
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct AppDetailsQuery {
    /// Repository URL.
    #[builder(into)]
    pub url: String,
    /// Revision to inspect; the configured default when `None`.
    #[builder(into)]
    pub revision: Option<String>,
    /// Application directory.
    #[builder(into)]
    pub path: String,
}

/// Rendered details of one application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDetails {
    /// Application directory.
    pub path: String,
    /// Detected tooling, if any.
    pub source_type: Option<AppSourceType>,
    /// Tool-specific parameters with their default values.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// Failure reported by an [`AppSourceClient`].
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppSourceError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl AppSourceError {
    /// Creates an error with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), source: None }
    }

    /// Creates an error wrapping the underlying failure.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self { message: message.into(), source: Some(Arc::new(source)) }
    }
}

/// Reads repository contents at a revision.
#[async_trait]
pub trait AppSourceClient: Send + Sync {
    /// Lists file paths matching a glob such as `*Chart.yaml`.
    async fn list_dir(
        &self,
        repo: &RepositoryRecord,
        revision: &str,
        pattern: &str,
    ) -> Result<Vec<String>, AppSourceError>;

    /// Renders details for the application at `path`.
    async fn app_details(
        &self,
        repo: &RepositoryRecord,
        revision: &str,
        path: &str,
    ) -> Result<AppDetails, AppSourceError>;
}

/// Returns the directory portion of a slash-separated path.
fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => ".",
    }
}

/// Lists the application directories of `repo` at `revision`, sorted by path.
///
/// # Errors
///
/// Returns the first listing failure. For kustomize, an error is returned only
/// when every kustomization name fails.
pub async fn discover_apps(
    client: &dyn AppSourceClient,
    repo: &RepositoryRecord,
    revision: &str,
) -> Result<Vec<AppInfo>, AppSourceError> {
    let ksonnet = client.list_dir(repo, revision, "*app.yaml").await?;
    let components = client.list_dir(repo, revision, "*components/params.libsonnet").await?;
    let helm = client.list_dir(repo, revision, "*Chart.yaml").await?;
    let kustomize = list_kustomizations(client, repo, revision).await?;

    let component_dirs: BTreeSet<&str> = components.iter().map(|p| parent(parent(p))).collect();

    let mut apps = BTreeSet::new();
    for file in &ksonnet {
        let dir = parent(file);
        if component_dirs.contains(dir) {
            apps.insert(AppInfo { path: dir.to_owned(), source_type: AppSourceType::Ksonnet });
        }
    }
    for file in &helm {
        apps.insert(AppInfo { path: parent(file).to_owned(), source_type: AppSourceType::Helm });
    }
    for file in &kustomize {
        apps.insert(AppInfo {
            path: parent(file).to_owned(),
            source_type: AppSourceType::Kustomize,
        });
    }

    Ok(apps.into_iter().collect())
}

async fn list_kustomizations(
    client: &dyn AppSourceClient,
    repo: &RepositoryRecord,
    revision: &str,
) -> Result<Vec<String>, AppSourceError> {
    let mut last_err = AppSourceError::new("could not find kustomization");
    for name in KUSTOMIZATION_NAMES {
        match client.list_dir(repo, revision, &format!("*{name}")).await {
            Ok(files) => return Ok(files),
            Err(e) => {
                tracing::debug!(name, error = %e, "Kustomization listing failed");
                last_err = e;
            },
        }
    }
    Err(last_err)
}
