//! Repository registry service.
//!
//! Every operation takes the calling [`Subject`] and asks the [`Enforcer`]
//! before touching storage:
//!
//! | Operation | Action | On denial |
//! |-----------|--------|-----------|
//! | `list_repositories`, `list_repository_credentials` | `get` | entry omitted |
//! | `get_repository`, `list_apps`, `get_app_details` | `get` | `PermissionDenied` |
//! | `create_*`, `validate_access` | `create` | `PermissionDenied` |
//! | `update_*` | `update` | `PermissionDenied` |
//! | `delete_*` | `delete` | `PermissionDenied` |
//!
//! Creates are idempotent: a collision with an identical stored record
//! returns the stored record; a differing one is overwritten only with
//! `upsert`.

use std::sync::Arc;

use chrono::Utc;
use gitops_state_storage::repository::{
    ConnectionState, CredentialRecord, RepoCredentials, RepositoryRecord, RepositoryStore,
};
use tokio_util::sync::CancellationToken;

use crate::{
    apps::{AppDetails, AppDetailsQuery, AppInfo, AppSourceClient, discover_apps},
    authz::{Action, Enforcer, ResourceKind, Subject},
    cache::{ConnectionStateCache, MemoryConnectionStateCache},
    config::RegistryConfig,
    error::{RegistryError, Result},
    probe::{ConnectionProbe, ProbeTarget},
    prober::ConnectionProber,
};

/// Request for [`RepositoryRegistry::validate_access`].
#[derive(Debug, Clone, Default, bon::Builder)]
pub struct AccessCheck {
    /// Repository URL.
    #[builder(into)]
    pub url: String,
    /// Credentials to test with. Empty means "use the matching credential set".
    #[builder(default)]
    pub credentials: RepoCredentials,
    /// Skip TLS / host-key verification.
    #[builder(default)]
    pub insecure: bool,
    /// Fetch large-file-storage objects.
    #[builder(default)]
    pub enable_lfs: bool,
}

/// Authorization-gated CRUD over repositories and credential sets.
///
/// Cloning is cheap; clones share the store, cache, and seams.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use gitops_state_registry::{
///     AllowAll, AppSourceClient, ConnectionProbe, RepositoryRegistry, Subject,
/// };
/// use gitops_state_storage::{
///     MemoryBackend,
///     repository::{BackendRepositoryStore, RepositoryRecord},
/// };
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(
/// #     probe: Arc<dyn ConnectionProbe>,
/// #     apps: Arc<dyn AppSourceClient>,
/// # ) -> Result<(), Box<dyn std::error::Error>> {
/// let registry = RepositoryRegistry::builder()
///     .store(Arc::new(BackendRepositoryStore::new(MemoryBackend::new())))
///     .enforcer(Arc::new(AllowAll))
///     .probe(probe)
///     .apps(apps)
///     .build();
///
/// let alice = Subject::new("alice");
/// let repo = RepositoryRecord::builder().url("git@x/y").build();
/// let created = registry.create_repository(&alice, repo, false, &CancellationToken::new()).await?;
/// assert!(created.connection_state.is_successful());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RepositoryRegistry {
    store: Arc<dyn RepositoryStore>,
    enforcer: Arc<dyn Enforcer>,
    prober: ConnectionProber,
    apps: Arc<dyn AppSourceClient>,
    config: RegistryConfig,
}

#[bon::bon]
impl RepositoryRegistry {
    /// Creates a registry.
    ///
    /// Without a `cache`, connection states are kept in a
    /// [`MemoryConnectionStateCache`] sized by `config.cache_capacity()`.
    #[builder]
    pub fn new(
        store: Arc<dyn RepositoryStore>,
        enforcer: Arc<dyn Enforcer>,
        probe: Arc<dyn ConnectionProbe>,
        cache: Option<Arc<dyn ConnectionStateCache>>,
        apps: Arc<dyn AppSourceClient>,
        #[builder(default)] config: RegistryConfig,
    ) -> Self {
        let cache: Arc<dyn ConnectionStateCache> = match cache {
            Some(cache) => cache,
            None => Arc::new(MemoryConnectionStateCache::new(config.cache_capacity())),
        };
        let prober = ConnectionProber::new(store.clone(), probe, cache, config.probe_timeout());
        Self { store, enforcer, prober, apps, config }
    }

    /// Returns the connection prober.
    #[must_use]
    pub fn prober(&self) -> &ConnectionProber {
        &self.prober
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn allowed(&self, subject: &Subject, action: Action, url: &str) -> bool {
        self.enforcer.enforce(subject, ResourceKind::Repositories, action, url)
    }

    fn authorize(&self, subject: &Subject, action: Action, url: &str) -> Result<()> {
        if self.allowed(subject, action, url) {
            return Ok(());
        }
        tracing::warn!(subject = %subject, action = %action, url, "Permission denied");
        Err(RegistryError::PermissionDenied {
            subject: subject.name.clone(),
            action,
            object: url.to_owned(),
        })
    }

    async fn find_repository(&self, url: &str) -> Result<RepositoryRecord> {
        self.store.get_repository(url).await?.ok_or_else(|| RegistryError::not_found(url))
    }

    async fn invalidate(&self, url: &str) {
        if let Err(e) = self.prober.cache().set(url, None).await {
            tracing::warn!(url, error = %e, "Connection-state cache invalidation failed");
        }
    }

    /// Lists the repositories `subject` may read, with their connection
    /// states. Credentials are stripped down to the username.
    ///
    /// # Errors
    ///
    /// Returns a storage error or the first probe lookup failure.
    #[tracing::instrument(skip(self, cancel), fields(subject = %subject))]
    pub async fn list_repositories(
        &self,
        subject: &Subject,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<RepositoryRecord>> {
        let mut items: Vec<RepositoryRecord> = self
            .store
            .list_repositories()
            .await?
            .into_iter()
            .filter(|repo| self.allowed(subject, Action::Get, &repo.url))
            .map(|repo| repo.redacted())
            .collect();

        let urls: Vec<String> = items.iter().map(|repo| repo.url.clone()).collect();
        let states = self.prober.probe_all(&urls, force_refresh, cancel).await?;
        for (item, state) in items.iter_mut().zip(states) {
            item.connection_state = state;
        }
        Ok(items)
    }

    /// Lists the credential sets `subject` may read, URL and username only.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    #[tracing::instrument(skip(self), fields(subject = %subject))]
    pub async fn list_repository_credentials(
        &self,
        subject: &Subject,
    ) -> Result<Vec<CredentialRecord>> {
        Ok(self
            .store
            .list_credentials()
            .await?
            .into_iter()
            .filter(|set| self.allowed(subject, Action::Get, &set.url))
            .map(|set| set.redacted())
            .collect())
    }

    /// Returns one repository, credentials stripped down to the username.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::PermissionDenied`]
    /// - [`RegistryError::NotFound`] if `url` is not registered
    #[tracing::instrument(skip(self), fields(subject = %subject))]
    pub async fn get_repository(&self, subject: &Subject, url: &str) -> Result<RepositoryRecord> {
        self.authorize(subject, Action::Get, url)?;
        Ok(self.find_repository(url).await?.redacted())
    }

    /// Registers a repository after confirming it is reachable.
    ///
    /// Without credentials of its own, the repository is tested with the
    /// matching credential set. Creating an identical record twice returns the
    /// stored record; a differing one is updated only when `upsert` is set.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::PermissionDenied`]
    /// - [`RegistryError::InvalidArgument`] for an empty URL
    /// - [`RegistryError::Connection`] if the repository is unreachable
    /// - [`RegistryError::AlreadyExistsDiffers`] on a differing collision
    ///   without `upsert`
    #[tracing::instrument(
        skip(self, record, cancel),
        fields(subject = %subject, url = %record.url)
    )]
    pub async fn create_repository(
        &self,
        subject: &Subject,
        mut record: RepositoryRecord,
        upsert: bool,
        cancel: &CancellationToken,
    ) -> Result<RepositoryRecord> {
        self.authorize(subject, Action::Create, &record.url)?;
        if record.url.trim().is_empty() {
            return Err(RegistryError::InvalidArgument("repository url must not be empty".into()));
        }

        let credentials =
            self.prober.effective_credentials(&record.url, &record.credentials).await?;
        self.prober
            .test(
                ProbeTarget {
                    url: &record.url,
                    credentials: &credentials,
                    insecure: record.insecure,
                    enable_lfs: record.enable_lfs,
                },
                cancel,
            )
            .await?;

        record.connection_state = ConnectionState::successful(Utc::now());

        match self.store.create_repository(&record).await {
            Ok(()) => {
                tracing::info!("Repository created");
                if let Err(e) =
                    self.prober.cache().set(&record.url, Some(&record.connection_state)).await
                {
                    tracing::warn!(error = %e, "Connection-state cache write failed");
                }
                Ok(record.redacted())
            },
            Err(e) if e.is_already_exists() => {
                let existing = self.find_repository(&record.url).await?;
                if existing.same_spec(&record) {
                    tracing::debug!("Repository already registered with identical spec");
                    Ok(existing.redacted())
                } else if upsert {
                    self.update_repository(subject, record).await
                } else {
                    Err(RegistryError::AlreadyExistsDiffers { kind: "repository", url: record.url })
                }
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrites a stored repository. Its cached connection state is cleared.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::PermissionDenied`]
    /// - [`RegistryError::NotFound`] if `url` is not registered
    #[tracing::instrument(skip(self, record), fields(subject = %subject, url = %record.url))]
    pub async fn update_repository(
        &self,
        subject: &Subject,
        record: RepositoryRecord,
    ) -> Result<RepositoryRecord> {
        self.authorize(subject, Action::Update, &record.url)?;
        self.store.update_repository(&record).await?;
        tracing::info!("Repository updated");
        self.invalidate(&record.url).await;
        Ok(record.redacted())
    }

    /// Removes a repository and clears its cached connection state.
    ///
    /// A cache failure is logged and does not block the delete.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::PermissionDenied`]
    /// - [`RegistryError::NotFound`] if `url` is not registered
    #[tracing::instrument(skip(self), fields(subject = %subject))]
    pub async fn delete_repository(&self, subject: &Subject, url: &str) -> Result<()> {
        self.authorize(subject, Action::Delete, url)?;
        self.invalidate(url).await;
        self.store.delete_repository(url).await?;
        tracing::info!("Repository deleted");
        Ok(())
    }

    /// Registers a credential set. No connectivity test is run.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::PermissionDenied`]
    /// - [`RegistryError::InvalidArgument`] for an empty URL prefix
    /// - [`RegistryError::AlreadyExistsDiffers`] on a differing collision
    ///   without `upsert`
    #[tracing::instrument(skip(self, record), fields(subject = %subject, url = %record.url))]
    pub async fn create_repository_credentials(
        &self,
        subject: &Subject,
        record: CredentialRecord,
        upsert: bool,
    ) -> Result<CredentialRecord> {
        self.authorize(subject, Action::Create, &record.url)?;
        if record.url.trim().is_empty() {
            return Err(RegistryError::InvalidArgument("credential url must not be empty".into()));
        }

        match self.store.create_credentials(&record).await {
            Ok(()) => {
                tracing::info!("Credential set created");
                Ok(record.redacted())
            },
            Err(e) if e.is_already_exists() => {
                let existing = self
                    .store
                    .get_credentials(&record.url)
                    .await?
                    .ok_or_else(|| RegistryError::not_found(&record.url))?;
                if existing == record {
                    Ok(existing.redacted())
                } else if upsert {
                    self.update_repository_credentials(subject, record).await
                } else {
                    Err(RegistryError::AlreadyExistsDiffers {
                        kind: "repository credentials",
                        url: record.url,
                    })
                }
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrites a stored credential set.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::PermissionDenied`]
    /// - [`RegistryError::NotFound`] if no set exists for the prefix
    #[tracing::instrument(skip(self, record), fields(subject = %subject, url = %record.url))]
    pub async fn update_repository_credentials(
        &self,
        subject: &Subject,
        record: CredentialRecord,
    ) -> Result<CredentialRecord> {
        self.authorize(subject, Action::Update, &record.url)?;
        self.store.update_credentials(&record).await?;
        tracing::info!("Credential set updated");
        Ok(record.redacted())
    }

    /// Removes a credential set.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::PermissionDenied`]
    /// - [`RegistryError::NotFound`] if no set exists for the prefix
    #[tracing::instrument(skip(self), fields(subject = %subject))]
    pub async fn delete_repository_credentials(&self, subject: &Subject, url: &str) -> Result<()> {
        self.authorize(subject, Action::Delete, url)?;
        self.store.delete_credentials(url).await?;
        tracing::info!("Credential set deleted");
        Ok(())
    }

    /// Tests connectivity without registering anything.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::PermissionDenied`] (checked with the `create` action)
    /// - [`RegistryError::Connection`] if the repository is unreachable
    #[tracing::instrument(skip(self, check, cancel), fields(subject = %subject, url = %check.url))]
    pub async fn validate_access(
        &self,
        subject: &Subject,
        check: &AccessCheck,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.authorize(subject, Action::Create, &check.url)?;
        let credentials = self.prober.effective_credentials(&check.url, &check.credentials).await?;
        self.prober
            .test(
                ProbeTarget {
                    url: &check.url,
                    credentials: &credentials,
                    insecure: check.insecure,
                    enable_lfs: check.enable_lfs,
                },
                cancel,
            )
            .await
    }

    /// Lists the applications in a registered repository, sorted by path.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::PermissionDenied`]
    /// - [`RegistryError::NotFound`] if `url` is not registered
    /// - [`RegistryError::AppSource`] if the repository cannot be listed
    /// - [`RegistryError::Cancelled`]
    #[tracing::instrument(skip(self, cancel), fields(subject = %subject))]
    pub async fn list_apps(
        &self,
        subject: &Subject,
        url: &str,
        revision: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<AppInfo>> {
        self.authorize(subject, Action::Get, url)?;
        let repo = self.find_repository(url).await?;
        let revision = self.revision_or_default(revision);

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RegistryError::Cancelled),
            result = discover_apps(self.apps.as_ref(), &repo, revision) => Ok(result?),
        }
    }

    /// Returns details of one application in a registered repository.
    ///
    /// # Errors
    ///
    /// Same as [`list_apps`](Self::list_apps).
    #[tracing::instrument(skip(self, query, cancel), fields(subject = %subject, url = %query.url))]
    pub async fn get_app_details(
        &self,
        subject: &Subject,
        query: &AppDetailsQuery,
        cancel: &CancellationToken,
    ) -> Result<AppDetails> {
        self.authorize(subject, Action::Get, &query.url)?;
        let repo = self.find_repository(&query.url).await?;
        let revision = self.revision_or_default(query.revision.as_deref());

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RegistryError::Cancelled),
            result = self.apps.app_details(&repo, revision, &query.path) => Ok(result?),
        }
    }

    fn revision_or_default<'a>(&'a self, revision: Option<&'a str>) -> &'a str {
        match revision {
            Some(rev) if !rev.trim().is_empty() => rev,
            _ => self.config.default_revision(),
        }
    }
}

impl std::fmt::Debug for RepositoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryRegistry")
            .field("config", &self.config)
            .field("prober", &self.prober)
            .finish_non_exhaustive()
    }
}

