//! Cached, parallel connectivity probing.
//!
//! ```text
//! probe(url) ──► cache hit? ──yes──► cached state
//!                    │ no (or force_refresh)
//!                    ▼
//!              registry lookup ──► effective credentials ──► ConnectionProbe
//!                                                                │
//!                           Successful / Failed("Unable to connect ...")
//!                                                                │
//!                                          cache.set (best effort) ◄┘
//! ```
//!
//! [`ConnectionProber::probe_all`] runs one task per URL and returns the states
//! in input order. The first hard error (lookup or storage failure) is returned
//! immediately; probes still in flight keep running and may update the cache.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use fail::fail_point;
use gitops_state_storage::repository::{
    ConnectionState, RepoCredentials, RepositoryRecord, RepositoryStore,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::{
    cache::ConnectionStateCache,
    error::{RegistryError, Result},
    probe::{ConnectionProbe, ProbeError, ProbeTarget},
};

/// Probes repositories and keeps the connection-state cache current.
#[derive(Clone)]
pub struct ConnectionProber {
    store: Arc<dyn RepositoryStore>,
    probe: Arc<dyn ConnectionProbe>,
    cache: Arc<dyn ConnectionStateCache>,
    probe_timeout: Duration,
}

impl ConnectionProber {
    /// Creates a prober over the given seams.
    #[must_use]
    pub fn new(
        store: Arc<dyn RepositoryStore>,
        probe: Arc<dyn ConnectionProbe>,
        cache: Arc<dyn ConnectionStateCache>,
        probe_timeout: Duration,
    ) -> Self {
        Self { store, probe, cache, probe_timeout }
    }

    /// Returns the connection-state cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn ConnectionStateCache> {
        &self.cache
    }

    /// Resolves the credentials used to reach `repo`: its own when it has
    /// any, otherwise the longest matching credential set.
    pub(crate) async fn effective_credentials(
        &self,
        url: &str,
        own: &RepoCredentials,
    ) -> Result<RepoCredentials> {
        if own.has_credentials() {
            return Ok(own.clone());
        }
        let shared = self.store.find_credentials_for(url).await?;
        Ok(shared.map(|set| set.credentials).unwrap_or_else(|| own.clone()))
    }

    /// Runs one bounded connectivity test.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::Connection`] if the probe fails or times out
    /// - [`RegistryError::Cancelled`] if `cancel` fires first
    pub async fn test(&self, target: ProbeTarget<'_>, cancel: &CancellationToken) -> Result<()> {
        fail_point!("registry-before-probe", |_| {
            Err(RegistryError::Connection {
                url: target.url.to_owned(),
                source: ProbeError::new("injected failure before probe"),
            })
        });

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RegistryError::Cancelled),
            result = tokio::time::timeout(self.probe_timeout, self.probe.test(target)) => result,
        };

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => {
                Err(RegistryError::Connection { url: target.url.to_owned(), source })
            },
            Err(_) => Err(RegistryError::Connection {
                url: target.url.to_owned(),
                source: ProbeError::new(format!("timed out after {:?}", self.probe_timeout)),
            }),
        }
    }

    /// Returns the connection state of a registered repository.
    ///
    /// A cached state is returned unless `force_refresh` is set. An
    /// unreachable repository is not an error: its state is `Failed`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NotFound`] if `url` is not registered
    /// - [`RegistryError::Storage`] if the registry cannot be read
    /// - [`RegistryError::Cancelled`] if `cancel` fires
    #[tracing::instrument(skip(self, cancel))]
    pub async fn probe(
        &self,
        url: &str,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> Result<ConnectionState> {
        if !force_refresh {
            match self.cache.get(url).await {
                Ok(Some(state)) => return Ok(state),
                Ok(None) => {},
                Err(e) => tracing::warn!(error = %e, "Connection-state cache read failed"),
            }
        }

        let repo =
            self.store.get_repository(url).await?.ok_or_else(|| RegistryError::not_found(url))?;
        let state = self.probe_record(&repo, cancel).await?;

        if let Err(e) = self.cache.set(url, Some(&state)).await {
            tracing::warn!(error = %e, "Connection-state cache write failed");
        }
        Ok(state)
    }

    async fn probe_record(
        &self,
        repo: &RepositoryRecord,
        cancel: &CancellationToken,
    ) -> Result<ConnectionState> {
        let credentials = self.effective_credentials(&repo.url, &repo.credentials).await?;
        let target = ProbeTarget {
            url: &repo.url,
            credentials: &credentials,
            insecure: repo.insecure,
            enable_lfs: repo.enable_lfs,
        };

        match self.test(target, cancel).await {
            Ok(()) => Ok(ConnectionState::successful(Utc::now())),
            Err(RegistryError::Connection { source, .. }) => {
                tracing::debug!(error = %source, "Repository unreachable");
                Ok(ConnectionState::failed(
                    format!("Unable to connect to repository: {source}"),
                    Utc::now(),
                ))
            },
            Err(e) => Err(e),
        }
    }

    /// Probes every URL concurrently, returning states in input order.
    ///
    /// # Errors
    ///
    /// Returns the first error any probe reports (see [`probe`](Self::probe)).
    #[tracing::instrument(skip(self, urls, cancel), fields(count = urls.len()))]
    pub async fn probe_all(
        &self,
        urls: &[String],
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<ConnectionState>> {
        let mut tasks = JoinSet::new();
        for (index, url) in urls.iter().cloned().enumerate() {
            let prober = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { (index, prober.probe(&url, force_refresh, &cancel).await) });
        }

        let mut states: Vec<Option<ConnectionState>> = vec![None; urls.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(state))) => states[index] = Some(state),
                Ok((_, Err(e))) => {
                    tasks.detach_all();
                    return Err(e);
                },
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => {
                    tasks.detach_all();
                    return Err(RegistryError::Cancelled);
                },
            }
        }

        Ok(states.into_iter().flatten().collect())
    }
}

impl std::fmt::Debug for ConnectionProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProber")
            .field("probe_timeout", &self.probe_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use gitops_state_storage::{
        MemoryBackend,
        repository::{BackendRepositoryStore, ConnectionStatus, CredentialRecord},
        testutil::{sample_credentials, sample_repository},
    };

    use super::*;
    use crate::{
        cache::MemoryConnectionStateCache,
        testutil::{FailingCache, FakeProbe},
    };

    async fn prober_with(
        urls: &[&str],
        probe: Arc<FakeProbe>,
        cache: Arc<dyn ConnectionStateCache>,
    ) -> (ConnectionProber, Arc<BackendRepositoryStore<MemoryBackend>>) {
        let store = Arc::new(BackendRepositoryStore::new(MemoryBackend::new()));
        for url in urls {
            store.create_repository(&sample_repository(url)).await.unwrap();
        }
        let prober = ConnectionProber::new(store.clone(), probe, cache, Duration::from_secs(5));
        (prober, store)
    }

    #[tokio::test]
    async fn test_probe_caches_until_forced() {
        let probe = Arc::new(FakeProbe::default());
        let cache = Arc::new(MemoryConnectionStateCache::default());
        let (prober, _) = prober_with(&["git@x/y"], probe.clone(), cache.clone()).await;
        let cancel = CancellationToken::new();

        let first = prober.probe("git@x/y", false, &cancel).await.unwrap();
        assert!(first.is_successful());
        let second = prober.probe("git@x/y", false, &cancel).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(probe.calls("git@x/y"), 1);

        probe.fail("git@x/y");
        let refreshed = prober.probe("git@x/y", true, &cancel).await.unwrap();
        assert_eq!(refreshed.status, ConnectionStatus::Failed);
        assert!(refreshed.message.starts_with("Unable to connect to repository: "));
        assert_eq!(probe.calls("git@x/y"), 2);
        assert_eq!(cache.get("git@x/y").await.unwrap(), Some(refreshed));
    }

    #[tokio::test]
    async fn test_probe_unregistered_url_is_not_found() {
        let cache = Arc::new(MemoryConnectionStateCache::default());
        let (prober, _) = prober_with(&[], Arc::new(FakeProbe::default()), cache).await;
        let err =
            prober.probe("git@x/missing", false, &CancellationToken::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_cache_failures_are_not_fatal() {
        let probe = Arc::new(FakeProbe::default());
        let (prober, _) = prober_with(&["git@x/y"], probe.clone(), Arc::new(FailingCache)).await;
        let cancel = CancellationToken::new();

        assert!(prober.probe("git@x/y", false, &cancel).await.unwrap().is_successful());
        assert!(prober.probe("git@x/y", false, &cancel).await.unwrap().is_successful());
        assert_eq!(probe.calls("git@x/y"), 2);
    }

    #[tokio::test]
    async fn test_probe_uses_matching_credential_set() {
        let probe = Arc::new(FakeProbe::default());
        let cache = Arc::new(MemoryConnectionStateCache::default());
        let (prober, store) = prober_with(&[], probe.clone(), cache).await;
        let url = "https://git.example/team/app.git";
        store.create_repository(&RepositoryRecord::builder().url(url).build()).await.unwrap();
        let shared: CredentialRecord = sample_credentials("https://git.example/team/", "team-bot");
        store.create_credentials(&shared).await.unwrap();

        prober.probe(url, false, &CancellationToken::new()).await.unwrap();
        assert_eq!(probe.last_username(url).as_deref(), Some("team-bot"));
    }

    #[tokio::test]
    async fn test_probe_all_preserves_order() {
        let probe = Arc::new(FakeProbe::default());
        probe.fail("git@x/b");
        let (prober, _) = prober_with(
            &["git@x/a", "git@x/b", "git@x/c"],
            probe,
            Arc::new(MemoryConnectionStateCache::default()),
        )
        .await;

        let urls = vec!["git@x/c".to_owned(), "git@x/b".to_owned(), "git@x/a".to_owned()];
        let states = prober.probe_all(&urls, false, &CancellationToken::new()).await.unwrap();
        let statuses: Vec<_> = states.iter().map(|s| s.status).collect();
        assert_eq!(statuses, vec![
            ConnectionStatus::Successful,
            ConnectionStatus::Failed,
            ConnectionStatus::Successful
        ]);
    }

    #[tokio::test]
    async fn test_probe_all_fails_fast_on_lookup_error() {
        let (prober, _) = prober_with(
            &["git@x/a"],
            Arc::new(FakeProbe::default()),
            Arc::new(MemoryConnectionStateCache::default()),
        )
        .await;
        let urls = vec!["git@x/a".to_owned(), "git@x/missing".to_owned()];
        let err = prober.probe_all(&urls, false, &CancellationToken::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_times_out_as_failed_state() {
        let probe = Arc::new(FakeProbe::default());
        probe.set_delay(Duration::from_secs(30));
        let (prober, _) =
            prober_with(&["git@x/y"], probe, Arc::new(MemoryConnectionStateCache::default())).await;

        let state = prober.probe("git@x/y", false, &CancellationToken::new()).await.unwrap();
        assert_eq!(state.status, ConnectionStatus::Failed);
        assert!(state.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancelled_probe() {
        let (prober, _) = prober_with(
            &["git@x/y"],
            Arc::new(FakeProbe::default()),
            Arc::new(MemoryConnectionStateCache::default()),
        )
        .await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = prober.probe("git@x/y", true, &cancel).await.unwrap_err();
        assert!(matches!(err, RegistryError::Cancelled));
    }
}
