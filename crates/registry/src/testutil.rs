//! Test doubles for the registry seams.
//!
//! Enabled by the `testutil` feature:
//!
//! ```toml
//! [dev-dependencies]
//! gitops-state-registry = { path = "../registry", features = ["testutil"] }
//! ```

#![allow(clippy::expect_used, clippy::panic)]

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use gitops_state_storage::{
    MemoryBackend, StorageError, StorageResult,
    repository::{BackendRepositoryStore, ConnectionState, RepositoryRecord},
};
use parking_lot::Mutex;

use crate::{
    apps::{AppDetails, AppSourceClient, AppSourceError},
    authz::{Action, AllowAll, Enforcer, ResourceKind, Subject},
    cache::{ConnectionStateCache, MemoryConnectionStateCache},
    config::RegistryConfig,
    probe::{ConnectionProbe, ProbeError, ProbeTarget},
    registry::RepositoryRegistry,
};

#[derive(Default)]
struct ProbeState {
    failing: BTreeSet<String>,
    calls: HashMap<String, usize>,
    usernames: HashMap<String, String>,
    delay: Option<Duration>,
}

/// Scripted [`ConnectionProbe`]: succeeds unless the URL was marked failing.
#[derive(Default)]
pub struct FakeProbe {
    state: Mutex<ProbeState>,
}

impl FakeProbe {
    /// Makes every later probe of `url` fail.
    pub fn fail(&self, url: &str) {
        self.state.lock().failing.insert(url.to_owned());
    }

    /// Makes `url` reachable again.
    pub fn recover(&self, url: &str) {
        self.state.lock().failing.remove(url);
    }

    /// Delays every probe by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    /// Number of probes issued for `url`.
    #[must_use]
    pub fn calls(&self, url: &str) -> usize {
        self.state.lock().calls.get(url).copied().unwrap_or(0)
    }

    /// Total number of probes issued.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }

    /// Username presented by the most recent probe of `url`.
    #[must_use]
    pub fn last_username(&self, url: &str) -> Option<String> {
        self.state.lock().usernames.get(url).cloned()
    }
}

#[async_trait]
impl ConnectionProbe for FakeProbe {
    async fn test(&self, target: ProbeTarget<'_>) -> Result<(), ProbeError> {
        let (failing, delay) = {
            let mut state = self.state.lock();
            *state.calls.entry(target.url.to_owned()).or_default() += 1;
            state.usernames.insert(target.url.to_owned(), target.credentials.username.clone());
            (state.failing.contains(target.url), state.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(ProbeError::new("authentication required"));
        }
        Ok(())
    }
}

/// Connection-state cache whose every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingCache;

#[async_trait]
impl ConnectionStateCache for FailingCache {
    async fn get(&self, _url: &str) -> StorageResult<Option<ConnectionState>> {
        Err(StorageError::connection("cache unavailable"))
    }

    async fn set(&self, _url: &str, _state: Option<&ConnectionState>) -> StorageResult<()> {
        Err(StorageError::connection("cache unavailable"))
    }
}

/// [`AppSourceClient`] answering from a fixed pattern-to-files table.
///
/// Unknown patterns list as empty.
#[derive(Debug, Default, Clone)]
pub struct FakeAppSource {
    files: BTreeMap<String, Vec<String>>,
    failing: BTreeSet<String>,
    details: BTreeMap<String, AppDetails>,
}

impl FakeAppSource {
    /// Answers `pattern` with `files`.
    #[must_use]
    pub fn with_files(mut self, pattern: &str, files: &[&str]) -> Self {
        self.files.insert(pattern.to_owned(), files.iter().map(|f| (*f).to_owned()).collect());
        self
    }

    /// Fails listings of `pattern`.
    #[must_use]
    pub fn failing(mut self, pattern: &str) -> Self {
        self.failing.insert(pattern.to_owned());
        self
    }

    /// Answers detail requests for `details.path`.
    #[must_use]
    pub fn with_details(mut self, details: AppDetails) -> Self {
        self.details.insert(details.path.clone(), details);
        self
    }
}

#[async_trait]
impl AppSourceClient for FakeAppSource {
    async fn list_dir(
        &self,
        _repo: &RepositoryRecord,
        _revision: &str,
        pattern: &str,
    ) -> Result<Vec<String>, AppSourceError> {
        if self.failing.contains(pattern) {
            return Err(AppSourceError::new(format!("listing {pattern} failed")));
        }
        Ok(self.files.get(pattern).cloned().unwrap_or_default())
    }

    async fn app_details(
        &self,
        _repo: &RepositoryRecord,
        _revision: &str,
        path: &str,
    ) -> Result<AppDetails, AppSourceError> {
        self.details
            .get(path)
            .cloned()
            .ok_or_else(|| AppSourceError::new(format!("no app at {path}")))
    }
}

/// Enforcer that denies one action and allows the rest.
#[must_use]
pub fn deny(action: Action) -> impl Enforcer {
    move |_: &Subject, _: ResourceKind, requested: Action, _: &str| requested != action
}

/// Handles to a registry wired over in-memory fakes.
pub struct Harness {
    /// The registry under test.
    pub registry: RepositoryRegistry,
    /// Backing store, for inspecting records directly.
    pub store: Arc<BackendRepositoryStore<MemoryBackend>>,
    /// Scripted probe.
    pub probe: Arc<FakeProbe>,
    /// Connection-state cache.
    pub cache: Arc<MemoryConnectionStateCache>,
}

impl Harness {
    /// Builds a harness with the given enforcer and app source.
    #[must_use]
    pub fn with(enforcer: impl Enforcer + 'static, apps: FakeAppSource) -> Self {
        let store = Arc::new(BackendRepositoryStore::new(MemoryBackend::new()));
        let probe = Arc::new(FakeProbe::default());
        let cache = Arc::new(MemoryConnectionStateCache::default());
        let registry = RepositoryRegistry::builder()
            .store(store.clone())
            .enforcer(Arc::new(enforcer))
            .probe(probe.clone())
            .cache(cache.clone())
            .apps(Arc::new(apps))
            .config(RegistryConfig::default())
            .build();
        Self { registry, store, probe, cache }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::with(AllowAll, FakeAppSource::default())
    }
}
