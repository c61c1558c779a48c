//! Connection-state cache.
//!
//! A side table from repository URL to the last [`ConnectionState`]. Entries
//! never expire on their own: they are overwritten by the next probe and
//! cleared when the repository is deleted. Concurrent writers race and the
//! last write wins; every entry can be recomputed by probing again.
//!
//! | Implementation | Backing | Fallible |
//! |----------------|---------|----------|
//! | [`MemoryConnectionStateCache`] | moka, capacity-bounded | No |
//! | [`BackendConnectionStateCache`] | any [`StorageBackend`] | Yes |

use async_trait::async_trait;
use gitops_state_storage::{
    StorageBackend, StorageError, StorageResult, repository::ConnectionState,
};
use moka::future::Cache;

/// Storage key prefix for persisted connection states.
pub const CONNECTION_STATE_PREFIX: &str = "connection-state/";

/// Default number of URLs kept by [`MemoryConnectionStateCache`].
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// URL-keyed store of connection states.
#[async_trait]
pub trait ConnectionStateCache: Send + Sync {
    /// Returns the cached state, or `None` on a miss.
    async fn get(&self, url: &str) -> StorageResult<Option<ConnectionState>>;

    /// Stores `state`, or clears the entry when `state` is `None`.
    async fn set(&self, url: &str, state: Option<&ConnectionState>) -> StorageResult<()>;
}

/// In-process cache with no TTL.
///
/// Eviction happens only when `max_capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct MemoryConnectionStateCache {
    cache: Cache<String, ConnectionState>,
}

impl MemoryConnectionStateCache {
    /// Creates a cache holding at most `max_capacity` URLs.
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self { cache: Cache::builder().max_capacity(max_capacity).build() }
    }
}

impl Default for MemoryConnectionStateCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[async_trait]
impl ConnectionStateCache for MemoryConnectionStateCache {
    async fn get(&self, url: &str) -> StorageResult<Option<ConnectionState>> {
        Ok(self.cache.get(url).await)
    }

    async fn set(&self, url: &str, state: Option<&ConnectionState>) -> StorageResult<()> {
        match state {
            Some(state) => self.cache.insert(url.to_owned(), state.clone()).await,
            None => self.cache.invalidate(url).await,
        }
        Ok(())
    }
}

/// Cache persisted in a storage backend as JSON under
/// `connection-state/{url}`.
///
/// Shares entries across processes that use the same backend.
#[derive(Debug, Clone)]
pub struct BackendConnectionStateCache<B> {
    backend: B,
}

impl<B: StorageBackend> BackendConnectionStateCache<B> {
    /// Wraps a storage backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    fn key(url: &str) -> Vec<u8> {
        format!("{CONNECTION_STATE_PREFIX}{url}").into_bytes()
    }
}

#[async_trait]
impl<B: StorageBackend> ConnectionStateCache for BackendConnectionStateCache<B> {
    #[tracing::instrument(skip(self))]
    async fn get(&self, url: &str) -> StorageResult<Option<ConnectionState>> {
        let Some(bytes) = self.backend.get(&Self::key(url)).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::serialization_with_source("decode connection state", e))
    }

    #[tracing::instrument(skip(self, state))]
    async fn set(&self, url: &str, state: Option<&ConnectionState>) -> StorageResult<()> {
        match state {
            Some(state) => {
                let bytes = serde_json::to_vec(state).map_err(|e| {
                    StorageError::serialization_with_source("encode connection state", e)
                })?;
                self.backend.set(Self::key(url), bytes).await
            },
            None => self.backend.delete(&Self::key(url)).await,
        }
    }
}
