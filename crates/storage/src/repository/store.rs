//! Persistence for repository records and credential sets.
//!
//! [`RepositoryStore`] is the typed view of the configuration store that the
//! registry reads and writes. [`BackendRepositoryStore`] implements it on top
//! of any [`StorageBackend`], encoding records as JSON.
//!
//! # Key Layout
//!
//! ```text
//! repositories/{url}   -> RepositoryRecord (JSON)
//! repo-creds/{url}     -> CredentialRecord (JSON)
//! ```
//!
//! Creation uses an insert-if-absent
//! [`compare_and_set`](StorageBackend::compare_and_set), so two concurrent
//! creates for the same URL resolve to exactly one winner and one
//! [`StorageError::AlreadyExists`].

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    backend::StorageBackend,
    error::{StorageError, StorageResult},
    repository::{CredentialRecord, RepositoryRecord},
};

/// Storage key prefix for repository records.
pub const REPOSITORY_PREFIX: &str = "repositories/";

/// Storage key prefix for credential-set records.
pub const CREDENTIALS_PREFIX: &str = "repo-creds/";

/// Persistence layer for repository records and credential sets.
///
/// Records are identified by URL. Creation never overwrites: a second create
/// for the same URL fails with [`StorageError::AlreadyExists`] and leaves the
/// stored record untouched.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Lists every repository record, ordered by URL.
    async fn list_repositories(&self) -> StorageResult<Vec<RepositoryRecord>>;

    /// Retrieves a repository record by URL.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))` if the repository is registered
    /// - `Ok(None)` if it is not
    /// - `Err(...)` on storage errors
    async fn get_repository(&self, url: &str) -> StorageResult<Option<RepositoryRecord>>;

    /// Stores a new repository record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`] if a record with the same URL
    /// is already stored.
    async fn create_repository(&self, record: &RepositoryRecord) -> StorageResult<()>;

    /// Replaces an existing repository record.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if no record with this URL exists.
    /// - [`StorageError::Conflict`] if the record changed between read and write.
    async fn update_repository(&self, record: &RepositoryRecord) -> StorageResult<()>;

    /// Removes a repository record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no record with this URL exists.
    async fn delete_repository(&self, url: &str) -> StorageResult<()>;

    /// Lists every credential set, ordered by URL prefix.
    async fn list_credentials(&self) -> StorageResult<Vec<CredentialRecord>>;

    /// Retrieves a credential set by its URL prefix.
    async fn get_credentials(&self, url: &str) -> StorageResult<Option<CredentialRecord>>;

    /// Stores a new credential set.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`] if a set with the same URL
    /// prefix is already stored.
    async fn create_credentials(&self, record: &CredentialRecord) -> StorageResult<()>;

    /// Replaces an existing credential set.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if no set with this URL prefix exists.
    /// - [`StorageError::Conflict`] if the set changed between read and write.
    async fn update_credentials(&self, record: &CredentialRecord) -> StorageResult<()>;

    /// Removes a credential set.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no set with this URL prefix exists.
    async fn delete_credentials(&self, url: &str) -> StorageResult<()>;

    /// Finds the credential set that applies to `repo_url`.
    ///
    /// When several prefixes match, the longest one wins.
    async fn find_credentials_for(
        &self,
        repo_url: &str,
    ) -> StorageResult<Option<CredentialRecord>> {
        let all = self.list_credentials().await?;
        Ok(all.into_iter().filter(|c| c.matches(repo_url)).max_by_key(|c| c.url.len()))
    }
}

/// [`RepositoryStore`] backed by a [`StorageBackend`].
///
/// Cloning is as cheap as cloning the backend.
///
/// # Example
///
/// ```
/// use gitops_state_storage::{
///     MemoryBackend,
///     repository::{BackendRepositoryStore, RepositoryRecord, RepositoryStore},
/// };
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store = BackendRepositoryStore::new(MemoryBackend::new());
/// let repo = RepositoryRecord::builder().url("https://github.com/example/app.git").build();
///
/// store.create_repository(&repo).await.unwrap();
/// assert!(store.create_repository(&repo).await.unwrap_err().is_already_exists());
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct BackendRepositoryStore<B> {
    backend: B,
}

impl<B: StorageBackend> BackendRepositoryStore<B> {
    /// Wraps a storage backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn repository_key(url: &str) -> Vec<u8> {
        format!("{REPOSITORY_PREFIX}{url}").into_bytes()
    }

    fn credentials_key(url: &str) -> Vec<u8> {
        format!("{CREDENTIALS_PREFIX}{url}").into_bytes()
    }

    fn decode<T: DeserializeOwned>(bytes: &Bytes) -> StorageResult<T> {
        serde_json::from_slice(bytes)
            .map_err(|e| StorageError::serialization_with_source("decode record", e))
    }

    fn encode<T: Serialize>(record: &T) -> StorageResult<Vec<u8>> {
        serde_json::to_vec(record)
            .map_err(|e| StorageError::serialization_with_source("encode record", e))
    }

    async fn list<T: DeserializeOwned>(&self, prefix: &str) -> StorageResult<Vec<T>> {
        let entries = self.backend.get_prefix(prefix.as_bytes()).await?;
        entries.iter().map(|kv| Self::decode(&kv.value)).collect()
    }

    async fn get<T: DeserializeOwned>(&self, key: &[u8]) -> StorageResult<Option<T>> {
        self.backend.get(key).await?.as_ref().map(Self::decode).transpose()
    }

    async fn create<T: Serialize + Sync>(
        &self,
        key: &[u8],
        url: &str,
        record: &T,
    ) -> StorageResult<()> {
        let bytes = Self::encode(record)?;
        match self.backend.compare_and_set(key, None, bytes).await {
            Ok(()) => Ok(()),
            Err(StorageError::Conflict) => Err(StorageError::already_exists(url)),
            Err(e) => Err(e),
        }
    }

    async fn update<T: Serialize + Sync>(
        &self,
        key: &[u8],
        url: &str,
        record: &T,
    ) -> StorageResult<()> {
        let current = self.backend.get(key).await?.ok_or_else(|| StorageError::not_found(url))?;
        let bytes = Self::encode(record)?;
        self.backend.compare_and_set(key, Some(&current[..]), bytes).await
    }

    async fn remove(&self, key: &[u8], url: &str) -> StorageResult<()> {
        if self.backend.get(key).await?.is_none() {
            return Err(StorageError::not_found(url));
        }
        self.backend.delete(key).await
    }
}

#[async_trait]
impl<B: StorageBackend> RepositoryStore for BackendRepositoryStore<B> {
    #[tracing::instrument(skip(self))]
    async fn list_repositories(&self) -> StorageResult<Vec<RepositoryRecord>> {
        self.list(REPOSITORY_PREFIX).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_repository(&self, url: &str) -> StorageResult<Option<RepositoryRecord>> {
        self.get(&Self::repository_key(url)).await
    }

    #[tracing::instrument(skip(self, record), fields(url = %record.url))]
    async fn create_repository(&self, record: &RepositoryRecord) -> StorageResult<()> {
        self.create(&Self::repository_key(&record.url), &record.url, record).await
    }

    #[tracing::instrument(skip(self, record), fields(url = %record.url))]
    async fn update_repository(&self, record: &RepositoryRecord) -> StorageResult<()> {
        self.update(&Self::repository_key(&record.url), &record.url, record).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_repository(&self, url: &str) -> StorageResult<()> {
        self.remove(&Self::repository_key(url), url).await
    }

    #[tracing::instrument(skip(self))]
    async fn list_credentials(&self) -> StorageResult<Vec<CredentialRecord>> {
        self.list(CREDENTIALS_PREFIX).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_credentials(&self, url: &str) -> StorageResult<Option<CredentialRecord>> {
        self.get(&Self::credentials_key(url)).await
    }

    #[tracing::instrument(skip(self, record), fields(url = %record.url))]
    async fn create_credentials(&self, record: &CredentialRecord) -> StorageResult<()> {
        self.create(&Self::credentials_key(&record.url), &record.url, record).await
    }

    #[tracing::instrument(skip(self, record), fields(url = %record.url))]
    async fn update_credentials(&self, record: &CredentialRecord) -> StorageResult<()> {
        self.update(&Self::credentials_key(&record.url), &record.url, record).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_credentials(&self, url: &str) -> StorageResult<()> {
        self.remove(&Self::credentials_key(url), url).await
    }
}
