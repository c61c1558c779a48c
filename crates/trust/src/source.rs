//! Declared key sources.
//!
//! A [`KeySource`] yields the raw declared entries: an identifier string as
//! written by the operator and the key material. Validation happens in the
//! reconciler, so a source never needs to understand key formats.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use gitops_state_storage::StorageBackend;

use crate::error::Result;

/// Storage key prefix for declared signing keys.
pub const DECLARED_KEY_PREFIX: &str = "gpg-keys/";

/// Supplies the operator-declared signing keys.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Returns every declared entry, keyed by the declared identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::KeySource`](crate::TrustError::KeySource) if the
    /// configuration cannot be read.
    async fn declared_keys(&self) -> Result<BTreeMap<String, Bytes>>;
}

/// A fixed, in-memory set of declared keys.
#[derive(Debug, Clone, Default)]
pub struct StaticKeySource {
    entries: BTreeMap<String, Bytes>,
}

impl StaticKeySource {
    /// Creates a source serving exactly `entries`.
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bytes>,
    {
        Self { entries: entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    async fn declared_keys(&self) -> Result<BTreeMap<String, Bytes>> {
        Ok(self.entries.clone())
    }
}

/// Reads declared keys from a storage backend.
///
/// Every entry under [`DECLARED_KEY_PREFIX`] is a declared key: the remainder
/// of the storage key is the declared identifier and the value is the
/// ASCII-armored material.
///
/// ```text
/// gpg-keys/4AEE18F83AFDEB23 -> "-----BEGIN PGP PUBLIC KEY BLOCK-----..."
/// ```
#[derive(Debug, Clone)]
pub struct BackendKeySource<B> {
    backend: B,
}

impl<B: StorageBackend> BackendKeySource<B> {
    /// Wraps a storage backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: StorageBackend> KeySource for BackendKeySource<B> {
    #[tracing::instrument(skip(self))]
    async fn declared_keys(&self) -> Result<BTreeMap<String, Bytes>> {
        let entries = self.backend.get_prefix(DECLARED_KEY_PREFIX.as_bytes()).await?;

        let mut declared = BTreeMap::new();
        for kv in entries {
            let Some(id) = kv.key_str().and_then(|k| k.strip_prefix(DECLARED_KEY_PREFIX)) else {
                tracing::warn!(key = ?kv.key, "Skipping declared key with non-UTF-8 identifier");
                continue;
            };
            declared.insert(id.to_owned(), kv.value.clone());
        }
        Ok(declared)
    }
}
