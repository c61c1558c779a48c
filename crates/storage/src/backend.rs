//! Storage backend trait definition.
//!
//! This module defines the [`StorageBackend`] trait, the key/value interface
//! to the persistent configuration store. Every typed store in the workspace
//! (repository records, credential sets, declared signing keys, cached
//! connection state) is layered on top of it.
//!
//! # Design Philosophy
//!
//! The trait provides a minimal, generic key-value interface:
//! - **Keys and values are bytes**: No assumptions about serialization format
//! - **Async by default**: All operations are async for non-blocking I/O
//! - **Prefix scans**: Ordered iteration over a key range
//! - **Conditional writes**: [`compare_and_set`](StorageBackend::compare_and_set) is the
//!   get-then-conditional-insert primitive record stores build "create or detect conflict" on
//!
//! Domain-specific logic lives in the record stores built on top of this trait,
//! not in the storage backends.

use std::ops::{Bound, RangeBounds};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{error::StorageResult, types::KeyValue};

/// Abstract storage backend for key-value operations.
///
/// Backends are expected to be thread-safe (`Send + Sync`) and support
/// concurrent operations.
///
/// # Key Operations
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get`](StorageBackend::get) | Retrieve a single value by key |
/// | [`set`](StorageBackend::set) | Store a key-value pair |
/// | [`compare_and_set`](StorageBackend::compare_and_set) | Atomic compare-and-swap |
/// | [`delete`](StorageBackend::delete) | Remove a key |
/// | [`get_range`](StorageBackend::get_range) | Retrieve multiple keys in a range |
/// | [`get_prefix`](StorageBackend::get_prefix) | Retrieve all keys sharing a prefix |
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use gitops_state_storage::{MemoryBackend, StorageBackend};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backend = MemoryBackend::new();
///
/// backend.set(b"key".to_vec(), b"value".to_vec()).await.unwrap();
/// let value = backend.get(b"key").await.unwrap();
/// assert_eq!(value, Some(Bytes::from("value")));
/// # });
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieves a value by key.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(bytes))` if the key exists
    /// - `Ok(None)` if the key doesn't exist
    /// - `Err(...)` on storage errors
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Stores a key-value pair, overwriting any existing value.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()>;

    /// Atomically sets a key's value if it matches the expected current value.
    ///
    /// # Semantics
    ///
    /// - **`expected: None`**: insert-if-absent. Succeeds only when the key does not exist. Fails
    ///   with [`Conflict`](crate::StorageError::Conflict) if any value is present.
    /// - **`expected: Some(value)`**: update-if-unchanged. Succeeds only when the current value is
    ///   a byte-for-byte match of `value`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Conflict`](crate::StorageError::Conflict): the current value does not match `expected`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use gitops_state_storage::{MemoryBackend, StorageBackend};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let backend = MemoryBackend::new();
    ///
    /// // Insert-if-absent: succeeds because key is new
    /// backend.compare_and_set(b"repositories/a", None, b"{}".to_vec()).await?;
    ///
    /// // Insert-if-absent again: fails with Conflict because key already exists
    /// let result = backend.compare_and_set(b"repositories/a", None, b"{}".to_vec()).await;
    /// assert!(result.is_err());
    /// # Ok(())
    /// # }
    /// ```
    #[must_use = "compare-and-set may fail with a conflict and errors must be handled"]
    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
    ) -> StorageResult<()>;

    /// Deletes a key.
    ///
    /// If the key doesn't exist, this is a no-op (returns `Ok(())`).
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Retrieves all key-value pairs within a range, in key order.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_range<R>(&self, range: R) -> StorageResult<Vec<KeyValue>>
    where
        R: RangeBounds<Vec<u8>> + Send;

    /// Retrieves all key-value pairs whose key starts with `prefix`, in key order.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<KeyValue>> {
        self.get_range(prefix_range(prefix)).await
    }

}

/// Computes the key range covering every key that starts with `prefix`.
///
/// The exclusive upper bound is the prefix with its last non-`0xFF` byte
/// incremented. A prefix made only of `0xFF` bytes (or an empty prefix) has no
/// upper bound.
#[must_use]
pub fn prefix_range(prefix: &[u8]) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let start = Bound::Included(prefix.to_vec());

    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return (start, Bound::Excluded(end));
        }
    }
    (start, Bound::Unbounded)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_range_increments_last_byte() {
        let (start, end) = prefix_range(b"repositories/");
        assert_eq!(start, Bound::Included(b"repositories/".to_vec()));
        assert_eq!(end, Bound::Excluded(b"repositories0".to_vec()));
    }

    #[test]
    fn test_prefix_range_carries_over_max_bytes() {
        let (_, end) = prefix_range(&[b'a', 0xFF, 0xFF]);
        assert_eq!(end, Bound::Excluded(vec![b'b']));
    }

    #[test]
    fn test_prefix_range_all_max_is_unbounded() {
        let (_, end) = prefix_range(&[0xFF, 0xFF]);
        assert_eq!(end, Bound::Unbounded);

        let (_, end) = prefix_range(b"");
        assert_eq!(end, Bound::Unbounded);
    }
}
