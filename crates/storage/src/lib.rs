//! Configuration-store abstraction for the gitops-state reconciler.
//!
//! This crate provides the [`StorageBackend`] trait, an in-memory backend, and
//! the typed [`RepositoryStore`](repository::RepositoryStore) that the trust
//! reconciler and repository registry persist their declared state through.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        TrustReconciler          RepositoryRegistry          │
//! ├─────────────────────────────────────────────────────────────┤
//! │   BackendKeySource   RepositoryStore   ConnectionStateCache │
//! │         (typed records, JSON encoding, key layout)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    StorageBackend trait                     │
//! │   (get, set, compare_and_set, delete, get_range, prefix)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                       MemoryBackend                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use gitops_state_storage::{
//!     MemoryBackend,
//!     repository::{BackendRepositoryStore, RepositoryRecord, RepositoryStore},
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = BackendRepositoryStore::new(MemoryBackend::new());
//!
//!     let repo = RepositoryRecord::builder().url("git@github.com:example/app.git").build();
//!     store.create_repository(&repo).await?;
//!
//!     let listed = store.list_repositories().await?;
//!     assert_eq!(listed.len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with sample records, populated stores, and
//!   assertion macros. Enable this in `[dev-dependencies]` for integration tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod memory;
pub mod repository;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
pub mod types;

pub use backend::{StorageBackend, prefix_range};
pub use error::{BoxError, StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use types::KeyValue;
