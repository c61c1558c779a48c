//! # gitops-state registry
//!
//! Registered source repositories, their shared credential sets, and the
//! cached outcome of probing each one.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     RepositoryRegistry                       │
//! │   Enforcer ──► authorize (subject, repositories, action, url) │
//! └───────┬───────────────────┬──────────────────────┬───────────┘
//!         │                   │                      │
//!         ▼                   ▼                      ▼
//! ┌───────────────┐  ┌──────────────────┐  ┌──────────────────┐
//! │RepositoryStore│  │ ConnectionProber │  │ AppSourceClient  │
//! │ (storage)     │  │  probe/probe_all │  │  discover_apps   │
//! └───────────────┘  └───┬──────────┬───┘  └──────────────────┘
//!                        ▼          ▼
//!              ConnectionProbe   ConnectionStateCache
//! ```
//!
//! ## Guarantees
//!
//! - Authorization is checked before any storage access; listings filter instead of failing
//! - Creating an identical repository twice is a no-op that returns the stored record
//! - A repository that fails its connectivity test is never registered
//! - Deleting a repository clears its cached connection state
//! - Cache failures are logged and never fail the surrounding operation

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Application discovery.
pub mod apps;
/// Authorization oracle seam.
pub mod authz;
/// Connection-state cache.
pub mod cache;
/// Registry configuration.
pub mod config;
/// Registry error types.
pub mod error;
/// Connectivity probe seam.
pub mod probe;
/// Cached and fan-out probing.
pub mod prober;
/// Repository registry service.
pub mod registry;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use apps::{
    AppDetails, AppDetailsQuery, AppInfo, AppSourceClient, AppSourceError, AppSourceType,
    KUSTOMIZATION_NAMES, discover_apps,
};
pub use authz::{Action, AllowAll, Enforcer, ResourceKind, Subject};
pub use cache::{
    BackendConnectionStateCache, CONNECTION_STATE_PREFIX, ConnectionStateCache,
    DEFAULT_CACHE_CAPACITY, MemoryConnectionStateCache,
};
pub use config::{ConfigError, DEFAULT_PROBE_TIMEOUT, DEFAULT_REVISION, RegistryConfig};
pub use error::{RegistryError, Result};
pub use probe::{ConnectionProbe, ProbeError, ProbeTarget};
pub use prober::ConnectionProber;
pub use registry::{AccessCheck, RepositoryRegistry};
