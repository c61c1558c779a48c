//! # gitops-state trust
//!
//! Keeps a signing-key keyring consistent with the operator-declared keys.
//!
//! This crate provides:
//! - **[`TrustReconciler`]**: validates declared keys, imports the missing ones, and deletes
//!   undeclared public keys
//! - **[`SyncLock`]**: the single-writer lock that keeps concurrent synchronizations from
//!   mutating the keyring together
//! - **Seams** for the external pieces: [`KeySource`], [`Keyring`], [`KeyValidator`]
//!
//! ## Guarantees
//!
//! - At most one synchronization mutates the keyring at a time; a second caller gets
//!   [`TrustError::Locked`] immediately
//! - Secret keys are never deleted
//! - Invalid declared keys abort the call before any mutation
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gitops_state_storage::MemoryBackend;
//! use gitops_state_trust::{BackendKeySource, KeyValidator, Keyring, TrustReconciler};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(
//! #     keyring: Arc<dyn Keyring>,
//! #     validator: Arc<dyn KeyValidator>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let reconciler = TrustReconciler::builder()
//!     .source(Arc::new(BackendKeySource::new(MemoryBackend::new())))
//!     .keyring(keyring)
//!     .validator(validator)
//!     .build();
//!
//! match reconciler.synchronize(&CancellationToken::new()).await {
//!     Ok(report) => println!("{} keys failed", report.failures().count()),
//!     Err(e) if e.is_contention() => println!("busy, try again"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Reconciler configuration.
pub mod config;
/// Trust error types.
pub mod error;
/// Key identifiers and records.
pub mod key;
/// Keyring and validator seams.
pub mod keyring;
/// Single-writer lock.
pub mod lock;
/// Keyring reconciliation.
pub mod reconciler;
/// Per-key synchronization results.
pub mod report;
/// Declared key sources.
pub mod source;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::{ConfigError, DEFAULT_COMMAND_TIMEOUT, TrustConfig};
pub use error::{Result, TrustError};
pub use key::{InstalledKey, KeyId, KeyRecord};
pub use keyring::{KeyValidator, Keyring};
pub use lock::{SyncGuard, SyncLock};
pub use reconciler::TrustReconciler;
pub use report::{KeyOutcome, Outcome, SyncAction, SyncReport};
pub use source::{BackendKeySource, DECLARED_KEY_PREFIX, KeySource, StaticKeySource};
