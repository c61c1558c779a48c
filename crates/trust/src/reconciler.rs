//! Keyring reconciliation against declared signing keys.
//!
//! [`TrustReconciler`] converges the non-secret portion of a [`Keyring`] to the
//! set of keys declared by a [`KeySource`].
//!
//! # Synchronization
//!
//! ```text
//!  try_acquire(SyncLock) ──busy──► TrustError::Locked
//!         │
//!         ▼
//!  load declared keys ──invalid──► validation error (nothing mutated)
//!         │
//!         ▼
//!  list installed keys, drop secret keys
//!         │
//!         ├──► import  declared − installed   (per-key best effort)
//!         └──► delete  installed − declared   (re-check secret, best effort)
//!         │
//!         ▼
//!     SyncReport
//! ```
//!
//! Validation is all-or-nothing and happens before any mutation. Imports and
//! deletes are not: a failing key is recorded in the [`SyncReport`] and the
//! pass continues. Repeated calls converge.
//!
//! # Cancellation
//!
//! Every external call races the caller's [`CancellationToken`] and the
//! configured command timeout. Cancellation aborts the whole pass with
//! [`TrustError::Cancelled`]; a timeout on a single import or delete is
//! recorded as a per-key failure.

use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
    sync::Arc,
};

use fail::fail_point;
use tokio_util::sync::CancellationToken;

use crate::{
    config::TrustConfig,
    error::{Result, TrustError},
    key::{InstalledKey, KeyId, KeyRecord},
    keyring::{KeyValidator, Keyring},
    lock::SyncLock,
    report::{Outcome, SyncAction, SyncReport},
    source::KeySource,
};

/// Converges a keyring to the declared signing keys.
///
/// Cloning is cheap and clones share the same [`SyncLock`].
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use gitops_state_trust::{
///     KeyValidator, Keyring, StaticKeySource, TrustReconciler,
/// };
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(
/// #     keyring: Arc<dyn Keyring>,
/// #     validator: Arc<dyn KeyValidator>,
/// # ) -> Result<(), Box<dyn std::error::Error>> {
/// let reconciler = TrustReconciler::builder()
///     .source(Arc::new(StaticKeySource::default()))
///     .keyring(keyring)
///     .validator(validator)
///     .build();
///
/// let report = reconciler.synchronize(&CancellationToken::new()).await?;
/// println!("imported {} keys", report.imported().count());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TrustReconciler {
    source: Arc<dyn KeySource>,
    keyring: Arc<dyn Keyring>,
    validator: Arc<dyn KeyValidator>,
    config: TrustConfig,
    lock: SyncLock,
}

#[bon::bon]
impl TrustReconciler {
    /// Creates a reconciler.
    ///
    /// Pass a shared `lock` when several reconcilers front the same keyring.
    #[builder]
    pub fn new(
        source: Arc<dyn KeySource>,
        keyring: Arc<dyn Keyring>,
        validator: Arc<dyn KeyValidator>,
        #[builder(default)] config: TrustConfig,
        #[builder(default)] lock: SyncLock,
    ) -> Self {
        Self { source, keyring, validator, config, lock }
    }

    /// Returns the reconciliation lock.
    #[must_use]
    pub fn lock(&self) -> &SyncLock {
        &self.lock
    }

    /// Loads and validates the declared keys, ordered by key ID.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid entry: an unparsable identifier, material
    /// the validator rejects, material holding other than one key, or a key
    /// whose ID differs from the declared one.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn declared_keys(&self, cancel: &CancellationToken) -> Result<Vec<KeyRecord>> {
        Ok(self.load_declared(cancel).await?.into_values().collect())
    }

    /// Lists installed public keys. Secret keys are omitted.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn installed_keys(&self, cancel: &CancellationToken) -> Result<Vec<InstalledKey>> {
        let installed = self.bounded("list", cancel, self.keyring.list_installed()).await?;
        Ok(installed.into_iter().filter(|k| !k.is_secret).collect())
    }

    /// Imports missing declared keys and deletes undeclared public keys.
    ///
    /// # Errors
    ///
    /// - [`TrustError::Locked`] if another synchronization is running. The call
    ///   never waits.
    /// - A validation error if any declared key is invalid. Nothing is mutated.
    /// - [`TrustError::Keyring`] if installed keys cannot be listed.
    /// - [`TrustError::Cancelled`] if `cancel` fires.
    ///
    /// Individual import and delete failures are reported in the returned
    /// [`SyncReport`], not as errors.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn synchronize(&self, cancel: &CancellationToken) -> Result<SyncReport> {
        let _guard = self.lock.try_acquire().ok_or(TrustError::Locked)?;

        let declared = self.load_declared(cancel).await?;
        let installed: BTreeSet<KeyId> =
            self.installed_keys(cancel).await?.into_iter().map(|k| k.key_id).collect();

        let mut report = SyncReport::default();

        for (key_id, record) in declared.iter().filter(|(id, _)| !installed.contains(*id)) {
            let outcome = match self.import_key(record, cancel).await {
                Ok(imported) => {
                    if imported != *key_id {
                        tracing::warn!(
                            expected = %key_id,
                            actual = %imported,
                            "Imported key ID differs from declared key ID"
                        );
                    }
                    tracing::info!(key_id = %key_id, "Imported key");
                    Outcome::Applied
                },
                Err(TrustError::Cancelled) => return Err(TrustError::Cancelled),
                Err(e) => {
                    tracing::warn!(key_id = %key_id, error = %e, "Could not import key");
                    Outcome::Failed(e.to_string())
                },
            };
            report.record(key_id.clone(), SyncAction::Import, outcome);
        }

        for key_id in installed.iter().filter(|id| !declared.contains_key(*id)) {
            let outcome = match self.delete_key(key_id, cancel).await {
                Ok(true) => {
                    tracing::info!(key_id = %key_id, "Deleted key");
                    Outcome::Applied
                },
                Ok(false) => {
                    tracing::warn!(key_id = %key_id, "Key became secret, not deleting");
                    Outcome::Skipped("key has a private half".into())
                },
                Err(TrustError::Cancelled) => return Err(TrustError::Cancelled),
                Err(e) => {
                    tracing::warn!(key_id = %key_id, error = %e, "Could not delete key");
                    Outcome::Failed(e.to_string())
                },
            };
            report.record(key_id.clone(), SyncAction::Delete, outcome);
        }

        tracing::info!(
            imported = report.imported().count(),
            deleted = report.deleted().count(),
            failed = report.failures().count(),
            "Keyring synchronized"
        );
        Ok(report)
    }

    /// Sets up an empty keyring and imports every declared key.
    ///
    /// Unlike [`synchronize`](Self::synchronize), any import failure is fatal.
    ///
    /// # Errors
    ///
    /// - [`TrustError::Locked`] if a synchronization is running.
    /// - A validation error if any declared key is invalid.
    /// - [`TrustError::ImportFailed`] for the first key that cannot be imported.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn initialize_keyring(&self, cancel: &CancellationToken) -> Result<Vec<KeyId>> {
        let _guard = self.lock.try_acquire().ok_or(TrustError::Locked)?;

        self.bounded("initialize", cancel, self.keyring.initialize()).await?;
        let declared = self.load_declared(cancel).await?;

        let mut imported = Vec::with_capacity(declared.len());
        for (key_id, record) in &declared {
            let id = self.import_key(record, cancel).await.map_err(|e| match e {
                TrustError::Cancelled => e,
                other => TrustError::ImportFailed {
                    key_id: key_id.to_string(),
                    source: Box::new(other),
                },
            })?;
            if id != *key_id {
                tracing::warn!(
                    expected = %key_id,
                    actual = %id,
                    "Imported key ID differs from declared key ID"
                );
            }
            imported.push(id);
        }

        tracing::info!(keys = imported.len(), "Keyring initialized");
        Ok(imported)
    }

    async fn load_declared(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<KeyId, KeyRecord>> {
        let entries = self.bounded("declared_keys", cancel, self.source.declared_keys()).await?;

        let mut declared = BTreeMap::new();
        for (declared_id, material) in entries {
            let key_id = KeyId::parse(&declared_id)?;

            let parsed = self
                .bounded("validate", cancel, self.validator.validate(&material))
                .await
                .map_err(|e| match e {
                    TrustError::Cancelled | TrustError::Timeout { .. } => e,
                    other => TrustError::KeyValidation {
                        key_id: key_id.to_string(),
                        message: other.to_string(),
                    },
                })?;

            match parsed.as_slice() {
                [only] if *only == key_id => {},
                [only] => {
                    return Err(TrustError::KeyIdMismatch {
                        declared: key_id.to_string(),
                        parsed: only.to_string(),
                    });
                },
                _ => {
                    return Err(TrustError::AmbiguousKey {
                        key_id: key_id.to_string(),
                        count: parsed.len(),
                    });
                },
            }

            declared.insert(key_id.clone(), KeyRecord { key_id, material });
        }
        Ok(declared)
    }

    async fn import_key(&self, record: &KeyRecord, cancel: &CancellationToken) -> Result<KeyId> {
        fail_point!("trust-before-import", |_| {
            Err(TrustError::keyring("injected failure before import"))
        });
        self.bounded("import", cancel, self.keyring.import(&record.material)).await
    }

    /// Returns `Ok(false)` when the key turned out to be secret.
    async fn delete_key(&self, key_id: &KeyId, cancel: &CancellationToken) -> Result<bool> {
        fail_point!("trust-before-delete", |_| {
            Err(TrustError::keyring("injected failure before delete"))
        });
        if self.bounded("is_secret", cancel, self.keyring.is_secret(key_id)).await? {
            return Ok(false);
        }
        self.bounded("delete", cancel, self.keyring.delete(key_id)).await?;
        Ok(true)
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TrustError::Cancelled),
            result = tokio::time::timeout(self.config.command_timeout(), call) => {
                result.unwrap_or_else(|_| Err(TrustError::Timeout { operation }))
            },
        }
    }
}

impl std::fmt::Debug for TrustReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustReconciler")
            .field("config", &self.config)
            .field("locked", &self.lock.is_locked())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::{
        StaticKeySource,
        testutil::{FakeKeyring, FakeValidator, fake_key_material, key_id},
    };

    const A: &str = "AAAAAAAAAAAAAAAA";
    const B: &str = "BBBBBBBBBBBBBBBB";
    const C: &str = "CCCCCCCCCCCCCCCC";
    const S: &str = "5555555555555555";

    fn reconciler(declared: &[&str], keyring: &Arc<FakeKeyring>) -> TrustReconciler {
        let source =
            StaticKeySource::new(declared.iter().map(|id| (*id, fake_key_material(&[id]))));
        TrustReconciler::builder()
            .source(Arc::new(source))
            .keyring(Arc::clone(keyring) as Arc<dyn Keyring>)
            .validator(Arc::new(FakeValidator))
            .build()
    }

    #[tokio::test]
    async fn test_converges_and_protects_secret_keys() {
        let keyring = Arc::new(FakeKeyring::with_keys(&[B, C], &[S]));
        let reconciler = reconciler(&[A, B], &keyring);

        let report = reconciler.synchronize(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.imported().collect::<Vec<_>>(), vec![&key_id(A)]);
        assert_eq!(report.deleted().collect::<Vec<_>>(), vec![&key_id(C)]);
        assert_eq!(keyring.public_keys(), vec![key_id(A), key_id(B)]);
        assert!(keyring.secret_keys().contains(&key_id(S)));
        assert!(!keyring.deleted().contains(&key_id(S)));
    }

    #[tokio::test]
    async fn test_second_pass_is_noop() {
        let keyring = Arc::new(FakeKeyring::with_keys(&[C], &[]));
        let reconciler = reconciler(&[A], &keyring);
        let cancel = CancellationToken::new();

        reconciler.synchronize(&cancel).await.unwrap();
        let report = reconciler.synchronize(&cancel).await.unwrap();
        assert!(report.is_noop());
    }

    #[tokio::test]
    async fn test_invalid_declared_key_aborts_before_mutation() {
        let keyring = Arc::new(FakeKeyring::with_keys(&[C], &[]));
        let source = StaticKeySource::new([
            (A, fake_key_material(&[A])),
            (B, Bytes::from_static(b"garbage")),
        ]);
        let reconciler = TrustReconciler::builder()
            .source(Arc::new(source))
            .keyring(Arc::clone(&keyring) as Arc<dyn Keyring>)
            .validator(Arc::new(FakeValidator))
            .build();

        let err = reconciler.synchronize(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, TrustError::KeyValidation { ref key_id, .. } if key_id == B));
        assert!(keyring.imported().is_empty());
        assert!(keyring.deleted().is_empty());
        assert!(!reconciler.lock().is_locked());
    }

    async fn declared_error(source: StaticKeySource) -> TrustError {
        let reconciler = TrustReconciler::builder()
            .source(Arc::new(source))
            .keyring(Arc::new(FakeKeyring::default()))
            .validator(Arc::new(FakeValidator))
            .build();
        reconciler.declared_keys(&CancellationToken::new()).await.unwrap_err()
    }

    #[tokio::test]
    async fn test_declared_key_rules() {
        let err = declared_error(StaticKeySource::new([(A, fake_key_material(&[B]))])).await;
        assert!(matches!(err, TrustError::KeyIdMismatch { .. }), "got {err:?}");

        let err = declared_error(StaticKeySource::new([(A, fake_key_material(&[A, B]))])).await;
        assert!(matches!(err, TrustError::AmbiguousKey { count: 2, .. }), "got {err:?}");

        let err = declared_error(StaticKeySource::new([(A, fake_key_material(&[]))])).await;
        assert!(matches!(err, TrustError::AmbiguousKey { count: 0, .. }), "got {err:?}");

        let err = declared_error(StaticKeySource::new([(
            "alice@example.com",
            fake_key_material(&[A]),
        )]))
        .await;
        assert!(matches!(err, TrustError::InvalidKeyId { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_fingerprint_declaration_matches_key_id() {
        let fingerprint = format!("{}{}", "0".repeat(24), A);
        let keyring = Arc::new(FakeKeyring::default());
        let source = StaticKeySource::new([(fingerprint.as_str(), fake_key_material(&[A]))]);
        let reconciler = TrustReconciler::builder()
            .source(Arc::new(source))
            .keyring(Arc::clone(&keyring) as Arc<dyn Keyring>)
            .validator(Arc::new(FakeValidator))
            .build();

        let declared = reconciler.declared_keys(&CancellationToken::new()).await.unwrap();
        assert_eq!(declared[0].key_id, key_id(A));
    }

    #[tokio::test]
    async fn test_import_failure_is_best_effort() {
        let keyring = Arc::new(FakeKeyring::with_keys(&[C], &[]));
        keyring.fail_import(A);
        let reconciler = reconciler(&[A, B], &keyring);

        let report = reconciler.synchronize(&CancellationToken::new()).await.unwrap();

        let failures: Vec<_> = report.failures().map(|o| o.key_id.clone()).collect();
        assert_eq!(failures, vec![key_id(A)]);
        assert_eq!(keyring.public_keys(), vec![key_id(B)]);
    }

    #[tokio::test]
    async fn test_delete_failure_is_best_effort() {
        let keyring = Arc::new(FakeKeyring::with_keys(&[B, C], &[]));
        keyring.fail_delete(B);
        let reconciler = reconciler(&[], &keyring);

        let report = reconciler.synchronize(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.deleted().collect::<Vec<_>>(), vec![&key_id(C)]);
        assert_eq!(report.failures().count(), 1);
    }

    #[tokio::test]
    async fn test_key_turning_secret_is_skipped() {
        let keyring = Arc::new(FakeKeyring::with_keys(&[C], &[]));
        keyring.mark_secret_on_recheck(C);
        let reconciler = reconciler(&[], &keyring);

        let report = reconciler.synchronize(&CancellationToken::new()).await.unwrap();
        assert!(matches!(report.outcomes[0].outcome, Outcome::Skipped(_)));
        assert!(keyring.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_held_lock_rejects_immediately() {
        let keyring = Arc::new(FakeKeyring::default());
        let reconciler = reconciler(&[A], &keyring);

        let _guard = reconciler.lock().try_acquire().unwrap();
        let err = reconciler.synchronize(&CancellationToken::new()).await.unwrap_err();
        assert!(err.is_contention());
        assert!(keyring.imported().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts() {
        let keyring = Arc::new(FakeKeyring::default());
        let reconciler = reconciler(&[A], &keyring);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = reconciler.synchronize(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!reconciler.lock().is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_import_times_out_per_key() {
        let keyring = Arc::new(FakeKeyring::default());
        keyring.set_import_delay(Duration::from_secs(120));
        let reconciler = TrustReconciler::builder()
            .source(Arc::new(StaticKeySource::new([(A, fake_key_material(&[A]))])))
            .keyring(Arc::clone(&keyring) as Arc<dyn Keyring>)
            .validator(Arc::new(FakeValidator))
            .config(TrustConfig::builder().command_timeout(Duration::from_secs(5)).build().unwrap())
            .build();

        let report = reconciler.synchronize(&CancellationToken::new()).await.unwrap();
        let failure = report.failures().next().unwrap();
        assert!(matches!(&failure.outcome, Outcome::Failed(msg) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn test_initialize_imports_everything() {
        let keyring = Arc::new(FakeKeyring::default());
        let reconciler = reconciler(&[A, B], &keyring);

        let imported = reconciler.initialize_keyring(&CancellationToken::new()).await.unwrap();
        assert_eq!(imported, vec![key_id(A), key_id(B)]);
        assert!(keyring.initialized());
    }

    #[tokio::test]
    async fn test_initialize_import_failure_is_fatal() {
        let keyring = Arc::new(FakeKeyring::default());
        keyring.fail_import(B);
        let reconciler = reconciler(&[A, B], &keyring);

        let err = reconciler.initialize_keyring(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, TrustError::ImportFailed { ref key_id, .. } if key_id == B));
    }

    #[tokio::test]
    async fn test_installed_keys_hides_secret_keys() {
        let keyring = Arc::new(FakeKeyring::with_keys(&[B], &[S]));
        let reconciler = reconciler(&[], &keyring);

        let installed = reconciler.installed_keys(&CancellationToken::new()).await.unwrap();
        assert_eq!(installed, vec![InstalledKey::public(key_id(B))]);
    }
}
