//! Single-writer lock for keyring mutation.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A non-blocking, single-slot lock.
///
/// [`try_acquire`](SyncLock::try_acquire) never waits: it returns a guard when
/// the slot is free and `None` otherwise. Clones share the slot, so one
/// `SyncLock` can be handed to several reconcilers that must not mutate the
/// same keyring concurrently.
///
/// # Example
///
/// ```
/// use gitops_state_trust::SyncLock;
///
/// let lock = SyncLock::new();
/// let guard = lock.try_acquire().unwrap();
/// assert!(lock.try_acquire().is_none());
///
/// drop(guard);
/// assert!(lock.try_acquire().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct SyncLock {
    slot: Arc<Semaphore>,
}

impl SyncLock {
    /// Creates an unheld lock.
    #[must_use]
    pub fn new() -> Self {
        Self { slot: Arc::new(Semaphore::new(1)) }
    }

    /// Takes the slot if it is free.
    #[must_use = "the lock is released as soon as the guard is dropped"]
    pub fn try_acquire(&self) -> Option<SyncGuard> {
        Arc::clone(&self.slot).try_acquire_owned().ok().map(|permit| SyncGuard { _permit: permit })
    }

    /// Returns `true` if the slot is currently held.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.slot.available_permits() == 0
    }
}

impl Default for SyncLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of holding a [`SyncLock`]. Releases the slot on drop.
#[derive(Debug)]
pub struct SyncGuard {
    _permit: OwnedSemaphorePermit,
}
