//! Per-key results of a synchronization pass.

use crate::key::KeyId;

/// The mutation attempted for one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncAction {
    /// Declared but not installed.
    Import,
    /// Installed but no longer declared.
    Delete,
}

/// What happened to one attempted mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The keyring command succeeded.
    Applied,
    /// The keyring command failed; the pass continued.
    Failed(String),
    /// The mutation was not attempted.
    Skipped(String),
}

/// Result for a single key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyOutcome {
    /// Key the action targeted.
    pub key_id: KeyId,
    /// Attempted action.
    pub action: SyncAction,
    /// Result of the attempt.
    pub outcome: Outcome,
}

/// Summary of one [`synchronize`](crate::TrustReconciler::synchronize) call.
///
/// Synchronization is best-effort per key, so a successful call may still
/// carry [`Outcome::Failed`] entries. Repeating the call retries them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// One entry per attempted import or delete, imports first.
    pub outcomes: Vec<KeyOutcome>,
}

impl SyncReport {
    pub(crate) fn record(&mut self, key_id: KeyId, action: SyncAction, outcome: Outcome) {
        self.outcomes.push(KeyOutcome { key_id, action, outcome });
    }

    fn applied(&self, action: SyncAction) -> impl Iterator<Item = &KeyId> {
        self.outcomes
            .iter()
            .filter(move |o| o.action == action && o.outcome == Outcome::Applied)
            .map(|o| &o.key_id)
    }

    /// Keys imported by this pass.
    pub fn imported(&self) -> impl Iterator<Item = &KeyId> {
        self.applied(SyncAction::Import)
    }

    /// Keys deleted by this pass.
    pub fn deleted(&self) -> impl Iterator<Item = &KeyId> {
        self.applied(SyncAction::Delete)
    }

    /// Entries whose keyring command failed.
    pub fn failures(&self) -> impl Iterator<Item = &KeyOutcome> {
        self.outcomes.iter().filter(|o| matches!(o.outcome, Outcome::Failed(_)))
    }

    /// Returns `true` if the keyring already matched the declared keys.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.outcomes.is_empty()
    }
}
