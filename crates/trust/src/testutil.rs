//! Shared test utilities for trust reconciliation.
//!
//! Provides an in-memory [`FakeKeyring`] with failure injection and call
//! recording, and a [`FakeValidator`] that understands the material produced
//! by [`fake_key_material`]. Feature-gated behind `testutil`.
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use gitops_state_trust::testutil::{FakeKeyring, FakeValidator, fake_key_material};
//! ```

#![allow(clippy::expect_used, clippy::panic)]

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::{
    error::{Result, TrustError},
    key::{InstalledKey, KeyId},
    keyring::{KeyValidator, Keyring},
};

const HEADER: &str = "-----BEGIN FAKE PUBLIC KEY BLOCK-----";
const FOOTER: &str = "-----END FAKE PUBLIC KEY BLOCK-----";

/// Parses a key ID, panicking on invalid input.
#[must_use]
pub fn key_id(id: &str) -> KeyId {
    KeyId::parse(id).expect("invalid test key id")
}

/// Builds armored-looking material containing one entry per ID.
///
/// Pass several IDs to build ambiguous material, or none for material that
/// parses to zero keys.
#[must_use]
pub fn fake_key_material(ids: &[&str]) -> Bytes {
    let mut text = String::from(HEADER);
    for id in ids {
        text.push_str("\nkey:");
        text.push_str(id);
    }
    text.push('\n');
    text.push_str(FOOTER);
    Bytes::from(text)
}

fn parse_material(material: &[u8]) -> Result<Vec<KeyId>> {
    let text = std::str::from_utf8(material)
        .map_err(|e| TrustError::keyring_with_source("material is not UTF-8", e))?;
    if !text.starts_with(HEADER) {
        return Err(TrustError::keyring("no valid OpenPGP data found"));
    }
    text.lines().filter_map(|line| line.strip_prefix("key:")).map(KeyId::parse).collect()
}

/// Validator for [`fake_key_material`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeValidator;

#[async_trait]
impl KeyValidator for FakeValidator {
    async fn validate(&self, material: &[u8]) -> Result<Vec<KeyId>> {
        parse_material(material)
    }
}

#[derive(Debug, Default)]
struct State {
    keys: BTreeMap<KeyId, bool>,
    imports: Vec<KeyId>,
    deletes: Vec<KeyId>,
    fail_import: BTreeSet<KeyId>,
    fail_delete: BTreeSet<KeyId>,
    secret_on_recheck: BTreeSet<KeyId>,
    initialized: bool,
    import_delay: Option<Duration>,
    list_delay: Option<Duration>,
}

/// In-memory keyring.
///
/// Keys map to their secret flag. Every successful import and every delete
/// call is recorded, so tests can assert on what the reconciler attempted.
#[derive(Debug, Default)]
pub struct FakeKeyring {
    state: Mutex<State>,
}

impl FakeKeyring {
    /// Creates a keyring holding `public` and `secret` keys.
    #[must_use]
    pub fn with_keys(public: &[&str], secret: &[&str]) -> Self {
        let keyring = Self::default();
        {
            let mut state = keyring.state.lock();
            state.keys.extend(public.iter().map(|id| (key_id(id), false)));
            state.keys.extend(secret.iter().map(|id| (key_id(id), true)));
        }
        keyring
    }

    /// Makes every import of `id` fail.
    pub fn fail_import(&self, id: &str) {
        self.state.lock().fail_import.insert(key_id(id));
    }

    /// Makes every delete of `id` fail.
    pub fn fail_delete(&self, id: &str) {
        self.state.lock().fail_delete.insert(key_id(id));
    }

    /// Reports `id` as secret when the reconciler re-checks it before
    /// deletion, simulating a private key imported mid-pass.
    pub fn mark_secret_on_recheck(&self, id: &str) {
        self.state.lock().secret_on_recheck.insert(key_id(id));
    }

    /// Delays every import by `delay`.
    pub fn set_import_delay(&self, delay: Duration) {
        self.state.lock().import_delay = Some(delay);
    }

    /// Delays every listing by `delay`.
    pub fn set_list_delay(&self, delay: Duration) {
        self.state.lock().list_delay = Some(delay);
    }

    /// Installed public keys, ordered.
    #[must_use]
    pub fn public_keys(&self) -> Vec<KeyId> {
        let state = self.state.lock();
        state.keys.iter().filter(|(_, secret)| !**secret).map(|(id, _)| id.clone()).collect()
    }

    /// Installed secret keys, ordered.
    #[must_use]
    pub fn secret_keys(&self) -> Vec<KeyId> {
        let state = self.state.lock();
        state.keys.iter().filter(|(_, secret)| **secret).map(|(id, _)| id.clone()).collect()
    }

    /// Keys successfully imported, in call order.
    #[must_use]
    pub fn imported(&self) -> Vec<KeyId> {
        self.state.lock().imports.clone()
    }

    /// Every key passed to `delete`, in call order, whether or not it succeeded.
    #[must_use]
    pub fn deleted(&self) -> Vec<KeyId> {
        self.state.lock().deletes.clone()
    }

    /// Returns `true` once `initialize` has run.
    #[must_use]
    pub fn initialized(&self) -> bool {
        self.state.lock().initialized
    }
}

#[async_trait]
impl Keyring for FakeKeyring {
    async fn initialize(&self) -> Result<()> {
        self.state.lock().initialized = true;
        Ok(())
    }

    async fn list_installed(&self) -> Result<Vec<InstalledKey>> {
        let delay = self.state.lock().list_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock();
        Ok(state
            .keys
            .iter()
            .map(|(id, secret)| InstalledKey { key_id: id.clone(), is_secret: *secret })
            .collect())
    }

    async fn import(&self, material: &[u8]) -> Result<KeyId> {
        let delay = self.state.lock().import_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let ids = parse_material(material)?;
        let [id] = ids.as_slice() else {
            return Err(TrustError::keyring(format!("expected one key, found {}", ids.len())));
        };

        let mut state = self.state.lock();
        if state.fail_import.contains(id) {
            return Err(TrustError::keyring(format!("gpg: import of {id} failed")));
        }
        state.keys.entry(id.clone()).or_insert(false);
        state.imports.push(id.clone());
        Ok(id.clone())
    }

    async fn delete(&self, key_id: &KeyId) -> Result<()> {
        let mut state = self.state.lock();
        state.deletes.push(key_id.clone());
        if state.fail_delete.contains(key_id) {
            return Err(TrustError::keyring(format!("gpg: delete of {key_id} failed")));
        }
        if state.keys.get(key_id) == Some(&true) {
            return Err(TrustError::keyring(format!("gpg: {key_id} has a secret key")));
        }
        state.keys.remove(key_id);
        Ok(())
    }

    async fn is_secret(&self, key_id: &KeyId) -> Result<bool> {
        let state = self.state.lock();
        Ok(state.secret_on_recheck.contains(key_id) || state.keys.get(key_id) == Some(&true))
    }
}
