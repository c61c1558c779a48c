//! Keyring and key-validator seams.
//!
//! Both traits wrap external commands (for example `gpg --import`). The
//! reconciler bounds every call with the configured timeout and the caller's
//! cancellation token, so implementations may block on process I/O freely.

use async_trait::async_trait;

use crate::{
    error::Result,
    key::{InstalledKey, KeyId},
};

/// The live store of installed signing keys.
#[async_trait]
pub trait Keyring: Send + Sync {
    /// Prepares an empty keyring for first use.
    async fn initialize(&self) -> Result<()>;

    /// Lists every installed key, secret and public.
    async fn list_installed(&self) -> Result<Vec<InstalledKey>>;

    /// Imports key material, returning the ID of the imported key.
    async fn import(&self, material: &[u8]) -> Result<KeyId>;

    /// Removes a key.
    async fn delete(&self, key_id: &KeyId) -> Result<()>;

    /// Reports whether the keyring holds the private half of `key_id`.
    async fn is_secret(&self, key_id: &KeyId) -> Result<bool>;
}

/// Parses key material without installing it.
#[async_trait]
pub trait KeyValidator: Send + Sync {
    /// Returns the IDs of every key found in `material`.
    ///
    /// # Errors
    ///
    /// Returns an error if the material cannot be parsed at all. Finding zero
    /// or several keys is not an error here; the reconciler rejects those.
    async fn validate(&self, material: &[u8]) -> Result<Vec<KeyId>>;
}
