//! Repository records, credential sets, and their persistence.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`RepositoryRecord`] | A registered source repository, keyed by URL |
//! | [`CredentialRecord`] | Credentials shared by repositories under a URL prefix |
//! | [`RepoCredentials`] | Authentication material, zeroized on drop |
//! | [`ConnectionState`] | Outcome of the last connectivity probe |
//! | [`RepositoryStore`] | Typed persistence interface |
//! | [`BackendRepositoryStore`] | [`RepositoryStore`] over any [`StorageBackend`](crate::StorageBackend) |

mod record;
mod store;

pub use record::{
    ConnectionState, ConnectionStatus, CredentialRecord, RepoCredentials, RepositoryRecord,
};
pub use store::{BackendRepositoryStore, CREDENTIALS_PREFIX, REPOSITORY_PREFIX, RepositoryStore};
