//! Property tests for repeated repository creation.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use gitops_state_registry::{Subject, testutil::Harness};
use gitops_state_storage::repository::{RepoCredentials, RepositoryRecord, RepositoryStore};
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

fn repo(username: &str) -> RepositoryRecord {
    RepositoryRecord::builder()
        .url("git@x/y")
        .credentials(
            RepoCredentials::builder()
                .username(username)
                .password(format!("{username}-pw"))
                .build(),
        )
        .build()
}

proptest! {
    #[test]
    fn second_create_is_noop_update_or_conflict(
        first in "[a-z]{1,8}",
        second in "[a-z]{1,8}",
        upsert in any::<bool>(),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let h = Harness::default();
            let alice = Subject::new("alice");
            let cancel = CancellationToken::new();

            let created =
                h.registry.create_repository(&alice, repo(&first), false, &cancel).await.unwrap();
            let before = h.store.get_repository("git@x/y").await.unwrap().unwrap();

            let result = h.registry.create_repository(&alice, repo(&second), upsert, &cancel).await;
            let stored = h.store.get_repository("git@x/y").await.unwrap().unwrap();

            if first == second {
                prop_assert_eq!(result.unwrap(), created);
                prop_assert_eq!(stored, before);
            } else if upsert {
                let upserted = result.unwrap();
                prop_assert_eq!(upserted.username(), second.as_str());
                prop_assert_eq!(stored.username(), second.as_str());
            } else {
                prop_assert!(result.unwrap_err().is_conflict());
                prop_assert_eq!(stored, before);
            }
            prop_assert_eq!(h.store.list_repositories().await.unwrap().len(), 1);
            Ok(())
        })?;
    }
}
