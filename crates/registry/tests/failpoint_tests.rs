#![cfg(feature = "failpoints")]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Integration tests for fail-point injection in the registry crate.
//!
//! These tests require both `failpoints` and `testutil` features:
//! ```bash
//! cargo test -p gitops-state-registry --features failpoints,testutil --test failpoint_tests
//! ```

use gitops_state_registry::{RegistryError, Subject, testutil::Harness};
use gitops_state_storage::repository::{ConnectionStatus, RepositoryRecord, RepositoryStore};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn probe_failpoint_aborts_create() {
    let scenario = fail::FailScenario::setup();
    let h = Harness::default();

    fail::cfg("registry-before-probe", "return").expect("failed to configure fail point");

    let err = h
        .registry
        .create_repository(
            &Subject::new("alice"),
            RepositoryRecord::builder().url("git@x/y").build(),
            false,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Connection { .. }));
    assert!(h.store.get_repository("git@x/y").await.unwrap().is_none());
    assert_eq!(h.probe.total_calls(), 0);

    scenario.teardown();
}

#[tokio::test]
async fn probe_failpoint_is_captured_as_failed_state() {
    let scenario = fail::FailScenario::setup();
    let h = Harness::default();
    h.store.create_repository(&RepositoryRecord::builder().url("git@x/y").build()).await.unwrap();

    fail::cfg("registry-before-probe", "return").expect("failed to configure fail point");

    let state =
        h.registry.prober().probe("git@x/y", true, &CancellationToken::new()).await.unwrap();
    assert_eq!(state.status, ConnectionStatus::Failed);
    assert!(state.message.contains("injected"));

    fail::remove("registry-before-probe");
    let state =
        h.registry.prober().probe("git@x/y", true, &CancellationToken::new()).await.unwrap();
    assert!(state.is_successful());

    scenario.teardown();
}
