//! Verifies that registry operations emit their `#[instrument]` spans and
//! that denials are logged.

#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};

use gitops_state_registry::{
    Action, Subject,
    testutil::{FakeAppSource, Harness, deny},
};
use gitops_state_storage::repository::RepositoryRecord;
use tokio_util::sync::CancellationToken;
use tracing::{Level, Subscriber};
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

#[derive(Clone, Default)]
struct Collector {
    spans: Arc<Mutex<Vec<String>>>,
    warnings: Arc<Mutex<Vec<String>>>,
}

impl<S> tracing_subscriber::Layer<S> for Collector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        _attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            self.spans.lock().expect("lock poisoned").push(span.name().to_owned());
        }
    }

    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if *event.metadata().level() == Level::WARN {
            self.warnings.lock().expect("lock poisoned").push(event.metadata().target().to_owned());
        }
    }
}

fn collect() -> (Collector, tracing::subscriber::DefaultGuard) {
    let collector = Collector::default();
    let subscriber = tracing_subscriber::registry().with(collector.clone());
    (collector, tracing::subscriber::set_default(subscriber))
}

#[tokio::test]
async fn registry_operations_produce_spans() {
    let (collector, _guard) = collect();
    let h = Harness::default();
    let alice = Subject::new("alice");
    let cancel = CancellationToken::new();

    let record = RepositoryRecord::builder().url("git@x/y").build();
    h.registry.create_repository(&alice, record, false, &cancel).await.expect("create");
    h.registry.list_repositories(&alice, true, &cancel).await.expect("list");
    h.registry.delete_repository(&alice, "git@x/y").await.expect("delete");

    let recorded = collector.spans.lock().expect("lock poisoned");
    let expected =
        ["create_repository", "list_repositories", "probe_all", "probe", "delete_repository"];
    for name in expected {
        assert!(
            recorded.iter().any(|s| s == name),
            "missing span '{name}', recorded: {recorded:?}"
        );
    }
}

#[tokio::test]
async fn denial_is_logged_as_warning() {
    let (collector, _guard) = collect();
    let h = Harness::with(deny(Action::Delete), FakeAppSource::default());

    let _ = h.registry.delete_repository(&Subject::new("bob"), "git@x/y").await;

    let warnings = collector.warnings.lock().expect("lock poisoned");
    assert!(!warnings.is_empty());
}
