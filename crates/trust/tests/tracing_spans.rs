//! Verifies that reconciler operations emit their `#[instrument]` spans and
//! that per-key failures are logged.

#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};

use gitops_state_trust::{
    Keyring, StaticKeySource, TrustReconciler,
    testutil::{FakeKeyring, FakeValidator, fake_key_material},
};
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

fn reconciler(declared: &[&str], keyring: &Arc<FakeKeyring>) -> TrustReconciler {
    let source = StaticKeySource::new(declared.iter().map(|id| (*id, fake_key_material(&[id]))));
    TrustReconciler::builder()
        .source(Arc::new(source))
        .keyring(Arc::clone(keyring) as Arc<dyn Keyring>)
        .validator(Arc::new(FakeValidator))
        .build()
}

#[tokio::test]
async fn reconciler_operations_produce_spans() {
    let (collector, _guard) = collect();
    let keyring = Arc::new(FakeKeyring::default());
    let reconciler = reconciler(&["AAAAAAAAAAAAAAAA"], &keyring);
    let cancel = CancellationToken::new();

    reconciler.initialize_keyring(&cancel).await.expect("initialize");
    reconciler.declared_keys(&cancel).await.expect("declared");
    reconciler.installed_keys(&cancel).await.expect("installed");
    reconciler.synchronize(&cancel).await.expect("synchronize");

    let recorded = collector.spans.lock().expect("lock poisoned");
    for name in ["initialize_keyring", "declared_keys", "installed_keys", "synchronize"] {
        assert!(
            recorded.iter().any(|s| s == name),
            "missing span '{name}', recorded: {recorded:?}"
        );
    }
}

#[tokio::test]
async fn failed_import_is_logged_as_warning() {
    let (collector, _guard) = collect();
    let keyring = Arc::new(FakeKeyring::default());
    keyring.fail_import("AAAAAAAAAAAAAAAA");
    let reconciler = reconciler(&["AAAAAAAAAAAAAAAA"], &keyring);

    let report = reconciler.synchronize(&CancellationToken::new()).await.expect("synchronize");
    assert_eq!(report.failures().count(), 1);

    let warnings = collector.warnings.lock().expect("lock poisoned");
    assert!(!warnings.is_empty());
}
