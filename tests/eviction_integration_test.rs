//! Integration tests for engine sharing between page hosts
//!
//! These tests drive the public page-host API the way a platform shell would:
//! - one page starts a fresh engine, a second page claims it by cache id
//! - the first page is evicted and keeps a placeholder on screen
//! - the first page reattaches once the second one is gone

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use shared_engine_host::engine::{
    AppLifecyclePhase, EngineCall, FrameSnapshot, HeadlessEngine, HeadlessEngineFactory,
};
use shared_engine_host::host::{HostActivity, HostContext, PageConfig, PageHost, PageKind};
use shared_engine_host::scheduler::{Looper, ManualTimeSource};
use shared_engine_host::telemetry::{LifecycleEvent, TelemetryCollector};
use shared_engine_host::{
    DelegateState, EmbeddingConfig, EmbeddingRuntime, EngineRef, Host, HostOptions,
};

const SHARED_ID: &str = "shared";

struct Harness {
    runtime: EmbeddingRuntime,
    looper: Rc<Looper<ManualTimeSource>>,
    factory: Rc<HeadlessEngineFactory>,
    telemetry: Arc<TelemetryCollector>,
}

impl Harness {
    fn new() -> Self {
        let looper = Rc::new(Looper::new(ManualTimeSource::new()));
        let factory = Rc::new(HeadlessEngineFactory::new());
        let telemetry = Arc::new(TelemetryCollector::new(64, 64));
        let runtime = EmbeddingRuntime::builder()
            .config(EmbeddingConfig::default())
            .engine_factory(factory.clone())
            .handler(looper.clone())
            .telemetry(Arc::clone(&telemetry))
            .build();
        Self {
            runtime,
            looper,
            factory,
            telemetry,
        }
    }

    fn page(&self, kind: PageKind, activity: &str, config: PageConfig) -> Rc<PageHost> {
        PageHost::new(
            kind,
            self.runtime.clone(),
            HostContext::new(format!("test:{activity}")),
            Some(Rc::new(HostActivity::new(activity))),
            config,
        )
    }

    fn events(&self) -> Vec<LifecycleEvent> {
        self.telemetry.snapshot().events()
    }
}

fn home_config() -> PageConfig {
    PageConfig {
        route: Some("/".to_string()),
        ..PageConfig::default()
    }
}

fn details_config() -> PageConfig {
    PageConfig {
        route: Some("/details".to_string()),
        options: HostOptions::cached(SHARED_ID),
        ..PageConfig::default()
    }
}

/// Start `home` on a fresh engine, publish that engine under the shared id
/// and let it paint its first frame.
fn start_home(harness: &Harness) -> (Rc<PageHost>, Rc<HeadlessEngine>) {
    let home = harness.page(PageKind::Activity, "HomeActivity", home_config());
    home.create(None).unwrap();
    home.start().unwrap();
    home.resume().unwrap();

    let engine = harness.factory.last_created().unwrap();
    let shared: EngineRef = engine.clone();
    harness.runtime.cache().put(SHARED_ID, shared);

    engine.render_frame(FrameSnapshot::new(1, 1, vec![0x10, 0x20, 0x30, 0xFF]));
    harness.looper.advance(Duration::from_millis(300));
    (home, engine)
}

#[test]
fn test_second_page_evicts_first() {
    let harness = Harness::new();
    let (home, engine) = start_home(&harness);

    assert_eq!(engine.initial_route().as_deref(), Some("/"));
    assert_eq!(
        engine.executed_entrypoint().map(|entry| entry.function_name),
        Some("main".to_string())
    );
    let home_container = home.container().unwrap();
    assert!(home_container.placeholders().is_empty());

    let details = harness.page(PageKind::Activity, "DetailsActivity", details_config());
    details.create(None).unwrap();
    details.start().unwrap();
    details.resume().unwrap();

    assert_eq!(home.delegate_state(), Some(DelegateState::Detached));
    assert!(!home_container.is_showing_engine_view());
    assert_eq!(home_container.placeholders().len(), 1);

    assert_eq!(details.delegate_state(), Some(DelegateState::Attached));
    assert!(details.container().unwrap().is_showing_engine_view());
    assert_eq!(engine.attached_activity().as_deref(), Some("DetailsActivity"));
    assert_eq!(engine.count_calls(|call| *call == EngineCall::DetachFromActivity), 0);

    // Cached engines are already running; the entrypoint runs once.
    assert_eq!(
        engine.count_calls(|call| matches!(call, EngineCall::ExecuteEntrypoint(_))),
        1
    );

    let holder_changes: Vec<_> = harness
        .events()
        .into_iter()
        .filter_map(|event| match event {
            LifecycleEvent::HolderChanged { previous, current, .. } => Some((previous, current)),
            _ => None,
        })
        .collect();
    assert_eq!(holder_changes.len(), 2);
    assert_eq!(holder_changes[1].0.as_deref(), Some(home.label().as_str()));
}

#[test]
fn test_evicted_page_drops_engine_bound_events() {
    let harness = Harness::new();
    let (home, engine) = start_home(&harness);

    let details = harness.page(PageKind::Activity, "DetailsActivity", details_config());
    details.create(None).unwrap();

    let pops_before = engine.count_calls(|call| *call == EngineCall::PopRoute);
    home.back_pressed().unwrap();
    home.stop().unwrap();
    home.trim_memory(10).unwrap();

    assert_eq!(engine.count_calls(|call| *call == EngineCall::PopRoute), pops_before);
    assert_ne!(engine.lifecycle_phase(), Some(AppLifecyclePhase::Paused));

    details.back_pressed().unwrap();
    assert_eq!(
        engine.count_calls(|call| *call == EngineCall::PopRoute),
        pops_before + 1
    );
}

#[test]
fn test_first_page_reattaches_after_second_is_destroyed() {
    let harness = Harness::new();
    let (home, engine) = start_home(&harness);

    let details = harness.page(PageKind::Activity, "DetailsActivity", details_config());
    details.create(None).unwrap();
    details.start().unwrap();
    details.resume().unwrap();
    details.pause().unwrap();
    details.stop().unwrap();
    details.destroy().unwrap();

    assert!(!engine.is_destroyed());
    assert_eq!(engine.attached_activity(), None);

    home.start().unwrap();
    home.resume().unwrap();

    assert_eq!(home.delegate_state(), Some(DelegateState::Attached));
    assert_eq!(engine.attached_activity().as_deref(), Some("HomeActivity"));
    assert_eq!(engine.lifecycle_phase(), Some(AppLifecyclePhase::Resumed));

    let container = home.container().unwrap();
    assert!(container.is_showing_engine_view());
    assert_eq!(container.placeholders().len(), 2);

    // Snapshot splash fades out after the first frame; the eviction
    // placeholder goes once the reattach delay has passed.
    engine.render_frame(FrameSnapshot::new(1, 1, vec![0; 4]));
    harness.looper.advance(Duration::from_millis(999));
    assert_eq!(container.placeholders().len(), 1);
    harness.looper.advance(Duration::from_millis(1));
    assert!(container.placeholders().is_empty());

    assert!(harness
        .events()
        .iter()
        .any(|event| matches!(event, LifecycleEvent::PlaceholderRemoved { .. })));
}

#[test]
fn test_destroying_last_owner_destroys_engine() {
    let harness = Harness::new();
    let (home, engine) = start_home(&harness);

    home.pause().unwrap();
    home.stop().unwrap();
    home.destroy().unwrap();

    assert!(engine.is_destroyed());
    assert_eq!(home.delegate_state(), None);
    assert!(harness
        .events()
        .iter()
        .any(|event| matches!(event, LifecycleEvent::EngineDestroyed { .. })));
    assert!(home.start().is_err());
}

#[test]
fn test_shared_engine_runs_before_cached_pages_attach() {
    let harness = Harness::new();
    let engine = harness
        .runtime
        .start_shared_engine(&HostContext::new("test:app"));
    let shared_id = harness.runtime.config().engine.shared_engine_id.clone();

    let page = harness.page(
        PageKind::Activity,
        "HomeActivity",
        PageConfig {
            options: HostOptions::cached(shared_id),
            ..PageConfig::default()
        },
    );
    page.create(None).unwrap();
    page.start().unwrap();

    let headless = harness.factory.last_created().unwrap();
    assert_eq!(page.engine().map(|bound| bound.id()), Some(engine.id()));
    assert_eq!(
        headless.executed_entrypoint().map(|entry| entry.function_name),
        Some("main".to_string())
    );
    assert_eq!(
        headless.count_calls(|call| matches!(call, EngineCall::ExecuteEntrypoint(_))),
        1
    );
}

#[test]
fn test_default_runtime_removes_placeholder_when_drained() {
    let factory = Rc::new(HeadlessEngineFactory::new());
    let mut config = EmbeddingConfig::default();
    config.reattach.placeholder_removal_delay_ms = 10;
    config.splash.snapshot_transition_ms = 1;
    let runtime = EmbeddingRuntime::builder()
        .config(config)
        .engine_factory(factory.clone())
        .telemetry(Arc::new(TelemetryCollector::new(32, 32)))
        .build();
    runtime.start_shared_engine(&HostContext::new("test:app"));
    let engine = factory.last_created().unwrap();
    let shared_id = runtime.config().engine.shared_engine_id.clone();

    let page = |activity: &str| {
        PageHost::new(
            PageKind::Activity,
            runtime.clone(),
            HostContext::new(format!("test:{activity}")),
            Some(Rc::new(HostActivity::new(activity))),
            PageConfig {
                options: HostOptions::cached(shared_id.clone()),
                ..PageConfig::default()
            },
        )
    };

    let first = page("FirstActivity");
    first.create(None).unwrap();
    let second = page("SecondActivity");
    second.create(None).unwrap();
    assert!(first.is_detached());

    first.start().unwrap();
    engine.render_frame(FrameSnapshot::new(1, 1, vec![0; 4]));
    let container = first.container().unwrap();
    assert_eq!(container.placeholders().len(), 2);

    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(container.placeholders().len(), 2);

    assert_eq!(runtime.run_due_tasks(), 2);
    assert!(container.placeholders().is_empty());
    assert_eq!(runtime.looper().map(|looper| looper.pending()), Some(0));
}
