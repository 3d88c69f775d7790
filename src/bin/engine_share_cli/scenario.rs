use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use shared_engine_host::engine::{FrameSnapshot, HeadlessEngine, HeadlessEngineFactory};
use shared_engine_host::host::{HostActivity, HostContext, PageConfig, PageHost, PageKind};
use shared_engine_host::scheduler::{Looper, ManualTimeSource};
use shared_engine_host::telemetry::{TelemetryCollector, TelemetrySnapshot};
use shared_engine_host::{EmbeddingConfig, EmbeddingRuntime, Engine, SavedState};

/// Two pages sharing one pre-warmed engine: `home` is evicted by `details`
/// and takes the engine back once `details` is gone.
pub const BUILTIN_EVICTION: &str = r#"{
  "shared_engine": true,
  "pages": [
    { "name": "home", "kind": "activity", "route": "/", "use_shared_engine": true },
    { "name": "details", "kind": "activity", "route": "/details", "use_shared_engine": true }
  ],
  "steps": [
    { "op": "create", "page": "home" },
    { "op": "start", "page": "home" },
    { "op": "resume", "page": "home" },
    { "op": "frame", "page": "home" },
    { "op": "pause", "page": "home" },
    { "op": "create", "page": "details" },
    { "op": "start", "page": "details" },
    { "op": "resume", "page": "details" },
    { "op": "stop", "page": "home" },
    { "op": "back_pressed", "page": "home" },
    { "op": "pause", "page": "details" },
    { "op": "stop", "page": "details" },
    { "op": "destroy", "page": "details" },
    { "op": "start", "page": "home" },
    { "op": "resume", "page": "home" },
    { "op": "frame", "page": "home" },
    { "op": "advance", "ms": 1000 },
    { "op": "pause", "page": "home" },
    { "op": "stop", "page": "home" },
    { "op": "destroy", "page": "home" }
  ]
}"#;

/// Scripted page lifecycle replayed against a headless runtime.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Start the shared engine and run its entrypoint before any page exists.
    pub shared_engine: bool,
    pub pages: Vec<PageSpec>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageSpec {
    pub name: String,
    pub kind: PageKind,
    /// Activity the page lives in; one per page when absent.
    #[serde(default)]
    pub activity: Option<String>,
    /// Point the page at the shared engine instead of building its own.
    #[serde(default)]
    pub use_shared_engine: bool,
    #[serde(flatten)]
    pub config: PageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Create {
        page: String,
        /// Restore from the last `save` of this page.
        #[serde(default)]
        restore: bool,
    },
    Start { page: String },
    Resume { page: String },
    PostResume { page: String },
    Pause { page: String },
    Stop { page: String },
    Hide { page: String },
    Show { page: String },
    Save { page: String },
    Destroy { page: String },
    BackPressed { page: String },
    TrimMemory { page: String, level: i32 },
    LowMemory { page: String },
    /// Render one frame on the page's engine.
    Frame { page: String },
    /// Move the main-thread clock forward and run due tasks.
    Advance { ms: u64 },
}

#[derive(Debug, Serialize)]
pub struct PageReport {
    pub name: String,
    pub page_id: String,
    /// Delegate state; absent once the page is destroyed.
    pub state: Option<String>,
    pub placeholders: usize,
    pub dropped_events: usize,
}

#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    pub steps_run: usize,
    pub pending_tasks: usize,
    pub pages: Vec<PageReport>,
    pub telemetry: TelemetrySnapshot,
}

struct Page {
    spec: PageSpec,
    host: Rc<PageHost>,
    saved: Option<SavedState>,
}

/// Replays a [`Scenario`] on a manual clock.
pub struct ScenarioRunner {
    looper: Rc<Looper<ManualTimeSource>>,
    factory: Rc<HeadlessEngineFactory>,
    telemetry: Arc<TelemetryCollector>,
    pages: BTreeMap<String, Page>,
}

impl ScenarioRunner {
    pub fn new(config: EmbeddingConfig, scenario: &Scenario) -> Result<Self> {
        let looper = Rc::new(Looper::new(ManualTimeSource::new()));
        let factory = Rc::new(HeadlessEngineFactory::new());
        let telemetry = Arc::new(TelemetryCollector::from_config(&config.telemetry));
        let runtime = EmbeddingRuntime::builder()
            .config(config.clone())
            .engine_factory(factory.clone())
            .handler(looper.clone())
            .telemetry(Arc::clone(&telemetry))
            .build();
        if scenario.shared_engine {
            runtime.start_shared_engine(&HostContext::new("cli:app"));
        }

        let mut pages = BTreeMap::new();
        for spec in &scenario.pages {
            if pages.contains_key(&spec.name) {
                bail!("page '{}' is declared twice", spec.name);
            }
            let mut page_config = spec.config.clone();
            if spec.use_shared_engine {
                if !scenario.shared_engine {
                    bail!(
                        "page '{}' uses the shared engine but the scenario does not pre-warm one",
                        spec.name
                    );
                }
                page_config.options.cached_engine_id = Some(config.engine.shared_engine_id.clone());
                page_config.options.destroy_engine_with_host = false;
                page_config.options.restore_and_save_state = false;
            }
            let activity_name = spec
                .activity
                .clone()
                .unwrap_or_else(|| format!("{}Activity", spec.name));
            let host = PageHost::new(
                spec.kind,
                runtime.clone(),
                HostContext::new(format!("cli:{}", spec.name)),
                Some(Rc::new(HostActivity::new(activity_name))),
                page_config,
            );
            pages.insert(
                spec.name.clone(),
                Page {
                    spec: spec.clone(),
                    host,
                    saved: None,
                },
            );
        }

        Ok(Self {
            looper,
            factory,
            telemetry,
            pages,
        })
    }

    pub fn run(&mut self, steps: &[Step]) -> Result<ScenarioReport> {
        for (index, step) in steps.iter().enumerate() {
            self.apply(step)
                .with_context(|| format!("step {} ({:?}) failed", index + 1, step))?;
        }
        Ok(self.report(steps.len()))
    }

    fn apply(&mut self, step: &Step) -> Result<()> {
        log::debug!("[Scenario] {:?}", step);
        match step {
            Step::Create { page, restore } => {
                let page = self.page_mut(page)?;
                let saved = if *restore { page.saved.clone() } else { None };
                page.host.create(saved.as_ref())?;
            }
            Step::Start { page } => self.page(page)?.host.start()?,
            Step::Resume { page } => self.page(page)?.host.resume()?,
            Step::PostResume { page } => self.page(page)?.host.post_resume()?,
            Step::Pause { page } => self.page(page)?.host.pause()?,
            Step::Stop { page } => self.page(page)?.host.stop()?,
            Step::Hide { page } => self.page(page)?.host.set_hidden(true)?,
            Step::Show { page } => self.page(page)?.host.set_hidden(false)?,
            Step::Save { page } => {
                let page = self.page_mut(page)?;
                let mut out = SavedState::default();
                page.host.save(&mut out)?;
                page.saved = Some(out);
            }
            Step::Destroy { page } => self.page(page)?.host.destroy()?,
            Step::BackPressed { page } => self.page(page)?.host.back_pressed()?,
            Step::TrimMemory { page, level } => self.page(page)?.host.trim_memory(*level)?,
            Step::LowMemory { page } => self.page(page)?.host.low_memory()?,
            Step::Frame { page } => {
                let engine = self.headless_engine_of(page)?;
                engine.render_frame(FrameSnapshot::new(2, 2, vec![0xFF; 16]));
            }
            Step::Advance { ms } => {
                let ran = self.looper.advance(Duration::from_millis(*ms));
                log::debug!("[Scenario] advanced {} ms, {} task(s) ran", ms, ran);
            }
        }
        Ok(())
    }

    fn page(&self, name: &str) -> Result<&Page> {
        self.pages
            .get(name)
            .ok_or_else(|| anyhow!("unknown page '{name}'"))
    }

    fn page_mut(&mut self, name: &str) -> Result<&mut Page> {
        self.pages
            .get_mut(name)
            .ok_or_else(|| anyhow!("unknown page '{name}'"))
    }

    fn headless_engine_of(&self, name: &str) -> Result<Rc<HeadlessEngine>> {
        let engine = self
            .page(name)?
            .host
            .engine()
            .ok_or_else(|| anyhow!("page '{name}' has no engine"))?;
        let id = engine.id();
        self.factory
            .created()
            .into_iter()
            .find(|candidate| candidate.id() == id)
            .ok_or_else(|| anyhow!("engine {id} of page '{name}' is not a headless engine"))
    }

    fn report(&self, steps_run: usize) -> ScenarioReport {
        let pages = self
            .pages
            .values()
            .map(|page| PageReport {
                name: page.spec.name.clone(),
                page_id: page.host.page_id().to_string(),
                state: page.host.delegate_state().map(|state| state.to_string()),
                placeholders: page
                    .host
                    .container()
                    .map(|container| container.placeholders().len())
                    .unwrap_or(0),
                dropped_events: page
                    .host
                    .events()
                    .iter()
                    .filter(|event| {
                        matches!(event, shared_engine_host::host::HostEvent::EventDropped { .. })
                    })
                    .count(),
            })
            .collect();

        ScenarioReport {
            steps_run,
            pending_tasks: self.looper.pending(),
            pages,
            telemetry: self.telemetry.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_engine_host::telemetry::LifecycleEvent;

    #[test]
    fn builtin_scenario_replays_eviction_and_reattach() {
        let scenario: Scenario = serde_json::from_str(BUILTIN_EVICTION).unwrap();
        let mut runner = ScenarioRunner::new(EmbeddingConfig::default(), &scenario).unwrap();
        let report = runner.run(&scenario.steps).unwrap();

        assert_eq!(report.steps_run, scenario.steps.len());
        assert_eq!(report.pending_tasks, 0);

        let events = report.telemetry.events();
        let detached = events
            .iter()
            .filter(|event| matches!(event, LifecycleEvent::HostDetached { .. }))
            .count();
        let reattached = events
            .iter()
            .filter(|event| matches!(event, LifecycleEvent::HostReattached { .. }))
            .count();
        assert_eq!(detached, 1);
        assert_eq!(reattached, 1);
        assert!(events
            .iter()
            .any(|event| matches!(event, LifecycleEvent::EntrypointExecuted { .. })));
        assert!(events
            .iter()
            .any(|event| matches!(event, LifecycleEvent::PlaceholderRemoved { .. })));
        assert!(!events
            .iter()
            .any(|event| matches!(event, LifecycleEvent::EngineDestroyed { .. })));

        let home = report.pages.iter().find(|page| page.name == "home").unwrap();
        assert_eq!(home.state, None);
        // stop and back press while evicted
        assert_eq!(home.dropped_events, 2);
    }

    #[test]
    fn unknown_page_is_reported() {
        let scenario: Scenario =
            serde_json::from_str(r#"{ "steps": [ { "op": "start", "page": "ghost" } ] }"#).unwrap();
        let mut runner = ScenarioRunner::new(EmbeddingConfig::default(), &scenario).unwrap();
        let err = runner.run(&scenario.steps).unwrap_err();
        assert!(format!("{err:?}").contains("unknown page 'ghost'"));
    }

    #[test]
    fn shared_engine_must_be_prewarmed() {
        let scenario: Scenario = serde_json::from_str(
            r#"{ "pages": [ { "name": "a", "kind": "fragment", "use_shared_engine": true } ] }"#,
        )
        .unwrap();
        assert!(ScenarioRunner::new(EmbeddingConfig::default(), &scenario).is_err());
    }
}
