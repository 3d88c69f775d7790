//! Process-scope state shared by every delegate.
//!
//! One [`EmbeddingRuntime`] is built per process (or per test) and handed to
//! each [`crate::HostDelegate`]. It owns the engine cache, the per-engine
//! holder slots that decide which host is wired to an engine, the factory
//! used when no engine is cached or supplied, the main-thread handler and the
//! telemetry sink.
//!
//! A runtime built without an injected handler posts deferred work to its own
//! system-clock [`Looper`]. The host's main loop must drain it with
//! [`EmbeddingRuntime::run_due_tasks`], otherwise splash fade-outs and
//! placeholder removals never happen.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::engine::{
    DartEntrypoint, EngineCache, EngineFactory, EngineId, EngineRef, EngineRequest,
    HeadlessEngineFactory,
};
use crate::host::{Host, HostContext};
use crate::scheduler::{Looper, MainThreadHandler, SystemTimeSource};
use crate::telemetry::{self, LifecycleEvent, TelemetryCollector};

/// Resolves the code bundle path when a host does not override it.
pub trait AppBundleLocator {
    fn find_app_bundle_path(&self) -> String;
}

/// Locator returning a fixed path.
#[derive(Debug, Clone)]
pub struct FixedBundleLocator {
    path: String,
}

impl FixedBundleLocator {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl AppBundleLocator for FixedBundleLocator {
    fn find_app_bundle_path(&self) -> String {
        self.path.clone()
    }
}

#[derive(Default)]
struct HolderEntry {
    holder: Option<Weak<dyn Host>>,
    wired: Option<Weak<dyn Host>>,
}

fn same_host(slot: &Option<Weak<dyn Host>>, host: &Rc<dyn Host>) -> bool {
    slot.as_ref()
        .and_then(Weak::upgrade)
        .map(|current| Rc::ptr_eq(&current, host))
        .unwrap_or(false)
}

/// Per-engine record of the current holder and the activity wiring owner.
///
/// The holder is the host that last claimed the engine. The wiring owner is
/// the host whose activity the engine's control surface was last attached to;
/// it changes first during an attach, the holder changes only after the
/// previous holder was evicted. Slots hold weak references so a dropped host
/// never counts as live.
#[derive(Default)]
pub struct HolderSlots {
    slots: RefCell<HashMap<EngineId, HolderEntry>>,
}

impl HolderSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live host currently holding `engine`.
    pub fn current(&self, engine: EngineId) -> Option<Rc<dyn Host>> {
        self.slots
            .borrow()
            .get(&engine)
            .and_then(|entry| entry.holder.as_ref())
            .and_then(Weak::upgrade)
    }

    pub fn is_current(&self, engine: EngineId, host: &Rc<dyn Host>) -> bool {
        self.slots
            .borrow()
            .get(&engine)
            .map(|entry| same_host(&entry.holder, host))
            .unwrap_or(false)
    }

    /// Make `host` the holder of `engine`. Returns the previous live holder.
    pub fn claim(&self, engine: EngineId, host: &Rc<dyn Host>) -> Option<Rc<dyn Host>> {
        let mut slots = self.slots.borrow_mut();
        let entry = slots.entry(engine).or_default();
        let previous = entry.holder.as_ref().and_then(Weak::upgrade);
        entry.holder = Some(Rc::downgrade(host));
        previous
    }

    /// Clear the holder if it is `host`. Returns whether it was.
    pub fn release_if_current(&self, engine: EngineId, host: &Rc<dyn Host>) -> bool {
        let mut slots = self.slots.borrow_mut();
        let Some(entry) = slots.get_mut(&engine) else {
            return false;
        };
        if !same_host(&entry.holder, host) {
            return false;
        }
        entry.holder = None;
        if entry.wired.is_none() {
            slots.remove(&engine);
        }
        true
    }

    pub fn record_wiring(&self, engine: EngineId, host: &Rc<dyn Host>) {
        self.slots
            .borrow_mut()
            .entry(engine)
            .or_default()
            .wired = Some(Rc::downgrade(host));
    }

    /// True when `engine`'s control surface is still attached for `host`.
    pub fn is_wired(&self, engine: EngineId, host: &Rc<dyn Host>) -> bool {
        self.slots
            .borrow()
            .get(&engine)
            .map(|entry| same_host(&entry.wired, host))
            .unwrap_or(false)
    }

    pub fn clear_wiring_if(&self, engine: EngineId, host: &Rc<dyn Host>) {
        let mut slots = self.slots.borrow_mut();
        let Some(entry) = slots.get_mut(&engine) else {
            return;
        };
        if same_host(&entry.wired, host) {
            entry.wired = None;
            if entry.holder.is_none() {
                slots.remove(&engine);
            }
        }
    }

    /// Forget everything known about `engine`, e.g. after it was destroyed.
    pub fn forget(&self, engine: EngineId) {
        self.slots.borrow_mut().remove(&engine);
    }
}

struct RuntimeInner {
    config: EmbeddingConfig,
    cache: EngineCache,
    holders: HolderSlots,
    factory: Rc<dyn EngineFactory>,
    bundle_locator: Rc<dyn AppBundleLocator>,
    handler: Rc<dyn MainThreadHandler>,
    looper: Option<Rc<Looper<SystemTimeSource>>>,
    telemetry: Arc<TelemetryCollector>,
    next_page_id: Cell<u64>,
}

/// Shared handle to the process-scope embedding state.
///
/// Cloning yields another handle to the same runtime.
#[derive(Clone)]
pub struct EmbeddingRuntime {
    inner: Rc<RuntimeInner>,
}

impl EmbeddingRuntime {
    pub fn builder() -> EmbeddingRuntimeBuilder {
        EmbeddingRuntimeBuilder::default()
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &EngineCache {
        &self.inner.cache
    }

    pub fn holders(&self) -> &HolderSlots {
        &self.inner.holders
    }

    pub fn factory(&self) -> &Rc<dyn EngineFactory> {
        &self.inner.factory
    }

    pub fn bundle_locator(&self) -> &Rc<dyn AppBundleLocator> {
        &self.inner.bundle_locator
    }

    pub fn handler(&self) -> &Rc<dyn MainThreadHandler> {
        &self.inner.handler
    }

    /// The runtime's own looper, present when no handler was injected.
    pub fn looper(&self) -> Option<&Rc<Looper<SystemTimeSource>>> {
        self.inner.looper.as_ref()
    }

    /// Run deferred tasks whose delay has passed. Returns how many ran.
    ///
    /// Hosts relying on the default handler call this from their main loop.
    /// With an injected handler there is nothing to drain and this returns 0.
    pub fn run_due_tasks(&self) -> usize {
        self.inner
            .looper
            .as_ref()
            .map(|looper| looper.run_due())
            .unwrap_or(0)
    }

    /// Warm up the process-wide shared engine.
    ///
    /// Builds an engine through the factory, registers it in the cache under
    /// the configured shared id and runs the default entrypoint from the
    /// bundle locator's path. Returns the already registered engine when the
    /// id is taken.
    pub fn start_shared_engine(&self, context: &HostContext) -> EngineRef {
        let engine_id = &self.inner.config.engine.shared_engine_id;
        if let Some(engine) = self.inner.cache.get(engine_id) {
            log::debug!(
                "[EmbeddingRuntime] shared engine '{}' already running as {}",
                engine_id,
                engine.id()
            );
            return engine;
        }

        let engine = self.inner.factory.create_engine(
            context,
            EngineRequest {
                shell_args: Vec::new(),
                automatically_register_plugins: true,
                will_provide_restoration_data: false,
            },
        );
        self.inner.cache.put(engine_id.clone(), Rc::clone(&engine));

        let bundle_path = self.inner.bundle_locator.find_app_bundle_path();
        let function_name = self.inner.config.engine.default_entrypoint.clone();
        log::info!(
            "[EmbeddingRuntime] starting shared engine '{}' ({}): {} from {}",
            engine_id,
            engine.id(),
            function_name,
            bundle_path
        );
        engine.execute_entrypoint(DartEntrypoint::new(bundle_path.clone(), function_name.clone()));
        self.publish(LifecycleEvent::EntrypointExecuted {
            engine: engine.id(),
            entrypoint: function_name,
            route: None,
            bundle_path,
        });
        engine
    }

    pub fn telemetry(&self) -> &Arc<TelemetryCollector> {
        &self.inner.telemetry
    }

    pub fn publish(&self, event: LifecycleEvent) {
        self.inner.telemetry.publish(event);
    }

    /// Allocate a unique page id for a page host.
    pub fn next_page_id(&self) -> String {
        let id = self.inner.next_page_id.get();
        self.inner.next_page_id.set(id + 1);
        format!("page_{}", id)
    }
}

impl Default for EmbeddingRuntime {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`EmbeddingRuntime`]. Unset parts fall back to defaults
/// derived from the configuration.
#[derive(Default)]
pub struct EmbeddingRuntimeBuilder {
    config: Option<EmbeddingConfig>,
    cache: Option<EngineCache>,
    factory: Option<Rc<dyn EngineFactory>>,
    bundle_locator: Option<Rc<dyn AppBundleLocator>>,
    handler: Option<Rc<dyn MainThreadHandler>>,
    telemetry: Option<Arc<TelemetryCollector>>,
}

impl EmbeddingRuntimeBuilder {
    pub fn config(mut self, config: EmbeddingConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn cache(mut self, cache: EngineCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn engine_factory(mut self, factory: Rc<dyn EngineFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn bundle_locator(mut self, locator: Rc<dyn AppBundleLocator>) -> Self {
        self.bundle_locator = Some(locator);
        self
    }

    pub fn handler(mut self, handler: Rc<dyn MainThreadHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<TelemetryCollector>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn build(self) -> EmbeddingRuntime {
        let config = self.config.unwrap_or_default();
        let bundle_locator = self.bundle_locator.unwrap_or_else(|| {
            Rc::new(FixedBundleLocator::new(
                config.engine.default_app_bundle_path.clone(),
            ))
        });

        let (handler, looper) = match self.handler {
            Some(handler) => (handler, None),
            None => {
                let looper = Rc::new(Looper::system());
                let handler: Rc<dyn MainThreadHandler> = looper.clone();
                (handler, Some(looper))
            }
        };

        EmbeddingRuntime {
            inner: Rc::new(RuntimeInner {
                cache: self.cache.unwrap_or_default(),
                holders: HolderSlots::new(),
                factory: self
                    .factory
                    .unwrap_or_else(|| Rc::new(HeadlessEngineFactory::new())),
                bundle_locator,
                handler,
                looper,
                telemetry: self.telemetry.unwrap_or_else(telemetry::hub),
                next_page_id: Cell::new(1),
                config,
            }),
        }
    }
}
