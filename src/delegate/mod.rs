//! Per-host lifecycle delegate for a shared engine.
//!
//! A [`HostDelegate`] is created for exactly one host instance. It resolves
//! the engine the host will show, wires it to the host's activity, evicts
//! whichever host held the engine before, and can later be evicted itself:
//! the live view is swapped for a frozen placeholder and swapped back on
//! [`HostDelegate::reattach`] without restarting the engine.
//!
//! All operations run on the UI thread. The only deferred work, removal of
//! the eviction placeholder after a reattach, is posted through the runtime's
//! [`crate::scheduler::MainThreadHandler`] and does nothing once the delegate
//! has been released.

use std::cell::Cell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::engine::{
    AppLifecyclePhase, DartEntrypoint, EngineRef, EngineRequest, Intent, ListenerId, PluginState,
    UiDisplayListener, TRIM_MEMORY_RUNNING_LOW,
};
use crate::error::{log_delegate_error, DelegateError};
use crate::host::{Host, HostOptions, SystemChrome};
use crate::runtime::EmbeddingRuntime;
use crate::telemetry::{EngineSource, LifecycleEvent};
use crate::view::{
    ChildView, EngineView, PlaceholderView, RenderSurface, SnapshotSplashScreen, SplashContainer,
    SplashScreen,
};

mod state;

pub use state::{DelegateState, SavedState};


/// Forwards first-frame notifications from the view to the host's hooks.
struct HostUiForwarder {
    host: Weak<dyn Host>,
}

impl UiDisplayListener for HostUiForwarder {
    fn on_ui_displayed(&self) {
        if let Some(host) = self.host.upgrade() {
            host.on_ui_displayed();
        }
    }

    fn on_ui_no_longer_displayed(&self) {
        if let Some(host) = self.host.upgrade() {
            host.on_ui_no_longer_displayed();
        }
    }
}

/// Attach/detach/reattach state machine for one host.
pub struct HostDelegate {
    host: Option<Rc<dyn Host>>,
    runtime: EmbeddingRuntime,
    state: DelegateState,
    engine: Option<EngineRef>,
    engine_from_host: bool,
    chrome: Option<Rc<dyn SystemChrome>>,
    surface: Option<RenderSurface>,
    view: Option<EngineView>,
    ui_listener: Option<ListenerId>,
    container: Option<SplashContainer>,
    reattach_splash: Option<Rc<dyn SplashScreen>>,
    reattach_view: Option<PlaceholderView>,
    alive: Rc<Cell<bool>>,
}

impl HostDelegate {
    pub fn new(host: Rc<dyn Host>, runtime: EmbeddingRuntime) -> Self {
        Self {
            host: Some(host),
            runtime,
            state: DelegateState::Unattached,
            engine: None,
            engine_from_host: false,
            chrome: None,
            surface: None,
            view: None,
            ui_listener: None,
            container: None,
            reattach_splash: None,
            reattach_view: None,
            alive: Rc::new(Cell::new(true)),
        }
    }

    pub fn state(&self) -> DelegateState {
        self.state
    }

    /// True between an eviction and the matching reattach.
    pub fn is_detached(&self) -> bool {
        self.state == DelegateState::Detached
    }

    pub fn engine(&self) -> Option<EngineRef> {
        self.engine.clone()
    }

    /// Whether the bound engine came from the host's `provide_engine` hook.
    pub fn is_engine_from_host(&self) -> bool {
        self.engine_from_host
    }

    pub fn container(&self) -> Option<SplashContainer> {
        self.container.clone()
    }

    pub fn view(&self) -> Option<EngineView> {
        self.view.clone()
    }

    /// Placeholder left in the container by the last eviction, until the
    /// reattach that supersedes it.
    pub fn eviction_placeholder(&self) -> Option<PlaceholderView> {
        self.reattach_view.clone()
    }

    /// Resolve an engine and wire it to the host.
    ///
    /// The engine comes from the cache when the host names a cached id, else
    /// from the host's `provide_engine` hook, else from the runtime's factory.
    /// A cached id missing from the cache fails without touching the delegate.
    pub fn attach(&mut self) -> Result<(), DelegateError> {
        self.ensure_alive("attach")?;
        if self.state != DelegateState::Unattached {
            let err = DelegateError::AlreadyAttached;
            log_delegate_error(&err, "attach");
            return Err(err);
        }
        let host = self.host("attach")?;
        let options = host.options();

        let (engine, source) = self.resolve_engine(&host, &options)?;
        log::debug!(
            "[HostDelegate] {} attach: {} from {:?}",
            host.label(),
            engine.id(),
            source
        );
        self.runtime.publish(LifecycleEvent::EngineResolved {
            host: host.label(),
            engine: engine.id(),
            source,
        });

        self.engine_from_host = source == EngineSource::Host;
        self.engine = Some(Rc::clone(&engine));
        self.wire_to_host(&host, &options, &engine);
        self.state = DelegateState::Attached;
        Ok(())
    }

    /// Build the rendering view and its splash container.
    ///
    /// The surface kind is chosen from the host's modes on the first call and
    /// reused for every later call. While detached the new container shows the
    /// eviction placeholder instead of the view, and the view is bound to the
    /// engine on reattach.
    pub fn create_view(&mut self) -> Result<SplashContainer, DelegateError> {
        self.require_bound("create_view")?;
        let host = self.host("create_view")?;
        let engine = self.bound_engine("create_view")?;
        let options = host.options();

        if self.view.is_some() {
            self.unbind_view();
        }

        let surface = self
            .surface
            .get_or_insert_with(|| {
                RenderSurface::for_modes(options.render_mode, options.transparency_mode)
            })
            .clone();
        host.on_surface_created(&surface);

        let view = EngineView::new(surface);
        let container = SplashContainer::new(host.context(), Rc::clone(self.runtime.handler()));

        if self.state == DelegateState::Attached {
            self.ui_listener = Some(view.add_ui_display_listener(Rc::new(HostUiForwarder {
                host: Rc::downgrade(&host),
            })));
            container.display_engine_view_with_splash(&view, host.provide_splash_screen());
            view.attach_to_engine(&engine);
        } else {
            if let Some(placeholder) = &self.reattach_view {
                container.add_view(ChildView::Placeholder(placeholder.clone()));
            }
            log::debug!(
                "[HostDelegate] {} create_view while detached, binding deferred",
                host.label()
            );
        }

        log::debug!("[HostDelegate] {} created {}", host.label(), view.id());
        self.view = Some(view);
        self.container = Some(container.clone());
        Ok(container)
    }

    /// Execute the entrypoint unless the engine is cached or already running.
    pub fn start(&mut self) -> Result<(), DelegateError> {
        self.require_bound("start")?;
        let host = self.host("start")?;
        let engine = self.bound_engine("start")?;
        let options = host.options();

        if options.cached_engine_id.is_some() {
            log::debug!("[HostDelegate] {} start: cached engine, skipping", host.label());
            return Ok(());
        }
        if engine.is_executing() {
            log::debug!("[HostDelegate] {} start: {} already executing", host.label(), engine.id());
            return Ok(());
        }

        // The route has to be in place before the entrypoint runs.
        if let Some(route) = options.initial_route.as_deref() {
            engine.set_initial_route(route);
        }

        let bundle_path = options
            .app_bundle_path
            .clone()
            .unwrap_or_else(|| self.runtime.bundle_locator().find_app_bundle_path());
        let function_name = options
            .entrypoint
            .clone()
            .unwrap_or_else(|| self.runtime.config().engine.default_entrypoint.clone());

        log::info!(
            "[HostDelegate] {} executing {} from {} on {}",
            host.label(),
            function_name,
            bundle_path,
            engine.id()
        );
        engine.execute_entrypoint(DartEntrypoint::new(bundle_path.clone(), function_name.clone()));
        self.runtime.publish(LifecycleEvent::EntrypointExecuted {
            engine: engine.id(),
            entrypoint: function_name,
            route: options.initial_route,
            bundle_path,
        });
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), DelegateError> {
        self.push_phase("resume", AppLifecyclePhase::Resumed)
    }

    /// Refresh system overlays. Best effort: no chrome, no work.
    pub fn post_resume(&mut self) -> Result<(), DelegateError> {
        self.ensure_alive("post_resume")?;
        if !self.state.is_bound() {
            self.skip_forwarding("post_resume");
            return Ok(());
        }
        match &self.chrome {
            Some(chrome) => chrome.update_system_ui_overlays(),
            None => log::debug!("[HostDelegate] post_resume: no system chrome bound"),
        }
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), DelegateError> {
        self.push_phase("pause", AppLifecyclePhase::Inactive)
    }

    pub fn stop(&mut self) -> Result<(), DelegateError> {
        self.push_phase("stop", AppLifecyclePhase::Paused)
    }

    /// Unbind the view from the engine. The lifecycle phase is untouched.
    pub fn destroy_view(&mut self) -> Result<(), DelegateError> {
        self.require_bound("destroy_view")?;
        self.unbind_view();
        Ok(())
    }

    pub fn save_state(&mut self, out: &mut SavedState) -> Result<(), DelegateError> {
        self.require_bound("save_state")?;
        let host = self.host("save_state")?;
        let engine = self.bound_engine("save_state")?;
        let options = host.options();

        if options.restore_and_save_state {
            out.framework = engine.restoration_data();
        }
        if options.attach_engine_to_activity {
            let mut plugins = PluginState::new();
            engine.save_plugin_state(&mut plugins);
            out.plugins = Some(plugins);
        }
        Ok(())
    }

    pub fn restore_state(&mut self, saved: Option<&SavedState>) -> Result<(), DelegateError> {
        self.require_bound("restore_state")?;
        let host = self.host("restore_state")?;
        let engine = self.bound_engine("restore_state")?;
        let options = host.options();

        if options.restore_and_save_state {
            engine.set_restoration_data(saved.and_then(|state| state.framework.clone()));
        }
        if options.attach_engine_to_activity {
            engine.restore_plugin_state(saved.and_then(|state| state.plugins.as_ref()));
        }
        Ok(())
    }

    /// Give up the engine because another host is claiming it.
    ///
    /// The engine keeps running. Its activity-control-surface is detached
    /// unless the new holder already rewired it, the view is unbound and a
    /// placeholder built from the engine's last frame takes its place.
    pub fn detach_for_eviction(&mut self) -> Result<(), DelegateError> {
        self.require_state("detach_for_eviction", &[DelegateState::Attached])?;
        let host = self.host("detach_for_eviction")?;
        let engine = self.bound_engine("detach_for_eviction")?;
        let options = host.options();
        let holders = self.runtime.holders();

        tracing::warn!(
            "[HostDelegate] {} evicted from {}",
            host.label(),
            engine.id()
        );

        if options.attach_engine_to_activity {
            if holders.is_wired(engine.id(), &host) {
                self.detach_activity(&host, &engine);
            } else {
                log::debug!(
                    "[HostDelegate] {} control surface of {} already handed over",
                    host.label(),
                    engine.id()
                );
            }
        }
        holders.release_if_current(engine.id(), &host);
        self.state = DelegateState::Detached;

        let splash: Rc<dyn SplashScreen> = Rc::new(SnapshotSplashScreen::capture(
            &engine,
            self.runtime.config().splash.snapshot_transition(),
        ));

        self.unbind_view();
        engine.push_lifecycle_phase(AppLifecyclePhase::Inactive);

        if let Some(container) = &self.container {
            if let Some(placeholder) = splash.create_splash_view(&host.context()) {
                container.add_view(ChildView::Placeholder(placeholder.clone()));
                self.reattach_view = Some(placeholder);
            }
            if let Some(view) = &self.view {
                container.remove_view(view.id());
            }
        }
        self.reattach_splash = Some(splash);

        self.runtime.publish(LifecycleEvent::HostDetached {
            host: host.label(),
            engine: engine.id(),
        });
        Ok(())
    }

    /// Take the engine back after an eviction.
    ///
    /// Re-runs the attach wiring, which evicts whoever claimed the engine in
    /// the meantime, rebinds the live view and removes the eviction
    /// placeholder once the configured delay has passed.
    pub fn reattach(&mut self) -> Result<(), DelegateError> {
        self.require_state("reattach", &[DelegateState::Detached])?;
        let host = self.host("reattach")?;
        let engine = self.bound_engine("reattach")?;
        let options = host.options();

        tracing::warn!(
            "[HostDelegate] {} reattaching to {}",
            host.label(),
            engine.id()
        );

        if let (Some(container), Some(view)) = (&self.container, &self.view) {
            container.display_engine_view_with_splash(view, self.reattach_splash.take());
        }

        if let Some(chrome) = self.chrome.take() {
            chrome.destroy();
        }
        self.wire_to_host(&host, &options, &engine);
        self.bind_view(&host, &engine);
        engine.push_lifecycle_phase(AppLifecyclePhase::Resumed);
        self.state = DelegateState::Attached;

        if let (Some(placeholder), Some(container)) = (self.reattach_view.take(), &self.container) {
            self.schedule_placeholder_removal(&host, container, placeholder);
        }

        self.runtime.publish(LifecycleEvent::HostReattached {
            host: host.label(),
            engine: engine.id(),
        });
        Ok(())
    }

    /// Permanent teardown of the host's use of the engine.
    ///
    /// From a detached delegate the activity detach and the `detached` phase
    /// push are skipped, since the control surface belongs to another host.
    /// The engine is destroyed only when the host owns its lifetime and no
    /// other live host holds it.
    pub fn teardown(&mut self) -> Result<(), DelegateError> {
        self.require_bound("teardown")?;
        let host = self.host("teardown")?;
        let engine = self.bound_engine("teardown")?;
        let options = host.options();
        let holders = self.runtime.holders();
        let was_detached = self.state == DelegateState::Detached;

        log::debug!("[HostDelegate] {} teardown ({})", host.label(), self.state);

        host.clean_up_engine(&engine);

        if !was_detached && options.attach_engine_to_activity && holders.is_wired(engine.id(), &host)
        {
            self.detach_activity(&host, &engine);
        }

        if let Some(chrome) = self.chrome.take() {
            chrome.destroy();
        }

        if !was_detached {
            engine.push_lifecycle_phase(AppLifecyclePhase::Detached);
        }
        holders.release_if_current(engine.id(), &host);

        if options.destroy_engine_with_host {
            match holders.current(engine.id()) {
                Some(other) => log::warn!(
                    "[HostDelegate] {} not destroying {}: held by {}",
                    host.label(),
                    engine.id(),
                    other.label()
                ),
                None => {
                    log::info!("[HostDelegate] {} destroying {}", host.label(), engine.id());
                    engine.destroy();
                    holders.forget(engine.id());
                    if let Some(cache_id) = options.cached_engine_id.as_deref() {
                        self.runtime.cache().remove(cache_id);
                    }
                    self.runtime.publish(LifecycleEvent::EngineDestroyed {
                        host: host.label(),
                        engine: engine.id(),
                        cache_id: options.cached_engine_id.clone(),
                    });
                    self.engine = None;
                }
            }
        }

        self.state = DelegateState::TornDown;
        Ok(())
    }

    /// Drop every reference without touching the engine's lifetime.
    pub fn release(&mut self) -> Result<(), DelegateError> {
        self.ensure_alive("release")?;
        if self.state.is_bound() {
            log::warn!("[HostDelegate] released while {} without teardown", self.state);
        }
        self.alive.set(false);
        self.host = None;
        self.engine = None;
        self.chrome = None;
        self.view = None;
        self.ui_listener = None;
        self.container = None;
        self.reattach_splash = None;
        self.reattach_view = None;
        self.state = DelegateState::Released;
        Ok(())
    }

    pub fn back_pressed(&mut self) -> Result<(), DelegateError> {
        if let Some(engine) = self.forwarding_engine("back_pressed")? {
            engine.pop_route();
        }
        Ok(())
    }

    /// Returns whether a plugin handled the result.
    pub fn request_permissions_result(
        &mut self,
        request_code: i32,
        permissions: &[String],
        grant_results: &[i32],
    ) -> Result<bool, DelegateError> {
        Ok(self
            .forwarding_engine("request_permissions_result")?
            .map(|engine| {
                engine.on_request_permissions_result(request_code, permissions, grant_results)
            })
            .unwrap_or(false))
    }

    /// Returns whether a plugin handled the result.
    pub fn activity_result(
        &mut self,
        request_code: i32,
        result_code: i32,
        data: Option<&Intent>,
    ) -> Result<bool, DelegateError> {
        Ok(self
            .forwarding_engine("activity_result")?
            .map(|engine| engine.on_activity_result(request_code, result_code, data))
            .unwrap_or(false))
    }

    pub fn new_intent(&mut self, intent: &Intent) -> Result<(), DelegateError> {
        if let Some(engine) = self.forwarding_engine("new_intent")? {
            engine.on_new_intent(intent);
        }
        Ok(())
    }

    pub fn user_leave_hint(&mut self) -> Result<(), DelegateError> {
        if let Some(engine) = self.forwarding_engine("user_leave_hint")? {
            engine.on_user_leave_hint();
        }
        Ok(())
    }

    /// Every trim level asks the engine to collect; only
    /// [`TRIM_MEMORY_RUNNING_LOW`] also warns the framework.
    pub fn trim_memory(&mut self, level: i32) -> Result<(), DelegateError> {
        if let Some(engine) = self.forwarding_engine("trim_memory")? {
            engine.notify_low_memory_warning();
            if level == TRIM_MEMORY_RUNNING_LOW {
                engine.send_memory_pressure_warning();
            }
        }
        Ok(())
    }

    pub fn low_memory(&mut self) -> Result<(), DelegateError> {
        if let Some(engine) = self.forwarding_engine("low_memory")? {
            engine.notify_low_memory_warning();
            engine.send_memory_pressure_warning();
        }
        Ok(())
    }

    fn resolve_engine(
        &self,
        host: &Rc<dyn Host>,
        options: &HostOptions,
    ) -> Result<(EngineRef, EngineSource), DelegateError> {
        if let Some(cached_id) = options.cached_engine_id.as_deref() {
            let engine = self.runtime.cache().require(cached_id).map_err(|err| {
                let err = DelegateError::from(err);
                log_delegate_error(&err, "attach");
                err
            })?;
            return Ok((engine, EngineSource::Cache));
        }

        let context = host.context();
        if let Some(engine) = host.provide_engine(&context) {
            return Ok((engine, EngineSource::Host));
        }

        let request = EngineRequest {
            shell_args: options.shell_args.clone(),
            automatically_register_plugins: false,
            will_provide_restoration_data: options.restore_and_save_state,
        };
        Ok((
            self.runtime.factory().create_engine(&context, request),
            EngineSource::Created,
        ))
    }

    /// Chrome, activity wiring, eviction of the previous holder, then the
    /// host's configure hook. Eviction only happens once this host's own
    /// wiring is in place, and the holder is claimed only after eviction.
    fn wire_to_host(&mut self, host: &Rc<dyn Host>, options: &HostOptions, engine: &EngineRef) {
        let activity = host.activity();
        self.chrome = host.provide_system_chrome(activity.as_ref(), engine);

        if options.attach_engine_to_activity {
            match activity {
                Some(activity) => {
                    engine.attach_to_activity(&activity, &host.lifecycle());
                    let holders = self.runtime.holders();
                    holders.record_wiring(engine.id(), host);
                    self.runtime.publish(LifecycleEvent::ActivityWired {
                        host: host.label(),
                        engine: engine.id(),
                        activity: activity.name(),
                    });

                    let previous = holders.current(engine.id());
                    let previous_label = previous.as_ref().map(|previous| previous.label());
                    if let Some(previous) = previous {
                        if !Rc::ptr_eq(&previous, host) {
                            tracing::warn!(
                                "[HostDelegate] {} evicting {} from {}",
                                host.label(),
                                previous.label(),
                                engine.id()
                            );
                            previous.detach_from_engine();
                        }
                    }

                    holders.claim(engine.id(), host);
                    if previous_label.as_deref() != Some(host.label().as_str()) {
                        self.runtime.publish(LifecycleEvent::HolderChanged {
                            engine: engine.id(),
                            previous: previous_label,
                            current: host.label(),
                        });
                    }
                }
                None => log::warn!(
                    "[HostDelegate] {} wants activity wiring but has no activity",
                    host.label()
                ),
            }
        }

        host.configure_engine(engine);
    }

    fn detach_activity(&self, host: &Rc<dyn Host>, engine: &EngineRef) {
        let changing = host
            .activity()
            .map(|activity| activity.is_changing_configurations())
            .unwrap_or(false);
        if changing {
            engine.detach_from_activity_for_config_changes();
        } else {
            engine.detach_from_activity();
        }
        self.runtime.holders().clear_wiring_if(engine.id(), host);
    }

    fn bind_view(&mut self, host: &Rc<dyn Host>, engine: &EngineRef) {
        let Some(view) = self.view.clone() else {
            return;
        };
        if self.ui_listener.is_none() {
            self.ui_listener = Some(view.add_ui_display_listener(Rc::new(HostUiForwarder {
                host: Rc::downgrade(host),
            })));
        }
        view.attach_to_engine(engine);
    }

    fn unbind_view(&mut self) {
        if let Some(view) = &self.view {
            view.detach_from_engine();
            if let Some(listener) = self.ui_listener.take() {
                view.remove_ui_display_listener(listener);
            }
        }
    }

    fn schedule_placeholder_removal(
        &self,
        host: &Rc<dyn Host>,
        container: &SplashContainer,
        placeholder: PlaceholderView,
    ) {
        let alive = Rc::clone(&self.alive);
        let container = container.downgrade();
        let telemetry = Arc::clone(self.runtime.telemetry());
        let label = host.label();
        self.runtime.handler().post_delayed(
            self.runtime.config().reattach.placeholder_removal_delay(),
            Box::new(move || {
                if !alive.get() {
                    log::debug!("[HostDelegate] {} released, placeholder left alone", label);
                    return;
                }
                let Some(container) = container.upgrade() else {
                    return;
                };
                if container.remove_view(placeholder.id()) {
                    telemetry.publish(LifecycleEvent::PlaceholderRemoved {
                        host: label,
                        view: placeholder.id().raw(),
                    });
                }
            }),
        );
    }

    fn push_phase(
        &mut self,
        operation: &'static str,
        phase: AppLifecyclePhase,
    ) -> Result<(), DelegateError> {
        self.require_bound(operation)?;
        let engine = self.bound_engine(operation)?;
        engine.push_lifecycle_phase(phase);
        Ok(())
    }

    /// Engine for a best-effort notification, or `None` after logging the gap.
    fn forwarding_engine(
        &self,
        operation: &'static str,
    ) -> Result<Option<EngineRef>, DelegateError> {
        self.ensure_alive(operation)?;
        match &self.engine {
            Some(engine) if self.state.is_bound() => Ok(Some(Rc::clone(engine))),
            _ => {
                self.skip_forwarding(operation);
                Ok(None)
            }
        }
    }

    fn skip_forwarding(&self, operation: &'static str) {
        let label = self
            .host
            .as_ref()
            .map(|host| host.label())
            .unwrap_or_default();
        log::warn!(
            "[HostDelegate] {}() invoked on {} with no engine bound, ignoring",
            operation,
            label
        );
        self.runtime.publish(LifecycleEvent::ForwardingSkipped {
            host: label,
            operation: operation.to_string(),
        });
    }

    fn ensure_alive(&self, operation: &'static str) -> Result<(), DelegateError> {
        if self.state == DelegateState::Released {
            let err = DelegateError::Released { operation };
            log_delegate_error(&err, operation);
            return Err(err);
        }
        Ok(())
    }

    fn require_state(
        &self,
        operation: &'static str,
        allowed: &[DelegateState],
    ) -> Result<(), DelegateError> {
        self.ensure_alive(operation)?;
        if !allowed.contains(&self.state) {
            let err = DelegateError::InvalidState {
                operation,
                state: self.state,
            };
            log_delegate_error(&err, operation);
            return Err(err);
        }
        Ok(())
    }

    fn require_bound(&self, operation: &'static str) -> Result<(), DelegateError> {
        self.require_state(
            operation,
            &[DelegateState::Attached, DelegateState::Detached],
        )
    }

    fn host(&self, operation: &'static str) -> Result<Rc<dyn Host>, DelegateError> {
        self.host
            .clone()
            .ok_or(DelegateError::Released { operation })
    }

    fn bound_engine(&self, operation: &'static str) -> Result<EngineRef, DelegateError> {
        self.engine
            .clone()
            .ok_or(DelegateError::EngineNotBound { operation })
    }
}
