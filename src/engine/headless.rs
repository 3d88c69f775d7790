//! In-process engine that records every call it receives.
//!
//! It keeps just enough state to answer the contract truthfully (executing,
//! activity wiring, restoration data, surface and display state), which makes
//! it a deterministic stand-in on desktop and in tests.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::engine::{
    AppLifecyclePhase, DartEntrypoint, Engine, EngineFactory, EngineId, EngineRef, EngineRequest,
    FrameSnapshot, Intent, ListenerId, PluginState, UiDisplayListener,
};
use crate::host::{Activity, HostContext, LifecycleHandle};
use crate::view::RenderSurface;

/// One recorded call on a [`HeadlessEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    LifecyclePhase(AppLifecyclePhase),
    SetInitialRoute(String),
    ExecuteEntrypoint(DartEntrypoint),
    PopRoute,
    SetRestorationData(Option<Vec<u8>>),
    AttachToActivity {
        activity: String,
        after_config_change: bool,
    },
    DetachFromActivity,
    DetachFromActivityForConfigChanges,
    SavePluginState,
    RestorePluginState { present: bool },
    PermissionsResult { request_code: i32 },
    ActivityResult { request_code: i32, result_code: i32 },
    NewIntent(Intent),
    UserLeaveHint,
    LowMemoryWarning,
    MemoryPressureWarning,
    AttachSurface(RenderSurface),
    DetachSurface,
    Destroy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActivityAttachment {
    activity: String,
    lifecycle: LifecycleHandle,
}

#[derive(Default)]
struct HeadlessState {
    calls: Vec<EngineCall>,
    phase: Option<AppLifecyclePhase>,
    entrypoint: Option<DartEntrypoint>,
    initial_route: Option<String>,
    activity: Option<ActivityAttachment>,
    detached_for_config_change: bool,
    restoration_data: Option<Vec<u8>>,
    plugin_state: PluginState,
    surface: Option<RenderSurface>,
    displaying: bool,
    last_frame: Option<FrameSnapshot>,
    destroyed: bool,
}

/// Recording engine with no rendering or execution backend.
pub struct HeadlessEngine {
    id: EngineId,
    request: EngineRequest,
    state: RefCell<HeadlessState>,
    listeners: RefCell<Vec<(ListenerId, Rc<dyn UiDisplayListener>)>>,
    next_listener: Cell<u64>,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self::with_request(EngineRequest::default())
    }

    pub fn with_request(request: EngineRequest) -> Self {
        Self {
            id: EngineId::next(),
            request,
            state: RefCell::new(HeadlessState::default()),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(1),
        }
    }

    pub fn request(&self) -> &EngineRequest {
        &self.request
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.borrow().calls.clone()
    }

    pub fn lifecycle_phase(&self) -> Option<AppLifecyclePhase> {
        self.state.borrow().phase
    }

    pub fn executed_entrypoint(&self) -> Option<DartEntrypoint> {
        self.state.borrow().entrypoint.clone()
    }

    pub fn initial_route(&self) -> Option<String> {
        self.state.borrow().initial_route.clone()
    }

    /// Name of the activity the control surface is wired to, if any.
    pub fn attached_activity(&self) -> Option<String> {
        self.state
            .borrow()
            .activity
            .as_ref()
            .map(|attachment| attachment.activity.clone())
    }

    pub fn attached_lifecycle(&self) -> Option<LifecycleHandle> {
        self.state
            .borrow()
            .activity
            .as_ref()
            .map(|attachment| attachment.lifecycle.clone())
    }

    pub fn surface(&self) -> Option<RenderSurface> {
        self.state.borrow().surface.clone()
    }

    pub fn is_displaying(&self) -> bool {
        self.state.borrow().displaying
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.borrow().destroyed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn plugin_state(&self) -> PluginState {
        self.state.borrow().plugin_state.clone()
    }

    /// Simulate a plugin storing state that survives process death.
    pub fn set_plugin_state(&self, key: impl Into<String>, value: Vec<u8>) {
        self.state.borrow_mut().plugin_state.insert(key, value);
    }

    /// Count of recorded calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    /// Simulate the rasterizer presenting a frame.
    ///
    /// The first frame on an attached surface notifies display listeners.
    pub fn render_frame(&self, frame: FrameSnapshot) {
        let first_on_surface = {
            let mut state = self.state.borrow_mut();
            state.last_frame = Some(frame);
            if state.surface.is_some() && !state.displaying {
                state.displaying = true;
                true
            } else {
                false
            }
        };

        if first_on_surface {
            for listener in self.listener_snapshot() {
                listener.on_ui_displayed();
            }
        }
    }

    fn record(&self, call: EngineCall) {
        let mut state = self.state.borrow_mut();
        if state.destroyed {
            log::warn!("[HeadlessEngine] {} used after destroy: {:?}", self.id, call);
        }
        state.calls.push(call);
    }

    fn listener_snapshot(&self) -> Vec<Rc<dyn UiDisplayListener>> {
        self.listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect()
    }

    fn stop_rendering_to_surface(&self) {
        let was_displaying = {
            let mut state = self.state.borrow_mut();
            state.surface = None;
            std::mem::replace(&mut state.displaying, false)
        };

        if was_displaying {
            for listener in self.listener_snapshot() {
                listener.on_ui_no_longer_displayed();
            }
        }
    }
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for HeadlessEngine {
    fn id(&self) -> EngineId {
        self.id
    }

    fn push_lifecycle_phase(&self, phase: AppLifecyclePhase) {
        self.record(EngineCall::LifecyclePhase(phase));
        self.state.borrow_mut().phase = Some(phase);
    }

    fn is_executing(&self) -> bool {
        self.state.borrow().entrypoint.is_some()
    }

    fn set_initial_route(&self, route: &str) {
        self.record(EngineCall::SetInitialRoute(route.to_string()));
        self.state.borrow_mut().initial_route = Some(route.to_string());
    }

    fn execute_entrypoint(&self, entrypoint: DartEntrypoint) {
        if self.is_executing() {
            log::warn!(
                "[HeadlessEngine] {} ignoring second entrypoint {}",
                self.id,
                entrypoint.function_name
            );
            return;
        }
        self.record(EngineCall::ExecuteEntrypoint(entrypoint.clone()));
        self.state.borrow_mut().entrypoint = Some(entrypoint);
    }

    fn pop_route(&self) {
        self.record(EngineCall::PopRoute);
    }

    fn restoration_data(&self) -> Option<Vec<u8>> {
        self.state.borrow().restoration_data.clone()
    }

    fn set_restoration_data(&self, data: Option<Vec<u8>>) {
        self.record(EngineCall::SetRestorationData(data.clone()));
        self.state.borrow_mut().restoration_data = data;
    }

    fn attach_to_activity(&self, activity: &Rc<dyn Activity>, lifecycle: &LifecycleHandle) {
        let after_config_change =
            std::mem::replace(&mut self.state.borrow_mut().detached_for_config_change, false);
        self.record(EngineCall::AttachToActivity {
            activity: activity.name(),
            after_config_change,
        });
        self.state.borrow_mut().activity = Some(ActivityAttachment {
            activity: activity.name(),
            lifecycle: lifecycle.clone(),
        });
    }

    fn detach_from_activity(&self) {
        self.record(EngineCall::DetachFromActivity);
        self.state.borrow_mut().activity = None;
    }

    fn detach_from_activity_for_config_changes(&self) {
        self.record(EngineCall::DetachFromActivityForConfigChanges);
        let mut state = self.state.borrow_mut();
        state.activity = None;
        state.detached_for_config_change = true;
    }

    fn save_plugin_state(&self, out: &mut PluginState) {
        self.record(EngineCall::SavePluginState);
        for (key, value) in &self.state.borrow().plugin_state.0 {
            out.insert(key.clone(), value.clone());
        }
    }

    fn restore_plugin_state(&self, state: Option<&PluginState>) {
        self.record(EngineCall::RestorePluginState {
            present: state.is_some(),
        });
        if let Some(state) = state {
            self.state.borrow_mut().plugin_state = state.clone();
        }
    }

    fn on_request_permissions_result(
        &self,
        request_code: i32,
        _permissions: &[String],
        _grant_results: &[i32],
    ) -> bool {
        self.record(EngineCall::PermissionsResult { request_code });
        self.state.borrow().activity.is_some()
    }

    fn on_activity_result(&self, request_code: i32, result_code: i32, _data: Option<&Intent>) -> bool {
        self.record(EngineCall::ActivityResult {
            request_code,
            result_code,
        });
        self.state.borrow().activity.is_some()
    }

    fn on_new_intent(&self, intent: &Intent) {
        self.record(EngineCall::NewIntent(intent.clone()));
    }

    fn on_user_leave_hint(&self) {
        self.record(EngineCall::UserLeaveHint);
    }

    fn notify_low_memory_warning(&self) {
        self.record(EngineCall::LowMemoryWarning);
    }

    fn send_memory_pressure_warning(&self) {
        self.record(EngineCall::MemoryPressureWarning);
    }

    fn attach_surface(&self, surface: &RenderSurface) {
        if self.state.borrow().surface.is_some() {
            self.stop_rendering_to_surface();
        }
        self.record(EngineCall::AttachSurface(surface.clone()));
        self.state.borrow_mut().surface = Some(surface.clone());
    }

    fn detach_surface(&self) {
        self.record(EngineCall::DetachSurface);
        self.stop_rendering_to_surface();
    }

    fn add_ui_display_listener(&self, listener: Rc<dyn UiDisplayListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    fn remove_ui_display_listener(&self, id: ListenerId) {
        self.listeners
            .borrow_mut()
            .retain(|(registered, _)| *registered != id);
    }

    fn capture_frame(&self) -> Option<FrameSnapshot> {
        self.state.borrow().last_frame.clone()
    }

    fn destroy(&self) {
        self.record(EngineCall::Destroy);
        self.stop_rendering_to_surface();
        self.listeners.borrow_mut().clear();
        let mut state = self.state.borrow_mut();
        state.destroyed = true;
        state.activity = None;
    }
}

/// Factory producing [`HeadlessEngine`]s and remembering what it built.
#[derive(Default)]
pub struct HeadlessEngineFactory {
    created: RefCell<Vec<Rc<HeadlessEngine>>>,
}

impl HeadlessEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engines created so far, oldest first.
    pub fn created(&self) -> Vec<Rc<HeadlessEngine>> {
        self.created.borrow().clone()
    }

    pub fn last_created(&self) -> Option<Rc<HeadlessEngine>> {
        self.created.borrow().last().cloned()
    }
}

impl EngineFactory for HeadlessEngineFactory {
    fn create_engine(&self, context: &HostContext, request: EngineRequest) -> EngineRef {
        let engine = Rc::new(HeadlessEngine::with_request(request));
        log::debug!(
            "[HeadlessEngineFactory] created {} for {}",
            engine.id(),
            context.name()
        );
        self.created.borrow_mut().push(Rc::clone(&engine));
        engine
    }
}
