//! Page host: the activity/fragment adapter driving a [`HostDelegate`].
//!
//! Each page gets a unique id from the runtime, a route with arguments and a
//! background colour for its splash. The two page kinds map platform
//! callbacks to delegate operations differently:
//!
//! - an activity page reattaches an evicted engine in `start`,
//! - a fragment page reattaches in `resume` and whenever it is un-hidden.
//!
//! While evicted, events that would reach the engine are dropped by
//! [`PageHost::still_attached_for_event`] because the engine belongs to
//! another page.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::delegate::{DelegateState, HostDelegate, SavedState};
use crate::engine::{EngineId, EngineRef, Intent};
use crate::error::{log_delegate_error, DelegateError};
use crate::host::{
    Activity, Host, HostContext, HostOptions, LifecycleHandle, PlatformChrome, SystemChrome,
};
use crate::runtime::EmbeddingRuntime;
use crate::view::{ColorSplashScreen, RenderSurface, SplashContainer, SplashScreen};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Activity,
    Fragment,
}

/// What a page shows and how its delegate is configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub route: Option<String>,
    pub arguments: BTreeMap<String, String>,
    /// Splash background; the configured default when absent.
    pub background_argb: Option<u32>,
    pub options: HostOptions,
}

/// Hook invocations observed by a page, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "hook", rename_all = "snake_case")]
pub enum HostEvent {
    EngineConfigured { engine: EngineId },
    EngineCleanedUp { engine: EngineId },
    SurfaceCreated,
    UiDisplayed,
    UiNoLongerDisplayed,
    DetachedFromEngine,
    EventDropped { event: String },
}

pub struct PageHost {
    kind: PageKind,
    page_id: String,
    context: HostContext,
    activity: Option<Rc<dyn Activity>>,
    config: PageConfig,
    runtime: EmbeddingRuntime,
    delegate: RefCell<Option<HostDelegate>>,
    hidden: Cell<bool>,
    destroyed: Cell<bool>,
    chrome: RefCell<Option<Rc<PlatformChrome>>>,
    events: RefCell<Vec<HostEvent>>,
}

impl PageHost {
    pub fn new(
        kind: PageKind,
        runtime: EmbeddingRuntime,
        context: HostContext,
        activity: Option<Rc<dyn Activity>>,
        config: PageConfig,
    ) -> Rc<Self> {
        Rc::new(Self {
            kind,
            page_id: runtime.next_page_id(),
            context,
            activity,
            config,
            runtime,
            delegate: RefCell::new(None),
            hidden: Cell::new(false),
            destroyed: Cell::new(false),
            chrome: RefCell::new(None),
            events: RefCell::new(Vec::new()),
        })
    }

    pub fn kind(&self) -> PageKind {
        self.kind
    }

    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    pub fn config(&self) -> &PageConfig {
        &self.config
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.borrow().clone()
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden.get()
    }

    pub fn delegate_state(&self) -> Option<DelegateState> {
        self.delegate.borrow().as_ref().map(HostDelegate::state)
    }

    pub fn is_detached(&self) -> bool {
        self.delegate
            .borrow()
            .as_ref()
            .map(HostDelegate::is_detached)
            .unwrap_or(false)
    }

    pub fn engine(&self) -> Option<EngineRef> {
        self.delegate.borrow().as_ref().and_then(HostDelegate::engine)
    }

    pub fn container(&self) -> Option<SplashContainer> {
        self.delegate
            .borrow()
            .as_ref()
            .and_then(HostDelegate::container)
    }

    /// Latest system chrome handed to the delegate.
    pub fn chrome(&self) -> Option<Rc<PlatformChrome>> {
        self.chrome.borrow().clone()
    }

    /// Create the delegate, attach, restore state and build the view.
    pub fn create(
        self: &Rc<Self>,
        saved: Option<&SavedState>,
    ) -> Result<SplashContainer, DelegateError> {
        let host: Rc<dyn Host> = self.clone();
        let mut delegate = HostDelegate::new(host, self.runtime.clone());
        delegate.attach()?;

        let container = match self.kind {
            PageKind::Activity => {
                delegate.restore_state(saved)?;
                delegate.create_view()?
            }
            PageKind::Fragment => {
                let container = delegate.create_view()?;
                delegate.restore_state(saved)?;
                container
            }
        };

        *self.delegate.borrow_mut() = Some(delegate);
        log::debug!("[PageHost] {} created", self.label());
        Ok(container)
    }

    pub fn start(&self) -> Result<(), DelegateError> {
        self.with_delegate("start", |delegate| {
            delegate.start()?;
            if delegate.is_detached() && self.kind == PageKind::Activity {
                delegate.reattach()?;
            }
            Ok(())
        })
    }

    pub fn resume(&self) -> Result<(), DelegateError> {
        match self.kind {
            PageKind::Activity => self.with_delegate("resume", HostDelegate::resume),
            PageKind::Fragment => self.reattach_if_needed("resume"),
        }
    }

    pub fn post_resume(&self) -> Result<(), DelegateError> {
        self.with_delegate("post_resume", HostDelegate::post_resume)
    }

    pub fn pause(&self) -> Result<(), DelegateError> {
        self.with_delegate("pause", HostDelegate::pause)
    }

    pub fn stop(&self) -> Result<(), DelegateError> {
        if self.is_hidden_fragment() || !self.still_attached_for_event("stop") {
            return Ok(());
        }
        self.with_delegate("stop", HostDelegate::stop)
    }

    /// Fragment visibility change. Showing an evicted fragment reattaches it.
    pub fn set_hidden(&self, hidden: bool) -> Result<(), DelegateError> {
        self.hidden.set(hidden);
        if self.kind == PageKind::Fragment {
            self.reattach_if_needed("set_hidden")?;
        }
        Ok(())
    }

    pub fn save(&self, out: &mut SavedState) -> Result<(), DelegateError> {
        if self.is_hidden_fragment() || !self.still_attached_for_event("save") {
            return Ok(());
        }
        self.with_delegate("save", |delegate| delegate.save_state(out))
    }

    /// Tear the delegate down and release it.
    pub fn destroy(&self) -> Result<(), DelegateError> {
        let Some(mut delegate) = self.delegate.borrow_mut().take() else {
            log::warn!("[PageHost] {} destroy: delegate already released", self.label());
            return Ok(());
        };
        self.destroyed.set(true);

        let torn_down = if delegate.is_detached() {
            delegate.teardown()
        } else {
            delegate.destroy_view().and_then(|_| delegate.teardown())
        };
        let released = delegate.release();
        torn_down.and(released)
    }

    pub fn back_pressed(&self) -> Result<(), DelegateError> {
        if self.is_hidden_fragment() || !self.still_attached_for_event("back_pressed") {
            return Ok(());
        }
        self.with_delegate("back_pressed", HostDelegate::back_pressed)
    }

    pub fn request_permissions_result(
        &self,
        request_code: i32,
        permissions: &[String],
        grant_results: &[i32],
    ) -> Result<bool, DelegateError> {
        if !self.still_attached_for_event("request_permissions_result") {
            return Ok(false);
        }
        self.with_delegate("request_permissions_result", |delegate| {
            delegate.request_permissions_result(request_code, permissions, grant_results)
        })
    }

    pub fn activity_result(
        &self,
        request_code: i32,
        result_code: i32,
        data: Option<&Intent>,
    ) -> Result<bool, DelegateError> {
        if !self.still_attached_for_event("activity_result") {
            return Ok(false);
        }
        self.with_delegate("activity_result", |delegate| {
            delegate.activity_result(request_code, result_code, data)
        })
    }

    pub fn new_intent(&self, intent: &Intent) -> Result<(), DelegateError> {
        if !self.still_attached_for_event("new_intent") {
            return Ok(());
        }
        self.with_delegate("new_intent", |delegate| delegate.new_intent(intent))
    }

    pub fn user_leave_hint(&self) -> Result<(), DelegateError> {
        if !self.still_attached_for_event("user_leave_hint") {
            return Ok(());
        }
        self.with_delegate("user_leave_hint", HostDelegate::user_leave_hint)
    }

    pub fn trim_memory(&self, level: i32) -> Result<(), DelegateError> {
        if !self.still_attached_for_event("trim_memory") {
            return Ok(());
        }
        self.with_delegate("trim_memory", |delegate| delegate.trim_memory(level))
    }

    pub fn low_memory(&self) -> Result<(), DelegateError> {
        if !self.still_attached_for_event("low_memory") {
            return Ok(());
        }
        self.with_delegate("low_memory", HostDelegate::low_memory)
    }

    /// False, with a log line, while this page's engine is held by another
    /// page.
    pub fn still_attached_for_event(&self, event: &str) -> bool {
        if self.is_detached() {
            log::debug!("[PageHost] {} {} dropped: detached from engine", self.label(), event);
            self.record(HostEvent::EventDropped {
                event: event.to_string(),
            });
            return false;
        }
        true
    }

    fn reattach_if_needed(&self, operation: &'static str) -> Result<(), DelegateError> {
        if self.hidden.get() {
            return Ok(());
        }
        self.with_delegate(operation, |delegate| {
            if delegate.is_detached() {
                delegate.reattach()
            } else {
                delegate.resume()
            }
        })
    }

    fn is_hidden_fragment(&self) -> bool {
        self.kind == PageKind::Fragment && self.hidden.get()
    }

    fn with_delegate<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut HostDelegate) -> Result<R, DelegateError>,
    ) -> Result<R, DelegateError> {
        let mut slot = self.delegate.borrow_mut();
        match slot.as_mut() {
            Some(delegate) => f(delegate),
            None => {
                let err = if self.destroyed.get() {
                    DelegateError::Released { operation }
                } else {
                    DelegateError::InvalidState {
                        operation,
                        state: DelegateState::Unattached,
                    }
                };
                log_delegate_error(&err, operation);
                Err(err)
            }
        }
    }

    fn record(&self, event: HostEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl Host for PageHost {
    fn label(&self) -> String {
        let kind = match self.kind {
            PageKind::Activity => "activity",
            PageKind::Fragment => "fragment",
        };
        format!("{}:{}", kind, self.page_id)
    }

    fn context(&self) -> HostContext {
        self.context.clone()
    }

    fn activity(&self) -> Option<Rc<dyn Activity>> {
        self.activity.clone()
    }

    fn lifecycle(&self) -> LifecycleHandle {
        LifecycleHandle::new(self.page_id.clone())
    }

    fn options(&self) -> HostOptions {
        let mut options = self.config.options.clone();
        if options.initial_route.is_none() {
            options.initial_route = self.config.route.clone();
        }
        options
    }

    fn provide_splash_screen(&self) -> Option<Rc<dyn SplashScreen>> {
        let splash = &self.runtime.config().splash;
        let argb = self
            .config
            .background_argb
            .unwrap_or(splash.default_background_argb);
        Some(Rc::new(ColorSplashScreen::new(argb, splash.color_transition())))
    }

    fn provide_system_chrome(
        &self,
        activity: Option<&Rc<dyn Activity>>,
        _engine: &EngineRef,
    ) -> Option<Rc<dyn SystemChrome>> {
        let chrome = Rc::new(PlatformChrome::new(activity?.name()));
        *self.chrome.borrow_mut() = Some(chrome.clone());
        Some(chrome)
    }

    fn configure_engine(&self, engine: &EngineRef) {
        self.record(HostEvent::EngineConfigured {
            engine: engine.id(),
        });
    }

    fn clean_up_engine(&self, engine: &EngineRef) {
        self.record(HostEvent::EngineCleanedUp {
            engine: engine.id(),
        });
    }

    fn on_surface_created(&self, _surface: &RenderSurface) {
        self.record(HostEvent::SurfaceCreated);
    }

    fn on_ui_displayed(&self) {
        self.record(HostEvent::UiDisplayed);
    }

    fn on_ui_no_longer_displayed(&self) {
        self.record(HostEvent::UiNoLongerDisplayed);
    }

    fn detach_from_engine(&self) {
        self.record(HostEvent::DetachedFromEngine);
        let Ok(mut slot) = self.delegate.try_borrow_mut() else {
            log::warn!("[PageHost] {} busy, cannot detach from engine", self.label());
            return;
        };
        match slot.as_mut() {
            Some(delegate) => {
                log::debug!("[PageHost] {} connection to engine evicted", self.label());
                if let Err(err) = delegate.detach_for_eviction() {
                    log_delegate_error(&err, "detach_from_engine");
                }
            }
            None => log::warn!("[PageHost] {} delegate has been released", self.label()),
        }
    }
}
