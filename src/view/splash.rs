//! Splash screens and the container that swaps them with the live view.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::engine::{EngineRef, FrameSnapshot, ListenerId, UiDisplayListener};
use crate::host::HostContext;
use crate::scheduler::MainThreadHandler;
use crate::view::{EngineView, ViewId};

/// What a placeholder draws.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceholderVisual {
    Solid { argb: u32 },
    /// Frozen copy of the engine's last rendered frame.
    Frame(FrameSnapshot),
    /// Nothing was captured.
    Blank,
}

/// A static view shown instead of, or on top of, the live engine view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderView {
    id: ViewId,
    visual: PlaceholderVisual,
}

impl PlaceholderView {
    pub fn new(visual: PlaceholderVisual) -> Self {
        Self {
            id: ViewId::next(),
            visual,
        }
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn visual(&self) -> &PlaceholderVisual {
        &self.visual
    }
}

/// Provides the view shown until the engine paints its first frame.
pub trait SplashScreen {
    fn create_splash_view(&self, context: &HostContext) -> Option<PlaceholderView>;

    /// How long the splash stays after the first frame before it is removed.
    fn transition_duration(&self) -> Duration;
}

/// Solid colour splash. The same view is reused across calls.
pub struct ColorSplashScreen {
    argb: u32,
    duration: Duration,
    view: RefCell<Option<PlaceholderView>>,
}

impl ColorSplashScreen {
    pub fn new(argb: u32, duration: Duration) -> Self {
        Self {
            argb,
            duration,
            view: RefCell::new(None),
        }
    }
}

impl SplashScreen for ColorSplashScreen {
    fn create_splash_view(&self, _context: &HostContext) -> Option<PlaceholderView> {
        let view = self
            .view
            .borrow_mut()
            .get_or_insert_with(|| PlaceholderView::new(PlaceholderVisual::Solid { argb: self.argb }))
            .clone();
        Some(view)
    }

    fn transition_duration(&self) -> Duration {
        self.duration
    }
}

/// Splash built from the engine's output at the moment of capture.
pub struct SnapshotSplashScreen {
    frame: Option<FrameSnapshot>,
    duration: Duration,
}

impl SnapshotSplashScreen {
    pub fn capture(engine: &EngineRef, duration: Duration) -> Self {
        let frame = engine.capture_frame();
        if frame.is_none() {
            log::debug!("[SnapshotSplashScreen] {} has no frame to capture", engine.id());
        }
        Self { frame, duration }
    }

    pub fn has_frame(&self) -> bool {
        self.frame.is_some()
    }
}

impl SplashScreen for SnapshotSplashScreen {
    fn create_splash_view(&self, _context: &HostContext) -> Option<PlaceholderView> {
        let visual = match &self.frame {
            Some(frame) => PlaceholderVisual::Frame(frame.clone()),
            None => PlaceholderVisual::Blank,
        };
        Some(PlaceholderView::new(visual))
    }

    fn transition_duration(&self) -> Duration {
        self.duration
    }
}

/// A child of [`SplashContainer`], bottom to top in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildView {
    Engine(EngineView),
    Placeholder(PlaceholderView),
}

impl ChildView {
    pub fn id(&self) -> ViewId {
        match self {
            ChildView::Engine(view) => view.id(),
            ChildView::Placeholder(view) => view.id(),
        }
    }
}

struct ActiveSplash {
    view: ViewId,
    engine_view: EngineView,
    listener: ListenerId,
}

struct ContainerInner {
    id: ViewId,
    context: HostContext,
    handler: Rc<dyn MainThreadHandler>,
    children: RefCell<Vec<ChildView>>,
    engine_view: RefCell<Option<EngineView>>,
    splash: RefCell<Option<ActiveSplash>>,
}

impl ContainerInner {
    fn remove_child(&self, id: ViewId) -> bool {
        let mut children = self.children.borrow_mut();
        let before = children.len();
        children.retain(|child| child.id() != id);
        before != children.len()
    }

    fn finish_splash(&self, splash_view: ViewId) {
        let active = {
            let mut splash = self.splash.borrow_mut();
            match splash.as_ref() {
                Some(active) if active.view == splash_view => splash.take(),
                _ => None,
            }
        };
        if let Some(active) = active {
            active.engine_view.remove_ui_display_listener(active.listener);
            self.remove_child(active.view);
            log::debug!("[SplashContainer] {} splash {} removed", self.id, splash_view);
        }
    }
}

/// Waits for the first frame, then schedules the splash for removal.
struct SplashTransition {
    container: Weak<ContainerInner>,
    splash_view: ViewId,
    duration: Duration,
    fired: Cell<bool>,
}

impl UiDisplayListener for SplashTransition {
    fn on_ui_displayed(&self) {
        if self.fired.replace(true) {
            return;
        }
        let Some(container) = self.container.upgrade() else {
            return;
        };
        let weak = Rc::downgrade(&container);
        let splash_view = self.splash_view;
        container.handler.post_delayed(
            self.duration,
            Box::new(move || {
                if let Some(container) = weak.upgrade() {
                    container.finish_splash(splash_view);
                }
            }),
        );
    }

    fn on_ui_no_longer_displayed(&self) {}
}

/// Container that shows the live engine view, a transient splash, or a
/// frozen placeholder.
///
/// Cloning yields another handle to the same container.
#[derive(Clone)]
pub struct SplashContainer {
    inner: Rc<ContainerInner>,
}

impl SplashContainer {
    pub fn new(context: HostContext, handler: Rc<dyn MainThreadHandler>) -> Self {
        Self {
            inner: Rc::new(ContainerInner {
                id: ViewId::next(),
                context,
                handler,
                children: RefCell::new(Vec::new()),
                engine_view: RefCell::new(None),
                splash: RefCell::new(None),
            }),
        }
    }

    pub fn id(&self) -> ViewId {
        self.inner.id
    }

    /// Show `view`, covered by `splash` until it renders its first frame.
    ///
    /// Replaces the previously displayed engine view and its pending splash.
    /// Other children, such as an eviction placeholder, are left in place.
    pub fn display_engine_view_with_splash(
        &self,
        view: &EngineView,
        splash: Option<Rc<dyn SplashScreen>>,
    ) {
        let previous = self.inner.engine_view.borrow_mut().take();
        if let Some(previous) = previous {
            self.inner.remove_child(previous.id());
        }
        let pending = self.inner.splash.borrow().as_ref().map(|active| active.view);
        if let Some(pending) = pending {
            self.inner.finish_splash(pending);
        }

        self.inner
            .children
            .borrow_mut()
            .push(ChildView::Engine(view.clone()));
        *self.inner.engine_view.borrow_mut() = Some(view.clone());

        let Some(screen) = splash else {
            return;
        };
        if view.has_rendered_first_frame() {
            return;
        }
        let Some(splash_view) = screen.create_splash_view(&self.inner.context) else {
            return;
        };

        let transition = Rc::new(SplashTransition {
            container: Rc::downgrade(&self.inner),
            splash_view: splash_view.id(),
            duration: screen.transition_duration(),
            fired: Cell::new(false),
        });
        let listener = view.add_ui_display_listener(transition);
        *self.inner.splash.borrow_mut() = Some(ActiveSplash {
            view: splash_view.id(),
            engine_view: view.clone(),
            listener,
        });
        self.inner
            .children
            .borrow_mut()
            .push(ChildView::Placeholder(splash_view));
    }

    pub fn add_view(&self, child: ChildView) {
        self.inner.children.borrow_mut().push(child);
    }

    /// Remove the child with `id`. Returns false when it was not present.
    pub fn remove_view(&self, id: ViewId) -> bool {
        let mut engine_view = self.inner.engine_view.borrow_mut();
        if engine_view.as_ref().map(EngineView::id) == Some(id) {
            *engine_view = None;
        }
        drop(engine_view);
        self.inner.remove_child(id)
    }

    pub fn children(&self) -> Vec<ChildView> {
        self.inner.children.borrow().clone()
    }

    pub fn contains(&self, id: ViewId) -> bool {
        self.inner
            .children
            .borrow()
            .iter()
            .any(|child| child.id() == id)
    }

    pub fn engine_view(&self) -> Option<EngineView> {
        self.inner.engine_view.borrow().clone()
    }

    pub fn is_showing_engine_view(&self) -> bool {
        self.inner.engine_view.borrow().is_some()
    }

    /// The splash waiting for the first frame, if any.
    pub fn active_splash(&self) -> Option<ViewId> {
        self.inner.splash.borrow().as_ref().map(|active| active.view)
    }

    pub fn placeholders(&self) -> Vec<PlaceholderView> {
        self.inner
            .children
            .borrow()
            .iter()
            .filter_map(|child| match child {
                ChildView::Placeholder(view) => Some(view.clone()),
                ChildView::Engine(_) => None,
            })
            .collect()
    }
}

/// Weak handle used by delayed tasks that must not keep a container alive.
#[derive(Clone)]
pub(crate) struct WeakContainer(Weak<ContainerInner>);

impl WeakContainer {
    pub(crate) fn upgrade(&self) -> Option<SplashContainer> {
        self.0.upgrade().map(|inner| SplashContainer { inner })
    }
}

impl SplashContainer {
    pub(crate) fn downgrade(&self) -> WeakContainer {
        WeakContainer(Rc::downgrade(&self.inner))
    }
}
