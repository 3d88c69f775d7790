use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::engine::{EngineId, EngineRef, ListenerId, UiDisplayListener};
use crate::view::{RenderMode, TransparencyMode, ViewId};

/// Drawable sink the engine paints into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderSurface {
    BackBuffered { transparent: bool },
    TextureBacked,
}

impl RenderSurface {
    /// Surface matching a host's declared render and transparency modes.
    ///
    /// Texture rendering composites through the view hierarchy, so its
    /// transparency is handled by the platform and not by the surface.
    pub fn for_modes(render_mode: RenderMode, transparency: TransparencyMode) -> Self {
        match render_mode {
            RenderMode::Surface => RenderSurface::BackBuffered {
                transparent: transparency == TransparencyMode::Transparent,
            },
            RenderMode::Texture => RenderSurface::TextureBacked,
        }
    }
}

struct EngineBinding {
    engine: EngineRef,
    forwarder: ListenerId,
}

struct EngineViewInner {
    id: ViewId,
    surface: RenderSurface,
    binding: RefCell<Option<EngineBinding>>,
    listeners: RefCell<Vec<(ListenerId, Rc<dyn UiDisplayListener>)>>,
    next_listener: Cell<u64>,
    first_frame_rendered: Cell<bool>,
}

impl EngineViewInner {
    fn listener_snapshot(&self) -> Vec<Rc<dyn UiDisplayListener>> {
        self.listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect()
    }
}

/// Relays the engine's display notifications to the view's own listeners.
struct DisplayForwarder {
    view: Weak<EngineViewInner>,
}

impl UiDisplayListener for DisplayForwarder {
    fn on_ui_displayed(&self) {
        if let Some(view) = self.view.upgrade() {
            view.first_frame_rendered.set(true);
            for listener in view.listener_snapshot() {
                listener.on_ui_displayed();
            }
        }
    }

    fn on_ui_no_longer_displayed(&self) {
        if let Some(view) = self.view.upgrade() {
            for listener in view.listener_snapshot() {
                listener.on_ui_no_longer_displayed();
            }
        }
    }
}

/// The live rendering view: one surface that can be bound to one engine.
///
/// Cloning yields another handle to the same view.
#[derive(Clone)]
pub struct EngineView {
    inner: Rc<EngineViewInner>,
}

impl EngineView {
    pub fn new(surface: RenderSurface) -> Self {
        Self {
            inner: Rc::new(EngineViewInner {
                id: ViewId::next(),
                surface,
                binding: RefCell::new(None),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(1),
                first_frame_rendered: Cell::new(false),
            }),
        }
    }

    pub fn id(&self) -> ViewId {
        self.inner.id
    }

    pub fn surface(&self) -> &RenderSurface {
        &self.inner.surface
    }

    pub fn is_attached(&self) -> bool {
        self.inner.binding.borrow().is_some()
    }

    pub fn attached_engine(&self) -> Option<EngineId> {
        self.inner
            .binding
            .borrow()
            .as_ref()
            .map(|binding| binding.engine.id())
    }

    /// True once the bound engine presented a frame on this view's surface.
    pub fn has_rendered_first_frame(&self) -> bool {
        self.inner.first_frame_rendered.get()
    }

    /// Bind the surface to `engine`, unbinding any previous engine first.
    pub fn attach_to_engine(&self, engine: &EngineRef) {
        if self.attached_engine() == Some(engine.id()) {
            log::debug!("[EngineView] {} already attached to {}", self.id(), engine.id());
            return;
        }
        if self.is_attached() {
            self.detach_from_engine();
        }

        engine.attach_surface(&self.inner.surface);
        let forwarder = engine.add_ui_display_listener(Rc::new(DisplayForwarder {
            view: Rc::downgrade(&self.inner),
        }));
        *self.inner.binding.borrow_mut() = Some(EngineBinding {
            engine: Rc::clone(engine),
            forwarder,
        });
        log::debug!("[EngineView] {} attached to {}", self.id(), engine.id());
    }

    /// Unbind from the engine. Listeners see a final "no longer displayed".
    pub fn detach_from_engine(&self) {
        let Some(binding) = self.inner.binding.borrow_mut().take() else {
            return;
        };
        binding.engine.detach_surface();
        binding.engine.remove_ui_display_listener(binding.forwarder);
        self.inner.first_frame_rendered.set(false);
        log::debug!("[EngineView] {} detached from {}", self.id(), binding.engine.id());
    }

    pub fn add_ui_display_listener(&self, listener: Rc<dyn UiDisplayListener>) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.get());
        self.inner.next_listener.set(id.0 + 1);
        self.inner.listeners.borrow_mut().push((id, listener));
        id
    }

    pub fn remove_ui_display_listener(&self, id: ListenerId) {
        self.inner
            .listeners
            .borrow_mut()
            .retain(|(registered, _)| *registered != id);
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }
}

impl fmt::Debug for EngineView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineView")
            .field("id", &self.inner.id)
            .field("surface", &self.inner.surface)
            .field("engine", &self.attached_engine())
            .finish()
    }
}

impl PartialEq for EngineView {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, FrameSnapshot, HeadlessEngine};

    #[derive(Default)]
    struct Flags {
        shown: Cell<u32>,
        hidden: Cell<u32>,
    }

    impl UiDisplayListener for Flags {
        fn on_ui_displayed(&self) {
            self.shown.set(self.shown.get() + 1);
        }

        fn on_ui_no_longer_displayed(&self) {
            self.hidden.set(self.hidden.get() + 1);
        }
    }

    #[test]
    fn surface_follows_modes() {
        assert_eq!(
            RenderSurface::for_modes(RenderMode::Surface, TransparencyMode::Transparent),
            RenderSurface::BackBuffered { transparent: true }
        );
        assert_eq!(
            RenderSurface::for_modes(RenderMode::Texture, TransparencyMode::Transparent),
            RenderSurface::TextureBacked
        );
    }

    #[test]
    fn view_forwards_engine_display_notifications() {
        let headless = Rc::new(HeadlessEngine::new());
        let engine: EngineRef = headless.clone();
        let view = EngineView::new(RenderSurface::TextureBacked);
        let flags = Rc::new(Flags::default());
        view.add_ui_display_listener(flags.clone());

        view.attach_to_engine(&engine);
        assert_eq!(headless.surface(), Some(RenderSurface::TextureBacked));
        headless.render_frame(FrameSnapshot::new(1, 1, vec![0; 4]));
        assert!(view.has_rendered_first_frame());
        assert_eq!(flags.shown.get(), 1);

        view.detach_from_engine();
        assert_eq!(flags.hidden.get(), 1);
        assert!(!view.has_rendered_first_frame());
        assert_eq!(headless.listener_count(), 0);
        assert!(headless.surface().is_none());
    }

    #[test]
    fn reattaching_same_engine_is_a_no_op() {
        let headless = Rc::new(HeadlessEngine::new());
        let engine: EngineRef = headless.clone();
        let view = EngineView::new(RenderSurface::TextureBacked);

        view.attach_to_engine(&engine);
        view.attach_to_engine(&engine);
        assert_eq!(headless.listener_count(), 1);
        assert_eq!(view.attached_engine(), Some(engine.id()));
    }
}
