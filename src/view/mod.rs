//! Rendering surface, engine view and the splash/placeholder container.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

mod splash;
mod surface;

pub use splash::{
    ChildView, ColorSplashScreen, PlaceholderView, PlaceholderVisual, SnapshotSplashScreen,
    SplashContainer, SplashScreen,
};
pub use surface::{EngineView, RenderSurface};

/// Which kind of surface the engine paints into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Back-buffered window surface.
    Surface,
    /// Texture composited by the platform view hierarchy.
    Texture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransparencyMode {
    Opaque,
    Transparent,
}

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a child view inside a [`SplashContainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(u64);

impl ViewId {
    pub fn next() -> Self {
        Self(NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ViewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "view#{}", self.0)
    }
}
