//! Engine contract and engine registry.
//!
//! The engine is the long-lived, expensive rendering/execution resource that
//! hosts share. This crate never renders or executes anything itself; it only
//! sequences the engine through the [`Engine`] trait. `HeadlessEngine` is an
//! in-process implementation that records every call, used by tests and the
//! CLI and as the default product of [`HeadlessEngineFactory`].

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::host::{Activity, HostContext, LifecycleHandle};
use crate::view::RenderSurface;

pub mod cache;
pub mod headless;

pub use cache::EngineCache;
pub use headless::{EngineCall, HeadlessEngine, HeadlessEngineFactory};

/// Shared handle to an engine. Engines are single-threaded and reference counted.
pub type EngineRef = Rc<dyn Engine>;

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique engine identity, used to key holder slots and in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineId(u64);

impl EngineId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Allocate the next unused id.
    pub fn next() -> Self {
        Self(NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// Application lifecycle phase pushed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppLifecyclePhase {
    Resumed,
    Inactive,
    Paused,
    Detached,
}

/// Bundle path plus the function to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DartEntrypoint {
    pub bundle_path: String,
    pub function_name: String,
}

impl DartEntrypoint {
    pub fn new(bundle_path: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self {
            bundle_path: bundle_path.into(),
            function_name: function_name.into(),
        }
    }
}

/// Parameters for constructing a fresh engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineRequest {
    pub shell_args: Vec<String>,
    pub automatically_register_plugins: bool,
    pub will_provide_restoration_data: bool,
}

/// Nested plugin state saved through the activity-control-surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginState(pub BTreeMap<String, Vec<u8>>);

impl PluginState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Minimal intent payload forwarded to plugins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub action: Option<String>,
    pub data: Option<String>,
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
}

impl Intent {
    pub fn with_action(action: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
            ..Self::default()
        }
    }
}

/// Last rendered output of an engine, used for eviction placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSnapshot {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl FrameSnapshot {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }
}

/// Token returned when subscribing to first-frame notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// Receives "engine UI is now (no longer) on screen" notifications.
pub trait UiDisplayListener {
    fn on_ui_displayed(&self);
    fn on_ui_no_longer_displayed(&self);
}

/// Trim level at which the framework is also sent a memory-pressure warning.
pub const TRIM_MEMORY_RUNNING_LOW: i32 = 10;

/// The engine contract consumed by the delegate.
///
/// Methods are grouped the way the engine exposes its channels: lifecycle,
/// execution and navigation, restoration, the activity-control-surface that
/// plugins see, system notifications, and the renderer.
pub trait Engine {
    fn id(&self) -> EngineId;

    // Lifecycle channel
    fn push_lifecycle_phase(&self, phase: AppLifecyclePhase);

    // Execution and navigation
    fn is_executing(&self) -> bool;
    fn set_initial_route(&self, route: &str);
    fn execute_entrypoint(&self, entrypoint: DartEntrypoint);
    fn pop_route(&self);

    // Restoration channel
    fn restoration_data(&self) -> Option<Vec<u8>>;
    fn set_restoration_data(&self, data: Option<Vec<u8>>);

    // Activity-control-surface
    fn attach_to_activity(&self, activity: &Rc<dyn Activity>, lifecycle: &LifecycleHandle);
    fn detach_from_activity(&self);
    fn detach_from_activity_for_config_changes(&self);
    fn save_plugin_state(&self, out: &mut PluginState);
    fn restore_plugin_state(&self, state: Option<&PluginState>);
    fn on_request_permissions_result(
        &self,
        request_code: i32,
        permissions: &[String],
        grant_results: &[i32],
    ) -> bool;
    fn on_activity_result(&self, request_code: i32, result_code: i32, data: Option<&Intent>) -> bool;
    fn on_new_intent(&self, intent: &Intent);
    fn on_user_leave_hint(&self);

    // System notifications
    fn notify_low_memory_warning(&self);
    fn send_memory_pressure_warning(&self);

    // Renderer
    fn attach_surface(&self, surface: &RenderSurface);
    fn detach_surface(&self);
    fn add_ui_display_listener(&self, listener: Rc<dyn UiDisplayListener>) -> ListenerId;
    fn remove_ui_display_listener(&self, id: ListenerId);
    fn capture_frame(&self) -> Option<FrameSnapshot>;

    fn destroy(&self);
}

/// Builds a brand-new engine when the host neither names a cached engine nor
/// supplies one.
pub trait EngineFactory {
    fn create_engine(&self, context: &HostContext, request: EngineRequest) -> EngineRef;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_ids_are_unique_and_display() {
        let a = EngineId::next();
        let b = EngineId::next();
        assert_ne!(a, b);
        assert_eq!(EngineId::new(3).to_string(), "engine#3");
    }

    #[test]
    fn plugin_state_lookup() {
        let mut state = PluginState::new();
        assert!(state.is_empty());
        state.insert("camera", vec![1, 2]);
        assert_eq!(state.get("camera"), Some(&[1u8, 2][..]));
        assert_eq!(state.get("maps"), None);
    }
}
