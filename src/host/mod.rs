//! Host side of the delegate contract.
//!
//! A host is a UI container (an activity or a fragment) that wants to show the
//! engine's output. The delegate only talks to it through [`Host`]; platform
//! adapters such as [`PageHost`] decide which of their callbacks map to which
//! delegate operation.

use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::engine::EngineRef;
use crate::view::{RenderMode, RenderSurface, SplashScreen, TransparencyMode};

pub mod chrome;
pub mod page;

pub use chrome::{PlatformChrome, SystemChrome};
pub use page::{HostEvent, PageConfig, PageHost, PageKind};

/// Application context handle passed to engine construction and splash views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostContext {
    name: String,
}

impl HostContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The owning activity, as far as the delegate needs to know it.
pub trait Activity {
    fn name(&self) -> String;

    /// True while the activity is being recreated for a configuration change.
    fn is_changing_configurations(&self) -> bool;
}

/// Plain [`Activity`] with a settable configuration-change flag.
#[derive(Debug)]
pub struct HostActivity {
    name: String,
    changing_configurations: Cell<bool>,
}

impl HostActivity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            changing_configurations: Cell::new(false),
        }
    }

    pub fn set_changing_configurations(&self, changing: bool) {
        self.changing_configurations.set(changing);
    }
}

impl Activity for HostActivity {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_changing_configurations(&self) -> bool {
        self.changing_configurations.get()
    }
}

/// Lifecycle notifier handed to plugins alongside the activity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LifecycleHandle {
    owner: String,
}

impl LifecycleHandle {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

/// Configuration a host declares to its delegate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostOptions {
    /// Pull the engine from the cache under this id instead of building one.
    pub cached_engine_id: Option<String>,
    /// Destroy the engine when this host is torn down.
    pub destroy_engine_with_host: bool,
    /// Wire the engine's activity-control-surface to the owning activity.
    pub attach_engine_to_activity: bool,
    /// Save and restore framework restoration data.
    pub restore_and_save_state: bool,
    pub render_mode: RenderMode,
    pub transparency_mode: TransparencyMode,
    /// Entrypoint function; the configured default when absent.
    pub entrypoint: Option<String>,
    /// Bundle path override; the runtime's bundle locator when absent.
    pub app_bundle_path: Option<String>,
    pub initial_route: Option<String>,
    pub shell_args: Vec<String>,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            cached_engine_id: None,
            destroy_engine_with_host: true,
            attach_engine_to_activity: true,
            restore_and_save_state: true,
            render_mode: RenderMode::Surface,
            transparency_mode: TransparencyMode::Opaque,
            entrypoint: None,
            app_bundle_path: None,
            initial_route: None,
            shell_args: Vec::new(),
        }
    }
}

impl HostOptions {
    /// Options for a host showing a pre-warmed engine owned by the cache.
    ///
    /// The cache keeps the engine alive and the engine already carries its
    /// own restoration state, so neither is managed by the host.
    pub fn cached(engine_id: impl Into<String>) -> Self {
        Self {
            cached_engine_id: Some(engine_id.into()),
            destroy_engine_with_host: false,
            restore_and_save_state: false,
            ..Self::default()
        }
    }
}

/// Capability set a UI container exposes to its [`crate::HostDelegate`].
///
/// Accessors are required. The hooks default to no-ops except
/// [`Host::detach_from_engine`], which every host must route to its
/// delegate's eviction path.
pub trait Host {
    /// Human-readable identity used in logs and telemetry.
    fn label(&self) -> String;
    fn context(&self) -> HostContext;
    fn activity(&self) -> Option<Rc<dyn Activity>>;
    fn lifecycle(&self) -> LifecycleHandle;
    fn options(&self) -> HostOptions;

    fn provide_splash_screen(&self) -> Option<Rc<dyn SplashScreen>> {
        None
    }

    fn provide_engine(&self, _context: &HostContext) -> Option<EngineRef> {
        None
    }

    fn provide_system_chrome(
        &self,
        _activity: Option<&Rc<dyn Activity>>,
        _engine: &EngineRef,
    ) -> Option<Rc<dyn SystemChrome>> {
        None
    }

    fn configure_engine(&self, _engine: &EngineRef) {}

    fn clean_up_engine(&self, _engine: &EngineRef) {}

    fn on_surface_created(&self, _surface: &RenderSurface) {}

    fn on_ui_displayed(&self) {}

    fn on_ui_no_longer_displayed(&self) {}

    /// Another host is claiming the shared engine; give it up.
    fn detach_from_engine(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_options_leave_engine_to_the_cache() {
        let options = HostOptions::cached("shared");
        assert_eq!(options.cached_engine_id.as_deref(), Some("shared"));
        assert!(!options.destroy_engine_with_host);
        assert!(!options.restore_and_save_state);
        assert!(options.attach_engine_to_activity);
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: HostOptions =
            serde_json::from_str(r#"{ "initial_route": "/", "render_mode": "texture" }"#)
                .unwrap();
        assert_eq!(options.initial_route.as_deref(), Some("/"));
        assert_eq!(options.render_mode, RenderMode::Texture);
        assert!(options.destroy_engine_with_host);
    }

    #[test]
    fn activity_reports_configuration_change() {
        let activity = HostActivity::new("main");
        assert!(!activity.is_changing_configurations());
        activity.set_changing_configurations(true);
        assert!(activity.is_changing_configurations());
        assert_eq!(activity.name(), "main");
    }
}
