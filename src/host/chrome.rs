//! System chrome (status bar, navigation bar) controller bound to an activity.

use std::cell::Cell;

/// Owns the window-level system UI on behalf of the engine.
pub trait SystemChrome {
    /// Re-apply the overlay style the framework last requested.
    fn update_system_ui_overlays(&self);

    fn destroy(&self);
}

/// Default controller: remembers how often it was asked to refresh.
#[derive(Debug, Default)]
pub struct PlatformChrome {
    activity: String,
    overlay_updates: Cell<u32>,
    destroyed: Cell<bool>,
}

impl PlatformChrome {
    pub fn new(activity: impl Into<String>) -> Self {
        Self {
            activity: activity.into(),
            ..Self::default()
        }
    }

    pub fn activity(&self) -> &str {
        &self.activity
    }

    pub fn overlay_updates(&self) -> u32 {
        self.overlay_updates.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }
}

impl SystemChrome for PlatformChrome {
    fn update_system_ui_overlays(&self) {
        if self.destroyed.get() {
            log::warn!("[PlatformChrome] overlay update after destroy ({})", self.activity);
            return;
        }
        self.overlay_updates.set(self.overlay_updates.get() + 1);
    }

    fn destroy(&self) {
        self.destroyed.set(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destroyed_chrome_ignores_updates() {
        let chrome = PlatformChrome::new("main");
        chrome.update_system_ui_overlays();
        chrome.destroy();
        chrome.update_system_ui_overlays();
        assert_eq!(chrome.overlay_updates(), 1);
        assert!(chrome.is_destroyed());
    }
}
