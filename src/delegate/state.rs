use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::PluginState;

/// Where a delegate is in its lifecycle.
///
/// `Unattached -> Attached -> (Detached <-> Attached) -> TornDown -> Released`.
/// `TornDown` is the host-teardown state that only allows `release()`;
/// `Released` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegateState {
    Unattached,
    Attached,
    Detached,
    TornDown,
    Released,
}

impl DelegateState {
    /// True while the delegate holds an engine and has not been torn down.
    pub fn is_bound(self) -> bool {
        matches!(self, DelegateState::Attached | DelegateState::Detached)
    }
}

impl fmt::Display for DelegateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DelegateState::Unattached => "UNATTACHED",
            DelegateState::Attached => "ATTACHED",
            DelegateState::Detached => "DETACHED",
            DelegateState::TornDown => "TORN_DOWN",
            DelegateState::Released => "RELEASED",
        };
        f.write_str(name)
    }
}

/// Instance state a host persists across process death.
///
/// `framework` is the engine's restoration blob, `plugins` the nested state
/// collected through the activity-control-surface. Each is only written
/// when the host opts into the matching behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedState {
    #[serde(default)]
    pub framework: Option<Vec<u8>>,
    #[serde(default)]
    pub plugins: Option<PluginState>,
}

impl SavedState {
    pub fn new() -> Self {
        Self::default()
    }
}
