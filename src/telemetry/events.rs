//! Lifecycle event types describing what the delegates did with the shared
//! engine, exposed to the CLI and to host diagnostics streams.

use serde::{Deserialize, Serialize};

use crate::engine::EngineId;

/// Where `attach()` found the engine it bound.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngineSource {
    Cache,
    Host,
    Created,
}

/// Lifecycle transitions published by delegates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum LifecycleEvent {
    EngineResolved {
        host: String,
        engine: EngineId,
        source: EngineSource,
    },
    ActivityWired {
        host: String,
        engine: EngineId,
        activity: String,
    },
    HolderChanged {
        engine: EngineId,
        previous: Option<String>,
        current: String,
    },
    HostDetached {
        host: String,
        engine: EngineId,
    },
    HostReattached {
        host: String,
        engine: EngineId,
    },
    EntrypointExecuted {
        engine: EngineId,
        entrypoint: String,
        route: Option<String>,
        bundle_path: String,
    },
    EngineDestroyed {
        host: String,
        engine: EngineId,
        cache_id: Option<String>,
    },
    PlaceholderRemoved {
        host: String,
        view: u64,
    },
    ForwardingSkipped {
        host: String,
        operation: String,
    },
}

impl LifecycleEvent {
    /// Short name used in log lines and CLI tables.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::EngineResolved { .. } => "engine_resolved",
            LifecycleEvent::ActivityWired { .. } => "activity_wired",
            LifecycleEvent::HolderChanged { .. } => "holder_changed",
            LifecycleEvent::HostDetached { .. } => "host_detached",
            LifecycleEvent::HostReattached { .. } => "host_reattached",
            LifecycleEvent::EntrypointExecuted { .. } => "entrypoint_executed",
            LifecycleEvent::EngineDestroyed { .. } => "engine_destroyed",
            LifecycleEvent::PlaceholderRemoved { .. } => "placeholder_removed",
            LifecycleEvent::ForwardingSkipped { .. } => "forwarding_skipped",
        }
    }
}
