// Shared Engine Host - engine-sharing lifecycle delegate
// Lets activities and fragments share one long-lived engine, evict each other
// and reattach without restarting it

// Module declarations
pub mod config;
pub mod delegate;
pub mod engine;
pub mod error;
pub mod host;
pub mod runtime;
pub mod scheduler;
pub mod telemetry;
pub mod view;

// Re-exports for convenience
pub use config::EmbeddingConfig;
pub use delegate::{DelegateState, HostDelegate, SavedState};
pub use engine::{Engine, EngineCache, EngineId, EngineRef};
pub use error::{DelegateError, ErrorCategory, ErrorCode, RegistryError};
pub use host::{Host, HostOptions, PageHost, PageKind};
pub use runtime::EmbeddingRuntime;

use log::info;

/// Install the process-wide log subscriber.
///
/// Library code logs through `log`; the subscriber bridges those records into
/// `tracing`. Safe to call more than once, later calls are ignored.
pub fn init_logging() {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "android")] {
            use tracing_subscriber::layer::SubscriberExt;
            use tracing_subscriber::util::SubscriberInitExt;

            match tracing_android::layer("SharedEngineHost") {
                Ok(layer) => {
                    let _ = tracing_subscriber::registry().with(layer).try_init();
                }
                Err(err) => eprintln!("SharedEngineHost: logcat layer unavailable: {err}"),
            }
        } else {
            let _ = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}

/// JNI_OnLoad is called when the native library is loaded by Android
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn JNI_OnLoad(
    _vm: jni::JavaVM,
    _reserved: *mut std::ffi::c_void,
) -> jni::sys::jint {
    init_logging();

    info!("JNI_OnLoad called - logging initialized");

    jni::sys::JNI_VERSION_1_6
}

/// Log the effective configuration once at startup.
pub fn log_startup(config: &EmbeddingConfig) {
    info!(
        "Shared engine host ready: shared engine '{}', placeholder delay {} ms",
        config.engine.shared_engine_id, config.reattach.placeholder_removal_delay_ms
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
        log_startup(&EmbeddingConfig::default());
    }
}
