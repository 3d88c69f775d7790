//! Configuration for the shared engine embedding
//!
//! Timing constants for splash and placeholder transitions, engine defaults
//! and telemetry buffer sizes. Values can be overridden from a JSON file so
//! hosts can tune transitions without a rebuild.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Complete embedding configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub reattach: ReattachConfig,
    pub splash: SplashConfig,
    pub engine: EngineDefaults,
    pub telemetry: TelemetryConfig,
}

/// Reattach transition parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReattachConfig {
    /// Delay before the eviction placeholder is removed after a reattach,
    /// long enough for the live surface to cross-fade in
    pub placeholder_removal_delay_ms: u64,
}

impl Default for ReattachConfig {
    fn default() -> Self {
        Self {
            placeholder_removal_delay_ms: 1000,
        }
    }
}

/// Splash screen transition parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SplashConfig {
    /// Fade-out duration of a solid colour splash
    pub color_transition_ms: u64,
    /// Fade-out duration of a snapshot splash
    pub snapshot_transition_ms: u64,
    /// Background used by page hosts that do not pick a colour (ARGB)
    pub default_background_argb: u32,
}

impl Default for SplashConfig {
    fn default() -> Self {
        Self {
            color_transition_ms: 300,
            snapshot_transition_ms: 500,
            default_background_argb: 0xFFFF_FFFF,
        }
    }
}

/// Engine defaults applied when a host does not override them
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineDefaults {
    /// Entrypoint function executed by `start()`
    pub default_entrypoint: String,
    /// App bundle path returned by the default bundle locator
    pub default_app_bundle_path: String,
    /// Cache id under which the process-wide shared engine is registered
    pub shared_engine_id: String,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            default_entrypoint: "main".to_string(),
            default_app_bundle_path: "flutter_assets".to_string(),
            shared_engine_id: "io.flutter.shared".to_string(),
        }
    }
}

/// Telemetry collector sizing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    pub channel_capacity: usize,
    pub history_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            history_capacity: 64,
        }
    }
}

impl ReattachConfig {
    pub fn placeholder_removal_delay(&self) -> Duration {
        Duration::from_millis(self.placeholder_removal_delay_ms)
    }
}

impl SplashConfig {
    pub fn color_transition(&self) -> Duration {
        Duration::from_millis(self.color_transition_ms)
    }

    pub fn snapshot_transition(&self) -> Duration {
        Duration::from_millis(self.snapshot_transition_ms)
    }
}

impl EmbeddingConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or the defaults when the file is missing or
    /// is not valid JSON. Missing keys fall back to their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration on Android.
    ///
    /// Assets live inside the APK and are only reachable through the
    /// AssetManager, which the host passes to the engine, not to us.
    #[cfg(target_os = "android")]
    pub fn load() -> Self {
        log::info!("[Config] Using default embedding configuration on Android");
        Self::default()
    }

    /// Load configuration for non-Android platforms
    #[cfg(not(target_os = "android"))]
    pub fn load() -> Self {
        Self::load_from_file("assets/embedding_config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.reattach.placeholder_removal_delay_ms, 1000);
        assert_eq!(config.splash.color_transition_ms, 300);
        assert_eq!(config.splash.snapshot_transition_ms, 500);
        assert_eq!(config.engine.default_entrypoint, "main");
        assert_eq!(config.telemetry.history_capacity, 64);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{ "reattach": { "placeholder_removal_delay_ms": 250 } }"#;
        let config: EmbeddingConfig = serde_json::from_str(json).unwrap();

        assert_eq!(
            config.reattach.placeholder_removal_delay(),
            Duration::from_millis(250)
        );
        assert_eq!(config.splash, SplashConfig::default());
        assert_eq!(config.engine.shared_engine_id, "io.flutter.shared");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = EmbeddingConfig::load_from_file("does/not/exist.json");
        assert_eq!(config, EmbeddingConfig::default());
    }

    #[test]
    fn test_invalid_json_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!(
            "embedding_config_invalid_{}.json",
            std::process::id()
        ));
        fs::write(&path, "{ not json").unwrap();

        let config = EmbeddingConfig::load_from_file(&path);
        assert_eq!(config, EmbeddingConfig::default());

        let _ = fs::remove_file(&path);
    }
}
