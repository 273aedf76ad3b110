//! Layered configuration.
//!
//! Defaults, then an optional TOML file, then `STORY_VIEWER_*` environment
//! variables (`__` separates nested keys, e.g.
//! `STORY_VIEWER_ENGINE__TICK_INTERVAL_MS=50`).

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "STORY_VIEWER";
pub const DEFAULT_CONFIG_FILE: &str = "story-viewer.toml";

/// How the engine moves between items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvanceMode {
    /// Stories: items advance when their timer runs out.
    Auto,
    /// Reels: only explicit navigation changes the active item.
    Manual,
}

/// Timing and device policy for one playback session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_ms: u64,
    /// Upper bound on any video's display time.
    pub max_video_duration_ms: u64,
    /// How long to wait for a loaded video to report its duration.
    pub duration_grace_ms: u64,
    pub load_timeout_ms: u64,
    /// Used for image/text items that carry no duration of their own.
    pub default_display_ms: u64,
    pub advance: AdvanceMode,
    pub prefetch_ahead: usize,
    pub initial_volume: f32,
    pub start_muted: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            max_video_duration_ms: 15_000,
            duration_grace_ms: 3_000,
            load_timeout_ms: 10_000,
            default_display_ms: 5_000,
            advance: AdvanceMode::Auto,
            prefetch_ahead: 1,
            initial_volume: 1.0,
            start_muted: false,
        }
    }
}

impl EngineConfig {
    /// Manual-advance configuration for a reels strip.
    pub fn reels() -> Self {
        Self {
            advance: AdvanceMode::Manual,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(EngineError::Settings("tick_interval_ms must be > 0".into()));
        }
        if self.max_video_duration_ms == 0 {
            return Err(EngineError::Settings(
                "max_video_duration_ms must be > 0".into(),
            ));
        }
        if self.default_display_ms == 0 {
            return Err(EngineError::Settings("default_display_ms must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(EngineError::Settings(format!(
                "initial_volume {} is outside 0.0..=1.0",
                self.initial_volume
            )));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn max_video_duration(&self) -> Duration {
        Duration::from_millis(self.max_video_duration_ms)
    }

    pub fn duration_grace(&self) -> Duration {
        Duration::from_millis(self.duration_grace_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn default_display(&self) -> Duration {
        Duration::from_millis(self.default_display_ms)
    }
}

/// Settings for the `story-viewer` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_url: String,
    pub token: Option<String>,
    /// Local JSON list of items; takes precedence over the API.
    pub playlist: Option<PathBuf>,
    /// Generate this many random items instead of loading a playlist.
    pub demo_items: Option<usize>,
    pub start_index: usize,
    pub engine: EngineConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8090".into(),
            token: None,
            playlist: None,
            demo_items: None,
            start_index: 0,
            engine: EngineConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (if it exists) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        let settings: Settings = ::config::Config::builder()
            .add_source(::config::File::with_name(&file).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| EngineError::Settings(e.to_string()))?;

        settings.engine.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.max_video_duration(), Duration::from_millis(15_000));
        assert_eq!(config.advance, AdvanceMode::Auto);
        assert_eq!(EngineConfig::reels().advance, AdvanceMode::Manual);
    }

    #[test]
    fn rejects_bad_values() {
        let config = EngineConfig {
            tick_interval_ms: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            initial_volume: 1.5,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let toml = r#"
            api_url = "https://stories.example.com"

            [engine]
            advance = "manual"
            tick_interval_ms = 50
        "#;

        let settings: Settings = ::config::Config::builder()
            .add_source(::config::File::from_str(toml, ::config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.api_url, "https://stories.example.com");
        assert_eq!(settings.engine.advance, AdvanceMode::Manual);
        assert_eq!(settings.engine.tick_interval_ms, 50);
        assert_eq!(settings.engine.max_video_duration_ms, 15_000);
        assert_eq!(settings.start_index, 0);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = Settings::load(Some(Path::new("does-not-exist.toml"))).unwrap();
        assert_eq!(settings.engine.default_display_ms, 5_000);
    }
}
