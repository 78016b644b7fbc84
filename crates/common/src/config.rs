//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory where finished exports are written.
    pub exports_dir: PathBuf,

    /// Default export settings.
    pub export: ExportDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDefaults {
    /// Keyframe cadence in frames.
    pub keyframe_interval: u32,

    /// Idle window before the stall watchdog fires (milliseconds).
    pub stall_timeout_ms: u64,

    /// Absolute ceiling for a whole export (milliseconds).
    pub global_timeout_ms: u64,

    /// How often progress is reported during encoding (frames).
    pub progress_interval_frames: u32,

    /// Target video bitrate in kbit/s.
    pub bitrate_kbps: u32,

    /// Optional output height cap; source resolution is kept when unset.
    pub max_height: Option<u32>,

    /// Whether to carry the source clip's audio track into the export.
    pub preserve_audio: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "traceburn=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exports_dir: dirs_default_exports(),
            export: ExportDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            keyframe_interval: 30,
            stall_timeout_ms: 10_000,
            global_timeout_ms: 300_000,
            progress_interval_frames: 10,
            bitrate_kbps: 8_000,
            max_height: None,
            preserve_audio: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("traceburn").join("config.json")
}

/// Default exports directory.
fn dirs_default_exports() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("traceburn").join("exports")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_watchdog_windows() {
        let defaults = ExportDefaults::default();
        assert_eq!(defaults.stall_timeout_ms, 10_000);
        assert_eq!(defaults.global_timeout_ms, 300_000);
        assert_eq!(defaults.keyframe_interval, 30);
        assert_eq!(defaults.progress_interval_frames, 10);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.export.keyframe_interval, 30);
        assert_eq!(parsed.logging.level, "info");
    }
}
