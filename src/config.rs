//! Player tuning, persisted as `framesync.json`.
//!
//! Every field has a default, so partial files (or none at all) are valid.

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "framesync.json";

/// Sync loop bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Correction attempts before accepting the best-effort position
    pub max_iterations: u32,
    /// Nudge distance as a fraction of one frame duration
    pub nudge_fraction: f64,
    /// Allowed lag of a rendered frame behind its boundary (fractional
    /// non-drop rates), percent of a frame
    pub frame_tolerance_pct: f64,
    /// How long to wait for a presented frame after a seek
    pub sample_wait_ms: u64,
    /// Pause before each nudge
    pub settle_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            nudge_fraction: 0.1,
            frame_tolerance_pct: 20.0,
            sample_wait_ms: 100,
            settle_delay_ms: 16,
        }
    }
}

impl SyncConfig {
    pub fn sample_wait(&self) -> Duration {
        Duration::from_millis(self.sample_wait_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub sync: SyncConfig,
    /// Outer bound on waiting for the runtime to acknowledge a rate change
    pub rate_change_timeout_ms: u64,
    /// Land on a frame boundary when pausing mid-frame
    pub sync_on_pause: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            rate_change_timeout_ms: 60_000,
            sync_on_pause: true,
        }
    }
}

impl PlayerConfig {
    pub fn rate_change_timeout(&self) -> Duration {
        Duration::from_millis(self.rate_change_timeout_ms)
    }

    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: PlayerConfig = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        info!("Config loaded from {}", path.display());
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_json(path)
        } else {
            info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        info!("Config saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: PlayerConfig =
            serde_json::from_str(r#"{"sync": {"max_iterations": 3}, "sync_on_pause": false}"#)
                .unwrap();
        assert_eq!(config.sync.max_iterations, 3);
        assert_eq!(config.sync.nudge_fraction, 0.1);
        assert!(!config.sync_on_pause);
        assert_eq!(config.rate_change_timeout_ms, 60_000);
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("framesync_cfg_{}", uuid::Uuid::new_v4()));
        let path = dir.join(CONFIG_FILE_NAME);

        let config = PlayerConfig {
            rate_change_timeout_ms: 250,
            ..PlayerConfig::default()
        };
        config.to_json(&path).unwrap();
        assert_eq!(PlayerConfig::from_json(&path).unwrap(), config);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("framesync_missing_dir/none.json");
        assert_eq!(PlayerConfig::load_or_default(&path).unwrap(), PlayerConfig::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("framesync_bad_{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "{ not json").unwrap();
        let err = PlayerConfig::from_json(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
        let _ = std::fs::remove_file(&path);
    }
}
