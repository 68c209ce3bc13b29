use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "FRAMESYNC_CONFIG_DIR";

/// Files whose presence in the working directory makes it the config dir
const LOCAL_FILES: [&str; 2] = ["framesync.json", "framesync.log"];

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var (FRAMESYNC_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Get path to a configuration file
///
/// Priority:
/// 1. CLI --config-dir argument
/// 2. FRAMESYNC_CONFIG_DIR environment variable
/// 3. Working directory IF framesync.json or framesync.log exist there
/// 4. Platform-specific config directory from dirs-next (default)
///
/// Platform paths:
/// - Linux: ~/.config/framesync/{name}
/// - macOS: ~/Library/Application Support/framesync/{name}
/// - Windows: %APPDATA%\framesync\{name}
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    config_dir(config).join(name)
}

/// Get path to a data file (logs), same priority as `config_file` but
/// falling back to the platform data directory
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    resolve(config, dirs_next::data_dir).join(name)
}

/// Create the config directory if missing
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let dir = config_dir(config);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    }
    Ok(())
}

fn has_local_config_files(dir: &Path) -> bool {
    LOCAL_FILES.iter().any(|f| dir.join(f).exists())
}

fn config_dir(config: &PathConfig) -> PathBuf {
    resolve(config, dirs_next::config_dir)
}

fn resolve(config: &PathConfig, platform_dir: fn() -> Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    if let Ok(current_dir) = std::env::current_dir() {
        if has_local_config_files(&current_dir) {
            return current_dir;
        }
    }

    if let Some(dir) = platform_dir() {
        return dir.join("framesync");
    }

    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_with_custom_dir() {
        let config = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };
        assert_eq!(
            config_file("framesync.json", &config),
            PathBuf::from("/custom/framesync.json")
        );
        assert_eq!(
            data_file("framesync.log", &config),
            PathBuf::from("/custom/framesync.log")
        );
    }

    #[test]
    fn test_cli_dir_beats_env() {
        let config = PathConfig::from_env_and_cli(Some(PathBuf::from("/from-cli")));
        assert_eq!(config.config_dir, Some(PathBuf::from("/from-cli")));
    }

    #[test]
    fn test_platform_default_mentions_app() {
        let path = config_file("test.json", &PathConfig::default());
        assert!(path.to_string_lossy().contains("test.json"));
    }

    #[test]
    fn test_local_files_detected() {
        let dir = std::env::temp_dir().join(format!("framesync_local_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        assert!(!has_local_config_files(&dir));

        std::fs::write(dir.join("framesync.json"), "{}").unwrap();
        assert!(has_local_config_files(&dir));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_ensure_dirs_creates_custom_dir() {
        let dir = std::env::temp_dir().join(format!("framesync_dirs_{}", uuid::Uuid::new_v4()));
        let config = PathConfig {
            config_dir: Some(dir.clone()),
        };
        ensure_dirs(&config).unwrap();
        assert!(dir.is_dir());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
