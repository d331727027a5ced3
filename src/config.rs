//! Configuration for the sensor orchestrator.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory name used under the user's documents directory.
const ROOT_DIR_NAME: &str = "sensor-orchestrator";

/// Main configuration for the orchestrator.
///
/// Every path the controller needs is carried here explicitly; the controller
/// itself never looks at the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root directory handed to plugin factories
    pub root_dir: PathBuf,

    /// Directory under which recordings are written (`save_root/subdir/filename`)
    pub save_root: PathBuf,

    /// Directory scanned by external plugin discovery
    pub plugin_root: PathBuf,

    /// Path for storing activity statistics
    pub data_path: PathBuf,

    /// Participant identifier used when none is set at runtime
    #[serde(default)]
    pub participant_id: String,
}

impl Default for Config {
    fn default() -> Self {
        let root_dir = dirs::document_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(ROOT_DIR_NAME);

        Self::with_root(root_dir)
    }
}

impl Config {
    /// Build a configuration with every directory placed under `root_dir`.
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        let root_dir = root_dir.into();
        Self {
            save_root: root_dir.join("recordings"),
            plugin_root: root_dir.join("plugins"),
            data_path: root_dir.join("state"),
            root_dir,
            participant_id: String::new(),
        }
    }

    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(ROOT_DIR_NAME)
            .join("config.json")
    }

    /// Path of the persisted activity statistics.
    pub fn activity_path(&self) -> PathBuf {
        self.data_path.join("activity.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.save_root)?;
        std::fs::create_dir_all(&self.plugin_root)?;
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_root_layout() {
        let config = Config::with_root("/tmp/lab");
        assert_eq!(config.save_root, PathBuf::from("/tmp/lab/recordings"));
        assert_eq!(config.plugin_root, PathBuf::from("/tmp/lab/plugins"));
        assert_eq!(config.activity_path(), PathBuf::from("/tmp/lab/state/activity.json"));
        assert!(config.participant_id.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::with_root(dir.path());
        config.participant_id = "P07".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_ensure_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path().join("root"));
        config.ensure_directories().unwrap();

        assert!(config.save_root.is_dir());
        assert!(config.plugin_root.is_dir());
        assert!(config.data_path.is_dir());
    }
}
