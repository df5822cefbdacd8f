use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::duplicate::{AutoDuplicatePolicy, ManualDuplicatePolicy};

/// Smallest notification cooldown we accept; anything lower would re-trigger
/// the popup gate while CAD software is still writing files.
pub const MIN_NOTIFY_COOLDOWN_SECS: u64 = 5;

/// Main configuration structure for labsentry
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Watch folder scanned for case projects
    pub watch_folder: String,

    /// CAM / Print destination folders
    #[serde(default)]
    pub targets: TargetConfig,

    /// Archiving behavior for destination folders
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Live notification settings
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Automatic sending settings
    #[serde(default)]
    pub auto_send: AutoSendConfig,

    /// Duplicate-file handling policies
    #[serde(default)]
    pub duplicates: DuplicateConfig,

    /// Scanner settings
    #[serde(default)]
    pub scan: ScanConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Destination folder configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TargetConfig {
    /// Destination for CAM machining files (info + *cad.stl)
    #[serde(default)]
    pub cam: String,

    /// Destination for 3D printing files (*model*.stl)
    #[serde(default)]
    pub print: String,
}

/// Archiving configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ArchiveConfig {
    /// Move stale destination-root files into YYYY/MM/DD subfolders
    /// before each send (at most once per day per destination)
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Live notification configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotifyConfig {
    /// Surface a notification event when a watched project changes
    #[serde(default = "default_true")]
    pub live_enabled: bool,

    /// Per-folder cooldown between notifications, in seconds
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

/// Automatic sending configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AutoSendConfig {
    /// Send ready file bundles automatically on change, once per
    /// project per day
    #[serde(default)]
    pub enabled: bool,
}

/// Duplicate-file handling configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DuplicateConfig {
    /// Policy for manual sends
    #[serde(default)]
    pub manual: ManualDuplicatePolicy,

    /// Policy for automatic sends
    #[serde(default)]
    pub automatic: AutoDuplicatePolicy,
}

/// Scanner configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ScanConfig {
    /// Maximum folder depth below the watch folder to descend into
    /// (0 = unlimited)
    #[serde(default)]
    pub max_depth: usize,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_cooldown() -> u64 {
    45
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            live_enabled: default_true(),
            cooldown_secs: default_cooldown(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_folder: String::new(),
            targets: TargetConfig::default(),
            archive: ArchiveConfig::default(),
            notify: NotifyConfig::default(),
            auto_send: AutoSendConfig::default(),
            duplicates: DuplicateConfig::default(),
            scan: ScanConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let config = Self::default();

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }

            config.save(&config_path)?;

            tracing::info!("Created default configuration at: {:?}", config_path);
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("labsentry").join("config.yml"))
    }

    /// Directory holding persisted runtime state (auto-send log, archive gate)
    pub fn state_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().context("Failed to get user data directory")?;

        Ok(data_dir.join("labsentry"))
    }

    /// Expand environment variables in configured folder paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.watch_folder = shellexpand::full(&self.watch_folder)
            .context("Failed to expand watch_folder path")?
            .into_owned();

        self.targets.cam = shellexpand::full(&self.targets.cam)
            .context("Failed to expand CAM target path")?
            .into_owned();

        self.targets.print = shellexpand::full(&self.targets.print)
            .context("Failed to expand Print target path")?
            .into_owned();

        Ok(())
    }

    /// CAM destination, if configured
    pub fn cam_target(&self) -> Option<&str> {
        if self.targets.cam.is_empty() {
            None
        } else {
            Some(&self.targets.cam)
        }
    }

    /// Print destination, if configured
    pub fn print_target(&self) -> Option<&str> {
        if self.targets.print.is_empty() {
            None
        } else {
            Some(&self.targets.print)
        }
    }

    /// Notification cooldown with the enforced minimum applied
    pub fn effective_cooldown_secs(&self) -> u64 {
        self.notify.cooldown_secs.max(MIN_NOTIFY_COOLDOWN_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert!(config.watch_folder.is_empty());
        assert!(config.targets.cam.is_empty());
        assert!(config.archive.enabled);
        assert!(config.notify.live_enabled);
        assert_eq!(config.notify.cooldown_secs, 45);
        assert!(!config.auto_send.enabled);
        assert_eq!(config.duplicates.manual, ManualDuplicatePolicy::Ask);
        assert_eq!(
            config.duplicates.automatic,
            AutoDuplicatePolicy::UseManualPolicy
        );
        assert_eq!(config.scan.max_depth, 0);
    }

    #[test]
    fn test_cooldown_minimum_enforced() {
        let mut config = Config::default();
        config.notify.cooldown_secs = 1;
        assert_eq!(config.effective_cooldown_secs(), MIN_NOTIFY_COOLDOWN_SECS);

        config.notify.cooldown_secs = 120;
        assert_eq!(config.effective_cooldown_secs(), 120);
    }

    #[test]
    fn test_target_accessors() {
        let mut config = Config::default();
        assert!(config.cam_target().is_none());
        assert!(config.print_target().is_none());

        config.targets.cam = "/srv/cam".to_string();
        assert_eq!(config.cam_target(), Some("/srv/cam"));
    }

    #[test]
    #[serial_test::serial]
    fn test_expand_paths() {
        std::env::set_var("TEST_LABSENTRY_ROOT", "/test/lab");

        let mut config = Config::default();
        config.watch_folder = "${TEST_LABSENTRY_ROOT}/watch".to_string();
        config.targets.cam = "${TEST_LABSENTRY_ROOT}/cam".to_string();

        config.expand_paths().expect("Failed to expand paths");

        assert_eq!(config.watch_folder, "/test/lab/watch");
        assert_eq!(config.targets.cam, "/test/lab/cam");

        std::env::remove_var("TEST_LABSENTRY_ROOT");
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        let nonexistent_path = Path::new("/nonexistent/path/config.yml");
        let result = Config::load(nonexistent_path);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.yml");

        let mut config = Config::default();
        config.watch_folder = "/lab/incoming".to_string();
        config.targets.cam = "/lab/cam".to_string();
        config.targets.print = "/lab/print".to_string();
        config.notify.cooldown_secs = 90;
        config.duplicates.manual = ManualDuplicatePolicy::Overwrite;
        config.scan.max_depth = 3;

        config.save(&config_path).expect("Failed to save config");

        let loaded = Config::load(&config_path).expect("Failed to load config");

        assert_eq!(loaded.watch_folder, "/lab/incoming");
        assert_eq!(loaded.targets.cam, "/lab/cam");
        assert_eq!(loaded.targets.print, "/lab/print");
        assert_eq!(loaded.notify.cooldown_secs, 90);
        assert_eq!(loaded.duplicates.manual, ManualDuplicatePolicy::Overwrite);
        assert_eq!(loaded.scan.max_depth, 3);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml_content = r#"
watch_folder: "/lab/incoming"
targets:
  cam: "/lab/cam"
  print: "/lab/print"
archive:
  enabled: false
notify:
  live_enabled: true
  cooldown_secs: 60
auto_send:
  enabled: true
duplicates:
  manual: "skip"
  automatic: "overwrite"
scan:
  max_depth: 2
logging:
  level: "debug"
"#;

        let config: Config = serde_yaml::from_str(yaml_content).expect("Failed to parse YAML");

        assert_eq!(config.watch_folder, "/lab/incoming");
        assert!(!config.archive.enabled);
        assert_eq!(config.notify.cooldown_secs, 60);
        assert!(config.auto_send.enabled);
        assert_eq!(config.duplicates.manual, ManualDuplicatePolicy::Skip);
        assert_eq!(config.duplicates.automatic, AutoDuplicatePolicy::Overwrite);
        assert_eq!(config.scan.max_depth, 2);
        assert_eq!(config.logging.level, "debug");
    }
}
