//! DailyRead configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DailyReadError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyReadConfig {
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
}

impl DailyReadConfig {
    /// Load config from the default path (~/.dailyread/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DailyReadError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| DailyReadError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| DailyReadError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the DailyRead home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dailyread")
    }
}

/// What a delivered reminder looks like.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_message")]
    pub default_message: String,
    #[serde(default = "default_time")]
    pub default_time: String,
    /// Dedup tag: a delivery with the same tag replaces the previous one.
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default = "default_target_route")]
    pub target_route: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_vibrate")]
    pub vibrate: Vec<u32>,
}

fn default_title() -> String { "Daily reading reminder".into() }
fn default_message() -> String { "Time for today's reading! 📖".into() }
fn default_time() -> String { "09:00".into() }
fn default_tag() -> String { "daily-reading".into() }
fn default_target_route() -> String { "/dashboard".into() }
fn default_icon() -> String { "/icon-192x192.png".into() }
fn default_vibrate() -> Vec<u32> { vec![200, 100, 200, 100, 200] }

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            default_message: default_message(),
            default_time: default_time(),
            tag: default_tag(),
            target_route: default_target_route(),
            icon: default_icon(),
            vibrate: default_vibrate(),
        }
    }
}

/// Background agent registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_script")]
    pub script: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Upper bound on waiting for the agent to reach the activated stage.
    #[serde(default = "default_activation_timeout")]
    pub activation_timeout_secs: u64,
}

fn default_script() -> String { "/sw.js".into() }
fn default_scope() -> String { "/".into() }
fn default_activation_timeout() -> u64 { 10 }

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            script: default_script(),
            scope: default_scope(),
            activation_timeout_secs: default_activation_timeout(),
        }
    }
}

/// Which local key/value backend holds the schedule record.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_storage_dir")]
    pub dir: String,
}

fn default_storage_dir() -> String { "~/.dailyread".into() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            dir: default_storage_dir(),
        }
    }
}

impl StorageConfig {
    /// Storage directory with `~` expanded.
    pub fn resolved_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.dir).to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// File (inside the storage dir) recording the user's consent decision.
    #[serde(default = "default_permission_file")]
    pub permission_file: String,
}

fn default_permission_file() -> String { "permission.json".into() }

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            permission_file: default_permission_file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: DailyReadConfig = toml::from_str("").unwrap();
        assert_eq!(config.notifications.tag, "daily-reading");
        assert_eq!(config.notifications.target_route, "/dashboard");
        assert_eq!(config.agent.activation_timeout_secs, 10);
        assert_eq!(config.storage.backend, StorageBackend::Json);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: DailyReadConfig = toml::from_str(
            r#"
            [notifications]
            default_time = "20:00"

            [storage]
            backend = "sqlite"
            "#,
        )
        .unwrap();
        assert_eq!(config.notifications.default_time, "20:00");
        assert_eq!(config.notifications.title, "Daily reading reminder");
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.dir, "~/.dailyread");
    }

    #[test]
    fn test_save_and_load_roundtrip_file() {
        let dir = std::env::temp_dir().join("dailyread-test-config");
        let path = dir.join("config.toml");
        let mut config = DailyReadConfig::default();
        config.agent.activation_timeout_secs = 3;
        config.save_to(&path).unwrap();

        let loaded = DailyReadConfig::load_from(&path).unwrap();
        assert_eq!(loaded.agent.activation_timeout_secs, 3);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = std::env::temp_dir().join("dailyread-test-config-bad");
        std::fs::create_dir_all(&dir).ok();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[storage\nbackend = ").unwrap();
        let err = DailyReadConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, DailyReadError::Config(_)));
        std::fs::remove_dir_all(&dir).ok();
    }
}
