//! Runtime configuration.
//!
//! Resolution order: built-in defaults, then the optional JSON file, then
//! environment variables. Channel credentials are usually supplied through
//! the environment:
//!
//! - `GUARDIAN_DATA_DIR`, `GUARDIAN_DEVICE_ID`, `GUARDIAN_DEVICE_NAME`
//! - `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`
//! - `WHATSAPP_ACCESS_TOKEN`, `WHATSAPP_PHONE_NUMBER_ID`, `WHATSAPP_RECIPIENT`
//! - `NOTIFY_DISABLED=true` turns every channel off

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{DeliveryConfig, TelegramConfig, WhatsAppConfig};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::{GuardianError, Result};
use crate::incident::DeviceInfo;
use crate::store::DEFAULT_RETENTION_HOURS;

const ENV_DATA_DIR: &str = "GUARDIAN_DATA_DIR";
const ENV_DEVICE_ID: &str = "GUARDIAN_DEVICE_ID";
const ENV_DEVICE_NAME: &str = "GUARDIAN_DEVICE_NAME";

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = ".guardian";

/// Longest retention accepted, one year.
pub const MAX_RETENTION_HOURS: i64 = 24 * 365;

/// Incident retention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetentionConfig {
    pub max_age_hours: i64,
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_hours: DEFAULT_RETENTION_HOURS,
            sweep_interval_secs: 3600,
        }
    }
}

impl RetentionConfig {
    /// Retention window. Out-of-range values fall back to the default.
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::try_hours(self.max_age_hours)
            .unwrap_or_else(|| chrono::Duration::hours(DEFAULT_RETENTION_HOURS))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// External channel credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelsConfig {
    pub telegram: TelegramConfig,
    pub whatsapp: WhatsAppConfig,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuardianConfig {
    /// Directory holding persisted incidents and settings.
    pub data_dir: PathBuf,
    pub device: DeviceInfo,
    pub delivery: DeliveryConfig,
    pub retention: RetentionConfig,
    pub channels: ChannelsConfig,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            device: DeviceInfo::default(),
            delivery: DeliveryConfig::default(),
            retention: RetentionConfig::default(),
            channels: ChannelsConfig::default(),
        }
    }
}

impl GuardianConfig {
    /// Load configuration from an optional file and the environment.
    ///
    /// A missing file yields defaults. A file that exists but does not parse
    /// is an error.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_path(path).await?,
            None => Self::default(),
        };
        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration file. Missing files yield defaults.
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map_err(|e| {
            GuardianError::InvalidConfig(format!("{}: {e}", path.display()))
        })
    }

    /// Overlay environment variables onto the loaded values.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(id) = std::env::var(ENV_DEVICE_ID) {
            self.device.id = id;
        }
        if let Ok(name) = std::env::var(ENV_DEVICE_NAME) {
            self.device.name = name;
        }
        self.channels.telegram = self.channels.telegram.with_env_overrides();
        self.channels.whatsapp = self.channels.whatsapp.with_env_overrides();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_RETENTION_HOURS).contains(&self.retention.max_age_hours) {
            return Err(GuardianError::InvalidConfig(format!(
                "retention.maxAgeHours must be between 1 and {MAX_RETENTION_HOURS}"
            )));
        }
        if self.delivery.max_attempts == 0 {
            return Err(GuardianError::InvalidConfig(
                "delivery.maxAttempts must be at least 1".to_string(),
            ));
        }
        if self.device.id.trim().is_empty() {
            return Err(GuardianError::InvalidConfig(
                "device.id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::Priority;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = GuardianConfig::default();
        assert_eq!(config.data_dir, PathBuf::from(".guardian"));
        assert_eq!(config.delivery.retry_interval_secs, 30);
        assert_eq!(config.delivery.max_attempts, 3);
        assert_eq!(config.retention.max_age_hours, 24);
        assert_eq!(config.retention.sweep_interval(), Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = GuardianConfig::load_from_path(&temp_dir.path().join("absent.json"))
            .await
            .unwrap();
        assert_eq!(config, GuardianConfig::default());
    }

    #[tokio::test]
    async fn test_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("guardian.json");
        std::fs::write(
            &path,
            r#"{
                "device": {"id": "tablet", "name": "Tablet"},
                "delivery": {"minPriority": "high"},
                "channels": {"telegram": {"chatId": "42"}}
            }"#,
        )
        .unwrap();

        let config = GuardianConfig::load_from_path(&path).await.unwrap();
        assert_eq!(config.device.id, "tablet");
        assert_eq!(config.delivery.min_priority, Priority::High);
        assert_eq!(config.delivery.retry_interval_secs, 30);
        assert_eq!(config.channels.telegram.chat_id.as_deref(), Some("42"));
        assert_eq!(config.retention, RetentionConfig::default());
    }

    #[tokio::test]
    async fn test_invalid_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("guardian.json");
        std::fs::write(&path, "{ nope").unwrap();

        let result = GuardianConfig::load_from_path(&path).await;
        assert!(matches!(result, Err(GuardianError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_zero_retention() {
        let mut config = GuardianConfig::default();
        config.retention.max_age_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unbounded_retention() {
        let mut config = GuardianConfig::default();
        config.retention.max_age_hours = i64::MAX;
        assert!(matches!(config.validate(), Err(GuardianError::InvalidConfig(_))));
        assert_eq!(config.retention.max_age(), chrono::Duration::hours(24));

        config.retention.max_age_hours = MAX_RETENTION_HOURS;
        assert!(config.validate().is_ok());
        assert_eq!(config.retention.max_age(), chrono::Duration::days(365));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        // SAFETY: serialized with other env-mutating tests
        unsafe {
            std::env::set_var("GUARDIAN_DATA_DIR", "/var/lib/guardian");
            std::env::set_var("GUARDIAN_DEVICE_NAME", "Kitchen tablet");
        }

        let config = GuardianConfig::default().with_env_overrides();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/guardian"));
        assert_eq!(config.device.name, "Kitchen tablet");
        assert_eq!(config.device.id, "local");

        // SAFETY: still holding the #[serial] lock taken above
        unsafe {
            std::env::remove_var("GUARDIAN_DATA_DIR");
            std::env::remove_var("GUARDIAN_DEVICE_NAME");
        }
    }
}
