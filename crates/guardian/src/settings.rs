//! Alert throttling settings.
//!
//! Settings are replaced wholesale on save, so every reader sees one
//! internally consistent value.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{GuardianError, Result};
use crate::storage::KeyValueStore;

/// Storage key for persisted settings.
pub const SETTINGS_KEY: &str = "alert_settings";

/// Thresholds consulted by the alert decider on every decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertSettings {
    /// Incidents whose severity weight is below this are never alerted.
    pub min_severity_weight: f32,
    /// Occurrences of one term within the window before it is suppressed.
    pub max_term_frequency: u32,
    pub frequency_window_minutes: u32,
    /// Distinct recent terms that force an alert for a related incident.
    pub min_term_diversity: u32,
    pub high_confidence_threshold: f32,
    /// When off, every incident clearing the severity floor is alerted.
    pub smart_filtering_enabled: bool,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            min_severity_weight: 0.4,
            max_term_frequency: 3,
            frequency_window_minutes: 60,
            min_term_diversity: 5,
            high_confidence_threshold: 0.85,
            smart_filtering_enabled: true,
        }
    }
}

impl AlertSettings {
    pub fn validate(&self) -> Result<()> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.min_severity_weight) {
            return Err(GuardianError::InvalidSettings(format!(
                "minSeverityWeight must be within [0, 1], got {}",
                self.min_severity_weight
            )));
        }
        if !unit.contains(&self.high_confidence_threshold) {
            return Err(GuardianError::InvalidSettings(format!(
                "highConfidenceThreshold must be within [0, 1], got {}",
                self.high_confidence_threshold
            )));
        }
        if self.max_term_frequency == 0 {
            return Err(GuardianError::InvalidSettings(
                "maxTermFrequency must be at least 1".to_string(),
            ));
        }
        if self.frequency_window_minutes == 0 {
            return Err(GuardianError::InvalidSettings(
                "frequencyWindowMinutes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Frequency window as a duration.
    pub fn frequency_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.frequency_window_minutes))
    }
}

/// Process-wide settings holder backed by the key-value store.
pub struct SettingsManager {
    current: RwLock<Arc<AlertSettings>>,
    store: Arc<dyn KeyValueStore>,
}

impl SettingsManager {
    /// Load persisted settings. Missing, unreadable, or invalid blobs fall
    /// back to defaults.
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let settings = match store.load(SETTINGS_KEY).await {
            Ok(Some(blob)) => match serde_json::from_slice::<AlertSettings>(&blob) {
                Ok(settings) => match settings.validate() {
                    Ok(()) => settings,
                    Err(e) => {
                        warn!(error = %e, "Persisted alert settings invalid, using defaults");
                        AlertSettings::default()
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Persisted alert settings corrupt, using defaults");
                    AlertSettings::default()
                }
            },
            Ok(None) => AlertSettings::default(),
            Err(e) => {
                warn!(error = %e, "Failed to read alert settings, using defaults");
                AlertSettings::default()
            }
        };

        Self {
            current: RwLock::new(Arc::new(settings)),
            store,
        }
    }

    /// Current settings value.
    pub fn current(&self) -> Arc<AlertSettings> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Validate, persist, then publish `settings`.
    pub async fn save(&self, settings: AlertSettings) -> Result<()> {
        settings.validate()?;
        let blob = serde_json::to_vec_pretty(&settings)?;
        self.store.save(SETTINGS_KEY, &blob).await?;

        info!(
            min_severity_weight = settings.min_severity_weight,
            max_term_frequency = settings.max_term_frequency,
            frequency_window_minutes = settings.frequency_window_minutes,
            min_term_diversity = settings.min_term_diversity,
            high_confidence_threshold = settings.high_confidence_threshold,
            smart_filtering_enabled = settings.smart_filtering_enabled,
            "Alert settings updated"
        );

        let settings = Arc::new(settings);
        match self.current.write() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_missing_settings_use_defaults() {
        let manager = SettingsManager::load(Arc::new(MemoryStore::new())).await;
        assert_eq!(*manager.current(), AlertSettings::default());
    }

    #[tokio::test]
    async fn test_corrupt_blob_uses_defaults() {
        let store = Arc::new(MemoryStore::new());
        store.save(SETTINGS_KEY, b"{not json").await.unwrap();

        let manager = SettingsManager::load(store).await;
        assert_eq!(*manager.current(), AlertSettings::default());
    }

    #[tokio::test]
    async fn test_invalid_persisted_values_use_defaults() {
        let store = Arc::new(MemoryStore::new());
        store
            .save(SETTINGS_KEY, br#"{"maxTermFrequency": 0}"#)
            .await
            .unwrap();

        let manager = SettingsManager::load(store).await;
        assert_eq!(manager.current().max_term_frequency, 3);
    }

    #[tokio::test]
    async fn test_partial_blob_fills_defaults() {
        let store = Arc::new(MemoryStore::new());
        store
            .save(SETTINGS_KEY, br#"{"minTermDiversity": 2}"#)
            .await
            .unwrap();

        let manager = SettingsManager::load(store).await;
        let settings = manager.current();
        assert_eq!(settings.min_term_diversity, 2);
        assert_eq!(settings.frequency_window_minutes, 60);
    }

    #[tokio::test]
    async fn test_save_persists_and_publishes() {
        let store = Arc::new(MemoryStore::new());
        let manager = SettingsManager::load(store.clone()).await;
        let before = manager.current();

        let updated = AlertSettings {
            max_term_frequency: 7,
            ..AlertSettings::default()
        };
        manager.save(updated.clone()).await.unwrap();

        assert_eq!(*manager.current(), updated);
        assert_eq!(before.max_term_frequency, 3);

        let reloaded = SettingsManager::load(store).await;
        assert_eq!(*reloaded.current(), updated);
    }

    #[tokio::test]
    async fn test_save_rejects_invalid() {
        let manager = SettingsManager::load(Arc::new(MemoryStore::new())).await;
        let result = manager
            .save(AlertSettings {
                high_confidence_threshold: 1.5,
                ..AlertSettings::default()
            })
            .await;

        assert!(matches!(result, Err(GuardianError::InvalidSettings(_))));
        assert_eq!(*manager.current(), AlertSettings::default());
    }
}
