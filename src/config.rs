//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the prayer-config.toml file.
//! It provides a centralized way to configure the default location, calculation settings,
//! cache behaviour, the optional remote timing service and notifications.

use crate::method::{CalculationMethod, HighLatitudeRule, Madhab};
use crate::PrayerAdjustments;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CONFIG_FILE: &str = "prayer-config.toml";

/// Application configuration loaded from prayer-config.toml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub location: LocationConfig,
    pub calculation: CalculationConfig,
    pub cache: CacheConfig,
    pub remote: RemoteConfig,
    pub notifications: NotificationConfig,
    pub storage: StorageConfig,
}

/// Location used when the device cannot provide one
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
    /// Human-readable name for reference
    pub name: String,
    /// Seconds to wait for a GPS fix
    pub fix_timeout_secs: u64,
}

/// Defaults for the calculation; the user's persisted settings override method and adjustments
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CalculationConfig {
    pub method: CalculationMethod,
    pub madhab: Madhab,
    pub high_latitude_rule: HighLatitudeRule,
    pub adjustments: PrayerAdjustments,
    /// Wall-clock "HH:MM" times used when nothing else works, Fajr through Isha
    pub default_schedule: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a location fix is reused
    pub location_ttl_hours: i64,
    /// Recompute cached prayer times after moving further than this; 0 disables
    pub drift_threshold_km: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// Extra reminder this many minutes before each prayer; omit for none
    pub reminder_minutes: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: PathBuf,
}

impl Default for LocationConfig {
    fn default() -> Self {
        LocationConfig {
            latitude: 21.4225,
            longitude: 39.8262,
            name: "Makkah".to_string(),
            fix_timeout_secs: 15,
        }
    }
}

impl Default for CalculationConfig {
    fn default() -> Self {
        CalculationConfig {
            method: CalculationMethod::default(),
            madhab: Madhab::default(),
            high_latitude_rule: HighLatitudeRule::default(),
            adjustments: PrayerAdjustments::default(),
            default_schedule: ["05:00", "12:30", "15:30", "18:00", "19:30"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            location_ttl_hours: 24,
            drift_threshold_km: Some(5.0),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            enabled: false,
            base_url: "https://api.aladhan.com/v1".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        NotificationConfig {
            enabled: true,
            reminder_minutes: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            dir: std::env::temp_dir().join("prayer-tracker"),
        }
    }
}

impl Config {
    /// Load configuration from prayer-config.toml file
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_FILE)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!(
                        location = %config.location.name,
                        method = %config.calculation.method,
                        "Loaded configuration"
                    );
                    config
                }
                Err(e) => {
                    warn!(error = %e, "Invalid config file format, using default configuration");
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file found, using default configuration");
                Self::default()
            }
        }
    }

    /// Save current configuration to `path`
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        info!(path = %path.as_ref().display(), "Configuration saved");
        Ok(())
    }

    /// Save current configuration to prayer-config.toml
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to_path(CONFIG_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.location.name, "Makkah");
        assert_eq!(config.calculation.method, CalculationMethod::MuslimWorldLeague);
        assert_eq!(config.cache.location_ttl_hours, 24);
        assert_eq!(config.cache.drift_threshold_km, Some(5.0));
        assert!(!config.remote.enabled);
        assert_eq!(config.calculation.default_schedule.len(), 5);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.location.name, parsed.location.name);
        assert_eq!(config.calculation.method, parsed.calculation.method);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [location]
            latitude = 41.7606
            longitude = -88.3201
            name = "Aurora, IL"

            [calculation]
            method = "NorthAmerica"

            [calculation.adjustments]
            fajr = 2
            "#,
        )
        .unwrap();
        assert_eq!(parsed.location.name, "Aurora, IL");
        assert_eq!(parsed.location.fix_timeout_secs, 15);
        assert_eq!(parsed.calculation.method, CalculationMethod::NorthAmerica);
        assert_eq!(parsed.calculation.adjustments.fajr, 2);
        assert_eq!(parsed.calculation.adjustments.isha, 0);
        assert_eq!(parsed.cache.location_ttl_hours, 24);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut config = Config::default();
        config.remote.enabled = true;
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path);
        assert!(loaded.remote.enabled);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = Config::load_from_path("/nonexistent/path");
        // Should fallback to default
        assert_eq!(config.location.name, "Makkah");
    }
}
