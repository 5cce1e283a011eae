//! Configuration management for harvest.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/harvest/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Retry and readiness settings
    pub scanning: ScanningConfig,
    /// Browser session settings
    pub browser: BrowserConfig,
    /// Site profile location
    pub profiles: ProfilesConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, falling back to defaults
    /// when the file is missing.
    pub fn load_from(path: &std::path::Path) -> ConfigResult<Self> {
        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let contents = fs::read_to_string(path)?;
            let config: Self = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `HARVEST_HEADLESS`: Override browser headless mode (true/false)
    /// - `HARVEST_MAX_ATTEMPTS`: Override the retry attempt ceiling
    /// - `HARVEST_BASE_DELAY_SECS`: Override the backoff base delay
    /// - `HARVEST_MAX_DELAY_SECS`: Override the backoff delay cap
    /// - `HARVEST_PROFILES_DIR`: Override the site profile directory
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (normally the process environment).
    ///
    /// Unparseable values are ignored and the configured value is kept.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(headless) = lookup("HARVEST_HEADLESS").and_then(|v| v.parse().ok()) {
            self.browser.headless = headless;
            tracing::debug!("Override browser.headless from env: {}", headless);
        }

        if let Some(attempts) = lookup("HARVEST_MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.scanning.max_attempts = attempts;
            tracing::debug!("Override scanning.max_attempts from env: {}", attempts);
        }

        if let Some(secs) = lookup("HARVEST_BASE_DELAY_SECS").and_then(|v| v.parse().ok()) {
            self.scanning.base_delay_secs = secs;
            tracing::debug!("Override scanning.base_delay_secs from env: {}", secs);
        }

        if let Some(secs) = lookup("HARVEST_MAX_DELAY_SECS").and_then(|v| v.parse().ok()) {
            self.scanning.max_delay_secs = secs;
            tracing::debug!("Override scanning.max_delay_secs from env: {}", secs);
        }

        if let Some(dir) = lookup("HARVEST_PROFILES_DIR") {
            tracing::debug!("Override profiles.dir from env: {}", dir);
            self.profiles.dir = Some(PathBuf::from(dir));
        }
    }

    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.scanning.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scanning.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if self.scanning.max_delay_secs < self.scanning.base_delay_secs {
            return Err(ConfigError::InvalidValue {
                field: "scanning.max_delay_secs".to_string(),
                reason: format!(
                    "must not be below base_delay_secs ({})",
                    self.scanning.base_delay_secs
                ),
            });
        }

        if self.scanning.concurrent_sites == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scanning.concurrent_sites".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/harvest/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "harvest", "harvest").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// Retry, backoff and readiness polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanningConfig {
    /// Maximum attempts per run (acquire, navigate, wait, extract)
    pub max_attempts: u32,
    /// Backoff base delay in seconds; attempt `i` waits `base * 2^i`
    pub base_delay_secs: u64,
    /// Backoff ceiling in seconds
    pub max_delay_secs: u64,
    /// Independent site pipelines allowed to run at once
    pub concurrent_sites: usize,
    /// Interval between element-presence checks in milliseconds
    pub poll_interval_ms: u64,
}

impl ScanningConfig {
    /// Backoff base delay as a `Duration`.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_secs)
    }

    /// Backoff ceiling as a `Duration`.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    /// Presence polling interval as a `Duration`.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 45,
            max_delay_secs: 120,
            concurrent_sites: 2,
            poll_interval_ms: 500,
        }
    }
}

/// Browser session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,
    /// User agent presented to sites
    pub user_agent: String,
    /// `Accept-Language` header presented to sites
    pub accept_language: String,
    /// Explicit Chrome/Chromium binary; auto-detected when unset
    pub chrome_executable: Option<PathBuf>,
}

impl BrowserConfig {
    /// Navigation timeout as a `Duration`.
    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            navigation_timeout_secs: 45,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            accept_language: "es-ES,es;q=0.9,en;q=0.8".to_string(),
            chrome_executable: None,
        }
    }
}

/// Site profile location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesConfig {
    /// Directory holding `<category>/<site>.toml` profiles; when unset the
    /// `site-profiles/` directory next to the workspace root is used
    pub dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.scanning.max_attempts, 5);
        assert_eq!(config.scanning.base_delay_secs, 45);
        assert_eq!(config.scanning.max_delay_secs, 120);
        assert!(config.browser.headless);
        assert_eq!(config.browser.window_width, 1920);
        assert!(config.profiles.dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("[scanning]"));
        assert!(toml_str.contains("[browser]"));

        let parsed: AppConfig = toml::from_str(&toml_str).expect("parse serialized config");
        assert_eq!(parsed.browser.user_agent, config.browser.user_agent);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().expect("create temp dir");
        let config_path = tmp.path().join("config.toml");

        let mut config = AppConfig::default();
        config.scanning.max_attempts = 3;
        config.browser.headless = false;

        let contents = toml::to_string_pretty(&config).expect("serialize config");
        fs::write(&config_path, contents).expect("write config file");

        let loaded = AppConfig::load_from(&config_path).expect("load config");
        assert_eq!(loaded.scanning.max_attempts, 3);
        assert!(!loaded.browser.headless);
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let tmp = TempDir::new().expect("create temp dir");
        let loaded = AppConfig::load_from(&tmp.path().join("absent.toml")).expect("load config");
        assert_eq!(loaded.scanning.max_attempts, 5);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("HARVEST_HEADLESS", "false"),
            ("HARVEST_MAX_ATTEMPTS", "3"),
            ("HARVEST_BASE_DELAY_SECS", "not-a-number"),
            ("HARVEST_PROFILES_DIR", "/srv/profiles"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(ToString::to_string));

        assert!(!config.browser.headless);
        assert_eq!(config.scanning.max_attempts, 3);
        // Garbage keeps the configured value
        assert_eq!(config.scanning.base_delay_secs, 45);
        assert_eq!(config.profiles.dir, Some(PathBuf::from("/srv/profiles")));
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[scanning]
max_attempts = 2

[browser]
headless = false
"#;

        let config: AppConfig = toml::from_str(toml_str).expect("parse partial config");
        assert_eq!(config.scanning.max_attempts, 2);
        assert!(!config.browser.headless);
        // These should be defaults
        assert_eq!(config.scanning.max_delay_secs, 120);
        assert_eq!(config.browser.navigation_timeout_secs, 45);
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let mut config = AppConfig::default();
        config.scanning.base_delay_secs = 200;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.scanning.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
