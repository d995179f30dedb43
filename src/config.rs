//! Configuration for the session recorder.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecorderConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub screenshot: ScreenshotConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}

/// Session directory configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionConfig {
    /// Directory to create sessions in. A temporary directory is generated
    /// per session when unset.
    #[serde(default)]
    pub directory: Option<String>,
}

/// Screenshot scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotConfig {
    /// Debounce window for geometry-driven capture signals.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Delay for explicitly requested captures.
    #[serde(default = "default_quick_ms")]
    pub quick_ms: u64,
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_quick_ms() -> u64 {
    100
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            quick_ms: default_quick_ms(),
        }
    }
}

impl ScreenshotConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn quick(&self) -> Duration {
        Duration::from_millis(self.quick_ms)
    }
}

/// Background resource fetching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Number of fetch worker threads.
    #[serde(default = "default_fetch_workers")]
    pub workers: usize,
    /// Maximum queued fetches; further fetches are dropped.
    #[serde(default = "default_fetch_queue")]
    pub queue_size: usize,
}

fn default_fetch_workers() -> usize {
    2
}

fn default_fetch_queue() -> usize {
    32
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: default_fetch_workers(),
            queue_size: default_fetch_queue(),
        }
    }
}

/// Remote device connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Upper bound on remote registry resolution.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl DeviceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl RecorderConfig {
    /// Get the config file path (~/.config/bsr/config.toml)
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = Self::config_dir()?;
        Ok(config_dir.join("config.toml"))
    }

    /// Get the config directory path (~/.config/bsr)
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("bsr"))
    }

    /// Load configuration from file, or return defaults if not found
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
            let config: RecorderConfig = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::config_dir()?;
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        let config_path = Self::config_path()?;
        fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = RecorderConfig::default();
        assert_eq!(config.screenshot.debounce_ms, 500);
        assert_eq!(config.screenshot.quick_ms, 100);
        assert_eq!(config.fetch.workers, 2);
        assert_eq!(config.fetch.queue_size, 32);
        assert_eq!(config.device.connect_timeout_ms, 5_000);
        assert!(config.session.directory.is_none());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: RecorderConfig = toml::from_str(
            r#"
            [screenshot]
            debounce_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.screenshot.debounce_ms, 250);
        assert_eq!(config.screenshot.quick_ms, 100);
        assert_eq!(config.fetch.workers, 2);
    }

    #[test]
    fn durations_convert_from_millis() {
        let config = RecorderConfig::default();
        assert_eq!(config.screenshot.debounce(), Duration::from_millis(500));
        assert_eq!(config.device.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn roundtrips_through_toml() {
        let mut config = RecorderConfig::default();
        config.session.directory = Some("/data/study".into());
        let serialized = toml::to_string_pretty(&config).unwrap();
        let back: RecorderConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(back.session.directory.as_deref(), Some("/data/study"));
    }
}
