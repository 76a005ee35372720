//! Configuration file handling

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Timeout and interval settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Automation driver settings
    #[serde(default)]
    pub driver: DriverConfig,
}

/// Timeout settings in milliseconds
#[derive(Debug, Deserialize)]
pub struct Timeouts {
    /// Interval between polls of a predicate
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Default upper bound for `wait_for`
    #[serde(default = "default_wait")]
    pub wait_default_ms: u64,

    /// How long a parent waits for a frame's test result
    #[serde(default = "default_frame_result")]
    pub frame_result_ms: u64,

    /// How long the driver waits for every test to register
    #[serde(default = "default_registration")]
    pub registration_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            wait_default_ms: default_wait(),
            frame_result_ms: default_frame_result(),
            registration_ms: default_registration(),
        }
    }
}

fn default_poll_interval() -> u64 {
    100
}
fn default_wait() -> u64 {
    5000
}
fn default_frame_result() -> u64 {
    5000
}
fn default_registration() -> u64 {
    10_000
}

impl Timeouts {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn wait_default(&self) -> Duration {
        Duration::from_millis(self.wait_default_ms)
    }

    pub fn frame_result(&self) -> Duration {
        Duration::from_millis(self.frame_result_ms)
    }

    pub fn registration(&self) -> Duration {
        Duration::from_millis(self.registration_ms)
    }
}

/// Automation driver configuration
#[derive(Debug, Deserialize)]
pub struct DriverConfig {
    /// How often the driver checks for stopped schedulers while tests run
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: default_progress_interval(),
        }
    }
}

fn default_progress_interval() -> u64 {
    250
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine_standard() {
        let config = Config::default();
        assert_eq!(config.timeouts.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.timeouts.frame_result(), Duration::from_secs(5));
        assert_eq!(config.driver.progress_interval_ms, 250);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
[timeouts]
frame_result_ms = 750
"#,
        )
        .unwrap();
        assert_eq!(config.timeouts.frame_result_ms, 750);
        assert_eq!(config.timeouts.wait_default_ms, 5000);
        assert_eq!(config.timeouts.registration_ms, 10_000);
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[timeouts\npoll_interval_ms = ").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }
}
