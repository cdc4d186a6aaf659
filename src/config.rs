//! Configuration management for SolarPoll
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files with support for environment variable overrides.

use crate::error::{SolarPollError, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

mod defaults;

/// Environment variable overriding `api.api_key`
pub const API_KEY_ENV: &str = "SOLARPOLL_API_KEY";

/// Environment variable pointing at an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "SOLARPOLL_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Monitoring API connection settings
    pub api: ApiConfig,

    /// Minimum minutes between fetches of an entity whose values are not moving
    pub rate_limit_minutes: f64,

    /// Scheduler tick period in seconds
    pub poll_interval_secs: u64,

    /// Length of the rolling query window in minutes
    pub lookback_minutes: i64,

    /// Per-site IANA timezone overrides (site id -> zone name)
    pub timezone_by_site: HashMap<String, String>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Monitoring API connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API key sent with every request
    pub api_key: String,

    /// Scheme and host of the monitoring API
    pub base_url: String,

    /// Whole-request timeout in seconds
    pub request_timeout_secs: u64,

    /// TCP/TLS connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// User-Agent header value
    pub user_agent: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level
    pub console_level: Option<String>,

    /// Optional file-specific level
    pub file_level: Option<String>,

    /// Path to log file (or directory)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from `SOLARPOLL_CONFIG` or the default locations
    pub fn load() -> Result<Self> {
        if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV)
            && !explicit.trim().is_empty()
        {
            return Self::from_file(explicit.trim());
        }

        let default_paths = [
            "solarpoll.yaml",
            "/data/solarpoll.yaml",
            "/etc/solarpoll/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        let mut config = Config::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV)
            && !key.trim().is_empty()
        {
            self.api.api_key = key.trim().to_string();
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api.api_key.trim().is_empty() {
            return Err(SolarPollError::config(format!(
                "api.api_key is required (or set {})",
                API_KEY_ENV
            )));
        }

        if self.api.base_url.trim().is_empty() {
            return Err(SolarPollError::validation(
                "api.base_url",
                "Base URL cannot be empty",
            ));
        }

        if self.api.request_timeout_secs == 0 {
            return Err(SolarPollError::validation(
                "api.request_timeout_secs",
                "Must be greater than 0",
            ));
        }

        if !(self.rate_limit_minutes.is_finite() && self.rate_limit_minutes > 0.0) {
            return Err(SolarPollError::validation(
                "rate_limit_minutes",
                "Must be a positive number of minutes",
            ));
        }

        if self.poll_interval_secs == 0 {
            return Err(SolarPollError::validation(
                "poll_interval_secs",
                "Must be greater than 0",
            ));
        }

        if self.lookback_minutes <= 0 {
            return Err(SolarPollError::validation(
                "lookback_minutes",
                "Must be greater than 0",
            ));
        }

        for site in self.timezone_by_site.keys() {
            self.timezone_override(site)?;
        }

        Ok(())
    }

    /// Parsed timezone override for a site, if one is configured
    pub fn timezone_override(&self, site_id: &str) -> Result<Option<Tz>> {
        match self.timezone_by_site.get(site_id) {
            Some(name) => crate::window::parse_timezone(name).map(Some),
            None => Ok(None),
        }
    }
}
