//! Configuration loading for pixelflow
//!
//! Settings come from an optional YAML file (by default
//! `~/.config/pixelflow/config.yaml` on Linux), overridden by command-line
//! flags and environment variables.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::data::api::{DEFAULT_API_URL, DEFAULT_TIMEOUT};
use crate::request::backoff::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES,
};
use crate::request::executor::{DEFAULT_CACHE_DURATION, DEFAULT_RATE_LIMIT_DELAY};
use crate::request::{Locale, RequestOptions, RetryPolicy};

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML for `Settings`
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Retry settings as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY.as_millis() as u64,
            max_delay_ms: DEFAULT_MAX_DELAY.as_millis() as u64,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        RetryPolicy {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_factor: settings.backoff_factor,
        }
    }
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the photo-processing API
    pub api_url: String,
    /// Bearer token for the API
    pub token: Option<String>,
    /// Language for user-facing messages
    pub locale: Locale,
    /// HTTP request timeout in seconds
    pub http_timeout_secs: u64,
    /// How long successful responses stay cached, in seconds
    pub cache_ttl_secs: u64,
    /// Minimum spacing between requests to the same endpoint, in milliseconds
    pub rate_limit_ms: u64,
    /// Dashboard auto-refresh interval in seconds
    pub refresh_interval_secs: u64,
    /// Retry behavior for transient failures
    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            locale: Locale::default(),
            http_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            cache_ttl_secs: DEFAULT_CACHE_DURATION.as_secs(),
            rate_limit_ms: DEFAULT_RATE_LIMIT_DELAY.as_millis() as u64,
            refresh_interval_secs: 30,
            retry: RetrySettings::default(),
        }
    }
}

impl Settings {
    /// Returns the default config file location, if a home directory exists
    pub fn default_path() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "pixelflow")?;
        Some(project_dirs.config_dir().join("config.yaml"))
    }

    /// Loads settings from `path`, or from the default location
    ///
    /// An explicitly given file must exist; a missing default file yields
    /// the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Parses settings from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        // An empty file means "all defaults"
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks that values are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let retry = &self.retry;
        if retry.base_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "retry.base_delay_ms must be greater than 0".to_string(),
            ));
        }
        if retry.max_delay_ms < retry.base_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "retry.max_delay_ms ({}) must be at least retry.base_delay_ms ({})",
                retry.max_delay_ms, retry.base_delay_ms
            )));
        }
        if !retry.backoff_factor.is_finite() || retry.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "retry.backoff_factor must be a finite number >= 1.0, got {}",
                retry.backoff_factor
            )));
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "http_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "refresh_interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }

    /// Builds executor options for requests under `cache_key`
    pub fn request_options(&self, cache_key: Option<&str>) -> RequestOptions {
        RequestOptions {
            cache_key: cache_key.map(str::to_string),
            cache_duration: Duration::from_secs(self.cache_ttl_secs),
            rate_limit_delay: Duration::from_millis(self.rate_limit_ms),
            retry: self.retry_policy(),
        }
    }
}
