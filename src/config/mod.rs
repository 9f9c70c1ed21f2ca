//! Configuration management for the update service
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::refresh::HttpBackendConfig;
use crate::scheduler::{SchedulerResult, StalenessPolicy, TriggerConfig};
use crate::utils::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scheduler configuration
    pub scheduler: SchedulerConfig,

    /// Entry store configuration
    pub storage: StorageConfig,

    /// HTTP refresh backend configuration
    pub fetch: FetchConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Minimum age of an entry before it is refreshed again
    pub frequency_secs: u64,

    /// Time between reconciliation cycles
    pub scan_interval_secs: u64,

    /// Upper bound on a single refresh
    pub refresh_timeout_secs: u64,

    /// Run a cycle immediately when updates are enabled
    pub scan_on_enable: bool,
}

/// Entry store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// HTTP refresh backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Directory that receives fetched content
    pub cache_dir: PathBuf,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// User agent string
    pub user_agent: String,

    /// Retries after the first failed attempt
    pub max_retries: u32,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frequency_secs: 300,
            scan_interval_secs: 300,
            refresh_timeout_secs: 120,
            scan_on_enable: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/appcache.db"),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("data/cache"),
            request_timeout_secs: 30,
            user_agent: default_user_agent(),
            max_retries: 3,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn default_user_agent() -> String {
    format!("appcache-updater/{}", env!("CARGO_PKG_VERSION"))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let scheduler = SchedulerConfig {
            frequency_secs: env_parse(
                "APPCACHE_FREQUENCY_SECS",
                defaults.scheduler.frequency_secs,
            ),
            scan_interval_secs: env_parse(
                "APPCACHE_SCAN_INTERVAL_SECS",
                defaults.scheduler.scan_interval_secs,
            ),
            refresh_timeout_secs: env_parse(
                "APPCACHE_REFRESH_TIMEOUT_SECS",
                defaults.scheduler.refresh_timeout_secs,
            ),
            scan_on_enable: env_parse(
                "APPCACHE_SCAN_ON_ENABLE",
                defaults.scheduler.scan_on_enable,
            ),
        };

        let sqlite_path = std::env::var("APPCACHE_SQLITE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage.sqlite_path);

        let fetch = FetchConfig {
            cache_dir: std::env::var("APPCACHE_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.fetch.cache_dir),
            request_timeout_secs: env_parse(
                "APPCACHE_REQUEST_TIMEOUT",
                defaults.fetch.request_timeout_secs,
            ),
            user_agent: std::env::var("APPCACHE_USER_AGENT")
                .unwrap_or(defaults.fetch.user_agent),
            max_retries: env_parse("APPCACHE_MAX_RETRIES", defaults.fetch.max_retries),
        };

        let logging = LoggingConfig {
            level: std::env::var("APPCACHE_LOG_LEVEL").unwrap_or(defaults.logging.level),
            format: std::env::var("APPCACHE_LOG_FORMAT").unwrap_or(defaults.logging.format),
        };

        Ok(Self {
            scheduler,
            storage: StorageConfig { sqlite_path },
            fetch,
            logging,
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from `path` if given, otherwise from the environment, and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.frequency_secs == 0 {
            anyhow::bail!("frequency_secs must be greater than 0");
        }

        if self.scheduler.scan_interval_secs == 0 {
            anyhow::bail!("scan_interval_secs must be greater than 0");
        }

        if self.scheduler.refresh_timeout_secs == 0 {
            anyhow::bail!("refresh_timeout_secs must be greater than 0");
        }

        if self.fetch.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!(
                "log format must be 'text' or 'json', got '{}'",
                self.logging.format
            );
        }

        Ok(())
    }

    /// Staleness policy for the reconciler
    pub fn staleness_policy(&self) -> SchedulerResult<StalenessPolicy> {
        StalenessPolicy::from_secs(self.scheduler.frequency_secs)
    }

    /// Timer configuration for the cycle trigger
    pub fn trigger_config(&self) -> TriggerConfig {
        TriggerConfig::new(Duration::from_secs(self.scheduler.scan_interval_secs))
            .scan_on_enable(self.scheduler.scan_on_enable)
    }

    /// Get refresh timeout as Duration
    #[must_use]
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.scheduler.refresh_timeout_secs)
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.request_timeout_secs)
    }

    /// Settings for the HTTP refresh backend
    pub fn http_backend_config(&self) -> HttpBackendConfig {
        HttpBackendConfig {
            cache_dir: self.fetch.cache_dir.clone(),
            request_timeout: self.request_timeout(),
            user_agent: self.fetch.user_agent.clone(),
            retry: RetryConfig::new(self.fetch.max_retries),
        }
    }
}
