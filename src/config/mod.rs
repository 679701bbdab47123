//! Configuration management for feedtide
//!
//! This module handles loading and validating configuration from environment
//! variables, TOML files, and built-in defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feed fetching configuration
    pub poller: PollerConfig,

    /// Earliest-due loop timings
    pub scheduler: SchedulerConfig,

    /// Batch sweep timings
    pub sweep: SweepConfig,

    /// Catalog storage configuration
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Feed fetching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Feed document url, `{id}` is replaced by the external feed id
    pub feed_url_template: String,

    /// Item url used when an entry carries no link, `{id}` is the item id
    pub item_url_template: String,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Delay held inside the fetch gate after every fetch, in milliseconds
    pub politeness_delay_ms: u64,

    /// User agent string
    pub user_agent: String,

    /// Number of most recent publish timestamps handed to the cadence predictor
    pub history_window: usize,
}

/// Earliest-due loop timings (seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Pause after processing a due source before looking again
    pub after_process_secs: u64,

    /// Sleep when a catalog has nothing scheduled
    pub idle_secs: u64,

    /// Retry delay when rows exist but no earliest due row was found
    pub inconsistent_retry_secs: u64,

    /// Backoff after an unexpected iteration error
    pub error_backoff_secs: u64,

    /// Retry delay when the catalog is busy/locked
    pub busy_retry_secs: u64,

    /// Added on top of the time remaining until a source is due
    pub safety_margin_secs: u64,

    /// Lower bound on any wait-until-due sleep
    pub min_sleep_secs: u64,
}

/// Batch sweep timings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Pause between two sources of the same sweep
    pub between_sources_secs: u64,
}

/// Catalog storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory scanned once at startup for `*.db` catalogs
    pub catalog_dir: PathBuf,

    /// SQLite busy timeout in milliseconds
    pub busy_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            feed_url_template: String::from(
                "https://www.youtube.com/feeds/videos.xml?channel_id={id}",
            ),
            item_url_template: String::from("https://www.youtube.com/watch?v={id}"),
            request_timeout_secs: 30,
            politeness_delay_ms: 10_000,
            user_agent: format!("feedtide/{}", env!("CARGO_PKG_VERSION")),
            history_window: 20,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            after_process_secs: 10,
            idle_secs: 12 * 3600,
            inconsistent_retry_secs: 90,
            error_backoff_secs: 45,
            busy_retry_secs: 10,
            safety_margin_secs: 5,
            min_sleep_secs: 3,
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            between_sources_secs: 10,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            catalog_dir: PathBuf::from("data/catalogs"),
            busy_timeout_ms: 5_000,
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

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let poller = PollerConfig {
            feed_url_template: std::env::var("FEEDTIDE_FEED_URL_TEMPLATE")
                .unwrap_or(defaults.poller.feed_url_template),
            item_url_template: std::env::var("FEEDTIDE_ITEM_URL_TEMPLATE")
                .unwrap_or(defaults.poller.item_url_template),
            request_timeout_secs: env_parse("FEEDTIDE_REQUEST_TIMEOUT")
                .unwrap_or(defaults.poller.request_timeout_secs),
            politeness_delay_ms: env_parse("FEEDTIDE_POLITENESS_DELAY_MS")
                .unwrap_or(defaults.poller.politeness_delay_ms),
            user_agent: std::env::var("FEEDTIDE_USER_AGENT")
                .unwrap_or(defaults.poller.user_agent),
            history_window: env_parse("FEEDTIDE_HISTORY_WINDOW")
                .unwrap_or(defaults.poller.history_window),
        };

        let scheduler = SchedulerConfig {
            after_process_secs: env_parse("FEEDTIDE_AFTER_PROCESS_SECS")
                .unwrap_or(defaults.scheduler.after_process_secs),
            idle_secs: env_parse("FEEDTIDE_IDLE_SECS").unwrap_or(defaults.scheduler.idle_secs),
            error_backoff_secs: env_parse("FEEDTIDE_ERROR_BACKOFF_SECS")
                .unwrap_or(defaults.scheduler.error_backoff_secs),
            busy_retry_secs: env_parse("FEEDTIDE_BUSY_RETRY_SECS")
                .unwrap_or(defaults.scheduler.busy_retry_secs),
            ..defaults.scheduler
        };

        let sweep = SweepConfig {
            between_sources_secs: env_parse("FEEDTIDE_SWEEP_GAP_SECS")
                .unwrap_or(defaults.sweep.between_sources_secs),
        };

        let storage = StorageConfig {
            catalog_dir: std::env::var("FEEDTIDE_CATALOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage.catalog_dir),
            busy_timeout_ms: env_parse("FEEDTIDE_BUSY_TIMEOUT_MS")
                .unwrap_or(defaults.storage.busy_timeout_ms),
        };

        let logging = LoggingConfig {
            level: std::env::var("FEEDTIDE_LOG_LEVEL").unwrap_or(defaults.logging.level),
            format: std::env::var("FEEDTIDE_LOG_FORMAT").unwrap_or(defaults.logging.format),
        };

        Ok(Self {
            poller,
            scheduler,
            sweep,
            storage,
            logging,
        })
    }

    /// Load configuration from a TOML file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.poller.feed_url_template.contains("{id}") {
            anyhow::bail!("feed_url_template must contain an {{id}} placeholder");
        }

        if self.poller.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        if self.poller.politeness_delay_ms == 0 {
            anyhow::bail!("politeness_delay_ms must be greater than 0");
        }

        if self.poller.history_window == 0 {
            anyhow::bail!("history_window must be greater than 0");
        }

        if self.scheduler.after_process_secs == 0 {
            anyhow::bail!("after_process_secs must be greater than 0");
        }

        if self.scheduler.min_sleep_secs == 0 {
            anyhow::bail!("min_sleep_secs must be greater than 0");
        }

        if self.scheduler.error_backoff_secs == 0
            || self.scheduler.busy_retry_secs == 0
            || self.scheduler.inconsistent_retry_secs == 0
        {
            anyhow::bail!("retry and backoff delays must be greater than 0");
        }

        Ok(())
    }

    /// Get the fetch gate politeness delay as Duration
    #[must_use]
    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.poller.politeness_delay_ms)
    }

    /// Get the pause between sweep sources as Duration
    #[must_use]
    pub fn sweep_gap(&self) -> Duration {
        Duration::from_secs(self.sweep.between_sources_secs)
    }

    /// Get the SQLite busy timeout as Duration
    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.busy_timeout_ms)
    }
}

impl PollerConfig {
    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SchedulerConfig {
    pub fn after_process(&self) -> Duration {
        Duration::from_secs(self.after_process_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }

    pub fn inconsistent_retry(&self) -> Duration {
        Duration::from_secs(self.inconsistent_retry_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn busy_retry(&self) -> Duration {
        Duration::from_secs(self.busy_retry_secs)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_secs)
    }

    pub fn min_sleep(&self) -> Duration {
        Duration::from_secs(self.min_sleep_secs)
    }
}
