//! Engine configuration
//!
//! [`EngineConfig`] is the explicit settings object threaded through the
//! statement renderer, provider registry, executor, and cache. It is plain
//! data: build it in code, or load it from YAML.
//!
//! ```yaml
//! default_provider: sqlserver
//! providers_dir: /etc/app/providers
//! datetime_format: "%Y-%m-%d %H:%M:%S"
//! providers:
//!   - name: sqlserver
//!     driver: sqlserver
//!   - name: reports
//!     driver: postgresql
//! pool:
//!   max_size: 5
//! cache:
//!   intervals_count: 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

use crate::error::{Error, Result};
use crate::literal::LiteralFormat;
use crate::pool::PoolConfig;

/// Top-level engine settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    /// Delimiter used to join value lists and column lists
    #[serde(default = "default_delimiter")]
    #[validate(length(min = 1, max = 16))]
    pub delimiter: String,

    /// chrono format for DATE literals
    #[serde(default = "default_date_format")]
    #[validate(length(min = 1))]
    pub date_format: String,

    /// chrono format for TIMESTAMP literals
    #[serde(default = "default_datetime_format")]
    #[validate(length(min = 1))]
    pub datetime_format: String,

    /// Provider used when neither the caller nor the statement names one
    #[serde(default = "default_provider")]
    #[validate(length(min = 1, max = 255))]
    pub default_provider: String,

    /// Directory holding one `<provider>.yaml` file per provider
    #[serde(default = "default_providers_dir")]
    pub providers_dir: PathBuf,

    /// Logical providers and the driver each one uses
    #[serde(default = "default_providers")]
    #[validate(nested)]
    pub providers: Vec<ProviderEntry>,

    /// Connection pool defaults, applied per provider
    #[serde(default)]
    #[validate(nested)]
    pub pool: PoolSettings,

    /// Object cache settings
    #[serde(default)]
    #[validate(nested)]
    pub cache: CacheSettings,
}

/// A provider name bound to a driver name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ProviderEntry {
    /// Logical provider name, also the properties file stem
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Driver name (`sqlserver`, `as400`, `h2`, `postgresql`, `mysql`)
    #[validate(length(min = 1, max = 64))]
    pub driver: String,
}

impl ProviderEntry {
    /// Create a provider entry
    pub fn new(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: driver.into(),
        }
    }
}

/// Pool settings shared by every provider pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PoolSettings {
    /// Connections opened eagerly when the pool is created
    #[serde(default)]
    pub min_size: usize,

    /// Upper bound of open connections per provider
    #[serde(default = "default_pool_max_size")]
    #[validate(range(min = 1, max = 1024))]
    pub max_size: usize,

    /// Maximum wait for a free connection, in milliseconds
    #[serde(default = "default_acquire_timeout_ms")]
    #[validate(range(min = 1))]
    pub acquire_timeout_ms: u64,

    /// Connections older than this are recycled, in milliseconds
    #[serde(default = "default_max_lifetime_ms")]
    pub max_lifetime_ms: u64,

    /// Connections idle longer than this are recycled, in milliseconds
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Validate connections when they are borrowed
    #[serde(default = "default_true")]
    pub test_on_borrow: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_size: 0,
            max_size: default_pool_max_size(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            max_lifetime_ms: default_max_lifetime_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            test_on_borrow: true,
        }
    }
}

/// Object cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CacheSettings {
    /// Disable to bypass the cache entirely
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sweep period, in milliseconds
    #[serde(default = "default_monitor_interval_ms")]
    #[validate(range(min = 1))]
    pub monitor_interval_ms: u64,

    /// Sweeps an entry survives without being put again
    #[serde(default = "default_intervals_count")]
    #[validate(range(min = 0, max = 1_000_000))]
    pub intervals_count: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            monitor_interval_ms: default_monitor_interval_ms(),
            intervals_count: default_intervals_count(),
        }
    }
}

impl CacheSettings {
    /// Sweep period as a duration
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

fn default_delimiter() -> String {
    ", ".to_string()
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_datetime_format() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

fn default_provider() -> String {
    "sqlserver".to_string()
}

fn default_providers_dir() -> PathBuf {
    PathBuf::from("providers")
}

fn default_providers() -> Vec<ProviderEntry> {
    vec![
        ProviderEntry::new("sqlserver", "sqlserver"),
        ProviderEntry::new("as400", "as400"),
        ProviderEntry::new("h2", "h2"),
        ProviderEntry::new("postgre", "postgresql"),
        ProviderEntry::new("mysql", "mysql"),
    ]
}

fn default_pool_max_size() -> usize {
    3
}

fn default_acquire_timeout_ms() -> u64 {
    30_000
}

fn default_max_lifetime_ms() -> u64 {
    1_800_000
}

fn default_idle_timeout_ms() -> u64 {
    600_000
}

fn default_monitor_interval_ms() -> u64 {
    1_000
}

fn default_intervals_count() -> u64 {
    3
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            date_format: default_date_format(),
            datetime_format: default_datetime_format(),
            default_provider: default_provider(),
            providers_dir: default_providers_dir(),
            providers: default_providers(),
            pool: PoolSettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }

    /// Set the providers directory
    pub fn with_providers_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.providers_dir = dir.into();
        self
    }

    /// Set the default provider
    pub fn with_default_provider(mut self, name: impl Into<String>) -> Self {
        self.default_provider = name.into();
        self
    }

    /// Replace the provider list
    pub fn with_providers(mut self, providers: Vec<ProviderEntry>) -> Self {
        self.providers = providers;
        self
    }

    /// Set the cache lease length in sweeps
    pub fn with_intervals_count(mut self, count: u64) -> Self {
        self.cache.intervals_count = count;
        self
    }

    /// Literal formats derived from the configured date patterns
    pub fn literal_format(&self) -> LiteralFormat {
        LiteralFormat::new(&self.date_format, &self.datetime_format)
    }

    /// Pool configuration for one connection URL
    pub fn pool_config(&self, url: impl Into<String>) -> PoolConfig {
        PoolConfig::new(url)
            .with_min_size(self.pool.min_size)
            .with_max_size(self.pool.max_size)
            .with_acquire_timeout(Duration::from_millis(self.pool.acquire_timeout_ms))
            .with_max_lifetime(Duration::from_millis(self.pool.max_lifetime_ms))
            .with_idle_timeout(Duration::from_millis(self.pool.idle_timeout_ms))
            .with_test_on_borrow(self.pool.test_on_borrow)
    }
}
