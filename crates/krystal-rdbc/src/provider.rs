//! Database providers.
//!
//! A [`Provider`] is a named database target bound to a [`Driver`]. The
//! [`ProviderRegistry`] maps every configured provider to the connection
//! settings read from `<providers_dir>/<name>.yaml`:
//!
//! ```yaml
//! host: db01.local        # or `server:`
//! database: produkcja
//! user: app
//! password: secret
//! encrypt: false
//! ```
//!
//! `host` and `database` form the URL (`sqlserver://db01.local/produkcja`);
//! every other key becomes a connection property.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::config::EngineConfig;
use crate::connection::ConnectionConfig;
use crate::dialect::{dialect_of, DialectFamily, SqlDialect};
use crate::error::{Error, Result};

/// A database driver: URL scheme plus dialect family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Driver {
    name: &'static str,
    scheme: &'static str,
    family: DialectFamily,
}

impl Driver {
    /// Microsoft SQL Server
    pub const SQLSERVER: Driver = Driver::new("sqlserver", "sqlserver://", DialectFamily::SqlServer);
    /// IBM DB2 for i
    pub const AS400: Driver = Driver::new("as400", "as400://", DialectFamily::As400);
    /// H2
    pub const H2: Driver = Driver::new("h2", "h2://", DialectFamily::H2);
    /// PostgreSQL
    pub const POSTGRESQL: Driver = Driver::new("postgresql", "postgres://", DialectFamily::Postgres);
    /// MySQL
    pub const MYSQL: Driver = Driver::new("mysql", "mysql://", DialectFamily::MySql);

    /// Every built-in driver
    pub const BUILT_IN: [Driver; 5] = [
        Self::SQLSERVER,
        Self::AS400,
        Self::H2,
        Self::POSTGRESQL,
        Self::MYSQL,
    ];

    /// Declare a driver
    pub const fn new(name: &'static str, scheme: &'static str, family: DialectFamily) -> Self {
        Self {
            name,
            scheme,
            family,
        }
    }

    /// Look up a built-in driver, ignoring case
    pub fn by_name(name: &str) -> Option<Driver> {
        Self::BUILT_IN
            .iter()
            .copied()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// Driver name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// URL scheme, including `://`
    pub fn scheme(&self) -> &'static str {
        self.scheme
    }

    /// Dialect family
    pub fn family(&self) -> DialectFamily {
        self.family
    }

    /// SQL dialect
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        dialect_of(self.family)
    }
}

/// A named database target.
///
/// Two providers are the same provider when their names match.
#[derive(Debug, Clone)]
pub struct Provider {
    name: Arc<str>,
    driver: Driver,
}

impl Provider {
    /// Bind a name to a driver
    pub fn new(name: impl AsRef<str>, driver: Driver) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            driver,
        }
    }

    /// Provider name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Driver
    pub fn driver(&self) -> Driver {
        self.driver
    }

    /// SQL dialect of the driver
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        self.driver.dialect()
    }
}

impl PartialEq for Provider {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Provider {}

impl Hash for Provider {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Contents of a provider properties file
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProviderProperties {
    /// Database host (`server` is accepted as an alias)
    #[serde(alias = "server")]
    #[validate(length(min = 1, max = 255))]
    pub host: String,

    /// Database name
    #[validate(length(min = 1, max = 255))]
    pub database: String,

    /// Remaining keys, passed to the driver as properties
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

fn property_text(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Null => None,
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        other => serde_yaml::to_string(other)
            .ok()
            .map(|s| s.trim().to_string()),
    }
}

impl ProviderProperties {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let props: Self = serde_yaml::from_str(yaml)?;
        props.validate()?;
        Ok(props)
    }

    /// Read, parse, and validate a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }

    /// Connection settings for a driver: `scheme + host/database`
    pub fn connection_config(&self, driver: Driver) -> ConnectionConfig {
        let url = format!("{}{}/{}", driver.scheme(), self.host, self.database);
        self.extra
            .iter()
            .filter_map(|(k, v)| property_text(v).map(|v| (k, v)))
            .fold(ConnectionConfig::new(url), |config, (k, v)| {
                config.with_property(k.as_str(), v)
            })
    }
}

/// Providers known to the engine and their connection settings
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Provider>,
    connections: HashMap<String, ConnectionConfig>,
    default_provider: Provider,
}

impl ProviderRegistry {
    /// Empty registry with a default provider
    pub fn new(default_provider: Provider) -> Self {
        let mut providers = HashMap::new();
        providers.insert(default_provider.name().to_string(), default_provider.clone());
        Self {
            providers,
            connections: HashMap::new(),
            default_provider,
        }
    }

    /// Build the registry from the engine configuration.
    ///
    /// Every configured provider is registered. Its properties file is read
    /// from the providers directory; a missing or invalid file is logged and
    /// leaves the provider without connection settings.
    pub fn load(config: &EngineConfig) -> Self {
        let mut providers = HashMap::new();
        for entry in &config.providers {
            match Driver::by_name(&entry.driver) {
                Some(driver) => {
                    providers.insert(entry.name.clone(), Provider::new(&entry.name, driver));
                }
                None => warn!(
                    provider = %entry.name,
                    driver = %entry.driver,
                    "Unknown driver, skipping provider"
                ),
            }
        }

        let default_provider = providers
            .get(&config.default_provider)
            .cloned()
            .unwrap_or_else(|| {
                let driver = Driver::by_name(&config.default_provider).unwrap_or(Driver::SQLSERVER);
                warn!(
                    provider = %config.default_provider,
                    driver = driver.name(),
                    "Default provider is not configured, assuming driver"
                );
                Provider::new(&config.default_provider, driver)
            });

        let mut registry = Self::new(default_provider);
        registry.providers.extend(providers);

        let mut loaded = 0usize;
        let names: Vec<Provider> = registry.providers.values().cloned().collect();
        for provider in names {
            match Self::read_properties(&config.providers_dir, &provider) {
                Ok(connection) => {
                    debug!(provider = %provider, connection = ?connection, "Loaded provider properties");
                    registry
                        .connections
                        .insert(provider.name().to_string(), connection);
                    loaded += 1;
                }
                Err(e) => warn!(
                    provider = %provider,
                    dir = %config.providers_dir.display(),
                    error = %e,
                    "Cannot load provider properties, skipping"
                ),
            }
        }
        info!(
            providers = registry.providers.len(),
            loaded,
            default = %registry.default_provider,
            "Provider registry ready"
        );
        registry
    }

    fn properties_path(dir: &Path, provider: &Provider) -> PathBuf {
        let yaml = dir.join(format!("{}.yaml", provider.name()));
        if yaml.exists() {
            return yaml;
        }
        let yml = dir.join(format!("{}.yml", provider.name()));
        if yml.exists() {
            yml
        } else {
            yaml
        }
    }

    fn read_properties(dir: &Path, provider: &Provider) -> Result<ConnectionConfig> {
        let path = Self::properties_path(dir, provider);
        let props = ProviderProperties::from_file(&path)?;
        Ok(props.connection_config(provider.driver()))
    }

    /// Register a provider with explicit connection settings
    pub fn register(&mut self, provider: Provider, connection: ConnectionConfig) {
        let name = provider.name().to_string();
        self.connections.insert(name.clone(), connection);
        self.providers.insert(name, provider);
    }

    /// Look up a provider by name
    pub fn get(&self, name: &str) -> Option<&Provider> {
        self.providers.get(name)
    }

    /// Connection settings of a provider
    pub fn connection_config(&self, name: &str) -> Result<&ConnectionConfig> {
        self.connections.get(name).ok_or_else(|| {
            Error::config(format!("no connection properties loaded for provider '{}'", name))
        })
    }

    /// Provider used when nothing else is named
    pub fn default_provider(&self) -> &Provider {
        &self.default_provider
    }

    /// The given provider, or the default
    pub fn resolve(&self, provider: Option<&Provider>) -> Provider {
        provider.unwrap_or(&self.default_provider).clone()
    }

    /// All registered providers
    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.providers.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_lookup() {
        assert_eq!(Driver::by_name("PostgreSQL"), Some(Driver::POSTGRESQL));
        assert_eq!(Driver::by_name("sqlserver").map(|d| d.scheme()), Some("sqlserver://"));
        assert!(Driver::by_name("oracle").is_none());
    }

    #[test]
    fn test_provider_identity_is_name() {
        let a = Provider::new("main", Driver::SQLSERVER);
        let b = Provider::new("main", Driver::H2);
        assert_eq!(a, b);
        assert_ne!(a, Provider::new("reports", Driver::SQLSERVER));
    }

    #[test]
    fn test_properties_to_connection() {
        let props = ProviderProperties::from_yaml_str(
            "server: db01\ndatabase: produkcja\nuser: app\nport: 1433\nencrypt: false\n",
        )
        .unwrap();
        let config = props.connection_config(Driver::SQLSERVER);
        assert_eq!(config.url, "sqlserver://db01/produkcja");
        assert_eq!(config.property("user"), Some("app"));
        assert_eq!(config.property("port"), Some("1433"));
        assert_eq!(config.property("encrypt"), Some("false"));
        assert_eq!(config.property("host"), None);
    }

    #[test]
    fn test_properties_missing_database() {
        let err = ProviderProperties::from_yaml_str("host: db01\n").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_resolve_defaults() {
        let registry = ProviderRegistry::new(Provider::new("sqlserver", Driver::SQLSERVER));
        let reports = Provider::new("reports", Driver::POSTGRESQL);
        assert_eq!(registry.resolve(None).name(), "sqlserver");
        assert_eq!(registry.resolve(Some(&reports)).name(), "reports");
        assert!(registry.connection_config("sqlserver").is_err());
    }
}
