//! Connection traits for krystal-rdbc
//!
//! Core abstractions for database connectivity:
//! - Connection: rendered SQL in, typed results out
//! - ConnectionConfig: URL, timeouts and driver properties of one provider
//! - ConnectionFactory: opens connections for one dialect family
//!
//! Statements reach a connection fully rendered, with inline literals, so
//! there are no bind parameters at this level.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::dialect::DialectFamily;
use crate::error::Result;
use crate::types::QueryResult;

/// A connection to a database
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a statement that returns rows
    async fn query(&self, sql: &str) -> Result<QueryResult>;

    /// Execute a statement that modifies data, returns affected row count
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Execute statements in order, returns affected counts per statement
    async fn execute_batch(&self, statements: &[&str]) -> Result<Vec<u64>> {
        let mut results = Vec::with_capacity(statements.len());
        for sql in statements {
            results.push(self.execute(sql).await?);
        }
        Ok(results)
    }

    /// Check if connection is valid/alive
    async fn is_valid(&self) -> bool;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// Property keys whose values never appear in logs
const SECRET_PROPERTIES: &[&str] = &["password", "pwd", "secret", "token"];

/// Configuration for creating connections
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Connection URL (e.g., sqlserver://host/database)
    pub url: String,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Query timeout in milliseconds (0 = no timeout)
    pub query_timeout_ms: u64,
    /// Driver properties (user, password, encrypt, ...)
    pub properties: BTreeMap<String, String>,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Credentials may sit in the URL or in the properties.
        let redacted_url = match url::Url::parse(&self.url) {
            Ok(mut parsed) => {
                if parsed.password().is_some() {
                    let _ = parsed.set_password(Some("***"));
                }
                parsed.to_string()
            }
            Err(_) => "***".to_string(),
        };
        let properties: BTreeMap<&str, &str> = self
            .properties
            .iter()
            .map(|(k, v)| {
                let secret = SECRET_PROPERTIES
                    .iter()
                    .any(|s| k.eq_ignore_ascii_case(s));
                (k.as_str(), if secret { "***" } else { v.as_str() })
            })
            .collect();

        f.debug_struct("ConnectionConfig")
            .field("url", &redacted_url)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("query_timeout_ms", &self.query_timeout_ms)
            .field("properties", &properties)
            .finish()
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout_ms: 10_000,
            query_timeout_ms: 30_000,
            properties: BTreeMap::new(),
        }
    }
}

impl ConnectionConfig {
    /// Create configuration with just a URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    /// Set query timeout
    pub fn with_query_timeout(mut self, ms: u64) -> Self {
        self.query_timeout_ms = ms;
        self
    }

    /// Add a connection property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Look up a property, ignoring key case
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Factory for creating connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Create a new connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>>;

    /// Dialect family this factory connects to
    fn family(&self) -> DialectFamily;
}
