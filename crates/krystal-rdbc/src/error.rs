//! Error types for krystal-rdbc
//!
//! Errors fall into two propagation classes:
//! - Structural errors (identity, constraint, mapping, statement, configuration)
//!   fail fast and are always returned to the caller
//! - Connectivity errors (connection, query, timeout, pool exhaustion) are
//!   logged by the executor, which degrades to an empty result instead

use std::fmt;
use thiserror::Error;

/// Result type for krystal-rdbc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection-related errors (retriable)
    Connection,
    /// Query execution errors
    Query,
    /// Invalid or missing configuration
    Configuration,
    /// Key fields missing where a single-object operation needs them
    Identity,
    /// Write attempted on a read-only entity
    Constraint,
    /// No reader matches a result's column types
    Mapping,
    /// Statement built with missing mandatory parts
    Statement,
    /// Type conversion errors (not retriable)
    TypeConversion,
    /// Timeout errors (retriable)
    Timeout,
    /// Pool exhausted (retriable with backoff)
    PoolExhausted,
    /// Unknown/other errors
    Other,
}

impl ErrorCategory {
    /// Whether errors in this category are generally retriable
    #[inline]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Connection | Self::Timeout | Self::PoolExhausted)
    }

    /// Whether errors in this category come from reaching or querying the
    /// backing store. These degrade to empty results in the executor.
    #[inline]
    pub const fn is_connectivity(self) -> bool {
        matches!(
            self,
            Self::Connection | Self::Query | Self::Timeout | Self::PoolExhausted
        )
    }
}

/// Main error type for krystal-rdbc
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    /// Connection failed
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query execution failed
    #[error("query error: {message}")]
    Query {
        message: String,
        sql: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error (provider file, engine settings)
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Key fields are absent for a single-object operation
    #[error("identity error: {entity}: {message}")]
    Identity { entity: String, message: String },

    /// Operation not permitted on the entity
    #[error("constraint violation: {entity}: {message}")]
    Constraint { entity: String, message: String },

    /// Result columns do not match any reader of the entity
    #[error("mapping error: {entity}: no reader accepts columns [{columns}]")]
    Mapping { entity: String, columns: String },

    /// Statement could not be rendered
    #[error("statement error: {message}")]
    Statement { message: String },

    /// Type conversion failed
    #[error("type conversion error: {message}")]
    TypeConversion { message: String },

    /// Operation timed out
    #[error("timeout: {message}")]
    Timeout { message: String },

    /// Connection pool exhausted
    #[error("pool exhausted: {message}")]
    PoolExhausted { message: String },

    /// Unsupported operation for this backend
    #[error("unsupported: {message}")]
    Unsupported { message: String },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection { .. } => ErrorCategory::Connection,
            Self::Query { .. } => ErrorCategory::Query,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Identity { .. } => ErrorCategory::Identity,
            Self::Constraint { .. } => ErrorCategory::Constraint,
            Self::Mapping { .. } => ErrorCategory::Mapping,
            Self::Statement { .. } => ErrorCategory::Statement,
            Self::TypeConversion { .. } => ErrorCategory::TypeConversion,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::PoolExhausted { .. } => ErrorCategory::PoolExhausted,
            Self::Unsupported { .. } => ErrorCategory::Other,
        }
    }

    /// Whether this error is retriable
    #[inline]
    pub fn is_retriable(&self) -> bool {
        self.category().is_retriable()
    }

    /// Whether this error is a connectivity failure
    #[inline]
    pub fn is_connectivity(&self) -> bool {
        self.category().is_connectivity()
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a query error
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: None,
            source: None,
        }
    }

    /// Create a query error with SQL
    pub fn query_with_sql(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: Some(sql.into()),
            source: None,
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an identity error for an entity type
    pub fn identity(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Identity {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Create a constraint error for an entity type
    pub fn constraint(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Constraint {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Create a mapping error listing the offending column types
    pub fn mapping(entity: impl Into<String>, columns: impl Into<String>) -> Self {
        Self::Mapping {
            entity: entity.into(),
            columns: columns.into(),
        }
    }

    /// Create a statement construction error
    pub fn statement(message: impl Into<String>) -> Self {
        Self::Statement {
            message: message.into(),
        }
    }

    /// Create a type conversion error
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::config(err.to_string())
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Query => write!(f, "query"),
            Self::Configuration => write!(f, "configuration"),
            Self::Identity => write!(f, "identity"),
            Self::Constraint => write!(f, "constraint"),
            Self::Mapping => write!(f, "mapping"),
            Self::Statement => write!(f, "statement"),
            Self::TypeConversion => write!(f, "type_conversion"),
            Self::Timeout => write!(f, "timeout"),
            Self::PoolExhausted => write!(f, "pool_exhausted"),
            Self::Other => write!(f, "other"),
        }
    }
}
