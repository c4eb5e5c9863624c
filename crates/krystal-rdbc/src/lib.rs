//! # krystal-rdbc
//!
//! Database access engine: a composable SQL statement builder, provider-aware
//! pooled execution, a declarative object mapper and a lease-based object
//! cache.
//!
//! ## Features
//!
//! - **Statement Builder**: SELECT/INSERT/UPDATE/DELETE/UNION as values,
//!   rendered lazily for the target dialect
//! - **Providers**: named databases configured from YAML files, each with
//!   its own connection pool
//! - **Degrading Executor**: connectivity failures are logged and yield
//!   empty results instead of failing a whole batch
//! - **Object Mapper**: load, instantiate, save, delete and copy entities
//!   through static descriptors
//! - **Object Cache**: leases renewed on use, swept by a background task
//! - **Filters**: a `name$OP=value` parameter language for queries and
//!   in-memory matching
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use krystal_rdbc::prelude::*;
//! use std::sync::Arc;
//!
//! let config = EngineConfig::from_file("krystal.yaml")?;
//! let registry = ProviderRegistry::load(&config);
//! let persistence = Persistence::new(Arc::new(QueryExecutor::new(config, registry)));
//!
//! // Machine implements Entity
//! let mut machine = Machine { linia: 5, ..Default::default() };
//! if persistence.load(&mut machine).await? {
//!     machine.nazwa = "Prasa".into();
//!     persistence.save(&mut machine).await?;
//! }
//!
//! let mut params = Params::new();
//! params.insert("linia$LESS".into(), vec!["100".into()]);
//! let filters = PersistenceFilters::from_params(&params);
//! let machines: Vec<Machine> = persistence.find_all(1, &filters).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `postgres` - PostgreSQL support via tokio-postgres
//! - `sqlserver` - SQL Server support via tiberius
//! - `full` - All backends enabled

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod cache;
pub mod column;
pub mod comparison;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod executor;
pub mod filters;
pub mod literal;
pub mod persistence;
pub mod pool;
pub mod provider;
pub mod security;
pub mod statement;
pub mod types;

// Backend implementations (conditionally compiled)
#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlserver")]
pub mod sqlserver;

/// Prelude module for convenient imports
pub mod prelude {
    // Error types
    pub use crate::error::{Error, ErrorCategory, Result};

    // Value and type system
    pub use crate::literal::{format_literal, parse_literal, LiteralFormat};
    pub use crate::types::{QueryResult, ResultColumn, Row, SqlType, Value};

    // Statement building
    pub use crate::column::{Column, Function, JoinType, Table};
    pub use crate::comparison::{Comparison, Delimiter, Operator};
    pub use crate::dialect::{dialect_for, dialect_of, DialectFamily, SqlDialect};
    pub use crate::statement::{
        Delete, Direction, Insert, RenderContext, Select, Statement, StatementKind, Update,
    };

    // Configuration, providers and execution
    pub use crate::config::{CacheSettings, EngineConfig, PoolSettings, ProviderEntry};
    pub use crate::connection::{Connection, ConnectionConfig, ConnectionFactory};
    pub use crate::executor::QueryExecutor;
    pub use crate::pool::{ConnectionPool, PoolConfig, PoolStats, PooledConnection, SimpleConnectionPool};
    pub use crate::provider::{Driver, Provider, ProviderProperties, ProviderRegistry};

    // Object mapping
    pub use crate::cache::{CacheReport, ObjectCache};
    pub use crate::entity::{
        ColumnMapping, Entity, EntityDescriptor, FieldDescriptor, FieldRole, Reader, StatementFn,
        Vertical,
    };
    pub use crate::filters::{Params, PersistenceFilters, StatementModifiers, ValuesFilter, ValuesOrder};
    pub use crate::persistence::{Operation, Persistence};
}

// Re-export commonly used items at crate root
pub use error::{Error, Result};
pub use types::Value;
