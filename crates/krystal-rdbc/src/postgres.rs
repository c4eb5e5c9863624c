//! PostgreSQL backend for krystal-rdbc
//!
//! - Connection over tokio-postgres, results carry declared column types
//! - Factory building the client configuration from provider properties

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_postgres::types::{FromSql, Type};
use tracing::{error, warn};

use crate::connection::{Connection, ConnectionConfig, ConnectionFactory};
use crate::dialect::DialectFamily;
use crate::error::{Error, Result};
use crate::types::{QueryResult, ResultColumn, Row, SqlType, Value};

/// Declared column type of a PostgreSQL type
fn sql_type_of(pg_type: &Type) -> SqlType {
    match *pg_type {
        Type::BOOL => SqlType::Boolean,
        Type::INT2 => SqlType::SmallInt,
        Type::INT4 => SqlType::Integer,
        Type::INT8 => SqlType::BigInt,
        Type::FLOAT4 => SqlType::Real,
        Type::FLOAT8 => SqlType::Double,
        Type::NUMERIC => SqlType::Decimal,
        Type::BYTEA => SqlType::Binary,
        Type::DATE => SqlType::Date,
        Type::TIME => SqlType::Time,
        Type::TIMESTAMP => SqlType::Timestamp,
        Type::TIMESTAMPTZ => SqlType::TimestampTz,
        Type::UUID => SqlType::Uuid,
        Type::JSON | Type::JSONB => SqlType::Json,
        _ => SqlType::Varchar,
    }
}

fn cell<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, idx: usize, f: fn(T) -> Value) -> Value {
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(v)) => f(v),
        Ok(None) => Value::Null,
        Err(e) => {
            warn!(column = idx, error = %e, "Unreadable PostgreSQL value, using NULL");
            Value::Null
        }
    }
}

/// Convert a PostgreSQL value to a Value
fn pg_value_to_value(row: &tokio_postgres::Row, idx: usize, sql_type: SqlType) -> Value {
    match sql_type {
        SqlType::Boolean => cell(row, idx, Value::Bool),
        SqlType::SmallInt => cell(row, idx, Value::Int16),
        SqlType::Integer => cell(row, idx, Value::Int32),
        SqlType::BigInt => cell(row, idx, Value::Int64),
        SqlType::Real => cell(row, idx, Value::Float32),
        SqlType::Double => cell(row, idx, Value::Float64),
        SqlType::Decimal => cell(row, idx, Value::Decimal),
        SqlType::Binary => cell(row, idx, Value::Bytes),
        SqlType::Date => cell(row, idx, Value::Date),
        SqlType::Time => cell(row, idx, Value::Time),
        SqlType::Timestamp => cell(row, idx, Value::DateTime),
        SqlType::TimestampTz => cell(row, idx, Value::DateTimeTz),
        SqlType::Uuid => cell(row, idx, Value::Uuid),
        SqlType::Json => cell(row, idx, Value::Json),
        SqlType::Varchar | SqlType::Null => cell(row, idx, Value::String),
    }
}

/// PostgreSQL connection implementation
pub struct PgConnection {
    client: tokio_postgres::Client,
    closed: AtomicBool,
}

impl PgConnection {
    /// Create a new connection from a tokio-postgres client
    pub fn new(client: tokio_postgres::Client) -> Self {
        Self {
            client,
            closed: AtomicBool::new(false),
        }
    }

    /// Get the underlying client
    pub fn client(&self) -> &tokio_postgres::Client {
        &self.client
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(Error::connection("connection is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn query(&self, sql: &str) -> Result<QueryResult> {
        self.ensure_open()?;

        // Prepared first so column types are known even for empty results.
        let statement = self
            .client
            .prepare(sql)
            .await
            .map_err(|e| Error::query_with_sql(e.to_string(), sql))?;
        let columns: Vec<ResultColumn> = statement
            .columns()
            .iter()
            .map(|c| ResultColumn::new(c.name(), sql_type_of(c.type_())))
            .collect();

        let pg_rows = self
            .client
            .query(&statement, &[])
            .await
            .map_err(|e| Error::query_with_sql(e.to_string(), sql))?;

        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let rows = pg_rows
            .iter()
            .map(|pg_row| {
                let values = columns
                    .iter()
                    .enumerate()
                    .map(|(i, c)| pg_value_to_value(pg_row, i, c.sql_type))
                    .collect();
                Row::new(names.clone(), values)
            })
            .collect();

        Ok(QueryResult::new(columns, rows))
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.ensure_open()?;
        self.client
            .execute(sql, &[])
            .await
            .map_err(|e| Error::query_with_sql(e.to_string(), sql))
    }

    async fn is_valid(&self) -> bool {
        if self.closed.load(Ordering::Relaxed) {
            return false;
        }
        self.client.simple_query("SELECT 1").await.is_ok()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// Client configuration from the provider URL and properties
fn client_config(config: &ConnectionConfig) -> Result<tokio_postgres::Config> {
    let mut pg: tokio_postgres::Config = config
        .url
        .parse()
        .map_err(|e| Error::config(format!("invalid PostgreSQL url: {}", e)))?;
    if let Some(user) = config.property("user") {
        pg.user(user);
    }
    if let Some(password) = config.property("password") {
        pg.password(password);
    }
    if let Some(port) = config.property("port") {
        let port = port
            .parse::<u16>()
            .map_err(|e| Error::config(format!("invalid PostgreSQL port '{}': {}", port, e)))?;
        pg.port(port);
    }
    pg.application_name(config.property("application_name").unwrap_or("krystal-rdbc"));
    pg.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    Ok(pg)
}

/// PostgreSQL connection factory
#[derive(Debug, Clone, Default)]
pub struct PgConnectionFactory;

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let pg = client_config(config)?;
        let (client, connection) = pg
            .connect(tokio_postgres::NoTls)
            .await
            .map_err(|e| Error::connection_with_source("failed to connect", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection error");
            }
        });

        Ok(Box::new(PgConnection::new(client)))
    }

    fn family(&self) -> DialectFamily {
        DialectFamily::Postgres
    }
}
