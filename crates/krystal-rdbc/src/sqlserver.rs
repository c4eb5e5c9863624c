//! SQL Server backend for krystal-rdbc
//!
//! Uses tiberius over a tokio TCP stream. The provider URL carries host and
//! database (`sqlserver://host[:port]/database`); credentials and TLS
//! settings come from the provider properties.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tiberius::{AuthMethod, Client, ColumnData, ColumnType, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use crate::connection::{Connection, ConnectionConfig, ConnectionFactory};
use crate::dialect::DialectFamily;
use crate::error::{Error, Result};
use crate::types::{QueryResult, ResultColumn, Row, SqlType, Value};

const DEFAULT_PORT: u16 = 1433;

/// Declared column type of a TDS column
fn sql_type_of(column_type: ColumnType) -> SqlType {
    match column_type {
        ColumnType::Null => SqlType::Null,
        ColumnType::Bit | ColumnType::Bitn => SqlType::Boolean,
        ColumnType::Int1 | ColumnType::Int2 => SqlType::SmallInt,
        ColumnType::Int4 | ColumnType::Intn => SqlType::Integer,
        ColumnType::Int8 => SqlType::BigInt,
        ColumnType::Float4 => SqlType::Real,
        ColumnType::Float8 | ColumnType::Floatn => SqlType::Double,
        ColumnType::Money | ColumnType::Money4 | ColumnType::Decimaln | ColumnType::Numericn => {
            SqlType::Decimal
        }
        ColumnType::Guid => SqlType::Uuid,
        ColumnType::Daten => SqlType::Date,
        ColumnType::Timen => SqlType::Time,
        ColumnType::Datetime
        | ColumnType::Datetime4
        | ColumnType::Datetimen
        | ColumnType::Datetime2 => SqlType::Timestamp,
        ColumnType::DatetimeOffsetn => SqlType::TimestampTz,
        ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image => SqlType::Binary,
        _ => SqlType::Varchar,
    }
}

/// Convert one cell.
///
/// Plain data is read from the raw column data; temporal values go through
/// the chrono conversions of the row.
fn cell_value(row: &tiberius::Row, idx: usize, data: &ColumnData<'static>) -> Value {
    match data {
        ColumnData::Bit(v) => v.map(Value::Bool).unwrap_or(Value::Null),
        ColumnData::U8(v) => v.map(|v| Value::Int16(i16::from(v))).unwrap_or(Value::Null),
        ColumnData::I16(v) => v.map(Value::Int16).unwrap_or(Value::Null),
        ColumnData::I32(v) => v.map(Value::Int32).unwrap_or(Value::Null),
        ColumnData::I64(v) => v.map(Value::Int64).unwrap_or(Value::Null),
        ColumnData::F32(v) => v.map(Value::Float32).unwrap_or(Value::Null),
        ColumnData::F64(v) => v.map(Value::Float64).unwrap_or(Value::Null),
        ColumnData::Numeric(v) => v
            .map(|n| Value::Decimal(Decimal::from_i128_with_scale(n.value(), u32::from(n.scale()))))
            .unwrap_or(Value::Null),
        ColumnData::Guid(v) => v.map(Value::Uuid).unwrap_or(Value::Null),
        ColumnData::String(v) => v
            .as_ref()
            .map(|s| Value::String(s.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Binary(v) => v
            .as_ref()
            .map(|b| Value::Bytes(b.to_vec()))
            .unwrap_or(Value::Null),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|x| Value::String(x.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Date(_) => row
            .try_get::<chrono::NaiveDate, _>(idx)
            .ok()
            .flatten()
            .map(Value::Date)
            .unwrap_or(Value::Null),
        ColumnData::Time(_) => row
            .try_get::<chrono::NaiveTime, _>(idx)
            .ok()
            .flatten()
            .map(Value::Time)
            .unwrap_or(Value::Null),
        ColumnData::DateTimeOffset(_) => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(idx)
            .ok()
            .flatten()
            .map(Value::DateTimeTz)
            .unwrap_or(Value::Null),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => row
            .try_get::<chrono::NaiveDateTime, _>(idx)
            .ok()
            .flatten()
            .map(Value::DateTime)
            .unwrap_or(Value::Null),
    }
}

/// Convert a TDS result set.
///
/// Variable width columns (`intn`, `floatn`, ...) take the type of their
/// first non-null value.
fn to_query_result(tib_rows: Vec<tiberius::Row>) -> QueryResult {
    let Some(first) = tib_rows.first() else {
        return QueryResult::empty();
    };
    let names: Vec<String> = first.columns().iter().map(|c| c.name().to_string()).collect();
    let mut types: Vec<SqlType> = first
        .columns()
        .iter()
        .map(|c| sql_type_of(c.column_type()))
        .collect();
    let mut refined = vec![false; types.len()];

    let rows: Vec<Row> = tib_rows
        .iter()
        .map(|tib_row| {
            let values: Vec<Value> = tib_row
                .cells()
                .enumerate()
                .map(|(idx, (_, data))| cell_value(tib_row, idx, data))
                .collect();
            for (idx, value) in values.iter().enumerate() {
                if !refined[idx] && !value.is_null() {
                    types[idx] = value.sql_type();
                    refined[idx] = true;
                }
            }
            Row::new(names.clone(), values)
        })
        .collect();

    let columns = names
        .iter()
        .zip(types)
        .map(|(name, sql_type)| ResultColumn::new(name.as_str(), sql_type))
        .collect();
    QueryResult::new(columns, rows)
}

fn flag(config: &ConnectionConfig, key: &str) -> Option<bool> {
    config
        .property(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "yes" | "1"))
}

/// tiberius configuration from the provider URL and properties
fn client_config(config: &ConnectionConfig) -> Result<Config> {
    let url = url::Url::parse(&config.url)
        .map_err(|e| Error::config(format!("invalid SQL Server url: {}", e)))?;

    let mut tib = Config::new();
    tib.host(url.host_str().unwrap_or("localhost"));
    let port = match config.property("port") {
        Some(port) => port
            .parse::<u16>()
            .map_err(|e| Error::config(format!("invalid SQL Server port '{}': {}", port, e)))?,
        None => url.port().unwrap_or(DEFAULT_PORT),
    };
    tib.port(port);
    tib.database(url.path().trim_start_matches('/'));
    tib.application_name(config.property("application_name").unwrap_or("krystal-rdbc"));

    let user = config
        .property("user")
        .or_else(|| Some(url.username()).filter(|u| !u.is_empty()));
    let password = config.property("password").or(url.password()).unwrap_or("");
    match user {
        Some(user) => tib.authentication(AuthMethod::sql_server(user, password)),
        None => {
            return Err(Error::config(format!(
                "no user configured for {}",
                url.host_str().unwrap_or("SQL Server")
            )))
        }
    }

    if flag(config, "trust_cert")
        .or_else(|| flag(config, "trustServerCertificate"))
        .unwrap_or(false)
    {
        tib.trust_cert();
    }
    if flag(config, "encrypt") == Some(false) {
        tib.encryption(EncryptionLevel::NotSupported);
    }
    Ok(tib)
}

/// Run `fut`, failing with a timeout error after `ms` milliseconds (0 = never)
async fn within<T>(ms: u64, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    if ms == 0 {
        return fut.await;
    }
    tokio::time::timeout(Duration::from_millis(ms), fut)
        .await
        .map_err(|_| Error::timeout(format!("{} timed out after {}ms", what, ms)))?
}

/// SQL Server connection
pub struct SqlServerConnection {
    client: Mutex<Client<Compat<TcpStream>>>,
    query_timeout_ms: u64,
    closed: AtomicBool,
}

impl SqlServerConnection {
    /// Open a connection
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let tib = client_config(config)?;
        let client = within(config.connect_timeout_ms, "connect", async {
            let tcp = TcpStream::connect(tib.get_addr())
                .await
                .map_err(|e| Error::connection_with_source("failed to connect", e))?;
            tcp.set_nodelay(true).ok();
            Client::connect(tib, tcp.compat_write())
                .await
                .map_err(|e| Error::connection_with_source("failed to authenticate", e))
        })
        .await?;
        debug!(url = %config.url, "SQL Server connection established");

        Ok(Self {
            client: Mutex::new(client),
            query_timeout_ms: config.query_timeout_ms,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(Error::connection("connection is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for SqlServerConnection {
    async fn query(&self, sql: &str) -> Result<QueryResult> {
        self.ensure_open()?;
        within(self.query_timeout_ms, "query", async {
            let mut client = self.client.lock().await;
            let stream = client
                .simple_query(sql)
                .await
                .map_err(|e| Error::query_with_sql(e.to_string(), sql))?;
            let rows = stream
                .into_first_result()
                .await
                .map_err(|e| Error::query_with_sql(e.to_string(), sql))?;
            Ok(to_query_result(rows))
        })
        .await
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.ensure_open()?;
        within(self.query_timeout_ms, "execute", async {
            let mut client = self.client.lock().await;
            let result = client
                .execute(sql, &[])
                .await
                .map_err(|e| Error::query_with_sql(e.to_string(), sql))?;
            Ok(result.total())
        })
        .await
    }

    async fn is_valid(&self) -> bool {
        if self.closed.load(Ordering::Relaxed) {
            return false;
        }
        let mut client = self.client.lock().await;
        client.execute("SELECT 1", &[]).await.is_ok()
    }

    async fn close(&self) -> Result<()> {
        // The TDS session ends when the client is dropped.
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// SQL Server connection factory
#[derive(Debug, Clone, Default)]
pub struct SqlServerConnectionFactory;

#[async_trait]
impl ConnectionFactory for SqlServerConnectionFactory {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let conn = SqlServerConnection::connect(config).await?;
        Ok(Box::new(conn))
    }

    fn family(&self) -> DialectFamily {
        DialectFamily::SqlServer
    }
}
