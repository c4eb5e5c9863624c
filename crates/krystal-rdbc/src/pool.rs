//! Connection pool for krystal-rdbc
//!
//! One pool per provider, created lazily by the executor:
//! - Semaphore-bounded size, LIFO reuse of idle connections
//! - Validation on borrow, recycling by lifetime and idle time
//! - Atomic statistics
//!
//! # Example
//!
//! ```rust,ignore
//! use krystal_rdbc::pool::{ConnectionPool, PoolConfig, SimpleConnectionPool};
//! use krystal_rdbc::postgres::PgConnectionFactory;
//!
//! let pool = SimpleConnectionPool::new(
//!     PoolConfig::new("postgres://localhost/db").with_max_size(3),
//!     Arc::new(PgConnectionFactory),
//! ).await?;
//!
//! let conn = pool.get().await?;
//! conn.execute("DELETE FROM MASZYNY WHERE linia IS NULL").await?;
//! // Connection is returned to pool when dropped
//! ```

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell, Semaphore};
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionConfig, ConnectionFactory};
use crate::error::{Error, Result};
use crate::types::QueryResult;

/// Connection pool trait
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Get a connection from the pool
    async fn get(&self) -> Result<PooledConnection>;

    /// Return a connection to the pool
    async fn return_connection(&self, conn: Box<dyn Connection>, created_at: Instant);

    /// Give up a borrowed connection without returning it
    fn discard(&self);

    /// Get current pool size
    fn size(&self) -> usize;

    /// Get number of idle connections
    fn idle(&self) -> usize;

    /// Get number of connections in use
    fn in_use(&self) -> usize {
        self.size().saturating_sub(self.idle())
    }

    /// Get pool statistics
    fn stats(&self) -> PoolStats;

    /// Close all connections and shutdown the pool
    async fn close(&self) -> Result<()>;
}

/// A connection borrowed from the pool.
///
/// Dropping it hands the connection back, on success and error paths alike.
pub struct PooledConnection {
    conn: Box<dyn Connection>,
    created_at: Instant,
    pool: Arc<dyn ConnectionPool>,
}

impl PooledConnection {
    /// Wrap a connection opened at `created_at`
    pub fn new(conn: Box<dyn Connection>, created_at: Instant, pool: Arc<dyn ConnectionPool>) -> Self {
        Self {
            conn,
            created_at,
            pool,
        }
    }

    /// Time since the underlying connection was opened
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = std::mem::replace(&mut self.conn, Box::new(ReturnedConnection));
        let pool = self.pool.clone();
        let created_at = self.created_at;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    pool.return_connection(conn, created_at).await;
                });
            }
            // No runtime left to return on; close by dropping.
            Err(_) => pool.discard(),
        }
    }
}

/// Stands in for a connection already handed back to its pool
struct ReturnedConnection;

#[async_trait]
impl Connection for ReturnedConnection {
    async fn query(&self, _sql: &str) -> Result<QueryResult> {
        Err(Error::connection("connection already returned to the pool"))
    }

    async fn execute(&self, _sql: &str) -> Result<u64> {
        Err(Error::connection("connection already returned to the pool"))
    }

    async fn is_valid(&self) -> bool {
        false
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connection configuration
    pub connection: ConnectionConfig,
    /// Minimum pool size (opened eagerly)
    pub min_size: usize,
    /// Maximum pool size
    pub max_size: usize,
    /// Maximum time to wait for a connection
    pub acquire_timeout: Duration,
    /// Maximum connection lifetime (for recycling)
    pub max_lifetime: Duration,
    /// Idle timeout (connections idle longer are closed)
    pub idle_timeout: Duration,
    /// Whether to test connections on borrow
    pub test_on_borrow: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            min_size: 0,
            max_size: 3,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: Duration::from_secs(1800), // 30 minutes
            idle_timeout: Duration::from_secs(600),  // 10 minutes
            test_on_borrow: true,
        }
    }
}

impl PoolConfig {
    /// Create pool config from a connection URL
    pub fn new(url: impl Into<String>) -> Self {
        Self::from_connection(ConnectionConfig::new(url))
    }

    /// Create pool config around a full connection configuration
    pub fn from_connection(connection: ConnectionConfig) -> Self {
        Self {
            connection,
            ..Default::default()
        }
    }

    /// Replace the connection configuration, keeping pool settings
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    /// Set minimum pool size
    pub fn with_min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }

    /// Set maximum pool size
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Set acquire timeout
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set maximum connection lifetime
    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Set idle timeout
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Enable/disable test on borrow
    pub fn with_test_on_borrow(mut self, test: bool) -> Self {
        self.test_on_borrow = test;
        self
    }
}

/// Pool statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of connections created
    pub connections_created: u64,
    /// Total number of connections closed
    pub connections_closed: u64,
    /// Total number of connection acquisitions
    pub acquisitions: u64,
    /// Number of times pool was exhausted
    pub exhausted_count: u64,
    /// Total wait time for connections (in milliseconds)
    pub total_wait_time_ms: u64,
    /// Number of validation failures
    pub health_check_failures: u64,
}

/// Atomic pool stats for concurrent updates
#[derive(Debug, Default)]
#[allow(missing_docs)]
pub struct AtomicPoolStats {
    pub connections_created: AtomicU64,
    pub connections_closed: AtomicU64,
    pub acquisitions: AtomicU64,
    pub exhausted_count: AtomicU64,
    pub total_wait_time_ms: AtomicU64,
    pub health_check_failures: AtomicU64,
}

impl AtomicPoolStats {
    /// Create new atomic stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection creation
    pub fn record_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection close
    pub fn record_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an acquisition
    pub fn record_acquisition(&self, wait_time_ms: u64) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        self.total_wait_time_ms
            .fetch_add(wait_time_ms, Ordering::Relaxed);
    }

    /// Record pool exhaustion
    pub fn record_exhausted(&self) {
        self.exhausted_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record validation failure
    pub fn record_health_check_failure(&self) {
        self.health_check_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot current stats
    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            exhausted_count: self.exhausted_count.load(Ordering::Relaxed),
            total_wait_time_ms: self.total_wait_time_ms.load(Ordering::Relaxed),
            health_check_failures: self.health_check_failures.load(Ordering::Relaxed),
        }
    }

    /// Calculate average wait time in milliseconds
    pub fn avg_wait_time_ms(&self) -> f64 {
        let acquisitions = self.acquisitions.load(Ordering::Relaxed);
        if acquisitions == 0 {
            0.0
        } else {
            self.total_wait_time_ms.load(Ordering::Relaxed) as f64 / acquisitions as f64
        }
    }
}

// ============================================================================
// SimpleConnectionPool
// ============================================================================

/// Semaphore-bounded connection pool.
///
/// A permit is held for every borrowed connection and released when the
/// connection comes back (or is discarded), so at most `max_size`
/// connections are ever open.
pub struct SimpleConnectionPool {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    /// Idle connections, LIFO
    idle: Mutex<Vec<PoolEntry>>,
    idle_count: AtomicUsize,
    semaphore: Semaphore,
    total_connections: AtomicUsize,
    stats: Arc<AtomicPoolStats>,
    shutdown: AtomicBool,
    self_ref: OnceCell<Weak<Self>>,
}

struct PoolEntry {
    conn: Box<dyn Connection>,
    created_at: Instant,
    last_used: Instant,
}

impl SimpleConnectionPool {
    /// Create a new connection pool.
    ///
    /// Opens `min_size` connections eagerly; failures there are logged and
    /// left for later borrows to retry.
    pub async fn new(config: PoolConfig, factory: Arc<dyn ConnectionFactory>) -> Result<Arc<Self>> {
        if config.max_size == 0 {
            return Err(Error::config("pool max_size must be at least 1"));
        }
        let pool = Arc::new(Self {
            semaphore: Semaphore::new(config.max_size),
            idle: Mutex::new(Vec::with_capacity(config.max_size)),
            idle_count: AtomicUsize::new(0),
            config,
            factory,
            total_connections: AtomicUsize::new(0),
            stats: Arc::new(AtomicPoolStats::new()),
            shutdown: AtomicBool::new(false),
            self_ref: OnceCell::new(),
        });

        let _ = pool.self_ref.set(Arc::downgrade(&pool));

        for _ in 0..pool.config.min_size.min(pool.config.max_size) {
            match pool.create_connection().await {
                Ok(conn) => {
                    let now = Instant::now();
                    pool.push_idle(PoolEntry {
                        conn,
                        created_at: now,
                        last_used: now,
                    })
                    .await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to pre-open pooled connection");
                    break;
                }
            }
        }

        Ok(pool)
    }

    fn get_self_arc(&self) -> Option<Arc<Self>> {
        self.self_ref.get().and_then(|w| w.upgrade())
    }

    async fn create_connection(&self) -> Result<Box<dyn Connection>> {
        let conn = self.factory.connect(&self.config.connection).await?;
        self.total_connections.fetch_add(1, Ordering::Release);
        self.stats.record_created();
        debug!(family = %self.factory.family(), "Opened pooled connection");
        Ok(conn)
    }

    async fn push_idle(&self, entry: PoolEntry) {
        let mut idle = self.idle.lock().await;
        idle.push(entry);
        self.idle_count.store(idle.len(), Ordering::Release);
    }

    fn forget_connection(&self) {
        self.total_connections.fetch_sub(1, Ordering::Release);
        self.stats.record_closed();
    }

    fn should_recycle(&self, entry: &PoolEntry) -> bool {
        entry.created_at.elapsed() > self.config.max_lifetime
            || entry.last_used.elapsed() > self.config.idle_timeout
    }

    /// Pop idle connections until one is fresh and valid
    async fn take_idle(&self) -> Option<(Box<dyn Connection>, Instant)> {
        let mut idle = self.idle.lock().await;
        let found = loop {
            let Some(entry) = idle.pop() else {
                break None;
            };
            if self.should_recycle(&entry) {
                let _ = entry.conn.close().await;
                self.forget_connection();
                continue;
            }
            if self.config.test_on_borrow && !entry.conn.is_valid().await {
                self.forget_connection();
                self.stats.record_health_check_failure();
                continue;
            }
            break Some((entry.conn, entry.created_at));
        };
        self.idle_count.store(idle.len(), Ordering::Release);
        found
    }

    /// Get pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

#[async_trait]
impl ConnectionPool for SimpleConnectionPool {
    async fn get(&self) -> Result<PooledConnection> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(Error::PoolExhausted {
                message: "Pool is shut down".to_string(),
            });
        }

        let start = Instant::now();

        let permit = tokio::time::timeout(self.config.acquire_timeout, self.semaphore.acquire())
            .await
            .map_err(|_| {
                self.stats.record_exhausted();
                Error::PoolExhausted {
                    message: format!(
                        "Timeout waiting for connection ({}ms)",
                        self.config.acquire_timeout.as_millis()
                    ),
                }
            })?
            .map_err(|_| Error::PoolExhausted {
                message: "Pool semaphore closed".to_string(),
            })?;

        let pool_arc = self.get_self_arc().ok_or_else(|| Error::PoolExhausted {
            message: "Pool has been dropped".to_string(),
        })?;

        let (conn, created_at) = match self.take_idle().await {
            Some(found) => found,
            // The permit drops with the error, releasing the slot.
            None => (self.create_connection().await?, Instant::now()),
        };

        let wait_ms = start.elapsed().as_millis() as u64;
        self.stats.record_acquisition(wait_ms);

        // Released by return_connection or discard
        permit.forget();

        Ok(PooledConnection::new(conn, created_at, pool_arc))
    }

    async fn return_connection(&self, conn: Box<dyn Connection>, created_at: Instant) {
        self.semaphore.add_permits(1);

        if self.shutdown.load(Ordering::Acquire) {
            let _ = conn.close().await;
            self.forget_connection();
            return;
        }

        self.push_idle(PoolEntry {
            conn,
            created_at,
            last_used: Instant::now(),
        })
        .await;
    }

    fn discard(&self) {
        self.semaphore.add_permits(1);
        self.forget_connection();
    }

    fn size(&self) -> usize {
        self.total_connections.load(Ordering::Acquire)
    }

    fn idle(&self) -> usize {
        self.idle_count.load(Ordering::Acquire)
    }

    fn stats(&self) -> PoolStats {
        self.stats.snapshot()
    }

    async fn close(&self) -> Result<()> {
        self.shutdown.store(true, Ordering::Release);

        let mut idle = self.idle.lock().await;
        for entry in idle.drain(..) {
            let _ = entry.conn.close().await;
            self.forget_connection();
        }
        self.idle_count.store(0, Ordering::Release);

        Ok(())
    }
}
