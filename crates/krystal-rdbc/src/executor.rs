//! Statement execution against pooled provider connections.
//!
//! The executor owns one lazily created pool per provider. Reads and writes
//! degrade on connectivity failures: the failure is logged and the call
//! yields an empty result or zero affected rows, so one unreachable
//! database does not fail a batch that mostly targets others. Statement
//! and configuration errors still propagate.

use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, trace};

use crate::config::EngineConfig;
use crate::connection::ConnectionFactory;
use crate::dialect::DialectFamily;
use crate::error::{Error, Result};
use crate::pool::{ConnectionPool, PoolConfig, PooledConnection, SimpleConnectionPool};
use crate::provider::{Provider, ProviderRegistry};
use crate::statement::{RenderContext, Statement, StatementKind};
use crate::types::QueryResult;

type PoolConfigurator = Arc<dyn Fn(PoolConfig) -> PoolConfig + Send + Sync>;

/// Executes statements on the provider they resolve to
pub struct QueryExecutor {
    config: EngineConfig,
    registry: ProviderRegistry,
    factories: DashMap<DialectFamily, Arc<dyn ConnectionFactory>>,
    configurators: DashMap<String, PoolConfigurator>,
    pools: DashMap<String, Arc<OnceCell<Arc<SimpleConnectionPool>>>>,
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("registry", &self.registry)
            .field("pools", &self.pools.len())
            .finish()
    }
}

/// Whether a rendered statement of `kind` returns rows on `provider`
fn returns_rows(provider: &Provider, kind: StatementKind) -> bool {
    match kind {
        StatementKind::Select => true,
        kind if kind.is_modifying() => provider.dialect().supports_output(kind),
        _ => false,
    }
}

/// Statements of one provider, in caller order, with their caller index
struct WriteGroup {
    provider: Provider,
    statements: Vec<(usize, String)>,
}

impl QueryExecutor {
    /// Create an executor.
    ///
    /// Factories for the backends compiled into the crate are registered
    /// up front; others can be added with [`QueryExecutor::register_factory`].
    pub fn new(config: EngineConfig, registry: ProviderRegistry) -> Self {
        let executor = Self {
            config,
            registry,
            factories: DashMap::new(),
            configurators: DashMap::new(),
            pools: DashMap::new(),
        };
        #[cfg(feature = "postgres")]
        executor.register_factory(Arc::new(crate::postgres::PgConnectionFactory));
        #[cfg(feature = "sqlserver")]
        executor.register_factory(Arc::new(crate::sqlserver::SqlServerConnectionFactory));
        executor
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Provider registry
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Register the connection factory for its dialect family
    pub fn register_factory(&self, factory: Arc<dyn ConnectionFactory>) {
        self.factories.insert(factory.family(), factory);
    }

    /// Adjust the pool configuration of one provider before its pool opens
    pub fn configure_pool<F>(&self, provider: &str, configurator: F)
    where
        F: Fn(PoolConfig) -> PoolConfig + Send + Sync + 'static,
    {
        self.configurators
            .insert(provider.to_string(), Arc::new(configurator));
    }

    async fn create_pool(&self, provider: &Provider) -> Result<Arc<SimpleConnectionPool>> {
        let family = provider.driver().family();
        let factory = self
            .factories
            .get(&family)
            .map(|f| f.value().clone())
            .ok_or_else(|| {
                Error::config(format!(
                    "no connection factory registered for {} (provider '{}')",
                    family, provider
                ))
            })?;
        let connection = self.registry.connection_config(provider.name())?.clone();
        let mut pool_config = self
            .config
            .pool_config(connection.url.clone())
            .with_connection(connection);
        if let Some(configurator) = self.configurators.get(provider.name()) {
            pool_config = (configurator.value())(pool_config);
        }
        debug!(provider = %provider, max_size = pool_config.max_size, "Creating connection pool");
        SimpleConnectionPool::new(pool_config, factory).await
    }

    /// Borrow a connection of a provider.
    ///
    /// The provider's pool is created on first use, exactly once even when
    /// many tasks ask concurrently.
    pub async fn connection(&self, provider: &Provider) -> Result<PooledConnection> {
        let cell = self
            .pools
            .entry(provider.name().to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        let pool = cell
            .get_or_try_init(|| self.create_pool(provider))
            .await?;
        pool.get().await
    }

    /// Pool of a provider, if it was created
    pub fn pool(&self, provider: &str) -> Option<Arc<SimpleConnectionPool>> {
        self.pools
            .get(provider)
            .and_then(|cell| cell.get().cloned())
    }

    /// The statement's own provider, else the given one, else the default
    pub fn resolve(&self, provider: Option<&Provider>, statement: &Statement) -> Provider {
        self.registry.resolve(statement.provider().or(provider))
    }

    /// Render a statement for a provider's dialect
    pub fn render(&self, statement: &mut Statement, provider: &Provider) -> Result<String> {
        let ctx = RenderContext::new(provider.dialect(), &self.config);
        statement.render(&ctx).map(str::to_string)
    }

    async fn query_sql(&self, provider: &Provider, sql: &str) -> Result<QueryResult> {
        let conn = self.connection(provider).await?;
        trace!(provider = %provider, sql = %sql, "Querying database");
        conn.query(sql)
            .await
            .map_err(|e| match e {
                Error::Query { message, sql: None, source } => Error::Query {
                    message,
                    sql: Some(sql.to_string()),
                    source,
                },
                other => other,
            })
    }

    async fn read_sql(&self, provider: &Provider, sql: &str) -> Result<QueryResult> {
        match self.query_sql(provider, sql).await {
            Ok(result) => Ok(result),
            Err(e) if e.is_connectivity() => {
                error!(provider = %provider, sql = %sql, error = %e, "Read failed, returning empty result");
                Ok(QueryResult::empty())
            }
            Err(e) => Err(e),
        }
    }

    /// Run a statement that returns rows.
    ///
    /// Statement errors propagate; connectivity errors yield an empty result.
    pub async fn read(&self, provider: Option<&Provider>, mut statement: Statement) -> Result<QueryResult> {
        let provider = self.resolve(provider, &statement);
        let sql = self.render(&mut statement, &provider)?;
        self.read_sql(&provider, &sql).await
    }

    fn group_writes(
        &self,
        provider: Option<&Provider>,
        statements: Vec<(usize, Statement)>,
    ) -> Result<Vec<WriteGroup>> {
        let mut groups: Vec<WriteGroup> = Vec::new();
        for (index, mut statement) in statements {
            let target = self.resolve(provider, &statement);
            let sql = self.render(&mut statement, &target)?;
            match groups.iter_mut().find(|g| g.provider == target) {
                Some(group) => group.statements.push((index, sql)),
                None => groups.push(WriteGroup {
                    provider: target,
                    statements: vec![(index, sql)],
                }),
            }
        }
        Ok(groups)
    }

    async fn write_group(&self, group: &WriteGroup) -> Result<Vec<u64>> {
        let conn = self.connection(&group.provider).await?;
        let sqls: Vec<&str> = group.statements.iter().map(|(_, sql)| sql.as_str()).collect();
        trace!(provider = %group.provider, statements = sqls.len(), "Writing batch");
        conn.execute_batch(&sqls).await
    }

    /// Run every group concurrently; per statement counts, zero where a
    /// group failed on connectivity
    async fn run_groups(&self, groups: &[WriteGroup]) -> Result<Vec<(usize, u64)>> {
        let outcomes = join_all(groups.iter().map(|group| async move {
            (group, self.write_group(group).await)
        }))
        .await;

        let mut counts = Vec::new();
        let mut failure = None;
        for (group, outcome) in outcomes {
            match outcome {
                Ok(affected) => counts.extend(
                    group
                        .statements
                        .iter()
                        .map(|(index, _)| *index)
                        .zip(affected),
                ),
                Err(e) => {
                    error!(
                        provider = %group.provider,
                        statements = group.statements.len(),
                        error = %e,
                        "Write failed, counting zero affected rows"
                    );
                    counts.extend(group.statements.iter().map(|(index, _)| (*index, 0)));
                    if !e.is_connectivity() && failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(counts),
        }
    }

    /// Run data-modifying statements and sum the affected rows.
    ///
    /// Statements are grouped by resolved provider. Each group runs in
    /// caller order on one connection; groups run concurrently.
    pub async fn write(&self, provider: Option<&Provider>, statements: Vec<Statement>) -> Result<u64> {
        let groups = self.group_writes(provider, statements.into_iter().enumerate().collect())?;
        let counts = self.run_groups(&groups).await?;
        let total: u64 = counts.iter().map(|(_, n)| n).sum();
        debug!(groups = groups.len(), affected = total, "Write finished");
        Ok(total)
    }

    /// Run a mixed list of statements, one result per statement in order.
    ///
    /// Statements that return rows on their provider (SELECT, and
    /// INSERT/UPDATE/DELETE with an output clause) are read one by one.
    /// The rest are written in per-provider batches after the reads, each
    /// producing a [`QueryResult::affected`] result.
    pub async fn execute(
        &self,
        provider: Option<&Provider>,
        statements: Vec<Statement>,
    ) -> Result<Vec<QueryResult>> {
        let mut results: Vec<QueryResult> = (0..statements.len()).map(|_| QueryResult::empty()).collect();
        let mut writes = Vec::new();

        for (index, mut statement) in statements.into_iter().enumerate() {
            let target = self.resolve(provider, &statement);
            if returns_rows(&target, statement.kind()) {
                let sql = self.render(&mut statement, &target)?;
                results[index] = self.read_sql(&target, &sql).await?;
            } else {
                writes.push((index, statement));
            }
        }

        if !writes.is_empty() {
            let groups = self.group_writes(provider, writes)?;
            for (index, affected) in self.run_groups(&groups).await? {
                results[index] = QueryResult::affected(affected);
            }
        }
        Ok(results)
    }

    /// Close every pool
    pub async fn close(&self) -> Result<()> {
        let pools: Vec<Arc<SimpleConnectionPool>> = self
            .pools
            .iter()
            .filter_map(|cell| cell.value().get().cloned())
            .collect();
        for pool in pools {
            pool.close().await?;
        }
        Ok(())
    }
}
