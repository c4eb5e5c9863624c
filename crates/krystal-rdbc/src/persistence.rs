//! Entity persistence: single-object CRUD and bulk reads.
//!
//! Every single-object operation goes through [`Persistence::execute`],
//! which validates the entity's keys before any statement is built:
//!
//! - a type without key fields cannot run single-object operations
//! - read-only types only load
//! - `load` and `delete` need every key; `instantiate`, `save` and
//!   `copy_as_new` only the keys the database does not generate

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::cache::ObjectCache;
use crate::comparison::{Comparison, Delimiter};
use crate::entity::{ColumnMapping, Entity, EntityDescriptor, FieldDescriptor};
use crate::error::{Error, Result};
use crate::executor::QueryExecutor;
use crate::filters::{PersistenceFilters, StatementModifiers};
use crate::provider::Provider;
use crate::statement::Statement;
use crate::types::{QueryResult, Value};

/// Single-object operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Read the row identified by the keys into the entity
    Load,
    /// Load, or insert when there is no such row
    Instantiate,
    /// Update the row, or insert when there is no such row
    Save,
    /// Delete the row
    Delete,
    /// Insert a copy under a new generated key
    CopyAsNew,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Load => "load",
            Self::Instantiate => "instantiate",
            Self::Save => "save",
            Self::Delete => "delete",
            Self::CopyAsNew => "copy as new",
        })
    }
}

/// Rows touched by a result: the affected count, else the returned rows
fn touched(result: &QueryResult) -> u64 {
    result
        .affected_rows()
        .unwrap_or(result.len() as u64)
}

/// Maps entities to rows through a [`QueryExecutor`] and keeps them in an
/// [`ObjectCache`]
#[derive(Debug, Clone)]
pub struct Persistence {
    executor: Arc<QueryExecutor>,
    cache: Option<ObjectCache>,
}

impl Persistence {
    /// Create with a cache built from the executor's configuration; no cache
    /// when caching is disabled
    pub fn new(executor: Arc<QueryExecutor>) -> Self {
        let settings = executor.config().cache.clone();
        let cache = settings.enabled.then(|| ObjectCache::new(settings));
        Self { executor, cache }
    }

    /// Use the given cache
    pub fn with_cache(mut self, cache: ObjectCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Executor
    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Cache, if enabled
    pub fn cache(&self) -> Option<&ObjectCache> {
        self.cache.as_ref()
    }

    fn provider<T>(&self, descriptor: &EntityDescriptor<T>) -> Result<Option<Provider>> {
        match descriptor.provider() {
            None => Ok(None),
            Some(name) => self
                .executor
                .registry()
                .get(name)
                .cloned()
                .map(Some)
                .ok_or_else(|| {
                    Error::config(format!(
                        "{} names unknown provider '{}'",
                        descriptor.type_name(),
                        name
                    ))
                }),
        }
    }

    fn cached<T: Entity>(&self, key: &str) -> Option<Arc<T>> {
        if T::descriptor().is_fresh() {
            return None;
        }
        self.cache.as_ref()?.get::<T>(key)
    }

    fn memorize<T: Entity>(&self, entity: &T) {
        let descriptor = T::descriptor();
        if descriptor.is_fresh() {
            return;
        }
        if let Some(cache) = &self.cache {
            cache.put(descriptor.hash_key(entity), Arc::new(entity.clone()));
        }
    }

    fn forget(&self, key: &str) {
        if let Some(cache) = &self.cache {
            cache.remove(key);
        }
    }

    /// Run one single-object operation.
    ///
    /// Returns whether a row was found (`load`, `instantiate`, `save`),
    /// deleted (`delete`) or inserted (`copy_as_new`).
    pub async fn execute<T: Entity>(&self, operation: Operation, entity: &mut T) -> Result<bool> {
        let d = T::descriptor();
        trace!(entity = d.type_name(), operation = %operation, "Persistence operation");

        if !d.has_keys() {
            return Err(Error::identity(
                d.type_name(),
                "no key fields declared, single-object operations are unavailable",
            ));
        }
        if operation != Operation::Load && d.is_read_only() {
            return Err(Error::constraint(
                d.type_name(),
                format!("read-only, cannot {}", operation),
            ));
        }

        let values = d.fields_to_values(entity);
        let missing = |incremental: bool| {
            values.iter().any(|(f, v)| {
                f.role().is_key() && (incremental || !f.role().is_incremental()) && v.is_null()
            })
        };
        let all_keys_required = matches!(operation, Operation::Load | Operation::Delete);
        if missing(all_keys_required) {
            return Err(Error::identity(
                d.type_name(),
                format!("key values missing, cannot {}", operation),
            ));
        }
        if operation == Operation::CopyAsNew && !d.has_incremental_key() {
            return Err(Error::identity(
                d.type_name(),
                "no incremental key, a copy would duplicate the identity",
            ));
        }

        let keys = key_predicate(&values, operation != Operation::Instantiate);
        let hash = d.hash_key(entity);
        let provider = self.provider(d)?;

        match operation {
            Operation::Load => self.load_into(entity, &hash, keys, provider.as_ref()).await,
            Operation::Instantiate => {
                match self.find_by_keys(d, keys, provider.as_ref()).await? {
                    Some(found) => {
                        d.copy_from(entity, &found);
                        entity.after_read()?;
                        self.memorize(entity);
                        Ok(true)
                    }
                    None => {
                        debug!(entity = d.type_name(), "No row found, inserting");
                        self.insert_and_copy_back(entity, provider.as_ref()).await?;
                        Ok(false)
                    }
                }
            }
            Operation::Save if d.vertical_layout().is_some() => {
                // Pivot rows are rewritten whole
                let replaced = self.remove(entity, &hash, keys, provider.as_ref()).await?;
                self.insert_and_copy_back(entity, provider.as_ref()).await?;
                Ok(replaced)
            }
            Operation::Save => {
                if self.find_by_keys(d, keys.clone(), provider.as_ref()).await?.is_some() {
                    self.update(d, entity, keys, provider.as_ref()).await?;
                    self.forget(&hash);
                    Ok(true)
                } else {
                    self.insert_and_copy_back(entity, provider.as_ref()).await?;
                    Ok(false)
                }
            }
            Operation::Delete => self.remove(entity, &hash, keys, provider.as_ref()).await,
            Operation::CopyAsNew => {
                self.insert_and_copy_back(entity, provider.as_ref()).await?;
                Ok(true)
            }
        }
    }

    /// Read the row identified by the entity's keys into it
    pub async fn load<T: Entity>(&self, entity: &mut T) -> Result<bool> {
        self.execute(Operation::Load, entity).await
    }

    /// Load the entity, inserting it when there is no such row
    pub async fn instantiate<T: Entity>(&self, entity: &mut T) -> Result<()> {
        self.execute(Operation::Instantiate, entity).await.map(|_| ())
    }

    /// Update the entity's row, inserting it when there is no such row
    pub async fn save<T: Entity>(&self, entity: &mut T) -> Result<()> {
        self.execute(Operation::Save, entity).await.map(|_| ())
    }

    /// Delete the entity's row; `false` when nothing was deleted
    pub async fn delete<T: Entity>(&self, entity: &mut T) -> Result<bool> {
        self.execute(Operation::Delete, entity).await
    }

    /// Insert a copy of the entity under a new generated key
    pub async fn copy_as_new<T: Entity>(&self, entity: &mut T) -> Result<()> {
        self.execute(Operation::CopyAsNew, entity).await.map(|_| ())
    }

    async fn run(&self, statement: Statement, provider: Option<&Provider>) -> Result<QueryResult> {
        let mut results = self.executor.execute(provider, vec![statement]).await?;
        Ok(results.pop().unwrap_or_else(QueryResult::empty))
    }

    async fn load_into<T: Entity>(
        &self,
        entity: &mut T,
        hash: &str,
        keys: Vec<Comparison>,
        provider: Option<&Provider>,
    ) -> Result<bool> {
        let d = T::descriptor();
        if let Some(cached) = self.cached::<T>(hash) {
            trace!(entity = d.type_name(), key = %hash, "Loaded from cache");
            d.copy_from(entity, &cached);
            if let Some(cache) = &self.cache {
                cache.put(hash, cached);
            }
            return Ok(true);
        }
        match self.find_by_keys(d, keys, provider).await? {
            Some(found) => {
                d.copy_from(entity, &found);
                entity.after_read()?;
                self.memorize(entity);
                Ok(true)
            }
            None => {
                debug!(entity = d.type_name(), key = %hash, "No row found to load");
                Ok(false)
            }
        }
    }

    async fn find_by_keys<T: Entity>(
        &self,
        d: &EntityDescriptor<T>,
        keys: Vec<Comparison>,
        provider: Option<&Provider>,
    ) -> Result<Option<T>> {
        if keys.is_empty() {
            return Ok(None);
        }
        let statement = d.select().build().where_all(Delimiter::And, keys);
        let result = self.executor.read(provider, statement).await?;
        Ok(d.map_result(&result)?.into_iter().next())
    }

    async fn update<T: Entity>(
        &self,
        d: &EntityDescriptor<T>,
        entity: &mut T,
        keys: Vec<Comparison>,
        provider: Option<&Provider>,
    ) -> Result<()> {
        let statement = match d.updater() {
            Some(updater) => updater(entity),
            None => {
                let set: Vec<Comparison> = d
                    .fields_to_values(entity)
                    .into_iter()
                    .filter(|(f, v)| !f.role().is_key() && !f.role().is_incremental() && !v.is_null())
                    .map(|(f, v)| f.column_ref().set(v))
                    .collect();
                if set.is_empty() {
                    debug!(entity = d.type_name(), "Nothing to update");
                    return Ok(());
                }
                Statement::update(d.table(), set).where_all(Delimiter::And, keys)
            }
        };
        let result = self.run(statement, provider).await?;
        trace!(entity = d.type_name(), affected = touched(&result), "Updated");
        entity.after_write()
    }

    /// Run the delete hook, then the remover or a DELETE by keys
    async fn remove<T: Entity>(
        &self,
        entity: &mut T,
        hash: &str,
        keys: Vec<Comparison>,
        provider: Option<&Provider>,
    ) -> Result<bool> {
        let d = T::descriptor();
        entity.before_delete()?;
        let statement = match d.remover() {
            Some(remover) => remover(entity),
            None => Statement::delete(d.table()).where_all(Delimiter::And, keys),
        };
        let result = self.run(statement, provider).await?;
        let affected = touched(&result);
        if result.affected_rows().is_none() && !result.is_empty() {
            trace!(entity = d.type_name(), rows = %result.render_table(), "Deleted rows");
        }
        info!(entity = d.type_name(), key = %hash, affected, "Deleted");
        self.forget(hash);
        Ok(affected > 0)
    }

    /// INSERT without generated fields, then copy the returned row back.
    ///
    /// A custom inserter is copied back only when it declares an output.
    async fn insert_and_copy_back<T: Entity>(
        &self,
        entity: &mut T,
        provider: Option<&Provider>,
    ) -> Result<()> {
        let d = T::descriptor();
        let result = match d.inserter() {
            Some((inserter, true)) => self.executor.read(provider, inserter(entity)).await?,
            Some((inserter, false)) => {
                self.run(inserter(entity), provider).await?;
                QueryResult::empty()
            }
            None => {
                let (columns, rows) = d.insert_rows(entity);
                let mut insert = Statement::insert(d.table(), &columns);
                for row in rows {
                    insert = insert.values(row);
                }
                self.run(insert.build(), provider).await?
            }
        };
        if let Some(inserted) = d.map_result(&result)?.into_iter().next() {
            d.copy_from(entity, &inserted);
        }
        trace!(entity = d.type_name(), "Inserted");
        entity.after_write()?;
        self.memorize(entity);
        Ok(())
    }

    /// Read every row of a type.
    ///
    /// The query is the type's base query with the modifier's limit, then
    /// its declared filter, then the modifier's comparisons and ordering.
    pub async fn stream_all<T: Entity>(&self, modifiers: Option<&StatementModifiers>) -> Result<Vec<T>> {
        let d = T::descriptor();
        let mut select = d.select();
        if let Some(m) = modifiers {
            select = m.limit_select(select);
        }
        let mut statement = d.filtered(select);
        if let Some(m) = modifiers {
            statement = m.apply(statement);
        }
        let provider = self.provider(d)?;
        let result = self.executor.read(provider.as_ref(), statement).await?;
        let entities = d.map_result(&result)?;
        for entity in &entities {
            self.memorize(entity);
        }
        debug!(entity = d.type_name(), count = entities.len(), "Streamed all");
        Ok(entities)
    }

    /// Read entities matching `filters`, answering from the cache when it
    /// holds at least `at_least` matches
    pub async fn find_all<T: Entity>(&self, at_least: usize, filters: &PersistenceFilters) -> Result<Vec<T>> {
        let d = T::descriptor();
        let modifiers = filters.to_statement_modifiers(Some(d as &dyn ColumnMapping))?;
        let cache = match &self.cache {
            Some(cache) if !d.is_fresh() && filters.memorized => cache,
            _ => return self.stream_all(Some(&modifiers)).await,
        };

        let hits: Vec<T> = if cache.contains_any::<T>() {
            cache
                .find::<T, _>(|e| filters.test(e))
                .into_iter()
                .map(|e| (*e).clone())
                .collect()
        } else {
            Vec::new()
        };
        if hits.len() >= at_least {
            trace!(entity = d.type_name(), hits = hits.len(), "Found in cache");
            return Ok(filters.sort(hits));
        }
        self.stream_all(Some(&modifiers)).await
    }

    /// Evict cached entities of type `T`, all of them or those passing
    /// `filters`
    pub fn clear_cached<T: Entity>(&self, filters: Option<&PersistenceFilters>) {
        let Some(cache) = &self.cache else {
            return;
        };
        match filters {
            Some(filters) => cache.clear_filtered::<T>(filters),
            None => cache.clear_type::<T>(),
        }
    }
}

/// One `col IN (v)` comparison per key; NULL keys render `IS NULL` unless
/// dropped
fn key_predicate<T>(values: &[(&FieldDescriptor<T>, Value)], keep_nulls: bool) -> Vec<Comparison> {
    values
        .iter()
        .filter(|(f, v)| f.role().is_key() && (keep_nulls || !v.is_null()))
        .map(|(f, v)| f.column_ref().in_([v.clone()]))
        .collect()
}
