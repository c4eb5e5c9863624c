//! Entity mapping metadata.
//!
//! A mapped type describes itself once with an [`EntityDescriptor`]: its
//! table, the role of every field, how rows turn into values of the type,
//! and a few behaviour flags. Nothing is discovered at runtime.
//!
//! ```
//! use std::sync::OnceLock;
//! use krystal_rdbc::prelude::*;
//!
//! #[derive(Debug, Default, Clone)]
//! struct Machine {
//!     linia: i32,
//!     nazwa: String,
//! }
//!
//! impl Entity for Machine {
//!     fn descriptor() -> &'static EntityDescriptor<Self> {
//!         static DESCRIPTOR: OnceLock<EntityDescriptor<Machine>> = OnceLock::new();
//!         DESCRIPTOR.get_or_init(|| {
//!             EntityDescriptor::builder("Machine", Table::new("MASZYNY"))
//!                 .field(
//!                     FieldDescriptor::new(
//!                         "linia",
//!                         |m: &Machine| m.linia.into(),
//!                         |m, v| m.linia = v.as_i32().unwrap_or_default(),
//!                     )
//!                     .key(),
//!                 )
//!                 .field(FieldDescriptor::new(
//!                     "nazwa",
//!                     |m: &Machine| m.nazwa.clone().into(),
//!                     |m, v| m.nazwa = v.as_string().unwrap_or_default(),
//!                 ))
//!                 .reader(&[SqlType::Integer, SqlType::Varchar], |values| {
//!                     Ok(Machine {
//!                         linia: values[0].as_i32().unwrap_or_default(),
//!                         nazwa: values[1].as_string().unwrap_or_default(),
//!                     })
//!                 })
//!                 .filter(|| Column::new("linia").less(9000))
//!                 .build()
//!         })
//!     }
//! }
//!
//! let machine = Machine { linia: 7, nazwa: "Prasa".into() };
//! assert_eq!(Machine::descriptor().hash_key(&machine), "Machine>linia=7|");
//! ```

use std::fmt;

use crate::column::{Column, Table};
use crate::comparison::Comparison;
use crate::error::{Error, Result};
use crate::statement::{Select, Statement};
use crate::types::{QueryResult, SqlType, Value};

/// Marker placed in the cache key of types whose entries never expire
pub const MEMORIZED_MARKER: &str = "@Memorized";

/// Whether a cache key belongs to a memorized type.
///
/// Only the type head, the text before the first `>`, is inspected; field
/// values after it never make an entry memorized.
pub fn is_memorized_key(key: &str) -> bool {
    key.split_once('>')
        .is_some_and(|(head, _)| head.ends_with(MEMORIZED_MARKER))
}

/// A type mapped to a table.
///
/// The hooks run around single-object operations and default to no-ops. A
/// hook error aborts the operation.
pub trait Entity: Default + Clone + Send + Sync + 'static {
    /// Mapping metadata, built once per type
    fn descriptor() -> &'static EntityDescriptor<Self>;

    /// After the entity was filled from a database row
    fn after_read(&mut self) -> Result<()> {
        Ok(())
    }

    /// After the entity was inserted or updated
    fn after_write(&mut self) -> Result<()> {
        Ok(())
    }

    /// Before the entity's row is deleted
    fn before_delete(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Storage of an entity as one row per field: the key columns, the field's
/// column name, and its value as text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vertical {
    /// Column holding the field's column name
    pub fields_column: &'static str,
    /// Column holding the field's value
    pub values_column: &'static str,
    /// Columns the rows are turned into on read; empty uses the non-key
    /// persisted fields
    pub into: Vec<&'static str>,
}

/// Builds a statement for one entity
pub type StatementFn<T> = fn(&T) -> Statement;

/// How a field takes part in persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FieldRole {
    /// Ordinary column
    #[default]
    Plain,
    /// Part of the row identity
    Key,
    /// Part of the row identity, generated by the database
    IncrementalKey,
    /// Generated by the database, not part of the identity
    Incremental,
    /// Not persisted
    Skip,
}

impl FieldRole {
    /// Whether the field identifies the row
    pub fn is_key(self) -> bool {
        matches!(self, Self::Key | Self::IncrementalKey)
    }

    /// Whether the database generates the value
    pub fn is_incremental(self) -> bool {
        matches!(self, Self::IncrementalKey | Self::Incremental)
    }

    /// Whether the field is persisted at all
    pub fn is_persisted(self) -> bool {
        self != Self::Skip
    }
}

/// One mapped field
pub struct FieldDescriptor<T> {
    name: &'static str,
    column: Option<&'static str>,
    role: FieldRole,
    getter: fn(&T) -> Value,
    setter: fn(&mut T, Value),
    writer: Option<fn(&T) -> Value>,
}

impl<T> Clone for FieldDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            column: self.column,
            role: self.role,
            getter: self.getter,
            setter: self.setter,
            writer: self.writer,
        }
    }
}

impl<T> fmt::Debug for FieldDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("role", &self.role)
            .field("writer", &self.writer.is_some())
            .finish()
    }
}

impl<T> FieldDescriptor<T> {
    /// A plain field with its accessors
    pub fn new(name: &'static str, getter: fn(&T) -> Value, setter: fn(&mut T, Value)) -> Self {
        Self {
            name,
            column: None,
            role: FieldRole::Plain,
            getter,
            setter,
            writer: None,
        }
    }

    /// Mark as key
    pub fn key(mut self) -> Self {
        self.role = FieldRole::Key;
        self
    }

    /// Mark as database-generated key
    pub fn incremental_key(mut self) -> Self {
        self.role = FieldRole::IncrementalKey;
        self
    }

    /// Mark as database-generated
    pub fn incremental(mut self) -> Self {
        self.role = FieldRole::Incremental;
        self
    }

    /// Exclude from persistence
    pub fn skip(mut self) -> Self {
        self.role = FieldRole::Skip;
        self
    }

    /// Column name when it differs from the field name
    pub fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    /// Supply the outbound value instead of the raw field value
    pub fn writer(mut self, writer: fn(&T) -> Value) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Field name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Role
    pub fn role(&self) -> FieldRole {
        self.role
    }

    /// Column reference: the alias, else the field name
    pub fn column_ref(&self) -> Column {
        Column::new(self.column.unwrap_or(self.name))
    }

    /// Raw in-memory value
    pub fn get(&self, entity: &T) -> Value {
        (self.getter)(entity)
    }

    /// Value written to the database
    pub fn outbound(&self, entity: &T) -> Value {
        match self.writer {
            Some(writer) => writer(entity),
            None => (self.getter)(entity),
        }
    }

    /// Assign a value
    pub fn set(&self, entity: &mut T, value: Value) {
        (self.setter)(entity, value)
    }
}

/// Builds an entity from the values of one row
pub struct Reader<T> {
    types: Vec<SqlType>,
    build: fn(Vec<Value>) -> Result<T>,
}

impl<T> Reader<T> {
    /// A reader for rows whose column types equal `types`, in order
    pub fn new(types: &[SqlType], build: fn(Vec<Value>) -> Result<T>) -> Self {
        Self {
            types: types.to_vec(),
            build,
        }
    }

    /// Column types this reader accepts
    pub fn types(&self) -> &[SqlType] {
        &self.types
    }

    /// Whether the reader accepts a result with these column types
    pub fn accepts(&self, types: &[SqlType]) -> bool {
        self.types == types
    }

    /// Build one entity
    pub fn read(&self, values: Vec<Value>) -> Result<T> {
        (self.build)(values)
    }
}

impl<T> fmt::Debug for Reader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader").field("types", &self.types).finish()
    }
}

/// Field-name to column lookup, used when parsing request filters
pub trait ColumnMapping {
    /// Column of a field, if the field is mapped
    fn column_of(&self, field: &str) -> Option<Column>;
}

/// Mapping metadata of one entity type
pub struct EntityDescriptor<T> {
    type_name: &'static str,
    table: Table,
    fields: Vec<FieldDescriptor<T>>,
    readers: Vec<Reader<T>>,
    loader: Option<fn() -> Select>,
    filter: Option<fn() -> Comparison>,
    provider: Option<&'static str>,
    read_only: bool,
    fresh: bool,
    memorized: bool,
    vertical: Option<Vertical>,
    inserter: Option<(StatementFn<T>, bool)>,
    updater: Option<StatementFn<T>>,
    remover: Option<StatementFn<T>>,
}

impl<T> fmt::Debug for EntityDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("type_name", &self.type_name)
            .field("table", &self.table)
            .field("fields", &self.fields)
            .field("readers", &self.readers)
            .field("provider", &self.provider)
            .field("read_only", &self.read_only)
            .field("fresh", &self.fresh)
            .field("memorized", &self.memorized)
            .field("vertical", &self.vertical)
            .field("inserter", &self.inserter.map(|(_, output)| output))
            .field("updater", &self.updater.is_some())
            .field("remover", &self.remover.is_some())
            .finish()
    }
}

/// Builder for [`EntityDescriptor`]
pub struct EntityDescriptorBuilder<T> {
    descriptor: EntityDescriptor<T>,
}

impl<T> EntityDescriptorBuilder<T> {
    /// Add a field
    pub fn field(mut self, field: FieldDescriptor<T>) -> Self {
        self.descriptor.fields.push(field);
        self
    }

    /// Add a reader
    pub fn reader(mut self, types: &[SqlType], build: fn(Vec<Value>) -> Result<T>) -> Self {
        self.descriptor.readers.push(Reader::new(types, build));
        self
    }

    /// Custom query used instead of `SELECT * FROM table`
    pub fn loader(mut self, loader: fn() -> Select) -> Self {
        self.descriptor.loader = Some(loader);
        self
    }

    /// Predicate narrowing every bulk read
    pub fn filter(mut self, filter: fn() -> Comparison) -> Self {
        self.descriptor.filter = Some(filter);
        self
    }

    /// Provider the type lives on, when not the default
    pub fn provider(mut self, provider: &'static str) -> Self {
        self.descriptor.provider = Some(provider);
        self
    }

    /// Reject everything but load
    pub fn read_only(mut self) -> Self {
        self.descriptor.read_only = true;
        self
    }

    /// Never read from or write to the cache
    pub fn fresh(mut self) -> Self {
        self.descriptor.fresh = true;
        self
    }

    /// Cache entries of this type never expire
    pub fn memorized(mut self) -> Self {
        self.descriptor.memorized = true;
        self
    }

    /// Store one row per field, pivoted on `fields_column`/`values_column`
    pub fn vertical(
        mut self,
        fields_column: &'static str,
        values_column: &'static str,
        into: &[&'static str],
    ) -> Self {
        self.descriptor.vertical = Some(Vertical {
            fields_column,
            values_column,
            into: into.to_vec(),
        });
        self
    }

    /// Statement run instead of the generated INSERT; with `output` its
    /// returned row is copied back into the entity
    pub fn inserter(mut self, inserter: StatementFn<T>, output: bool) -> Self {
        self.descriptor.inserter = Some((inserter, output));
        self
    }

    /// Statement run instead of the generated UPDATE
    pub fn updater(mut self, updater: StatementFn<T>) -> Self {
        self.descriptor.updater = Some(updater);
        self
    }

    /// Statement run instead of the generated DELETE
    pub fn remover(mut self, remover: StatementFn<T>) -> Self {
        self.descriptor.remover = Some(remover);
        self
    }

    /// Finish the builder
    pub fn build(self) -> EntityDescriptor<T> {
        self.descriptor
    }
}

impl<T> EntityDescriptor<T> {
    /// Start describing a type stored in `table`
    pub fn builder(type_name: &'static str, table: Table) -> EntityDescriptorBuilder<T> {
        EntityDescriptorBuilder {
            descriptor: Self {
                type_name,
                table,
                fields: Vec::new(),
                readers: Vec::new(),
                loader: None,
                filter: None,
                provider: None,
                read_only: false,
                fresh: false,
                memorized: false,
                vertical: None,
                inserter: None,
                updater: None,
                remover: None,
            },
        }
    }

    /// Type name used in logs and cache keys
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Mapped table
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// All fields, in declaration order
    pub fn fields(&self) -> &[FieldDescriptor<T>] {
        &self.fields
    }

    /// Field by name
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor<T>> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Key fields
    pub fn keys(&self) -> impl Iterator<Item = &FieldDescriptor<T>> {
        self.fields.iter().filter(|f| f.role.is_key())
    }

    /// Whether at least one key is declared
    pub fn has_keys(&self) -> bool {
        self.keys().next().is_some()
    }

    /// Whether a database-generated key is declared
    pub fn has_incremental_key(&self) -> bool {
        self.fields.iter().any(|f| f.role == FieldRole::IncrementalKey)
    }

    /// Provider name, if the type names one
    pub fn provider(&self) -> Option<&'static str> {
        self.provider
    }

    /// Whether writes are rejected
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether the cache is bypassed
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Whether cache entries never expire
    pub fn is_memorized(&self) -> bool {
        self.memorized
    }

    /// Pivot layout, for types stored one row per field
    pub fn vertical_layout(&self) -> Option<&Vertical> {
        self.vertical.as_ref()
    }

    /// Custom INSERT and whether it returns the inserted row
    pub fn inserter(&self) -> Option<(StatementFn<T>, bool)> {
        self.inserter
    }

    /// Custom UPDATE
    pub fn updater(&self) -> Option<StatementFn<T>> {
        self.updater
    }

    /// Custom DELETE
    pub fn remover(&self) -> Option<StatementFn<T>> {
        self.remover
    }

    /// Column of a field: its alias, else its name
    pub fn column_for(&self, field: &FieldDescriptor<T>) -> Column {
        field.column_ref()
    }

    /// Outbound value of every persisted field
    pub fn fields_to_values<'a>(&'a self, entity: &T) -> Vec<(&'a FieldDescriptor<T>, Value)> {
        self.fields
            .iter()
            .filter(|f| f.role.is_persisted())
            .map(|f| (f, f.outbound(entity)))
            .collect()
    }

    /// Cache key: `Type[@Memorized]>k=v|...` over the keys, or over every
    /// persisted field when the type has no keys
    pub fn hash_key(&self, entity: &T) -> String {
        let has_keys = self.has_keys();
        let mut key = String::from(self.type_name);
        if self.memorized {
            key.push_str(MEMORIZED_MARKER);
        }
        key.push('>');
        for (field, value) in self.fields_to_values(entity) {
            if !has_keys || field.role.is_key() {
                key.push_str(field.name);
                key.push('=');
                key.push_str(&value.to_string());
                key.push('|');
            }
        }
        key
    }

    /// Base query for reads: the loader, else `SELECT * FROM table`
    pub fn select(&self) -> Select {
        match self.loader {
            Some(loader) => loader(),
            None => Statement::select(&self.table, &[]),
        }
    }

    /// Apply the declared filter, or `WHERE 1=1` when there is none
    pub fn filtered(&self, select: Select) -> Statement {
        match self.filter {
            Some(filter) => select.where_(filter()),
            None => select.where_1is1(),
        }
    }

    /// Columns and rows to INSERT: one row of every generated-free field, or
    /// for vertical types one row per non-key field
    pub fn insert_rows(&self, entity: &T) -> (Vec<Column>, Vec<Vec<Value>>) {
        let values: Vec<(&FieldDescriptor<T>, Value)> = self
            .fields_to_values(entity)
            .into_iter()
            .filter(|(f, _)| !f.role.is_incremental())
            .collect();
        let Some(vertical) = &self.vertical else {
            let (columns, row) = values.into_iter().map(|(f, v)| (f.column_ref(), v)).unzip();
            return (columns, vec![row]);
        };

        let (keys, fields): (Vec<_>, Vec<_>) = values.into_iter().partition(|(f, _)| f.role.is_key());
        let mut columns: Vec<Column> = keys.iter().map(|(f, _)| f.column_ref()).collect();
        columns.push(Column::new(vertical.fields_column));
        columns.push(Column::new(vertical.values_column));
        let rows = fields
            .iter()
            .map(|(f, v)| {
                let mut row: Vec<Value> = keys.iter().map(|(_, k)| k.clone()).collect();
                row.push(Value::String(f.column_ref().name().to_string()));
                row.push(if v.is_null() {
                    Value::Null
                } else {
                    Value::String(v.to_string())
                });
                row
            })
            .collect();
        (columns, rows)
    }

    fn unpivoted(&self, vertical: &Vertical, result: &QueryResult) -> Result<QueryResult> {
        let pivot_columns: Vec<Column>;
        let into: Vec<&str> = if vertical.into.is_empty() {
            pivot_columns = self
                .fields
                .iter()
                .filter(|f| f.role.is_persisted() && !f.role.is_key())
                .map(FieldDescriptor::column_ref)
                .collect();
            pivot_columns.iter().map(Column::name).collect()
        } else {
            vertical.into.clone()
        };
        result.unpivot(vertical.fields_column, vertical.values_column, &into)
    }

    /// Map every row through the reader matching the result's column types.
    ///
    /// Results of vertical types are unpivoted first.
    pub fn map_result(&self, result: &QueryResult) -> Result<Vec<T>> {
        if result.is_empty() || result.affected_rows().is_some() {
            return Ok(Vec::new());
        }
        let unpivoted;
        let result = match &self.vertical {
            Some(vertical) => {
                unpivoted = self.unpivoted(vertical, result)?;
                &unpivoted
            }
            None => result,
        };
        let types = result.column_types();
        let reader = self
            .readers
            .iter()
            .find(|r| r.accepts(&types))
            .ok_or_else(|| {
                let columns = result
                    .columns()
                    .iter()
                    .map(|c| format!("{} {}", c.name, c.sql_type))
                    .collect::<Vec<_>>()
                    .join(", ");
                Error::mapping(self.type_name, columns)
            })?;
        result
            .rows()
            .iter()
            .map(|row| reader.read(row.values().to_vec()))
            .collect()
    }

    /// Copy every persisted field of `source` into `target`
    pub fn copy_from(&self, target: &mut T, source: &T) {
        for field in self.fields.iter().filter(|f| f.role.is_persisted()) {
            field.set(target, field.get(source));
        }
    }
}

impl QueryResult {
    /// Map the rows to entities of type `T`
    pub fn to_entities<T: Entity>(&self) -> Result<Vec<T>> {
        T::descriptor().map_result(self)
    }
}

impl<T> ColumnMapping for EntityDescriptor<T> {
    fn column_of(&self, field: &str) -> Option<Column> {
        self.field(field)
            .filter(|f| f.role.is_persisted())
            .map(FieldDescriptor::column_ref)
    }
}
