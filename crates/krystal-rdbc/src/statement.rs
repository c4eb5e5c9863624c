//! Composable SQL statements.
//!
//! A [`Statement`] is an ordered list of rendering steps. Builders
//! ([`Select`], [`Insert`], [`Update`], [`Delete`]) register the first step and
//! decorators (`where_`, `order_by`, ...) append more. Nothing is rendered
//! until [`Statement::render`] runs the steps against a [`RenderContext`],
//! which carries the target dialect. The text is frozen after the first
//! render.
//!
//! ```
//! use krystal_rdbc::column::{Column, Table};
//! use krystal_rdbc::dialect::SqlServerDialect;
//! use krystal_rdbc::statement::{RenderContext, Statement};
//!
//! let ctx = RenderContext::for_dialect(&SqlServerDialect);
//! let mut stmt = Statement::select(&Table::new("MASZYNY"), &[])
//!     .limit(10)
//!     .where_(Column::new("linia").less(9000));
//! assert_eq!(
//!     stmt.render(&ctx).unwrap(),
//!     "SELECT TOP 10 * FROM MASZYNY WHERE linia < 9000"
//! );
//! ```

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::column::{Column, Table};
use crate::comparison::{Comparison, Delimiter};
use crate::config::EngineConfig;
use crate::dialect::{RowLimit, SqlDialect};
use crate::error::{Error, Result};
use crate::literal::{format_literal, LiteralFormat};
use crate::provider::Provider;
use crate::types::Value;

/// Statement kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// SELECT
    Select,
    /// INSERT
    Insert,
    /// UPDATE
    Update,
    /// DELETE
    Delete,
    /// Anything else (DDL, procedure calls, ...)
    Other,
}

impl StatementKind {
    /// Detect the kind from the leading keyword of a SQL text
    pub fn detect(sql: &str) -> Self {
        let keyword = sql
            .trim_start()
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or_default();
        match keyword.to_uppercase().as_str() {
            "SELECT" => Self::Select,
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            _ => Self::Other,
        }
    }

    /// Whether the statement modifies data
    pub const fn is_modifying(self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Ascending
    #[default]
    Asc,
    /// Descending
    Desc,
}

impl Direction {
    /// SQL keyword
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(Self::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(Self::Desc)
        } else {
            Err(Error::statement(format!("unknown sort direction: {}", s)))
        }
    }
}

/// Everything a statement needs to turn into text
#[derive(Clone)]
pub struct RenderContext {
    dialect: &'static dyn SqlDialect,
    literals: LiteralFormat,
    delimiter: String,
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("dialect", &self.dialect.name())
            .field("literals", &self.literals)
            .field("delimiter", &self.delimiter)
            .finish()
    }
}

impl RenderContext {
    /// Context for a dialect with the engine's formats
    pub fn new(dialect: &'static dyn SqlDialect, config: &EngineConfig) -> Self {
        Self {
            dialect,
            literals: config.literal_format(),
            delimiter: config.delimiter.clone(),
        }
    }

    /// Context for a dialect with default formats
    pub fn for_dialect(dialect: &'static dyn SqlDialect) -> Self {
        Self {
            dialect,
            literals: LiteralFormat::default(),
            delimiter: ", ".to_string(),
        }
    }

    /// Target dialect
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        self.dialect
    }

    /// Literal formats
    pub fn literals(&self) -> &LiteralFormat {
        &self.literals
    }

    /// List delimiter
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Encode a value
    pub fn literal(&self, value: &Value) -> String {
        format_literal(value, &self.literals)
    }

    /// Render a comparison
    pub fn comparison(&self, comparison: &Comparison) -> String {
        comparison.render(&self.literals, &self.delimiter)
    }

    /// Join column names with the list delimiter
    pub fn columns(&self, columns: &[Column]) -> String {
        columns
            .iter()
            .map(Column::name)
            .collect::<Vec<_>>()
            .join(&self.delimiter)
    }
}

/// Text under construction, handed to every rendering step
pub struct SqlBuffer<'a> {
    ctx: &'a RenderContext,
    kind: StatementKind,
    text: String,
    deferred: Vec<String>,
}

impl<'a> SqlBuffer<'a> {
    fn new(ctx: &'a RenderContext, kind: StatementKind) -> Self {
        Self {
            ctx,
            kind,
            text: String::new(),
            deferred: Vec::new(),
        }
    }

    /// Render context
    pub fn ctx(&self) -> &'a RenderContext {
        self.ctx
    }

    /// Kind of the statement being rendered
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Text rendered so far
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Append text
    pub fn push_str(&mut self, s: &str) {
        self.text.push_str(s);
    }

    /// Register a fragment appended after every step has run.
    ///
    /// Identical fragments are kept once.
    pub fn defer(&mut self, fragment: impl Into<String>) {
        let fragment = fragment.into();
        if !self.deferred.contains(&fragment) {
            self.deferred.push(fragment);
        }
    }

    /// Surround the text rendered so far
    pub fn wrap(&mut self, prefix: &str, suffix: &str) {
        self.text = format!("{}{}{}", prefix, self.text, suffix);
    }

    fn finish(mut self) -> String {
        for fragment in &self.deferred {
            self.text.push(' ');
            self.text.push_str(fragment);
        }
        self.text
    }
}

type Step = Box<dyn FnOnce(&mut SqlBuffer<'_>) -> Result<()> + Send>;

/// A SQL statement
pub struct Statement {
    kind: StatementKind,
    provider: Option<Provider>,
    steps: Vec<Step>,
    where_open: bool,
    rendered: Option<String>,
    failure: Option<String>,
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("kind", &self.kind)
            .field("provider", &self.provider)
            .field("steps", &self.steps.len())
            .field("rendered", &self.rendered)
            .field("failure", &self.failure)
            .finish()
    }
}

fn require_table(table: &Table, kind: StatementKind) -> Result<()> {
    if table.name().trim().is_empty() {
        return Err(Error::statement(format!("{:?} statement has no table", kind)));
    }
    Ok(())
}

impl Statement {
    fn with_step(
        kind: StatementKind,
        step: impl FnOnce(&mut SqlBuffer<'_>) -> Result<()> + Send + 'static,
    ) -> Self {
        Self {
            kind,
            provider: None,
            steps: vec![Box::new(step)],
            where_open: false,
            rendered: None,
            failure: None,
        }
    }

    fn step(
        mut self,
        f: impl FnOnce(&mut SqlBuffer<'_>) -> Result<()> + Send + 'static,
    ) -> Self {
        self.steps.push(Box::new(f));
        self
    }

    /// `SELECT cols FROM table`; no columns selects `*`
    pub fn select(table: &Table, columns: &[Column]) -> Select {
        Select {
            table: table.clone(),
            columns: columns.to_vec(),
            distinct: false,
            limit: None,
        }
    }

    /// `INSERT INTO table (cols) VALUES ...`
    pub fn insert(table: &Table, columns: &[Column]) -> Insert {
        Insert {
            table: table.clone(),
            columns: columns.to_vec(),
            rows: Vec::new(),
            output: Vec::new(),
        }
    }

    /// `UPDATE table SET ...` from SET pairs
    pub fn update(table: &Table, set: Vec<Comparison>) -> Update {
        Update {
            table: table.clone(),
            set,
            output: Vec::new(),
        }
    }

    /// `DELETE FROM table`
    pub fn delete(table: &Table) -> Delete {
        Delete {
            table: table.clone(),
            output: Vec::new(),
        }
    }

    /// Verbatim SQL; the kind is detected from its leading keyword
    pub fn raw(sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let kind = StatementKind::detect(&sql);
        Self::with_step(
            kind,
            move |buf| {
                buf.push_str(&sql);
                Ok(())
            },
        )
    }

    /// `self UNION [ALL] other`
    pub fn union(self, other: Statement, all: bool) -> Self {
        let mut other = other;
        self.step(move |buf| {
            let rhs = other.render(buf.ctx())?.to_string();
            buf.push_str(if all { "\nUNION ALL\n" } else { "\nUNION\n" });
            buf.push_str(&rhs);
            Ok(())
        })
    }

    /// Render and wrap as a derived table: `(sql) alias`
    pub fn as_table(&mut self, alias: &str, ctx: &RenderContext) -> Result<Table> {
        let sql = self.render(ctx)?;
        Ok(Table::new(format!("({}) {}", sql, alias)))
    }

    /// Statement kind
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Provider override, if any
    pub fn provider(&self) -> Option<&Provider> {
        self.provider.as_ref()
    }

    /// Set the provider override
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    fn where_block(mut self, outer: Delimiter, inner: Delimiter, comparisons: Vec<Comparison>) -> Self {
        let lead = if self.where_open {
            outer.separator()
        } else {
            " WHERE "
        };
        self.where_open = true;
        self.step(move |buf| {
            if comparisons.is_empty() {
                return Err(Error::statement("WHERE block has no comparisons"));
            }
            let ctx = buf.ctx();
            let rendered: Vec<String> = comparisons.iter().map(|c| ctx.comparison(c)).collect();
            buf.push_str(lead);
            if rendered.len() > 1 {
                buf.push_str(&format!("({})", rendered.join(inner.separator())));
            } else {
                buf.push_str(&rendered.join(""));
            }
            Ok(())
        })
    }

    /// Start the WHERE clause with one comparison.
    ///
    /// On a statement that already has a WHERE clause this behaves like
    /// [`Statement::and_where`].
    pub fn where_(self, comparison: Comparison) -> Self {
        self.where_block(Delimiter::And, Delimiter::None, vec![comparison])
    }

    /// Start the WHERE clause with comparisons joined by `delimiter`
    pub fn where_all(self, delimiter: Delimiter, comparisons: Vec<Comparison>) -> Self {
        self.where_block(Delimiter::And, delimiter, comparisons)
    }

    /// `... AND comparison`
    pub fn and_where(self, comparison: Comparison) -> Self {
        self.where_block(Delimiter::And, Delimiter::None, vec![comparison])
    }

    /// `... AND (a <delimiter> b ...)`
    pub fn and_where_all(self, delimiter: Delimiter, comparisons: Vec<Comparison>) -> Self {
        self.where_block(Delimiter::And, delimiter, comparisons)
    }

    /// `... OR comparison`
    pub fn or_where(self, comparison: Comparison) -> Self {
        self.where_block(Delimiter::Or, Delimiter::None, vec![comparison])
    }

    /// `... OR (a <delimiter> b ...)`
    pub fn or_where_all(self, delimiter: Delimiter, comparisons: Vec<Comparison>) -> Self {
        self.where_block(Delimiter::Or, delimiter, comparisons)
    }

    /// `WHERE 1=1`, so later blocks can always be AND-ed
    pub fn where_1is1(mut self) -> Self {
        let lead = if self.where_open { " AND " } else { " WHERE " };
        self.where_open = true;
        self.step(move |buf| {
            buf.push_str(lead);
            buf.push_str("1=1");
            Ok(())
        })
    }

    /// `... GROUP BY cols`
    pub fn group_by(self, columns: &[Column]) -> Self {
        let columns = columns.to_vec();
        self.step(move |buf| {
            if buf.kind() != StatementKind::Select || columns.is_empty() {
                return Err(Error::statement("GROUP BY needs a SELECT and at least one column"));
            }
            let list = buf.ctx().columns(&columns);
            buf.push_str(&format!(" GROUP BY {}", list));
            Ok(())
        })
    }

    /// `... ORDER BY cols [ASC|DESC]`
    pub fn order_by(self, columns: &[Column], direction: Option<Direction>) -> Self {
        let columns = columns.to_vec();
        self.step(move |buf| {
            if buf.kind() != StatementKind::Select || columns.is_empty() {
                return Err(Error::statement("ORDER BY needs a SELECT and at least one column"));
            }
            let list = buf.ctx().columns(&columns);
            match direction {
                Some(direction) => buf.push_str(&format!(" ORDER BY {} {}", list, direction)),
                None => buf.push_str(&format!(" ORDER BY {}", list)),
            }
            Ok(())
        })
    }

    /// `... ORDER BY a ASC, b DESC, ...` from per-direction column groups
    pub fn order_by_all(self, groups: Vec<(Direction, Vec<Column>)>) -> Self {
        self.step(move |buf| {
            let terms: Vec<String> = groups
                .iter()
                .flat_map(|(direction, columns)| {
                    columns.iter().map(move |c| format!("{} {}", c, direction))
                })
                .collect();
            if buf.kind() != StatementKind::Select || terms.is_empty() {
                return Err(Error::statement("ORDER BY needs a SELECT and at least one column"));
            }
            buf.push_str(&format!(" ORDER BY {}", terms.join(buf.ctx().delimiter())));
            Ok(())
        })
    }

    /// Render the statement.
    ///
    /// Steps run once, in registration order, followed by the deferred
    /// fragments. Later calls return the frozen text, whatever the context.
    /// A failed render is frozen too: every later call fails the same way.
    pub fn render(&mut self, ctx: &RenderContext) -> Result<&str> {
        if let Some(message) = &self.failure {
            return Err(Error::statement(message.clone()));
        }
        if self.rendered.is_none() {
            let mut buf = SqlBuffer::new(ctx, self.kind);
            for step in std::mem::take(&mut self.steps) {
                if let Err(e) = step(&mut buf) {
                    let message = match &e {
                        Error::Statement { message } => message.clone(),
                        other => other.to_string(),
                    };
                    debug!(dialect = ctx.dialect().name(), error = %message, "Statement render failed");
                    self.failure = Some(message);
                    return Err(e);
                }
            }
            let sql = buf.finish();
            debug!(dialect = ctx.dialect().name(), sql = %sql, "Rendered statement");
            self.rendered = Some(sql);
        }
        Ok(self.rendered.as_deref().unwrap_or_default())
    }

    /// Rendered text, if [`Statement::render`] already ran
    pub fn sql(&self) -> Option<&str> {
        self.rendered.as_deref()
    }
}

/// SELECT builder
#[derive(Debug, Clone)]
pub struct Select {
    table: Table,
    columns: Vec<Column>,
    distinct: bool,
    limit: Option<u64>,
}

impl Select {
    /// `SELECT DISTINCT`
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Return at most `n` rows; zero means no limit
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = (n > 0).then_some(n);
        self
    }

    /// Finish the builder
    pub fn build(self) -> Statement {
        Statement::with_step(
            StatementKind::Select,
            move |buf| {
                require_table(&self.table, StatementKind::Select)?;
                let mut head = String::from("SELECT");
                if self.distinct {
                    head.push_str(" DISTINCT");
                }
                if let Some(n) = self.limit {
                    match buf.ctx().dialect().row_limit(n) {
                        RowLimit::Inline(fragment) => {
                            head.push(' ');
                            head.push_str(&fragment);
                        }
                        RowLimit::Deferred(fragment) => buf.defer(fragment),
                    }
                }
                let columns = if self.columns.is_empty() {
                    "*".to_string()
                } else {
                    buf.ctx().columns(&self.columns)
                };
                buf.push_str(&format!("{} {} FROM {}", head, columns, self.table));
                Ok(())
            },
        )
    }

    /// Build and start the WHERE clause
    pub fn where_(self, comparison: Comparison) -> Statement {
        self.build().where_(comparison)
    }

    /// Build and start the WHERE clause with several comparisons
    pub fn where_all(self, delimiter: Delimiter, comparisons: Vec<Comparison>) -> Statement {
        self.build().where_all(delimiter, comparisons)
    }

    /// Build and add `WHERE 1=1`
    pub fn where_1is1(self) -> Statement {
        self.build().where_1is1()
    }

    /// Build and add GROUP BY
    pub fn group_by(self, columns: &[Column]) -> Statement {
        self.build().group_by(columns)
    }

    /// Build and add ORDER BY
    pub fn order_by(self, columns: &[Column], direction: Option<Direction>) -> Statement {
        self.build().order_by(columns, direction)
    }

    /// Build and set the provider
    pub fn with_provider(self, provider: Provider) -> Statement {
        self.build().with_provider(provider)
    }
}

impl From<Select> for Statement {
    fn from(select: Select) -> Self {
        select.build()
    }
}

fn output_step(buf: &mut SqlBuffer<'_>, kind: StatementKind, output: &[Column]) {
    if let Some(clause) = buf.ctx().dialect().output_clause(kind, output) {
        buf.push_str(" ");
        buf.push_str(&clause);
    }
}

/// INSERT builder
#[derive(Debug, Clone)]
pub struct Insert {
    table: Table,
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
    output: Vec<Column>,
}

impl Insert {
    /// Add one row; can be chained for multi-row inserts
    pub fn values<I, V>(mut self, row: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
        self
    }

    /// Add several rows
    pub fn rows(mut self, rows: Vec<Vec<Value>>) -> Self {
        self.rows.extend(rows);
        self
    }

    /// Columns returned by the output clause; empty returns all
    pub fn output(mut self, columns: &[Column]) -> Self {
        self.output = columns.to_vec();
        self
    }

    /// Finish the builder
    pub fn build(self) -> Statement {
        Statement::with_step(
            StatementKind::Insert,
            move |buf| {
                require_table(&self.table, StatementKind::Insert)?;
                let ctx = buf.ctx();
                let width = self.columns.len();
                let rows: Vec<String> = self
                    .rows
                    .iter()
                    .filter(|row| width == 0 || row.len() == width)
                    .map(|row| {
                        let values: Vec<String> = row.iter().map(|v| ctx.literal(v)).collect();
                        format!("({})", values.join(ctx.delimiter()))
                    })
                    .collect();
                if rows.is_empty() {
                    return Err(Error::statement(format!(
                        "INSERT INTO {} has no rows matching its {} columns",
                        self.table, width
                    )));
                }

                buf.push_str(&format!("INSERT INTO {}", self.table));
                if width > 0 {
                    buf.push_str(&format!(" ({})", ctx.columns(&self.columns)));
                }
                output_step(buf, StatementKind::Insert, &self.output);
                buf.push_str(&format!(" VALUES {}", rows.join(ctx.delimiter())));
                if ctx.dialect().wraps_final_table(StatementKind::Insert) {
                    buf.wrap("SELECT * FROM FINAL TABLE (", ")");
                }
                Ok(())
            },
        )
    }

    /// Build and set the provider
    pub fn with_provider(self, provider: Provider) -> Statement {
        self.build().with_provider(provider)
    }
}

impl From<Insert> for Statement {
    fn from(insert: Insert) -> Self {
        insert.build()
    }
}

/// UPDATE builder
#[derive(Debug, Clone)]
pub struct Update {
    table: Table,
    set: Vec<Comparison>,
    output: Vec<Column>,
}

impl Update {
    /// Columns returned by the output clause; empty returns all
    pub fn output(mut self, columns: &[Column]) -> Self {
        self.output = columns.to_vec();
        self
    }

    /// Finish the builder
    pub fn build(self) -> Statement {
        Statement::with_step(
            StatementKind::Update,
            move |buf| {
                require_table(&self.table, StatementKind::Update)?;
                if self.set.is_empty() {
                    return Err(Error::statement(format!(
                        "UPDATE {} has nothing to SET",
                        self.table
                    )));
                }
                let ctx = buf.ctx();
                let pairs: Vec<String> = self.set.iter().map(|c| ctx.comparison(c)).collect();
                buf.push_str(&format!("UPDATE {} SET {}", self.table, pairs.join(ctx.delimiter())));
                output_step(buf, StatementKind::Update, &self.output);
                Ok(())
            },
        )
    }

    /// Build and start the WHERE clause
    pub fn where_(self, comparison: Comparison) -> Statement {
        self.build().where_(comparison)
    }

    /// Build and start the WHERE clause with several comparisons
    pub fn where_all(self, delimiter: Delimiter, comparisons: Vec<Comparison>) -> Statement {
        self.build().where_all(delimiter, comparisons)
    }
}

impl From<Update> for Statement {
    fn from(update: Update) -> Self {
        update.build()
    }
}

/// DELETE builder
#[derive(Debug, Clone)]
pub struct Delete {
    table: Table,
    output: Vec<Column>,
}

impl Delete {
    /// Columns returned by the output clause; empty returns all
    pub fn output(mut self, columns: &[Column]) -> Self {
        self.output = columns.to_vec();
        self
    }

    /// Finish the builder
    pub fn build(self) -> Statement {
        Statement::with_step(
            StatementKind::Delete,
            move |buf| {
                require_table(&self.table, StatementKind::Delete)?;
                buf.push_str(&format!("DELETE FROM {}", self.table));
                output_step(buf, StatementKind::Delete, &self.output);
                Ok(())
            },
        )
    }

    /// Build and start the WHERE clause
    pub fn where_(self, comparison: Comparison) -> Statement {
        self.build().where_(comparison)
    }

    /// Build and start the WHERE clause with several comparisons
    pub fn where_all(self, delimiter: Delimiter, comparisons: Vec<Comparison>) -> Statement {
        self.build().where_all(delimiter, comparisons)
    }
}

impl From<Delete> for Statement {
    fn from(delete: Delete) -> Self {
        delete.build()
    }
}
