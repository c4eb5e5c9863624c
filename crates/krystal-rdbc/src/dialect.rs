//! SQL dialect abstraction for krystal-rdbc
//!
//! Statements render the same way on every backend except for a few
//! vendor-specific fragments:
//!
//! - SqlDialect: Trait for database-specific SQL fragments
//! - Row limits (`TOP n`, `LIMIT n`, `FETCH FIRST n ROWS ONLY`)
//! - Returning affected rows (`OUTPUT INSERTED.*`, `FINAL TABLE`)

use std::fmt;

use crate::column::Column;
use crate::statement::StatementKind;

/// Database family, used to pick dialects and connection factories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialectFamily {
    /// Microsoft SQL Server
    SqlServer,
    /// IBM DB2 for i (AS/400)
    As400,
    /// H2
    H2,
    /// PostgreSQL
    Postgres,
    /// MySQL / MariaDB
    MySql,
}

impl fmt::Display for DialectFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(dialect_of(*self).name())
    }
}

/// Where a row limit lands in the rendered statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowLimit {
    /// Right after `SELECT [DISTINCT]`
    Inline(String),
    /// Appended after every other clause
    Deferred(String),
}

/// SQL dialect for vendor-specific SQL generation
pub trait SqlDialect: Send + Sync {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Get the dialect family
    fn family(&self) -> DialectFamily;

    /// Row limit fragment for `n` rows
    fn row_limit(&self, n: u64) -> RowLimit {
        RowLimit::Deferred(format!("FETCH FIRST {} ROWS ONLY", n))
    }

    /// Clause inserted after the target of a data-modifying statement so
    /// that the affected rows come back as a result set
    fn output_clause(&self, _kind: StatementKind, _columns: &[Column]) -> Option<String> {
        None
    }

    /// Whether the statement is wrapped as `SELECT * FROM FINAL TABLE (...)`
    fn wraps_final_table(&self, _kind: StatementKind) -> bool {
        false
    }

    /// Whether a statement of this kind returns rows on this dialect
    fn supports_output(&self, kind: StatementKind) -> bool {
        kind == StatementKind::Select
            || self.output_clause(kind, &[]).is_some()
            || self.wraps_final_table(kind)
    }
}

fn output_columns(prefix: &str, columns: &[Column]) -> String {
    if columns.is_empty() {
        return format!("{}.*", prefix);
    }
    columns
        .iter()
        .map(|c| format!("{}.{}", prefix, c.name()))
        .collect::<Vec<_>>()
        .join(", ")
}

// ===========================================================================
// SQL Server
// ===========================================================================

/// SQL Server dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl SqlDialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "SQL Server"
    }

    fn family(&self) -> DialectFamily {
        DialectFamily::SqlServer
    }

    fn row_limit(&self, n: u64) -> RowLimit {
        RowLimit::Inline(format!("TOP {}", n))
    }

    fn output_clause(&self, kind: StatementKind, columns: &[Column]) -> Option<String> {
        match kind {
            StatementKind::Insert | StatementKind::Update => {
                Some(format!("OUTPUT {}", output_columns("INSERTED", columns)))
            }
            StatementKind::Delete => Some(format!("OUTPUT {}", output_columns("DELETED", columns))),
            _ => None,
        }
    }
}

// ===========================================================================
// AS/400
// ===========================================================================

/// DB2 for i dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct As400Dialect;

impl SqlDialect for As400Dialect {
    fn name(&self) -> &'static str {
        "AS400"
    }

    fn family(&self) -> DialectFamily {
        DialectFamily::As400
    }

    // UPDATE and DELETE are not supported inside FINAL TABLE on DB2 for i
    fn wraps_final_table(&self, kind: StatementKind) -> bool {
        kind == StatementKind::Insert
    }
}

// ===========================================================================
// H2
// ===========================================================================

/// H2 dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct H2Dialect;

impl SqlDialect for H2Dialect {
    fn name(&self) -> &'static str {
        "H2"
    }

    fn family(&self) -> DialectFamily {
        DialectFamily::H2
    }
}

// ===========================================================================
// PostgreSQL
// ===========================================================================

/// PostgreSQL dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn family(&self) -> DialectFamily {
        DialectFamily::Postgres
    }
}

// ===========================================================================
// MySQL
// ===========================================================================

/// MySQL dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn family(&self) -> DialectFamily {
        DialectFamily::MySql
    }

    fn row_limit(&self, n: u64) -> RowLimit {
        RowLimit::Deferred(format!("LIMIT {}", n))
    }
}

/// Static dialect of a family
pub fn dialect_of(family: DialectFamily) -> &'static dyn SqlDialect {
    match family {
        DialectFamily::SqlServer => &SqlServerDialect,
        DialectFamily::As400 => &As400Dialect,
        DialectFamily::H2 => &H2Dialect,
        DialectFamily::Postgres => &PostgresDialect,
        DialectFamily::MySql => &MySqlDialect,
    }
}

/// Get a dialect by name
///
/// Unknown names fall back to the ANSI behaviour shared by H2.
pub fn dialect_for(name: &str) -> &'static dyn SqlDialect {
    match name.to_lowercase().as_str() {
        "sqlserver" | "mssql" | "sql server" => &SqlServerDialect,
        "as400" | "db2" => &As400Dialect,
        "postgres" | "postgresql" | "postgre" => &PostgresDialect,
        "mysql" | "mariadb" => &MySqlDialect,
        _ => &H2Dialect,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_limits() {
        assert_eq!(SqlServerDialect.row_limit(5), RowLimit::Inline("TOP 5".into()));
        assert_eq!(MySqlDialect.row_limit(5), RowLimit::Deferred("LIMIT 5".into()));
        assert_eq!(
            PostgresDialect.row_limit(5),
            RowLimit::Deferred("FETCH FIRST 5 ROWS ONLY".into())
        );
        assert_eq!(
            As400Dialect.row_limit(1),
            RowLimit::Deferred("FETCH FIRST 1 ROWS ONLY".into())
        );
    }

    #[test]
    fn test_sqlserver_output_clause() {
        let d = SqlServerDialect;
        assert_eq!(
            d.output_clause(StatementKind::Insert, &[]).as_deref(),
            Some("OUTPUT INSERTED.*")
        );
        assert_eq!(
            d.output_clause(StatementKind::Update, &[Column::new("id"), Column::new("linia")])
                .as_deref(),
            Some("OUTPUT INSERTED.id, INSERTED.linia")
        );
        assert_eq!(
            d.output_clause(StatementKind::Delete, &[]).as_deref(),
            Some("OUTPUT DELETED.*")
        );
        assert!(d.output_clause(StatementKind::Select, &[]).is_none());
    }

    #[test]
    fn test_supports_output() {
        assert!(SqlServerDialect.supports_output(StatementKind::Delete));
        assert!(As400Dialect.supports_output(StatementKind::Insert));
        assert!(!As400Dialect.supports_output(StatementKind::Update));
        assert!(!PostgresDialect.supports_output(StatementKind::Insert));
        assert!(PostgresDialect.supports_output(StatementKind::Select));
        assert!(!H2Dialect.supports_output(StatementKind::Other));
    }

    #[test]
    fn test_dialect_for() {
        assert_eq!(dialect_for("postgresql").name(), "PostgreSQL");
        assert_eq!(dialect_for("mysql").name(), "MySQL");
        assert_eq!(dialect_for("mariadb").name(), "MySQL");
        assert_eq!(dialect_for("sqlserver").name(), "SQL Server");
        assert_eq!(dialect_for("AS400").family(), DialectFamily::As400);
        assert_eq!(dialect_for("h2").family(), DialectFamily::H2);
    }
}
