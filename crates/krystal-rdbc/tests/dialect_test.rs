//! Tests for krystal-rdbc dialect module

use krystal_rdbc::dialect::{
    As400Dialect, H2Dialect, MySqlDialect, PostgresDialect, RowLimit, SqlServerDialect,
};
use krystal_rdbc::prelude::*;

// ==================== Family Tests ====================

#[test]
fn test_dialect_of_matches_family() {
    for family in [
        DialectFamily::SqlServer,
        DialectFamily::As400,
        DialectFamily::H2,
        DialectFamily::Postgres,
        DialectFamily::MySql,
    ] {
        assert_eq!(dialect_of(family).family(), family);
    }
}

#[test]
fn test_family_display_uses_dialect_name() {
    assert_eq!(DialectFamily::SqlServer.to_string(), "SQL Server");
    assert_eq!(DialectFamily::As400.to_string(), "AS400");
    assert_eq!(DialectFamily::Postgres.to_string(), "PostgreSQL");
}

#[test]
fn test_dialect_for_aliases() {
    assert_eq!(dialect_for("MSSQL").family(), DialectFamily::SqlServer);
    assert_eq!(dialect_for("db2").family(), DialectFamily::As400);
    assert_eq!(dialect_for("postgre").family(), DialectFamily::Postgres);
    assert_eq!(dialect_for("MariaDB").family(), DialectFamily::MySql);
    assert_eq!(dialect_for("oracle").family(), DialectFamily::H2);
}

// ==================== Fragment Tests ====================

#[test]
fn test_row_limit_placement() {
    assert_eq!(SqlServerDialect.row_limit(10), RowLimit::Inline("TOP 10".into()));
    assert_eq!(MySqlDialect.row_limit(10), RowLimit::Deferred("LIMIT 10".into()));
    assert_eq!(
        H2Dialect.row_limit(10),
        RowLimit::Deferred("FETCH FIRST 10 ROWS ONLY".into())
    );
}

#[test]
fn test_output_clause_only_on_sqlserver() {
    let columns = [Column::new("id")];
    assert_eq!(
        SqlServerDialect
            .output_clause(StatementKind::Delete, &columns)
            .as_deref(),
        Some("OUTPUT DELETED.id")
    );
    let others: [&dyn SqlDialect; 3] = [&As400Dialect, &PostgresDialect, &MySqlDialect];
    for dialect in others {
        assert!(dialect.output_clause(StatementKind::Insert, &columns).is_none());
    }
}

#[test]
fn test_final_table_only_wraps_as400_inserts() {
    assert!(As400Dialect.wraps_final_table(StatementKind::Insert));
    assert!(!As400Dialect.wraps_final_table(StatementKind::Delete));
    assert!(!SqlServerDialect.wraps_final_table(StatementKind::Insert));
}

#[test]
fn test_writes_return_rows() {
    assert!(SqlServerDialect.supports_output(StatementKind::Update));
    assert!(!SqlServerDialect.supports_output(StatementKind::Other));
    assert!(!MySqlDialect.supports_output(StatementKind::Delete));
    assert!(MySqlDialect.supports_output(StatementKind::Select));
}
