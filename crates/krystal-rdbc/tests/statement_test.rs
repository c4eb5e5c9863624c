//! Tests for krystal-rdbc statement module

use chrono::NaiveDate;
use krystal_rdbc::dialect::{As400Dialect, H2Dialect, MySqlDialect, PostgresDialect, SqlServerDialect};
use krystal_rdbc::prelude::*;

fn render(mut stmt: Statement, dialect: &'static dyn SqlDialect) -> String {
    let ctx = RenderContext::for_dialect(dialect);
    stmt.render(&ctx).unwrap().to_string()
}

fn maszyny() -> Table {
    Table::new("MASZYNY")
}

// ==================== Select Tests ====================

#[test]
fn test_select_star() {
    let sql = render(Statement::select(&maszyny(), &[]).build(), &SqlServerDialect);
    assert_eq!(sql, "SELECT * FROM MASZYNY");
}

#[test]
fn test_select_columns_distinct() {
    let stmt = Statement::select(&maszyny(), &[Column::new("linia"), Column::new("nazwa").alias("n")])
        .distinct()
        .build();
    assert_eq!(render(stmt, &PostgresDialect), "SELECT DISTINCT linia, nazwa n FROM MASZYNY");
}

#[test]
fn test_declared_filter_scenario() {
    let stmt = Statement::select(&maszyny(), &[]).where_(Column::new("linia").less(9000));
    assert_eq!(render(stmt, &SqlServerDialect), "SELECT * FROM MASZYNY WHERE linia < 9000");
}

#[test]
fn test_row_limit_per_dialect() {
    let limited = || {
        Statement::select(&maszyny(), &[])
            .distinct()
            .limit(5)
            .where_(Column::new("linia").less(9000))
    };
    assert_eq!(
        render(limited(), &SqlServerDialect),
        "SELECT DISTINCT TOP 5 * FROM MASZYNY WHERE linia < 9000"
    );
    assert_eq!(
        render(limited(), &MySqlDialect),
        "SELECT DISTINCT * FROM MASZYNY WHERE linia < 9000 LIMIT 5"
    );
    assert_eq!(
        render(limited(), &H2Dialect),
        "SELECT DISTINCT * FROM MASZYNY WHERE linia < 9000 FETCH FIRST 5 ROWS ONLY"
    );
}

#[test]
fn test_zero_limit_is_unlimited() {
    let stmt = Statement::select(&maszyny(), &[]).limit(0).build();
    assert_eq!(render(stmt, &SqlServerDialect), "SELECT * FROM MASZYNY");
}

#[test]
fn test_limit_follows_order_by() {
    let stmt = Statement::select(&maszyny(), &[])
        .limit(1)
        .order_by(&[Column::new("nazwa")], Some(Direction::Desc));
    assert_eq!(
        render(stmt, &MySqlDialect),
        "SELECT * FROM MASZYNY ORDER BY nazwa DESC LIMIT 1"
    );
}

#[test]
fn test_group_by_with_function() {
    let stmt = Statement::select(
        &Table::new("PRODUKCJA"),
        &[Column::new("linia"), Column::new("ilosc").fun(Function::Sum, "suma")],
    )
    .where_(Column::new("zmiana").eq(1))
    .group_by(&[Column::new("linia")]);
    assert_eq!(
        render(stmt, &SqlServerDialect),
        "SELECT linia, SUM(ilosc) suma FROM PRODUKCJA WHERE zmiana = 1 GROUP BY linia"
    );
}

#[test]
fn test_order_by_groups() {
    let stmt = Statement::select(&maszyny(), &[]).build().order_by_all(vec![
        (Direction::Asc, vec![Column::new("hala"), Column::new("linia")]),
        (Direction::Desc, vec![Column::new("nazwa")]),
    ]);
    assert_eq!(
        render(stmt, &SqlServerDialect),
        "SELECT * FROM MASZYNY ORDER BY hala ASC, linia ASC, nazwa DESC"
    );
}

#[test]
fn test_join_in_from_clause() {
    let m = maszyny().alias("m");
    let p = Table::new("PRODUKCJA").alias("p");
    let stmt = Statement::select(
        &m.join(JoinType::Inner, &p, &[(Column::new("linia").from("m"), Column::new("linia").from("p"))]),
        &[Column::new("nazwa").from("m")],
    )
    .build();
    assert_eq!(
        render(stmt, &SqlServerDialect),
        "SELECT m.nazwa FROM MASZYNY m INNER JOIN PRODUKCJA p ON 1=1 AND m.linia = p.linia"
    );
}

// ==================== Where Tests ====================

#[test]
fn test_where_blocks_are_parenthesised() {
    let stmt = Statement::select(&maszyny(), &[])
        .where_all(
            Delimiter::Or,
            vec![Column::new("linia").eq(1), Column::new("linia").eq(2)],
        )
        .and_where(Column::new("nazwa").like("P%"));
    assert_eq!(
        render(stmt, &SqlServerDialect),
        "SELECT * FROM MASZYNY WHERE (linia = 1 OR linia = 2) AND nazwa LIKE 'P%'"
    );
}

#[test]
fn test_or_where_all() {
    let stmt = Statement::select(&maszyny(), &[])
        .where_(Column::new("aktywna").eq(true))
        .or_where_all(
            Delimiter::And,
            vec![Column::new("hala").eq("B"), Column::new("linia").more_eq(100)],
        );
    assert_eq!(
        render(stmt, &SqlServerDialect),
        "SELECT * FROM MASZYNY WHERE aktywna = 1 OR (hala = 'B' AND linia >= 100)"
    );
}

#[test]
fn test_second_where_acts_as_and() {
    let stmt = Statement::select(&maszyny(), &[])
        .where_1is1()
        .where_(Column::new("linia").between(1, 10));
    assert_eq!(
        render(stmt, &SqlServerDialect),
        "SELECT * FROM MASZYNY WHERE 1=1 AND linia BETWEEN 1 AND 10"
    );
}

#[test]
fn test_in_and_null_comparisons() {
    let stmt = Statement::select(&maszyny(), &[]).where_all(
        Delimiter::And,
        vec![
            Column::new("linia").in_([1, 2, 3]),
            Column::new("opis").is(Operator::NotEqual, [Value::Null]),
        ],
    );
    assert_eq!(
        render(stmt, &SqlServerDialect),
        "SELECT * FROM MASZYNY WHERE (linia IN (1, 2, 3) AND NOT opis IS NULL)"
    );
}

#[test]
fn test_date_literals_follow_config() {
    let config = EngineConfig {
        date_format: "%d.%m.%Y".to_string(),
        ..EngineConfig::default()
    };
    let ctx = RenderContext::new(&SqlServerDialect, &config);
    let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
    let mut stmt = Statement::select(&Table::new("PRODUKCJA"), &[]).where_(Column::new("dzien").eq(day));
    assert_eq!(
        stmt.render(&ctx).unwrap(),
        "SELECT * FROM PRODUKCJA WHERE dzien = '09.03.2024'"
    );
}

// ==================== Modification Tests ====================

#[test]
fn test_insert_output_per_dialect() {
    let insert = || {
        Statement::insert(&maszyny(), &[Column::new("linia"), Column::new("nazwa")])
            .values([Value::from(5), Value::from("Prasa")])
            .build()
    };
    assert_eq!(
        render(insert(), &SqlServerDialect),
        "INSERT INTO MASZYNY (linia, nazwa) OUTPUT INSERTED.* VALUES (5, 'Prasa')"
    );
    assert_eq!(
        render(insert(), &As400Dialect),
        "SELECT * FROM FINAL TABLE (INSERT INTO MASZYNY (linia, nazwa) VALUES (5, 'Prasa'))"
    );
    assert_eq!(
        render(insert(), &PostgresDialect),
        "INSERT INTO MASZYNY (linia, nazwa) VALUES (5, 'Prasa')"
    );
}

#[test]
fn test_insert_multiple_rows_with_output_columns() {
    let stmt = Statement::insert(&Table::new("ZLECENIA"), &[Column::new("nazwa")])
        .values(["Rama"])
        .values(["O'Neil"])
        .output(&[Column::new("id")])
        .build();
    assert_eq!(
        render(stmt, &SqlServerDialect),
        "INSERT INTO ZLECENIA (nazwa) OUTPUT INSERTED.id VALUES ('Rama'), ('O''Neil')"
    );
}

#[test]
fn test_update_and_delete() {
    let update = Statement::update(
        &maszyny(),
        vec![Column::new("nazwa").set("Walcarka"), Column::new("opis").set(Value::Null)],
    )
    .where_(Column::new("linia").in_([5]));
    assert_eq!(
        render(update, &PostgresDialect),
        "UPDATE MASZYNY SET nazwa = 'Walcarka', opis = NULL WHERE linia IN (5)"
    );

    let delete = Statement::delete(&maszyny()).where_(Column::new("linia").in_([5]));
    assert_eq!(
        render(delete, &SqlServerDialect),
        "DELETE FROM MASZYNY OUTPUT DELETED.* WHERE linia IN (5)"
    );
}

// ==================== Composition Tests ====================

#[test]
fn test_union() {
    let a = Statement::select(&maszyny(), &[Column::new("nazwa")]).where_(Column::new("hala").eq("A"));
    let b = Statement::select(&maszyny(), &[Column::new("nazwa")]).where_(Column::new("hala").eq("B"));
    assert_eq!(
        render(a.union(b, true), &SqlServerDialect),
        "SELECT nazwa FROM MASZYNY WHERE hala = 'A'\nUNION ALL\nSELECT nazwa FROM MASZYNY WHERE hala = 'B'"
    );
}

#[test]
fn test_statement_as_derived_table() {
    let ctx = RenderContext::for_dialect(&SqlServerDialect);
    let mut inner = Statement::select(&maszyny(), &[Column::new("linia")]).where_(Column::new("hala").eq("A"));
    let derived = inner.as_table("x", &ctx).unwrap();
    let mut outer = Statement::select(&derived, &[Column::new("linia").from("x")]).build();
    assert_eq!(
        outer.render(&ctx).unwrap(),
        "SELECT x.linia FROM (SELECT linia FROM MASZYNY WHERE hala = 'A') x"
    );
}

#[test]
fn test_render_freezes_text() {
    let mut stmt = Statement::select(&maszyny(), &[]).limit(3).build();
    let first = stmt
        .render(&RenderContext::for_dialect(&SqlServerDialect))
        .unwrap()
        .to_string();
    let second = stmt
        .render(&RenderContext::for_dialect(&MySqlDialect))
        .unwrap()
        .to_string();
    assert_eq!(first, "SELECT TOP 3 * FROM MASZYNY");
    assert_eq!(first, second);
}

#[test]
fn test_raw_statement_kind() {
    assert_eq!(Statement::raw("select 1").kind(), StatementKind::Select);
    assert_eq!(Statement::raw("DELETE FROM t").kind(), StatementKind::Delete);
}

// ==================== Construction Error Tests ====================

#[test]
fn test_missing_parts_are_statement_errors() {
    let ctx = RenderContext::for_dialect(&SqlServerDialect);

    let mut no_table = Statement::select(&Table::new(""), &[]).build();
    assert!(matches!(no_table.render(&ctx), Err(Error::Statement { .. })));

    let mut no_set = Statement::update(&maszyny(), vec![]).build();
    assert!(matches!(no_set.render(&ctx), Err(Error::Statement { .. })));

    let mut no_rows = Statement::insert(&maszyny(), &[Column::new("linia")]).build();
    assert!(matches!(no_rows.render(&ctx), Err(Error::Statement { .. })));

    let mut empty_where = Statement::delete(&maszyny()).where_all(Delimiter::And, vec![]);
    assert!(matches!(empty_where.render(&ctx), Err(Error::Statement { .. })));

    let err = Statement::delete(&maszyny())
        .build()
        .order_by(&[Column::new("linia")], None)
        .render(&ctx)
        .map(str::to_string)
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Statement);
}
