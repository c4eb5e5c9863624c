//! Tests for krystal-rdbc provider module

use krystal_rdbc::prelude::*;
use std::fs;
use std::path::Path;

fn write(dir: &Path, file: &str, content: &str) {
    fs::write(dir.join(file), content).unwrap();
}

fn config(dir: &Path) -> EngineConfig {
    EngineConfig::default()
        .with_providers_dir(dir)
        .with_providers(vec![
            ProviderEntry::new("sqlserver", "sqlserver"),
            ProviderEntry::new("reports", "postgresql"),
            ProviderEntry::new("archive", "as400"),
        ])
}

// ==================== Driver Tests ====================

#[test]
fn test_driver_dialects() {
    assert_eq!(Driver::SQLSERVER.dialect().family(), DialectFamily::SqlServer);
    assert_eq!(Driver::by_name("AS400").map(|d| d.scheme()), Some("as400://"));
    assert_eq!(Driver::MYSQL.family(), DialectFamily::MySql);
    assert_eq!(Driver::BUILT_IN.len(), 5);
}

// ==================== ProviderProperties Tests ====================

#[test]
fn test_properties_file() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "reports.yaml",
        "host: db02\ndatabase: raporty\nuser: raport\npassword: tajne\nssl: true\n",
    );

    let props = ProviderProperties::from_file(&dir.path().join("reports.yaml")).unwrap();
    let connection = props.connection_config(Driver::POSTGRESQL);

    assert_eq!(connection.url, "postgres://db02/raporty");
    assert_eq!(connection.property("ssl"), Some("true"));
    assert_eq!(connection.property("password"), Some("tajne"));
    assert!(!format!("{:?}", connection).contains("tajne"));
}

#[test]
fn test_properties_reject_empty_host() {
    let err = ProviderProperties::from_yaml_str("host: ''\ndatabase: produkcja\n").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
}

#[test]
fn test_properties_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = ProviderProperties::from_file(&dir.path().join("nope.yaml")).unwrap_err();
    assert!(err.to_string().contains("nope.yaml"));
}

// ==================== ProviderRegistry Tests ====================

#[test]
fn test_registry_load() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "sqlserver.yaml", "server: db01\ndatabase: produkcja\nencrypt: false\n");
    write(dir.path(), "reports.yml", "host: db02\ndatabase: raporty\n");

    let registry = ProviderRegistry::load(&config(dir.path()));

    assert_eq!(registry.default_provider().name(), "sqlserver");
    assert_eq!(
        registry.connection_config("sqlserver").unwrap().url,
        "sqlserver://db01/produkcja"
    );
    assert_eq!(
        registry.connection_config("reports").unwrap().url,
        "postgres://db02/raporty"
    );
    assert_eq!(registry.get("reports").map(Provider::driver), Some(Driver::POSTGRESQL));
}

#[test]
fn test_yaml_wins_over_yml() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "sqlserver.yaml", "host: primary\ndatabase: produkcja\n");
    write(dir.path(), "sqlserver.yml", "host: stale\ndatabase: produkcja\n");

    let registry = ProviderRegistry::load(&config(dir.path()));
    assert_eq!(
        registry.connection_config("sqlserver").unwrap().url,
        "sqlserver://primary/produkcja"
    );
}

#[test]
fn test_missing_properties_keep_provider() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "archive.yaml", "host: [not, a, string]\n");

    let registry = ProviderRegistry::load(&config(dir.path()));

    assert!(registry.get("archive").is_some());
    assert!(registry.get("reports").is_some());
    assert!(registry.connection_config("archive").is_err());
    assert!(registry.connection_config("reports").is_err());
    assert_eq!(registry.providers().count(), 3);
}

#[test]
fn test_unknown_driver_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path()).with_providers(vec![
        ProviderEntry::new("sqlserver", "sqlserver"),
        ProviderEntry::new("legacy", "oracle"),
    ]);

    let registry = ProviderRegistry::load(&config);
    assert!(registry.get("legacy").is_none());
}

#[test]
fn test_unconfigured_default_provider() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path()).with_default_provider("h2");

    let registry = ProviderRegistry::load(&config);
    assert_eq!(registry.default_provider().name(), "h2");
    assert_eq!(registry.default_provider().driver(), Driver::H2);
    assert_eq!(registry.resolve(None).name(), "h2");
}

#[test]
fn test_register_overrides_loaded_settings() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = ProviderRegistry::load(&config(dir.path()));
    registry.register(
        Provider::new("reports", Driver::POSTGRESQL),
        ConnectionConfig::new("postgres://localhost/raporty"),
    );
    assert_eq!(
        registry.connection_config("reports").unwrap().url,
        "postgres://localhost/raporty"
    );
}
