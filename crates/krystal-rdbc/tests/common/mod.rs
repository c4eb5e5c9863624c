//! Shared helpers for krystal-rdbc integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use krystal_rdbc::prelude::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once, OnceLock};

static INIT: Once = Once::new();

/// Initialize test logging (idempotent)
pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("krystal_rdbc=debug".parse().unwrap()),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

// ==================== Scripted Database ====================

/// What the scripted database has seen and will answer
#[derive(Default)]
pub struct Script {
    /// Every statement received, in order
    pub log: Vec<String>,
    /// Canned query answers, consumed by the first statement with the prefix
    pub answers: Vec<(String, QueryResult)>,
    /// Statements starting with this prefix fail with a query error
    pub fail_prefix: Option<String>,
    /// Opening a connection fails
    pub fail_connect: bool,
    /// Rows reported by `execute`
    pub affected: u64,
}

/// In-memory database reached through [`ScriptedFactory`]
#[derive(Clone, Default)]
pub struct ScriptedDb {
    script: Arc<Mutex<Script>>,
    connects: Arc<AtomicUsize>,
}

impl ScriptedDb {
    pub fn new() -> Self {
        let db = Self::default();
        db.script.lock().affected = 1;
        db
    }

    /// Answer the next statement starting with `prefix`
    pub fn answer(&self, prefix: &str, result: QueryResult) {
        self.script.lock().answers.push((prefix.to_string(), result));
    }

    pub fn fail_on(&self, prefix: &str) {
        self.script.lock().fail_prefix = Some(prefix.to_string());
    }

    pub fn fail_connect(&self, fail: bool) {
        self.script.lock().fail_connect = fail;
    }

    pub fn set_affected(&self, affected: u64) {
        self.script.lock().affected = affected;
    }

    pub fn log(&self) -> Vec<String> {
        self.script.lock().log.clone()
    }

    pub fn clear_log(&self) {
        self.script.lock().log.clear();
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn receive(&self, sql: &str) -> Result<Option<QueryResult>> {
        let mut script = self.script.lock();
        script.log.push(sql.to_string());
        if let Some(prefix) = &script.fail_prefix {
            if sql.starts_with(prefix.as_str()) {
                return Err(Error::query(format!("scripted failure for {}", prefix)));
            }
        }
        let position = script.answers.iter().position(|(p, _)| sql.starts_with(p.as_str()));
        Ok(position.map(|i| script.answers.remove(i).1))
    }
}

pub struct ScriptedConnection {
    db: ScriptedDb,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn query(&self, sql: &str) -> Result<QueryResult> {
        Ok(self.db.receive(sql)?.unwrap_or_else(QueryResult::empty))
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let answer = self.db.receive(sql)?;
        Ok(answer
            .and_then(|r| r.affected_rows())
            .unwrap_or_else(|| self.db.script.lock().affected))
    }

    async fn is_valid(&self) -> bool {
        true
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Connection factory handing out connections to one [`ScriptedDb`]
pub struct ScriptedFactory {
    db: ScriptedDb,
    family: DialectFamily,
}

impl ScriptedFactory {
    pub fn new(db: &ScriptedDb, family: DialectFamily) -> Arc<Self> {
        Arc::new(Self {
            db: db.clone(),
            family,
        })
    }
}

#[async_trait]
impl ConnectionFactory for ScriptedFactory {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        if self.db.script.lock().fail_connect {
            return Err(Error::connection("scripted database unreachable"));
        }
        self.db.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnection { db: self.db.clone() }))
    }

    fn family(&self) -> DialectFamily {
        self.family
    }
}

/// Registry with `sqlserver` (default) and `reports` (PostgreSQL)
pub fn registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new(Provider::new("sqlserver", Driver::SQLSERVER));
    registry.register(
        Provider::new("sqlserver", Driver::SQLSERVER),
        ConnectionConfig::new("sqlserver://mock/produkcja"),
    );
    registry.register(
        Provider::new("reports", Driver::POSTGRESQL),
        ConnectionConfig::new("postgres://mock/raporty"),
    );
    registry
}

/// Executor whose SQL Server provider talks to `db`
pub fn executor(db: &ScriptedDb) -> Arc<QueryExecutor> {
    init_test_logging();
    let executor = QueryExecutor::new(EngineConfig::default(), registry());
    executor.register_factory(ScriptedFactory::new(db, DialectFamily::SqlServer));
    Arc::new(executor)
}

/// Persistence over `db` with its own cache
pub fn persistence(db: &ScriptedDb) -> Persistence {
    Persistence::new(executor(db))
}

// ==================== Test Entities ====================

/// Production line machine, keyed by line number
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Machine {
    pub linia: i32,
    pub nazwa: String,
}

impl Machine {
    pub fn new(linia: i32, nazwa: &str) -> Self {
        Self {
            linia,
            nazwa: nazwa.to_string(),
        }
    }
}

impl Entity for Machine {
    fn descriptor() -> &'static EntityDescriptor<Self> {
        static DESCRIPTOR: OnceLock<EntityDescriptor<Machine>> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            EntityDescriptor::builder("Machine", Table::new("MASZYNY"))
                .field(
                    FieldDescriptor::new(
                        "linia",
                        |m: &Machine| m.linia.into(),
                        |m, v| m.linia = v.as_i32().unwrap_or_default(),
                    )
                    .key(),
                )
                .field(FieldDescriptor::new(
                    "nazwa",
                    |m: &Machine| m.nazwa.clone().into(),
                    |m, v| m.nazwa = v.as_string().unwrap_or_default(),
                ))
                .reader(&[SqlType::Integer, SqlType::Varchar], |values| {
                    Ok(Machine {
                        linia: values[0].as_i32().unwrap_or_default(),
                        nazwa: values[1].as_string().unwrap_or_default(),
                    })
                })
                .filter(|| Column::new("linia").less(9000))
                .build()
        })
    }
}

/// Machine rows as the database returns them
pub fn machine_rows(machines: &[Machine]) -> QueryResult {
    let names = vec!["linia".to_string(), "nazwa".to_string()];
    QueryResult::new(
        vec![
            ResultColumn::new("linia", SqlType::Integer),
            ResultColumn::new("nazwa", SqlType::Varchar),
        ],
        machines
            .iter()
            .map(|m| Row::new(names.clone(), vec![m.linia.into(), m.nazwa.clone().into()]))
            .collect(),
    )
}

/// Work order with a database-generated id
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Order {
    pub id: Option<i64>,
    pub nazwa: String,
}

impl Entity for Order {
    fn descriptor() -> &'static EntityDescriptor<Self> {
        static DESCRIPTOR: OnceLock<EntityDescriptor<Order>> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            EntityDescriptor::builder("Order", Table::new("ZLECENIA"))
                .field(
                    FieldDescriptor::new(
                        "id",
                        |o: &Order| o.id.into(),
                        |o, v| o.id = v.as_i64(),
                    )
                    .incremental_key(),
                )
                .field(FieldDescriptor::new(
                    "nazwa",
                    |o: &Order| o.nazwa.clone().into(),
                    |o, v| o.nazwa = v.as_string().unwrap_or_default(),
                ))
                .reader(&[SqlType::BigInt, SqlType::Varchar], |values| {
                    Ok(Order {
                        id: values[0].as_i64(),
                        nazwa: values[1].as_string().unwrap_or_default(),
                    })
                })
                .build()
        })
    }
}

pub fn order_rows(orders: &[Order]) -> QueryResult {
    let names = vec!["id".to_string(), "nazwa".to_string()];
    QueryResult::new(
        vec![
            ResultColumn::new("id", SqlType::BigInt),
            ResultColumn::new("nazwa", SqlType::Varchar),
        ],
        orders
            .iter()
            .map(|o| Row::new(names.clone(), vec![o.id.into(), o.nazwa.clone().into()]))
            .collect(),
    )
}

/// Free-form note without key fields
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Note {
    pub tekst: String,
}

impl Entity for Note {
    fn descriptor() -> &'static EntityDescriptor<Self> {
        static DESCRIPTOR: OnceLock<EntityDescriptor<Note>> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            EntityDescriptor::builder("Note", Table::new("NOTATKI"))
                .field(FieldDescriptor::new(
                    "tekst",
                    |n: &Note| n.tekst.clone().into(),
                    |n, v| n.tekst = v.as_string().unwrap_or_default(),
                ))
                .reader(&[SqlType::Varchar], |values| {
                    Ok(Note {
                        tekst: values[0].as_string().unwrap_or_default(),
                    })
                })
                .build()
        })
    }
}

/// Dictionary entry: read-only and never cached
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Unit {
    pub kod: String,
}

impl Entity for Unit {
    fn descriptor() -> &'static EntityDescriptor<Self> {
        static DESCRIPTOR: OnceLock<EntityDescriptor<Unit>> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            EntityDescriptor::builder("Unit", Table::new("JEDNOSTKI"))
                .field(
                    FieldDescriptor::new(
                        "kod",
                        |u: &Unit| u.kod.clone().into(),
                        |u, v| u.kod = v.as_string().unwrap_or_default(),
                    )
                    .key(),
                )
                .reader(&[SqlType::Varchar], |values| {
                    Ok(Unit {
                        kod: values[0].as_string().unwrap_or_default(),
                    })
                })
                .read_only()
                .fresh()
                .build()
        })
    }
}

pub fn unit_rows(units: &[&str]) -> QueryResult {
    QueryResult::new(
        vec![ResultColumn::new("kod", SqlType::Varchar)],
        units
            .iter()
            .map(|u| Row::new(vec!["kod".to_string()], vec![(*u).into()]))
            .collect(),
    )
}

/// Workstation keyed by hall, slot number and a generated id
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Station {
    pub hala: String,
    pub stanowisko: Option<i32>,
    pub id: Option<i64>,
    pub opis: String,
}

impl Entity for Station {
    fn descriptor() -> &'static EntityDescriptor<Self> {
        static DESCRIPTOR: OnceLock<EntityDescriptor<Station>> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            EntityDescriptor::builder("Station", Table::new("STANOWISKA"))
                .field(
                    FieldDescriptor::new(
                        "hala",
                        |s: &Station| s.hala.clone().into(),
                        |s, v| s.hala = v.as_string().unwrap_or_default(),
                    )
                    .key(),
                )
                .field(
                    FieldDescriptor::new(
                        "stanowisko",
                        |s: &Station| s.stanowisko.into(),
                        |s, v| s.stanowisko = v.as_i32(),
                    )
                    .key(),
                )
                .field(
                    FieldDescriptor::new("id", |s: &Station| s.id.into(), |s, v| s.id = v.as_i64())
                        .incremental_key(),
                )
                .field(FieldDescriptor::new(
                    "opis",
                    |s: &Station| s.opis.clone().into(),
                    |s, v| s.opis = v.as_string().unwrap_or_default(),
                ))
                .reader(
                    &[SqlType::Varchar, SqlType::Integer, SqlType::BigInt, SqlType::Varchar],
                    |values| {
                        Ok(Station {
                            hala: values[0].as_string().unwrap_or_default(),
                            stanowisko: values[1].as_i32(),
                            id: values[2].as_i64(),
                            opis: values[3].as_string().unwrap_or_default(),
                        })
                    },
                )
                .build()
        })
    }
}

/// Machine parameters stored one row per parameter
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Settings {
    pub linia: i32,
    pub temp: Option<i32>,
    pub tryb: String,
}

impl Entity for Settings {
    fn descriptor() -> &'static EntityDescriptor<Self> {
        static DESCRIPTOR: OnceLock<EntityDescriptor<Settings>> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            EntityDescriptor::builder("Settings", Table::new("PARAMETRY"))
                .field(
                    FieldDescriptor::new(
                        "linia",
                        |s: &Settings| s.linia.into(),
                        |s, v| s.linia = v.as_i32().unwrap_or_default(),
                    )
                    .key(),
                )
                .field(FieldDescriptor::new(
                    "temp",
                    |s: &Settings| s.temp.into(),
                    |s, v| s.temp = v.as_i32(),
                ))
                .field(FieldDescriptor::new(
                    "tryb",
                    |s: &Settings| s.tryb.clone().into(),
                    |s, v| s.tryb = v.as_string().unwrap_or_default(),
                ))
                .reader(&[SqlType::Integer, SqlType::Varchar, SqlType::Varchar], |values| {
                    Ok(Settings {
                        linia: values[0].as_i32().unwrap_or_default(),
                        temp: values[1].as_i32(),
                        tryb: values[2].as_string().unwrap_or_default(),
                    })
                })
                .vertical("pole", "wartosc", &[])
                .build()
        })
    }
}

/// Parameter rows as stored: one `(linia, pole, wartosc)` row per field
pub fn settings_rows(linia: i32, fields: &[(&str, Option<&str>)]) -> QueryResult {
    let names = vec!["linia".to_string(), "pole".to_string(), "wartosc".to_string()];
    QueryResult::new(
        vec![
            ResultColumn::new("linia", SqlType::Integer),
            ResultColumn::new("pole", SqlType::Varchar),
            ResultColumn::new("wartosc", SqlType::Varchar),
        ],
        fields
            .iter()
            .map(|(pole, wartosc)| {
                Row::new(names.clone(), vec![linia.into(), (*pole).into(), (*wartosc).into()])
            })
            .collect(),
    )
}

/// Tool written through stored procedures, counting its hooks
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Tool {
    pub kod: String,
    pub nazwa: String,
    pub locked: bool,
    pub reads: u32,
    pub writes: u32,
}

impl Tool {
    pub fn new(kod: &str, nazwa: &str) -> Self {
        Self {
            kod: kod.to_string(),
            nazwa: nazwa.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for Tool {
    fn descriptor() -> &'static EntityDescriptor<Self> {
        static DESCRIPTOR: OnceLock<EntityDescriptor<Tool>> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            EntityDescriptor::builder("Tool", Table::new("NARZEDZIA"))
                .field(
                    FieldDescriptor::new(
                        "kod",
                        |t: &Tool| t.kod.clone().into(),
                        |t, v| t.kod = v.as_string().unwrap_or_default(),
                    )
                    .key(),
                )
                .field(FieldDescriptor::new(
                    "nazwa",
                    |t: &Tool| t.nazwa.clone().into(),
                    |t, v| t.nazwa = v.as_string().unwrap_or_default(),
                ))
                .reader(&[SqlType::Varchar, SqlType::Varchar], |values| {
                    Ok(Tool::new(
                        &values[0].as_string().unwrap_or_default(),
                        &values[1].as_string().unwrap_or_default(),
                    ))
                })
                .inserter(
                    |t: &Tool| Statement::raw(format!("EXEC dodaj_narzedzie '{}', '{}'", t.kod, t.nazwa)),
                    false,
                )
                .updater(|t: &Tool| {
                    Statement::raw(format!("EXEC zmien_narzedzie '{}', '{}'", t.kod, t.nazwa))
                })
                .remover(|t: &Tool| Statement::raw(format!("EXEC usun_narzedzie '{}'", t.kod)))
                .build()
        })
    }

    fn after_read(&mut self) -> Result<()> {
        self.reads += 1;
        Ok(())
    }

    fn after_write(&mut self) -> Result<()> {
        self.writes += 1;
        Ok(())
    }

    fn before_delete(&mut self) -> Result<()> {
        if self.locked {
            return Err(Error::constraint("Tool", "locked tools cannot be deleted"));
        }
        Ok(())
    }
}

pub fn tool_rows(tools: &[Tool]) -> QueryResult {
    let names = vec!["kod".to_string(), "nazwa".to_string()];
    QueryResult::new(
        vec![
            ResultColumn::new("kod", SqlType::Varchar),
            ResultColumn::new("nazwa", SqlType::Varchar),
        ],
        tools
            .iter()
            .map(|t| Row::new(names.clone(), vec![t.kod.clone().into(), t.nazwa.clone().into()]))
            .collect(),
    )
}
