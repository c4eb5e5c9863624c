//! Tests for krystal-rdbc cache module

mod common;

use common::*;
use krystal_rdbc::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn settings(interval_ms: u64, intervals: u64) -> CacheSettings {
    CacheSettings {
        enabled: true,
        monitor_interval_ms: interval_ms,
        intervals_count: intervals,
    }
}

fn key_of(machine: &Machine) -> String {
    Machine::descriptor().hash_key(machine)
}

// ==================== Lookup Tests ====================

#[test]
fn test_find_filters_by_type_and_predicate() {
    let cache = ObjectCache::new(settings(1000, 3));
    for machine in [Machine::new(1, "Prasa"), Machine::new(2, "Walcarka"), Machine::new(3, "Piła")] {
        cache.put(key_of(&machine), Arc::new(machine));
    }
    cache.put("Unit>kod=szt|", Arc::new(Unit { kod: "szt".into() }));

    let mut found: Vec<i32> = cache
        .find::<Machine, _>(|m| m.nazwa.starts_with('P'))
        .iter()
        .map(|m| m.linia)
        .collect();
    found.sort();
    assert_eq!(found, vec![1, 3]);
    assert_eq!(cache.find::<Unit, _>(|_| true).len(), 1);
}

#[test]
fn test_contains_any_ignores_removed_entries() {
    let cache = ObjectCache::new(settings(1000, 3));
    let machine = Machine::new(1, "Prasa");
    assert!(!cache.contains_any::<Machine>());

    cache.put(key_of(&machine), Arc::new(machine.clone()));
    assert!(cache.contains_any::<Machine>());

    cache.remove(&key_of(&machine));
    assert!(!cache.contains_any::<Machine>());
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.sweep(), 1);
    assert!(cache.is_empty());
}

#[test]
fn test_clear_type_keeps_other_types() {
    let cache = ObjectCache::new(settings(1000, 3));
    cache.put("Machine>linia=1|", Arc::new(Machine::new(1, "Prasa")));
    cache.put("Unit>kod=szt|", Arc::new(Unit { kod: "szt".into() }));

    cache.clear_type::<Machine>();
    cache.sweep();

    assert_eq!(cache.len(), 1);
    assert!(cache.get::<Unit>("Unit>kod=szt|").is_some());

    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn test_clear_filtered_removes_only_matching_entries() {
    let cache = ObjectCache::new(settings(1000, 3));
    for machine in [Machine::new(1, "Prasa"), Machine::new(2, "Walcarka"), Machine::new(3, "Piła")] {
        cache.put(key_of(&machine), Arc::new(machine));
    }
    cache.put("Unit>kod=szt|", Arc::new(Unit { kod: "szt".into() }));

    let filters = PersistenceFilters::default()
        .with_value("nazwa", ValuesFilter::are(Operator::Like, ["P%"]));
    cache.clear_filtered::<Machine>(&filters);
    cache.sweep();

    assert_eq!(cache.len(), 2);
    assert!(cache.get::<Machine>(&key_of(&Machine::new(2, ""))).is_some());
    assert!(cache.get::<Unit>("Unit>kod=szt|").is_some());
}

#[test]
fn test_clear_where_with_no_match_keeps_everything() {
    let cache = ObjectCache::new(settings(1000, 3));
    cache.put("Machine>linia=1|", Arc::new(Machine::new(1, "Prasa")));

    cache.clear_where::<Machine, _>(|m| m.linia > 10);
    cache.sweep();

    assert_eq!(cache.len(), 1);
}

#[test]
fn test_put_without_runtime_does_not_monitor() {
    let cache = ObjectCache::new(settings(1000, 3));
    cache.put("Machine>linia=1|", Arc::new(Machine::new(1, "Prasa")));
    assert!(!cache.is_monitoring());
}

#[test]
fn test_report_display() {
    let cache = ObjectCache::new(settings(500, 4));
    cache.put("Machine>linia=1|", Arc::new(Machine::new(1, "Prasa")));
    cache.put("Machine>linia=2|", Arc::new(Machine::new(2, "Piła")));
    cache.remove("Machine>linia=2|");

    let report = cache.report();
    assert_eq!(report.live, 1);
    assert_eq!(report.pending_removal, 1);

    let text = report.to_string();
    assert!(text.starts_with("Object cache: interval 500ms x 4, tick 0, live 1, pending removal 1"));
    assert!(text.contains("Machine: 1"));
}

// ==================== Monitor Tests ====================

#[tokio::test(start_paused = true)]
async fn test_monitor_expires_entries() {
    let cache = ObjectCache::new(settings(100, 3));
    let machine = Machine::new(5, "Prasa");
    cache.put(key_of(&machine), Arc::new(machine.clone()));
    assert!(cache.is_monitoring());

    // Two sweeps so far
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(cache.get::<Machine>(&key_of(&machine)).is_some());

    // Third sweep purges, then the monitor stops on the empty cache
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(cache.get::<Machine>(&key_of(&machine)).is_none());
    assert!(!cache.is_monitoring());
}

#[tokio::test(start_paused = true)]
async fn test_put_renews_lease() {
    let cache = ObjectCache::new(settings(100, 3));
    let machine = Machine::new(5, "Prasa");
    cache.put(key_of(&machine), Arc::new(machine.clone()));

    tokio::time::sleep(Duration::from_millis(250)).await;
    cache.put(key_of(&machine), Arc::new(machine.clone()));

    // Past the first lease, inside the renewed one
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(cache.get::<Machine>(&key_of(&machine)).is_some());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(cache.get::<Machine>(&key_of(&machine)).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_monitor_restarts_after_stopping() {
    let cache = ObjectCache::new(settings(100, 1));
    cache.put("Machine>linia=1|", Arc::new(Machine::new(1, "Prasa")));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(cache.is_empty());
    assert!(!cache.is_monitoring());

    cache.put("Machine>linia=2|", Arc::new(Machine::new(2, "Piła")));
    assert!(cache.is_monitoring());

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_memorized_entries_outlive_sweeps() {
    let cache = ObjectCache::new(settings(100, 1));
    let key = "Machine@Memorized>linia=1|";
    cache.put(key, Arc::new(Machine::new(1, "Prasa")));

    tokio::time::sleep(Duration::from_millis(5050)).await;
    assert!(cache.get::<Machine>(key).is_some());
    assert!(cache.is_monitoring());

    cache.remove(key);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(cache.is_empty());
}

// ==================== Persistence Lease Tests ====================

#[tokio::test(start_paused = true)]
async fn test_loaded_objects_expire_from_cache() {
    let db = ScriptedDb::new();
    let load = "SELECT * FROM MASZYNY WHERE linia IN (5)";
    db.answer(load, machine_rows(&[Machine::new(5, "Prasa")]));
    db.answer(load, machine_rows(&[Machine::new(5, "Prasa")]));
    let persistence = persistence(&db);
    let interval = persistence.cache().unwrap().settings().monitor_interval();
    let intervals = persistence.cache().unwrap().settings().intervals_count as u32;

    persistence.load(&mut Machine::new(5, "")).await.unwrap();
    tokio::time::sleep(interval * intervals + interval / 2).await;

    let mut machine = Machine::new(5, "");
    assert!(persistence.load(&mut machine).await.unwrap());
    assert_eq!(machine.nazwa, "Prasa");
    assert_eq!(db.log().len(), 2);
}
