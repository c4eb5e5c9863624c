//! Lease-based object cache.
//!
//! Entries are keyed by an entity's [`hash_key`](crate::entity::EntityDescriptor::hash_key)
//! and live for a number of sweep ticks. Every `put` renews the lease;
//! `get` does not. Expiry is tracked in a min-heap of deadlines with lazy
//! invalidation, so a sweep only touches entries that are actually due.
//!
//! A background tokio task sweeps at the configured interval while the
//! cache holds entries and exits once it is empty; the next `put` starts it
//! again.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::CacheSettings;
use crate::entity::{is_memorized_key, Entity};
use crate::filters::PersistenceFilters;

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
    /// Tick at which the entry is purged; `None` never expires
    deadline: Option<u64>,
    removed: bool,
}

struct CacheInner {
    settings: CacheSettings,
    entries: DashMap<String, CacheEntry>,
    deadlines: Mutex<BinaryHeap<Reverse<(u64, String)>>>,
    tick: AtomicU64,
    monitor_running: AtomicBool,
}

/// Shared, cloneable handle to the object cache
#[derive(Clone)]
pub struct ObjectCache {
    inner: Arc<CacheInner>,
}

impl fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCache")
            .field("settings", &self.inner.settings)
            .field("entries", &self.inner.entries.len())
            .field("tick", &self.inner.tick.load(Ordering::Relaxed))
            .finish()
    }
}

/// Snapshot of the cache contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheReport {
    /// Sweep period
    pub monitor_interval: Duration,
    /// Lease length in sweeps
    pub intervals_count: u64,
    /// Sweeps done so far
    pub tick: u64,
    /// Live entries
    pub live: usize,
    /// Entries marked removed, not yet purged
    pub pending_removal: usize,
    /// Live entries per type name
    pub by_type: BTreeMap<&'static str, usize>,
}

impl fmt::Display for CacheReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Object cache: interval {}ms x {}, tick {}, live {}, pending removal {}",
            self.monitor_interval.as_millis(),
            self.intervals_count,
            self.tick,
            self.live,
            self.pending_removal
        )?;
        for (type_name, count) in &self.by_type {
            write!(f, ", {}: {}", type_name, count)?;
        }
        Ok(())
    }
}

impl ObjectCache {
    /// Create an empty cache
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                settings,
                entries: DashMap::new(),
                deadlines: Mutex::new(BinaryHeap::new()),
                tick: AtomicU64::new(0),
                monitor_running: AtomicBool::new(false),
            }),
        }
    }

    /// Cache settings
    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    /// Insert `value` unless a live entry exists, and renew the lease.
    ///
    /// Keys of memorized types never expire.
    pub fn put<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: Arc<T>) {
        let key = key.into();
        let inner = &self.inner;
        let deadline = if is_memorized_key(&key) {
            None
        } else {
            Some(inner.tick.load(Ordering::SeqCst) + inner.settings.intervals_count)
        };

        {
            let mut entry = inner.entries.entry(key.clone()).or_insert_with(|| CacheEntry {
                value: value.clone(),
                type_id: TypeId::of::<T>(),
                type_name: std::any::type_name::<T>(),
                deadline,
                removed: false,
            });
            if entry.removed {
                entry.value = value;
                entry.type_id = TypeId::of::<T>();
                entry.type_name = std::any::type_name::<T>();
                entry.removed = false;
            }
            entry.deadline = deadline;
        }

        if let Some(deadline) = deadline {
            inner.deadlines.lock().push(Reverse((deadline, key.clone())));
        }
        trace!(key = %key, deadline = ?deadline, "Cache put");
        self.start_monitor();
    }

    /// Live entry of type `T`; the lease is not renewed
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let value = {
            let entry = self.inner.entries.get(key)?;
            if entry.removed {
                return None;
            }
            entry.value.clone()
        };
        value.downcast::<T>().ok()
    }

    /// Live entries of type `T` matching `predicate`
    pub fn find<T, F>(&self, predicate: F) -> Vec<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> bool,
    {
        let values: Vec<Arc<dyn Any + Send + Sync>> = self
            .inner
            .entries
            .iter()
            .filter(|e| !e.removed && e.type_id == TypeId::of::<T>())
            .map(|e| e.value.clone())
            .collect();
        values
            .into_iter()
            .filter_map(|v| v.downcast::<T>().ok())
            .filter(|v| predicate(v))
            .collect()
    }

    /// Whether any live entry has type `T`
    pub fn contains_any<T: 'static>(&self) -> bool {
        self.inner
            .entries
            .iter()
            .any(|e| !e.removed && e.type_id == TypeId::of::<T>())
    }

    /// Mark an entry for removal at the next sweep
    pub fn remove(&self, key: &str) {
        let tick = self.inner.tick.load(Ordering::SeqCst);
        let marked = match self.inner.entries.get_mut(key) {
            Some(mut entry) => {
                entry.removed = true;
                entry.deadline = Some(tick);
                true
            }
            None => false,
        };
        if marked {
            self.inner.deadlines.lock().push(Reverse((tick, key.to_string())));
            trace!(key = %key, "Cache entry marked for removal");
        }
    }

    /// Drop every entry now
    pub fn clear(&self) {
        self.inner.entries.clear();
        self.inner.deadlines.lock().clear();
    }

    /// Mark every entry of type `T` for removal
    pub fn clear_type<T: 'static>(&self) {
        let keys: Vec<String> = self
            .inner
            .entries
            .iter()
            .filter(|e| e.type_id == TypeId::of::<T>())
            .map(|e| e.key().clone())
            .collect();
        for key in keys {
            self.remove(&key);
        }
    }

    /// Mark every live entry of type `T` matching `predicate` for removal
    pub fn clear_where<T, F>(&self, predicate: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> bool,
    {
        let candidates: Vec<(String, Arc<dyn Any + Send + Sync>)> = self
            .inner
            .entries
            .iter()
            .filter(|e| !e.removed && e.type_id == TypeId::of::<T>())
            .map(|e| (e.key().clone(), e.value.clone()))
            .collect();
        let mut cleared = 0usize;
        for (key, value) in candidates {
            if value.downcast::<T>().is_ok_and(|v| predicate(v.as_ref())) {
                self.remove(&key);
                cleared += 1;
            }
        }
        debug!(type_name = std::any::type_name::<T>(), cleared, "Cache entries cleared");
    }

    /// Mark every entry of type `T` passing `filters` for removal
    pub fn clear_filtered<T: Entity>(&self, filters: &PersistenceFilters) {
        self.clear_where::<T, _>(|e| filters.test(e));
    }

    /// Entries held, including those awaiting removal
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Advance one tick and purge every entry that is due.
    ///
    /// Returns the number of purged entries.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    /// Per-type summary of the cache contents
    pub fn report(&self) -> CacheReport {
        let mut by_type = BTreeMap::new();
        let mut pending_removal = 0;
        for entry in self.inner.entries.iter() {
            if entry.removed {
                pending_removal += 1;
            } else {
                *by_type.entry(entry.type_name).or_insert(0) += 1;
            }
        }
        CacheReport {
            monitor_interval: self.inner.settings.monitor_interval(),
            intervals_count: self.inner.settings.intervals_count,
            tick: self.inner.tick.load(Ordering::SeqCst),
            live: self.len() - pending_removal,
            pending_removal,
            by_type,
        }
    }

    /// Whether the background sweeper is running
    pub fn is_monitoring(&self) -> bool {
        self.inner.monitor_running.load(Ordering::SeqCst)
    }

    fn start_monitor(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        if self
            .inner
            .monitor_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let interval = self.inner.settings.monitor_interval();
        debug!(interval_ms = interval.as_millis() as u64, "Cache monitor started");
        handle.spawn(monitor(weak, interval));
    }
}

async fn monitor(cache: Weak<CacheInner>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let Some(inner) = cache.upgrade() else {
            return;
        };
        inner.sweep();
        if inner.entries.is_empty() {
            inner.monitor_running.store(false, Ordering::SeqCst);
            // A put racing with the shutdown may have missed the flag.
            if inner.entries.is_empty()
                || inner
                    .monitor_running
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
            {
                debug!("Cache empty, monitor stopped");
                return;
            }
        }
    }
}

impl CacheInner {
    fn sweep(&self) -> usize {
        let tick = self.tick.fetch_add(1, Ordering::SeqCst) + 1;
        let mut due = Vec::new();
        {
            let mut heap = self.deadlines.lock();
            while let Some(Reverse((deadline, _))) = heap.peek() {
                if *deadline > tick {
                    break;
                }
                if let Some(Reverse((deadline, key))) = heap.pop() {
                    due.push((deadline, key));
                }
            }
        }

        let mut purged = 0;
        for (deadline, key) in due {
            // Stale heap items are skipped: the entry was renewed since.
            if self
                .entries
                .remove_if(&key, |_, entry| {
                    entry.deadline.is_some_and(|d| d <= tick && d == deadline)
                })
                .is_some()
            {
                purged += 1;
            }
        }
        if purged > 0 {
            trace!(tick, purged, remaining = self.entries.len(), "Cache swept");
        }
        purged
    }
}
