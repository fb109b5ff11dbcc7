//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the core storage engine for DuoKV.
//! A key holds either a string or a dictionary (field -> value), plus an
//! optional expiration instant.
//!
//! ## Design Decisions
//!
//! 1. **One Lock**: The keyspace map and the TTL index live behind a single `RwLock`,
//!    so a write and the index entry it produces are always applied together.
//! 2. **No Lazy Expiry**: Reads never look at expiration. Only the sweep evicts, which
//!    keeps reads on the shared lock and makes a store without a sweeper deterministic.
//! 3. **Write Versions**: Every write stamps the value with a fresh version. A TTL entry
//!    only evicts the write it was created for, so overwrites are never hit by stale
//!    entries.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │                RwLock<Keyspace>                       │  │
//! │  │   ┌───────────────────────┐   ┌─────────────────┐     │  │
//! │  │   │ HashMap<String,Entry> │   │    TtlIndex     │     │  │
//! │  │   └───────────────────────┘   └─────────────────┘     │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!        ▲ read: get_string, get_dict
//!        ▲ write: set_string, set_dict, delete_key, sweep_expired
//! ```

use crate::storage::ttl::{Ttl, TtlEntry, TtlIndex};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use thiserror::Error;
use tracing::trace;

/// A dictionary value: field name -> field value.
pub type Dict = BTreeMap<String, String>;

/// Result of a dictionary read. `None` marks a requested field that does not exist.
pub type FieldValues = BTreeMap<String, Option<String>>;

/// Errors raised by the storage engine itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A thread panicked while holding the engine lock; the keyspace may be
    /// half-updated and is no longer served.
    #[error("storage lock poisoned during {0}")]
    LockPoisoned(&'static str),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// The two kinds of value a key can hold.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    String(String),
    Dict(Dict),
}

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    /// When this entry expires (None = never expires)
    expires_at: Option<Instant>,
    /// Version of the write that produced this entry
    version: u64,
}

/// Everything the engine lock protects.
#[derive(Debug, Default)]
struct Keyspace {
    data: HashMap<String, Entry>,
    ttl: TtlIndex,
    last_version: u64,
}

impl Keyspace {
    fn next_version(&mut self) -> u64 {
        self.last_version += 1;
        self.last_version
    }

    /// Resolves the expiration of a write and records it in the TTL index.
    fn track_expiry(&mut self, key: &str, ttl: Ttl, version: u64) -> Option<Instant> {
        let expires_at = ttl.deadline(Instant::now());
        if expires_at.is_some() {
            self.ttl.push(TtlEntry {
                key: key.to_owned(),
                expires_at,
                version,
            });
        }
        expires_at
    }
}

/// Outcome of one pass over the TTL index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Index entries whose instant had passed
    pub drained: usize,
    /// Keys actually removed from the keyspace
    pub evicted: usize,
}

/// The main storage engine for DuoKV.
///
/// All connection tasks share one engine through an `Arc`. Every operation holds
/// the engine lock for its whole duration, so each call is atomic with respect
/// to every other call and to the expiry sweep.
///
/// # Example
///
/// ```
/// use duokv::storage::{Dict, StorageEngine, Ttl};
///
/// let engine = StorageEngine::new();
///
/// engine.set_string("user:1", "alice", Ttl::Persist).unwrap();
/// assert_eq!(engine.get_string("user:1").unwrap(), Some("alice".to_string()));
///
/// let meta = Dict::from([("age".to_string(), "30".to_string())]);
/// engine.set_dict("user:1:meta", meta, Ttl::Persist).unwrap();
///
/// let values = engine.get_dict("user:1:meta", &["age", "height"]).unwrap().unwrap();
/// assert_eq!(values["age"], Some("30".to_string()));
/// assert_eq!(values["height"], None);
/// ```
pub struct StorageEngine {
    keyspace: RwLock<Keyspace>,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: total DEL operations (explicit or via negative TTL)
    del_count: AtomicU64,

    /// Statistics: number of keys evicted by the sweep
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("keys", &self.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an empty engine. The keyspace and the TTL index are created together.
    pub fn new() -> Self {
        Self {
            keyspace: RwLock::new(Keyspace {
                data: HashMap::new(),
                ttl: TtlIndex::new(),
                last_version: 0,
            }),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    fn read(&self, op: &'static str) -> StorageResult<RwLockReadGuard<'_, Keyspace>> {
        self.keyspace
            .read()
            .map_err(|_| StorageError::LockPoisoned(op))
    }

    fn write(&self, op: &'static str) -> StorageResult<RwLockWriteGuard<'_, Keyspace>> {
        self.keyspace
            .write()
            .map_err(|_| StorageError::LockPoisoned(op))
    }

    /// Gets the string stored at `key`.
    ///
    /// Returns `None` if the key doesn't exist or holds a dictionary.
    pub fn get_string(&self, key: &str) -> StorageResult<Option<String>> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let keyspace = self.read("get_string")?;
        Ok(match keyspace.data.get(key) {
            Some(Entry {
                value: Value::String(s),
                ..
            }) => Some(s.clone()),
            _ => None,
        })
    }

    /// Writes a string, replacing whatever `key` held before.
    ///
    /// - `Ttl::Delete` removes the key instead (absent keys are fine).
    /// - `Ttl::Persist` stores the value without expiration.
    /// - `Ttl::Expire(d)` expires the value `d` from now and records it in the TTL index.
    pub fn set_string(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Ttl,
    ) -> StorageResult<()> {
        let key = key.into();
        let mut keyspace = self.write("set_string")?;

        if ttl == Ttl::Delete {
            self.del_count.fetch_add(1, Ordering::Relaxed);
            keyspace.data.remove(&key);
            return Ok(());
        }

        self.set_count.fetch_add(1, Ordering::Relaxed);

        let version = keyspace.next_version();
        let expires_at = keyspace.track_expiry(&key, ttl, version);
        keyspace.data.insert(
            key,
            Entry {
                value: Value::String(value.into()),
                expires_at,
                version,
            },
        );

        Ok(())
    }

    /// Reads a dictionary.
    ///
    /// With no `fields`, returns every field of the dictionary. Otherwise returns
    /// exactly the requested names, each mapped to its value or `None` when the
    /// field does not exist. The empty field name always resolves to `None`.
    ///
    /// Returns `None` if the key doesn't exist or holds a string. The map is a
    /// snapshot; later writes don't affect it.
    pub fn get_dict(&self, key: &str, fields: &[&str]) -> StorageResult<Option<FieldValues>> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let keyspace = self.read("get_dict")?;
        let dict = match keyspace.data.get(key) {
            Some(Entry {
                value: Value::Dict(dict),
                ..
            }) => dict,
            _ => return Ok(None),
        };

        if fields.is_empty() {
            return Ok(Some(
                dict.iter()
                    .map(|(field, value)| (field.clone(), Some(value.clone())))
                    .collect(),
            ));
        }

        Ok(Some(
            fields
                .iter()
                .map(|&field| {
                    let value = if field.is_empty() {
                        None
                    } else {
                        dict.get(field).cloned()
                    };
                    (field.to_owned(), value)
                })
                .collect(),
        ))
    }

    /// Merges `fields` into the dictionary at `key`.
    ///
    /// Creates the dictionary if the key is new or currently holds a string.
    /// TTL handling matches [`StorageEngine::set_string`].
    pub fn set_dict(&self, key: impl Into<String>, fields: Dict, ttl: Ttl) -> StorageResult<()> {
        let key = key.into();
        let mut keyspace = self.write("set_dict")?;

        if ttl == Ttl::Delete {
            self.del_count.fetch_add(1, Ordering::Relaxed);
            keyspace.data.remove(&key);
            return Ok(());
        }

        self.set_count.fetch_add(1, Ordering::Relaxed);

        let version = keyspace.next_version();
        let expires_at = keyspace.track_expiry(&key, ttl, version);

        let entry = keyspace.data.entry(key).or_insert_with(|| Entry {
            value: Value::Dict(Dict::new()),
            expires_at: None,
            version,
        });
        match &mut entry.value {
            Value::Dict(existing) => existing.extend(fields),
            other => *other = Value::Dict(fields),
        }
        entry.expires_at = expires_at;
        entry.version = version;

        Ok(())
    }

    /// Deletes a key of either kind.
    ///
    /// # Returns
    ///
    /// Returns `true` if the key was deleted, `false` if it didn't exist.
    pub fn delete_key(&self, key: &str) -> StorageResult<bool> {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let mut keyspace = self.write("delete_key")?;
        Ok(keyspace.data.remove(key).is_some())
    }

    /// Evicts every key whose TTL has passed.
    ///
    /// This is called by the background expiry sweeper. Index entries that no
    /// longer match the stored write (the key was overwritten or deleted since)
    /// are dropped without touching the keyspace.
    pub fn sweep_expired(&self) -> StorageResult<SweepReport> {
        let mut keyspace = self.write("sweep_expired")?;
        if keyspace.ttl.is_empty() {
            return Ok(SweepReport::default());
        }

        let now = Instant::now();
        let drained = keyspace.ttl.drain_expired(now);

        let mut evicted = 0;
        for entry in &drained {
            let current = keyspace.data.get(&entry.key).map(|stored| stored.version);
            if current == Some(entry.version) {
                keyspace.data.remove(&entry.key);
                evicted += 1;
            } else {
                trace!(key = %entry.key, "Skipping stale TTL entry");
            }
        }
        drop(keyspace);

        if evicted > 0 {
            self.expired_count
                .fetch_add(evicted as u64, Ordering::Relaxed);
        }

        Ok(SweepReport {
            drained: drained.len(),
            evicted,
        })
    }

    /// Returns the number of keys in the database.
    pub fn len(&self) -> usize {
        self.keyspace
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .data
            .len()
    }

    /// Returns true if the database is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns database statistics.
    pub fn stats(&self) -> StorageStats {
        let (keys, volatile_keys, ttl_entries) = {
            let keyspace = self
                .keyspace
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            let volatile = keyspace
                .data
                .values()
                .filter(|entry| entry.expires_at.is_some())
                .count();
            (keyspace.data.len(), volatile, keyspace.ttl.len())
        };

        StorageStats {
            keys,
            volatile_keys,
            ttl_entries,
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }

    /// Stores a string with an explicit expiration and indexes it, bypassing `Ttl`.
    #[cfg(test)]
    fn insert_with_deadline(&self, key: &str, value: &str, expires_at: Option<Instant>) {
        let mut keyspace = self.keyspace.write().unwrap();
        let version = keyspace.next_version();
        keyspace.ttl.push(TtlEntry {
            key: key.to_string(),
            expires_at,
            version,
        });
        keyspace.data.insert(
            key.to_string(),
            Entry {
                value: Value::String(value.to_string()),
                expires_at,
                version,
            },
        );
    }
}

/// Database statistics.
#[derive(Debug, Clone, Copy)]
pub struct StorageStats {
    /// Number of keys currently stored
    pub keys: usize,
    /// Keys that carry an expiration
    pub volatile_keys: usize,
    /// Number of entries waiting in the TTL index
    pub ttl_entries: usize,
    /// Total GET operations
    pub get_ops: u64,
    /// Total SET operations
    pub set_ops: u64,
    /// Total DEL operations
    pub del_ops: u64,
    /// Total expired keys cleaned up
    pub expired: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn dict(pairs: &[(&str, &str)]) -> Dict {
        pairs
            .iter()
            .map(|(f, v)| (f.to_string(), v.to_string()))
            .collect()
    }

    fn expires_at(engine: &StorageEngine, key: &str) -> Option<Instant> {
        engine.keyspace.read().unwrap().data[key].expires_at
    }

    #[test]
    fn test_set_and_get_string() {
        let engine = StorageEngine::new();

        engine.set_string("user:1", "alice", Ttl::Persist).unwrap();
        assert_eq!(engine.get_string("user:1").unwrap(), Some("alice".to_string()));
    }

    #[test]
    fn test_empty_string_round_trips() {
        let engine = StorageEngine::new();

        engine.set_string("key", "", Ttl::Persist).unwrap();
        assert_eq!(engine.get_string("key").unwrap(), Some(String::new()));
    }

    #[test]
    fn test_literal_null_is_a_value() {
        let engine = StorageEngine::new();

        engine.set_string("key", "null", Ttl::Persist).unwrap();
        assert_eq!(engine.get_string("key").unwrap(), Some("null".to_string()));
        assert_eq!(engine.get_string("other").unwrap(), None);
    }

    #[test]
    fn test_get_nonexistent() {
        let engine = StorageEngine::new();

        assert_eq!(engine.get_string("nonexistent").unwrap(), None);
        assert_eq!(engine.get_dict("nonexistent", &[]).unwrap(), None);
        assert_eq!(engine.get_dict("nonexistent", &["a"]).unwrap(), None);
    }

    #[test]
    fn test_string_overwrite_replaces() {
        let engine = StorageEngine::new();

        engine.set_string("key", "one", Ttl::Persist).unwrap();
        engine.set_string("key", "two", Ttl::Persist).unwrap();
        assert_eq!(engine.get_string("key").unwrap(), Some("two".to_string()));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_negative_ttl_deletes() {
        let engine = StorageEngine::new();

        engine.set_string("key", "value", Ttl::Persist).unwrap();
        engine.set_string("key", "ignored", Ttl::Delete).unwrap();
        assert_eq!(engine.get_string("key").unwrap(), None);

        // Deleting an absent key through a write is still a success
        engine.set_string("missing", "ignored", Ttl::Delete).unwrap();
        engine.set_dict("missing", Dict::new(), Ttl::Delete).unwrap();
        assert!(engine.is_empty());
    }

    #[test]
    fn test_delete_key() {
        let engine = StorageEngine::new();

        engine.set_string("key", "value", Ttl::Persist).unwrap();
        assert!(engine.delete_key("key").unwrap());
        assert_eq!(engine.get_string("key").unwrap(), None);
        assert!(!engine.delete_key("key").unwrap()); // Already deleted
    }

    #[test]
    fn test_positive_ttl_is_indexed() {
        let engine = StorageEngine::new();

        engine
            .set_string("session", "token", Ttl::Expire(Duration::from_secs(60)))
            .unwrap();

        assert!(expires_at(&engine, "session").is_some());
        assert_eq!(engine.stats().ttl_entries, 1);
    }

    #[test]
    fn test_repeated_ttl_writes_accumulate_entries() {
        let engine = StorageEngine::new();

        for _ in 0..3 {
            engine
                .set_string("key", "value", Ttl::Expire(Duration::from_secs(60)))
                .unwrap();
        }

        assert_eq!(engine.len(), 1);
        assert_eq!(engine.stats().ttl_entries, 3);
    }

    #[test]
    fn test_zero_ttl_clears_expiration() {
        let engine = StorageEngine::new();

        engine
            .set_string("key", "value", Ttl::Expire(Duration::from_secs(60)))
            .unwrap();
        engine.set_string("key", "value", Ttl::Persist).unwrap();

        assert_eq!(expires_at(&engine, "key"), None);
    }

    #[test]
    fn test_ttl_without_sweep_stays_readable() {
        let engine = StorageEngine::new();

        engine
            .set_string("key", "value", Ttl::Expire(Duration::from_millis(5)))
            .unwrap();
        thread::sleep(Duration::from_millis(30));

        // No lazy expiry: only the sweep removes keys
        assert_eq!(engine.get_string("key").unwrap(), Some("value".to_string()));
    }

    #[test]
    fn test_dict_merge_accumulates() {
        let engine = StorageEngine::new();

        engine.set_dict("k", dict(&[("a", "1")]), Ttl::Persist).unwrap();
        engine.set_dict("k", dict(&[("b", "2")]), Ttl::Persist).unwrap();
        engine.set_dict("k", dict(&[("a", "3")]), Ttl::Persist).unwrap();

        let all = engine.get_dict("k", &[]).unwrap().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["a"], Some("3".to_string()));
        assert_eq!(all["b"], Some("2".to_string()));
    }

    #[test]
    fn test_dict_field_query() {
        let engine = StorageEngine::new();

        engine
            .set_dict("user:1:meta", dict(&[("age", "30"), ("", "hidden")]), Ttl::Persist)
            .unwrap();

        let values = engine
            .get_dict("user:1:meta", &["age", "height", ""])
            .unwrap()
            .unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values["age"], Some("30".to_string()));
        assert_eq!(values["height"], None);
        // The empty field name always resolves to absent
        assert_eq!(values[""], None);
    }

    #[test]
    fn test_empty_dict_is_stored() {
        let engine = StorageEngine::new();

        engine.set_dict("k", Dict::new(), Ttl::Persist).unwrap();
        assert_eq!(engine.get_dict("k", &[]).unwrap(), Some(FieldValues::new()));
    }

    #[test]
    fn test_kind_replacement() {
        let engine = StorageEngine::new();

        engine.set_string("k", "text", Ttl::Persist).unwrap();
        assert_eq!(engine.get_dict("k", &[]).unwrap(), None);

        engine.set_dict("k", dict(&[("a", "1")]), Ttl::Persist).unwrap();
        assert_eq!(engine.get_string("k").unwrap(), None);
        assert_eq!(
            engine.get_dict("k", &["a"]).unwrap().unwrap()["a"],
            Some("1".to_string())
        );

        engine.set_string("k", "again", Ttl::Persist).unwrap();
        assert_eq!(engine.get_string("k").unwrap(), Some("again".to_string()));
        assert_eq!(engine.get_dict("k", &[]).unwrap(), None);
    }

    #[test]
    fn test_get_dict_returns_snapshot() {
        let engine = StorageEngine::new();

        engine.set_dict("k", dict(&[("a", "1")]), Ttl::Persist).unwrap();
        let mut snapshot = engine.get_dict("k", &[]).unwrap().unwrap();
        snapshot.insert("b".to_string(), Some("2".to_string()));

        engine.set_dict("k", dict(&[("a", "changed")]), Ttl::Persist).unwrap();

        assert_eq!(snapshot["a"], Some("1".to_string()));
        assert_eq!(engine.get_dict("k", &[]).unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_dict_ttl_semantics() {
        let engine = StorageEngine::new();

        engine
            .set_dict("k", dict(&[("a", "1")]), Ttl::Expire(Duration::from_secs(60)))
            .unwrap();
        assert!(expires_at(&engine, "k").is_some());

        engine.set_dict("k", dict(&[("b", "2")]), Ttl::Persist).unwrap();
        assert_eq!(expires_at(&engine, "k"), None);

        engine.set_dict("k", Dict::new(), Ttl::Delete).unwrap();
        assert_eq!(engine.get_dict("k", &[]).unwrap(), None);
    }

    #[test]
    fn test_sweep_removes_only_passed_entries() {
        let engine = StorageEngine::new();
        let now = Instant::now();

        engine.insert_with_deadline("past1", "v", Some(now - Duration::from_secs(2)));
        engine.insert_with_deadline("past2", "v", Some(now - Duration::from_secs(1)));
        engine.insert_with_deadline("future", "v", Some(now + Duration::from_secs(3600)));
        engine.insert_with_deadline("never", "v", None);

        let report = engine.sweep_expired().unwrap();
        assert_eq!(report, SweepReport { drained: 2, evicted: 2 });

        assert_eq!(engine.get_string("past1").unwrap(), None);
        assert_eq!(engine.get_string("past2").unwrap(), None);
        assert!(engine.get_string("future").unwrap().is_some());
        assert!(engine.get_string("never").unwrap().is_some());
        assert_eq!(engine.stats().ttl_entries, 2);

        // A second immediate sweep is a no-op
        assert_eq!(engine.sweep_expired().unwrap(), SweepReport::default());
        assert_eq!(engine.len(), 2);
        assert_eq!(engine.stats().ttl_entries, 2);
        assert_eq!(engine.stats().expired, 2);
    }

    #[test]
    fn test_sweep_tolerates_deleted_key() {
        let engine = StorageEngine::new();

        engine.insert_with_deadline("gone", "v", Some(Instant::now() - Duration::from_secs(1)));
        engine.delete_key("gone").unwrap();

        let report = engine.sweep_expired().unwrap();
        assert_eq!(report, SweepReport { drained: 1, evicted: 0 });
        assert_eq!(engine.stats().ttl_entries, 0);
    }

    #[test]
    fn test_sweep_skips_overwritten_key() {
        let engine = StorageEngine::new();

        engine.insert_with_deadline("key", "old", Some(Instant::now() - Duration::from_secs(1)));
        engine.set_string("key", "new", Ttl::Persist).unwrap();

        let report = engine.sweep_expired().unwrap();
        assert_eq!(report, SweepReport { drained: 1, evicted: 0 });
        assert_eq!(engine.get_string("key").unwrap(), Some("new".to_string()));
    }

    #[test]
    fn test_sweep_after_expiry() {
        let engine = StorageEngine::new();

        engine
            .set_string("key1", "value1", Ttl::Expire(Duration::from_millis(10)))
            .unwrap();
        engine
            .set_dict("key2", dict(&[("f", "v")]), Ttl::Expire(Duration::from_millis(10)))
            .unwrap();
        engine.set_string("key3", "value3", Ttl::Persist).unwrap(); // No expiry

        thread::sleep(Duration::from_millis(50));

        let report = engine.sweep_expired().unwrap();
        assert_eq!(report.evicted, 2);
        assert_eq!(engine.len(), 1);
        assert!(engine.get_string("key3").unwrap().is_some());
    }

    #[test]
    fn test_concurrent_writers_distinct_keys() {
        let engine = Arc::new(StorageEngine::new());
        let mut handles = vec![];

        for i in 0..10 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("key-{}-{}", i, j);
                    engine
                        .set_string(key.clone(), format!("value-{}-{}", i, j), Ttl::Persist)
                        .unwrap();
                    engine.get_string(&key).unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 1000);
        assert_eq!(
            engine.get_string("key-7-42").unwrap(),
            Some("value-7-42".to_string())
        );
    }

    #[test]
    fn test_concurrent_writers_same_key() {
        let engine = Arc::new(StorageEngine::new());
        let mut handles = vec![];

        for i in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    engine
                        .set_string("shared", format!("writer-{}", i), Ttl::Persist)
                        .unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let value = engine.get_string("shared").unwrap().unwrap();
        let written: Vec<_> = (0..8).map(|i| format!("writer-{}", i)).collect();
        assert!(written.contains(&value));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_concurrent_sweep_and_writes() {
        let engine = Arc::new(StorageEngine::new());

        let writer = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..500 {
                    engine
                        .set_string(format!("k{}", i), "v", Ttl::Expire(Duration::from_millis(1)))
                        .unwrap();
                }
            })
        };
        let sweeper = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..50 {
                    engine.sweep_expired().unwrap();
                }
            })
        };

        writer.join().unwrap();
        sweeper.join().unwrap();

        thread::sleep(Duration::from_millis(10));
        engine.sweep_expired().unwrap();

        assert!(engine.is_empty());
        assert_eq!(engine.stats().ttl_entries, 0);
    }

    #[test]
    fn test_poisoned_lock_is_a_storage_failure() {
        let engine = Arc::new(StorageEngine::new());

        let poisoner = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let _guard = engine.keyspace.write().unwrap();
                panic!("writer died mid-update");
            })
        };
        assert!(poisoner.join().is_err());

        assert_eq!(
            engine.get_string("key"),
            Err(StorageError::LockPoisoned("get_string"))
        );
        assert_eq!(
            engine.set_string("key", "v", Ttl::Persist),
            Err(StorageError::LockPoisoned("set_string"))
        );
        assert!(engine.sweep_expired().is_err());
    }

    #[test]
    fn test_stats() {
        let engine = StorageEngine::new();

        engine.set_string("a", "1", Ttl::Persist).unwrap();
        engine
            .set_dict("b", dict(&[("f", "v")]), Ttl::Expire(Duration::from_secs(60)))
            .unwrap();
        engine.get_string("a").unwrap();
        engine.delete_key("a").unwrap();

        let stats = engine.stats();
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.volatile_keys, 1);
        assert_eq!(stats.ttl_entries, 1);
        assert_eq!(stats.set_ops, 2);
        assert_eq!(stats.get_ops, 1);
        assert_eq!(stats.del_ops, 1);
        assert_eq!(stats.expired, 0);
    }
}
