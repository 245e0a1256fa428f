//! Object cache layered over a byte-oriented key/value store.
//!
//! Records are cached as JSON. An empty payload is a negative marker: the
//! key was looked up and confirmed absent from the store.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use moka::Expiry;
use moka::sync::Cache;
use serde::Serialize;
use serde::de::DeserializeOwned;

const OBJECT_SUFFIX: &str = ".(obj)";

/// Byte store consumed by the object cache.
pub trait CacheStore: Send + Sync {
    /// Returns the stored payload, or `None` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `value` under `key`. A zero `ttl` keeps the entry until it is
    /// evicted or deleted.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    fn delete(&self, key: &str) -> Result<()>;
}

/// Store that keeps nothing. Every read is a miss.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl CacheStore for NullStore {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<()> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
struct Entry {
    payload: Arc<[u8]>,
    ttl: Duration,
}

struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(
        &self, _key: &String, value: &Entry, _created_at: Instant,
    ) -> Option<Duration> {
        (!value.ttl.is_zero()).then_some(value.ttl)
    }

    fn expire_after_update(
        &self, _key: &String, value: &Entry, _updated_at: Instant, _remaining: Option<Duration>,
    ) -> Option<Duration> {
        (!value.ttl.is_zero()).then_some(value.ttl)
    }
}

/// In-process store with per-entry expiry.
#[derive(Clone)]
pub struct MemoryStore {
    cache: Cache<String, Entry>,
}

impl MemoryStore {
    /// Creates a store holding at most `max_capacity` entries.
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        tracing::debug!(max_capacity, "initializing in-memory cache store");
        Self {
            cache: Cache::builder().max_capacity(max_capacity).expire_after(EntryTtl).build(),
        }
    }

    /// Number of live entries. Pending evictions may be counted until the
    /// store runs its maintenance.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.cache.get(key).map(|entry| entry.payload.to_vec()))
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.cache.insert(
            key.to_string(),
            Entry {
                payload: value.into(),
                ttl,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key);
        Ok(())
    }
}

/// Outcome of an object-cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cached<T> {
    /// A cached object.
    Hit(T),
    /// The negative marker: the object is known to be absent.
    Empty,
    /// Nothing usable is cached.
    Miss,
}

/// Typed view over a [`CacheStore`].
///
/// Read failures are reported as misses and write failures are dropped;
/// both are logged at `warn`.
#[derive(Clone)]
pub struct ObjectCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ObjectCache {
    /// Wraps `store`, writing every entry with `ttl`.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Reads the object stored under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Cached<T> {
        let payload = match self.store.get(&object_key(key)) {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                tracing::debug!(key, "object cache miss");
                return Cached::Miss;
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "object cache read failed");
                return Cached::Miss;
            }
        };

        if payload.is_empty() {
            tracing::debug!(key, "object cache hit on empty marker");
            return Cached::Empty;
        }

        match serde_json::from_slice(&payload) {
            Ok(object) => {
                tracing::debug!(key, "object cache hit");
                Cached::Hit(object)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "cached object could not be decoded");
                Cached::Miss
            }
        }
    }

    /// Stores `value` under `key`.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        match serde_json::to_vec(value) {
            Ok(payload) => self.write(key, payload),
            Err(e) => tracing::warn!(key, error = %e, "object could not be encoded for caching"),
        }
    }

    /// Stores the negative marker under `key`.
    pub fn set_empty(&self, key: &str) {
        self.write(key, Vec::new());
    }

    fn write(&self, key: &str, payload: Vec<u8>) {
        if let Err(e) = self.store.set(&object_key(key), payload, self.ttl) {
            tracing::warn!(key, error = %e, "object cache write failed");
        }
    }

    /// Removes the object stored under `key`.
    pub fn delete(&self, key: &str) {
        tracing::debug!(key, "object cache delete");
        if let Err(e) = self.store.delete(&object_key(key)) {
            tracing::warn!(key, error = %e, "object cache delete failed");
        }
    }
}

impl fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCache").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

fn object_key(key: &str) -> String {
    format!("{key}{OBJECT_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Item {
        id: i64,
        name: String,
    }

    fn cache(store: Arc<dyn CacheStore>) -> ObjectCache {
        ObjectCache::new(store, Duration::from_secs(60))
    }

    #[test]
    fn object_round_trip() {
        let store = Arc::new(MemoryStore::default());
        let cache = cache(Arc::clone(&store) as Arc<dyn CacheStore>);
        let item = Item {
            id: 1,
            name: "first".to_string(),
        };

        assert_eq!(cache.get::<Item>("item<1>"), Cached::Miss);
        cache.set("item<1>", &item);
        assert_eq!(cache.get::<Item>("item<1>"), Cached::Hit(item));
        assert!(store.get("item<1>.(obj)").expect("get").is_some());

        cache.delete("item<1>");
        assert_eq!(cache.get::<Item>("item<1>"), Cached::Miss);
    }

    #[test]
    fn empty_marker() {
        let cache = cache(Arc::new(MemoryStore::default()));
        cache.set_empty("missing");
        assert_eq!(cache.get::<Item>("missing"), Cached::Empty);
    }

    #[test]
    fn null_store_keeps_nothing() {
        let cache = cache(Arc::new(NullStore));
        cache.set("k", &1);
        cache.set_empty("e");
        assert_eq!(cache.get::<i32>("k"), Cached::Miss);
        assert_eq!(cache.get::<i32>("e"), Cached::Miss);
    }

    #[test]
    fn undecodable_payload_is_a_miss() {
        let store = Arc::new(MemoryStore::default());
        store.set("k.(obj)", b"not json".to_vec(), Duration::ZERO).expect("set");
        let cache = cache(store);
        assert_eq!(cache.get::<Item>("k"), Cached::Miss);
    }

    struct FailingStore;

    impl CacheStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(anyhow!("connection refused"))
        }

        fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<()> {
            Err(anyhow!("connection refused"))
        }

        fn delete(&self, _key: &str) -> Result<()> {
            Err(anyhow!("connection refused"))
        }
    }

    #[test]
    fn store_failures_degrade_to_misses() {
        let cache = cache(Arc::new(FailingStore));
        cache.set("k", &1);
        cache.delete("k");
        assert_eq!(cache.get::<i32>("k"), Cached::Miss);
    }

    #[test]
    fn entries_expire() {
        let store = MemoryStore::default();
        store.set("short", b"x".to_vec(), Duration::from_millis(20)).expect("set");
        store.set("forever", b"y".to_vec(), Duration::ZERO).expect("set");

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(store.get("short").expect("get"), None);
        assert_eq!(store.get("forever").expect("get"), Some(b"y".to_vec()));
    }
}
