//! Time-bucketed response cache.
//!
//! Each logical resource (type + query parameters) maps to its last
//! successful payload. The key embeds `floor(now / ttl)`, so entries are
//! never invalidated in place; the bucket advancing simply makes the old
//! key unaddressable. `get` still rechecks the stored timestamp against the
//! TTL in case bucket size and TTL ever diverge.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::debug;

/// Logical resource type, which selects the TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Stocks,
    Chart,
    News,
    Health,
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheKind::Stocks => "stocks",
            CacheKind::Chart => "chart",
            CacheKind::News => "news",
            CacheKind::Health => "health",
        };
        f.write_str(name)
    }
}

/// A stored payload with its insertion timestamp.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub body: String,
    pub stored_at: Instant,
}

/// Backing store for cached responses.
///
/// The cache goes through this seam instead of a bare global map so a
/// scaled deployment can swap in an external store without touching the
/// fetch path.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<StoredEntry>;
    fn put(&self, key: String, entry: StoredEntry);
    fn len(&self) -> usize;
}

/// In-memory store bounded by entry count, evicting in insertion order.
pub struct InMemoryStore {
    max_entries: usize,
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    entries: HashMap<String, StoredEntry>,
    /// Insertion order for eviction (approximate LRU).
    order: Vec<String>,
}

impl InMemoryStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            inner: Mutex::new(StoreInner {
                entries: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }
}

impl CacheStore for InMemoryStore {
    fn get(&self, key: &str) -> Option<StoredEntry> {
        let inner = self.inner.lock().expect("cache store poisoned");
        inner.entries.get(key).cloned()
    }

    fn put(&self, key: String, entry: StoredEntry) {
        let mut inner = self.inner.lock().expect("cache store poisoned");
        if inner.entries.insert(key.clone(), entry).is_none() {
            inner.order.push(key);
        }
        while inner.entries.len() > self.max_entries {
            let oldest = inner.order.remove(0);
            inner.entries.remove(&oldest);
            debug!("cache full, evicted oldest entry {}", oldest);
        }
    }

    fn len(&self) -> usize {
        let inner = self.inner.lock().expect("cache store poisoned");
        inner.entries.len()
    }
}

/// TTL provider for a resource type.
pub type TtlFn = dyn Fn(CacheKind) -> Duration + Send + Sync;

/// Response cache with per-type TTLs over an injected store.
pub struct ResponseCache {
    store: Box<dyn CacheStore>,
    ttl_for: Box<TtlFn>,
}

impl ResponseCache {
    pub fn new(store: Box<dyn CacheStore>, ttl_for: Box<TtlFn>) -> Self {
        Self { store, ttl_for }
    }

    /// Compute the time-bucketed key for a resource.
    fn key(&self, kind: CacheKind, params: &str) -> String {
        let ttl = (self.ttl_for)(kind);
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let bucket = now_ms / ttl.as_millis().max(1);
        format!("{}:{}:{}", kind, params, bucket)
    }

    /// Look up the payload for the current window.
    pub fn get(&self, kind: CacheKind, params: &str) -> Option<String> {
        let key = self.key(kind, params);
        let ttl = (self.ttl_for)(kind);
        match self.store.get(&key) {
            Some(entry) if entry.stored_at.elapsed() <= ttl => {
                debug!("cache hit for {}", key);
                Some(entry.body)
            }
            Some(_) => None,
            None => None,
        }
    }

    /// Store a payload under the current window's key.
    pub fn put(&self, kind: CacheKind, body: String, params: &str) {
        let key = self.key(kind, params);
        self.store.put(
            key,
            StoredEntry {
                body,
                stored_at: Instant::now(),
            },
        );
    }

    /// Number of entries currently stored.
    pub fn entry_count(&self) -> usize {
        self.store.len()
    }
}
