//! Result cache with per-entry TTL and LRU eviction
//!
//! Query results are keyed by a normalized operation signature. Expired
//! entries are purged lazily on access; when the cache is full the least
//! recently used entry is evicted. A single mutex serializes every access,
//! including reads, since a hit reorders the LRU list.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Longest lifetime an entry can be given
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Normalized operation signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Start a key for the named operation
    pub fn new(operation: &str) -> Self {
        Self(operation.to_string())
    }

    /// Append a plain parameter
    pub fn with(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.0.push_str(&format!("|{}={}", name, value));
        self
    }

    /// Append a float at fixed precision so 0.1 and 0.10000000001 collide
    pub fn with_f64(self, name: &str, value: f64) -> Self {
        self.with(name, format!("{:.6}", value))
    }

    /// Append a list parameter; order does not matter
    pub fn with_list<T: fmt::Display>(self, name: &str, values: &[T]) -> Self {
        let mut rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
        rendered.sort();
        rendered.dedup();
        self.with(name, rendered.join(","))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub entries: usize,
    pub hit_ratio: f64,
}

impl CacheStats {
    /// Sum of two sets of counters
    pub fn merged(self, other: CacheStats) -> CacheStats {
        let hits = self.hits + other.hits;
        let misses = self.misses + other.misses;
        CacheStats {
            hits,
            misses,
            evictions: self.evictions + other.evictions,
            expirations: self.expirations + other.expirations,
            entries: self.entries + other.entries,
            hit_ratio: hit_ratio(hits, misses),
        }
    }
}

fn hit_ratio(hits: u64, misses: u64) -> f64 {
    let lookups = hits + misses;
    if lookups == 0 {
        0.0
    } else {
        hits as f64 / lookups as f64
    }
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct Inner<V> {
    entries: LruCache<CacheKey, Entry<V>>,
    stats: CacheStats,
}

/// Outcome of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    Fresh(V),
    /// Entry had expired and was purged
    Expired(V),
    Missing,
}

impl<V> Lookup<V> {
    /// Value of an expired entry, if any
    pub fn into_stale(self) -> Option<V> {
        match self {
            Self::Expired(value) => Some(value),
            Self::Fresh(_) | Self::Missing => None,
        }
    }
}

/// Bounded TTL + LRU cache
pub struct ResultCache<V> {
    inner: Mutex<Inner<V>>,
    default_ttl: Duration,
}

impl<V: Clone> ResultCache<V> {
    /// Create a cache holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
            default_ttl,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh value for `key`, marking it most recently used
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        match self.lookup(key) {
            Lookup::Fresh(value) => Some(value),
            Lookup::Expired(_) | Lookup::Missing => None,
        }
    }

    /// Like [`get`](Self::get), but hands back the value of a purged entry
    /// so the caller can still fall back to it
    pub fn lookup(&self, key: &CacheKey) -> Lookup<V> {
        let mut inner = self.lock();
        let now = Instant::now();

        let found = inner
            .entries
            .get(key)
            .map(|entry| (entry.expires_at > now, entry.value.clone()));

        match found {
            Some((true, value)) => {
                inner.stats.hits += 1;
                Lookup::Fresh(value)
            }
            Some((false, value)) => {
                inner.entries.pop(key);
                inner.stats.expirations += 1;
                inner.stats.misses += 1;
                Lookup::Expired(value)
            }
            None => {
                inner.stats.misses += 1;
                Lookup::Missing
            }
        }
    }

    /// Insert with the default TTL
    pub fn put(&self, key: CacheKey, value: V) {
        self.put_with_ttl(key, value, self.default_ttl);
    }

    /// Insert or refresh at the most recently used end
    ///
    /// TTLs longer than [`MAX_TTL`] are clamped to it.
    pub fn put_with_ttl(&self, key: CacheKey, value: V, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now);
        let mut inner = self.lock();
        let entry = Entry { value, expires_at };
        if let Some((evicted, _)) = inner.entries.push(key.clone(), entry) {
            if evicted != key {
                inner.stats.evictions += 1;
            }
        }
    }

    /// Resident value regardless of expiry; does not touch LRU order or stats
    pub fn peek_stale(&self, key: &CacheKey) -> Option<V> {
        self.lock().entries.peek(key).map(|entry| entry.value.clone())
    }

    /// Whether `key` is resident (fresh or not)
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().entries.contains(key)
    }

    /// Drop every entry
    pub fn invalidate_all(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let mut stats = inner.stats;
        stats.entries = inner.entries.len();
        stats.hit_ratio = hit_ratio(stats.hits, stats.misses);
        stats
    }
}
