//! TTL-keyed in-memory context cache.
//!
//! One [`ContextCache`] is constructed per process and shared by handle
//! (`Arc`) between the query engine, the change applier, and any direct
//! caller. Every read-modify-write happens under the single internal lock;
//! nothing holds that lock across an await point.
//!
//! Expiry is lazy: an entry older than its TTL is evicted by the lookup that
//! finds it. A hit does not extend an entry's lifetime.

use std::collections::HashMap;
use std::time::Duration;

use ctxsync_core::{ContextType, Fields, SharedClock};
use ctxsync_settings::TtlSettings;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

/// Payload field stamped by merges with the time of synchronization.
pub const LAST_SYNC_FIELD: &str = "last_sync";

/// A cached value.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedContext {
    /// Cache key.
    pub key: String,
    /// Stored payload.
    pub payload: Fields,
    /// When the payload was written, Unix seconds.
    pub fetched_at: f64,
    /// Lifetime from `fetched_at`.
    pub ttl: Duration,
    /// Entity keys the payload was derived from.
    pub dependencies: Vec<String>,
}

impl CachedContext {
    /// Whether the entry is still within its TTL at `now`.
    pub fn is_fresh(&self, now: f64) -> bool {
        now - self.fetched_at <= self.ttl.as_secs_f64()
    }

    /// Absolute expiry time.
    pub fn expires_at(&self) -> f64 {
        self.fetched_at + self.ttl.as_secs_f64()
    }
}

/// One operation of an atomic batch.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheOp {
    /// Shallow-merge `fields` into the current value (empty if absent or
    /// expired), stamp [`LAST_SYNC_FIELD`], and write back with `ttl`.
    Merge {
        /// Entity key.
        key: String,
        /// Fields to merge.
        fields: Fields,
        /// TTL of the written entry.
        ttl: Duration,
        /// Value of the `last_sync` stamp.
        synced_at: f64,
    },
    /// Remove one entry.
    Delete {
        /// Entity key.
        key: String,
    },
    /// Remove every entry matching a pattern.
    Invalidate {
        /// Prefix (`foo*`), suffix (`*foo`), or substring pattern.
        pattern: String,
    },
    /// Remove every entry derived from an entity.
    InvalidateDependents {
        /// Entity key, e.g. `branch:B1`.
        entity_key: String,
    },
}

/// What a committed batch did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Entries written by merges.
    pub merged: usize,
    /// Entries removed by deletes.
    pub deleted: usize,
    /// Entries removed by invalidations.
    pub invalidated: usize,
}

/// Cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups that returned a fresh entry.
    pub hits: u64,
    /// Lookups that found nothing fresh.
    pub misses: u64,
    /// Entries evicted because their TTL had passed.
    pub expirations: u64,
    /// Entries removed by pattern invalidation.
    pub invalidations: u64,
    /// Entries currently stored (fresh or not yet evicted).
    pub size: usize,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, CachedContext>,
    stats: CacheStats,
}

impl Inner {
    /// Fresh entry for `key`, evicting it if expired.
    fn lookup(&mut self, key: &str, now: f64) -> Option<&CachedContext> {
        let expired = self.entries.get(key).is_some_and(|e| !e.is_fresh(now));
        if expired {
            let _ = self.entries.remove(key);
            self.stats.expirations += 1;
            trace!(key, "cache entry expired");
        }
        self.entries.get(key)
    }

    fn invalidate(&mut self, pattern: Option<&str>) -> usize {
        let removed = match pattern {
            None => {
                let n = self.entries.len();
                self.entries.clear();
                n
            }
            Some(pattern) => {
                let before = self.entries.len();
                self.entries.retain(|key, _| !matches_pattern(key, pattern));
                before - self.entries.len()
            }
        };
        self.stats.invalidations += removed as u64;
        removed
    }

    fn invalidate_dependents(&mut self, entity_key: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.dependencies.iter().any(|d| d == entity_key));
        let removed = before - self.entries.len();
        self.stats.invalidations += removed as u64;
        removed
    }
}

/// Whether `key` matches an invalidation pattern.
///
/// `foo*` is a prefix match, `*foo` a suffix match, `*foo*` and bare `foo`
/// are substring matches.
pub fn matches_pattern(key: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match (pattern.starts_with('*'), pattern.ends_with('*')) {
        (true, true) => key.contains(&pattern[1..pattern.len() - 1]),
        (false, true) => key.starts_with(&pattern[..pattern.len() - 1]),
        (true, false) => key.ends_with(&pattern[1..]),
        (false, false) => key.contains(pattern),
    }
}

/// Shared TTL cache.
pub struct ContextCache {
    inner: Mutex<Inner>,
    clock: SharedClock,
    ttls: TtlSettings,
}

impl std::fmt::Debug for ContextCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextCache")
            .field("size", &self.inner.lock().entries.len())
            .finish_non_exhaustive()
    }
}

impl ContextCache {
    /// Create an empty cache reading time from `clock`.
    pub fn new(clock: SharedClock, ttls: TtlSettings) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
            ttls,
        }
    }

    /// Configured TTL for a context type.
    pub fn ttl_for(&self, context_type: ContextType) -> Duration {
        self.ttls.ttl_for(context_type)
    }

    /// Current time from the cache's clock.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Fresh payload for `key`; expired entries are evicted.
    pub fn get(&self, key: &str) -> Option<Fields> {
        self.get_entry(key).map(|e| e.payload)
    }

    /// Fresh entry for `key`, with its metadata.
    pub fn get_entry(&self, key: &str) -> Option<CachedContext> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let found = inner.lookup(key, now).cloned();
        if found.is_some() {
            inner.stats.hits += 1;
            trace!(key, "cache hit");
        } else {
            inner.stats.misses += 1;
            trace!(key, "cache miss");
        }
        found
    }

    /// Fresh payload for `key` without touching counters or evicting.
    pub fn peek(&self, key: &str) -> Option<Fields> {
        let now = self.clock.now();
        self.inner
            .lock()
            .entries
            .get(key)
            .filter(|e| e.is_fresh(now))
            .map(|e| e.payload.clone())
    }

    /// Store `payload` under `key` for `ttl`, replacing any previous value.
    pub fn set(&self, key: impl Into<String>, payload: Fields, ttl: Duration) {
        self.set_derived(key, payload, ttl, Vec::new());
    }

    /// Store a payload derived from the entities in `dependencies`.
    ///
    /// A later change to any of those entities removes the entry.
    pub fn set_derived(
        &self,
        key: impl Into<String>,
        payload: Fields,
        ttl: Duration,
        dependencies: Vec<String>,
    ) {
        let key = key.into();
        let entry = CachedContext {
            key: key.clone(),
            payload,
            fetched_at: self.clock.now(),
            ttl,
            dependencies,
        };
        let _ = self.inner.lock().entries.insert(key, entry);
    }

    /// Remove `key`. Returns whether an entry existed.
    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().entries.remove(key).is_some()
    }

    /// Remove entries matching `pattern`, or everything for `None`.
    /// Returns the number removed.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        let removed = self.inner.lock().invalidate(pattern);
        debug!(pattern = pattern.unwrap_or("*"), removed, "cache invalidated");
        removed
    }

    /// Apply `ops` in order under one lock acquisition.
    ///
    /// Readers observe either none or all of the batch.
    pub fn apply_batch(&self, ops: Vec<CacheOp>) -> BatchSummary {
        let now = self.clock.now();
        let mut summary = BatchSummary::default();
        let mut inner = self.inner.lock();
        for op in ops {
            match op {
                CacheOp::Merge {
                    key,
                    fields,
                    ttl,
                    synced_at,
                } => {
                    let mut payload = inner
                        .lookup(&key, now)
                        .map(|e| e.payload.clone())
                        .unwrap_or_default();
                    payload.extend(fields);
                    let _ = payload.insert(LAST_SYNC_FIELD.to_string(), Value::from(synced_at));
                    let entry = CachedContext {
                        key: key.clone(),
                        payload,
                        fetched_at: now,
                        ttl,
                        dependencies: Vec::new(),
                    };
                    let _ = inner.entries.insert(key, entry);
                    summary.merged += 1;
                }
                CacheOp::Delete { key } => {
                    if inner.entries.remove(&key).is_some() {
                        summary.deleted += 1;
                    }
                }
                CacheOp::Invalidate { pattern } => {
                    summary.invalidated += inner.invalidate(Some(&pattern));
                }
                CacheOp::InvalidateDependents { entity_key } => {
                    summary.invalidated += inner.invalidate_dependents(&entity_key);
                }
            }
        }
        summary
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            size: inner.entries.len(),
            ..inner.stats
        }
    }

    /// Entries currently stored.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted keys currently stored, including not-yet-evicted stale ones.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}
