//! Cache backend trait and the cached entry format.
//!
//! This module defines the trait that must be implemented by cache backends
//! and the value they store.

use chrono::{DateTime, Utc};
use rheostat_core::{CacheDependency, CacheResult, RawRows};
use serde::{Deserialize, Serialize};

use super::key::CacheKey;

/// A cached row set together with its invalidation dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntry {
    /// Rows of the owner's category, indexed by name.
    pub rows: RawRows,
    /// Write watermark of the category when the rows were read.
    pub dependency: CacheDependency,
    /// When the entry was written. Backends persist it out of band.
    #[serde(skip)]
    pub cached_at: DateTime<Utc>,
}

impl CachedEntry {
    pub fn new(rows: RawRows, dependency: CacheDependency) -> Self {
        Self {
            rows,
            dependency,
            cached_at: Utc::now(),
        }
    }

    /// Same entry stamped with an explicit write time.
    pub fn with_cached_at(mut self, cached_at: DateTime<Utc>) -> Self {
        self.cached_at = cached_at;
        self
    }
}

/// Storage of [`CachedEntry`] values by [`CacheKey`].
///
/// Implemented in memory and on LMDB. Every store instance of the process
/// may call a backend concurrently.
///
/// Backends know nothing about staleness: they store and return entries
/// verbatim. Dependency checks live in [`super::DependencyCache`].
pub trait CacheBackend: Send + Sync {
    /// Entry stored under `key`, if any.
    fn get(&self, key: &CacheKey) -> CacheResult<Option<CachedEntry>>;

    /// Put an entry into the cache, replacing any previous one.
    fn put(&self, key: &CacheKey, entry: &CachedEntry) -> CacheResult<()>;

    /// Delete an entry. Returns whether an entry was removed.
    fn delete(&self, key: &CacheKey) -> CacheResult<bool>;

    /// Delete an entry because it went stale. Counted as an eviction.
    fn evict(&self, key: &CacheKey) -> CacheResult<bool>;

    /// Drop every entry. Returns the number of entries removed.
    fn clear(&self) -> CacheResult<u64>;

    /// Counters since the backend was opened.
    fn stats(&self) -> CacheResult<CacheStats>;
}

/// Backend counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of backend hits, stale entries included.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries currently stored.
    pub entry_count: u64,
    /// Approximate stored size in bytes.
    pub memory_bytes: u64,
    /// Number of entries dropped because their dependency went stale.
    pub evictions: u64,
}

impl CacheStats {
    /// Share of lookups that found an entry, between 0 and 1.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Hits that were served without eviction.
    pub fn fresh_hits(&self) -> u64 {
        self.hits.saturating_sub(self.evictions)
    }
}
