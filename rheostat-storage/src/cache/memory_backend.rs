//! In-process cache backend.

use std::collections::HashMap;
use std::sync::RwLock;

use rheostat_core::{CacheError, CacheResult};

use super::key::CacheKey;
use super::traits::{CacheBackend, CacheStats, CachedEntry};

/// Cache backend holding entries in a process-local map.
///
/// Shared between store instances by wrapping it in an `Arc`.
#[derive(Debug, Default)]
pub struct InMemoryCacheBackend {
    entries: RwLock<HashMap<CacheKey, CachedEntry>>,
    stats: RwLock<CacheStats>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }

    fn remove(&self, key: &CacheKey) -> CacheResult<bool> {
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        let removed = entries.remove(key).is_some();
        let remaining = entries.len() as u64;
        drop(entries);
        self.record(|s| s.entry_count = remaining);
        Ok(removed)
    }
}

impl CacheBackend for InMemoryCacheBackend {
    fn get(&self, key: &CacheKey) -> CacheResult<Option<CachedEntry>> {
        let entries = self.entries.read().map_err(|_| CacheError::LockPoisoned)?;
        let found = entries.get(key).cloned();
        drop(entries);

        match found {
            Some(entry) => {
                self.record(|s| s.hits += 1);
                Ok(Some(entry))
            }
            None => {
                self.record(|s| s.misses += 1);
                Ok(None)
            }
        }
    }

    fn put(&self, key: &CacheKey, entry: &CachedEntry) -> CacheResult<()> {
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        entries.insert(key.clone(), entry.clone());
        let count = entries.len() as u64;
        drop(entries);
        self.record(|s| s.entry_count = count);
        Ok(())
    }

    fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        self.remove(key)
    }

    fn evict(&self, key: &CacheKey) -> CacheResult<bool> {
        let removed = self.remove(key)?;
        if removed {
            self.record(|s| s.evictions += 1);
        }
        Ok(removed)
    }

    fn clear(&self) -> CacheResult<u64> {
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        let removed = entries.len() as u64;
        entries.clear();
        drop(entries);
        self.record(|s| s.entry_count = 0);
        Ok(removed)
    }

    fn stats(&self) -> CacheResult<CacheStats> {
        self.stats
            .read()
            .map(|s| s.clone())
            .map_err(|_| CacheError::LockPoisoned)
    }
}
