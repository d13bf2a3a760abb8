//! Dependency-checked shared cache.
//!
//! Every cached row set carries the write watermark of its category at the
//! time the rows were read. A read compares that watermark with the current
//! one from the [`ChangeJournal`]; any write in between makes the entry
//! stale, and a stale entry is evicted and reported as a miss.

use std::sync::Arc;

use rheostat_core::{CacheDependency, CacheError, CacheResult, RawRows};

use super::key::CacheKey;
use super::traits::{CacheBackend, CacheStats, CachedEntry};
use super::watermark::ChangeJournal;

/// Shared cache of raw row sets, keyed by owner cache key.
pub trait CacheClient: Send + Sync {
    /// Get the rows cached under `key`.
    ///
    /// Must return `None` when the entry's dependency no longer holds.
    fn get(&self, key: &str) -> CacheResult<Option<RawRows>>;

    /// Cache `rows` under `key` until `dependency` stops holding.
    fn set(&self, key: &str, rows: &RawRows, dependency: CacheDependency) -> CacheResult<()>;

    /// Drop whatever is cached under `key`.
    fn invalidate(&self, key: &str) -> CacheResult<()>;
}

/// [`CacheClient`] over any backend, validated against a change journal.
///
/// # Type Parameters
///
/// - `B`: The cache backend storing the entries
/// - `J`: The change journal for invalidation (usually the repository)
///
/// # Example
///
/// ```ignore
/// let repo = Arc::new(SqliteRepository::open(SqliteConfig::new(path))?);
/// let cache = DependencyCache::new(Arc::new(InMemoryCacheBackend::new()), repo.clone());
///
/// cache.set("engine_params:users", &rows, CacheDependency::new("users", mark))?;
/// // Any write to category "users" through `repo` makes this a miss
/// let rows = cache.get("engine_params:users")?;
/// ```
pub struct DependencyCache<B, J>
where
    B: CacheBackend,
    J: ChangeJournal + ?Sized,
{
    /// The cache backend.
    backend: Arc<B>,
    /// The change journal for invalidation.
    journal: Arc<J>,
}

impl<B, J> DependencyCache<B, J>
where
    B: CacheBackend,
    J: ChangeJournal + ?Sized,
{
    /// Create a new dependency cache.
    pub fn new(backend: Arc<B>, journal: Arc<J>) -> Self {
        Self { backend, journal }
    }

    /// Get a reference to the cache backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Get a reference to the change journal.
    pub fn journal(&self) -> &J {
        &self.journal
    }

    /// Get backend statistics.
    pub fn stats(&self) -> CacheResult<CacheStats> {
        self.backend.stats()
    }

    /// Get the full cached entry, checking its dependency.
    pub fn get_entry(&self, key: &str) -> CacheResult<Option<CachedEntry>> {
        let key = CacheKey::new(key)?;
        let Some(entry) = self.backend.get(&key)? else {
            return Ok(None);
        };

        let current = self
            .journal
            .current_watermark(&entry.dependency.category)
            .map_err(|e| CacheError::Backend {
                reason: format!("watermark lookup failed: {e}"),
            })?;

        if entry.dependency.is_satisfied_by(&current) {
            return Ok(Some(entry));
        }

        tracing::debug!(
            key = %key,
            category = %entry.dependency.category,
            cached = entry.dependency.watermark.sequence,
            current = current.sequence,
            "Evicting stale cache entry"
        );
        self.backend.evict(&key)?;
        Ok(None)
    }
}

impl<B, J> CacheClient for DependencyCache<B, J>
where
    B: CacheBackend,
    J: ChangeJournal + ?Sized,
{
    fn get(&self, key: &str) -> CacheResult<Option<RawRows>> {
        Ok(self.get_entry(key)?.map(|entry| entry.rows))
    }

    fn set(&self, key: &str, rows: &RawRows, dependency: CacheDependency) -> CacheResult<()> {
        let key = CacheKey::new(key)?;
        let entry = CachedEntry::new(rows.clone(), dependency);
        self.backend.put(&key, &entry)
    }

    fn invalidate(&self, key: &str) -> CacheResult<()> {
        let key = CacheKey::new(key)?;
        self.backend.delete(&key)?;
        Ok(())
    }
}
