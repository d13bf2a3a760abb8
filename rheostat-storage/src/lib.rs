//! Rheostat Storage - Repository Trait and Implementations
//!
//! Defines the storage abstraction for active param rows and the shared cache
//! layer that sits in front of it. The SQLite implementation lives in
//! [`sqlite`].

pub mod cache;
pub mod sqlite;

pub use cache::{
    CacheBackend, CacheClient, CacheKey, CacheStats, CachedEntry, ChangeJournal, DependencyCache,
    InMemoryCacheBackend, LmdbCacheBackend, LmdbCacheError,
};
pub use sqlite::{SqliteConfig, SqliteRepository};

use rheostat_core::{RawRow, StorageError, StorageResult, Watermark};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

// ============================================================================
// REPOSITORY TRAIT
// ============================================================================

/// Storage of active param rows.
///
/// Rows are keyed by `(name, category)`; the category is the owner identity.
/// Every successful insert, update or delete advances the category's
/// [`Watermark`], which is what the cache layer uses for invalidation.
pub trait ParamRepository: ChangeJournal + Send + Sync {
    /// All rows of a category, ordered by name ascending.
    fn find_by_category(&self, category: &str) -> StorageResult<Vec<RawRow>>;

    /// Insert a new row. Fails with `InsertFailed` if `(name, category)` exists.
    fn insert(&self, row: &RawRow) -> StorageResult<()>;

    /// Update the value and `updated_at` of an existing row.
    ///
    /// Fails with `UpdateFailed` if no row matches `(name, category)`.
    fn update(&self, row: &RawRow) -> StorageResult<()>;

    /// Remove every row of a category. Returns the number of rows removed.
    fn delete_by_category(&self, category: &str) -> StorageResult<u64>;
}

// ============================================================================
// IN-MEMORY REPOSITORY
// ============================================================================

#[derive(Debug, Default)]
struct CategoryRows {
    rows: BTreeMap<String, RawRow>,
    watermark: Watermark,
}

impl CategoryRows {
    fn bump(&mut self) {
        self.watermark = self.watermark.next();
    }
}

/// In-memory repository for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    categories: RwLock<HashMap<String, CategoryRows>>,
}

impl InMemoryRepository {
    /// Create a new, empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a single row.
    pub fn row(&self, name: &str, category: &str) -> StorageResult<Option<RawRow>> {
        let categories = self.categories.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(categories
            .get(category)
            .and_then(|c| c.rows.get(name))
            .cloned())
    }

    /// Number of rows across all categories.
    pub fn len(&self) -> StorageResult<usize> {
        let categories = self.categories.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(categories.values().map(|c| c.rows.len()).sum())
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Drop all rows. Watermarks keep advancing so cached entries go stale.
    pub fn clear(&self) -> StorageResult<()> {
        let mut categories = self.categories.write().map_err(|_| StorageError::LockPoisoned)?;
        for category in categories.values_mut() {
            if !category.rows.is_empty() {
                category.rows.clear();
                category.bump();
            }
        }
        Ok(())
    }
}

impl ChangeJournal for InMemoryRepository {
    fn current_watermark(&self, category: &str) -> StorageResult<Watermark> {
        let categories = self.categories.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(categories
            .get(category)
            .map(|c| c.watermark)
            .unwrap_or_default())
    }
}

impl ParamRepository for InMemoryRepository {
    fn find_by_category(&self, category: &str) -> StorageResult<Vec<RawRow>> {
        let categories = self.categories.read().map_err(|_| StorageError::LockPoisoned)?;
        // BTreeMap iteration is already ordered by name
        Ok(categories
            .get(category)
            .map(|c| c.rows.values().cloned().collect())
            .unwrap_or_default())
    }

    fn insert(&self, row: &RawRow) -> StorageResult<()> {
        let mut categories = self.categories.write().map_err(|_| StorageError::LockPoisoned)?;
        let category = categories.entry(row.category.clone()).or_default();
        if category.rows.contains_key(&row.name) {
            return Err(StorageError::InsertFailed {
                name: row.name.clone(),
                category: row.category.clone(),
                reason: "already exists".to_string(),
            });
        }
        category.rows.insert(row.name.clone(), row.clone());
        category.bump();
        Ok(())
    }

    fn update(&self, row: &RawRow) -> StorageResult<()> {
        let mut categories = self.categories.write().map_err(|_| StorageError::LockPoisoned)?;
        let category = categories
            .get_mut(&row.category)
            .filter(|c| c.rows.contains_key(&row.name))
            .ok_or_else(|| StorageError::UpdateFailed {
                name: row.name.clone(),
                category: row.category.clone(),
                reason: "no matching row".to_string(),
            })?;

        if let Some(stored) = category.rows.get_mut(&row.name) {
            stored.value = row.value.clone();
            stored.updated_at = row.updated_at;
        }
        category.bump();
        Ok(())
    }

    fn delete_by_category(&self, category: &str) -> StorageResult<u64> {
        let mut categories = self.categories.write().map_err(|_| StorageError::LockPoisoned)?;
        let Some(entry) = categories.get_mut(category) else {
            return Ok(0);
        };
        let removed = entry.rows.len() as u64;
        if removed > 0 {
            entry.rows.clear();
            entry.bump();
        }
        Ok(removed)
    }
}

// ============================================================================
// TESTS
// ============================================================================
