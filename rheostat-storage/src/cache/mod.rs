//! Shared cache layer with storage-driven invalidation.
//!
//! Cached row sets are tagged with the write [`Watermark`] of their category.
//! [`DependencyCache`] checks the tag against the repository's
//! [`ChangeJournal`] on every read, so a write through any store instance or
//! process turns the next read into a miss.
//!
//! # Example
//!
//! ```ignore
//! let repo = Arc::new(InMemoryRepository::new());
//! let cache = DependencyCache::new(Arc::new(InMemoryCacheBackend::new()), repo.clone());
//!
//! let mark = repo.current_watermark("users")?;
//! let rows = index_rows(repo.find_by_category("users")?);
//! cache.set("engine_params:users", &rows, CacheDependency::new("users", mark))?;
//! ```
//!
//! [`Watermark`]: rheostat_core::Watermark

pub mod dependency;
pub mod key;
pub mod lmdb_backend;
pub mod memory_backend;
pub mod traits;
pub mod watermark;

pub use dependency::{CacheClient, DependencyCache};
pub use key::CacheKey;
pub use lmdb_backend::{LmdbCacheBackend, LmdbCacheError};
pub use memory_backend::InMemoryCacheBackend;
pub use traits::{CacheBackend, CacheStats, CachedEntry};
pub use watermark::ChangeJournal;
