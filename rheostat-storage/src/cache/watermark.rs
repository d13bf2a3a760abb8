//! Change journal for cache invalidation.
//!
//! The change journal exposes the write history of each storage category,
//! allowing the cache to decide whether a cached row set is stale. Every
//! repository is a change journal for the categories it stores.

use std::sync::Arc;

use rheostat_core::{StorageResult, Watermark};

/// Write history of storage categories.
///
/// # Implementation Notes
///
/// Implementations should:
/// - Bump the category's watermark in the same unit of work as the write
/// - Be cheap for `current_watermark` (it is called on every cache read)
/// - Keep watermarks of different categories independent
pub trait ChangeJournal: Send + Sync {
    /// Get the current watermark for a category.
    ///
    /// A category that was never written reports [`Watermark::zero`].
    fn current_watermark(&self, category: &str) -> StorageResult<Watermark>;
}

impl<J: ChangeJournal + ?Sized> ChangeJournal for Arc<J> {
    fn current_watermark(&self, category: &str) -> StorageResult<Watermark> {
        (**self).current_watermark(category)
    }
}
