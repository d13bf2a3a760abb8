//! Storage rows, write watermarks and cache dependencies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One stored active param, as the repository returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub name: String,
    pub value: Option<String>,
    pub category: String,
    /// Epoch seconds; zero for a row that was never persisted.
    pub created_at: i64,
    /// Epoch seconds; zero for a row that was never persisted.
    pub updated_at: i64,
}

impl RawRow {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        value: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            category: category.into(),
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn with_timestamps(mut self, created_at: i64, updated_at: i64) -> Self {
        self.created_at = created_at;
        self.updated_at = updated_at;
        self
    }

    /// True once the row has been written to storage.
    pub fn is_persisted(&self) -> bool {
        self.created_at > 0
    }
}

/// Rows of one category indexed by param name.
pub type RawRows = BTreeMap<String, RawRow>;

/// Index a name-ordered row list by name.
pub fn index_rows(rows: Vec<RawRow>) -> RawRows {
    rows.into_iter().map(|row| (row.name.clone(), row)).collect()
}

/// A point in the write history of one category.
///
/// Repositories increment the sequence on every insert, update or delete in
/// the category, so two equal watermarks mean no write happened in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Watermark {
    /// Monotonically increasing write sequence.
    pub sequence: u64,
}

impl Watermark {
    pub fn new(sequence: u64) -> Self {
        Self { sequence }
    }

    /// Watermark of a category that was never written.
    pub fn zero() -> Self {
        Self { sequence: 0 }
    }

    pub fn next(self) -> Self {
        Self {
            sequence: self.sequence.saturating_add(1),
        }
    }

    /// Check if this watermark is newer than another.
    pub fn is_newer_than(&self, other: &Watermark) -> bool {
        self.sequence > other.sequence
    }
}

/// Invalidation dependency of a cached row set.
///
/// Stands for "the latest write to `category`": the cached value is valid as
/// long as the category's current watermark still equals `watermark`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheDependency {
    pub category: String,
    pub watermark: Watermark,
}

impl CacheDependency {
    pub fn new(category: impl Into<String>, watermark: Watermark) -> Self {
        Self {
            category: category.into(),
            watermark,
        }
    }

    /// True if `current` shows no write since the dependency was taken.
    pub fn is_satisfied_by(&self, current: &Watermark) -> bool {
        *current == self.watermark
    }
}
