//! Process-wide shared state of parameter stores.
//!
//! The registry holds, per owner cache key, the raw rows of the owner's
//! category and the owner's merged schema. Every store sharing one registry
//! (through an `Arc`) observes the same entries, so two stores for the same
//! identity never load the same rows twice.
//!
//! Lifecycle:
//! - rows are populated by the first cache fill and purged when a store that
//!   wrote resets;
//! - schemas are registered when a store is built and carried to the new
//!   key when an owner's identity changes.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use rheostat_core::{ParamResult, RawRow, RawRows, Schema, StorageError};

#[derive(Debug, Default)]
pub struct ParamRegistry {
    rows: RwLock<HashMap<String, RawRows>>,
    schemas: RwLock<HashMap<String, Schema>>,
}

fn read<T>(lock: &RwLock<T>) -> ParamResult<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| StorageError::LockPoisoned.into())
}

fn write<T>(lock: &RwLock<T>) -> ParamResult<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| StorageError::LockPoisoned.into())
}

impl ParamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // === Raw rows ===

    /// Whether rows are held for `key`, even an empty set.
    pub fn has_rows(&self, key: &str) -> ParamResult<bool> {
        Ok(read(&self.rows)?.contains_key(key))
    }

    /// Snapshot of the rows held for `key`.
    pub fn rows(&self, key: &str) -> ParamResult<Option<RawRows>> {
        Ok(read(&self.rows)?.get(key).cloned())
    }

    /// One row held for `key`.
    pub fn row(&self, key: &str, name: &str) -> ParamResult<Option<RawRow>> {
        Ok(read(&self.rows)?
            .get(key)
            .and_then(|rows| rows.get(name))
            .cloned())
    }

    /// Replace the rows held for `key`.
    pub fn store_rows(&self, key: &str, rows: RawRows) -> ParamResult<()> {
        write(&self.rows)?.insert(key.to_string(), rows);
        Ok(())
    }

    /// Add or replace a single row under `key`.
    pub fn insert_row(&self, key: &str, row: RawRow) -> ParamResult<()> {
        write(&self.rows)?
            .entry(key.to_string())
            .or_default()
            .insert(row.name.clone(), row);
        Ok(())
    }

    /// Drop the rows held for `key`. Returns whether anything was held.
    pub fn purge_rows(&self, key: &str) -> ParamResult<bool> {
        Ok(write(&self.rows)?.remove(key).is_some())
    }

    // === Schemas ===

    pub fn schema(&self, key: &str) -> ParamResult<Option<Schema>> {
        Ok(read(&self.schemas)?.get(key).cloned())
    }

    pub fn store_schema(&self, key: &str, schema: Schema) -> ParamResult<()> {
        write(&self.schemas)?.insert(key.to_string(), schema);
        Ok(())
    }

    /// Register the schema of `old_key` under `new_key` as well.
    ///
    /// Returns the carried schema, or `None` if `old_key` had none.
    pub fn carry_schema(&self, old_key: &str, new_key: &str) -> ParamResult<Option<Schema>> {
        let mut schemas = write(&self.schemas)?;
        let Some(schema) = schemas.get(old_key).cloned() else {
            return Ok(None);
        };
        schemas.insert(new_key.to_string(), schema.clone());
        Ok(Some(schema))
    }

    /// Drop every row set and schema.
    pub fn clear(&self) -> ParamResult<()> {
        write(&self.rows)?.clear();
        write(&self.schemas)?.clear();
        Ok(())
    }
}
