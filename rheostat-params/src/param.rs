//! Param objects: the values a store hands out.
//!
//! [`StaticParam`] wraps a constant from configuration. [`ActiveParam`] wraps
//! a storage row and writes itself back through the repository on `set`.

use std::fmt;
use std::sync::Arc;

use rheostat_core::{
    now_epoch_seconds, ActiveDescriptor, ParamError, ParamFlags, ParamResult, ParamValue, RawRow,
    ValidationError, ValueFormatter, ValueType, DEFAULT_DESCRIPTION,
};
use rheostat_storage::ParamRepository;

/// A named value exposed by a parameter store.
pub trait Param: fmt::Debug + Send + Sync {
    /// Name of the param, unique within its owner.
    fn name(&self) -> &str;

    /// Current value.
    fn get(&self) -> &ParamValue;

    /// Replace the value.
    fn set(&mut self, value: ParamValue) -> ParamResult<()>;

    /// Whether `set` is rejected.
    fn is_read_only(&self) -> bool;
}

// ============================================================================
// STATIC PARAM
// ============================================================================

/// Immutable param declared as a plain value in configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticParam {
    name: String,
    value: ParamValue,
}

impl StaticParam {
    pub fn new(name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl Param for StaticParam {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self) -> &ParamValue {
        &self.value
    }

    fn set(&mut self, _value: ParamValue) -> ParamResult<()> {
        Err(ParamError::ReadOnlyViolation {
            name: self.name.clone(),
        })
    }

    fn is_read_only(&self) -> bool {
        true
    }
}

// ============================================================================
// ACTIVE PARAM
// ============================================================================

/// Storage-backed param.
///
/// Lifecycle: materialized from its declaration (not yet stored), persisted
/// by the first insert, then updated in place by later writes. Setting the
/// current value again is a no-op that touches neither storage nor
/// timestamps.
pub struct ActiveParam {
    name: String,
    value: ParamValue,
    /// Stored form of `value`.
    raw: Option<String>,
    category: String,
    value_type: ValueType,
    description: String,
    flags: ParamFlags,
    created_at: i64,
    updated_at: i64,
    persisted: bool,
    repository: Arc<dyn ParamRepository>,
    formatter: Arc<dyn ValueFormatter>,
}

impl fmt::Debug for ActiveParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveParam")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("category", &self.category)
            .field("value_type", &self.value_type)
            .field("flags", &self.flags)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("persisted", &self.persisted)
            .finish_non_exhaustive()
    }
}

impl ActiveParam {
    /// Rebuild a param from its stored row.
    pub fn from_row(
        row: &RawRow,
        descriptor: &ActiveDescriptor,
        value_type: ValueType,
        repository: Arc<dyn ParamRepository>,
        formatter: Arc<dyn ValueFormatter>,
    ) -> Result<Self, ValidationError> {
        let value = formatter.format(row.value.as_deref(), value_type)?;
        Ok(Self {
            name: row.name.clone(),
            value,
            raw: row.value.clone(),
            category: row.category.clone(),
            value_type,
            description: descriptor
                .description
                .clone()
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            flags: descriptor.flags(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            persisted: row.is_persisted(),
            repository,
            formatter,
        })
    }

    /// Build a not-yet-stored param from its declaration.
    ///
    /// The value is the declared default, or the type's default when none is
    /// declared.
    pub fn materialize(
        name: impl Into<String>,
        category: impl Into<String>,
        descriptor: &ActiveDescriptor,
        value_type: ValueType,
        repository: Arc<dyn ParamRepository>,
        formatter: Arc<dyn ValueFormatter>,
    ) -> Result<Self, ValidationError> {
        let raw = descriptor
            .value
            .clone()
            .unwrap_or_else(|| formatter.type_default(value_type));
        let row = RawRow::new(name, category, Some(raw));
        Self::from_row(&row, descriptor, value_type, repository, formatter)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn flags(&self) -> ParamFlags {
        self.flags
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    /// Whether a storage row exists for this param.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Row form of the param, as kept in the raw-rows cache.
    pub fn to_row(&self) -> RawRow {
        RawRow {
            name: self.name.clone(),
            value: self.raw.clone(),
            category: self.category.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Insert the current value if no row exists yet.
    pub fn persist(&mut self) -> ParamResult<()> {
        if self.persisted {
            return Ok(());
        }
        let raw = self.raw.clone();
        self.write(raw, now_epoch_seconds())
    }

    /// Insert or update the row with `raw`, then adopt the new timestamps.
    fn write(&mut self, raw: Option<String>, now: i64) -> ParamResult<()> {
        let mut row = RawRow {
            name: self.name.clone(),
            value: raw,
            category: self.category.clone(),
            created_at: self.created_at,
            updated_at: now,
        };

        let result = if self.persisted {
            self.repository.update(&row)
        } else {
            row.created_at = now;
            self.repository.insert(&row)
        };
        result.map_err(|source| ParamError::Persistence {
            name: self.name.clone(),
            category: self.category.clone(),
            source,
        })?;

        tracing::debug!(
            param = %self.name,
            category = %self.category,
            inserted = !self.persisted,
            "Saved active param"
        );

        self.raw = row.value;
        self.created_at = row.created_at;
        self.updated_at = row.updated_at;
        self.persisted = true;
        Ok(())
    }
}

impl Param for ActiveParam {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self) -> &ParamValue {
        &self.value
    }

    fn set(&mut self, value: ParamValue) -> ParamResult<()> {
        if self.is_read_only() {
            return Err(ParamError::ReadOnlyViolation {
                name: self.name.clone(),
            });
        }

        let (typed, raw) = self
            .formatter
            .normalize(&value, self.value_type)
            .map_err(|source| ParamError::Validation {
                name: self.name.clone(),
                source,
            })?;

        if typed == self.value {
            tracing::trace!(param = %self.name, "Value unchanged, skipping write");
            return Ok(());
        }

        self.write(raw, now_epoch_seconds())?;
        self.value = typed;
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.flags.contains(ParamFlags::READ_ONLY)
    }
}
