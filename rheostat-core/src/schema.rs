//! Param schema declared in static configuration.
//!
//! A schema maps param names to entries. A plain scalar declares a static
//! param; a table with `kind = "active"` declares an active param backed by
//! storage:
//!
//! ```toml
//! name = "Users Management Module"
//! version = "2.0.0"
//!
//! [registrations_open]
//! kind = "active"
//! type = "boolean"
//! description = "Whether sign-up is enabled"
//! ```

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

use crate::{ConfigError, ParamValue, ValueType};

/// Description used for active params materialized without one.
pub const DEFAULT_DESCRIPTION: &str = "Active param";

bitflags! {
    /// Behaviour flags of an active param.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ParamFlags: u8 {
        /// End users can't change this param through the store
        const READ_ONLY = 0b0000_0001;
        /// Param is mirrored to a client-side cookie by the host
        const COOKIE = 0b0000_0010;
    }
}

/// Marker for the `kind` field of an active descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveKind {
    #[default]
    Active,
}

fn default_true() -> bool {
    true
}

/// Declaration of an active (storage backed) param.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveDescriptor {
    pub kind: ActiveKind,
    /// Declared type; falls back to the store's default type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Raw value used when the row is first materialized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub cookie: bool,
    /// Per-param lazy persistence; `false` forces an insert on first load.
    #[serde(default = "default_true")]
    pub lazy_persistence: bool,
}

impl Default for ActiveDescriptor {
    fn default() -> Self {
        Self {
            kind: ActiveKind::Active,
            value_type: None,
            description: None,
            value: None,
            read_only: false,
            cookie: false,
            lazy_persistence: true,
        }
    }
}

impl ActiveDescriptor {
    /// Descriptor of the given type with every other field defaulted.
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type: Some(value_type),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, raw: impl Into<String>) -> Self {
        self.value = Some(raw.into());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn cookie(mut self) -> Self {
        self.cookie = true;
        self
    }

    pub fn with_lazy_persistence(mut self, lazy: bool) -> Self {
        self.lazy_persistence = lazy;
        self
    }

    /// Declared type, or `fallback` when the declaration omits it.
    pub fn resolved_type(&self, fallback: ValueType) -> ValueType {
        self.value_type.unwrap_or(fallback)
    }

    pub fn flags(&self) -> ParamFlags {
        let mut flags = ParamFlags::empty();
        flags.set(ParamFlags::READ_ONLY, self.read_only);
        flags.set(ParamFlags::COOKIE, self.cookie);
        flags
    }
}

/// One entry of a param schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaEntry {
    Active(ActiveDescriptor),
    Static(ParamValue),
}

impl SchemaEntry {
    pub fn is_active(&self) -> bool {
        matches!(self, SchemaEntry::Active(_))
    }

    pub fn as_active(&self) -> Option<&ActiveDescriptor> {
        match self {
            SchemaEntry::Active(descriptor) => Some(descriptor),
            SchemaEntry::Static(_) => None,
        }
    }
}

impl From<ActiveDescriptor> for SchemaEntry {
    fn from(descriptor: ActiveDescriptor) -> Self {
        SchemaEntry::Active(descriptor)
    }
}

impl From<ParamValue> for SchemaEntry {
    fn from(value: ParamValue) -> Self {
        SchemaEntry::Static(value)
    }
}

/// Named param declarations of one owner.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    entries: BTreeMap<String, SchemaEntry>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a schema from a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|e| ConfigError::Parse {
            source_kind: "toml".to_string(),
            reason: e.to_string(),
        })
    }

    /// Parse a schema from a JSON document.
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(source).map_err(|e| ConfigError::Parse {
            source_kind: "json".to_string(),
            reason: e.to_string(),
        })
    }

    /// Add a static param declaration.
    pub fn with_static(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, SchemaEntry::Static(value.into()));
        self
    }

    /// Add an active param declaration.
    pub fn with_active(mut self, name: impl Into<String>, descriptor: ActiveDescriptor) -> Self {
        self.insert(name, SchemaEntry::Active(descriptor));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: SchemaEntry) -> Option<SchemaEntry> {
        self.entries.insert(name.into(), entry)
    }

    pub fn get(&self, name: &str) -> Option<&SchemaEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, SchemaEntry> {
        self.entries.iter()
    }

    /// Number of active declarations.
    pub fn active_len(&self) -> usize {
        self.entries.values().filter(|e| e.is_active()).count()
    }

    /// Replace or extend entries with those of `overlay`; overlay entries win.
    pub fn merge(&mut self, overlay: Schema) {
        self.entries.extend(overlay.entries);
    }

    /// Consuming variant of [`Schema::merge`].
    pub fn merged(mut self, overlay: Schema) -> Self {
        self.merge(overlay);
        self
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = (&'a String, &'a SchemaEntry);
    type IntoIter = btree_map::Iter<'a, String, SchemaEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<(String, SchemaEntry)> for Schema {
    fn from_iter<I: IntoIterator<Item = (String, SchemaEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
