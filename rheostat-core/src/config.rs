//! Configuration types

use serde::{Deserialize, Serialize};

use crate::{ConfigError, ValueType};

/// Default prefix of per-owner cache keys (storage table name plus separator).
pub const DEFAULT_CACHE_KEY_PREFIX: &str = "engine_params:";

fn default_true() -> bool {
    true
}

fn default_cache_key_prefix() -> String {
    DEFAULT_CACHE_KEY_PREFIX.to_string()
}

/// Behaviour switches of an active parameter store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamsConfig {
    /// Defer every storage/cache read until the first param access.
    #[serde(default = "default_true")]
    pub lazy_loading: bool,
    /// Keep loaded rows in the shared cache between requests.
    #[serde(default = "default_true")]
    pub caching: bool,
    /// Materialize declared-but-missing active params in storage.
    /// When off, a missing row is a configuration error.
    #[serde(default = "default_true")]
    pub persistence: bool,
    /// Defer inserting a materialized param until it is explicitly set.
    /// Only meaningful while `persistence` is on.
    #[serde(default = "default_true")]
    pub lazy_persistence: bool,
    /// Type of active params whose declaration omits one.
    #[serde(default)]
    pub default_type: ValueType,
    /// Prefix of the per-owner cache key.
    #[serde(default = "default_cache_key_prefix")]
    pub cache_key_prefix: String,
}

impl Default for ParamsConfig {
    fn default() -> Self {
        Self {
            lazy_loading: true,
            caching: true,
            persistence: true,
            lazy_persistence: true,
            default_type: ValueType::String,
            cache_key_prefix: default_cache_key_prefix(),
        }
    }
}

impl ParamsConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lazy_loading(mut self, enabled: bool) -> Self {
        self.lazy_loading = enabled;
        self
    }

    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.caching = enabled;
        self
    }

    pub fn with_persistence(mut self, enabled: bool) -> Self {
        self.persistence = enabled;
        self
    }

    pub fn with_lazy_persistence(mut self, enabled: bool) -> Self {
        self.lazy_persistence = enabled;
        self
    }

    pub fn with_default_type(mut self, value_type: ValueType) -> Self {
        self.default_type = value_type;
        self
    }

    pub fn with_cache_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cache_key_prefix = prefix.into();
        self
    }

    /// Cache key of an owner identity.
    pub fn cache_key(&self, identity: &str) -> String {
        format!("{}{}", self.cache_key_prefix, identity)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - cache_key_prefix is not blank
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_key_prefix.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "cache_key_prefix".to_string(),
                value: self.cache_key_prefix.clone(),
                reason: "cache_key_prefix must not be empty".to_string(),
            });
        }

        if !self.persistence && !self.lazy_persistence {
            tracing::debug!("lazy_persistence = false has no effect while persistence is disabled");
        }

        Ok(())
    }

    /// Parse a config from a TOML document and validate it.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse {
            source_kind: "toml".to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `RHEOSTAT_LAZY_LOADING` (default: true)
    /// - `RHEOSTAT_CACHING` (default: true)
    /// - `RHEOSTAT_PERSISTENCE` (default: true)
    /// - `RHEOSTAT_LAZY_PERSISTENCE` (default: true)
    /// - `RHEOSTAT_DEFAULT_TYPE` (default: string)
    /// - `RHEOSTAT_CACHE_KEY_PREFIX` (default: `engine_params:`)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ParamsConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| {
            lookup(key)
                .and_then(|s| parse_flag(&s))
                .unwrap_or(default)
        };

        Self {
            lazy_loading: flag("RHEOSTAT_LAZY_LOADING", defaults.lazy_loading),
            caching: flag("RHEOSTAT_CACHING", defaults.caching),
            persistence: flag("RHEOSTAT_PERSISTENCE", defaults.persistence),
            lazy_persistence: flag("RHEOSTAT_LAZY_PERSISTENCE", defaults.lazy_persistence),
            default_type: lookup("RHEOSTAT_DEFAULT_TYPE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_type),
            cache_key_prefix: lookup("RHEOSTAT_CACHE_KEY_PREFIX")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.cache_key_prefix),
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
