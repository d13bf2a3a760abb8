//! The active parameter store.
//!
//! [`ActiveParams`] gives an owner a key-value view over its merged schema.
//! Static entries are served from configuration; active entries are loaded
//! from storage on first access, materialized with defaults when their row
//! is missing, and written back through the repository on `set`.
//!
//! Loading goes through three layers, first hit wins:
//! 1. the raw rows held by the shared [`ParamRegistry`];
//! 2. the shared [`CacheClient`], validated against the category watermark;
//! 3. the [`ParamRepository`], whose result then fills layers 2 and 1.

use std::collections::BTreeMap;
use std::sync::Arc;

use rheostat_core::{
    index_rows, ActiveDescriptor, CacheDependency, ConfigError, DefaultFormatter, ParamError,
    ParamResult, ParamValue, ParamsConfig, Schema, SchemaEntry, ValueFormatter,
};
use rheostat_storage::{CacheClient, ChangeJournal, ParamRepository};

use crate::owner::ParamsOwner;
use crate::param::{ActiveParam, Param, StaticParam};
use crate::registry::ParamRegistry;

/// Loaded params of one owner, by name.
pub type LoadedParams = BTreeMap<String, Box<dyn Param>>;

/// Builder for [`ActiveParams`].
pub struct ActiveParamsBuilder {
    owner: Arc<dyn ParamsOwner>,
    params: Option<Schema>,
    config: ParamsConfig,
    repository: Option<Arc<dyn ParamRepository>>,
    cache: Option<Arc<dyn CacheClient>>,
    registry: Option<Arc<ParamRegistry>>,
    formatter: Option<Arc<dyn ValueFormatter>>,
}

impl ActiveParamsBuilder {
    pub fn new(owner: Arc<dyn ParamsOwner>) -> Self {
        Self {
            owner,
            params: None,
            config: ParamsConfig::default(),
            repository: None,
            cache: None,
            registry: None,
            formatter: None,
        }
    }

    /// Params declared on top of the registry's schema. Owner params win.
    pub fn params(mut self, params: Schema) -> Self {
        self.params = Some(params);
        self
    }

    pub fn config(mut self, config: ParamsConfig) -> Self {
        self.config = config;
        self
    }

    /// Storage of active params. Required.
    pub fn repository(mut self, repository: Arc<dyn ParamRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Shared cache. Without one, only the registry caches rows.
    pub fn cache(mut self, cache: Arc<dyn CacheClient>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Shared registry. Defaults to a fresh, unshared one.
    pub fn registry(mut self, registry: Arc<ParamRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Value formatter. Defaults to [`DefaultFormatter`].
    pub fn formatter(mut self, formatter: Arc<dyn ValueFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Build the store: reset, merge the schema and, unless loading is lazy,
    /// load it.
    pub fn build(self) -> ParamResult<ActiveParams> {
        self.config.validate()?;
        let repository = self.repository.ok_or_else(|| ConfigError::MissingRequired {
            field: "repository".to_string(),
        })?;

        if self.config.caching && self.cache.is_none() {
            tracing::debug!(
                owner = self.owner.owner_kind(),
                "Caching enabled without a cache client, only the registry caches rows"
            );
        }

        let mut store = ActiveParams {
            owner: self.owner,
            config: self.config,
            repository,
            cache: self.cache,
            registry: self.registry.unwrap_or_default(),
            formatter: self
                .formatter
                .unwrap_or_else(|| Arc::new(DefaultFormatter::new()) as Arc<dyn ValueFormatter>),
            schema: Schema::new(),
            identity: String::new(),
            cache_key: String::new(),
            loaded: false,
            dirty: false,
            params: LoadedParams::new(),
        };

        store.reset()?;
        store.merge_schema(self.params)?;

        if !store.config.lazy_loading {
            store.ensure_loaded()?;
        }
        Ok(store)
    }
}

/// Parameter store of one owner.
///
/// Not internally synchronized: one store serves one request at a time.
/// Stores of different requests share state through the registry, the
/// cache client and the repository.
pub struct ActiveParams {
    owner: Arc<dyn ParamsOwner>,
    config: ParamsConfig,
    repository: Arc<dyn ParamRepository>,
    cache: Option<Arc<dyn CacheClient>>,
    registry: Arc<ParamRegistry>,
    formatter: Arc<dyn ValueFormatter>,
    /// Merged schema of the current identity.
    schema: Schema,
    identity: String,
    cache_key: String,
    loaded: bool,
    /// Set by any write since the last reset.
    dirty: bool,
    params: LoadedParams,
}

impl std::fmt::Debug for ActiveParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveParams")
            .field("owner", &self.owner.owner_kind())
            .field("identity", &self.identity)
            .field("cache_key", &self.cache_key)
            .field("loaded", &self.loaded)
            .field("dirty", &self.dirty)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl ActiveParams {
    pub fn builder(owner: Arc<dyn ParamsOwner>) -> ActiveParamsBuilder {
        ActiveParamsBuilder::new(owner)
    }

    // === Accessors ===

    /// Owner identity, also the storage category.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn config(&self) -> &ParamsConfig {
        &self.config
    }

    /// Merged schema of the current identity.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn registry(&self) -> &Arc<ParamRegistry> {
        &self.registry
    }

    // === Key-value view ===

    /// Current value of `name`.
    pub fn get(&mut self, name: &str) -> ParamResult<ParamValue> {
        tracing::trace!(identity = %self.identity, param = name, "get");
        self.require_declared(name)?;
        self.ensure_loaded()?;
        Ok(self.loaded_param(name)?.get().clone())
    }

    /// Write `value` to `name`.
    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) -> ParamResult<()> {
        let value = value.into();
        tracing::trace!(identity = %self.identity, param = name, value = %value, "set");
        self.require_declared(name)?;
        self.ensure_loaded()?;
        match self.loaded_param_mut(name)?.set(value) {
            Ok(()) => {
                self.dirty = true;
                Ok(())
            }
            Err(e @ ParamError::Persistence { .. }) => {
                // Held rows disagree with storage; refill on the next reset
                self.dirty = true;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Entries can't be removed from the view.
    pub fn unset(&mut self, name: &str) -> ParamResult<()> {
        Err(ParamError::Unsupported {
            operation: format!("unset('{name}')"),
        })
    }

    /// Whether `name` is declared. Does not load.
    pub fn has(&self, name: &str) -> bool {
        self.schema.contains(name)
    }

    /// Declared names, ordered. Does not load.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.schema.names()
    }

    /// Loaded params ordered by name.
    pub fn iter(&mut self) -> ParamResult<impl Iterator<Item = (&str, &dyn Param)>> {
        self.ensure_loaded()?;
        Ok(self
            .params
            .iter()
            .map(|(name, param)| (name.as_str(), &**param)))
    }

    /// The whole loaded mapping.
    pub fn to_array(&mut self) -> ParamResult<&LoadedParams> {
        self.ensure_loaded()?;
        Ok(&self.params)
    }

    /// The param object behind `name`.
    pub fn param(&mut self, name: &str) -> ParamResult<&dyn Param> {
        self.require_declared(name)?;
        self.ensure_loaded()?;
        self.loaded_param(name)
    }

    /// Number of loaded active params.
    pub fn active_count(&mut self) -> ParamResult<usize> {
        self.ensure_loaded()?;
        Ok(self.count_loaded(|entry, _| entry.is_active()))
    }

    /// Number of loaded static params.
    pub fn static_count(&mut self) -> ParamResult<usize> {
        self.ensure_loaded()?;
        Ok(self.count_loaded(|entry, _| !entry.is_active()))
    }

    /// Number of loaded params that accept writes.
    pub fn safe_active_count(&mut self) -> ParamResult<usize> {
        self.ensure_loaded()?;
        Ok(self.count_loaded(|_, param| !param.is_read_only()))
    }

    // === Lifecycle ===

    /// The owner's identity may have changed: reset, then reload unless
    /// loading is lazy.
    pub fn notify_reloaded(&mut self) -> ParamResult<()> {
        self.reset()?;
        if !self.config.lazy_loading {
            self.ensure_loaded()?;
        }
        Ok(())
    }

    /// Same as [`ActiveParams::notify_reloaded`].
    pub fn reload(&mut self) -> ParamResult<()> {
        self.notify_reloaded()
    }

    /// The owner was deleted: remove its rows from storage.
    ///
    /// Returns the number of rows removed. Caches are left alone: the write
    /// watermark moves, so the shared cache misses on the next fill, and the
    /// store turns dirty so the next reset drops the held rows.
    pub fn notify_deleted(&mut self) -> ParamResult<u64> {
        let removed = self.repository.delete_by_category(&self.identity)?;
        self.loaded = false;
        self.dirty = true;
        tracing::info!(
            owner = self.owner.owner_kind(),
            identity = %self.identity,
            removed,
            "Deleted active params of owner"
        );
        Ok(removed)
    }

    /// Load the params of the current identity unless already loaded.
    pub fn ensure_loaded(&mut self) -> ParamResult<()> {
        if self.loaded {
            return Ok(());
        }
        self.load()
    }

    // === Internals ===

    fn owner_label(&self) -> String {
        format!("{} '{}'", self.owner.owner_kind(), self.identity)
    }

    fn require_declared(&self, name: &str) -> ParamResult<()> {
        if self.schema.contains(name) {
            Ok(())
        } else {
            Err(ParamError::NotFound {
                name: name.to_string(),
                owner: self.owner_label(),
            })
        }
    }

    fn loaded_param(&self, name: &str) -> ParamResult<&dyn Param> {
        match self.params.get(name) {
            Some(param) if param.name() == name => Ok(&**param),
            _ => Err(ParamError::InvalidParam {
                name: name.to_string(),
                owner: self.owner_label(),
            }),
        }
    }

    fn loaded_param_mut(&mut self, name: &str) -> ParamResult<&mut Box<dyn Param>> {
        let owner = self.owner_label();
        match self.params.get_mut(name) {
            Some(param) if param.name() == name => Ok(param),
            _ => Err(ParamError::InvalidParam {
                name: name.to_string(),
                owner,
            }),
        }
    }

    fn count_loaded<F>(&self, predicate: F) -> usize
    where
        F: Fn(&SchemaEntry, &dyn Param) -> bool,
    {
        self.params
            .iter()
            .filter(|&(name, param)| {
                self.schema
                    .get(name)
                    .is_some_and(|entry| predicate(entry, &**param))
            })
            .count()
    }

    /// Reset procedure: drop written rows of the old identity, adopt the
    /// owner's current identity and carry the schema over to it.
    fn reset(&mut self) -> ParamResult<()> {
        let identity = self.owner.unique_id();
        if identity.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "unique_id".to_string(),
                value: identity,
                reason: format!("{} has no unique id", self.owner.owner_kind()),
            }
            .into());
        }

        let old_key = std::mem::take(&mut self.cache_key);
        if self.dirty {
            self.registry.purge_rows(&old_key)?;
            self.dirty = false;
        }

        self.cache_key = self.config.cache_key(&identity);
        if !old_key.is_empty() && old_key != self.cache_key {
            if let Some(schema) = self.registry.carry_schema(&old_key, &self.cache_key)? {
                self.schema = schema;
            }
        }

        tracing::info!(
            owner = self.owner.owner_kind(),
            from = %self.identity,
            identity = %identity,
            "Reset active params"
        );
        self.identity = identity;
        self.loaded = false;
        Ok(())
    }

    fn merge_schema(&mut self, builder_params: Option<Schema>) -> ParamResult<()> {
        let owner_params = self.owner.params();
        if builder_params.is_none() && owner_params.is_none() {
            tracing::warn!(
                owner = self.owner.owner_kind(),
                identity = %self.identity,
                "Owner declares no params"
            );
        }

        let mut schema = self.registry.schema(&self.cache_key)?.unwrap_or_default();
        if let Some(params) = builder_params {
            schema.merge(params);
        }
        if let Some(params) = owner_params {
            schema.merge(params);
        }

        self.registry.store_schema(&self.cache_key, schema.clone())?;
        self.schema = schema;
        Ok(())
    }

    /// Load sequence.
    fn load(&mut self) -> ParamResult<()> {
        let mut params = LoadedParams::new();
        if self.schema.is_empty() {
            self.params = params;
            self.loaded = true;
            return Ok(());
        }

        tracing::debug!(
            identity = %self.identity,
            declared = self.schema.len(),
            active = self.schema.active_len(),
            "Loading params"
        );

        let schema = self.schema.clone();
        for (name, entry) in &schema {
            let param: Box<dyn Param> = match entry {
                SchemaEntry::Static(value) => Box::new(StaticParam::new(name.clone(), value.clone())),
                SchemaEntry::Active(descriptor) => Box::new(self.resolve_active(name, descriptor)?),
            };
            params.insert(name.clone(), param);
        }

        self.params = params;
        self.loaded = true;
        Ok(())
    }

    /// Active-param resolution: stored row if any, else a materialized default.
    fn resolve_active(&mut self, name: &str, descriptor: &ActiveDescriptor) -> ParamResult<ActiveParam> {
        self.fill_rows()?;
        let value_type = descriptor.resolved_type(self.config.default_type);

        if let Some(row) = self.registry.row(&self.cache_key, name)? {
            return ActiveParam::from_row(
                &row,
                descriptor,
                value_type,
                self.repository.clone(),
                self.formatter.clone(),
            )
            .map_err(|e| ParamError::UnexpectedValue {
                name: name.to_string(),
                owner: self.owner_label(),
                reason: format!("stored value {:?} is not a valid {value_type}: {e}", row.value),
            });
        }

        if !self.config.persistence {
            return Err(ParamError::UnexpectedValue {
                name: name.to_string(),
                owner: self.owner_label(),
                reason: "declared active but missing in storage".to_string(),
            });
        }

        let mut param = ActiveParam::materialize(
            name,
            self.identity.clone(),
            descriptor,
            value_type,
            self.repository.clone(),
            self.formatter.clone(),
        )
        .map_err(|source| ParamError::Validation {
            name: name.to_string(),
            source,
        })?;

        if !self.config.lazy_persistence || !descriptor.lazy_persistence {
            param.persist()?;
            self.dirty = true;
            tracing::info!(
                identity = %self.identity,
                param = name,
                "Created active param row"
            );
        }

        self.registry.insert_row(&self.cache_key, param.to_row())?;
        Ok(param)
    }

    /// Cache-fill procedure for the current identity.
    fn fill_rows(&mut self) -> ParamResult<()> {
        if self.registry.has_rows(&self.cache_key)? {
            return Ok(());
        }

        let cache = if self.config.caching { self.cache.clone() } else { None };

        if let Some(cache) = &cache {
            match cache.get(&self.cache_key) {
                Ok(Some(rows)) => {
                    tracing::info!(
                        identity = %self.identity,
                        rows = rows.len(),
                        "Active params served from cache"
                    );
                    return self.registry.store_rows(&self.cache_key, rows);
                }
                Ok(None) => {
                    tracing::debug!(key = %self.cache_key, "Cache miss");
                }
                Err(e) => {
                    tracing::warn!(key = %self.cache_key, error = %e, "Cache read failed, loading from storage");
                }
            }
        }

        // Watermark first: a write racing the select can only make the
        // cached entry look older than its rows.
        let watermark = match cache {
            Some(_) => Some(self.repository.current_watermark(&self.identity)?),
            None => None,
        };
        let rows = index_rows(self.repository.find_by_category(&self.identity)?);
        tracing::info!(
            identity = %self.identity,
            rows = rows.len(),
            "Selected active params from storage"
        );

        if let (Some(cache), Some(watermark)) = (&cache, watermark) {
            let dependency = CacheDependency::new(self.identity.clone(), watermark);
            if let Err(e) = cache.set(&self.cache_key, &rows, dependency) {
                tracing::warn!(key = %self.cache_key, error = %e, "Cache write failed");
            }
        }

        self.registry.store_rows(&self.cache_key, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::owner::FixedOwner;
    use rheostat_core::ValueType;
    use rheostat_storage::InMemoryRepository;

    fn build(schema: Schema, config: ParamsConfig) -> (ActiveParams, Arc<InMemoryRepository>) {
        let repo = Arc::new(InMemoryRepository::new());
        let store = ActiveParams::builder(Arc::new(FixedOwner::new("users")))
            .params(schema)
            .config(config)
            .repository(repo.clone())
            .build()
            .unwrap();
        (store, repo)
    }

    fn count_schema() -> Schema {
        Schema::new()
            .with_static("v1", "v1")
            .with_active("count", ActiveDescriptor::new(ValueType::Number))
    }

    #[test]
    fn test_build_requires_repository() {
        let err = ActiveParams::builder(Arc::new(FixedOwner::new("users")))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ParamError::Configuration(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn test_build_rejects_blank_identity() {
        let err = ActiveParams::builder(Arc::new(FixedOwner::new("  ")))
            .repository(Arc::new(InMemoryRepository::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ParamError::Configuration(_)));
    }

    #[test]
    fn test_build_is_lazy_by_default() {
        let (store, _) = build(count_schema(), ParamsConfig::default());
        assert!(!store.is_loaded());
        assert_eq!(store.identity(), "users");
        assert_eq!(store.cache_key(), "engine_params:users");
        assert!(store.has("count"));
        assert!(!store.has("missing"));
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["count", "v1"]);
        // has/keys don't load
        assert!(!store.is_loaded());
    }

    #[test]
    fn test_unknown_name_not_found() {
        let (mut store, _) = build(count_schema(), ParamsConfig::default());
        assert!(matches!(store.get("nope"), Err(ParamError::NotFound { .. })));
        assert!(matches!(store.set("nope", 1), Err(ParamError::NotFound { .. })));
    }

    #[test]
    fn test_unset_unsupported() {
        let (mut store, _) = build(count_schema(), ParamsConfig::default());
        assert!(matches!(store.unset("count"), Err(ParamError::Unsupported { .. })));
    }

    #[test]
    fn test_counts() {
        let schema = count_schema()
            .with_active("motd", ActiveDescriptor::new(ValueType::String).read_only());
        let (mut store, _) = build(schema, ParamsConfig::default());

        assert_eq!(store.active_count().unwrap(), 2);
        assert_eq!(store.static_count().unwrap(), 1);
        assert_eq!(store.safe_active_count().unwrap(), 1);
        assert!(store.is_loaded());
    }

    #[test]
    fn test_empty_schema_loads_empty() {
        let (mut store, repo) = build(Schema::new(), ParamsConfig::default());
        assert_eq!(store.to_array().unwrap().len(), 0);
        assert!(store.is_loaded());
        assert!(repo.is_empty().unwrap());
    }

    #[test]
    fn test_set_marks_dirty_and_reset_clears() {
        let (mut store, _) = build(count_schema(), ParamsConfig::default());
        store.set("count", 5).unwrap();
        assert!(store.is_dirty());

        store.notify_reloaded().unwrap();
        assert!(!store.is_dirty());
        assert!(!store.is_loaded());
        assert!(!store.registry().has_rows("engine_params:users").unwrap());
        assert_eq!(store.get("count").unwrap(), ParamValue::Number(5.0));
    }

    #[test]
    fn test_failed_set_does_not_mark_dirty() {
        let (mut store, _) = build(count_schema(), ParamsConfig::default());
        assert!(store.set("v1", "v2").is_err());
        assert!(store.set("count", "abc").is_err());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_iter_is_ordered() {
        let (mut store, _) = build(count_schema(), ParamsConfig::default());
        let names: Vec<&str> = store.iter().unwrap().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["count", "v1"]);
    }
}
