//! Rheostat Test Utilities
//!
//! Shared helpers for the integration and property tests of the rheostat
//! crates:
//! - Counting repository and cache client wrappers for asserting storage traffic
//! - A test owner whose identity can change at runtime
//! - Proptest generators for values, names and schemas
//! - Fixture schemas and assertion helpers

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

// Re-export core types for convenience
pub use rheostat_core::*;
pub use rheostat_params::{ActiveParams, ActiveParamsBuilder, FixedOwner, ParamRegistry, ParamsOwner};
pub use rheostat_storage::{
    CacheClient, ChangeJournal, DependencyCache, InMemoryCacheBackend, InMemoryRepository,
    ParamRepository,
};

/// Install a test-friendly tracing subscriber. Safe to call from every test.
///
/// Respects `RUST_LOG`; silent unless it is set.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// COUNTING REPOSITORY
// ============================================================================

/// Repository wrapper that counts calls and can be told to fail writes.
pub struct CountingRepository {
    inner: Arc<dyn ParamRepository>,
    finds: AtomicUsize,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
    watermark_reads: AtomicUsize,
    fail_writes: AtomicBool,
}

impl CountingRepository {
    /// Wrap a fresh [`InMemoryRepository`].
    pub fn new() -> Self {
        Self::wrap(Arc::new(InMemoryRepository::new()))
    }

    pub fn wrap(inner: Arc<dyn ParamRepository>) -> Self {
        Self {
            inner,
            finds: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            watermark_reads: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &Arc<dyn ParamRepository> {
        &self.inner
    }

    pub fn finds(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn watermark_reads(&self) -> usize {
        self.watermark_reads.load(Ordering::SeqCst)
    }

    /// Successful and failed insert plus update attempts.
    pub fn writes(&self) -> usize {
        self.inserts() + self.updates()
    }

    /// Make every following insert, update and delete fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn reset_counts(&self) {
        for counter in [
            &self.finds,
            &self.inserts,
            &self.updates,
            &self.deletes,
            &self.watermark_reads,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }

    fn refuse(&self) -> Option<String> {
        self.fail_writes
            .load(Ordering::SeqCst)
            .then(|| "writes disabled by test".to_string())
    }

    /// Stored row of `(name, category)` in the wrapped repository.
    pub fn stored(&self, name: &str, category: &str) -> StorageResult<Option<RawRow>> {
        Ok(self
            .inner
            .find_by_category(category)?
            .into_iter()
            .find(|row| row.name == name))
    }
}

impl Default for CountingRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeJournal for CountingRepository {
    fn current_watermark(&self, category: &str) -> StorageResult<Watermark> {
        self.watermark_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.current_watermark(category)
    }
}

impl ParamRepository for CountingRepository {
    fn find_by_category(&self, category: &str) -> StorageResult<Vec<RawRow>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_category(category)
    }

    fn insert(&self, row: &RawRow) -> StorageResult<()> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.refuse() {
            return Err(StorageError::InsertFailed {
                name: row.name.clone(),
                category: row.category.clone(),
                reason,
            });
        }
        self.inner.insert(row)
    }

    fn update(&self, row: &RawRow) -> StorageResult<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.refuse() {
            return Err(StorageError::UpdateFailed {
                name: row.name.clone(),
                category: row.category.clone(),
                reason,
            });
        }
        self.inner.update(row)
    }

    fn delete_by_category(&self, category: &str) -> StorageResult<u64> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.refuse() {
            return Err(StorageError::DeleteFailed {
                category: category.to_string(),
                reason,
            });
        }
        self.inner.delete_by_category(category)
    }
}

// ============================================================================
// COUNTING CACHE CLIENT
// ============================================================================

/// Cache client wrapper that counts calls and hits, optionally failing all of them.
pub struct CountingCache {
    inner: Option<Arc<dyn CacheClient>>,
    gets: AtomicUsize,
    hits: AtomicUsize,
    sets: AtomicUsize,
    invalidations: AtomicUsize,
}

impl CountingCache {
    pub fn wrap(inner: Arc<dyn CacheClient>) -> Self {
        Self::with_inner(Some(inner))
    }

    /// Cache whose every operation fails with a backend error.
    pub fn failing() -> Self {
        Self::with_inner(None)
    }

    fn with_inner(inner: Option<Arc<dyn CacheClient>>) -> Self {
        Self {
            inner,
            gets: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            invalidations: AtomicUsize::new(0),
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }

    fn client(&self) -> CacheResult<&Arc<dyn CacheClient>> {
        self.inner.as_ref().ok_or_else(|| CacheError::Backend {
            reason: "cache unavailable".to_string(),
        })
    }
}

impl CacheClient for CountingCache {
    fn get(&self, key: &str) -> CacheResult<Option<RawRows>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let rows = self.client()?.get(key)?;
        if rows.is_some() {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
        Ok(rows)
    }

    fn set(&self, key: &str, rows: &RawRows, dependency: CacheDependency) -> CacheResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.client()?.set(key, rows, dependency)
    }

    fn invalidate(&self, key: &str) -> CacheResult<()> {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        self.client()?.invalidate(key)
    }
}

/// In-memory dependency cache validated against `journal`, wrapped for counting.
pub fn counting_memory_cache(journal: Arc<dyn ParamRepository>) -> Arc<CountingCache> {
    let cache = DependencyCache::new(Arc::new(InMemoryCacheBackend::new()), journal);
    Arc::new(CountingCache::wrap(Arc::new(cache)))
}

// ============================================================================
// TEST OWNER
// ============================================================================

/// Owner whose identity can be changed, like a record reloaded under another id.
#[derive(Debug)]
pub struct TestOwner {
    id: RwLock<String>,
    params: Option<Schema>,
}

impl TestOwner {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: RwLock::new(id.into()),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Schema) -> Self {
        self.params = Some(params);
        self
    }

    pub fn set_id(&self, id: impl Into<String>) {
        if let Ok(mut current) = self.id.write() {
            *current = id.into();
        }
    }
}

impl ParamsOwner for TestOwner {
    fn unique_id(&self) -> String {
        self.id.read().map(|id| id.clone()).unwrap_or_default()
    }

    fn params(&self) -> Option<Schema> {
        self.params.clone()
    }

    fn owner_kind(&self) -> &str {
        "test owner"
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    /// Generate a storage-friendly param name.
    pub fn arb_param_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,15}"
    }

    /// Generate an owner identity.
    pub fn arb_identity() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z0-9._-]{0,15}"
    }

    pub fn arb_value_type() -> impl Strategy<Value = ValueType> {
        prop_oneof![
            Just(ValueType::String),
            Just(ValueType::Number),
            Just(ValueType::Boolean),
            Just(ValueType::Date),
        ]
    }

    pub fn arb_date() -> impl Strategy<Value = NaiveDate> {
        (1970i32..2100, 1u32..=12, 1u32..=28)
            .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default())
    }

    /// Generate a non-null value valid for `value_type`.
    pub fn arb_value_for(value_type: ValueType) -> BoxedStrategy<ParamValue> {
        match value_type {
            ValueType::String => "[ -~]{0,24}".prop_map(ParamValue::String).boxed(),
            ValueType::Number => (-1_000_000i64..1_000_000)
                .prop_map(|n| ParamValue::Number(n as f64))
                .boxed(),
            ValueType::Boolean => any::<bool>().prop_map(ParamValue::Boolean).boxed(),
            ValueType::Date => arb_date().prop_map(ParamValue::Date).boxed(),
        }
    }

    /// Generate a type together with a valid value of it.
    pub fn arb_typed_value() -> impl Strategy<Value = (ValueType, ParamValue)> {
        arb_value_type().prop_flat_map(|ty| (Just(ty), arb_value_for(ty)))
    }

    /// Generate a writable active declaration without a declared default.
    pub fn arb_active_descriptor() -> impl Strategy<Value = ActiveDescriptor> {
        (arb_value_type(), any::<bool>())
            .prop_map(|(ty, cookie)| {
                let descriptor = ActiveDescriptor::new(ty);
                if cookie {
                    descriptor.cookie()
                } else {
                    descriptor
                }
            })
    }

    /// Generate a schema of 1 to 8 active params and up to 4 static ones.
    pub fn arb_schema() -> impl Strategy<Value = Schema> {
        (
            prop::collection::btree_map(arb_param_name(), arb_active_descriptor(), 1..8),
            prop::collection::btree_map(arb_param_name(), "[a-z0-9]{0,8}", 0..4),
        )
            .prop_map(|(active, statics)| {
                let mut schema = Schema::new();
                for (name, value) in statics {
                    schema.insert(name, SchemaEntry::Static(ParamValue::String(value)));
                }
                // Active wins on a name clash
                for (name, descriptor) in active {
                    schema.insert(name, SchemaEntry::Active(descriptor));
                }
                schema
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made schemas and stores.

    use super::*;

    /// One static `v1` and one active number `count`.
    pub fn count_schema() -> Schema {
        Schema::new()
            .with_static("v1", "v1")
            .with_active("count", ActiveDescriptor::new(ValueType::Number))
    }

    /// Schema of a users module: statics plus one param of each type and a
    /// read-only one.
    pub fn users_schema() -> Schema {
        Schema::new()
            .with_static("name", "Users Management Module")
            .with_static("version", "2.0.0")
            .with_active(
                "registrations_open",
                ActiveDescriptor::new(ValueType::Boolean)
                    .with_description("Whether sign-up is enabled")
                    .with_default("1"),
            )
            .with_active(
                "max_sessions",
                ActiveDescriptor::new(ValueType::Number).with_default("3"),
            )
            .with_active("welcome_text", ActiveDescriptor::new(ValueType::String))
            .with_active("launch_date", ActiveDescriptor::new(ValueType::Date))
            .with_active(
                "motd",
                ActiveDescriptor::new(ValueType::String)
                    .with_default("hello")
                    .read_only(),
            )
    }

    /// The users schema as a TOML document.
    pub const USERS_SCHEMA_TOML: &str = r#"
name = "Users Management Module"
version = "2.0.0"

[registrations_open]
kind = "active"
type = "boolean"
description = "Whether sign-up is enabled"
value = "1"

[max_sessions]
kind = "active"
type = "number"
value = "3"

[welcome_text]
kind = "active"
type = "string"

[launch_date]
kind = "active"
type = "date"

[motd]
kind = "active"
type = "string"
value = "hello"
read_only = true
"#;

    /// Build a store for `owner` over `repository` with the given schema and config.
    pub fn store(
        owner: Arc<dyn ParamsOwner>,
        schema: Schema,
        config: ParamsConfig,
        repository: Arc<dyn ParamRepository>,
    ) -> ParamResult<ActiveParams> {
        ActiveParams::builder(owner)
            .params(schema)
            .config(config)
            .repository(repository)
            .build()
    }
}

// ============================================================================
// ASSERTION HELPERS
// ============================================================================

/// Assert that a result is Ok and return the value.
#[track_caller]
pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a result is Err and return the error.
#[track_caller]
pub fn assert_err<T: std::fmt::Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
        Err(e) => e,
    }
}

/// Assert that a result is a NotFound error.
#[track_caller]
pub fn assert_not_found<T: std::fmt::Debug>(result: &ParamResult<T>) {
    match result {
        Err(ParamError::NotFound { .. }) => {}
        other => panic!("Expected NotFound error, got: {:?}", other),
    }
}

/// Assert that a result is a ReadOnlyViolation error.
#[track_caller]
pub fn assert_read_only<T: std::fmt::Debug>(result: &ParamResult<T>) {
    match result {
        Err(ParamError::ReadOnlyViolation { .. }) => {}
        other => panic!("Expected ReadOnlyViolation error, got: {:?}", other),
    }
}

/// Assert that a result is a Validation error.
#[track_caller]
pub fn assert_validation_error<T: std::fmt::Debug>(result: &ParamResult<T>) {
    match result {
        Err(ParamError::Validation { .. }) => {}
        other => panic!("Expected Validation error, got: {:?}", other),
    }
}

/// Assert that a result is a Persistence error.
#[track_caller]
pub fn assert_persistence_error<T: std::fmt::Debug>(result: &ParamResult<T>) {
    match result {
        Err(ParamError::Persistence { .. }) => {}
        other => panic!("Expected Persistence error, got: {:?}", other),
    }
}

/// Assert that a result is an UnexpectedValue error.
#[track_caller]
pub fn assert_unexpected_value<T: std::fmt::Debug>(result: &ParamResult<T>) {
    match result {
        Err(ParamError::UnexpectedValue { .. }) => {}
        other => panic!("Expected UnexpectedValue error, got: {:?}", other),
    }
}
