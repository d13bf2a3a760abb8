//! Behaviour of the active parameter store against in-memory collaborators.

use std::sync::Arc;

use rheostat_test_utils::fixtures::{count_schema, store, users_schema, USERS_SCHEMA_TOML};
use rheostat_test_utils::*;

fn counting() -> Arc<CountingRepository> {
    init_test_tracing();
    Arc::new(CountingRepository::new())
}

fn seeded_row(name: &str, category: &str, value: &str) -> RawRow {
    RawRow::new(name, category, Some(value.to_string())).with_timestamps(100, 100)
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn count_scenario_lazy_default_then_single_insert() {
    let repo = counting();
    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        count_schema(),
        ParamsConfig::default(),
        repo.clone(),
    )
    .unwrap();

    assert_eq!(params.get("count").unwrap(), ParamValue::Number(0.0));
    assert_eq!(params.get("v1").unwrap(), ParamValue::from("v1"));
    assert_eq!(repo.inserts(), 0);
    assert_eq!(repo.finds(), 1);

    params.set("count", 5).unwrap();
    assert_eq!(repo.inserts(), 1);
    assert_eq!(repo.updates(), 0);

    let stored = repo.stored("count", "users").unwrap().unwrap();
    assert_eq!(stored.value.as_deref(), Some("5"));
    assert_eq!(stored.category, "users");
    assert!(stored.is_persisted());

    repo.reset_counts();
    assert_eq!(params.get("count").unwrap(), ParamValue::Number(5.0));
    assert_eq!(repo.finds(), 0);
}

#[test]
fn identity_change_purges_old_rows_and_refills() {
    let repo = counting();
    let registry = Arc::new(ParamRegistry::new());
    let owner = Arc::new(TestOwner::new("A"));

    let mut params = ActiveParams::builder(owner.clone())
        .params(count_schema())
        .repository(repo.clone())
        .registry(registry.clone())
        .build()
        .unwrap();

    params.set("count", 5).unwrap();
    assert!(params.is_dirty());
    assert!(registry.has_rows("engine_params:A").unwrap());
    assert_eq!(repo.finds(), 1);

    owner.set_id("B");
    params.notify_reloaded().unwrap();

    assert_eq!(params.identity(), "B");
    assert_eq!(params.cache_key(), "engine_params:B");
    assert!(!params.is_loaded());
    assert!(!registry.has_rows("engine_params:A").unwrap());

    assert_eq!(params.get("count").unwrap(), ParamValue::Number(0.0));
    assert_eq!(repo.finds(), 2);
    assert!(registry.has_rows("engine_params:B").unwrap());
    assert!(repo.stored("count", "B").unwrap().is_none());
    assert_eq!(
        repo.stored("count", "A").unwrap().unwrap().value.as_deref(),
        Some("5")
    );
}

// ============================================================================
// PROPERTIES
// ============================================================================

#[test]
fn identities_are_isolated() {
    let repo = counting();
    let registry = Arc::new(ParamRegistry::new());
    let build = |id: &str| {
        ActiveParams::builder(Arc::new(FixedOwner::new(id)))
            .params(count_schema())
            .repository(repo.clone())
            .registry(registry.clone())
            .build()
            .unwrap()
    };

    let mut a = build("A");
    let mut b = build("B");

    a.set("count", 3).unwrap();
    assert_eq!(b.get("count").unwrap(), ParamValue::Number(0.0));
    assert_eq!(a.get("count").unwrap(), ParamValue::Number(3.0));

    assert!(registry.row("engine_params:B", "count").unwrap().is_some());
    assert_eq!(
        registry
            .row("engine_params:B", "count")
            .unwrap()
            .unwrap()
            .category,
        "B"
    );
    assert!(repo.stored("count", "B").unwrap().is_none());
}

#[test]
fn ensure_loaded_reads_once() {
    let repo = counting();
    let cache = counting_memory_cache(repo.clone());
    let mut params = ActiveParams::builder(Arc::new(FixedOwner::new("users")))
        .params(users_schema())
        .repository(repo.clone())
        .cache(cache.clone())
        .build()
        .unwrap();

    params.ensure_loaded().unwrap();
    params.ensure_loaded().unwrap();
    params.get("max_sessions").unwrap();

    assert_eq!(repo.finds(), 1);
    assert_eq!(cache.gets(), 1);
    assert_eq!(cache.sets(), 1);
}

#[test]
fn written_value_round_trips_after_reset() {
    let repo = counting();
    let registry = Arc::new(ParamRegistry::new());
    let build = || {
        ActiveParams::builder(Arc::new(FixedOwner::new("users")))
            .params(users_schema())
            .repository(repo.clone())
            .registry(registry.clone())
            .build()
            .unwrap()
    };

    let mut first = build();
    first.set("welcome_text", "hi there").unwrap();
    first.set("registrations_open", false).unwrap();
    first.set("launch_date", "2024-03-01").unwrap();
    first.notify_reloaded().unwrap();

    let mut second = build();
    assert_eq!(second.get("welcome_text").unwrap(), ParamValue::from("hi there"));
    assert_eq!(second.get("registrations_open").unwrap(), ParamValue::Boolean(false));
    assert_eq!(
        second.get("launch_date").unwrap().to_string(),
        "2024-03-01"
    );

    // The reloaded store itself sees the same values
    assert_eq!(first.get("welcome_text").unwrap(), ParamValue::from("hi there"));
}

#[test]
fn equal_value_is_not_written() {
    let repo = counting();
    repo.insert(&seeded_row("count", "users", "5")).unwrap();
    repo.reset_counts();

    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        count_schema(),
        ParamsConfig::default(),
        repo.clone(),
    )
    .unwrap();

    params.set("count", 5).unwrap();
    params.set("count", "5").unwrap();
    assert_eq!(repo.writes(), 0);

    let stored = repo.stored("count", "users").unwrap().unwrap();
    assert_eq!(stored.updated_at, 100);

    params.set("count", 6).unwrap();
    assert_eq!(repo.updates(), 1);
    assert_eq!(repo.inserts(), 0);
    let stored = repo.stored("count", "users").unwrap().unwrap();
    assert_eq!(stored.created_at, 100);
    assert!(stored.updated_at >= 100);
}

#[test]
fn lazy_creation_uses_type_defaults_without_insert() {
    let repo = counting();
    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        users_schema(),
        ParamsConfig::default(),
        repo.clone(),
    )
    .unwrap();

    assert_eq!(params.get("welcome_text").unwrap(), ParamValue::from(""));
    assert_eq!(params.get("registrations_open").unwrap(), ParamValue::Boolean(true));
    assert_eq!(params.get("max_sessions").unwrap(), ParamValue::Number(3.0));
    assert_eq!(params.get("launch_date").unwrap().to_string(), "1970-01-01");
    assert_eq!(repo.inserts(), 0);

    params.set("max_sessions", 4).unwrap();
    assert_eq!(repo.inserts(), 1);
    assert_eq!(repo.updates(), 0);

    params.set("max_sessions", 8).unwrap();
    assert_eq!(repo.inserts(), 1);
    assert_eq!(repo.updates(), 1);
}

#[test]
fn missing_row_without_persistence_is_unexpected() {
    let repo = counting();
    let config = ParamsConfig::default().with_persistence(false);
    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        count_schema(),
        config.clone(),
        repo.clone(),
    )
    .unwrap();

    assert_unexpected_value(&params.get("count"));
    assert_unexpected_value(&params.get("v1"));
    assert_unexpected_value(&params.active_count());
    assert_eq!(repo.inserts(), 0);

    // A stored row satisfies the declaration
    repo.insert(&seeded_row("count", "other", "2")).unwrap();
    let mut params = store(
        Arc::new(FixedOwner::new("other")),
        count_schema(),
        config,
        repo.clone(),
    )
    .unwrap();
    assert_eq!(params.get("count").unwrap(), ParamValue::Number(2.0));
}

#[test]
fn read_only_params_reject_writes() {
    let repo = counting();
    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        users_schema(),
        ParamsConfig::default(),
        repo.clone(),
    )
    .unwrap();

    assert_read_only(&params.set("motd", "changed"));
    assert_read_only(&params.set("version", "3.0.0"));
    assert_eq!(params.get("motd").unwrap(), ParamValue::from("hello"));
    assert_eq!(repo.writes(), 0);
    assert!(!params.is_dirty());
}

// ============================================================================
// SHARED CACHE
// ============================================================================

#[test]
fn write_by_another_store_invalidates_shared_cache() {
    let repo = counting();
    repo.insert(&seeded_row("count", "users", "1")).unwrap();
    let cache = counting_memory_cache(repo.clone());

    let build = || {
        ActiveParams::builder(Arc::new(FixedOwner::new("users")))
            .params(count_schema())
            .repository(repo.clone())
            .cache(cache.clone())
            .build()
            .unwrap()
    };

    let mut first = build();
    assert_eq!(first.get("count").unwrap(), ParamValue::Number(1.0));
    assert_eq!(repo.finds(), 1);

    let mut second = build();
    assert_eq!(second.get("count").unwrap(), ParamValue::Number(1.0));
    assert_eq!(cache.hits(), 1);
    assert_eq!(repo.finds(), 1);

    second.set("count", 9).unwrap();

    let mut third = build();
    assert_eq!(third.get("count").unwrap(), ParamValue::Number(9.0));
    assert_eq!(cache.hits(), 1);
    assert_eq!(repo.finds(), 2);
}

#[test]
fn cache_failures_fall_back_to_storage() {
    let repo = counting();
    repo.insert(&seeded_row("count", "users", "7")).unwrap();
    let cache = Arc::new(CountingCache::failing());

    let mut params = ActiveParams::builder(Arc::new(FixedOwner::new("users")))
        .params(count_schema())
        .repository(repo.clone())
        .cache(cache.clone())
        .build()
        .unwrap();

    assert_eq!(params.get("count").unwrap(), ParamValue::Number(7.0));
    assert_eq!(cache.gets(), 1);
    assert_eq!(cache.sets(), 1);
    assert_eq!(repo.finds(), 1);
}

#[test]
fn disabled_caching_skips_cache_client() {
    let repo = counting();
    let cache = counting_memory_cache(repo.clone());

    let mut params = ActiveParams::builder(Arc::new(FixedOwner::new("users")))
        .params(count_schema())
        .config(ParamsConfig::default().with_caching(false))
        .repository(repo.clone())
        .cache(cache.clone())
        .build()
        .unwrap();

    params.get("count").unwrap();
    assert_eq!(cache.gets(), 0);
    assert_eq!(cache.sets(), 0);
    assert_eq!(repo.watermark_reads(), 0);
    assert_eq!(repo.finds(), 1);
}

// ============================================================================
// OWNER LIFECYCLE
// ============================================================================

#[test]
fn owner_deletion_empties_storage() {
    let repo = counting();
    repo.insert(&seeded_row("count", "users", "4")).unwrap();
    repo.insert(&seeded_row("count", "other", "1")).unwrap();
    let cache = counting_memory_cache(repo.clone());

    let build = || {
        ActiveParams::builder(Arc::new(FixedOwner::new("users")))
            .params(count_schema())
            .repository(repo.clone())
            .cache(cache.clone())
            .build()
            .unwrap()
    };

    let mut params = build();
    assert_eq!(params.get("count").unwrap(), ParamValue::Number(4.0));

    assert_eq!(params.notify_deleted().unwrap(), 1);
    assert!(!params.is_loaded());
    assert!(repo.stored("count", "users").unwrap().is_none());
    assert!(repo.stored("count", "other").unwrap().is_some());

    // The delete moved the watermark, so the cached rows are stale
    let mut fresh = build();
    assert_eq!(fresh.get("count").unwrap(), ParamValue::Number(0.0));
    assert_eq!(cache.hits(), 0);
}

#[test]
fn same_store_reloads_empty_after_deletion() {
    let repo = counting();
    repo.insert(&seeded_row("count", "users", "4")).unwrap();
    repo.reset_counts();

    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        count_schema(),
        ParamsConfig::default(),
        repo.clone(),
    )
    .unwrap();
    assert_eq!(params.get("count").unwrap(), ParamValue::Number(4.0));

    assert_eq!(params.notify_deleted().unwrap(), 1);
    assert!(params.is_dirty());
    params.notify_reloaded().unwrap();

    assert_eq!(params.get("count").unwrap(), ParamValue::Number(0.0));
    assert_eq!(repo.finds(), 2);

    params.set("count", 7).unwrap();
    assert_eq!(repo.inserts(), 1);
    assert_eq!(repo.updates(), 0);
    assert_eq!(
        repo.stored("count", "users").unwrap().unwrap().value.as_deref(),
        Some("7")
    );
}

#[test]
fn deletion_failure_is_a_storage_error() {
    let repo = counting();
    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        count_schema(),
        ParamsConfig::default(),
        repo.clone(),
    )
    .unwrap();

    repo.set_fail_writes(true);
    let err = params.notify_deleted().unwrap_err();
    assert!(matches!(err, ParamError::Storage(StorageError::DeleteFailed { .. })));
}

#[test]
fn blank_identity_on_reload_is_rejected() {
    let owner = Arc::new(TestOwner::new("A"));
    let mut params = store(
        owner.clone(),
        count_schema(),
        ParamsConfig::default(),
        counting(),
    )
    .unwrap();

    owner.set_id("");
    let err = params.notify_reloaded().unwrap_err();
    assert!(matches!(err, ParamError::Configuration(_)));
}

#[test]
fn reload_without_write_keeps_registry_rows() {
    let repo = counting();
    let registry = Arc::new(ParamRegistry::new());
    let mut params = ActiveParams::builder(Arc::new(FixedOwner::new("users")))
        .params(count_schema())
        .repository(repo.clone())
        .registry(registry.clone())
        .build()
        .unwrap();

    params.get("count").unwrap();
    params.reload().unwrap();
    params.get("count").unwrap();

    assert!(registry.has_rows("engine_params:users").unwrap());
    assert_eq!(repo.finds(), 1);
}

// ============================================================================
// EAGER LOADING AND PERSISTENCE
// ============================================================================

#[test]
fn eager_loading_loads_at_build() {
    let repo = counting();
    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        count_schema(),
        ParamsConfig::default().with_lazy_loading(false),
        repo.clone(),
    )
    .unwrap();

    assert!(params.is_loaded());
    assert_eq!(repo.finds(), 1);
    assert_eq!(repo.inserts(), 0);

    params.get("count").unwrap();
    assert_eq!(repo.finds(), 1);
}

#[test]
fn eager_persistence_inserts_on_load() {
    let repo = counting();
    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        count_schema(),
        ParamsConfig::default().with_lazy_persistence(false),
        repo.clone(),
    )
    .unwrap();

    assert_eq!(params.get("count").unwrap(), ParamValue::Number(0.0));
    assert_eq!(repo.inserts(), 1);
    assert!(params.is_dirty());
    assert_eq!(
        repo.stored("count", "users").unwrap().unwrap().value.as_deref(),
        Some("0")
    );

    params.set("count", 2).unwrap();
    assert_eq!(repo.inserts(), 1);
    assert_eq!(repo.updates(), 1);
}

#[test]
fn per_param_lazy_persistence_opt_out() {
    let repo = counting();
    let schema = Schema::new()
        .with_active("lazy", ActiveDescriptor::new(ValueType::Number))
        .with_active(
            "eager",
            ActiveDescriptor::new(ValueType::String)
                .with_default("on")
                .with_lazy_persistence(false),
        );
    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        schema,
        ParamsConfig::default(),
        repo.clone(),
    )
    .unwrap();

    params.ensure_loaded().unwrap();
    assert_eq!(repo.inserts(), 1);
    assert!(repo.stored("eager", "users").unwrap().is_some());
    assert!(repo.stored("lazy", "users").unwrap().is_none());
}

// ============================================================================
// SCHEMA
// ============================================================================

#[test]
fn owner_params_override_builder_params() {
    let owner = FixedOwner::new("users").with_params(
        Schema::new()
            .with_static("v1", "owner")
            .with_static("extra", true),
    );
    let mut params = store(
        Arc::new(owner),
        count_schema(),
        ParamsConfig::default(),
        counting(),
    )
    .unwrap();

    assert_eq!(params.get("v1").unwrap(), ParamValue::from("owner"));
    assert_eq!(params.get("extra").unwrap(), ParamValue::Boolean(true));
    assert!(params.has("count"));
    assert_eq!(params.keys().collect::<Vec<_>>(), vec!["count", "extra", "v1"]);
}

#[test]
fn schema_is_registered_per_identity() {
    let repo = counting();
    let registry = Arc::new(ParamRegistry::new());

    let _first = ActiveParams::builder(Arc::new(FixedOwner::new("users")))
        .params(count_schema())
        .repository(repo.clone())
        .registry(registry.clone())
        .build()
        .unwrap();

    // A second store for the same identity inherits the registered schema
    let mut second = ActiveParams::builder(Arc::new(FixedOwner::new("users")))
        .repository(repo.clone())
        .registry(registry.clone())
        .build()
        .unwrap();
    assert_eq!(second.schema(), &count_schema());
    assert_eq!(second.get("v1").unwrap(), ParamValue::from("v1"));

    // Another identity does not
    let other = ActiveParams::builder(Arc::new(FixedOwner::new("other")))
        .repository(repo)
        .registry(registry)
        .build()
        .unwrap();
    assert!(other.schema().is_empty());
}

#[test]
fn schema_carries_over_identity_change() {
    let registry = Arc::new(ParamRegistry::new());
    let owner = Arc::new(TestOwner::new("A"));
    let mut params = ActiveParams::builder(owner.clone())
        .params(count_schema())
        .repository(counting())
        .registry(registry.clone())
        .build()
        .unwrap();

    owner.set_id("B");
    params.notify_reloaded().unwrap();

    assert_eq!(params.schema(), &count_schema());
    assert_eq!(registry.schema("engine_params:B").unwrap(), Some(count_schema()));
    assert_eq!(params.get("v1").unwrap(), ParamValue::from("v1"));
}

#[test]
fn schema_from_toml_document() {
    let schema = Schema::from_toml_str(USERS_SCHEMA_TOML).unwrap();
    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        schema,
        ParamsConfig::default(),
        counting(),
    )
    .unwrap();

    assert_eq!(params.get("name").unwrap(), ParamValue::from("Users Management Module"));
    assert_eq!(params.get("registrations_open").unwrap(), ParamValue::Boolean(true));
    assert_read_only(&params.set("motd", "x"));
}

#[test]
fn schema_from_json_document() {
    let schema = Schema::from_json_str(
        r#"{"v1": "v1", "count": {"kind": "active", "type": "number", "value": "12"}}"#,
    )
    .unwrap();
    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        schema,
        ParamsConfig::default(),
        counting(),
    )
    .unwrap();
    assert_eq!(params.get("count").unwrap(), ParamValue::Number(12.0));
}

#[test]
fn untyped_active_param_uses_default_type() {
    let schema = Schema::new().with_active("flag", ActiveDescriptor::default());
    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        schema,
        ParamsConfig::default().with_default_type(ValueType::Boolean),
        counting(),
    )
    .unwrap();

    assert_eq!(params.get("flag").unwrap(), ParamValue::Boolean(false));
    params.set("flag", "yes").unwrap();
    assert_eq!(params.get("flag").unwrap(), ParamValue::Boolean(true));
}

#[test]
fn owner_without_params_loads_empty() {
    let repo = counting();
    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        Schema::new(),
        ParamsConfig::default(),
        repo.clone(),
    )
    .unwrap();

    assert!(params.to_array().unwrap().is_empty());
    assert_eq!(params.active_count().unwrap(), 0);
    assert_eq!(repo.finds(), 0);
}

// ============================================================================
// ERRORS
// ============================================================================

#[test]
fn invalid_values_are_rejected_without_write() {
    let repo = counting();
    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        users_schema(),
        ParamsConfig::default(),
        repo.clone(),
    )
    .unwrap();

    assert_validation_error(&params.set("max_sessions", "many"));
    assert_validation_error(&params.set("launch_date", "yesterday"));
    assert_validation_error(&params.set("registrations_open", 2));
    assert_eq!(repo.writes(), 0);
    assert!(!params.is_dirty());
}

#[test]
fn unknown_names_are_not_found() {
    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        count_schema(),
        ParamsConfig::default(),
        counting(),
    )
    .unwrap();

    assert_not_found(&params.get("missing"));
    assert_not_found(&params.set("missing", 1));
    let err = assert_err(params.param("missing"));
    assert!(err.to_string().contains("missing"));
    assert!(err.to_string().contains("'users'"));
}

#[test]
fn failed_write_surfaces_persistence_error() {
    let repo = counting();
    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        count_schema(),
        ParamsConfig::default(),
        repo.clone(),
    )
    .unwrap();

    repo.set_fail_writes(true);
    let result = params.set("count", 5);
    assert_persistence_error(&result);
    assert!(params.is_dirty());

    repo.set_fail_writes(false);
    assert_eq!(params.get("count").unwrap(), ParamValue::Number(0.0));
    params.set("count", 5).unwrap();
    assert_eq!(params.get("count").unwrap(), ParamValue::Number(5.0));
}

#[test]
fn concurrent_materialization_last_load_wins() {
    let repo = counting();
    let build = || {
        store(
            Arc::new(FixedOwner::new("users")),
            count_schema(),
            ParamsConfig::default(),
            repo.clone(),
        )
        .unwrap()
    };

    // Separate registries: both stores materialize the missing row
    let mut first = build();
    let mut second = build();
    assert_eq!(first.get("count").unwrap(), ParamValue::Number(0.0));
    assert_eq!(second.get("count").unwrap(), ParamValue::Number(0.0));

    first.set("count", 1).unwrap();
    assert_persistence_error(&second.set("count", 2));
    assert_eq!(
        repo.stored("count", "users").unwrap().unwrap().value.as_deref(),
        Some("1")
    );

    // The failed write dirtied the second store, so a reload picks up the stored row
    assert!(second.is_dirty());
    second.notify_reloaded().unwrap();
    assert_eq!(second.get("count").unwrap(), ParamValue::Number(1.0));
    second.set("count", 2).unwrap();
    assert_eq!(repo.updates(), 1);
}

#[test]
fn failed_insert_refreshes_shared_registry_on_reload() {
    let repo = counting();
    let registry = Arc::new(ParamRegistry::new());
    let build = || {
        ActiveParams::builder(Arc::new(FixedOwner::new("users")))
            .params(count_schema())
            .repository(repo.clone())
            .registry(registry.clone())
            .build()
            .unwrap()
    };

    let mut first = build();
    assert_eq!(first.get("count").unwrap(), ParamValue::Number(0.0));

    // Another process stores the row behind the materialized default
    repo.inner().insert(&seeded_row("count", "users", "9")).unwrap();

    assert_persistence_error(&first.set("count", 5));
    first.notify_reloaded().unwrap();
    assert!(!registry.has_rows("engine_params:users").unwrap());

    let mut second = build();
    assert_eq!(second.get("count").unwrap(), ParamValue::Number(9.0));
    second.set("count", 6).unwrap();
    assert_eq!(
        repo.stored("count", "users").unwrap().unwrap().value.as_deref(),
        Some("6")
    );
}

#[test]
fn garbage_in_storage_is_unexpected_value() {
    let repo = counting();
    repo.insert(&seeded_row("count", "users", "twelve")).unwrap();
    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        count_schema(),
        ParamsConfig::default(),
        repo,
    )
    .unwrap();

    assert_unexpected_value(&params.get("count"));
}

#[test]
fn invalid_declared_default_is_validation_error() {
    let schema = Schema::new().with_active(
        "count",
        ActiveDescriptor::new(ValueType::Number).with_default("lots"),
    );
    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        schema,
        ParamsConfig::default(),
        counting(),
    )
    .unwrap();

    assert_validation_error(&params.get("count"));
}

#[test]
fn blank_cache_key_prefix_fails_build() {
    let result = store(
        Arc::new(FixedOwner::new("users")),
        count_schema(),
        ParamsConfig::default().with_cache_key_prefix("  "),
        counting(),
    );
    assert!(matches!(result, Err(ParamError::Configuration(_))));
}

// ============================================================================
// VIEW
// ============================================================================

#[test]
fn counts_and_iteration_over_loaded_view() {
    let mut params = store(
        Arc::new(FixedOwner::new("users")),
        users_schema(),
        ParamsConfig::default(),
        counting(),
    )
    .unwrap();

    assert_eq!(params.active_count().unwrap(), 5);
    assert_eq!(params.static_count().unwrap(), 2);
    assert_eq!(params.safe_active_count().unwrap(), 4);

    let read_only: Vec<&str> = params
        .iter()
        .unwrap()
        .filter(|(_, param)| param.is_read_only())
        .map(|(name, _)| name)
        .collect();
    assert_eq!(read_only, vec!["motd", "name", "version"]);

    assert_eq!(params.to_array().unwrap().len(), 7);
    assert_eq!(params.param("motd").unwrap().name(), "motd");
}

struct PlaceholderFormatter;

impl ValueFormatter for PlaceholderFormatter {
    fn format(&self, raw: Option<&str>, value_type: ValueType) -> Result<ParamValue, ValidationError> {
        DefaultFormatter::new().format(raw, value_type)
    }

    fn type_default(&self, value_type: ValueType) -> String {
        match value_type {
            ValueType::String => "n/a".to_string(),
            other => DefaultFormatter::new().type_default(other),
        }
    }

    fn render(&self, value: &ParamValue, value_type: ValueType) -> Result<Option<String>, ValidationError> {
        DefaultFormatter::new().render(value, value_type)
    }
}

#[test]
fn custom_formatter_supplies_defaults() {
    let mut params = ActiveParams::builder(Arc::new(FixedOwner::new("users")))
        .params(users_schema())
        .repository(counting())
        .formatter(Arc::new(PlaceholderFormatter))
        .build()
        .unwrap();

    assert_eq!(params.get("welcome_text").unwrap(), ParamValue::from("n/a"));
    assert_eq!(params.get("max_sessions").unwrap(), ParamValue::Number(3.0));
}
