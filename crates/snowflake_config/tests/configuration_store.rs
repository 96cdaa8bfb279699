//! Collection store behavior against file-backed stores.

use serde::{Deserialize, Serialize};
use snowflake_config::{
    CollectionDescriptor, ConfigError, ConfigValue, ConfigurationCollectionStore, ConfigurationSchema,
    OptionDescriptor, SectionDescriptor, StoreConfig, ValueId,
};
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FullscreenResolution {
    Hello,
    World,
}

struct ExampleConfiguration;

impl ConfigurationSchema for ExampleConfiguration {
    fn descriptor() -> &'static CollectionDescriptor {
        static DESCRIPTOR: OnceLock<CollectionDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            CollectionDescriptor::new("example")
                .with_section(
                    SectionDescriptor::new("display", "Display Options")
                        .with_option(OptionDescriptor::selection(
                            "fullscreen_resolution",
                            &["hello", "world"],
                            "world",
                        ))
                        .with_option(OptionDescriptor::bool("fullscreen", true))
                        .with_option(OptionDescriptor::string("shader_path", "shaders/crt.glsl"))
                        .with_option(OptionDescriptor::float("scale", 1.5)),
                )
                .with_section(
                    SectionDescriptor::new("camera", "Camera Options")
                        .with_option(OptionDescriptor::bool("camera_allow", false).private())
                        .with_option(OptionDescriptor::string("camera_driver", "v4l2").with_unset("null")),
                )
        })
    }
}

struct OtherConfiguration;

impl ConfigurationSchema for OtherConfiguration {
    fn descriptor() -> &'static CollectionDescriptor {
        static DESCRIPTOR: OnceLock<CollectionDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            CollectionDescriptor::new("other").with_section(
                SectionDescriptor::new("pause", "Pause Options")
                    .with_option(OptionDescriptor::bool("pause_nonactive", true)),
            )
        })
    }
}

const WIDE_OPTIONS: usize = 40;

struct WideConfiguration;

impl ConfigurationSchema for WideConfiguration {
    fn descriptor() -> &'static CollectionDescriptor {
        static DESCRIPTOR: OnceLock<CollectionDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            let section = (0..WIDE_OPTIONS).fold(SectionDescriptor::new("wide", "Wide"), |section, n| {
                section.with_option(OptionDescriptor::integer(format!("opt_{}", n), n as i64))
            });
            CollectionDescriptor::new("wide").with_section(section)
        })
    }
}

struct SlashedConfiguration;

impl ConfigurationSchema for SlashedConfiguration {
    fn descriptor() -> &'static CollectionDescriptor {
        static DESCRIPTOR: OnceLock<CollectionDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            CollectionDescriptor::new("slashed")
                .with_section(
                    SectionDescriptor::new("a/b", "A/B").with_option(OptionDescriptor::integer("c", 1)),
                )
                .with_section(
                    SectionDescriptor::new("a", "A").with_option(OptionDescriptor::integer("b/c", 2)),
                )
        })
    }
}

/// Count of index records for `id` and of value records in the whole store,
/// after checking that every index record of `id` resolves.
async fn stored_pairs(
    store: &ConfigurationCollectionStore,
    id: snowflake_config::CollectionId,
) -> (usize, usize) {
    let index_keys = store.kv().list_keys(&format!("config/index/{}/", id)).await.unwrap();
    let value_ids: Vec<ValueId> = store.kv().get_many(&index_keys).await.unwrap();
    for value_id in &value_ids {
        assert!(
            store.get_value(*value_id).await.unwrap().is_some(),
            "index points at missing value {}",
            value_id
        );
    }
    let owned = store
        .kv()
        .list_keys("config/value/")
        .await
        .unwrap()
        .len();
    (index_keys.len(), owned)
}

async fn open_store(tmp: &TempDir) -> ConfigurationCollectionStore {
    ConfigurationCollectionStore::open(StoreConfig::sqlite(tmp.path().join("config.sqlite3")))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_unread_option_returns_default_and_persists_it() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let config = store
        .create_configuration::<ExampleConfiguration>("TestConfiguration")
        .await
        .unwrap();

    let display = config.section("display").unwrap();
    let resolution: FullscreenResolution = display.get("fullscreen_resolution").await.unwrap();
    assert_eq!(resolution, FullscreenResolution::World);
    let first = display.entry("fullscreen_resolution").await.unwrap();

    // An independent store over the same file sees the same materialized value.
    let other = open_store(&tmp).await;
    let reloaded = other
        .get_configuration::<ExampleConfiguration>(config.id())
        .await
        .unwrap()
        .unwrap();
    let second = reloaded
        .section("display")
        .unwrap()
        .entry("fullscreen_resolution")
        .await
        .unwrap();
    assert_eq!(second.value_id, first.value_id);
    assert_eq!(second.value, ConfigValue::Selection("world".into()));
    assert_eq!(other.list_values(config.id()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_get_unknown_collection_is_none() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let missing = store
        .get_configuration::<ExampleConfiguration>(snowflake_config::CollectionId::new())
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_update_then_get_sync_and_async_agree() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let config = store
        .create_configuration::<ExampleConfiguration>("TestConfiguration")
        .await
        .unwrap();
    let display = config.section("display").unwrap();
    assert_eq!(
        display.get::<FullscreenResolution>("fullscreen_resolution").await.unwrap(),
        FullscreenResolution::World
    );

    display
        .set("fullscreen_resolution", &FullscreenResolution::Hello)
        .await
        .unwrap();
    assert!(config.values().is_dirty());
    store.update_configuration(&config).await.unwrap();
    assert!(!config.values().is_dirty());

    let loaded_async = store
        .get_configuration::<ExampleConfiguration>(config.id())
        .await
        .unwrap()
        .unwrap();
    let loaded_sync = store
        .get_configuration_blocking::<ExampleConfiguration>(config.id())
        .unwrap()
        .unwrap();

    let via_async: FullscreenResolution = loaded_async
        .section("display")
        .unwrap()
        .get("fullscreen_resolution")
        .await
        .unwrap();
    let via_sync: FullscreenResolution = loaded_sync
        .section("display")
        .unwrap()
        .get_blocking("fullscreen_resolution")
        .unwrap();
    assert_eq!(via_async, FullscreenResolution::Hello);
    assert_eq!(via_sync, FullscreenResolution::Hello);
}

#[tokio::test]
async fn test_unsaved_change_is_visible_only_to_its_handle() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let config = store
        .create_configuration::<ExampleConfiguration>("TestConfiguration")
        .await
        .unwrap();
    let display = config.section("display").unwrap();
    display.set("fullscreen", &false).await.unwrap();

    assert!(!display.get::<bool>("fullscreen").await.unwrap());

    let other = store
        .get_configuration::<ExampleConfiguration>(config.id())
        .await
        .unwrap()
        .unwrap();
    assert!(other.section("display").unwrap().get::<bool>("fullscreen").await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_removes_collection_and_values() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let config = store
        .create_configuration::<ExampleConfiguration>("TestConfiguration")
        .await
        .unwrap();
    let entry = config.section("display").unwrap().entry("fullscreen").await.unwrap();
    assert!(store.get_value(entry.value_id).await.unwrap().is_some());

    store.delete_configuration(config.id()).await.unwrap();

    assert!(store
        .get_configuration::<ExampleConfiguration>(config.id())
        .await
        .unwrap()
        .is_none());
    assert!(store
        .get_configuration_blocking::<ExampleConfiguration>(config.id())
        .unwrap()
        .is_none());
    assert!(store.get_value(entry.value_id).await.unwrap().is_none());
    assert!(config.values().get(entry.value_id).await.unwrap().is_none());
    assert!(store.kv().list_keys("config/").await.unwrap().is_empty());

    // The stale handle cannot resurrect the collection, and forgets what it held.
    let err = config.section("display").unwrap().entry("scale").await.unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));
    assert!(config.values().entries().is_empty());
}

#[test]
fn test_delete_blocking_matches_async() {
    let tmp = TempDir::new().unwrap();
    let store =
        ConfigurationCollectionStore::open_blocking(StoreConfig::sqlite(tmp.path().join("config.sqlite3"))).unwrap();
    let config = store
        .create_configuration_blocking::<ExampleConfiguration>("TestConfiguration")
        .unwrap();
    let entry = config.section("camera").unwrap().entry_blocking("camera_driver").unwrap();

    store.delete_configuration_blocking(config.id()).unwrap();

    assert!(store
        .get_configuration_blocking::<ExampleConfiguration>(config.id())
        .unwrap()
        .is_none());
    assert!(store.get_value_blocking(entry.value_id).unwrap().is_none());
}

#[tokio::test]
async fn test_get_value_matches_typed_view_after_update() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let config = store
        .create_configuration::<ExampleConfiguration>("TestConfiguration")
        .await
        .unwrap();
    let display = config.section("display").unwrap();
    display.set("scale", &2).await.unwrap();
    display.set("shader_path", "shaders/sharp.glsl").await.unwrap();
    store.update_configuration(&config).await.unwrap();

    for option in ["scale", "shader_path"] {
        let entry = display.entry(option).await.unwrap();
        let direct = store.get_value(entry.value_id).await.unwrap().unwrap();
        assert_eq!(direct, entry);
        assert_eq!(config.values().get(entry.value_id).await.unwrap(), Some(direct));
    }
    assert_eq!(display.get::<f64>("scale").await.unwrap(), 2.0);
}

#[tokio::test]
async fn test_null_assignment_semantics() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let config = store
        .create_configuration::<ExampleConfiguration>("TestConfiguration")
        .await
        .unwrap();
    let display = config.section("display").unwrap();
    let camera = config.section("camera").unwrap();

    // Strings clear to their unset sentinel.
    display.unset("shader_path").await.unwrap();
    assert_eq!(display.get::<String>("shader_path").await.unwrap(), "");
    camera.set_nullable::<String>("camera_driver", None).await.unwrap();
    assert_eq!(camera.get::<String>("camera_driver").await.unwrap(), "null");

    // Other types keep their value.
    display.set("fullscreen", &false).await.unwrap();
    display.set("fullscreen", &Option::<bool>::None).await.unwrap();
    display.unset("fullscreen").await.unwrap();
    assert!(!display.get::<bool>("fullscreen").await.unwrap());

    store.update_configuration(&config).await.unwrap();
    let reloaded = store
        .get_configuration::<ExampleConfiguration>(config.id())
        .await
        .unwrap()
        .unwrap();
    let display = reloaded.section("display").unwrap();
    assert_eq!(display.get::<String>("shader_path").await.unwrap(), "");
    assert!(!display.get::<bool>("fullscreen").await.unwrap());
}

#[tokio::test]
async fn test_typed_access_rejects_wrong_types() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let config = store
        .create_configuration::<ExampleConfiguration>("TestConfiguration")
        .await
        .unwrap();
    let display = config.section("display").unwrap();

    assert!(display.set("fullscreen", "yes").await.unwrap_err().is_type_mismatch());
    assert!(display
        .set("fullscreen_resolution", "moon")
        .await
        .unwrap_err()
        .is_type_mismatch());
    assert!(display.get::<i64>("fullscreen").await.unwrap_err().is_type_mismatch());
    assert!(!config.values().is_dirty());

    assert!(matches!(
        display.get::<bool>("missing").await,
        Err(ConfigError::UnknownOption { .. })
    ));
    assert!(matches!(config.section("missing"), Err(ConfigError::UnknownSection(_))));
}

#[tokio::test]
async fn test_wrong_schema_is_type_mismatch() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let config = store
        .create_configuration::<ExampleConfiguration>("TestConfiguration")
        .await
        .unwrap();

    let err = store
        .get_configuration::<OtherConfiguration>(config.id())
        .await
        .unwrap_err();
    assert!(err.is_type_mismatch());
}

#[tokio::test]
async fn test_value_collection_set_by_id() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let config = store
        .create_configuration::<ExampleConfiguration>("TestConfiguration")
        .await
        .unwrap();
    let other = store
        .create_configuration::<ExampleConfiguration>("Other")
        .await
        .unwrap();
    let entry = config.section("display").unwrap().entry("fullscreen").await.unwrap();

    let changed = config
        .values()
        .set(entry.value_id, ConfigValue::Bool(false))
        .await
        .unwrap();
    assert_eq!(changed.value, ConfigValue::Bool(false));
    assert!(config
        .values()
        .set(entry.value_id, ConfigValue::Integer(3))
        .await
        .unwrap_err()
        .is_type_mismatch());

    // Unknown and foreign ids are not found.
    assert!(matches!(
        config.values().set(ValueId::new(), ConfigValue::Bool(true)).await,
        Err(ConfigError::NotFound(_))
    ));
    assert!(matches!(
        other.values().set(entry.value_id, ConfigValue::Bool(true)).await,
        Err(ConfigError::NotFound(_))
    ));
    assert!(other.values().get(entry.value_id).await.unwrap().is_none());

    store.update_configuration(&config).await.unwrap();
    assert_eq!(
        store.get_value(entry.value_id).await.unwrap().unwrap().value,
        ConfigValue::Bool(false)
    );
}

#[tokio::test]
async fn test_set_value_and_owning_collection() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let config = store
        .create_configuration::<ExampleConfiguration>("TestConfiguration")
        .await
        .unwrap();
    let entry = config.section("camera").unwrap().entry("camera_allow").await.unwrap();

    assert_eq!(
        store.get_owning_collection(entry.value_id).await.unwrap(),
        Some(config.id())
    );
    assert_eq!(store.get_owning_collection(ValueId::new()).await.unwrap(), None);

    store
        .set_value(entry.value_id, ConfigValue::Bool(true))
        .await
        .unwrap()
        .unwrap();
    assert!(config.section("camera").unwrap().get::<bool>("camera_allow").await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_access_materializes_once() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let config = store
        .create_configuration::<ExampleConfiguration>("TestConfiguration")
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let id = config.id();
        handles.push(tokio::spawn(async move {
            let loaded = store
                .get_configuration::<ExampleConfiguration>(id)
                .await
                .unwrap()
                .unwrap();
            loaded.section("display").unwrap().entry("fullscreen").await.unwrap().value_id
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap());
    }
    assert_eq!(ids.len(), 1);
    assert_eq!(store.list_values(config.id()).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_and_async_forms_interleave() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let config = Arc::new(
        store
            .create_configuration::<ExampleConfiguration>("TestConfiguration")
            .await
            .unwrap(),
    );

    let blocking = {
        let config = Arc::clone(&config);
        tokio::task::spawn_blocking(move || {
            let display = config.section("display").unwrap();
            display.set_blocking("scale", &3.25).unwrap();
            display.get_blocking::<f64>("scale").unwrap()
        })
    };
    assert_eq!(blocking.await.unwrap(), 3.25);

    store.update_configuration(&config).await.unwrap();
    assert_eq!(
        config.section("display").unwrap().get::<f64>("scale").await.unwrap(),
        3.25
    );
}

#[tokio::test]
async fn test_list_configurations() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let first = store
        .create_configuration::<ExampleConfiguration>("First")
        .await
        .unwrap();
    let second = store.create_configuration::<OtherConfiguration>("Second").await.unwrap();

    let listed = store.list_configurations().await.unwrap();
    let ids: Vec<_> = listed.iter().map(|r| r.collection_id).collect();
    assert_eq!(listed.len(), 2);
    assert!(ids.contains(&first.id()));
    assert!(ids.contains(&second.id()));

    store.delete_configuration(first.id()).await.unwrap();
    let listed = store.list_configurations().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].schema_name, "other");
}

#[tokio::test]
async fn test_non_finite_floats_are_refused_everywhere() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let config = store
        .create_configuration::<ExampleConfiguration>("TestConfiguration")
        .await
        .unwrap();
    let display = config.section("display").unwrap();
    let entry = display.entry("scale").await.unwrap();

    assert!(display.set("scale", &f64::NAN).await.unwrap_err().is_type_mismatch());
    assert!(config
        .values()
        .set(entry.value_id, ConfigValue::Float(f64::INFINITY))
        .await
        .unwrap_err()
        .is_type_mismatch());
    assert!(!config.values().is_dirty());

    let err = store
        .set_value(entry.value_id, ConfigValue::Float(f64::NAN))
        .await
        .unwrap_err();
    assert!(err.is_type_mismatch());

    let stored = store.get_value(entry.value_id).await.unwrap().unwrap();
    assert_eq!(stored.value, ConfigValue::Float(1.5));
    assert_eq!(display.get::<f64>("scale").await.unwrap(), 1.5);
}

#[tokio::test]
async fn test_names_containing_slashes_stay_distinct() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let config = store
        .create_configuration::<SlashedConfiguration>("Slashed")
        .await
        .unwrap();

    let first = config.section("a/b").unwrap().entry("c").await.unwrap();
    let second = config.section("a").unwrap().entry("b/c").await.unwrap();
    assert_ne!(first.value_id, second.value_id);

    let reloaded = store
        .get_configuration::<SlashedConfiguration>(config.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.section("a/b").unwrap().get::<i64>("c").await.unwrap(), 1);
    assert_eq!(reloaded.section("a").unwrap().get::<i64>("b/c").await.unwrap(), 2);
    assert_eq!(store.list_values(config.id()).await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_delete_racing_first_access_leaves_nothing_behind() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    for round in 0..20u64 {
        let config = Arc::new(
            store
                .create_configuration::<WideConfiguration>("Wide")
                .await
                .unwrap(),
        );
        let reader = {
            let config = Arc::clone(&config);
            tokio::spawn(async move {
                let wide = config.section("wide").unwrap();
                let mut seen = Vec::new();
                for n in 0..WIDE_OPTIONS {
                    match wide.entry(&format!("opt_{}", n)).await {
                        Ok(entry) => seen.push(entry.value_id),
                        Err(ConfigError::NotFound(_)) => break,
                        Err(err) => panic!("unexpected error: {err}"),
                    }
                }
                seen
            })
        };

        tokio::time::sleep(Duration::from_micros(round * 150)).await;
        store.delete_configuration(config.id()).await.unwrap();
        let seen = reader.await.unwrap();

        assert!(store
            .get_configuration::<WideConfiguration>(config.id())
            .await
            .unwrap()
            .is_none());
        for value_id in seen {
            assert!(store.get_value(value_id).await.unwrap().is_none());
        }
        assert_eq!(stored_pairs(&store, config.id()).await, (0, 0));
    }
    assert!(store.kv().list_keys("config/").await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_first_access_writes_both_records_or_neither() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let config = store
        .create_configuration::<WideConfiguration>("Wide")
        .await
        .unwrap();
    let wide = config.section("wide").unwrap();

    for n in 0..WIDE_OPTIONS {
        let budget = Duration::from_micros((n as u64 % 8) * 100);
        let option = format!("opt_{}", n);
        let _ = tokio::time::timeout(budget, wide.entry(&option)).await;

        let (indexed, values) = stored_pairs(&store, config.id()).await;
        assert_eq!(indexed, values, "after cancelling {}", option);
    }

    // Whatever was cancelled is materialized cleanly on the next read.
    for n in 0..WIDE_OPTIONS {
        assert_eq!(wide.get::<i64>(&format!("opt_{}", n)).await.unwrap(), n as i64);
    }
    assert_eq!(stored_pairs(&store, config.id()).await, (WIDE_OPTIONS, WIDE_OPTIONS));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_update_is_all_or_nothing() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let config = store
        .create_configuration::<WideConfiguration>("Wide")
        .await
        .unwrap();
    let wide = config.section("wide").unwrap();

    for attempt in 0..8u64 {
        for n in 0..WIDE_OPTIONS {
            wide.set(&format!("opt_{}", n), &(100 + n as i64)).await.unwrap();
        }
        let _ = tokio::time::timeout(
            Duration::from_micros(attempt * 100),
            store.update_configuration(&config),
        )
        .await;

        let stored: HashSet<bool> = store
            .list_values(config.id())
            .await
            .unwrap()
            .into_iter()
            .map(|entry| matches!(entry.value, ConfigValue::Integer(v) if v >= 100))
            .collect();
        assert_eq!(stored.len(), 1, "update {} was applied partially", attempt);
    }

    store.update_configuration(&config).await.unwrap();
    assert!(!config.values().is_dirty());
    let fresh = store
        .get_configuration::<WideConfiguration>(config.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fresh.section("wide").unwrap().get::<i64>("opt_7").await.unwrap(), 107);
}
