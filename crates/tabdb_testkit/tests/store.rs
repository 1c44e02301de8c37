//! Facade behavior: reads, writes, deletes, loading and recovery.

use serde_json::json;
use std::sync::Arc;
use tabdb_core::{ChangeEvent, ChangeSource, CoreError, Store};
use tabdb_storage::InMemoryEngine;
use tabdb_testkit::prelude::*;

#[tokio::test]
async fn read_your_writes_before_flush() {
    let harness = TestStore::with_config(quiet_config()).await;
    let project = json!({"id": "p1", "name": "Foo"});

    harness.set_path("projects.list.p1", &project).await.unwrap();

    assert_eq!(harness.get_value("projects.list.p1").await.unwrap(), Some(project));
    assert_eq!(
        harness.get_path::<String>("projects.list.p1.name").await.unwrap().as_deref(),
        Some("Foo")
    );
    // Nothing has been written yet beyond the initial document
    let persisted = harness.persisted_root().unwrap();
    assert!(persisted["projects"]["list"].get("p1").is_none());
}

#[tokio::test]
async fn flushed_value_survives_a_fresh_instance() {
    let harness = TestStore::memory().await;
    let project = json!({"id": "p1", "name": "Foo"});
    harness.set_path("projects.list.p1", &project).await.unwrap();
    harness.flush().await.unwrap();

    let fresh = TestStore::over(harness.engine.clone(), fast_config()).await;
    assert_eq!(fresh.get_value("projects.list.p1").await.unwrap(), Some(project));
}

#[tokio::test]
async fn deleting_active_project_notifies_ancestor_once() {
    let harness = TestStore::memory().await;
    harness.set_path("projects.active", "p1").await.unwrap();

    let events = Arc::new(parking_lot::Mutex::new(Vec::<ChangeEvent>::new()));
    let sink = Arc::clone(&events);
    let _sub = harness.subscribe("projects", move |e| sink.lock().push(e.clone()));

    harness.delete_path("projects.active").await.unwrap();

    assert_eq!(harness.get_path::<String>("projects.active").await.unwrap(), None);
    let events = events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].path.joined(), "projects");
    assert_eq!(events[0].value, None);
    assert_eq!(events[0].previous_value, Some(json!("p1")));
    assert_eq!(events[0].source, ChangeSource::Local);
}

#[tokio::test]
async fn panicking_handler_does_not_block_ancestors() {
    let harness = TestStore::memory().await;
    let seen = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));

    let _exact = harness.subscribe("projects.list.p1", |_| panic!("handler failure"));
    let sink = Arc::clone(&seen);
    let _parent = harness.subscribe("projects.list", move |e| sink.lock().push(e.path.joined()));
    let sink = Arc::clone(&seen);
    let _all = harness.subscribe_all(move |e| sink.lock().push(format!("*{}", e.path.joined())));

    harness.set_path("projects.list.p1", json!({"id": "p1"})).await.unwrap();

    assert_eq!(
        *seen.lock(),
        vec!["projects.list".to_string(), "*projects.list.p1".to_string()]
    );
    assert_eq!(harness.stats().handler_panics, 1);
    assert_eq!(harness.get_value("projects.list.p1.id").await.unwrap(), Some(json!("p1")));
}

#[tokio::test]
async fn unsubscribed_handler_is_not_called() {
    let harness = TestStore::memory().await;
    let calls = Arc::new(parking_lot::Mutex::new(0));
    let counter = Arc::clone(&calls);
    let sub = harness.subscribe("a", move |_| *counter.lock() += 1);

    harness.set_path("a", 1).await.unwrap();
    sub.unsubscribe();
    harness.set_path("a", 2).await.unwrap();

    assert_eq!(*calls.lock(), 1);
}

#[tokio::test]
async fn array_segments_address_elements() {
    let harness = TestStore::memory().await;
    harness.set_path("projects.recent", vec!["a", "b"]).await.unwrap();
    harness.set_path("projects.recent.3", "d").await.unwrap();

    assert_eq!(
        harness.get_value("projects.recent").await.unwrap(),
        Some(json!(["a", "b", null, "d"]))
    );
    assert_eq!(harness.get_value("projects.recent.x").await.unwrap(), None);
}

#[tokio::test]
async fn out_of_range_index_is_stored_as_key() {
    let harness = TestStore::with_config(quiet_config()).await;
    harness.set_path("projects.recent", vec!["a", "b"]).await.unwrap();

    harness
        .set_path("projects.recent.18446744073709551615", "x")
        .await
        .unwrap();
    harness.set_path("projects.recent.99999999999", "y").await.unwrap();

    assert_eq!(
        harness
            .get_path::<String>("projects.recent.18446744073709551615")
            .await
            .unwrap()
            .as_deref(),
        Some("x")
    );
    assert_eq!(
        harness.get_path::<String>("projects.recent.99999999999").await.unwrap().as_deref(),
        Some("y")
    );
}

#[tokio::test]
async fn typed_read_of_wrong_shape_is_serialization_error() {
    let harness = TestStore::memory().await;
    harness.set_path("count", "not a number").await.unwrap();

    let err = harness.get_path::<u32>("count").await.unwrap_err();
    assert!(matches!(err, CoreError::Serialization { .. }));
}

#[tokio::test]
async fn corrupt_document_is_replaced_by_default() {
    let memory = InMemoryEngine::new();
    memory.seed("tabdb", "app_state", "root", json!("garbage"));
    let harness = TestStore::over(FlakyEngine::memory(memory), fast_config()).await;

    assert_eq!(
        harness.get_path::<String>("preferences.theme").await.unwrap().as_deref(),
        Some("light")
    );
    assert!(harness.persisted_root().unwrap().is_object());
    assert_eq!(harness.stats().recoveries, 1);
}

#[tokio::test]
async fn newer_document_version_is_replaced_by_default() {
    let memory = InMemoryEngine::new();
    memory.seed("tabdb", "app_state", "root", json!({"version": 99, "custom": true}));
    let harness = TestStore::over(FlakyEngine::memory(memory), fast_config()).await;

    assert_eq!(harness.get_value("custom").await.unwrap(), None);
    assert_eq!(harness.get_value("version").await.unwrap(), Some(json!(1)));
}

#[tokio::test]
async fn existing_document_is_loaded_as_is() {
    let memory = InMemoryEngine::new();
    memory.seed("tabdb", "app_state", "root", json!({"custom": {"nested": 1}}));
    let harness = TestStore::over(FlakyEngine::memory(memory), fast_config()).await;

    assert_eq!(harness.get_value("custom.nested").await.unwrap(), Some(json!(1)));
    // Loading a valid document writes nothing
    assert_eq!(harness.engine.writes(), 0);
}

#[tokio::test]
async fn concurrent_first_use_opens_once() {
    let engine = FlakyEngine::new();
    let store = Store::new(Arc::new(engine.clone()), fast_config());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move { store.get_value("preferences").await }));
    }
    for task in tasks {
        assert!(task.await.unwrap().unwrap().is_some());
    }

    assert_eq!(engine.opens(), 1);
    // One default document, written once
    assert_eq!(engine.writes(), 1);
}

#[tokio::test]
async fn open_failure_surfaces_as_connection_error() {
    let engine = FlakyEngine::new();
    engine.fail_opens(10);

    let err = Store::open(Arc::new(engine), fast_config()).await.unwrap_err();
    assert!(err.is_connection());
}

#[tokio::test]
async fn transient_open_failure_is_retried() {
    let engine = FlakyEngine::new();
    engine.fail_opens(1);

    let store = Store::open(Arc::new(engine.clone()), fast_config()).await.unwrap();
    assert!(store.get_value("preferences").await.unwrap().is_some());
    assert_eq!(engine.opens(), 1);
}

#[tokio::test]
async fn file_backed_store_persists_across_instances() {
    let harness = TestStore::file().await;
    harness.preferences().set("theme", "dark").await.unwrap();
    harness.close().await.unwrap();

    let dir = harness.dir().unwrap();
    assert!(dir.join("tabdb.json").exists());

    let engine = tabdb_storage::FileEngine::open(dir).unwrap();
    let reopened = Store::open(Arc::new(engine), fast_config()).await.unwrap();
    assert_eq!(
        reopened.preferences().get::<String>("theme").await.unwrap().as_deref(),
        Some("dark")
    );
}

#[tokio::test]
async fn storage_info_describes_backend() {
    let harness = TestStore::with_config(quiet_config()).await;
    harness.set_path("x", 1).await.unwrap();

    let info = harness.storage_info().await.unwrap();
    assert_eq!(info.db_name, "tabdb");
    assert_eq!(info.store_name, "app_state");
    assert_eq!(info.keys, vec!["root".to_string()]);
    assert_eq!(info.key_count, 1);
    assert_eq!(info.pending_writes, 1);
    assert!(info.approximate_bytes > 0);
    assert!(info.connected);
}
