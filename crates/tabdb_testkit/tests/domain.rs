//! Domain helpers working together over one store.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tabdb_core::CoreError;
use tabdb_testkit::prelude::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Project {
    id: String,
    name: String,
}

fn project(id: &str, name: &str) -> Project {
    Project {
        id: id.into(),
        name: name.into(),
    }
}

#[tokio::test]
async fn project_lifecycle_cascades_to_entities() {
    let harness = TestStore::memory().await;
    let projects = harness.projects();

    projects.save("p1", project("p1", "Foo")).await.unwrap();
    projects.save("p2", project("p2", "Bar")).await.unwrap();
    projects.set_active(Some("p1")).await.unwrap();

    let entities = harness.entities("p1");
    entities.save("e1", json!({"kind": "note"})).await.unwrap();
    entities.save("e2", json!({"kind": "task"})).await.unwrap();
    assert_eq!(entities.list::<serde_json::Value>().await.unwrap().len(), 2);

    assert!(projects.delete("p1").await.unwrap());

    assert_eq!(projects.active().await.unwrap(), None);
    assert!(entities.list::<serde_json::Value>().await.unwrap().is_empty());
    assert_eq!(projects.recent().await.unwrap(), vec!["p2".to_string()]);
    assert_eq!(
        projects.list::<Project>().await.unwrap(),
        vec![("p2".to_string(), project("p2", "Bar"))]
    );
}

#[tokio::test]
async fn domain_changes_persist_through_one_flush() {
    let harness = TestStore::with_config(quiet_config()).await;
    let before = harness.engine.writes();

    harness.projects().save("p1", project("p1", "Foo")).await.unwrap();
    harness.ai_models().save("m1", json!({"provider": "local"})).await.unwrap();
    harness.ai_models().set_default(Some("m1")).await.unwrap();
    harness.preferences().set("language", "fr").await.unwrap();
    harness.flush().await.unwrap();

    assert_eq!(harness.engine.writes(), before + 1);
    let fresh = TestStore::over(harness.engine.clone(), fast_config()).await;
    assert_eq!(
        fresh.projects().get::<Project>("p1").await.unwrap(),
        Some(project("p1", "Foo"))
    );
    assert_eq!(fresh.ai_models().default_id().await.unwrap().as_deref(), Some("m1"));
    assert_eq!(
        fresh.preferences().get::<String>("language").await.unwrap().as_deref(),
        Some("fr")
    );
}

#[tokio::test]
async fn dotted_ids_are_rejected() {
    let harness = TestStore::memory().await;

    let err = harness
        .projects()
        .save("a.b", project("a.b", "Dotted"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidOperation { .. }));
    assert!(harness.pending_writes().is_empty());
}
