use super::{check_id, read_members};
use crate::error::CoreResult;
use crate::path::DocPath;
use crate::store::Store;
use serde::de::DeserializeOwned;
use serde::Serialize;

const LIST: [&str; 2] = ["projects", "list"];
const ACTIVE: [&str; 2] = ["projects", "active"];
const RECENT: [&str; 2] = ["projects", "recent"];

/// Projects stored under `projects.list.<id>`.
///
/// Saving or activating a project moves it to the front of
/// `projects.recent`, which is capped at the configured limit.
#[derive(Debug, Clone, Copy)]
pub struct Projects<'a> {
    store: &'a Store,
}

impl<'a> Projects<'a> {
    pub(super) fn new(store: &'a Store) -> Self {
        Self { store }
    }

    fn path(id: &str) -> DocPath {
        DocPath::from(LIST).child(id)
    }

    /// Creates or replaces a project.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidOperation`] for an empty id or one
    /// containing `.`.
    pub async fn save<T: Serialize>(&self, id: &str, project: T) -> CoreResult<()> {
        let id = check_id("project", id)?;
        self.store.set_path(Self::path(id), project).await?;
        self.touch_recent(id).await
    }

    /// Reads a project.
    pub async fn get<T: DeserializeOwned>(&self, id: &str) -> CoreResult<Option<T>> {
        let id = check_id("project", id)?;
        self.store.get_path(Self::path(id)).await
    }

    /// Returns every project, sorted by id.
    pub async fn list<T: DeserializeOwned>(&self) -> CoreResult<Vec<(String, T)>> {
        read_members(self.store, DocPath::from(LIST)).await
    }

    /// Returns true if the project exists.
    pub async fn exists(&self, id: &str) -> CoreResult<bool> {
        let id = check_id("project", id)?;
        Ok(self.store.get_value(Self::path(id)).await?.is_some())
    }

    /// Deletes a project together with its entities, its place in the
    /// recent list and, if it is active, the active marker. Returns true if
    /// the project existed.
    pub async fn delete(&self, id: &str) -> CoreResult<bool> {
        let id = check_id("project", id)?;
        let existed = self.exists(id).await?;

        self.store.delete_path(Self::path(id)).await?;
        self.store.delete_path(DocPath::from(["entities", id])).await?;

        let mut recent = self.recent().await?;
        if recent.iter().any(|r| r == id) {
            recent.retain(|r| r != id);
            self.store.set_path(RECENT, recent).await?;
        }
        if self.active().await?.as_deref() == Some(id) {
            self.store.set_path(ACTIVE, None::<String>).await?;
        }
        Ok(existed)
    }

    /// Sets or clears the active project.
    pub async fn set_active(&self, id: Option<&str>) -> CoreResult<()> {
        match id {
            Some(id) => {
                let id = check_id("project", id)?;
                self.store.set_path(ACTIVE, id).await?;
                self.touch_recent(id).await
            }
            None => self.store.set_path(ACTIVE, None::<String>).await,
        }
    }

    /// Returns the active project id.
    pub async fn active(&self) -> CoreResult<Option<String>> {
        self.store.get_path(ACTIVE).await
    }

    /// Returns recently used project ids, most recent first.
    pub async fn recent(&self) -> CoreResult<Vec<String>> {
        Ok(self.store.get_path(RECENT).await?.unwrap_or_default())
    }

    async fn touch_recent(&self, id: &str) -> CoreResult<()> {
        let mut recent = self.recent().await?;
        if recent.first().map(String::as_str) == Some(id) {
            return Ok(());
        }
        recent.retain(|r| r != id);
        recent.insert(0, id.to_string());
        recent.truncate(self.store.config().recent_projects_limit.max(1));
        self.store.set_path(RECENT, recent).await
    }
}

#[cfg(test)]
mod tests {
    use crate::config::StoreConfig;
    use crate::store::Store;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;
    use tabdb_storage::InMemoryEngine;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Project {
        id: String,
        name: String,
    }

    fn project(id: &str) -> Project {
        Project {
            id: id.into(),
            name: format!("Project {id}"),
        }
    }

    async fn store(limit: usize) -> Store {
        let config = StoreConfig::default().with_recent_projects_limit(limit);
        Store::open(Arc::new(InMemoryEngine::new()), config).await.unwrap()
    }

    #[tokio::test]
    async fn save_get_list() {
        let store = store(10).await;
        let projects = store.projects();
        projects.save("b", project("b")).await.unwrap();
        projects.save("a", project("a")).await.unwrap();

        assert_eq!(projects.get::<Project>("a").await.unwrap(), Some(project("a")));
        let ids: Vec<String> = projects
            .list::<Project>()
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn recent_is_most_recent_first_and_bounded() {
        let store = store(3).await;
        let projects = store.projects();
        for id in ["p1", "p2", "p3", "p4"] {
            projects.save(id, project(id)).await.unwrap();
        }
        projects.set_active(Some("p2")).await.unwrap();

        assert_eq!(projects.recent().await.unwrap(), vec!["p2", "p4", "p3"]);
        assert_eq!(projects.active().await.unwrap().as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn delete_cleans_up_references() {
        let store = store(10).await;
        let projects = store.projects();
        projects.save("p1", project("p1")).await.unwrap();
        projects.save("p2", project("p2")).await.unwrap();
        projects.set_active(Some("p1")).await.unwrap();
        store.entities("p1").save("e1", "entity").await.unwrap();

        assert!(projects.delete("p1").await.unwrap());
        assert_eq!(projects.get::<Project>("p1").await.unwrap(), None);
        assert_eq!(projects.active().await.unwrap(), None);
        assert_eq!(projects.recent().await.unwrap(), vec!["p2"]);
        assert_eq!(store.get_value("entities.p1").await.unwrap(), None);

        assert!(!projects.delete("p1").await.unwrap());
    }

    #[tokio::test]
    async fn invalid_ids_are_rejected() {
        let store = store(10).await;
        assert!(store.projects().save("", project("x")).await.is_err());
        assert!(store.projects().save("a.b", project("x")).await.is_err());
    }
}
