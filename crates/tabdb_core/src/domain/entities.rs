use super::{check_id, read_members};
use crate::error::CoreResult;
use crate::path::DocPath;
use crate::store::Store;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Entities of one project, stored under `entities.<project>.<id>`.
#[derive(Debug, Clone)]
pub struct Entities<'a> {
    store: &'a Store,
    project_id: String,
}

impl<'a> Entities<'a> {
    pub(super) fn new(store: &'a Store, project_id: &str) -> Self {
        Self {
            store,
            project_id: project_id.to_string(),
        }
    }

    /// The project these entities belong to.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn base(&self) -> CoreResult<DocPath> {
        let project = check_id("project", &self.project_id)?;
        Ok(DocPath::from(["entities", project]))
    }

    fn path(&self, id: &str) -> CoreResult<DocPath> {
        Ok(self.base()?.child(check_id("entity", id)?))
    }

    /// Creates or replaces an entity.
    pub async fn save<T: Serialize>(&self, id: &str, entity: T) -> CoreResult<()> {
        self.store.set_path(self.path(id)?, entity).await
    }

    /// Reads an entity.
    pub async fn get<T: DeserializeOwned>(&self, id: &str) -> CoreResult<Option<T>> {
        self.store.get_path(self.path(id)?).await
    }

    /// Returns every entity of the project, sorted by id.
    pub async fn list<T: DeserializeOwned>(&self) -> CoreResult<Vec<(String, T)>> {
        read_members(self.store, self.base()?).await
    }

    /// Deletes an entity. Returns true if it existed.
    pub async fn delete(&self, id: &str) -> CoreResult<bool> {
        let path = self.path(id)?;
        let existed = self.store.get_value(path.clone()).await?.is_some();
        self.store.delete_path(path).await?;
        Ok(existed)
    }
}
