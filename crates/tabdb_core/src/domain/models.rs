use super::{check_id, read_members};
use crate::error::{CoreError, CoreResult};
use crate::path::DocPath;
use crate::store::Store;
use serde::de::DeserializeOwned;
use serde::Serialize;

const LIST: [&str; 2] = ["aiModels", "list"];
const DEFAULT: [&str; 2] = ["aiModels", "default"];

/// AI model configurations under `aiModels.list.<id>`, with the default
/// model id at `aiModels.default`.
#[derive(Debug, Clone, Copy)]
pub struct AiModels<'a> {
    store: &'a Store,
}

impl<'a> AiModels<'a> {
    pub(super) fn new(store: &'a Store) -> Self {
        Self { store }
    }

    fn path(id: &str) -> CoreResult<DocPath> {
        Ok(DocPath::from(LIST).child(check_id("model", id)?))
    }

    /// Creates or replaces a model configuration.
    pub async fn save<T: Serialize>(&self, id: &str, model: T) -> CoreResult<()> {
        self.store.set_path(Self::path(id)?, model).await
    }

    /// Reads a model configuration.
    pub async fn get<T: DeserializeOwned>(&self, id: &str) -> CoreResult<Option<T>> {
        self.store.get_path(Self::path(id)?).await
    }

    /// Returns every model configuration, sorted by id.
    pub async fn list<T: DeserializeOwned>(&self) -> CoreResult<Vec<(String, T)>> {
        read_members(self.store, DocPath::from(LIST)).await
    }

    /// Deletes a model configuration, clearing the default if it pointed at
    /// it. Returns true if the model existed.
    pub async fn delete(&self, id: &str) -> CoreResult<bool> {
        let path = Self::path(id)?;
        let existed = self.store.get_value(path.clone()).await?.is_some();
        self.store.delete_path(path).await?;

        if self.default_id().await?.as_deref() == Some(id) {
            self.store.set_path(DEFAULT, None::<String>).await?;
        }
        Ok(existed)
    }

    /// Sets or clears the default model.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if no model with that id has
    /// been saved.
    pub async fn set_default(&self, id: Option<&str>) -> CoreResult<()> {
        if let Some(id) = id {
            if self.store.get_value(Self::path(id)?).await?.is_none() {
                return Err(CoreError::invalid_operation(format!("unknown model {id:?}")));
            }
        }
        self.store.set_path(DEFAULT, id).await
    }

    /// Returns the default model id.
    pub async fn default_id(&self) -> CoreResult<Option<String>> {
        self.store.get_path(DEFAULT).await
    }

    /// Returns the default model's configuration.
    pub async fn default_model<T: DeserializeOwned>(&self) -> CoreResult<Option<T>> {
        match self.default_id().await? {
            Some(id) => self.get(&id).await,
            None => Ok(None),
        }
    }
}
