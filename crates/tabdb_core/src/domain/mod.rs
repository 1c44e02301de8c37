//! Domain helpers.
//!
//! Thin views over [`Store`] for the application's data: projects, their
//! entities, AI model configurations and user preferences. Every helper is a
//! composition of path operations; none of them persists anything on its
//! own, so subscribers, synchronization and batching apply unchanged.

mod entities;
mod models;
mod preferences;
mod projects;

pub use entities::Entities;
pub use models::AiModels;
pub use preferences::Preferences;
pub use projects::Projects;

use crate::error::{CoreError, CoreResult};
use crate::path::DocPath;
use crate::store::Store;
use serde::de::DeserializeOwned;
use serde_json::Value;

impl Store {
    /// Project records, the active project and the recent list.
    pub fn projects(&self) -> Projects<'_> {
        Projects::new(self)
    }

    /// Entities of one project.
    pub fn entities<'a>(&'a self, project_id: &str) -> Entities<'a> {
        Entities::new(self, project_id)
    }

    /// AI model configurations and the default model.
    pub fn ai_models(&self) -> AiModels<'_> {
        AiModels::new(self)
    }

    /// User preferences.
    pub fn preferences(&self) -> Preferences<'_> {
        Preferences::new(self)
    }
}

/// Checks that `id` can be used as a single path segment.
fn check_id<'a>(kind: &str, id: &'a str) -> CoreResult<&'a str> {
    if id.is_empty() {
        return Err(CoreError::invalid_operation(format!("{kind} id must not be empty")));
    }
    if id.contains(crate::path::SEPARATOR) {
        return Err(CoreError::invalid_operation(format!(
            "{kind} id {id:?} must not contain '{}'",
            crate::path::SEPARATOR
        )));
    }
    Ok(id)
}

/// Reads every member of the object at `path`, sorted by key.
async fn read_members<T: DeserializeOwned>(store: &Store, path: DocPath) -> CoreResult<Vec<(String, T)>> {
    let Some(Value::Object(map)) = store.get_value(path).await? else {
        return Ok(Vec::new());
    };
    let mut members = Vec::with_capacity(map.len());
    for (key, value) in map {
        members.push((key, serde_json::from_value(value)?));
    }
    members.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(members)
}
