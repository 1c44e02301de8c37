use super::check_id;
use crate::document::default_preferences;
use crate::error::CoreResult;
use crate::path::DocPath;
use crate::store::Store;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

const ROOT: &str = "preferences";

/// User preferences, one key per setting under `preferences`.
#[derive(Debug, Clone, Copy)]
pub struct Preferences<'a> {
    store: &'a Store,
}

impl<'a> Preferences<'a> {
    pub(super) fn new(store: &'a Store) -> Self {
        Self { store }
    }

    fn path(key: &str) -> CoreResult<DocPath> {
        Ok(DocPath::parse(ROOT).child(check_id("preference", key)?))
    }

    /// Reads one preference.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> CoreResult<Option<T>> {
        self.store.get_path(Self::path(key)?).await
    }

    /// Writes one preference.
    pub async fn set<T: Serialize>(&self, key: &str, value: T) -> CoreResult<()> {
        self.store.set_path(Self::path(key)?, value).await
    }

    /// Returns every preference.
    pub async fn all(&self) -> CoreResult<Map<String, Value>> {
        match self.store.get_value(ROOT).await? {
            Some(Value::Object(map)) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    /// Restores the default preferences.
    pub async fn reset(&self) -> CoreResult<()> {
        self.store.set_path(ROOT, default_preferences()).await
    }
}

#[cfg(test)]
mod tests {
    use crate::store::Store;
    use serde_json::json;

    #[tokio::test]
    async fn defaults_then_override_then_reset() {
        let store = Store::open_in_memory().await.unwrap();
        let prefs = store.preferences();

        assert_eq!(prefs.get::<String>("theme").await.unwrap().as_deref(), Some("light"));
        assert_eq!(prefs.get::<bool>("autoSave").await.unwrap(), Some(true));

        prefs.set("theme", "dark").await.unwrap();
        prefs.set("fontSize", 14).await.unwrap();
        let all = prefs.all().await.unwrap();
        assert_eq!(all.get("theme"), Some(&json!("dark")));
        assert_eq!(all.get("fontSize"), Some(&json!(14)));

        prefs.reset().await.unwrap();
        assert_eq!(prefs.get::<String>("theme").await.unwrap().as_deref(), Some("light"));
        assert_eq!(prefs.get::<u32>("fontSize").await.unwrap(), None);
    }
}
