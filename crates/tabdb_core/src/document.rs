//! The root document: default shape, load-time validation and pruning.

use crate::error::{CoreError, CoreResult};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Highest document format version this build understands.
pub const DOCUMENT_VERSION: u64 = 1;

/// Field stamped with the time of the last successful flush.
pub const LAST_MODIFIED: &str = "lastModified";

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Builds the document written when the backend holds none.
pub fn default_document() -> Value {
    json!({
        "version": DOCUMENT_VERSION,
        "projects": { "list": {}, "active": null, "recent": [] },
        "entities": {},
        "aiModels": { "list": {}, "default": null },
        "preferences": default_preferences(),
        LAST_MODIFIED: now_millis(),
    })
}

/// Default user preferences.
pub fn default_preferences() -> Value {
    json!({ "theme": "light", "language": "en", "autoSave": true })
}

/// Checks a document read from the backend.
///
/// A missing `version` is stamped with [`DOCUMENT_VERSION`].
///
/// # Errors
///
/// Returns [`CoreError::Serialization`] if the root is not an object, the
/// version is not a number, or the version is newer than this build supports.
pub fn validate_loaded(mut document: Value) -> CoreResult<Value> {
    let found = kind(&document);
    let Value::Object(map) = &mut document else {
        return Err(CoreError::serialization(format!(
            "root document must be an object, found {found}"
        )));
    };

    let version = match map.get("version") {
        None => None,
        Some(Value::Number(n)) => match n.as_u64() {
            Some(v) => Some(v),
            None => return Err(CoreError::serialization(format!("invalid document version {n}"))),
        },
        Some(other) => {
            return Err(CoreError::serialization(format!(
                "document version must be a number, found {}",
                kind(other)
            )))
        }
    };

    match version {
        None => {
            map.insert("version".to_string(), json!(DOCUMENT_VERSION));
        }
        Some(v) if v > DOCUMENT_VERSION => {
            return Err(CoreError::serialization(format!(
                "document version {v} is newer than supported version {DOCUMENT_VERSION}"
            )))
        }
        Some(_) => {}
    }

    Ok(document)
}

/// Stamps `lastModified` on an object document.
pub fn stamp_modified(document: &mut Value, at: u64) {
    if let Value::Object(map) = document {
        map.insert(LAST_MODIFIED.to_string(), json!(at));
    }
}

/// Removes `null` and empty-string object fields, recursively.
///
/// Array elements are kept in place so indices stay stable; objects inside
/// arrays are still pruned.
pub fn prune_empty(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !is_empty_leaf(v));
            for v in map.values_mut() {
                prune_empty(v);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                prune_empty(v);
            }
        }
        _ => {}
    }
}

fn is_empty_leaf(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_document_shape() {
        let doc = default_document();
        assert_eq!(doc["version"], json!(1));
        assert_eq!(doc["projects"]["active"], Value::Null);
        assert_eq!(doc["projects"]["recent"], json!([]));
        assert_eq!(doc["aiModels"]["list"], json!({}));
        assert_eq!(doc["preferences"]["theme"], json!("light"));
        assert!(doc[LAST_MODIFIED].as_u64().is_some());
    }

    #[test]
    fn missing_version_is_stamped() {
        let doc = validate_loaded(json!({"projects": {}})).unwrap();
        assert_eq!(doc["version"], json!(DOCUMENT_VERSION));
    }

    #[test]
    fn newer_version_is_rejected() {
        let err = validate_loaded(json!({"version": 99})).unwrap_err();
        assert!(matches!(err, CoreError::Serialization { .. }));
    }

    #[test]
    fn non_object_root_is_rejected() {
        assert!(validate_loaded(json!([1, 2])).is_err());
        assert!(validate_loaded(json!("text")).is_err());
        assert!(validate_loaded(json!({"version": "1"})).is_err());
    }

    #[test]
    fn prune_removes_null_and_empty_strings() {
        let mut doc = json!({
            "a": null,
            "b": "",
            "c": "kept",
            "d": {"e": null, "f": 0, "g": false},
            "h": [null, {"i": ""}],
        });
        prune_empty(&mut doc);
        assert_eq!(doc, json!({"c": "kept", "d": {"f": 0, "g": false}, "h": [null, {}]}));
    }

    #[test]
    fn stamp_modified_only_touches_objects() {
        let mut doc = json!({});
        stamp_modified(&mut doc, 42);
        assert_eq!(doc[LAST_MODIFIED], json!(42));

        let mut array = json!([]);
        stamp_modified(&mut array, 42);
        assert_eq!(array, json!([]));
    }
}
