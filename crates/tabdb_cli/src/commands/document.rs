//! Path-level read and write commands.

use super::CliResult;
use serde_json::Value;
use tabdb_core::Store;
use tracing::info;

/// Prints the value at `path` as pretty JSON, or `null` if absent.
pub async fn get(store: &Store, path: &str) -> CliResult<()> {
    let value = store.get_value(path).await?.unwrap_or(Value::Null);
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Writes `raw` at `path`.
pub async fn set(store: &Store, path: &str, raw: &str) -> CliResult<()> {
    let value = parse_value(raw);
    store.set_path(path, &value).await?;
    info!(path, "value written");
    println!("✓ Set {}", display_path(path));
    Ok(())
}

/// Removes the value at `path`.
pub async fn delete(store: &Store, path: &str) -> CliResult<()> {
    let existed = store.get_value(path).await?.is_some();
    store.delete_path(path).await?;

    if existed {
        println!("✓ Deleted {}", display_path(path));
    } else {
        println!("Nothing at {}", display_path(path));
    }
    Ok(())
}

/// Parses a command-line value as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "<root>"
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_parse_as_json_first() {
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value(r#"{"a": [1]}"#), json!({"a": [1]}));
        assert_eq!(parse_value(r#""quoted""#), json!("quoted"));
    }

    #[test]
    fn non_json_is_a_string() {
        assert_eq!(parse_value("dark"), json!("dark"));
        assert_eq!(parse_value("{broken"), json!("{broken"));
    }

    #[tokio::test]
    async fn set_then_delete() {
        let store = Store::open_in_memory().await.unwrap();

        set(&store, "preferences.fontSize", "14").await.unwrap();
        assert_eq!(
            store.get_value("preferences.fontSize").await.unwrap(),
            Some(json!(14))
        );

        delete(&store, "preferences.fontSize").await.unwrap();
        assert_eq!(store.get_value("preferences.fontSize").await.unwrap(), None);
    }
}
