//! Export and import commands.

use super::CliResult;
use std::fs;
use std::path::Path;
use tabdb_core::{BackupEnvelope, Store};
use tracing::info;

/// Writes a backup envelope to `output`, or to stdout.
pub async fn export(store: &Store, output: Option<&Path>) -> CliResult<()> {
    let backup = store.backup().await?;

    match output {
        Some(path) => {
            fs::write(path, &backup)?;
            info!(path = %path.display(), bytes = backup.len(), "backup exported");
            println!("✓ Backup written to {:?}", path);
        }
        None => println!("{backup}"),
    }
    Ok(())
}

/// Replaces the document with the backup in `input`.
pub async fn import(store: &Store, input: &Path) -> CliResult<()> {
    let text = fs::read_to_string(input)?;

    // Validate first so the reason reaches the user
    let envelope = BackupEnvelope::parse(&text)?;
    store.try_restore(&text).await?;

    println!("✓ Backup restored from {:?}", input);
    println!("  Exported at: {} ms since epoch", envelope.exported_at);
    println!("  Checksum:    {}", envelope.checksum);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::open_store;
    use serde_json::json;

    #[tokio::test]
    async fn export_then_import_into_another_database() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("backup.json");

        let source = open_store(dir.path(), "source").await.unwrap();
        source.set_path("projects.active", "p1").await.unwrap();
        export(&source, Some(&file)).await.unwrap();
        source.close().await.unwrap();

        let target = open_store(dir.path(), "target").await.unwrap();
        import(&target, &file).await.unwrap();
        target.close().await.unwrap();

        let reopened = open_store(dir.path(), "target").await.unwrap();
        assert_eq!(
            reopened.get_value("projects.active").await.unwrap(),
            Some(json!("p1"))
        );
    }

    #[tokio::test]
    async fn invalid_backup_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.json");
        fs::write(&file, "{}").unwrap();

        let store = open_store(dir.path(), "tabdb").await.unwrap();
        assert!(import(&store, &file).await.is_err());
    }
}
