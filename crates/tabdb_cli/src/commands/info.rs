//! Info command implementation.

use super::CliResult;
use serde::Serialize;
use tabdb_core::Store;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InfoResult {
    /// Database name.
    pub db_name: String,
    /// Object store name.
    pub store_name: String,
    /// Engine schema version.
    pub version: u32,
    /// Stored keys.
    pub keys: Vec<String>,
    /// Approximate stored size in bytes.
    pub approximate_bytes: usize,
    /// Writes waiting for a flush.
    pub pending_writes: usize,
    /// Live cache entries.
    pub cache_entries: usize,
    /// Cache capacity.
    pub cache_capacity: usize,
    /// Cache TTL in milliseconds.
    pub cache_ttl_ms: u128,
    /// Documents replaced by the default on load.
    pub recoveries: u64,
    /// Top-level sections of the document.
    pub sections: Vec<String>,
}

/// Runs the info command.
pub async fn run(store: &Store, format: &str) -> CliResult<()> {
    let storage = store.storage_info().await?;
    let sections = match store.get_value("").await? {
        Some(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    };
    let cache = store.cache_stats();
    let stats = store.stats();

    let result = InfoResult {
        db_name: storage.db_name,
        store_name: storage.store_name,
        version: storage.version,
        keys: storage.keys,
        approximate_bytes: storage.approximate_bytes,
        pending_writes: storage.pending_writes,
        cache_entries: cache.entries,
        cache_capacity: cache.max_entries,
        cache_ttl_ms: cache.ttl.as_millis(),
        recoveries: stats.recoveries,
        sections,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InfoResult) {
    println!("TabDB Store Information");
    println!("=======================");
    println!();
    println!("Database: {} / {}", result.db_name, result.store_name);
    println!("Version:  {}", result.version);
    println!();
    println!("Storage:");
    println!("  Keys:           {}", result.keys.join(", "));
    println!("  Size:           {}", format_size(result.approximate_bytes));
    println!("  Pending writes: {}", result.pending_writes);
    println!();
    println!("Cache:");
    println!("  Entries: {} / {}", result.cache_entries, result.cache_capacity);
    println!("  TTL:     {} ms", result.cache_ttl_ms);
    if result.recoveries > 0 {
        println!();
        println!("Recovered {} unusable document(s) on load", result.recoveries);
    }
    println!();
    println!("Sections: {}", result.sections.join(", "));
}

fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
