//! TabDB CLI
//!
//! Command-line tools for a file-backed TabDB store.
//!
//! # Commands
//!
//! - `get` - Print the value at a path
//! - `set` - Write a JSON value at a path
//! - `delete` - Remove the value at a path
//! - `info` - Display storage and cache statistics
//! - `export` - Write a backup envelope
//! - `import` - Restore from a backup envelope

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// TabDB command-line store tools.
#[derive(Parser)]
#[command(name = "tabdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the database files
    #[arg(global = true, short, long)]
    dir: Option<PathBuf>,

    /// Database name
    #[arg(global = true, long, default_value = "tabdb")]
    db: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the value at a dotted path (empty for the whole document)
    Get {
        /// Dotted path
        #[arg(default_value = "")]
        path: String,
    },

    /// Write a JSON value at a dotted path
    Set {
        /// Dotted path
        path: String,

        /// Value as JSON; anything that is not valid JSON is stored as a string
        value: String,
    },

    /// Remove the value at a dotted path
    Delete {
        /// Dotted path
        path: String,
    },

    /// Display storage and cache statistics
    Info {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Write a backup of the whole document
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace the document with a backup
    Import {
        /// Backup file
        file: PathBuf,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("TabDB CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("TabDB Core v{}", tabdb_core::VERSION);
        return Ok(());
    }

    let dir = cli.dir.ok_or("Database directory required (--dir)")?;
    let store = commands::open_store(&dir, &cli.db).await?;

    let outcome = match cli.command {
        Commands::Get { path } => commands::document::get(&store, &path).await,
        Commands::Set { path, value } => commands::document::set(&store, &path, &value).await,
        Commands::Delete { path } => commands::document::delete(&store, &path).await,
        Commands::Info { format } => commands::info::run(&store, &format).await,
        Commands::Export { output } => commands::backup::export(&store, output.as_deref()).await,
        Commands::Import { file } => commands::backup::import(&store, &file).await,
        Commands::Version => Ok(()),
    };

    // Persist whatever the command changed, even after a failure
    store.close().await?;
    outcome?;
    Ok(())
}
