//! # XER Ingest CLI (`xer`)
//!
//! Loads Primavera P6 XER exports into a SQLite database, creating and
//! widening one table per XER table as new columns appear.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `xer init [db]` | Create the database and the `file_metadata` table |
//! | `xer ingest <source> <db> [original_name]` | Load one XER file |
//! | `xer ingest-dir <dir> <db>` | Load every XER file under a directory |
//! | `xer parse <source>` | Parse only and print the tables found |
//! | `xer health [db]` | Check that the database answers |
//! | `xer stats [db]` | Show ingested files and per-table row counts |
//!
//! ## Examples
//!
//! ```bash
//! xer ingest /tmp/upload-1234 ./data/schedule.sqlite Plant_Baseline_2024-03-15.xer
//! xer ingest-dir ./exports ./data/schedule.sqlite
//! xer stats ./data/schedule.sqlite
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use xer_ingest::config::{self, Config};
use xer_ingest::ingest::{self, IngestOptions};
use xer_ingest::store::Store;
use xer_ingest::{logging, migrate, stats};

/// XER Ingest: load Primavera P6 XER exports into SQLite.
///
/// Settings are read from the `--config` TOML file when it exists; a
/// database path given on the command line always wins.
#[derive(Parser)]
#[command(
    name = "xer",
    about = "Load Primavera P6 XER exports into SQLite",
    version,
    long_about = "Streams Primavera P6 XER schedule exports into a SQLite database. Each XER table \
    becomes a destination table whose columns grow to the union of every file loaded, and every \
    row is tagged with the file_id of the file it came from."
)]
struct Cli {
    /// Path to configuration file (TOML). Optional.
    #[arg(long, global = true, default_value = "./config/xer.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database.
    ///
    /// Creates the SQLite file and the `file_metadata` table. Idempotent.
    Init {
        /// Database file; defaults to `[db].path` from the config.
        database: Option<PathBuf>,
    },

    /// Ingest one XER file.
    ///
    /// Parses the file, records its metadata, and inserts every table's
    /// records. Tables and records that fail are skipped and reported; a
    /// missing or unreadable file fails the command.
    Ingest {
        /// XER file to load.
        source: PathBuf,

        /// Destination database file.
        database: PathBuf,

        /// File name to classify and record instead of the source's name.
        original_filename: Option<String>,

        /// Project id to record in `file_metadata`.
        #[arg(long)]
        project_id: Option<i64>,

        /// Delete the source file after a successful load.
        #[arg(long)]
        remove_source: bool,
    },

    /// Ingest every XER file under a directory.
    ///
    /// Files matching `[ingest].include_globs` are loaded in path order, one
    /// run per file. A failing file does not stop the others.
    IngestDir {
        /// Directory to scan.
        dir: PathBuf,

        /// Destination database file.
        database: PathBuf,
    },

    /// Parse a file and print its tables without writing anything.
    Parse {
        /// XER file to parse.
        source: PathBuf,

        /// Print the full parsed registry as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check that the database can be opened and queried.
    Health {
        /// Database file; defaults to `[db].path` from the config.
        database: Option<PathBuf>,
    },

    /// Show ingested files and per-table row counts.
    Stats {
        /// Database file; defaults to `[db].path` from the config.
        database: Option<PathBuf>,
    },
}

fn with_db(cfg: Config, database: Option<PathBuf>) -> Config {
    match database {
        Some(path) => cfg.with_db_path(path),
        None => cfg,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_or_default(&cli.config)?;
    logging::init_logging(&cfg.logging)?;

    match cli.command {
        Commands::Init { database } => {
            let cfg = with_db(cfg, database);
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            source,
            database,
            original_filename,
            project_id,
            remove_source,
        } => {
            let remove_source = remove_source || cfg.ingest.remove_source;
            let cfg = cfg.with_db_path(database);
            let options = IngestOptions {
                original_name: original_filename,
                project_id,
            };
            ingest::run_ingest(&cfg, &source, &options, remove_source).await?;
        }
        Commands::IngestDir { dir, database } => {
            let cfg = cfg.with_db_path(database);
            ingest::run_ingest_dir(&cfg, &dir).await?;
        }
        Commands::Parse { source, json } => {
            ingest::run_parse(&source, json)?;
        }
        Commands::Health { database } => {
            let cfg = with_db(cfg, database);
            let store = Store::connect(&cfg.db).await?;
            let healthy = store.health_check().await;
            store.close().await;
            println!("healthy: {}", healthy);
            if !healthy {
                std::process::exit(1);
            }
        }
        Commands::Stats { database } => {
            let cfg = with_db(cfg, database);
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
