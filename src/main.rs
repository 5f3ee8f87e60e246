//! # seedsync CLI
//!
//! The `seedsync` binary reconciles CSV seed files against document-store
//! collections: idempotent batched upserts, optional pruning of stale
//! documents, and optional strict field-shape enforcement.
//!
//! ## Usage
//!
//! ```bash
//! seedsync --config ./config/seedsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `seedsync init` | Create the store schema (idempotent) |
//! | `seedsync sync <entity>` | Merge-upsert one entity, `base`, or `all` |
//! | `seedsync reset <entity>` | Backup, then fully replace one collection |
//! | `seedsync backup <entity>` | Snapshot a collection to a timestamped file |
//! | `seedsync rekey user-reports` | Migrate report keys to stable ids |
//! | `seedsync get <collection>` | List keys or print one document |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the store
//! seedsync init
//!
//! # Upsert the three base collections, removing stale documents
//! seedsync sync base --prune
//!
//! # Preview a strict sync of the allergen list
//! seedsync sync allergens --dry-run --strict
//!
//! # Replace the allergen collection wholesale (backs up first)
//! seedsync reset allergens --prune
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use seedsync::config::{self, Config};
use seedsync::reconcile::{self, ReconcileOptions};
use seedsync::schema::EntityType;
use seedsync::store::sqlite::SqliteStore;
use seedsync::{backup, get, rekey};

/// seedsync: reconcile CSV seed files against document-store collections.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file naming the store path, the CSV directory, and batching limits.
#[derive(Parser)]
#[command(
    name = "seedsync",
    about = "Reconciles CSV seed files against document-store collections",
    version,
    long_about = "seedsync loads tabular seed files, fuzzily maps their drifting column headers \
    onto a canonical schema, normalizes cell values, derives stable document keys, and commits \
    batched idempotent upserts, with optional pruning of stale documents and strict \
    field-shape enforcement."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/seedsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the store schema.
    ///
    /// Creates the SQLite database file and the documents table. Running
    /// it multiple times is safe.
    Init,

    /// Merge-upsert source rows into the store.
    ///
    /// Each entity is independent: a missing CSV file skips that entity
    /// and does not abort its siblings. Existing document fields not
    /// named by the projection survive (merge semantics).
    Sync {
        /// Entity to sync: `all`, `base` (allergens, symptom-weights,
        /// risk-rules), or a single entity slug.
        entity: String,

        /// Log intended actions without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// After writing, delete documents whose key the source no
        /// longer produces.
        #[arg(long)]
        prune: bool,

        /// After writing, strip stored fields outside the entity's
        /// allow-list.
        #[arg(long)]
        strict: bool,
    },

    /// Fully replace one entity's collection from its CSV file.
    ///
    /// All-or-nothing: zero source rows aborts the run. The existing
    /// collection is snapshotted to a timestamped backup file before any
    /// mutation.
    Reset {
        /// Entity slug (e.g. `allergens`).
        entity: String,

        /// Log intended actions without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Delete documents the source file no longer covers.
        #[arg(long)]
        prune: bool,
    },

    /// Snapshot a collection to a timestamped JSON file.
    Backup {
        /// Entity slug (e.g. `allergens`).
        entity: String,
    },

    /// Migrate user-report keys to stable `<uid>_<ts>_<food>` ids.
    ///
    /// Each move is sequenced create-then-delete so a crash can only
    /// duplicate a report, never lose one.
    Rekey {
        /// Entity slug; only `user-reports` is supported.
        entity: String,

        /// Log intended moves without performing them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect store state.
    ///
    /// Lists a collection's keys, or prints one document as JSON.
    Get {
        /// Collection name (e.g. `allergens`).
        collection: String,

        /// Print this single document instead of listing keys.
        #[arg(long)]
        key: Option<String>,
    },
}

/// Resolve the `sync` entity argument into a run list.
fn parse_entities(arg: &str) -> anyhow::Result<Vec<EntityType>> {
    Ok(match arg {
        "all" => EntityType::all().to_vec(),
        "base" => EntityType::base().to_vec(),
        other => vec![EntityType::parse(other)?],
    })
}

async fn open_store(cfg: &Config) -> anyhow::Result<SqliteStore> {
    SqliteStore::connect(&cfg.store.path).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = open_store(&cfg).await?;
            store.init().await?;
            store.close().await;
            println!("Store initialized successfully.");
        }
        Commands::Sync {
            entity,
            dry_run,
            prune,
            strict,
        } => {
            let entities = parse_entities(&entity)?;
            let opts = ReconcileOptions {
                dry_run,
                prune,
                strict,
            };
            let store = open_store(&cfg).await?;
            reconcile::run_sync(&cfg, &store, &entities, &opts).await?;
            store.close().await;
        }
        Commands::Reset {
            entity,
            dry_run,
            prune,
        } => {
            let entity = EntityType::parse(&entity)?;
            let opts = ReconcileOptions {
                dry_run,
                prune,
                strict: false,
            };
            let store = open_store(&cfg).await?;
            reconcile::run_reset(&cfg, &store, entity, &opts).await?;
            store.close().await;
        }
        Commands::Backup { entity } => {
            let entity = EntityType::parse(&entity)?;
            let store = open_store(&cfg).await?;
            let path =
                backup::backup_collection(&store, entity.collection(), &cfg.backup.dir).await?;
            store.close().await;
            println!("Backup written: {}", path.display());
        }
        Commands::Rekey { entity, dry_run } => {
            if EntityType::parse(&entity)? != EntityType::UserReport {
                anyhow::bail!("Only 'user-reports' supports rekeying");
            }
            let store = open_store(&cfg).await?;
            rekey::rekey_reports(&store, dry_run).await?;
            store.close().await;
        }
        Commands::Get { collection, key } => {
            let store = open_store(&cfg).await?;
            get::run_get(&store, &collection, key.as_deref()).await?;
            store.close().await;
        }
    }

    Ok(())
}
