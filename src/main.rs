//! tree-tags CLI - ingest tag documents and navigate the symbol store

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tree_tags::config::{self, TreeTagsConfig};
use tree_tags::ingest;
use tree_tags::resolve::{DefinitionResolver, Location};
use tree_tags::storage::SqliteStore;
use tree_tags::ui::{self, Icons};
use tree_tags::{Point, Reference};

#[derive(Parser)]
#[command(name = "tree-tags")]
#[command(version)]
#[command(about = "Symbol store for code navigation - definitions and references per file")]
#[command(long_about = r#"
tree-tags keeps the definitions and references an indexer produced for each
source file, and answers "go to definition" and "find usages" from them.

Example usage:
  tree-tags init
  tree-tags ingest tags/*.json --jobs 4
  tree-tags find-definition src/app.py 12 8
  tree-tags clear-index src/legacy
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the database file (overrides the config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a tree-tags.toml and create an empty database
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Replace the stored symbols of every file described by the tag documents
    Ingest {
        /// JSON tag documents, one per source file
        #[arg(required = true)]
        tags: Vec<PathBuf>,

        /// Number of concurrent workers
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Remove every indexed file under a path
    ClearIndex {
        path: PathBuf,
    },

    /// Show where the symbol at a position is defined
    FindDefinition {
        path: String,
        row: u32,
        column: u32,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show every usage of the symbol at a position
    FindUsages {
        path: String,
        row: u32,
        column: u32,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List global definitions with a name
    Definitions {
        name: String,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List global references in a row range of a file
    References {
        path: String,

        /// First row (inclusive)
        #[arg(long, default_value = "0")]
        from: u32,

        /// Last row (exclusive); defaults to the end of the file
        #[arg(long)]
        to: Option<u32>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show row counts per table
    Stats {
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Upgrade a legacy database in place
    Migrate,
}

#[derive(Serialize)]
struct DefinitionOutput {
    path: String,
    name: String,
    qualified_name: String,
    kind: Option<String>,
    start: Point,
    end: Point,
    name_start: Point,
}

#[derive(Serialize)]
struct ReferenceOutput {
    path: String,
    name: String,
    kind: Option<String>,
    position: Point,
}

impl ReferenceOutput {
    fn new(path: &str, reference: Reference) -> Self {
        Self {
            path: path.to_string(),
            name: reference.name,
            kind: reference.kind,
            position: reference.position,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = config::load_config(cli.config.as_deref())?.unwrap_or_default();
    let cwd = std::env::current_dir()?;
    let database = cli
        .database
        .clone()
        .or_else(|| config.database_path())
        .unwrap_or_else(|| config::default_database_path_in(&cwd));
    tracing::debug!("Using database {}", database.display());

    match cli.command {
        Commands::Init { force } => {
            let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
            let new_config = TreeTagsConfig {
                database: Some(database.to_string_lossy().to_string()),
                jobs: config.jobs,
            };
            config::write_config(&config_path, &new_config, force)?;
            config::ensure_db_dir(&database)?;
            SqliteStore::open(&database)?;
            config::ensure_gitignore(&cwd)?;

            ui::success("Initialized tree-tags");
            ui::info("Config", &config_path.display().to_string());
            ui::info("Database", &database.display().to_string());
        }

        Commands::Ingest { tags, jobs } => {
            config::ensure_db_dir(&database)?;
            let mut store = SqliteStore::open(&database)
                .with_context(|| format!("opening {}", database.display()))?;
            let jobs = jobs.or(config.jobs).unwrap_or_else(default_jobs).max(1);

            ui::header(&format!("Ingesting {} tag documents", tags.len()));
            ui::info("Database", &database.display().to_string());
            ui::info("Workers", &jobs.to_string());

            let started = Instant::now();
            let progress = ui::IngestProgress::new(tags.len());
            let report = ingest::ingest_documents(&mut store, &tags, jobs, |message| {
                progress.observe(message);
            })?;
            progress.finish_with_summary(started.elapsed(), &report);

            if !report.is_clean() {
                ui::section("Failed documents");
                for (document, reason) in &report.failures {
                    ui::document_failed(document, reason);
                }
                anyhow::bail!("{} of {} documents failed", report.failures.len(), tags.len());
            }
        }

        Commands::ClearIndex { path } => {
            let store = open_existing(&database)?;
            let prefix = canonical_prefix(&path);
            let removed = store.remove_files_under(&prefix)?;
            if removed == 0 {
                ui::warn(&format!("No indexed files under {}", prefix));
            } else {
                ui::success(&format!("Removed {} files under {}", removed, prefix));
            }
        }

        Commands::FindDefinition { path, row, column, format } => {
            let store = open_existing(&database)?;
            let mut resolver = DefinitionResolver::new(&store);
            let found = resolver.find_definition(&path, Point::new(row, column))?;
            print_locations(&found, format, "No definition found")?;
        }

        Commands::FindUsages { path, row, column, format } => {
            let store = open_existing(&database)?;
            let mut resolver = DefinitionResolver::new(&store);
            let found = resolver.find_usages(&path, Point::new(row, column))?;
            print_locations(&found, format, "No usages found")?;
        }

        Commands::Definitions { name, format } => {
            let store = open_existing(&database)?;
            let mut output = Vec::new();
            for def in store.lookup_definitions_by_name(&name)? {
                output.push(DefinitionOutput {
                    path: store.get_file(def.file_id)?.path,
                    qualified_name: def.qualified_name(),
                    name: def.name,
                    kind: def.kind,
                    start: def.start,
                    end: def.end,
                    name_start: def.name_start,
                });
            }

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
                OutputFormat::Text if output.is_empty() => ui::warn(&format!("No definitions of {}", name)),
                OutputFormat::Text => {
                    for def in &output {
                        println!(
                            "{} {} {} {} {}",
                            def.path,
                            def.name_start.row,
                            def.name_start.column,
                            def.kind.as_deref().unwrap_or("-"),
                            def.qualified_name
                        );
                    }
                }
            }
        }

        Commands::References { path, from, to, format } => {
            if let Some(to) = to.filter(|&to| from > to) {
                anyhow::bail!("--from ({}) must not exceed --to ({})", from, to);
            }
            let store = open_existing(&database)?;
            let file_id = store
                .file_id(&path)?
                .with_context(|| format!("file {} is not indexed", path))?;
            let references = match to {
                Some(to) => store.lookup_references_in_range(file_id, from..to)?,
                None => store.lookup_references_in_rows(file_id, from..=u32::MAX)?,
            };
            let output: Vec<ReferenceOutput> = references
                .into_iter()
                .map(|r| ReferenceOutput::new(&path, r))
                .collect();

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
                OutputFormat::Text => {
                    for r in &output {
                        println!(
                            "{} {} {} {}",
                            r.position.row,
                            r.position.column,
                            r.kind.as_deref().unwrap_or("-"),
                            r.name
                        );
                    }
                }
            }
        }

        Commands::Stats { format } => {
            let store = open_existing(&database)?;
            let stats = store.stats()?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Text => {
                    println!("{} tree-tags statistics ({})", Icons::STATS, database.display());
                    println!("{}", ui::stats_table(&stats.rows()));
                    ui::summary_row("Schema version", &store.schema_version()?.to_string());
                }
            }
        }

        Commands::Migrate => {
            if !database.exists() {
                anyhow::bail!("no database at {}", database.display());
            }
            let spinner = ui::Spinner::new("Migrating database");
            let report = SqliteStore::migrate_at(&database)?;
            spinner.finish_and_clear();

            if report.is_noop() {
                ui::success(&format!("{} is already at schema version {}", database.display(), report.to_version));
            } else {
                ui::success(&format!("{} Migrated {}", Icons::WRENCH, database.display()));
                println!("{}", report);
            }
        }
    }

    Ok(())
}

fn open_existing(database: &Path) -> anyhow::Result<SqliteStore> {
    if !database.exists() {
        anyhow::bail!(
            "no database at {} (run `tree-tags ingest` first)",
            database.display()
        );
    }
    SqliteStore::open(database).with_context(|| format!("opening {}", database.display()))
}

fn default_jobs() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Stored paths are whatever the indexer reported; canonicalize when the
/// path exists on disk so relative arguments still match absolute entries.
fn canonical_prefix(path: &Path) -> String {
    match std::fs::canonicalize(path) {
        Ok(canonical) => canonical.to_string_lossy().to_string(),
        Err(_) => path.to_string_lossy().to_string(),
    }
}

fn print_locations(locations: &[Location], format: OutputFormat, empty: &str) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(locations)?),
        OutputFormat::Text if locations.is_empty() => ui::warn(empty),
        OutputFormat::Text => {
            for location in locations {
                ui::location(location);
            }
        }
    }
    Ok(())
}
