//! # tree-tags - position-indexed symbol store
//!
//! Storage core for source-code indexers. An external indexer parses files and
//! submits what it found; navigation tooling reads it back.
//!
//! tree-tags provides:
//! - Files, file-local definitions/references linked by id
//! - Global definitions/references linked by name, kind and module path
//! - SQLite-backed storage with cascading deletes and schema migrations
//! - Per-file replace transactions and a concurrent ingest pipeline
//! - A resolver for "go to definition" and "find usages"

pub mod position;
pub mod symbol;
pub mod tags;
pub mod storage;
pub mod resolve;
pub mod ingest;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use position::Point;
pub use symbol::{
    Definition, FileId, FileRecord, LocalDefId, LocalDefinition, LocalReference, ModulePath,
    NewDefinition, NewReference, Reference,
};
pub use tags::FileTags;
pub use storage::{FileTransaction, SqliteStore};
pub use resolve::{DefinitionResolver, Location};

/// Result type alias for tree-tags operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for tree-tags operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A row points at a file or local definition that does not exist
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Duplicate primary key or duplicate file path
    #[error("Uniqueness violation: {0}")]
    UniquenessViolation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported schema version {found} (this build supports up to {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("Database uses legacy schema version {found}; run `tree-tags migrate` first")]
    MigrationRequired { found: u32 },

    #[error("Invalid tags: {0}")]
    InvalidTags(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Worker failed: {0}")]
    Worker(String),
}

/// Message sent from ingest workers to the coordinator
#[derive(Debug)]
pub enum IngestMessage {
    Processed {
        document: String,
        summary: storage::ReplaceSummary,
    },
    Error(String, String),
}
