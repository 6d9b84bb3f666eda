//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - files(id, path)
//! - local_defs(id, file_id, row, column, length)
//! - local_refs(file_id, definition_id, row, column, length)
//! - defs(file_id, start/end span, name, name_start, kind, module_path)
//! - refs(file_id, row, column, name, kind)

pub mod schema;
pub mod migrate;
pub mod sqlite;
pub mod file_tx;

pub use sqlite::{SqliteStore, DbStats};
pub use file_tx::{FileTransaction, ReplaceSummary};
pub use migrate::MigrationReport;
