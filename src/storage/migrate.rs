//! Schema versioning and the legacy -> current migration
//!
//! The version lives in `PRAGMA user_version`. A database with tables but no
//! version stamp is classified by its shape: the legacy generation has no
//! `defs`/`refs` tables and no unique paths.

use super::schema::{self, LEGACY_VERSION, SCHEMA_VERSION};
use crate::{Error, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::fmt;

/// What a migration changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    /// Legacy file rows folded into another row with the same path
    pub files_merged: usize,
    /// Local definitions whose file no longer exists
    pub local_definitions_dropped: usize,
    /// Local references whose file or definition no longer exists
    pub local_references_dropped: usize,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.from_version == self.to_version
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Migration v{} -> v{}:", self.from_version, self.to_version)?;
        writeln!(f, "  Files merged: {}", self.files_merged)?;
        writeln!(f, "  Local definitions dropped: {}", self.local_definitions_dropped)?;
        write!(f, "  Local references dropped: {}", self.local_references_dropped)
    }
}

/// What the tables on disk look like, before trusting the version stamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Empty,
    /// Files and local symbols only, paths not unique
    Legacy,
    /// Current tables without a version stamp: written by a tool that never
    /// set `user_version`, or a creation that was interrupted
    Unstamped,
    Stamped(u32),
}

fn inspect(conn: &Connection) -> Result<Layout> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version != 0 {
        return Ok(Layout::Stamped(version));
    }
    if !table_exists(conn, "files")? {
        return Ok(Layout::Empty);
    }
    if table_exists(conn, "defs")? || table_exists(conn, "refs")? || files_path_unique(conn)? {
        Ok(Layout::Unstamped)
    } else {
        Ok(Layout::Legacy)
    }
}

/// Detect the schema version: 0 for an empty database, 1 for legacy.
///
/// An unstamped database that already has the current tables counts as
/// current; `ensure_current` stamps it.
pub fn detect_version(conn: &Connection) -> Result<u32> {
    Ok(match inspect(conn)? {
        Layout::Empty => 0,
        Layout::Legacy => LEGACY_VERSION,
        Layout::Unstamped => SCHEMA_VERSION,
        Layout::Stamped(version) => version,
    })
}

/// Create the current schema on an empty database, or check an existing one.
///
/// Legacy databases are not touched; they need an explicit `migrate`.
pub fn ensure_current(conn: &Connection) -> Result<()> {
    if inspect(conn)? == Layout::Stamped(SCHEMA_VERSION) {
        return Ok(());
    }
    create_current(conn)
}

/// Create missing tables and stamp the version in one `IMMEDIATE`
/// transaction. The layout is checked again under the write lock, since
/// another connection may have finished first.
fn create_current(conn: &Connection) -> Result<()> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    match inspect(&tx)? {
        Layout::Empty | Layout::Unstamped => {
            for stmt in schema::all_schema_statements() {
                tx.execute(stmt, [])?;
            }
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        Layout::Stamped(SCHEMA_VERSION) => {}
        Layout::Legacy => return Err(Error::MigrationRequired { found: LEGACY_VERSION }),
        Layout::Stamped(found) => {
            return Err(Error::UnsupportedSchema {
                found,
                supported: SCHEMA_VERSION,
            });
        }
    }
    tx.commit()?;
    Ok(())
}

/// Bring a database of any known generation to the current schema.
///
/// Legacy data is copied in one transaction: for duplicate paths the most
/// recent row (highest id) wins, and local rows left dangling by the merge or
/// by the missing cascade are dropped. Unstamped current tables keep their
/// rows and only receive the stamp.
pub fn migrate(conn: &mut Connection) -> Result<MigrationReport> {
    let layout = inspect(conn)?;
    let mut report = MigrationReport {
        from_version: 0,
        to_version: SCHEMA_VERSION,
        ..Default::default()
    };

    match layout {
        Layout::Stamped(SCHEMA_VERSION) => {
            report.from_version = SCHEMA_VERSION;
            return Ok(report);
        }
        Layout::Empty | Layout::Unstamped => {
            create_current(conn)?;
            tracing::info!("Stamped schema v{} ({:?} layout)", SCHEMA_VERSION, layout);
            return Ok(report);
        }
        Layout::Legacy => report.from_version = LEGACY_VERSION,
        Layout::Stamped(found) => {
            return Err(Error::UnsupportedSchema {
                found,
                supported: SCHEMA_VERSION,
            });
        }
    }
    let from_version = report.from_version;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if inspect(&tx)? != Layout::Legacy {
        // Another connection migrated between the check and the lock.
        drop(tx);
        return migrate(conn);
    }
    tx.execute_batch(
        "ALTER TABLE local_refs RENAME TO legacy_local_refs;
         ALTER TABLE local_defs RENAME TO legacy_local_defs;
         ALTER TABLE files RENAME TO legacy_files;",
    )?;
    for stmt in schema::all_schema_statements() {
        tx.execute(stmt, [])?;
    }

    let legacy_files = count(&tx, "legacy_files")?;
    let legacy_defs = count(&tx, "legacy_local_defs")?;
    let legacy_refs = count(&tx, "legacy_local_refs")?;

    let files = tx.execute(
        "INSERT INTO files (id, path) SELECT MAX(id), path FROM legacy_files GROUP BY path",
        [],
    )?;
    let defs = tx.execute(
        r#"
        INSERT INTO local_defs (id, file_id, "row", "column", length)
        SELECT id, file_id, "row", "column", length
        FROM legacy_local_defs
        WHERE file_id IN (SELECT id FROM files)
        "#,
        [],
    )?;
    let refs = tx.execute(
        r#"
        INSERT INTO local_refs (file_id, definition_id, "row", "column", length)
        SELECT r.file_id, r.definition_id, r."row", r."column", r.length
        FROM legacy_local_refs r
        WHERE r.file_id IN (SELECT id FROM files)
          AND r.definition_id IN (SELECT id FROM local_defs)
        "#,
        [],
    )?;

    tx.execute_batch(
        "DROP TABLE legacy_local_refs;
         DROP TABLE legacy_local_defs;
         DROP TABLE legacy_files;",
    )?;
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;

    report.files_merged = legacy_files - files;
    report.local_definitions_dropped = legacy_defs - defs;
    report.local_references_dropped = legacy_refs - refs;
    tracing::info!(
        "Migrated schema v{} -> v{} ({} files merged, {} local defs and {} local refs dropped)",
        from_version,
        SCHEMA_VERSION,
        report.files_merged,
        report.local_definitions_dropped,
        report.local_references_dropped
    );
    Ok(report)
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(found > 0)
}

/// Whether `files.path` carries a unique index (the current generation)
fn files_path_unique(conn: &Connection) -> Result<bool> {
    let mut stmt = conn.prepare(r#"SELECT name FROM pragma_index_list('files') WHERE "unique" = 1"#)?;
    let indexes = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for index in indexes {
        let columns: Vec<String> = conn
            .prepare("SELECT name FROM pragma_index_info(?1)")?
            .query_map([&index], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        if columns == ["path"] {
            return Ok(true);
        }
    }
    Ok(false)
}

fn count(conn: &Connection, table: &str) -> Result<usize> {
    let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
    Ok(n as usize)
}
