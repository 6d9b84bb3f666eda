//! SQLite storage implementation

use std::ops::{Range, RangeInclusive};
use std::path::{Path, PathBuf};
use std::time::Duration;
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use crate::position::Point;
use crate::symbol::{
    Definition, FileId, FileRecord, LocalDefId, LocalDefinition, LocalReference, ModulePath,
    NewDefinition, NewReference, Reference,
};
use crate::tags::FileTags;
use crate::{Error, Result};
use super::file_tx::{FileTransaction, ReplaceSummary};
use super::migrate::{self, MigrationReport};
use super::schema;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const DEF_COLUMNS: &str = "file_id, start_row, start_column, end_row, end_column, \
     name, name_start_row, name_start_column, kind, module_path";

const REF_COLUMNS: &str = r#"file_id, "row", "column", name, kind"#;

/// SQLite-backed storage for files and their symbols
pub struct SqliteStore {
    conn: Connection,
    /// `None` for in-memory stores
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    ///
    /// Fails with `MigrationRequired` on a legacy database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Self::connect(path)?;
        migrate::ensure_current(&conn)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrate::ensure_current(&conn)?;
        Ok(Self { conn, path: None })
    }

    /// Upgrade the database at `path` to the current schema in place.
    pub fn migrate_at(path: &Path) -> Result<MigrationReport> {
        let mut conn = Self::connect(path)?;
        migrate::migrate(&mut conn)
    }

    /// Open another connection to the same database file.
    ///
    /// Each worker thread needs its own connection; in-memory stores cannot
    /// be shared this way.
    pub fn try_clone(&self) -> Result<Self> {
        match &self.path {
            Some(path) => Self::open(path),
            None => Err(Error::Unsupported(
                "an in-memory store cannot be opened twice".to_string(),
            )),
        }
    }

    fn connect(path: &Path) -> Result<Connection> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.set_prepared_statement_cache_capacity(32);
        // WAL lets readers keep a consistent snapshot while a file is replaced
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(conn)
    }

    /// Database file backing this store, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> Result<u32> {
        migrate::detect_version(&self.conn)
    }

    // ========== File Operations ==========

    /// Insert a new file. Paths are unique.
    pub fn add_file(&self, path: &str) -> Result<FileId> {
        self.conn
            .prepare_cached("INSERT INTO files (path) VALUES (?1)")?
            .execute([path])
            .map_err(|e| classify(e, || format!("file {}", path)))?;
        let id = FileId(self.conn.last_insert_rowid());
        tracing::debug!("Added file {} as {}", path, id);
        Ok(id)
    }

    /// Get a file by id
    pub fn get_file(&self, id: FileId) -> Result<FileRecord> {
        self.conn
            .query_row("SELECT id, path FROM files WHERE id = ?1", [id], row_to_file)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("file {}", id)))
    }

    /// Find the id of a file by path
    pub fn file_id(&self, path: &str) -> Result<Option<FileId>> {
        self.conn
            .query_row("SELECT id FROM files WHERE path = ?1", [path], |row| row.get(0))
            .optional()
            .map_err(Into::into)
    }

    /// All files, ordered by path
    pub fn files(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare("SELECT id, path FROM files ORDER BY path")?;
        let files = stmt
            .query_map([], row_to_file)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    /// Delete a file and every row anchored to it.
    ///
    /// A single statement; the cascade happens inside it, so either everything
    /// for the file disappears or nothing does.
    pub fn remove_file(&self, id: FileId) -> Result<()> {
        let removed = self.conn.execute("DELETE FROM files WHERE id = ?1", [id])?;
        if removed == 0 {
            return Err(Error::NotFound(format!("file {}", id)));
        }
        tracing::debug!("Removed file {}", id);
        Ok(())
    }

    /// Delete every file at or below a path prefix. Returns the number of
    /// files removed.
    pub fn remove_files_under(&self, prefix: &str) -> Result<usize> {
        let dir_prefix = format!("{}/", prefix.trim_end_matches('/'));
        let removed = self.conn.execute(
            "DELETE FROM files WHERE path = ?1 OR substr(path, 1, length(?2)) = ?2",
            params![prefix, dir_prefix],
        )?;
        tracing::debug!("Removed {} files under {}", removed, prefix);
        Ok(removed)
    }

    // ========== Local Symbol Operations ==========

    /// Insert a file-local definition
    pub fn add_local_definition(&self, file_id: FileId, position: Point, length: u32) -> Result<LocalDefId> {
        insert_local_def(&self.conn, file_id, position, length)
    }

    /// Insert a use-site of a local definition
    pub fn add_local_reference(
        &self,
        file_id: FileId,
        definition_id: LocalDefId,
        position: Point,
        length: u32,
    ) -> Result<()> {
        insert_local_ref(&self.conn, file_id, definition_id, position, length)
    }

    /// Get a local definition by id
    pub fn local_definition(&self, id: LocalDefId) -> Result<LocalDefinition> {
        self.conn
            .query_row(
                r#"SELECT id, file_id, "row", "column", length FROM local_defs WHERE id = ?1"#,
                [id],
                row_to_local_def,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("local definition {}", id)))
    }

    /// All local definitions in a file, by position
    pub fn local_definitions(&self, file_id: FileId) -> Result<Vec<LocalDefinition>> {
        let mut stmt = self.conn.prepare_cached(
            r#"SELECT id, file_id, "row", "column", length FROM local_defs
               WHERE file_id = ?1 ORDER BY "row", "column""#,
        )?;
        let defs = stmt
            .query_map([file_id], row_to_local_def)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(defs)
    }

    /// The local reference whose token covers `point`, if any
    pub fn local_reference_at(&self, file_id: FileId, point: Point) -> Result<Option<LocalReference>> {
        self.conn
            .prepare_cached(
                r#"SELECT file_id, definition_id, "row", "column", length FROM local_refs
                   WHERE file_id = ?1 AND "row" = ?2 AND "column" <= ?3 AND "column" + length > ?3
                   LIMIT 1"#,
            )?
            .query_row(params![file_id, point.row, point.column], row_to_local_ref)
            .optional()
            .map_err(Into::into)
    }

    /// All use-sites of a local definition
    pub fn local_references_to(&self, definition_id: LocalDefId) -> Result<Vec<LocalReference>> {
        let mut stmt = self.conn.prepare_cached(
            r#"SELECT file_id, definition_id, "row", "column", length FROM local_refs
               WHERE definition_id = ?1 ORDER BY file_id, "row", "column""#,
        )?;
        let refs = stmt
            .query_map([definition_id], row_to_local_ref)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(refs)
    }

    // ========== Global Symbol Operations ==========

    /// Insert a global definition. Re-submitting the same span is an error,
    /// not an update.
    pub fn add_definition(&self, file_id: FileId, def: &NewDefinition) -> Result<()> {
        insert_def(&self.conn, file_id, def)
    }

    /// Insert a global reference. An occupied position is an error.
    pub fn add_reference(&self, file_id: FileId, reference: &NewReference) -> Result<()> {
        insert_ref(&self.conn, file_id, reference)
    }

    /// Replace whatever reference sits at the same position: an explicit
    /// delete-then-insert in one transaction.
    pub fn replace_reference(&mut self, file_id: FileId, reference: &NewReference) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            r#"DELETE FROM refs WHERE file_id = ?1 AND "row" = ?2 AND "column" = ?3"#,
            params![file_id, reference.position.row, reference.position.column],
        )?;
        insert_ref(&tx, file_id, reference)?;
        tx.commit()?;
        Ok(())
    }

    /// Prune global references whose row falls in `rows` (half-open).
    pub fn delete_references_in_range(&self, file_id: FileId, rows: Range<u32>) -> Result<usize> {
        delete_refs_in_range(&self.conn, file_id, rows)
    }

    /// Find definitions by name, ordered by file and position
    pub fn lookup_definitions_by_name(&self, name: &str) -> Result<Vec<Definition>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM defs WHERE name = ?1 \
             ORDER BY file_id, start_row, start_column, end_row, end_column",
            DEF_COLUMNS
        ))?;
        let defs = stmt
            .query_map([name], row_to_definition)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(defs)
    }

    /// All global definitions in a file, by position
    pub fn definitions_in_file(&self, file_id: FileId) -> Result<Vec<Definition>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM defs WHERE file_id = ?1 \
             ORDER BY start_row, start_column, end_row, end_column",
            DEF_COLUMNS
        ))?;
        let defs = stmt
            .query_map([file_id], row_to_definition)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(defs)
    }

    /// Global references in a file whose row falls in `rows` (half-open),
    /// ordered by position
    pub fn lookup_references_in_range(&self, file_id: FileId, rows: Range<u32>) -> Result<Vec<Reference>> {
        if rows.is_empty() {
            self.get_file(file_id)?;
            return Ok(Vec::new());
        }
        self.lookup_references_in_rows(file_id, rows.start..=rows.end - 1)
    }

    /// Same as `lookup_references_in_range` with an inclusive upper row, so
    /// the last representable row can be reached.
    pub fn lookup_references_in_rows(&self, file_id: FileId, rows: RangeInclusive<u32>) -> Result<Vec<Reference>> {
        self.get_file(file_id)?;
        let mut stmt = self.conn.prepare_cached(&format!(
            r#"SELECT {} FROM refs WHERE file_id = ?1 AND "row" BETWEEN ?2 AND ?3
               ORDER BY "row", "column""#,
            REF_COLUMNS
        ))?;
        let refs = stmt
            .query_map(params![file_id, *rows.start(), *rows.end()], row_to_reference)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(refs)
    }

    pub fn references_on_row(&self, file_id: FileId, row: u32) -> Result<Vec<Reference>> {
        self.lookup_references_in_rows(file_id, row..=row)
    }

    /// Every global reference to a name, ordered by file and position
    pub fn references_by_name(&self, name: &str) -> Result<Vec<Reference>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            r#"SELECT {} FROM refs WHERE name = ?1 ORDER BY file_id, "row", "column""#,
            REF_COLUMNS
        ))?;
        let refs = stmt
            .query_map([name], row_to_reference)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(refs)
    }

    // ========== Replace Cycle ==========

    /// Start replacing everything stored for `path`.
    ///
    /// Takes the write lock immediately, drops the old file row (cascading to
    /// all of its symbols) and inserts a fresh one. Nothing is visible to
    /// other connections until `commit`; dropping the transaction rolls back.
    pub fn begin_file(&mut self, path: &str) -> Result<FileTransaction<'_>> {
        FileTransaction::begin(&mut self.conn, path)
    }

    /// Replace a file's contents with a tag document in one transaction.
    pub fn replace_file(&mut self, tags: &FileTags) -> Result<ReplaceSummary> {
        tags.validate()?;
        let mut file = self.begin_file(&tags.path)?;
        for local in &tags.local_definitions {
            let definition_id = file.insert_local_def(local.position, local.length)?;
            for site in &local.references {
                file.insert_local_ref(definition_id, site.position, site.length)?;
            }
        }
        for def in &tags.definitions {
            file.insert_def(def)?;
        }
        for reference in &tags.references {
            file.insert_ref(reference)?;
        }
        file.commit()
    }

    // ========== Statistics ==========

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            files: self.count("files")?,
            local_definitions: self.count("local_defs")?,
            local_references: self.count("local_refs")?,
            definitions: self.count("defs")?,
            references: self.count("refs")?,
        })
    }

    fn count(&self, table: &str) -> Result<usize> {
        debug_assert!(schema::TABLES.contains(&table));
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

// ========== Shared Statements ==========
//
// Used both on the store's connection and inside a `FileTransaction`.

pub(super) fn insert_local_def(conn: &Connection, file_id: FileId, position: Point, length: u32) -> Result<LocalDefId> {
    conn.prepare_cached(
        r#"INSERT INTO local_defs (file_id, "row", "column", length) VALUES (?1, ?2, ?3, ?4)"#,
    )?
    .execute(params![file_id, position.row, position.column, length])
    .map_err(|e| classify(e, || format!("local definition at {}:{}", file_id, position)))?;
    Ok(LocalDefId(conn.last_insert_rowid()))
}

pub(super) fn insert_local_ref(
    conn: &Connection,
    file_id: FileId,
    definition_id: LocalDefId,
    position: Point,
    length: u32,
) -> Result<()> {
    if !exists(conn, "SELECT 1 FROM files WHERE id = ?1", file_id.0)? {
        return Err(Error::ForeignKeyViolation(format!(
            "local reference at {} points at missing file {}",
            position, file_id
        )));
    }
    if !exists(conn, "SELECT 1 FROM local_defs WHERE id = ?1", definition_id.0)? {
        return Err(Error::ForeignKeyViolation(format!(
            "local reference at {}:{} points at missing local definition {}",
            file_id, position, definition_id
        )));
    }
    conn.prepare_cached(
        r#"INSERT INTO local_refs (file_id, definition_id, "row", "column", length)
           VALUES (?1, ?2, ?3, ?4, ?5)"#,
    )?
    .execute(params![file_id, definition_id, position.row, position.column, length])
    .map_err(|e| classify(e, || format!("local reference at {}:{}", file_id, position)))?;
    Ok(())
}

pub(super) fn insert_def(conn: &Connection, file_id: FileId, def: &NewDefinition) -> Result<()> {
    conn.prepare_cached(&format!(
        "INSERT INTO defs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        DEF_COLUMNS
    ))?
    .execute(params![
        file_id,
        def.start.row,
        def.start.column,
        def.end.row,
        def.end.column,
        def.name,
        def.name_start.row,
        def.name_start.column,
        def.kind,
        def.module_path.to_stored(),
    ])
    .map_err(|e| {
        classify(e, || {
            format!("definition {} spanning {}-{} in file {}", def.name, def.start, def.end, file_id)
        })
    })?;
    Ok(())
}

pub(super) fn insert_ref(conn: &Connection, file_id: FileId, reference: &NewReference) -> Result<()> {
    conn.prepare_cached(&format!(
        "INSERT INTO refs ({}) VALUES (?1, ?2, ?3, ?4, ?5)",
        REF_COLUMNS
    ))?
    .execute(params![
        file_id,
        reference.position.row,
        reference.position.column,
        reference.name,
        reference.kind,
    ])
    .map_err(|e| classify(e, || format!("reference at {}:{}", file_id, reference.position)))?;
    Ok(())
}

pub(super) fn delete_refs_in_range(conn: &Connection, file_id: FileId, rows: Range<u32>) -> Result<usize> {
    let removed = conn
        .prepare_cached(r#"DELETE FROM refs WHERE file_id = ?1 AND "row" >= ?2 AND "row" < ?3"#)?
        .execute(params![file_id, rows.start, rows.end])?;
    Ok(removed)
}

fn exists(conn: &Connection, sql: &str, id: i64) -> Result<bool> {
    Ok(conn.prepare_cached(sql)?.exists([id])?)
}

/// Map SQLite constraint failures onto the store's error kinds.
fn classify(err: rusqlite::Error, describe: impl FnOnce() -> String) -> Error {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            match failure.extended_code {
                rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                    return Error::ForeignKeyViolation(format!("{} references a missing row", describe()));
                }
                rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE => {
                    return Error::UniquenessViolation(format!("{} already exists", describe()));
                }
                _ => {}
            }
        }
    }
    Error::Storage(err)
}

// ========== Row Mapping ==========

impl ToSql for FileId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for FileId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(FileId)
    }
}

impl ToSql for LocalDefId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for LocalDefId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(LocalDefId)
    }
}

fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        path: row.get(1)?,
    })
}

fn row_to_local_def(row: &rusqlite::Row) -> rusqlite::Result<LocalDefinition> {
    Ok(LocalDefinition {
        id: row.get(0)?,
        file_id: row.get(1)?,
        position: Point::new(row.get(2)?, row.get(3)?),
        length: row.get(4)?,
    })
}

fn row_to_local_ref(row: &rusqlite::Row) -> rusqlite::Result<LocalReference> {
    Ok(LocalReference {
        file_id: row.get(0)?,
        definition_id: row.get(1)?,
        position: Point::new(row.get(2)?, row.get(3)?),
        length: row.get(4)?,
    })
}

fn row_to_definition(row: &rusqlite::Row) -> rusqlite::Result<Definition> {
    let module_path: String = row.get(9)?;
    Ok(Definition {
        file_id: row.get(0)?,
        start: Point::new(row.get(1)?, row.get(2)?),
        end: Point::new(row.get(3)?, row.get(4)?),
        name: row.get(5)?,
        name_start: Point::new(row.get(6)?, row.get(7)?),
        kind: row.get(8)?,
        module_path: ModulePath::from_stored(&module_path),
    })
}

fn row_to_reference(row: &rusqlite::Row) -> rusqlite::Result<Reference> {
    Ok(Reference {
        file_id: row.get(0)?,
        position: Point::new(row.get(1)?, row.get(2)?),
        name: row.get(3)?,
        kind: row.get(4)?,
    })
}

/// Database statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DbStats {
    pub files: usize,
    pub local_definitions: usize,
    pub local_references: usize,
    pub definitions: usize,
    pub references: usize,
}

impl DbStats {
    /// Label/value pairs for table output
    pub fn rows(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("Files", self.files),
            ("Local definitions", self.local_definitions),
            ("Local references", self.local_references),
            ("Definitions", self.definitions),
            ("References", self.references),
        ]
    }
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Files: {}", self.files)?;
        writeln!(f, "  Local definitions: {}", self.local_definitions)?;
        writeln!(f, "  Local references: {}", self.local_references)?;
        writeln!(f, "  Definitions: {}", self.definitions)?;
        write!(f, "  References: {}", self.references)
    }
}
