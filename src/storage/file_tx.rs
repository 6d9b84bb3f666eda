//! Per-file replace transactions
//!
//! Re-indexing a file deletes everything stored for it and inserts the fresh
//! tags. Both halves run inside one `IMMEDIATE` transaction so no reader ever
//! sees the file half replaced.

use std::fmt;
use std::ops::Range;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use crate::position::Point;
use crate::symbol::{FileId, LocalDefId, NewDefinition, NewReference};
use crate::Result;
use super::sqlite;

/// An open replace cycle for one file.
///
/// Rolls back on drop unless `commit` was called.
pub struct FileTransaction<'a> {
    tx: Transaction<'a>,
    summary: ReplaceSummary,
}

impl<'a> FileTransaction<'a> {
    pub(super) fn begin(conn: &'a mut Connection, path: &str) -> Result<Self> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = tx.execute("DELETE FROM files WHERE path = ?1", [path])?;
        tx.execute("INSERT INTO files (path) VALUES (?1)", [path])?;
        let file_id = FileId(tx.last_insert_rowid());
        tracing::debug!("Replacing {} (file {}, existed: {})", path, file_id, removed > 0);

        Ok(Self {
            tx,
            summary: ReplaceSummary {
                file_id,
                path: path.to_string(),
                replaced: removed > 0,
                ..Default::default()
            },
        })
    }

    /// Id of the fresh file row
    pub fn file_id(&self) -> FileId {
        self.summary.file_id
    }

    pub fn path(&self) -> &str {
        &self.summary.path
    }

    pub fn insert_local_def(&mut self, position: Point, length: u32) -> Result<LocalDefId> {
        let id = sqlite::insert_local_def(&self.tx, self.summary.file_id, position, length)?;
        self.summary.local_definitions += 1;
        Ok(id)
    }

    pub fn insert_local_ref(&mut self, definition_id: LocalDefId, position: Point, length: u32) -> Result<()> {
        sqlite::insert_local_ref(&self.tx, self.summary.file_id, definition_id, position, length)?;
        self.summary.local_references += 1;
        Ok(())
    }

    pub fn insert_def(&mut self, def: &NewDefinition) -> Result<()> {
        sqlite::insert_def(&self.tx, self.summary.file_id, def)?;
        self.summary.definitions += 1;
        Ok(())
    }

    pub fn insert_ref(&mut self, reference: &NewReference) -> Result<()> {
        sqlite::insert_ref(&self.tx, self.summary.file_id, reference)?;
        self.summary.references += 1;
        Ok(())
    }

    /// Drop references in a row range before re-inserting them
    pub fn prune_references(&mut self, rows: Range<u32>) -> Result<usize> {
        let removed = sqlite::delete_refs_in_range(&self.tx, self.summary.file_id, rows)?;
        self.summary.references = self.summary.references.saturating_sub(removed);
        Ok(removed)
    }

    /// Publish the new contents of the file
    pub fn commit(self) -> Result<ReplaceSummary> {
        self.tx.commit()?;
        tracing::debug!("Committed {}", self.summary);
        Ok(self.summary)
    }

    /// Discard everything done in this cycle, including the delete
    pub fn rollback(self) -> Result<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

/// What a replace cycle wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceSummary {
    pub file_id: FileId,
    pub path: String,
    /// Whether an older version of the file was removed
    pub replaced: bool,
    pub local_definitions: usize,
    pub local_references: usize,
    pub definitions: usize,
    pub references: usize,
}

impl ReplaceSummary {
    pub fn total_symbols(&self) -> usize {
        self.local_definitions + self.local_references + self.definitions + self.references
    }
}

impl fmt::Display for ReplaceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (file {}): {} local defs, {} local refs, {} defs, {} refs",
            self.path,
            self.file_id,
            self.local_definitions,
            self.local_references,
            self.definitions,
            self.references
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::position::Point;
    use crate::storage::SqliteStore;
    use crate::symbol::{NewDefinition, NewReference};
    use crate::Error;

    #[test]
    fn test_transaction_commit() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut file = store.begin_file("lib/a.py").unwrap();
        let def = file.insert_local_def(Point::new(0, 0), 3).unwrap();
        file.insert_local_ref(def, Point::new(1, 4), 3).unwrap();
        file.insert_def(&NewDefinition::new("a", Point::new(0, 0), Point::new(2, 0), Point::new(0, 4)))
            .unwrap();
        file.insert_ref(&NewReference::new("b", Point::new(1, 0))).unwrap();
        let file_id = file.file_id();
        assert_eq!(file.path(), "lib/a.py");
        let summary = file.commit().unwrap();

        assert_eq!(summary.file_id, file_id);
        assert_eq!(summary.total_symbols(), 4);
        assert_eq!(store.stats().unwrap().files, 1);
        assert_eq!(store.local_definitions(file_id).unwrap().len(), 1);
    }

    #[test]
    fn test_explicit_rollback_restores_old_file() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let original = store.add_file("lib/a.py").unwrap();
        store.add_reference(original, &NewReference::new("x", Point::new(0, 0))).unwrap();

        let mut file = store.begin_file("lib/a.py").unwrap();
        file.insert_ref(&NewReference::new("y", Point::new(0, 0))).unwrap();
        file.rollback().unwrap();

        assert_eq!(store.file_id("lib/a.py").unwrap(), Some(original));
        assert_eq!(store.references_by_name("x").unwrap().len(), 1);
        assert!(store.references_by_name("y").unwrap().is_empty());
    }

    #[test]
    fn test_prune_inside_transaction() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut file = store.begin_file("a.rs").unwrap();
        for row in 0..5 {
            file.insert_ref(&NewReference::new("old", Point::new(row, 0))).unwrap();
        }
        assert_eq!(file.prune_references(1..3).unwrap(), 2);
        file.insert_ref(&NewReference::new("new", Point::new(1, 0))).unwrap();
        let summary = file.commit().unwrap();
        assert_eq!(summary.references, 4);
        assert_eq!(store.references_by_name("new").unwrap().len(), 1);
    }

    #[test]
    fn test_missing_definition_inside_transaction() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut file = store.begin_file("a.rs").unwrap();
        let err = file
            .insert_local_ref(crate::symbol::LocalDefId(404), Point::new(0, 0), 1)
            .unwrap_err();
        assert!(matches!(err, Error::ForeignKeyViolation(_)));
    }
}
