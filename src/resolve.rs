//! Definition resolver - "go to definition" and "find usages"
//!
//! Resolution order:
//! 1. Local: a local reference covering the position links straight to its
//!    definition by id
//! 2. Global: the reference's name is looked up among all definitions;
//!    definitions of the same kind win when there are any, and definitions
//!    in the same file are listed first
//!
//! The store only indexes names and positions; this module is the consumer
//! that turns them into answers.

use std::collections::HashMap;
use std::fmt;
use serde::Serialize;
use crate::position::Point;
use crate::storage::SqliteStore;
use crate::symbol::{Definition, FileId, LocalDefId, Reference};
use crate::{Error, Result};

/// Default cap on returned locations
pub const DEFAULT_LIMIT: usize = 50;

/// A token in a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub path: String,
    pub position: Point,
    pub length: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.path, self.position.row, self.position.column, self.length)
    }
}

/// What sits under the cursor
enum Target {
    Local(LocalDefId),
    Global(String),
    Nothing,
}

/// Resolves positions against a store
pub struct DefinitionResolver<'a> {
    store: &'a SqliteStore,
    limit: usize,
    paths: HashMap<FileId, String>,
}

impl<'a> DefinitionResolver<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        Self {
            store,
            limit: DEFAULT_LIMIT,
            paths: HashMap::new(),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Definitions of the symbol referenced at `point` in `path`
    pub fn find_definition(&mut self, path: &str, point: Point) -> Result<Vec<Location>> {
        let file_id = self.indexed_file(path)?;

        if let Some(local) = self.store.local_reference_at(file_id, point)? {
            let def = self.store.local_definition(local.definition_id)?;
            let def_path = self.path_of(def.file_id)?;
            return Ok(vec![Location {
                path: def_path,
                position: def.position,
                length: def.length,
            }]);
        }

        let Some(reference) = self.reference_at(file_id, point)? else {
            tracing::debug!("No reference at {}:{}", path, point);
            return Ok(Vec::new());
        };

        let candidates = self.candidates(file_id, &reference)?;
        candidates
            .into_iter()
            .take(self.limit)
            .map(|def| self.definition_location(&def))
            .collect()
    }

    /// Every use-site of the symbol at `point`, which may be either a
    /// definition or a reference.
    pub fn find_usages(&mut self, path: &str, point: Point) -> Result<Vec<Location>> {
        let file_id = self.indexed_file(path)?;

        match self.target_at(file_id, point)? {
            Target::Local(definition_id) => self
                .store
                .local_references_to(definition_id)?
                .into_iter()
                .take(self.limit)
                .map(|r| -> Result<Location> {
                    Ok(Location {
                        path: self.path_of(r.file_id)?,
                        position: r.position,
                        length: r.length,
                    })
                })
                .collect(),
            Target::Global(name) => self
                .store
                .references_by_name(&name)?
                .into_iter()
                .take(self.limit)
                .map(|r| -> Result<Location> {
                    Ok(Location {
                        path: self.path_of(r.file_id)?,
                        position: r.position,
                        length: r.name_length(),
                    })
                })
                .collect(),
            Target::Nothing => Ok(Vec::new()),
        }
    }

    fn target_at(&self, file_id: FileId, point: Point) -> Result<Target> {
        if let Some(local) = self.store.local_reference_at(file_id, point)? {
            return Ok(Target::Local(local.definition_id));
        }
        if let Some(def) = self
            .store
            .local_definitions(file_id)?
            .into_iter()
            .find(|d| d.position.token_covers(d.length, point))
        {
            return Ok(Target::Local(def.id));
        }
        if let Some(reference) = self.reference_at(file_id, point)? {
            return Ok(Target::Global(reference.name));
        }
        if let Some(def) = self
            .store
            .definitions_in_file(file_id)?
            .into_iter()
            .find(|d| d.name_start.token_covers(d.name_length(), point))
        {
            return Ok(Target::Global(def.name));
        }
        Ok(Target::Nothing)
    }

    fn reference_at(&self, file_id: FileId, point: Point) -> Result<Option<Reference>> {
        let row = self.store.references_on_row(file_id, point.row)?;
        Ok(row.into_iter().find(|r| r.covers(point)))
    }

    /// Same-kind definitions when any exist, otherwise all of them; the
    /// referencing file first.
    fn candidates(&self, file_id: FileId, reference: &Reference) -> Result<Vec<Definition>> {
        let mut defs = self.store.lookup_definitions_by_name(&reference.name)?;
        if let Some(kind) = reference.kind.as_deref() {
            if defs.iter().any(|d| d.kind.as_deref() == Some(kind)) {
                defs.retain(|d| d.kind.as_deref() == Some(kind));
            }
        }
        defs.sort_by_key(|d| d.file_id != file_id);
        Ok(defs)
    }

    fn definition_location(&mut self, def: &Definition) -> Result<Location> {
        Ok(Location {
            path: self.path_of(def.file_id)?,
            position: def.name_start,
            length: def.name_length(),
        })
    }

    fn indexed_file(&self, path: &str) -> Result<FileId> {
        self.store
            .file_id(path)?
            .ok_or_else(|| Error::NotFound(format!("file {} is not indexed", path)))
    }

    fn path_of(&mut self, file_id: FileId) -> Result<String> {
        if let Some(path) = self.paths.get(&file_id) {
            return Ok(path.clone());
        }
        let path = self.store.get_file(file_id)?.path;
        self.paths.insert(file_id, path.clone());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{NewDefinition, NewReference};

    /// `helper` is a function in a.py and a class in b.py; b.py calls the
    /// function and has one local variable.
    fn fixture() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.add_file("a.py").unwrap();
        let b = store.add_file("b.py").unwrap();

        store
            .add_definition(
                a,
                &NewDefinition::new("helper", Point::new(0, 0), Point::new(3, 0), Point::new(0, 4))
                    .with_kind("function"),
            )
            .unwrap();
        store
            .add_definition(
                b,
                &NewDefinition::new("helper", Point::new(10, 0), Point::new(12, 0), Point::new(10, 6))
                    .with_kind("class"),
            )
            .unwrap();
        store
            .add_reference(b, &NewReference::new("helper", Point::new(5, 2)).with_kind("function"))
            .unwrap();
        store
            .add_reference(a, &NewReference::new("helper", Point::new(7, 0)))
            .unwrap();

        let local = store.add_local_definition(b, Point::new(1, 0), 5).unwrap();
        store.add_local_reference(b, local, Point::new(2, 6), 5).unwrap();
        store.add_local_reference(b, local, Point::new(3, 1), 5).unwrap();
        store
    }

    #[test]
    fn test_local_resolution_wins() {
        let store = fixture();
        let mut resolver = DefinitionResolver::new(&store);
        let found = resolver.find_definition("b.py", Point::new(2, 9)).unwrap();
        assert_eq!(
            found,
            vec![Location { path: "b.py".into(), position: Point::new(1, 0), length: 5 }]
        );
    }

    #[test]
    fn test_global_resolution_prefers_kind() {
        let store = fixture();
        let mut resolver = DefinitionResolver::new(&store);
        let found = resolver.find_definition("b.py", Point::new(5, 4)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "a.py");
        assert_eq!(found[0].position, Point::new(0, 4));
        assert_eq!(found[0].length, 6);
    }

    #[test]
    fn test_global_resolution_same_file_first() {
        let store = fixture();
        let mut resolver = DefinitionResolver::new(&store);
        // Untyped reference in a.py: both definitions qualify, a.py first.
        let found = resolver.find_definition("a.py", Point::new(7, 3)).unwrap();
        let paths: Vec<&str> = found.iter().map(|l| l.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "b.py"]);

        let mut limited = DefinitionResolver::new(&store).with_limit(1);
        assert_eq!(limited.find_definition("a.py", Point::new(7, 3)).unwrap().len(), 1);
    }

    #[test]
    fn test_nothing_at_position() {
        let store = fixture();
        let mut resolver = DefinitionResolver::new(&store);
        assert!(resolver.find_definition("b.py", Point::new(20, 0)).unwrap().is_empty());
        assert!(resolver.find_usages("b.py", Point::new(20, 0)).unwrap().is_empty());
    }

    #[test]
    fn test_unindexed_file() {
        let store = fixture();
        let mut resolver = DefinitionResolver::new(&store);
        assert!(matches!(
            resolver.find_definition("c.py", Point::new(0, 0)),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_local_usages_from_definition() {
        let store = fixture();
        let mut resolver = DefinitionResolver::new(&store);
        let usages = resolver.find_usages("b.py", Point::new(1, 2)).unwrap();
        let positions: Vec<Point> = usages.iter().map(|l| l.position).collect();
        assert_eq!(positions, vec![Point::new(2, 6), Point::new(3, 1)]);
    }

    #[test]
    fn test_global_usages_from_definition_name() {
        let store = fixture();
        let mut resolver = DefinitionResolver::new(&store);
        let usages = resolver.find_usages("a.py", Point::new(0, 5)).unwrap();
        let rendered: Vec<String> = usages.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["a.py 7 0 6", "b.py 5 2 6"]);
    }
}
