//! Symbol records
//!
//! Two families live side by side:
//! - Local: `LocalDefinition` / `LocalReference`, scoped to one file and linked by id
//! - Global: `Definition` / `Reference`, linked by name, kind and module path
//!
//! Every record is owned by exactly one file and disappears with it.

use crate::position::Point;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a file row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub i64);

/// Identity of a local definition row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalDefId(pub i64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LocalDefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An indexed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    /// Canonical path, unique across the store
    pub path: String,
}

/// A definition local to one file's lexical scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDefinition {
    pub id: LocalDefId,
    pub file_id: FileId,
    pub position: Point,
    /// Length of the defining token in bytes
    pub length: u32,
}

/// A use-site pointing at a `LocalDefinition` by id.
///
/// At most one local reference may start at a given position in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalReference {
    pub file_id: FileId,
    pub definition_id: LocalDefId,
    pub position: Point,
    pub length: u32,
}

/// Dotted module path qualifying a global definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModulePath(pub Vec<String>);

impl ModulePath {
    /// Parse a path written with `.`, `/` or `::` separators.
    pub fn parse(path: &str) -> Self {
        let segments = path
            .split(['.', '/'])
            .flat_map(|part| part.split("::"))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self(segments)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Column encoding: every segment is terminated by a tab.
    pub fn to_stored(&self) -> String {
        let mut stored = String::with_capacity(self.0.iter().map(|s| s.len() + 1).sum());
        for segment in &self.0 {
            stored.push_str(segment);
            stored.push('\t');
        }
        stored
    }

    pub fn from_stored(stored: &str) -> Self {
        Self(
            stored
                .split('\t')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// A global definition as submitted by an indexer (no owning file yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDefinition {
    pub name: String,
    /// Open tag such as `function`, `class` or `variable`
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub module_path: ModulePath,
    /// Start of the full span
    pub start: Point,
    /// End of the full span
    pub end: Point,
    /// Start of the identifier token inside the span
    pub name_start: Point,
}

impl NewDefinition {
    pub fn new(name: impl Into<String>, start: Point, end: Point, name_start: Point) -> Self {
        Self {
            name: name.into(),
            kind: None,
            module_path: ModulePath::default(),
            start,
            end,
            name_start,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_module_path(mut self, module_path: ModulePath) -> Self {
        self.module_path = module_path;
        self
    }
}

/// A stored global definition.
///
/// Identity is `(file_id, start, end)`: nested definitions are fine as long as
/// their spans differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub file_id: FileId,
    pub name: String,
    pub kind: Option<String>,
    pub module_path: ModulePath,
    pub start: Point,
    pub end: Point,
    pub name_start: Point,
}

impl Definition {
    pub fn from_new(file_id: FileId, def: &NewDefinition) -> Self {
        Self {
            file_id,
            name: def.name.clone(),
            kind: def.kind.clone(),
            module_path: def.module_path.clone(),
            start: def.start,
            end: def.end,
            name_start: def.name_start,
        }
    }

    /// Length of the identifier token in bytes
    pub fn name_length(&self) -> u32 {
        self.name.len() as u32
    }

    /// Name qualified by its module path, e.g. `app.server.main`
    pub fn qualified_name(&self) -> String {
        if self.module_path.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.module_path, self.name)
        }
    }
}

/// A global reference as submitted by an indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReference {
    pub name: String,
    #[serde(default)]
    pub kind: Option<String>,
    pub position: Point,
}

impl NewReference {
    pub fn new(name: impl Into<String>, position: Point) -> Self {
        Self {
            name: name.into(),
            kind: None,
            position,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

/// A stored global reference. Carries no definition id: consumers resolve it
/// by name, kind and scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub file_id: FileId,
    pub name: String,
    pub kind: Option<String>,
    pub position: Point,
}

impl Reference {
    pub fn name_length(&self) -> u32 {
        self.name.len() as u32
    }

    /// Whether the referenced identifier covers `point`
    pub fn covers(&self, point: Point) -> bool {
        self.position.token_covers(self.name_length(), point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_path_stored_form() {
        let path = ModulePath::parse("app.server");
        assert_eq!(path.to_stored(), "app\tserver\t");
        assert_eq!(ModulePath::from_stored("app\tserver\t"), path);
        assert_eq!(ModulePath::from_stored(""), ModulePath::default());
    }

    #[test]
    fn test_module_path_separators() {
        let expected = ModulePath(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(ModulePath::parse("a/b/c"), expected);
        assert_eq!(ModulePath::parse("a::b::c"), expected);
        assert_eq!(ModulePath::parse("a.b.c"), expected);
        assert_eq!(expected.to_string(), "a.b.c");
    }

    #[test]
    fn test_qualified_name() {
        let def = NewDefinition::new("main", Point::new(0, 0), Point::new(3, 1), Point::new(0, 3))
            .with_kind("function")
            .with_module_path(ModulePath::parse("app"));
        let stored = Definition::from_new(FileId(1), &def);
        assert_eq!(stored.qualified_name(), "app.main");
        assert_eq!(stored.name_length(), 4);

        let bare = Definition::from_new(FileId(1), &NewDefinition::new("x", Point::default(), Point::default(), Point::default()));
        assert_eq!(bare.qualified_name(), "x");
    }

    #[test]
    fn test_reference_covers() {
        let reference = Reference {
            file_id: FileId(1),
            name: "print".into(),
            kind: Some("call".into()),
            position: Point::new(2, 4),
        };
        assert!(reference.covers(Point::new(2, 8)));
        assert!(!reference.covers(Point::new(2, 9)));
    }
}
