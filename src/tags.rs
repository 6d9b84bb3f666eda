//! Tag documents - what an external indexer found in one file
//!
//! A tag document is the ingestion wire format: JSON, one document per
//! source file. Submitting it replaces everything stored for that path.

use crate::position::Point;
use crate::symbol::{NewDefinition, NewReference};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// All tags for one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTags {
    pub path: String,
    #[serde(default)]
    pub local_definitions: Vec<LocalTag>,
    #[serde(default)]
    pub definitions: Vec<NewDefinition>,
    #[serde(default)]
    pub references: Vec<NewReference>,
}

/// A local definition together with its use-sites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTag {
    pub position: Point,
    pub length: u32,
    #[serde(default)]
    pub references: Vec<LocalUse>,
}

/// A use-site of a local definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUse {
    pub position: Point,
    pub length: u32,
}

impl FileTags {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let tags: FileTags = serde_json::from_str(json)?;
        tags.validate()?;
        Ok(tags)
    }

    /// Read and validate a tag document from disk
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Reject documents the store would only half understand.
    ///
    /// Duplicate positions are left to the store, which rejects them with a
    /// uniqueness violation and rolls the whole document back.
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(Error::InvalidTags("document has an empty path".to_string()));
        }
        for def in &self.definitions {
            if def.name.is_empty() {
                return Err(Error::InvalidTags(format!(
                    "definition at {} in {} has an empty name",
                    def.start, self.path
                )));
            }
            if def.end < def.start {
                return Err(Error::InvalidTags(format!(
                    "definition {} in {} ends ({}) before it starts ({})",
                    def.name, self.path, def.end, def.start
                )));
            }
        }
        if let Some(reference) = self.references.iter().find(|r| r.name.is_empty()) {
            return Err(Error::InvalidTags(format!(
                "reference at {} in {} has an empty name",
                reference.position, self.path
            )));
        }
        Ok(())
    }

    pub fn local_reference_count(&self) -> usize {
        self.local_definitions.iter().map(|d| d.references.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "path": "src/app.ts",
        "local_definitions": [
            { "position": {"row": 3, "column": 6}, "length": 5,
              "references": [ {"position": {"row": 4, "column": 2}, "length": 5} ] }
        ],
        "definitions": [
            { "name": "main", "kind": "function", "module_path": ["app"],
              "start": {"row": 0, "column": 0}, "end": {"row": 9, "column": 1},
              "name_start": {"row": 0, "column": 9} }
        ],
        "references": [ { "name": "print", "kind": "call", "position": {"row": 5, "column": 4} } ]
    }"#;

    #[test]
    fn test_parse_document() {
        let tags = FileTags::from_json(SAMPLE).unwrap();
        assert_eq!(tags.path, "src/app.ts");
        assert_eq!(tags.local_definitions.len(), 1);
        assert_eq!(tags.local_reference_count(), 1);
        assert_eq!(tags.definitions[0].kind.as_deref(), Some("function"));
        assert_eq!(tags.definitions[0].module_path.to_string(), "app");
        assert_eq!(tags.references[0].position, Point::new(5, 4));
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let tags = FileTags::from_json(r#"{"path": "empty.py"}"#).unwrap();
        assert!(tags.local_definitions.is_empty());
        assert!(tags.definitions.is_empty());
        assert!(tags.references.is_empty());
    }

    #[test]
    fn test_rejects_empty_path() {
        let err = FileTags::from_json(r#"{"path": "  "}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidTags(_)));
    }

    #[test]
    fn test_rejects_inverted_span() {
        let mut tags = FileTags::new("a.rs");
        tags.definitions.push(NewDefinition::new(
            "f",
            Point::new(5, 0),
            Point::new(2, 0),
            Point::new(5, 3),
        ));
        assert!(matches!(tags.validate(), Err(Error::InvalidTags(_))));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(FileTags::from_json("{"), Err(Error::Json(_))));
    }
}
