//! Database schema definitions
//!
//! Two generations exist. The legacy one (no version stamp) only knows files
//! and local symbols and never enforced unique paths or cascading deletes.
//! The current one adds the global `defs`/`refs` tables and both invariants.

/// Schema version written to `PRAGMA user_version`
pub const SCHEMA_VERSION: u32 = 2;

/// Version reported for a legacy database
pub const LEGACY_VERSION: u32 = 1;

/// Legacy files/local_defs/local_refs layout, kept so old databases can be
/// recognised and migrated.
pub const LEGACY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS local_defs (
    id INTEGER PRIMARY KEY,
    file_id INTEGER NOT NULL,
    "row" INTEGER NOT NULL,
    "column" INTEGER NOT NULL,
    length INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS local_refs (
    file_id INTEGER NOT NULL,
    definition_id INTEGER NOT NULL,
    "row" INTEGER NOT NULL,
    "column" INTEGER NOT NULL,
    length INTEGER NOT NULL,
    PRIMARY KEY (file_id, "row", "column")
);
"#;

/// SQL to create the files table
pub const CREATE_FILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE
)
"#;

/// SQL to create the local_defs table
pub const CREATE_LOCAL_DEFS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS local_defs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    "row" INTEGER NOT NULL,
    "column" INTEGER NOT NULL,
    length INTEGER NOT NULL
)
"#;

/// SQL to create the local_refs table
pub const CREATE_LOCAL_REFS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS local_refs (
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    definition_id INTEGER NOT NULL REFERENCES local_defs(id) ON DELETE CASCADE,
    "row" INTEGER NOT NULL,
    "column" INTEGER NOT NULL,
    length INTEGER NOT NULL,
    PRIMARY KEY (file_id, "row", "column")
)
"#;

/// SQL to create the global defs table
pub const CREATE_DEFS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS defs (
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    start_row INTEGER NOT NULL,
    start_column INTEGER NOT NULL,
    end_row INTEGER NOT NULL,
    end_column INTEGER NOT NULL,
    name TEXT NOT NULL,
    name_start_row INTEGER NOT NULL,
    name_start_column INTEGER NOT NULL,
    kind TEXT,
    module_path TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (file_id, start_row, start_column, end_row, end_column)
)
"#;

/// SQL to create the global refs table
pub const CREATE_REFS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS refs (
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    "row" INTEGER NOT NULL,
    "column" INTEGER NOT NULL,
    name TEXT NOT NULL,
    kind TEXT,
    PRIMARY KEY (file_id, "row", "column")
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_local_defs_file ON local_defs(file_id)",
    "CREATE INDEX IF NOT EXISTS idx_local_refs_definition ON local_refs(definition_id)",
    "CREATE INDEX IF NOT EXISTS idx_defs_name ON defs(name)",
    "CREATE INDEX IF NOT EXISTS idx_refs_name ON refs(name)",
];

/// All schema creation statements, parents before children
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_FILES_TABLE,
        CREATE_LOCAL_DEFS_TABLE,
        CREATE_LOCAL_REFS_TABLE,
        CREATE_DEFS_TABLE,
        CREATE_REFS_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}

/// Tables in child-to-parent order, for counting and teardown
pub const TABLES: &[&str] = &["local_refs", "local_defs", "refs", "defs", "files"];
