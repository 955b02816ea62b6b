//! Schema registry: immutable table and column metadata.
//!
//! The registry is built once at startup, checked for consistency, and then
//! only read. Every other component takes it by reference; there is no global
//! table lookup.

use crate::{DatabaseResult, SchemaError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Foreign key target, written `Table.column` in descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ForeignRef {
    pub table: String,
    pub column: String,
}

impl ForeignRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl TryFrom<String> for ForeignRef {
    type Error = SchemaError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        match raw.split_once('.') {
            Some((table, column)) if !table.is_empty() && !column.is_empty() => {
                Ok(Self::new(table.trim(), column.trim()))
            }
            _ => Err(SchemaError::InvalidDefinition(format!(
                "foreign reference must be Table.column, got {raw:?}"
            ))),
        }
    }
}

impl From<ForeignRef> for String {
    fn from(f: ForeignRef) -> Self {
        f.to_string()
    }
}

impl fmt::Display for ForeignRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Set of columns whose combined values must not repeat within a table.
///
/// Written as a comma-joined field list in descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UniqueConstraint {
    pub columns: Vec<String>,
}

impl UniqueConstraint {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn label(&self) -> String {
        self.columns.join(",")
    }
}

impl TryFrom<String> for UniqueConstraint {
    type Error = SchemaError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        let columns: Vec<String> = raw
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if columns.is_empty() {
            return Err(SchemaError::InvalidDefinition(
                "unique constraint must name at least one column".to_string(),
            ));
        }
        Ok(Self { columns })
    }
}

impl From<UniqueConstraint> for String {
    fn from(u: UniqueConstraint) -> Self {
        u.label()
    }
}

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub field: String,
    /// SQLite storage type, e.g. `INTEGER`, `TEXT`, `DATETIME`
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub auto_increment: bool,
    /// Raw SQL default expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign: Option<ForeignRef>,
    #[serde(default)]
    pub encrypted: bool,
    /// Sibling column holding the digest of this column's plaintext
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_col: Option<String>,
}

impl ColumnDefinition {
    pub fn new(field: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            data_type: data_type.into(),
            primary: false,
            auto_increment: false,
            default: None,
            foreign: None,
            encrypted: false,
            hash_col: None,
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign = Some(ForeignRef::new(table, column));
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    pub fn hashed_into(mut self, hash_col: impl Into<String>) -> Self {
        self.hash_col = Some(hash_col.into());
        self
    }
}

/// A registered table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique: Vec<UniqueConstraint>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            unique: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn unique<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique.push(UniqueConstraint::new(columns));
        self
    }

    /// Look up a column by field name.
    pub fn get_column(&self, field: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.field == field)
    }

    pub fn has_column(&self, field: &str) -> bool {
        self.get_column(field).is_some()
    }

    pub fn is_encrypted(&self, field: &str) -> bool {
        self.get_column(field).map(|c| c.encrypted).unwrap_or(false)
    }

    pub fn primary_key(&self) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.primary)
    }

    pub fn encrypted_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| c.encrypted)
    }

    pub fn hashed_columns(&self) -> impl Iterator<Item = (&ColumnDefinition, &str)> {
        self.columns
            .iter()
            .filter_map(|c| c.hash_col.as_deref().map(|h| (c, h)))
    }

    /// First column whose foreign key points at `table`.
    pub fn foreign_column_to(&self, table: &str) -> Option<&ColumnDefinition> {
        self.columns
            .iter()
            .find(|c| c.foreign.as_ref().is_some_and(|f| f.table == table))
    }
}

/// Immutable set of table definitions, in declaration order.
#[derive(Debug, Clone)]
pub struct Registry {
    tables: Vec<TableDefinition>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Build a registry, rejecting inconsistent definitions.
    pub fn new(tables: Vec<TableDefinition>) -> Result<Self, SchemaError> {
        let mut index = HashMap::with_capacity(tables.len());
        for (pos, table) in tables.iter().enumerate() {
            check_identifier(&table.name)?;
            if index.insert(table.name.clone(), pos).is_some() {
                return Err(SchemaError::InvalidDefinition(format!(
                    "table {} is declared twice",
                    table.name
                )));
            }
        }

        let registry = Self { tables, index };
        for table in &registry.tables {
            registry.check_table(table)?;
        }

        debug!(tables = registry.tables.len(), "Schema registry loaded");
        Ok(registry)
    }

    /// Parse a JSON array of table descriptors.
    pub fn from_json(json: &str) -> DatabaseResult<Self> {
        let tables: Vec<TableDefinition> = serde_json::from_str(json)?;
        Ok(Self::new(tables)?)
    }

    /// Load table descriptors from a JSON file.
    pub fn load_from_file(path: &Path) -> DatabaseResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Look up a table, failing with `SchemaError::UnknownTable`.
    pub fn lookup(&self, table: &str) -> Result<&TableDefinition, SchemaError> {
        self.index
            .get(table)
            .map(|&pos| &self.tables[pos])
            .ok_or_else(|| SchemaError::UnknownTable(table.to_string()))
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDefinition> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    fn check_table(&self, table: &TableDefinition) -> Result<(), SchemaError> {
        let invalid = |msg: String| SchemaError::InvalidDefinition(format!("{}: {}", table.name, msg));

        if table.columns.is_empty() {
            return Err(invalid("table has no columns".to_string()));
        }

        let mut seen = HashSet::new();
        for col in &table.columns {
            check_identifier(&col.field)?;
            let type_ok = !col.data_type.is_empty()
                && col
                    .data_type
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '(' | ')' | ','));
            if !type_ok {
                return Err(invalid(format!("column {} has invalid type {:?}", col.field, col.data_type)));
            }
            if !seen.insert(col.field.as_str()) {
                return Err(invalid(format!("column {} is declared twice", col.field)));
            }
        }

        let mut hash_targets = HashSet::new();
        for col in &table.columns {
            if let Some(foreign) = &col.foreign {
                let target = self.lookup(&foreign.table).map_err(|_| {
                    invalid(format!("{} references unknown table {}", col.field, foreign.table))
                })?;
                if !target.has_column(&foreign.column) {
                    return Err(invalid(format!(
                        "{} references unknown column {}",
                        col.field, foreign
                    )));
                }
            }

            if let Some(hash_col) = &col.hash_col {
                if hash_col == &col.field || !table.has_column(hash_col) {
                    return Err(invalid(format!(
                        "hash column {} of {} must be a sibling column",
                        hash_col, col.field
                    )));
                }
                if table.is_encrypted(hash_col) {
                    return Err(invalid(format!("hash column {} cannot be encrypted", hash_col)));
                }
                if !hash_targets.insert(hash_col.as_str()) {
                    return Err(invalid(format!(
                        "hash column {} is shared by more than one column",
                        hash_col
                    )));
                }
            }
        }

        for constraint in &table.unique {
            for field in &constraint.columns {
                let col = table.get_column(field).ok_or_else(|| {
                    invalid(format!("unique constraint names unknown column {}", field))
                })?;
                if col.encrypted {
                    return Err(invalid(format!(
                        "unique constraint must use the hash column of encrypted column {}",
                        field
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Accept only plain SQL identifiers, so names can be interpolated safely.
fn check_identifier(name: &str) -> Result<(), SchemaError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SchemaError::InvalidDefinition(format!(
            "{name:?} is not a valid identifier"
        )))
    }
}

/// The notes application schema: users, note types and notes.
pub fn notes_schema() -> Registry {
    let tables = vec![
        TableDefinition::new("USERS")
            .column(ColumnDefinition::new("user_id", "INTEGER").primary().auto_increment())
            .column(ColumnDefinition::new("user_code", "TEXT")),
        TableDefinition::new("NOTE_TYPES")
            .column(ColumnDefinition::new("note_type_id", "INTEGER").primary().auto_increment())
            .column(ColumnDefinition::new("user_id", "INTEGER").references("USERS", "user_id"))
            .column(
                ColumnDefinition::new("note_type_title", "TEXT")
                    .encrypted()
                    .hashed_into("note_type_title_hash"),
            )
            .column(ColumnDefinition::new("note_type_title_hash", "TEXT"))
            .unique(["user_id", "note_type_title_hash"]),
        TableDefinition::new("NOTES")
            .column(ColumnDefinition::new("note_id", "INTEGER").primary().auto_increment())
            .column(ColumnDefinition::new("user_id", "INTEGER").references("USERS", "user_id"))
            .column(
                ColumnDefinition::new("note_type_id", "INTEGER")
                    .references("NOTE_TYPES", "note_type_id"),
            )
            .column(ColumnDefinition::new("content", "TEXT").encrypted())
            .column(ColumnDefinition::new("created_at", "DATETIME").default_expr("CURRENT_TIMESTAMP")),
    ];

    match Registry::new(tables) {
        Ok(registry) => registry,
        Err(e) => unreachable!("built-in notes schema is invalid: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableDefinition {
        TableDefinition::new("USERS")
            .column(ColumnDefinition::new("user_id", "INTEGER").primary().auto_increment())
            .column(ColumnDefinition::new("user_code", "TEXT"))
    }

    #[test]
    fn test_lookup_registered_and_unknown() {
        let registry = notes_schema();
        assert_eq!(registry.lookup("NOTES").unwrap().name, "NOTES");
        assert_eq!(
            registry.lookup("NO_SUCH_TABLE").unwrap_err(),
            SchemaError::UnknownTable("NO_SUCH_TABLE".to_string())
        );
    }

    #[test]
    fn test_tables_keep_declaration_order() {
        let names: Vec<_> = notes_schema().tables().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["USERS", "NOTE_TYPES", "NOTES"]);
    }

    #[test]
    fn test_descriptor_json_shape() {
        let json = r#"[
            {"name": "USERS", "columns": [
                {"field": "user_id", "type": "INTEGER", "primary": true, "auto_increment": true},
                {"field": "user_code", "type": "TEXT"}
            ]},
            {"name": "NOTE_TYPES", "columns": [
                {"field": "note_type_id", "type": "INTEGER", "primary": true, "auto_increment": true},
                {"field": "user_id", "type": "INTEGER", "foreign": "USERS.user_id"},
                {"field": "note_type_title", "type": "TEXT", "encrypted": true, "hash_col": "note_type_title_hash"},
                {"field": "note_type_title_hash", "type": "TEXT"}
            ], "unique": ["user_id, note_type_title_hash"]}
        ]"#;

        let registry = Registry::from_json(json).unwrap();
        let note_types = registry.lookup("NOTE_TYPES").unwrap();
        assert_eq!(
            note_types.get_column("user_id").unwrap().foreign,
            Some(ForeignRef::new("USERS", "user_id"))
        );
        assert_eq!(
            note_types.unique,
            vec![UniqueConstraint::new(["user_id", "note_type_title_hash"])]
        );
        assert!(note_types.is_encrypted("note_type_title"));
        assert_eq!(note_types.primary_key().unwrap().field, "note_type_id");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(
            &path,
            r#"[{"name": "USERS", "columns": [{"field": "user_id", "type": "INTEGER", "primary": true}]}]"#,
        )
        .unwrap();

        let registry = Registry::load_from_file(&path).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_bad_foreign_reference_syntax_is_rejected() {
        let json = r#"[{"name": "A", "columns": [{"field": "x", "type": "INTEGER", "foreign": "nodot"}]}]"#;
        assert!(Registry::from_json(json).is_err());
    }

    #[test]
    fn test_foreign_reference_must_exist() {
        let table = TableDefinition::new("NOTES")
            .column(ColumnDefinition::new("user_id", "INTEGER").references("USERS", "user_id"));
        assert!(Registry::new(vec![table.clone()]).is_err());

        let wrong_column = TableDefinition::new("NOTES")
            .column(ColumnDefinition::new("user_id", "INTEGER").references("USERS", "missing"));
        assert!(Registry::new(vec![users(), wrong_column]).is_err());

        assert!(Registry::new(vec![users(), table]).is_ok());
    }

    #[test]
    fn test_unique_over_encrypted_column_is_rejected() {
        let table = TableDefinition::new("SECRETS")
            .column(ColumnDefinition::new("title", "TEXT").encrypted())
            .unique(["title"]);
        let err = Registry::new(vec![table]).unwrap_err();
        assert!(err.to_string().contains("hash column"));
    }

    #[test]
    fn test_hash_col_must_be_a_sibling() {
        let table = TableDefinition::new("SECRETS")
            .column(ColumnDefinition::new("title", "TEXT").encrypted().hashed_into("title_hash"));
        assert!(Registry::new(vec![table]).is_err());

        let self_hash = TableDefinition::new("SECRETS")
            .column(ColumnDefinition::new("title", "TEXT").hashed_into("title"));
        assert!(Registry::new(vec![self_hash]).is_err());

        let encrypted_hash = TableDefinition::new("SECRETS")
            .column(ColumnDefinition::new("title", "TEXT").hashed_into("title_hash"))
            .column(ColumnDefinition::new("title_hash", "TEXT").encrypted());
        assert!(Registry::new(vec![encrypted_hash]).is_err());
    }

    #[test]
    fn test_hash_col_cannot_be_shared() {
        let shared = TableDefinition::new("SECRETS")
            .column(ColumnDefinition::new("title", "TEXT").encrypted().hashed_into("digest"))
            .column(ColumnDefinition::new("subtitle", "TEXT").encrypted().hashed_into("digest"))
            .column(ColumnDefinition::new("digest", "TEXT"));
        let err = Registry::new(vec![shared]).unwrap_err();
        assert!(err.to_string().contains("shared by more than one column"));
    }

    #[test]
    fn test_column_type_is_checked() {
        let injected = TableDefinition::new("T").column(ColumnDefinition::new("a", "TEXT); DROP TABLE T; --"));
        assert!(Registry::new(vec![injected]).is_err());

        let sized = TableDefinition::new("T").column(ColumnDefinition::new("a", "VARCHAR(255)"));
        assert!(Registry::new(vec![sized]).is_ok());
    }

    #[test]
    fn test_identifiers_and_duplicates() {
        let bad_name = TableDefinition::new("USERS; DROP TABLE x")
            .column(ColumnDefinition::new("id", "INTEGER"));
        assert!(Registry::new(vec![bad_name]).is_err());

        let bad_column = TableDefinition::new("USERS").column(ColumnDefinition::new("1id", "INTEGER"));
        assert!(Registry::new(vec![bad_column]).is_err());

        assert!(Registry::new(vec![users(), users()]).is_err());

        let dup_column = users().column(ColumnDefinition::new("user_code", "TEXT"));
        assert!(Registry::new(vec![dup_column]).is_err());
    }

    #[test]
    fn test_foreign_column_to() {
        let registry = notes_schema();
        let notes = registry.lookup("NOTES").unwrap();
        assert_eq!(notes.foreign_column_to("NOTE_TYPES").unwrap().field, "note_type_id");
        assert!(notes.foreign_column_to("NOTES").is_none());
    }
}
