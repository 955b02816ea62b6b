//! Identifier validation against the registry.
//!
//! Statement construction only ever sees references that passed through here.

use crate::schema::{Registry, TableDefinition};
use crate::SchemaError;

/// A column reference as requested by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    /// `*`, every column of the base table
    Wildcard,
    /// Column of the base table
    Plain(String),
    /// `table.field` on a table reachable through a foreign key
    Joined { table: String, field: String },
}

impl ColumnRef {
    /// Split a raw reference without validating it.
    pub fn parse(raw: &str) -> Self {
        if raw == "*" {
            return Self::Wildcard;
        }
        match raw.split_once('.') {
            Some((table, field)) => Self::Joined {
                table: table.to_string(),
                field: field.to_string(),
            },
            None => Self::Plain(raw.to_string()),
        }
    }

    /// Name the value is returned under.
    pub fn output_name(&self) -> &str {
        match self {
            Self::Wildcard => "*",
            Self::Plain(field) => field,
            Self::Joined { field, .. } => field,
        }
    }
}

/// Checks table, column and join references against a [`Registry`].
#[derive(Debug, Clone, Copy)]
pub struct Validator<'a> {
    registry: &'a Registry,
}

impl<'a> Validator<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Validate read references (plain, dotted or `*`) for `table`.
    ///
    /// A reference qualified with the base table's own name is treated as plain.
    pub fn validate<S: AsRef<str>>(
        &self,
        table: &str,
        refs: &[S],
    ) -> Result<Vec<ColumnRef>, SchemaError> {
        let base = self.registry.lookup(table)?;
        refs.iter()
            .map(|raw| self.resolve(base, raw.as_ref()))
            .collect()
    }

    /// Validate write references: plain columns of `table` only.
    pub fn validate_plain<S: AsRef<str>>(
        &self,
        table: &str,
        refs: &[S],
    ) -> Result<(), SchemaError> {
        let base = self.registry.lookup(table)?;
        for raw in refs {
            let raw = raw.as_ref();
            match ColumnRef::parse(raw) {
                ColumnRef::Plain(_) => {
                    self.resolve(base, raw)?;
                }
                ColumnRef::Wildcard => {
                    return Err(SchemaError::UnknownColumn {
                        table: table.to_string(),
                        column: raw.to_string(),
                    })
                }
                ColumnRef::Joined { .. } => {
                    return Err(SchemaError::InvalidJoinTarget {
                        table: table.to_string(),
                        reference: raw.to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    fn resolve(&self, base: &TableDefinition, raw: &str) -> Result<ColumnRef, SchemaError> {
        match ColumnRef::parse(raw) {
            ColumnRef::Wildcard => Ok(ColumnRef::Wildcard),
            ColumnRef::Plain(field) => {
                if base.has_column(&field) {
                    Ok(ColumnRef::Plain(field))
                } else {
                    Err(SchemaError::UnknownColumn {
                        table: base.name.clone(),
                        column: field,
                    })
                }
            }
            ColumnRef::Joined { table, field } if table == base.name => {
                self.resolve(base, &field)
            }
            ColumnRef::Joined { table, field } => {
                if base.foreign_column_to(&table).is_none() {
                    return Err(SchemaError::InvalidJoinTarget {
                        table: base.name.clone(),
                        reference: raw.to_string(),
                    });
                }
                let target = self.registry.lookup(&table)?;
                if !target.has_column(&field) {
                    return Err(SchemaError::UnknownColumn { table, column: field });
                }
                Ok(ColumnRef::Joined { table, field })
            }
        }
    }
}
