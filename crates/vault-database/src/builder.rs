//! Parameterized statement construction for the fixed CRUD shapes.
//!
//! Every identifier interpolated here has been checked by the [`Validator`];
//! every value travels as a bound parameter. Field encryption and hash-column
//! maintenance happen while building, so the engine only ever runs SQL.
//!
//! Filtering on an encrypted column encrypts the filter value under a fresh
//! IV, which never equals the stored ciphertext. Equality lookups on
//! encrypted data have to go through the column's hash sibling instead, e.g.
//! `{"note_type_title_hash": digest("Work")}`.

use crate::encryption::FieldCipher;
use crate::hashing::digest;
use crate::schema::{Registry, TableDefinition};
use crate::validator::{ColumnRef, Validator};
use crate::{DatabaseError, DatabaseResult, Record, SchemaError, Value};
use std::collections::HashMap;

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    fn new(sql: String, params: Vec<Value>) -> Self {
        Self { sql, params }
    }
}

/// A select statement and the output columns to decrypt afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectPlan {
    pub statement: Statement,
    pub decrypt_columns: Vec<String>,
}

/// Existence probe for one declared unique constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueCheck {
    /// Constraint columns, in declaration order.
    pub fields: Vec<String>,
    /// `SELECT 1 FROM T WHERE c1 = ? AND ... LIMIT 1`. Key values bind
    /// first, followed by `exclude_params`.
    pub probe_sql: String,
    pub exclude_params: Vec<Value>,
    pub key: UniqueKey,
}

/// Where the constraint values of a [`UniqueCheck`] come from.
#[derive(Debug, Clone, PartialEq)]
pub enum UniqueKey {
    /// Insert: the whole key is in the data.
    Known(Vec<Value>),
    /// Update: the values the update writes, by constraint position. Columns
    /// left as `None` keep their stored value, read per row by `targets`.
    Resolve {
        assigned: Vec<Option<Value>>,
        targets: Statement,
    },
}

impl UniqueCheck {
    /// Comma-joined constraint columns, for error reporting.
    pub fn label(&self) -> String {
        self.fields.join(",")
    }

    /// The probe statement for one resolved key.
    pub fn probe(&self, key: &[Value]) -> Statement {
        let params = key.iter().chain(&self.exclude_params).cloned().collect();
        Statement::new(self.probe_sql.clone(), params)
    }
}

/// A write statement and the uniqueness probes that must come back empty first.
#[derive(Debug, Clone, PartialEq)]
pub struct WritePlan {
    pub statement: Statement,
    pub unique_checks: Vec<UniqueCheck>,
}

/// Turns operation descriptors into statements for one registry and key.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'a> {
    registry: &'a Registry,
    cipher: &'a FieldCipher,
}

/// Which values of encrypted columns get encrypted on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    /// every non-NULL value
    Insert,
    /// only non-empty values
    Update,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(registry: &'a Registry, cipher: &'a FieldCipher) -> Self {
        Self { registry, cipher }
    }

    fn validator(&self) -> Validator<'a> {
        Validator::new(self.registry)
    }

    /// `SELECT` with optional foreign-key joins.
    ///
    /// An empty column list selects `*`. Joined columns are returned under
    /// their own field name.
    pub fn select<S: AsRef<str>>(
        &self,
        table: &str,
        columns: &[S],
        filter: &Record,
    ) -> DatabaseResult<SelectPlan> {
        let validator = self.validator();
        let mut refs = validator.validate(table, columns)?;
        if refs.is_empty() {
            refs.push(ColumnRef::Wildcard);
        }
        let where_keys: Vec<&str> = filter.keys().map(String::as_str).collect();
        let where_refs = validator.validate(table, &where_keys)?;
        let base = self.registry.lookup(table)?;

        // output name -> source reference
        let mut outputs: HashMap<String, ColumnRef> = HashMap::new();
        let mut projection = Vec::new();
        let mut decrypt_columns = Vec::new();
        let mut joined_tables: Vec<&str> = Vec::new();

        for col_ref in &refs {
            match col_ref {
                ColumnRef::Wildcard => {
                    for col in &base.columns {
                        let source = ColumnRef::Plain(col.field.clone());
                        if claim_output(&mut outputs, &col.field, source)? && col.encrypted {
                            decrypt_columns.push(col.field.clone());
                        }
                    }
                    projection.push(format!("{}.*", base.name));
                }
                ColumnRef::Plain(field) => {
                    let name = col_ref.output_name();
                    if !claim_output(&mut outputs, name, col_ref.clone())? {
                        continue;
                    }
                    projection.push(format!("{}.{} AS {}", base.name, field, name));
                    if base.is_encrypted(field) {
                        decrypt_columns.push(field.clone());
                    }
                }
                ColumnRef::Joined { table: other, field } => {
                    let name = col_ref.output_name();
                    if !claim_output(&mut outputs, name, col_ref.clone())? {
                        continue;
                    }
                    projection.push(format!("{}.{} AS {}", other, field, name));
                    if self.registry.lookup(other)?.is_encrypted(field) {
                        decrypt_columns.push(field.clone());
                    }
                    if !joined_tables.contains(&other.as_str()) {
                        joined_tables.push(other);
                    }
                }
            }
        }

        let mut conditions = Vec::with_capacity(where_refs.len());
        let mut params = Vec::with_capacity(where_refs.len());
        for (where_ref, value) in where_refs.iter().zip(filter.values()) {
            let (owner, field) = match where_ref {
                ColumnRef::Plain(field) => (base, field),
                ColumnRef::Joined { table: other, field } => {
                    if !joined_tables.contains(&other.as_str()) {
                        joined_tables.push(other);
                    }
                    (self.registry.lookup(other)?, field)
                }
                ColumnRef::Wildcard => {
                    return Err(DatabaseError::Validation(
                        "'*' cannot be used as a filter column".to_string(),
                    ))
                }
            };
            let column = format!("{}.{}", owner.name, field);
            push_condition(
                &mut conditions,
                &mut params,
                &column,
                self.filter_value(owner, field, value)?,
            );
        }

        let mut sql = format!("SELECT {} FROM {}", projection.join(", "), base.name);
        for other in &joined_tables {
            sql.push_str(&self.join_clause(base, other)?);
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        Ok(SelectPlan {
            statement: Statement::new(sql, params),
            decrypt_columns,
        })
    }

    /// `SELECT 1 ... LIMIT 1` probe. An empty filter asks whether the table has any row.
    pub fn exists(&self, table: &str, filter: &Record) -> DatabaseResult<Statement> {
        let base = self.checked_table(table, None, filter)?;
        let (conditions, params) = self.conditions(base, filter)?;
        let mut sql = format!("SELECT 1 FROM {}", base.name);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" LIMIT 1");
        Ok(Statement::new(sql, params))
    }

    /// `INSERT` with hash columns filled in and encrypted columns encrypted.
    pub fn insert(&self, table: &str, data: &Record) -> DatabaseResult<WritePlan> {
        if data.is_empty() {
            return Err(DatabaseError::Validation(format!(
                "insert into {} requires at least one column",
                table
            )));
        }
        let base = self.checked_table(table, Some(data), &Record::new())?;

        let hashed = with_hash_columns(base, data)?;
        let unique_checks = self.unique_checks(base, &hashed, None)?;
        let row = self.encrypt_columns(base, hashed, WriteMode::Insert)?;

        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            base.name,
            columns.join(", "),
            placeholders
        );

        Ok(WritePlan {
            statement: Statement::new(sql, row.into_values().collect()),
            unique_checks,
        })
    }

    /// `UPDATE`; refuses to run without a filter.
    pub fn update(&self, table: &str, data: &Record, filter: &Record) -> DatabaseResult<WritePlan> {
        if filter.is_empty() {
            return Err(DatabaseError::Validation(format!(
                "update of {} requires a where clause",
                table
            )));
        }
        if data.is_empty() {
            return Err(DatabaseError::Validation(format!(
                "update of {} requires at least one column",
                table
            )));
        }
        let base = self.checked_table(table, Some(data), filter)?;

        let hashed = with_hash_columns(base, data)?;
        let unique_checks = self.unique_checks(base, &hashed, Some(filter))?;
        let row = self.encrypt_columns(base, hashed, WriteMode::Update)?;

        let assignments: Vec<String> = row.keys().map(|k| format!("{} = ?", k)).collect();
        let mut params: Vec<Value> = row.into_values().collect();
        let (conditions, where_params) = self.conditions(base, filter)?;
        params.extend(where_params);

        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            base.name,
            assignments.join(", "),
            conditions.join(" AND ")
        );

        Ok(WritePlan {
            statement: Statement::new(sql, params),
            unique_checks,
        })
    }

    /// `DELETE`; refuses to run without a filter.
    pub fn delete(&self, table: &str, filter: &Record) -> DatabaseResult<Statement> {
        if filter.is_empty() {
            return Err(DatabaseError::Validation(format!(
                "delete from {} requires a where clause",
                table
            )));
        }
        let base = self.checked_table(table, None, filter)?;
        let (conditions, params) = self.conditions(base, filter)?;
        let sql = format!("DELETE FROM {} WHERE {}", base.name, conditions.join(" AND "));
        Ok(Statement::new(sql, params))
    }

    /// Validate plain data and filter keys, then resolve the table.
    fn checked_table(
        &self,
        table: &str,
        data: Option<&Record>,
        filter: &Record,
    ) -> DatabaseResult<&'a TableDefinition> {
        let mut keys: Vec<&str> = data
            .map(|d| d.keys().map(String::as_str).collect())
            .unwrap_or_default();
        keys.extend(filter.keys().map(String::as_str));
        self.validator().validate_plain(table, &keys)?;
        Ok(self.registry.lookup(table)?)
    }

    /// Unqualified `col = ?` conditions for single-table statements.
    fn conditions(
        &self,
        base: &TableDefinition,
        filter: &Record,
    ) -> DatabaseResult<(Vec<String>, Vec<Value>)> {
        let mut conditions = Vec::with_capacity(filter.len());
        let mut params = Vec::with_capacity(filter.len());
        for (field, value) in filter {
            push_condition(
                &mut conditions,
                &mut params,
                field,
                self.filter_value(base, field, value)?,
            );
        }
        Ok((conditions, params))
    }

    /// Filter values on encrypted columns are encrypted before binding.
    fn filter_value(
        &self,
        owner: &TableDefinition,
        field: &str,
        value: &Value,
    ) -> DatabaseResult<Value> {
        if !owner.is_encrypted(field) {
            return Ok(value.clone());
        }
        match value.as_plaintext()? {
            Some(plaintext) => Ok(Value::Text(self.cipher.encrypt(&plaintext)?)),
            None => Ok(Value::Null),
        }
    }

    fn encrypt_columns(
        &self,
        base: &TableDefinition,
        mut row: Record,
        mode: WriteMode,
    ) -> DatabaseResult<Record> {
        for col in base.encrypted_columns() {
            let Some(value) = row.get_mut(&col.field) else {
                continue;
            };
            let skip = match mode {
                WriteMode::Insert => value.is_null(),
                WriteMode::Update => value.is_empty(),
            };
            if skip {
                continue;
            }
            if let Some(plaintext) = value.as_plaintext()? {
                *value = Value::Text(self.cipher.encrypt(&plaintext)?);
            }
        }
        Ok(row)
    }

    /// One check per declared constraint.
    ///
    /// Inserts are checked only when every constraint value is present and
    /// non-NULL. Updates are checked when they write any constraint column;
    /// the remaining values are read from each target row at run time, and
    /// the target rows are excluded from the probe.
    fn unique_checks(
        &self,
        base: &TableDefinition,
        hashed: &Record,
        filter: Option<&Record>,
    ) -> DatabaseResult<Vec<UniqueCheck>> {
        let mut checks = Vec::new();
        for constraint in &base.unique {
            let fields = constraint.columns.clone();
            let mut probe_sql = format!(
                "SELECT 1 FROM {} WHERE {}",
                base.name,
                fields
                    .iter()
                    .map(|c| format!("{} = ?", c))
                    .collect::<Vec<_>>()
                    .join(" AND ")
            );

            let (key, exclude_params) = match filter {
                None => {
                    let values: Option<Vec<Value>> = fields
                        .iter()
                        .map(|c| hashed.get(c).filter(|v| !v.is_null()).cloned())
                        .collect();
                    let Some(values) = values else {
                        continue;
                    };
                    (UniqueKey::Known(values), Vec::new())
                }
                Some(filter) => {
                    if !fields.iter().any(|c| hashed.contains_key(c)) {
                        continue;
                    }
                    let (conditions, where_params) = self.conditions(base, filter)?;
                    let where_sql = conditions.join(" AND ");
                    probe_sql.push_str(&format!(
                        " AND rowid NOT IN (SELECT rowid FROM {} WHERE {})",
                        base.name, where_sql
                    ));
                    let targets = Statement::new(
                        format!("SELECT {} FROM {} WHERE {}", fields.join(", "), base.name, where_sql),
                        where_params.clone(),
                    );
                    let assigned = fields.iter().map(|c| hashed.get(c).cloned()).collect();
                    (UniqueKey::Resolve { assigned, targets }, where_params)
                }
            };
            probe_sql.push_str(" LIMIT 1");

            checks.push(UniqueCheck {
                fields,
                probe_sql,
                exclude_params,
                key,
            });
        }
        Ok(checks)
    }

    fn join_clause(&self, base: &TableDefinition, other: &str) -> DatabaseResult<String> {
        let target = self.registry.lookup(other)?;
        let fk = base.foreign_column_to(other).ok_or_else(|| {
            SchemaError::InvalidJoinTarget {
                table: base.name.clone(),
                reference: other.to_string(),
            }
        })?;
        let target_column = target
            .primary_key()
            .map(|pk| pk.field.as_str())
            .or_else(|| fk.foreign.as_ref().map(|f| f.column.as_str()))
            .ok_or_else(|| {
                DatabaseError::Validation(format!("no join column for {} on {}", base.name, other))
            })?;
        Ok(format!(
            " LEFT JOIN {} ON {}.{} = {}.{}",
            target.name, target.name, target_column, base.name, fk.field
        ))
    }
}

/// Record an output column; `false` when the exact same reference was already claimed.
fn claim_output(
    outputs: &mut HashMap<String, ColumnRef>,
    name: &str,
    source: ColumnRef,
) -> DatabaseResult<bool> {
    match outputs.get(name) {
        Some(existing) if *existing == source => Ok(false),
        Some(_) => Err(DatabaseError::Validation(format!(
            "column {} is requested from more than one table",
            name
        ))),
        None => {
            outputs.insert(name.to_string(), source);
            Ok(true)
        }
    }
}

fn push_condition(conditions: &mut Vec<String>, params: &mut Vec<Value>, column: &str, value: Value) {
    if value.is_null() {
        conditions.push(format!("{} IS NULL", column));
    } else {
        conditions.push(format!("{} = ?", column));
        params.push(value);
    }
}

/// Copy `data`, storing the digest of every hashed column present under its hash sibling.
fn with_hash_columns(base: &TableDefinition, data: &Record) -> DatabaseResult<Record> {
    let mut row = data.clone();
    for (col, hash_col) in base.hashed_columns() {
        let Some(value) = data.get(&col.field) else {
            continue;
        };
        let hashed = match value.as_plaintext()? {
            Some(plaintext) => Value::Text(digest(&plaintext)),
            None => Value::Null,
        };
        row.insert(hash_col.to_string(), hashed);
    }
    Ok(row)
}
