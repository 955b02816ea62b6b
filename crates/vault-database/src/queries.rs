//! Statement runners that work with any Connection.
//!
//! These run on the executor thread: SQL and row mapping only. Every error is
//! tagged with the statement text; bound parameters never leave this module.

use crate::builder::{Statement, UniqueCheck, UniqueKey, WritePlan};
use crate::{ChangeOutcome, DatabaseError, DatabaseResult, InsertOutcome, Row, Value};
use rusqlite::{params_from_iter, Connection};

/// Run a statement that returns no rows; yields the number of changed rows.
pub fn execute(conn: &Connection, stmt: &Statement) -> DatabaseResult<usize> {
    conn.prepare_cached(&stmt.sql)
        .and_then(|mut prepared| prepared.execute(params_from_iter(stmt.params.iter())))
        .map_err(|e| DatabaseError::from(e).with_statement(&stmt.sql))
}

/// Run a select and map every row by output column name.
pub fn query_rows(conn: &Connection, stmt: &Statement) -> DatabaseResult<Vec<Row>> {
    fetch_rows(conn, stmt).map_err(|e| DatabaseError::from(e).with_statement(&stmt.sql))
}

fn fetch_rows(conn: &Connection, stmt: &Statement) -> rusqlite::Result<Vec<Row>> {
    let mut prepared = conn.prepare(&stmt.sql)?;
    let names: Vec<String> = prepared
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();

    let rows = prepared
        .query_map(params_from_iter(stmt.params.iter()), |row| {
            names
                .iter()
                .enumerate()
                .map(|(i, name)| Ok((name.clone(), row.get::<_, Value>(i)?)))
                .collect::<rusqlite::Result<Row>>()
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// True when the statement yields at least one row.
pub fn query_exists(conn: &Connection, stmt: &Statement) -> DatabaseResult<bool> {
    conn.prepare_cached(&stmt.sql)
        .and_then(|mut prepared| prepared.exists(params_from_iter(stmt.params.iter())))
        .map_err(|e| DatabaseError::from(e).with_statement(&stmt.sql))
}

/// Fail with `DatabaseError::Uniqueness` on the first check that finds a row.
///
/// Update checks are resolved against the rows the update targets: two
/// targets ending up with the same key are a violation on their own.
pub fn check_unique(conn: &Connection, table: &str, checks: &[UniqueCheck]) -> DatabaseResult<()> {
    for check in checks {
        let violation = || DatabaseError::Uniqueness {
            table: table.to_string(),
            columns: check.label(),
        };

        let mut keys: Vec<Vec<Value>> = Vec::new();
        for key in resolve_keys(conn, check)? {
            if keys.contains(&key) {
                return Err(violation());
            }
            keys.push(key);
        }
        for key in &keys {
            if query_exists(conn, &check.probe(key))? {
                return Err(violation());
            }
        }
    }
    Ok(())
}

/// Constraint keys to probe; keys with a NULL part are skipped.
fn resolve_keys(conn: &Connection, check: &UniqueCheck) -> DatabaseResult<Vec<Vec<Value>>> {
    match &check.key {
        UniqueKey::Known(key) => Ok(vec![key.clone()]),
        UniqueKey::Resolve { assigned, targets } => {
            let rows = query_rows(conn, targets)?;
            Ok(rows
                .into_iter()
                .filter_map(|row| {
                    check
                        .fields
                        .iter()
                        .zip(assigned)
                        .map(|(field, written)| {
                            written
                                .clone()
                                .or_else(|| row.get(field).cloned())
                                .filter(|v| !v.is_null())
                        })
                        .collect::<Option<Vec<Value>>>()
                })
                .collect())
        }
    }
}

/// Unique checks then the insert, in one transaction.
pub fn run_insert(conn: &Connection, table: &str, plan: &WritePlan) -> DatabaseResult<InsertOutcome> {
    let tx = conn.unchecked_transaction()?;
    check_unique(&tx, table, &plan.unique_checks)?;
    let rows_affected = execute(&tx, &plan.statement)?;
    let inserted_id = tx.last_insert_rowid();
    tx.commit()?;
    Ok(InsertOutcome {
        inserted_id,
        rows_affected,
    })
}

/// Unique checks then the update, in one transaction.
pub fn run_update(conn: &Connection, table: &str, plan: &WritePlan) -> DatabaseResult<ChangeOutcome> {
    let tx = conn.unchecked_transaction()?;
    check_unique(&tx, table, &plan.unique_checks)?;
    let rows_affected = execute(&tx, &plan.statement)?;
    tx.commit()?;
    Ok(ChangeOutcome { rows_affected })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE items (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, qty INTEGER, data BLOB);
             INSERT INTO items (name, qty, data) VALUES ('apple', 3, x'0102');
             INSERT INTO items (name, qty) VALUES ('pear', NULL);",
        )
        .unwrap();
        conn
    }

    fn stmt(sql: &str, params: Vec<Value>) -> Statement {
        Statement {
            sql: sql.to_string(),
            params,
        }
    }

    #[test]
    fn test_query_rows_maps_types() {
        let conn = conn();
        let rows = query_rows(
            &conn,
            &stmt("SELECT id, name, qty, data FROM items ORDER BY id", vec![]),
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], Value::from("apple"));
        assert_eq!(rows[0]["qty"], Value::Integer(3));
        assert_eq!(rows[0]["data"], Value::Blob(vec![1, 2]));
        assert_eq!(rows[1]["qty"], Value::Null);
    }

    #[test]
    fn test_execute_and_exists() {
        let conn = conn();
        let changed = execute(
            &conn,
            &stmt("UPDATE items SET qty = ? WHERE name = ?", vec![Value::Integer(7), Value::from("pear")]),
        )
        .unwrap();
        assert_eq!(changed, 1);

        let probe = stmt("SELECT 1 FROM items WHERE qty = ? LIMIT 1", vec![Value::Integer(7)]);
        assert!(query_exists(&conn, &probe).unwrap());
        let probe = stmt("SELECT 1 FROM items WHERE qty = ? LIMIT 1", vec![Value::Integer(99)]);
        assert!(!query_exists(&conn, &probe).unwrap());
    }

    #[test]
    fn test_store_error_carries_statement_not_params() {
        let conn = conn();
        let err = execute(
            &conn,
            &stmt("INSERT INTO missing (name) VALUES (?)", vec![Value::from("top-secret")]),
        )
        .unwrap_err();

        match err {
            DatabaseError::Store { message, statement } => {
                assert!(message.contains("missing"));
                assert!(!message.contains("top-secret"));
                assert_eq!(statement.as_deref(), Some("INSERT INTO missing (name) VALUES (?)"));
            }
            other => panic!("expected store error, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_unique_check_rolls_back() {
        let conn = conn();
        let plan = WritePlan {
            statement: stmt("INSERT INTO items (name) VALUES (?)", vec![Value::from("apple")]),
            unique_checks: vec![UniqueCheck {
                fields: vec!["name".to_string()],
                probe_sql: "SELECT 1 FROM items WHERE name = ? LIMIT 1".to_string(),
                exclude_params: vec![],
                key: UniqueKey::Known(vec![Value::from("apple")]),
            }],
        };

        let err = run_insert(&conn, "items", &plan).unwrap_err();
        assert!(err.is_uniqueness());
        assert_eq!(err.to_string(), "Uniqueness violation on items(name)");

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_run_insert_reports_rowid() {
        let conn = conn();
        let plan = WritePlan {
            statement: stmt("INSERT INTO items (name) VALUES (?)", vec![Value::from("plum")]),
            unique_checks: vec![],
        };
        let outcome = run_insert(&conn, "items", &plan).unwrap();
        assert_eq!(
            outcome,
            InsertOutcome {
                inserted_id: 3,
                rows_affected: 1
            }
        );
    }

    fn rename_check(filter_sql: &str, filter: Vec<Value>, name: Option<&str>) -> UniqueCheck {
        UniqueCheck {
            fields: vec!["name".to_string(), "qty".to_string()],
            probe_sql: format!(
                "SELECT 1 FROM items WHERE name = ? AND qty = ? \
                 AND rowid NOT IN (SELECT rowid FROM items WHERE {filter_sql}) LIMIT 1"
            ),
            exclude_params: filter.clone(),
            key: UniqueKey::Resolve {
                assigned: vec![name.map(Value::from), None],
                targets: stmt(&format!("SELECT name, qty FROM items WHERE {filter_sql}"), filter),
            },
        }
    }

    #[test]
    fn test_update_check_reads_stored_values() {
        let conn = conn();
        conn.execute("INSERT INTO items (name, qty) VALUES ('plum', 3)", [])
            .unwrap();

        // renaming plum to apple keeps its stored qty of 3, which apple already has
        let check = rename_check("name = ?", vec![Value::from("plum")], Some("apple"));
        let err = check_unique(&conn, "items", &[check]).unwrap_err();
        assert!(err.is_uniqueness());

        // pear has a NULL qty, so its key is never complete
        let check = rename_check("name = ?", vec![Value::from("pear")], Some("apple"));
        check_unique(&conn, "items", &[check]).unwrap();
    }

    #[test]
    fn test_update_check_rejects_colliding_targets() {
        let conn = conn();
        conn.execute("UPDATE items SET qty = 3 WHERE name = 'pear'", [])
            .unwrap();

        // both rows would become (kiwi, 3)
        let check = rename_check("qty = ?", vec![Value::Integer(3)], Some("kiwi"));
        let err = check_unique(&conn, "items", &[check]).unwrap_err();
        assert_eq!(err.to_string(), "Uniqueness violation on items(name,qty)");

        // a single target rewritten with its own key is fine
        let check = rename_check("name = ?", vec![Value::from("apple")], Some("apple"));
        check_unique(&conn, "items", &[check]).unwrap();
    }
}
