//! Schema DDL generation.
//!
//! Pure functions from the registry to `CREATE` statements; nothing here
//! touches a connection.

use crate::schema::{ColumnDefinition, Registry, TableDefinition};

/// `CREATE TABLE IF NOT EXISTS` statements, one per table, in declaration order.
pub fn schema_ddl(registry: &Registry) -> Vec<String> {
    registry.tables().map(create_table).collect()
}

/// One `CREATE UNIQUE INDEX` per declared unique constraint, named
/// `uq_<table>_<position>` by the constraint's position in its table.
pub fn unique_index_ddl(registry: &Registry) -> Vec<String> {
    registry
        .tables()
        .flat_map(|table| {
            table.unique.iter().enumerate().map(move |(position, constraint)| {
                format!(
                    "CREATE UNIQUE INDEX IF NOT EXISTS uq_{}_{} ON {} ({})",
                    table.name,
                    position,
                    table.name,
                    constraint.columns.join(", ")
                )
            })
        })
        .collect()
}

/// All schema statements joined for a single `execute_batch`.
pub fn create_schema_sql(registry: &Registry, unique_indexes: bool) -> String {
    let mut statements = schema_ddl(registry);
    if unique_indexes {
        statements.extend(unique_index_ddl(registry));
    }
    let mut sql = statements.join(";\n");
    if !sql.is_empty() {
        sql.push(';');
    }
    sql
}

fn create_table(table: &TableDefinition) -> String {
    let foreign_keys = table.columns.iter().filter_map(|col| {
        col.foreign.as_ref().map(|f| {
            format!(
                "FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE CASCADE",
                col.field, f.table, f.column
            )
        })
    });

    let defs: Vec<String> = table
        .columns
        .iter()
        .map(column_clause)
        .chain(foreign_keys)
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        table.name,
        defs.join(",\n    ")
    )
}

fn column_clause(col: &ColumnDefinition) -> String {
    let mut clause = format!("{} {}", col.field, col.data_type);
    if col.primary {
        clause.push_str(" PRIMARY KEY");
    }
    if col.auto_increment {
        clause.push_str(" AUTOINCREMENT");
    }
    if let Some(default) = &col.default {
        clause.push_str(" DEFAULT ");
        clause.push_str(default);
    }
    clause
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::notes_schema;

    #[test]
    fn test_users_table() {
        let ddl = schema_ddl(&notes_schema());
        assert_eq!(
            ddl[0],
            "CREATE TABLE IF NOT EXISTS USERS (\n    user_id INTEGER PRIMARY KEY AUTOINCREMENT,\n    user_code TEXT\n)"
        );
    }

    #[test]
    fn test_foreign_keys_and_defaults() {
        let ddl = schema_ddl(&notes_schema());
        assert_eq!(ddl.len(), 3);

        let notes = &ddl[2];
        assert!(notes.starts_with("CREATE TABLE IF NOT EXISTS NOTES ("));
        assert!(notes.contains("created_at DATETIME DEFAULT CURRENT_TIMESTAMP"));
        assert!(notes.contains("FOREIGN KEY (user_id) REFERENCES USERS(user_id) ON DELETE CASCADE"));
        assert!(notes.contains(
            "FOREIGN KEY (note_type_id) REFERENCES NOTE_TYPES(note_type_id) ON DELETE CASCADE"
        ));
        // foreign key clauses follow every column clause
        assert!(notes.find("created_at").unwrap() < notes.find("FOREIGN KEY").unwrap());
    }

    #[test]
    fn test_unique_indexes_are_opt_in() {
        let registry = notes_schema();
        let plain = create_schema_sql(&registry, false);
        assert!(!plain.contains("UNIQUE INDEX"));
        assert_eq!(plain.matches("CREATE TABLE").count(), 3);
        assert!(plain.ends_with(");"));

        let strict = create_schema_sql(&registry, true);
        assert!(strict.contains(
            "CREATE UNIQUE INDEX IF NOT EXISTS uq_NOTE_TYPES_0 ON NOTE_TYPES (user_id, note_type_title_hash)"
        ));
    }

    #[test]
    fn test_unique_index_names_are_distinct() {
        // (a_b) and (a, b) would share a name if it were built from the columns
        let table = TableDefinition::new("T")
            .column(ColumnDefinition::new("a", "TEXT"))
            .column(ColumnDefinition::new("b", "TEXT"))
            .column(ColumnDefinition::new("a_b", "TEXT"))
            .unique(["a_b"])
            .unique(["a", "b"]);
        let registry = Registry::new(vec![table]).unwrap();

        let ddl = unique_index_ddl(&registry);
        assert_eq!(
            ddl,
            vec![
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_T_0 ON T (a_b)".to_string(),
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_T_1 ON T (a, b)".to_string(),
            ]
        );

        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(&create_schema_sql(&registry, true)).unwrap();
        let indexes: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE 'uq_T_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(indexes, 2);
    }

    #[test]
    fn test_generated_sql_executes() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(&create_schema_sql(&notes_schema(), true)).unwrap();
        // idempotent
        conn.execute_batch(&create_schema_sql(&notes_schema(), true)).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('USERS', 'NOTE_TYPES', 'NOTES')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 3);
    }
}
