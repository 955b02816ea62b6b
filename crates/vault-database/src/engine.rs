//! Record store: the CRUD entry point over the registry, builder and executor.

use crate::builder::QueryBuilder;
use crate::ddl::create_schema_sql;
use crate::encryption::FieldCipher;
use crate::executor::AsyncDatabase;
use crate::schema::Registry;
use crate::{queries, ChangeOutcome, DatabaseError, DatabaseResult, InsertOutcome, Record, Row, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Behaviour switches for a [`RecordStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordStoreOptions {
    /// Also create a unique index per declared constraint in `init_schema`
    pub unique_indexes: bool,
}

/// Schema-checked CRUD with transparent field encryption.
///
/// Cheap to clone; clones share the executor thread, registry and key.
#[derive(Clone)]
pub struct RecordStore {
    db: AsyncDatabase,
    registry: Arc<Registry>,
    cipher: Arc<FieldCipher>,
    options: RecordStoreOptions,
}

impl RecordStore {
    pub fn new(db: AsyncDatabase, registry: Registry, cipher: FieldCipher) -> Self {
        Self::with_options(db, registry, cipher, RecordStoreOptions::default())
    }

    pub fn with_options(
        db: AsyncDatabase,
        registry: Registry,
        cipher: FieldCipher,
        options: RecordStoreOptions,
    ) -> Self {
        Self {
            db,
            registry: Arc::new(registry),
            cipher: Arc::new(cipher),
            options,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn database(&self) -> &AsyncDatabase {
        &self.db
    }

    fn builder(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(&self.registry, &self.cipher)
    }

    /// Create every registered table (and unique indexes when enabled).
    ///
    /// Returns the executed DDL.
    pub async fn init_schema(&self) -> DatabaseResult<String> {
        let sql = create_schema_sql(&self.registry, self.options.unique_indexes);
        debug!(sql = %sql, "Applying schema");
        let batch = sql.clone();
        self.db
            .call_sqlite(move |conn| conn.execute_batch(&batch))
            .await?;

        for table in self.registry.tables() {
            info!(table = %table.name, "Table ready");
        }
        Ok(sql)
    }

    /// Insert one row; returns the generated row id.
    pub async fn create(&self, table: &str, data: &Record) -> DatabaseResult<InsertOutcome> {
        let plan = self.builder().insert(table, data)?;
        debug!(table, sql = %plan.statement.sql, checks = plan.unique_checks.len(), "Insert");

        let table_name = table.to_string();
        let result = self
            .db
            .call(move |conn| queries::run_insert(conn, &table_name, &plan))
            .await;
        log_rejection(table, "create", &result);
        result
    }

    /// Select rows, decrypting every encrypted output column.
    pub async fn read<S: AsRef<str>>(
        &self,
        table: &str,
        columns: &[S],
        filter: &Record,
    ) -> DatabaseResult<Vec<Row>> {
        let plan = self.builder().select(table, columns, filter)?;
        debug!(table, sql = %plan.statement.sql, "Select");

        let statement = plan.statement;
        let mut rows = self
            .db
            .call(move |conn| queries::query_rows(conn, &statement))
            .await?;

        // decryption stays off the executor thread
        for row in &mut rows {
            self.decrypt_row(row, &plan.decrypt_columns)?;
        }
        Ok(rows)
    }

    /// Update matching rows. An empty filter is rejected before anything runs.
    pub async fn update(
        &self,
        table: &str,
        data: &Record,
        filter: &Record,
    ) -> DatabaseResult<ChangeOutcome> {
        let plan = self.builder().update(table, data, filter)?;
        debug!(table, sql = %plan.statement.sql, checks = plan.unique_checks.len(), "Update");

        let table_name = table.to_string();
        let result = self
            .db
            .call(move |conn| queries::run_update(conn, &table_name, &plan))
            .await;
        log_rejection(table, "update", &result);
        result
    }

    /// Delete matching rows. An empty filter is rejected before anything runs.
    pub async fn delete(&self, table: &str, filter: &Record) -> DatabaseResult<ChangeOutcome> {
        let statement = self.builder().delete(table, filter)?;
        debug!(table, sql = %statement.sql, "Delete");

        let rows_affected = self
            .db
            .call(move |conn| queries::execute(conn, &statement))
            .await?;
        Ok(ChangeOutcome { rows_affected })
    }

    /// Whether any row matches `filter`.
    pub async fn exists(&self, table: &str, filter: &Record) -> DatabaseResult<bool> {
        let statement = self.builder().exists(table, filter)?;
        debug!(table, sql = %statement.sql, "Exists");

        self.db
            .call(move |conn| queries::query_exists(conn, &statement))
            .await
    }

    fn decrypt_row(&self, row: &mut Row, columns: &[String]) -> DatabaseResult<()> {
        for column in columns {
            let Some(value) = row.get_mut(column) else {
                continue;
            };
            let plaintext = match &*value {
                Value::Null => continue,
                Value::Text(wire) if wire.is_empty() => continue,
                Value::Text(wire) => self.cipher.decrypt(wire)?,
                _ => {
                    return Err(DatabaseError::Encryption(format!(
                        "column {} does not hold encrypted text",
                        column
                    )))
                }
            };
            *value = Value::Text(plaintext);
        }
        Ok(())
    }
}

fn log_rejection<T>(table: &str, operation: &str, result: &DatabaseResult<T>) {
    if let Err(DatabaseError::Uniqueness { columns, .. }) = result {
        warn!(table, operation, columns = %columns, "Rejected duplicate");
    }
}
