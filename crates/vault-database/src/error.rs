//! Database error types.

use thiserror::Error;

/// Schema lookup and validation failures.
///
/// These are configuration or programming mistakes; retrying never helps.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Table is not in the registry
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// Column is not declared on the table
    #[error("unknown column {column} for table {table}")]
    UnknownColumn { table: String, column: String },

    /// Dotted reference to a table not reachable through a foreign key
    #[error("invalid join target {reference} for table {table}")]
    InvalidJoinTarget { table: String, reference: String },

    /// Registry definition rejected at load time
    #[error("invalid schema definition: {0}")]
    InvalidDefinition(String),
}

/// Database error type.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Unknown table, column or join target
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Request shape rejected before reaching the store
    #[error("Validation error: {0}")]
    Validation(String),

    /// Encryption error
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Duplicate of a declared unique combination
    #[error("Uniqueness violation on {table}({columns})")]
    Uniqueness { table: String, columns: String },

    /// SQLite failure, carrying the statement text but never its parameters
    #[error("Store error: {message}")]
    Store {
        message: String,
        statement: Option<String>,
    },

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatabaseError {
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_encryption(&self) -> bool {
        matches!(self, Self::Encryption(_))
    }

    pub fn is_uniqueness(&self) -> bool {
        matches!(self, Self::Uniqueness { .. })
    }

    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store { .. })
    }

    /// Attach the failing statement to a store error.
    pub(crate) fn with_statement(self, sql: &str) -> Self {
        match self {
            Self::Store { message, .. } => Self::Store {
                message,
                statement: Some(sql.to_string()),
            },
            other => other,
        }
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store {
            message: e.to_string(),
            statement: None,
        }
    }
}

/// Result type alias using DatabaseError.
pub type DatabaseResult<T> = Result<T, DatabaseError>;
