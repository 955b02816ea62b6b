//! Schema-driven SQLite data access for notevault.
//!
//! This crate provides:
//! - A schema registry describing tables, columns, foreign keys and unique constraints
//! - Identifier validation, so only registered names reach SQL text
//! - AES-256-CBC encryption for columns flagged `encrypted`
//! - SHA-256 hash columns for uniqueness checks over encrypted data
//! - A query builder producing parameterized statements
//! - An async executor and a `RecordStore` tying it all together
//!
//! # Architecture
//!
//! ```text
//! caller -> Validator -> QueryBuilder (encrypt, hash) -> AsyncDatabase -> (decrypt) -> caller
//! ```
//!
//! ```ignore
//! let db = AsyncDatabase::open(path).await?;
//! let store = RecordStore::new(db, notes_schema(), FieldCipher::new(secret));
//! store.init_schema().await?;
//!
//! let user = store.create("USERS", &record([("user_code", "abc123")])).await?;
//! let rows = store
//!     .read("NOTES", &["note_id", "NOTE_TYPES.note_type_title"], &record([("user_id", user.inserted_id)]))
//!     .await?;
//! ```
//!
//! **Important**: Only SQL runs inside `db.call()`. Encryption, hashing and
//! decryption happen on the caller's task.

pub mod builder;
pub mod ddl;
mod encryption;
mod engine;
mod error;
mod executor;
mod hashing;
pub mod queries;
pub mod schema;
pub mod validator;
mod value;

#[cfg(test)]
mod tests;

pub use builder::{QueryBuilder, SelectPlan, Statement, UniqueCheck, UniqueKey, WritePlan};
pub use ddl::{create_schema_sql, schema_ddl};
pub use encryption::{derive_key, generate_iv, FieldCipher, IV_SIZE, KEY_SIZE};
pub use engine::{RecordStore, RecordStoreOptions};
pub use error::{DatabaseError, DatabaseResult, SchemaError};
pub use executor::AsyncDatabase;
pub use hashing::{digest, DIGEST_HEX_LEN};
pub use schema::{
    notes_schema, ColumnDefinition, ForeignRef, Registry, TableDefinition, UniqueConstraint,
};
pub use validator::{ColumnRef, Validator};
pub use value::{record, ChangeOutcome, InsertOutcome, Record, Row, Value};
