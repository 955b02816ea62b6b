//! Scenario tests for the record store.
//!
//! - `crud.rs`        - create/read/update/delete against the notes schema
//! - `uniqueness.rs`  - hashed unique constraints and the opt-in unique indexes
//! - `validation.rs`  - requests rejected before reaching the store
//! - `concurrency.rs` - shared store across tasks, file-backed databases


use crate::{notes_schema, record, AsyncDatabase, FieldCipher, RecordStore, RecordStoreOptions, Value};

pub(crate) const SECRET: &str = "0123456789abcdef0123456789abcdef";

pub(crate) async fn store() -> RecordStore {
    store_with(RecordStoreOptions::default()).await
}

pub(crate) async fn store_with(options: RecordStoreOptions) -> RecordStore {
    let db = AsyncDatabase::open_in_memory().await.unwrap();
    let store = RecordStore::with_options(db, notes_schema(), FieldCipher::new(SECRET), options);
    store.init_schema().await.unwrap();
    store
}

/// Inserts a user and one note type, returning `(user_id, note_type_id)`.
pub(crate) async fn seed(store: &RecordStore, title: &str) -> (i64, i64) {
    let user = store
        .create("USERS", &record([("user_code", "abc123")]))
        .await
        .unwrap();
    let note_type = store
        .create(
            "NOTE_TYPES",
            &record([
                ("user_id", Value::from(user.inserted_id)),
                ("note_type_title", Value::from(title)),
            ]),
        )
        .await
        .unwrap();
    (user.inserted_id, note_type.inserted_id)
}

/// Basic workflow through every public operation.
#[tokio::test]
async fn basic_workflow() {
    let store = store().await;
    let (user_id, note_type_id) = seed(&store, "Work").await;

    let note = store
        .create(
            "NOTES",
            &record([
                ("user_id", Value::from(user_id)),
                ("note_type_id", Value::from(note_type_id)),
                ("content", Value::from("Buy milk")),
            ]),
        )
        .await
        .unwrap();
    assert_eq!(note.rows_affected, 1);

    let filter = record([("note_id", note.inserted_id)]);
    assert!(store.exists("NOTES", &filter).await.unwrap());

    store
        .update("NOTES", &record([("content", "Buy oat milk")]), &filter)
        .await
        .unwrap();
    let rows = store.read("NOTES", &["content"], &filter).await.unwrap();
    assert_eq!(rows[0]["content"], Value::from("Buy oat milk"));

    let deleted = store.delete("NOTES", &filter).await.unwrap();
    assert_eq!(deleted.rows_affected, 1);
    assert!(!store.exists("NOTES", &filter).await.unwrap());
}
