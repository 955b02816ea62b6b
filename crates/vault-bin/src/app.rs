//! Command handlers.

use crate::Commands;
use std::error::Error;
use std::io::Write;
use tracing::info;
use vault_config_and_utils::{Config, Paths};
use vault_database::{
    create_schema_sql, digest, notes_schema, AsyncDatabase, FieldCipher, Record, RecordStore,
    RecordStoreOptions, Registry, Value,
};

type AppResult<T> = Result<T, Box<dyn Error>>;

/// Run one command, writing its JSON (or SQL) output to `out`.
pub async fn run<W: Write>(
    command: Commands,
    config: &Config,
    paths: &Paths,
    out: &mut W,
) -> AppResult<()> {
    match command {
        Commands::Schema => {
            let registry = load_registry(config)?;
            writeln!(out, "{}", create_schema_sql(&registry, config.unique_indexes))?;
        }
        Commands::Digest { value } => {
            writeln!(out, "{}", digest(&value))?;
        }
        Commands::Init => {
            let store = open_store(config, paths).await?;
            store.init_schema().await?;
            info!(database = %store.database().path(), "Schema initialized");
            print_json(
                out,
                &serde_json::json!({
                    "database": store.database().path(),
                    "tables": store.registry().len(),
                }),
            )?;
        }
        Commands::Create { table, data } => {
            let store = open_store(config, paths).await?;
            let outcome = store.create(&table, &parse_record(&data)?).await?;
            print_json(out, &outcome)?;
        }
        Commands::Read {
            table,
            columns,
            filter,
        } => {
            let store = open_store(config, paths).await?;
            let filter = parse_optional_record(filter.as_deref())?;
            let rows = store.read(&table, &columns, &filter).await?;
            print_json(out, &rows)?;
        }
        Commands::Update {
            table,
            data,
            filter,
        } => {
            let store = open_store(config, paths).await?;
            let outcome = store
                .update(&table, &parse_record(&data)?, &parse_record(&filter)?)
                .await?;
            print_json(out, &outcome)?;
        }
        Commands::Delete { table, filter } => {
            let store = open_store(config, paths).await?;
            let outcome = store.delete(&table, &parse_record(&filter)?).await?;
            print_json(out, &outcome)?;
        }
        Commands::Exists { table, filter } => {
            let store = open_store(config, paths).await?;
            let filter = parse_optional_record(filter.as_deref())?;
            let found = store.exists(&table, &filter).await?;
            print_json(out, &serde_json::json!({ "exists": found }))?;
        }
    }
    Ok(())
}

fn load_registry(config: &Config) -> AppResult<Registry> {
    match &config.schema_path {
        Some(path) => Ok(Registry::load_from_file(path)?),
        None => Ok(notes_schema()),
    }
}

async fn open_store(config: &Config, paths: &Paths) -> AppResult<RecordStore> {
    let registry = load_registry(config)?;
    let cipher = FieldCipher::new(config.encryption_secret()?);
    let db = AsyncDatabase::open(&config.database_file(paths)).await?;
    Ok(RecordStore::with_options(
        db,
        registry,
        cipher,
        RecordStoreOptions {
            unique_indexes: config.unique_indexes,
        },
    ))
}

fn print_json<W: Write, T: serde::Serialize + ?Sized>(out: &mut W, value: &T) -> AppResult<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn parse_optional_record(raw: Option<&str>) -> AppResult<Record> {
    raw.map(parse_record).unwrap_or_else(|| Ok(Record::new()))
}

/// Parse a flat JSON object into a record. Booleans become 0/1.
fn parse_record(raw: &str) -> AppResult<Record> {
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)?;
    object
        .into_iter()
        .map(|(column, value)| -> AppResult<(String, Value)> {
            let value = match value {
                serde_json::Value::Null => Value::Null,
                serde_json::Value::Bool(b) => Value::from(b),
                serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                    (Some(i), _) => Value::Integer(i),
                    (None, Some(f)) => Value::Real(f),
                    (None, None) => return Err(format!("unsupported number for {}", column).into()),
                },
                serde_json::Value::String(s) => Value::Text(s),
                _ => return Err(format!("value for {} must be a scalar", column).into()),
            };
            Ok((column, value))
        })
        .collect()
}
