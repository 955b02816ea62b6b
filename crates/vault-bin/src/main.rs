//! notevault - command-line front end for the schema-driven data layer.

mod app;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vault_config_and_utils::{init_logging, Config, Paths};

/// notevault command-line interface.
#[derive(Parser)]
#[command(name = "notevault")]
#[command(about = "Encrypted, schema-checked record storage on SQLite")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config and logs. Defaults to ~/.notevault
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Database file, overriding the configured one
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Mirror logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Print the DDL for the registry
    Schema,
    /// Create every registered table
    Init,
    /// Insert a row
    Create {
        table: String,
        /// Column values as a JSON object
        #[arg(long)]
        data: String,
    },
    /// Select rows, decrypting encrypted columns
    Read {
        table: String,
        /// Comma-separated columns; `Table.field` joins through a foreign key
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        /// Filter as a JSON object
        #[arg(long = "where")]
        filter: Option<String>,
    },
    /// Update rows matching a filter
    Update {
        table: String,
        #[arg(long)]
        data: String,
        #[arg(long = "where")]
        filter: String,
    },
    /// Delete rows matching a filter
    Delete {
        table: String,
        #[arg(long = "where")]
        filter: String,
    },
    /// Check whether any row matches
    Exists {
        table: String,
        #[arg(long = "where")]
        filter: Option<String>,
    },
    /// Print the hash digest of a value
    Digest { value: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)?;
    if let Some(db) = cli.db {
        config.database_path = Some(db);
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    init_logging(&config.log_level, &paths, cli.verbose)?;

    let mut stdout = std::io::stdout().lock();
    app::run(cli.command, &config, &paths, &mut stdout).await
}
