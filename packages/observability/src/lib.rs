//! # Observability
//!
//! Structured logging for notevault services.
//!
//! Services call `observability::init_with_config()` once at startup and use standard
//! `tracing` macros everywhere else. Events are written as JSONL to two
//! append-only files:
//!
//! - `~/.notevault/logs/combined.jsonl`: every event passing the level filter
//! - `~/.notevault/logs/error.jsonl`: `ERROR` events only
//!
//! `RUST_LOG` overrides the configured level. Fields named like secrets
//! (`key`, `secret`, `password`, ...) are written as `[REDACTED]`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() -> std::io::Result<()> {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "notevault".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     })?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

mod json_layer;
mod writer;

use std::path::PathBuf;

pub use json_layer::{JsonLayer, LogEntry};
pub use writer::{default_logs_dir, LogFileWriter, WriterFactory};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every log line.
    pub service_name: String,

    /// Default level filter (e.g. "debug", "info", "vault_database=trace").
    /// Overridden by `RUST_LOG`.
    pub default_level: String,

    /// Combined log file. Defaults to `~/.notevault/logs/combined.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Error-only log file. Defaults to `~/.notevault/logs/error.jsonl`.
    pub error_log_path: Option<PathBuf>,

    /// Also emit compact logs to stderr for foreground runs.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            error_log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging.
///
/// Fails if a log file cannot be opened or a global subscriber is already set.
pub fn init_with_config(config: LogConfig) -> std::io::Result<()> {
    writer::init_subscriber(&config)
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
