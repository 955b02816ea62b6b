//! Logging initialization.
//!
//! Wires the observability crate to the notevault log files under
//! `<base>/logs`.

use crate::{CoreError, CoreResult, Paths};
use observability::LogConfig;

const SERVICE_NAME: &str = "notevault";

/// Initialize logging for the process.
///
/// - JSONL to `<base>/logs/combined.jsonl` at `level` (or `RUST_LOG`)
/// - `ERROR` events additionally to `<base>/logs/error.jsonl`
/// - compact stderr output when `also_stderr` is set
///
/// ```ignore
/// init_logging("info", &paths, true)?;
/// tracing::info!("notevault started");
/// ```
pub fn init_logging(level: &str, paths: &Paths, also_stderr: bool) -> CoreResult<()> {
    observability::init_with_config(log_config(level, paths, also_stderr)).map_err(|e| match e.kind() {
        std::io::ErrorKind::AlreadyExists => {
            CoreError::Config(format!("logging already initialized: {}", e))
        }
        _ => CoreError::Io(e),
    })
}

fn log_config(level: &str, paths: &Paths, also_stderr: bool) -> LogConfig {
    LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: level.into(),
        log_path: Some(paths.combined_log_file()),
        error_log_path: Some(paths.error_log_file()),
        also_stderr,
    }
}
