//! Configuration, paths and logging bootstrap for notevault.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_LOG_LEVEL, ENV_DB_PATH, ENV_ENCRYPTION_KEY, ENV_LOG_LEVEL, EXPECTED_KEY_LEN,
};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;
pub use paths::Paths;
