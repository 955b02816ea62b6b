//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Overrides `log_level`.
pub const ENV_LOG_LEVEL: &str = "NOTEVAULT_LOG_LEVEL";
/// Overrides `database_path`.
pub const ENV_DB_PATH: &str = "NOTEVAULT_DB_PATH";
/// Supplies the field encryption secret.
pub const ENV_ENCRYPTION_KEY: &str = "NOTEVAULT_ENCRYPTION_KEY";

/// Secret length that maps one-to-one onto an AES-256 key.
pub const EXPECTED_KEY_LEN: usize = 32;

/// Main configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Database file; `<base>/notevault.sqlite` when unset.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// JSON table descriptors; the built-in notes schema when unset.
    #[serde(default)]
    pub schema_path: Option<PathBuf>,
    /// Field encryption secret. Never written back to disk.
    #[serde(default, skip_serializing)]
    pub encryption_key: Option<String>,
    /// Back declared unique constraints with unique indexes.
    #[serde(default)]
    pub unique_indexes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            database_path: None,
            schema_path: None,
            encryption_key: None,
            unique_indexes: false,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("log_level", &self.log_level)
            .field("database_path", &self.database_path)
            .field("schema_path", &self.schema_path)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "[REDACTED]"))
            .field("unique_indexes", &self.unique_indexes)
            .finish()
    }
}

impl Config {
    /// Load `<base>/config.json` if present, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to `<base>/config.json`, without the encryption key.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from `lookup`; empty values are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(key) = lookup(ENV_ENCRYPTION_KEY) {
            self.encryption_key = Some(key);
        }
    }

    /// Database file to open.
    pub fn database_file(&self, paths: &Paths) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| paths.database_file())
    }

    /// The field encryption secret.
    ///
    /// Fails when no secret is configured. A secret of any length other than
    /// 32 bytes is accepted, since the codec pads or truncates it, but logged.
    pub fn encryption_secret(&self) -> CoreResult<&str> {
        let secret = self
            .encryption_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                CoreError::Config(format!("no encryption key configured (set {})", ENV_ENCRYPTION_KEY))
            })?;

        if secret.len() != EXPECTED_KEY_LEN {
            warn!(
                len = secret.len(),
                expected = EXPECTED_KEY_LEN,
                "Encryption key is not 32 bytes; it will be padded or truncated"
            );
        }
        Ok(secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert!(config.database_path.is_none());
        assert!(config.schema_path.is_none());
        assert!(config.encryption_key.is_none());
        assert!(!config.unique_indexes);
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let config_json = r#"{
            "log_level": "debug",
            "schema_path": "/etc/notevault/schema.json",
            "unique_indexes": true
        }"#;
        std::fs::write(&config_path, config_json).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(
            config.schema_path,
            Some(PathBuf::from("/etc/notevault/schema.json"))
        );
        assert!(config.unique_indexes);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_save_never_writes_the_key() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config {
            log_level: "trace".to_string(),
            encryption_key: Some("super-secret".to_string()),
            ..Default::default()
        };
        config.save(&paths).unwrap();

        let written = std::fs::read_to_string(paths.config_file()).unwrap();
        assert!(!written.contains("super-secret"));
        assert!(!written.contains("encryption_key"));

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.log_level, "trace");
        assert!(loaded.encryption_key.is_none());
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert!(config.schema_path.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(env(&[
            (ENV_LOG_LEVEL, "warn"),
            (ENV_DB_PATH, "/data/notes.sqlite"),
            (ENV_ENCRYPTION_KEY, "0123456789abcdef0123456789abcdef"),
        ]));

        assert_eq!(config.log_level, "warn");
        assert_eq!(config.database_path, Some(PathBuf::from("/data/notes.sqlite")));
        assert_eq!(
            config.encryption_secret().unwrap(),
            "0123456789abcdef0123456789abcdef"
        );
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(env(&[(ENV_LOG_LEVEL, "  "), (ENV_ENCRYPTION_KEY, "")]));
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert!(config.encryption_key.is_none());
    }

    #[test]
    fn test_missing_secret_is_a_config_error() {
        let config = Config::default();
        assert!(matches!(config.encryption_secret(), Err(CoreError::Config(_))));

        let config = Config {
            encryption_key: Some(String::new()),
            ..Default::default()
        };
        assert!(config.encryption_secret().is_err());
    }

    #[test]
    fn test_short_secret_is_accepted() {
        let config = Config {
            encryption_key: Some("short".to_string()),
            ..Default::default()
        };
        assert_eq!(config.encryption_secret().unwrap(), "short");
    }

    #[test]
    fn test_database_file_resolution() {
        let paths = Paths::with_base_dir(PathBuf::from("/tmp/nv"));
        assert_eq!(
            Config::default().database_file(&paths),
            PathBuf::from("/tmp/nv/notevault.sqlite")
        );

        let config = Config {
            database_path: Some(PathBuf::from("/elsewhere/db.sqlite")),
            ..Default::default()
        };
        assert_eq!(config.database_file(&paths), PathBuf::from("/elsewhere/db.sqlite"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = Config {
            encryption_key: Some("super-secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
