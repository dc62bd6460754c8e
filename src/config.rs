//! Runtime settings sourced from environment variables and flags.

use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

use crate::storage::ObjectStore;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "pagemill.db";

/// Setup errors that abort the run before any work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid {name}: {detail}")]
    Invalid { name: &'static str, detail: String },
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path to the SQLite database.
    pub db_path: PathBuf,
    /// Base directory for per-document scratch space.
    pub scratch_dir: PathBuf,
    /// Object store endpoint URL.
    pub storage_endpoint: Option<String>,
    /// Object store bucket name.
    pub storage_bucket: Option<String>,
    /// Object store bearer token.
    pub storage_token: Option<String>,
    /// Extraction mode: hybrid, text, or ocr.
    pub strategy: String,
    /// Download timeout in seconds.
    pub request_timeout: u64,
    /// User agent for HTTP requests.
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pagemill");

        Self {
            db_path: data_dir.join(DEFAULT_DATABASE_FILENAME),
            scratch_dir: std::env::temp_dir().join("pagemill"),
            storage_endpoint: None,
            storage_bucket: None,
            storage_token: None,
            strategy: "hybrid".to_string(),
            request_timeout: 60,
            user_agent: "Pagemill/0.4 (library digitization)".to_string(),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

impl Settings {
    /// Load settings from the environment, with `data` (the `--data`
    /// flag) taking precedence over `PAGEMILL_DB` for the database
    /// location.
    pub fn load(data: Option<&Path>) -> Self {
        let mut settings = Self::default();

        if let Some(db) = env_var("PAGEMILL_DB") {
            settings.db_path = PathBuf::from(db);
        }
        if let Some(dir) = env_var("PAGEMILL_SCRATCH") {
            settings.scratch_dir = PathBuf::from(dir);
        }
        if let Some(strategy) = env_var("PAGEMILL_STRATEGY") {
            settings.strategy = strategy;
        }
        settings.storage_endpoint = env_var("STORAGE_ENDPOINT");
        settings.storage_bucket = env_var("STORAGE_BUCKET");
        settings.storage_token = env_var("STORAGE_TOKEN");

        if let Some(data) = data {
            settings.db_path = resolve_data_path(data);
        }

        settings
    }

    /// Ensure the database parent and scratch directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(&self.scratch_dir)
    }

    /// Build the object store client, failing fast when any storage
    /// credential is missing or malformed.
    pub fn object_store(&self) -> Result<ObjectStore, ConfigError> {
        let endpoint = self
            .storage_endpoint
            .as_deref()
            .ok_or(ConfigError::MissingEnv("STORAGE_ENDPOINT"))?;
        let bucket = self
            .storage_bucket
            .as_deref()
            .ok_or(ConfigError::MissingEnv("STORAGE_BUCKET"))?;
        let token = self
            .storage_token
            .as_deref()
            .ok_or(ConfigError::MissingEnv("STORAGE_TOKEN"))?;

        let endpoint = Url::parse(endpoint).map_err(|e| ConfigError::Invalid {
            name: "STORAGE_ENDPOINT",
            detail: e.to_string(),
        })?;

        ObjectStore::new(endpoint, bucket.to_string(), token.to_string()).map_err(|e| {
            ConfigError::Invalid {
                name: "STORAGE_ENDPOINT",
                detail: e.to_string(),
            }
        })
    }
}

/// Resolve the `--data` flag: a .db file is used directly, a directory
/// gets the default database filename inside it.
fn resolve_data_path(path: &Path) -> PathBuf {
    let is_db_file = path
        .extension()
        .is_some_and(|ext| ext == "db" || ext == "sqlite" || ext == "sqlite3")
        || (path.exists() && path.is_file());

    if is_db_file {
        path.to_path_buf()
    } else {
        path.join(DEFAULT_DATABASE_FILENAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_data_path_db_file() {
        assert_eq!(
            resolve_data_path(Path::new("/tmp/catalog.db")),
            PathBuf::from("/tmp/catalog.db")
        );
        assert_eq!(
            resolve_data_path(Path::new("/tmp/catalog.sqlite3")),
            PathBuf::from("/tmp/catalog.sqlite3")
        );
    }

    #[test]
    fn test_resolve_data_path_directory() {
        assert_eq!(
            resolve_data_path(Path::new("/tmp/data")),
            PathBuf::from("/tmp/data").join(DEFAULT_DATABASE_FILENAME)
        );
    }

    #[test]
    fn test_object_store_requires_all_credentials() {
        let mut settings = Settings {
            storage_endpoint: Some("https://store.example.com".to_string()),
            storage_bucket: Some("artifacts".to_string()),
            storage_token: None,
            ..Default::default()
        };
        assert!(matches!(
            settings.object_store(),
            Err(ConfigError::MissingEnv("STORAGE_TOKEN"))
        ));

        settings.storage_token = Some("secret".to_string());
        assert!(settings.object_store().is_ok());
    }

    #[test]
    fn test_object_store_rejects_malformed_endpoint() {
        let settings = Settings {
            storage_endpoint: Some("not a url".to_string()),
            storage_bucket: Some("artifacts".to_string()),
            storage_token: Some("secret".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            settings.object_store(),
            Err(ConfigError::Invalid { name: "STORAGE_ENDPOINT", .. })
        ));
    }
}
