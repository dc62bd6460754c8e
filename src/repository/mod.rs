//! SQLite persistence for catalog, ingestion records, and page text.
//!
//! Connections are opened per operation; SQLite serializes writers and the
//! busy retry below keeps concurrent document workers from surfacing
//! transient lock errors.

pub mod catalog;
pub mod ingestion;
pub mod pages;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;

pub use catalog::{CatalogFilter, CatalogRepository};
pub use ingestion::IngestionRepository;
pub use pages::PageRepository;

/// Errors from store access.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Page size for range scans; exhaustion is signalled by a short page,
/// never inferred from totals.
pub(crate) const SCAN_PAGE_SIZE: usize = 500;

/// Shared handle to the SQLite store.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Open the store at `path`, creating the schema if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self {
            path: path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS catalog_items (
                id INTEGER PRIMARY KEY,
                identity TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                binary_url TEXT NOT NULL,
                file_size INTEGER,
                collection TEXT,
                subcollection TEXT
            );

            CREATE TABLE IF NOT EXISTS ingestion_records (
                identity TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                error TEXT,
                artifact_url TEXT,
                artifact_key TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_ingestion_status
                ON ingestion_records(status);

            CREATE TABLE IF NOT EXISTS document_pages (
                identity TEXT NOT NULL,
                page_number INTEGER NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (identity, page_number)
            );
            "#,
        )?;
        Ok(())
    }

    /// Catalog rows (read-only to the ingestion pipeline).
    pub fn catalog(&self) -> CatalogRepository {
        CatalogRepository::new(self.clone())
    }

    /// Per-identity ingestion lifecycle records.
    pub fn ingestion(&self) -> IngestionRepository {
        IngestionRepository::new(self.clone())
    }

    /// Per-page extracted text.
    pub fn pages(&self) -> PageRepository {
        PageRepository::new(self.clone())
    }
}

/// Retry a store operation a few times when SQLite reports the database
/// busy or locked.
pub(crate) fn with_retry<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempts: u64 = 0;
    loop {
        match op() {
            Err(StoreError::Sqlite(ref e)) if is_busy(e) && attempts < 5 => {
                attempts += 1;
                std::thread::sleep(Duration::from_millis(50 * attempts));
            }
            other => return other,
        }
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::DatabaseBusy
                || err.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

/// Parse a datetime string from the database, defaulting to Unix epoch on
/// error.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/pagemill.db");
        Store::open(&nested).unwrap();
        assert!(nested.exists());
    }

    #[test]
    fn test_parse_datetime_falls_back_to_epoch() {
        assert_eq!(parse_datetime("not a date"), DateTime::UNIX_EPOCH);
        let now = Utc::now();
        let parsed = parse_datetime(&now.to_rfc3339());
        assert_eq!(parsed.timestamp(), now.timestamp());
    }
}
