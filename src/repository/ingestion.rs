//! Ingestion record lifecycle.
//!
//! One record per identity, upserted on every transition so re-runs and
//! `--reprocess` never hit uniqueness violations.

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, with_retry, Result, Store, SCAN_PAGE_SIZE};
use crate::models::{IngestionRecord, IngestionStatus, ERROR_TEXT_LIMIT};

/// Lifecycle state writes and scans.
pub struct IngestionRepository {
    store: Store,
}

impl IngestionRepository {
    pub(crate) fn new(store: Store) -> Self {
        Self { store }
    }

    /// Identities whose record is `processed`, using the same short-page
    /// pagination as the catalog scan.
    pub fn processed_identities(&self) -> Result<HashSet<String>> {
        let mut identities = HashSet::new();
        let mut cursor = String::new();

        loop {
            let conn = self.store.connect()?;
            let mut stmt = conn.prepare(
                "SELECT identity FROM ingestion_records
                 WHERE status = 'processed' AND identity > ?1
                 ORDER BY identity
                 LIMIT ?2",
            )?;
            let page = stmt
                .query_map(params![cursor, SCAN_PAGE_SIZE as i64], |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let short = page.len() < SCAN_PAGE_SIZE;
            if let Some(last) = page.last() {
                cursor = last.clone();
            }
            identities.extend(page);
            if short {
                break;
            }
        }

        Ok(identities)
    }

    /// Mark an identity as in progress. Clears any prior error; artifact
    /// references from an earlier successful run are left in place.
    pub fn mark_pending(&self, identity: &str) -> Result<()> {
        let identity = identity.to_string();
        with_retry(|| {
            let conn = self.store.connect()?;
            let now = Utc::now().to_rfc3339();
            conn.execute(
                r#"INSERT INTO ingestion_records
                   (identity, status, error, artifact_url, artifact_key, created_at, updated_at)
                   VALUES (?1, 'pending', NULL, NULL, NULL, ?2, ?2)
                   ON CONFLICT(identity) DO UPDATE SET
                       status = 'pending',
                       error = NULL,
                       updated_at = ?2"#,
                params![identity, now],
            )?;
            Ok(())
        })
    }

    /// Mark an identity as successfully processed with its artifact
    /// reference; clears error text.
    pub fn mark_processed(&self, identity: &str, artifact_url: &str, artifact_key: &str) -> Result<()> {
        let identity = identity.to_string();
        let artifact_url = artifact_url.to_string();
        let artifact_key = artifact_key.to_string();
        with_retry(|| {
            let conn = self.store.connect()?;
            let now = Utc::now().to_rfc3339();
            conn.execute(
                r#"INSERT INTO ingestion_records
                   (identity, status, error, artifact_url, artifact_key, created_at, updated_at)
                   VALUES (?1, 'processed', NULL, ?2, ?3, ?4, ?4)
                   ON CONFLICT(identity) DO UPDATE SET
                       status = 'processed',
                       error = NULL,
                       artifact_url = ?2,
                       artifact_key = ?3,
                       updated_at = ?4"#,
                params![identity, artifact_url, artifact_key, now],
            )?;
            Ok(())
        })
    }

    /// Mark an identity as failed with truncated error text. Artifact
    /// references from an earlier successful run are left untouched.
    pub fn mark_failed(&self, identity: &str, error: &str) -> Result<()> {
        let identity = identity.to_string();
        let error = truncate_error(error);
        with_retry(|| {
            let conn = self.store.connect()?;
            let now = Utc::now().to_rfc3339();
            conn.execute(
                r#"INSERT INTO ingestion_records
                   (identity, status, error, artifact_url, artifact_key, created_at, updated_at)
                   VALUES (?1, 'failed', ?2, NULL, NULL, ?3, ?3)
                   ON CONFLICT(identity) DO UPDATE SET
                       status = 'failed',
                       error = ?2,
                       updated_at = ?3"#,
                params![identity, error, now],
            )?;
            Ok(())
        })
    }

    /// Fetch one record by identity.
    pub fn get(&self, identity: &str) -> Result<Option<IngestionRecord>> {
        let conn = self.store.connect()?;
        let record = conn
            .query_row(
                "SELECT identity, status, error, artifact_url, artifact_key, created_at, updated_at
                 FROM ingestion_records WHERE identity = ?1",
                params![identity],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Record counts grouped by status.
    pub fn status_counts(&self) -> Result<Vec<(String, u64)>> {
        let conn = self.store.connect()?;
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM ingestion_records GROUP BY status ORDER BY status",
        )?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    /// Most recently failed records, newest first.
    pub fn recent_failures(&self, limit: usize) -> Result<Vec<IngestionRecord>> {
        let conn = self.store.connect()?;
        let mut stmt = conn.prepare(
            "SELECT identity, status, error, artifact_url, artifact_key, created_at, updated_at
             FROM ingestion_records
             WHERE status = 'failed'
             ORDER BY updated_at DESC
             LIMIT ?1",
        )?;
        let records = stmt
            .query_map(params![limit.max(1) as i64], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn row_to_record(row: &Row) -> rusqlite::Result<IngestionRecord> {
    let status: String = row.get(1)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    Ok(IngestionRecord {
        identity: row.get(0)?,
        status: IngestionStatus::from_str(&status).unwrap_or(IngestionStatus::Pending),
        error: row.get(2)?,
        artifact_url: row.get(3)?,
        artifact_key: row.get(4)?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

/// Cap error text stored on a record, cutting on a char boundary.
fn truncate_error(error: &str) -> String {
    if error.chars().count() <= ERROR_TEXT_LIMIT {
        return error.to_string();
    }
    error.chars().take(ERROR_TEXT_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_util::temp_store;
    use super::*;

    #[test]
    fn test_pending_then_processed_sets_artifact_and_clears_error() {
        let (_dir, store) = temp_store();
        let repo = store.ingestion();

        repo.mark_failed("A", "boom").unwrap();
        repo.mark_pending("A").unwrap();
        let record = repo.get("A").unwrap().unwrap();
        assert_eq!(record.status, IngestionStatus::Pending);
        assert_eq!(record.error, None);

        repo.mark_processed("A", "http://store/x.csv", "pages/x.csv").unwrap();
        let record = repo.get("A").unwrap().unwrap();
        assert_eq!(record.status, IngestionStatus::Processed);
        assert_eq!(record.artifact_url.as_deref(), Some("http://store/x.csv"));
        assert_eq!(record.artifact_key.as_deref(), Some("pages/x.csv"));
        assert_eq!(record.error, None);
    }

    #[test]
    fn test_failed_keeps_prior_artifact_reference() {
        let (_dir, store) = temp_store();
        let repo = store.ingestion();

        repo.mark_processed("A", "http://store/x.csv", "pages/x.csv").unwrap();
        repo.mark_failed("A", "second run exploded").unwrap();

        let record = repo.get("A").unwrap().unwrap();
        assert_eq!(record.status, IngestionStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("second run exploded"));
        // Artifact from the earlier success is untouched.
        assert_eq!(record.artifact_url.as_deref(), Some("http://store/x.csv"));
    }

    #[test]
    fn test_error_text_is_truncated() {
        let (_dir, store) = temp_store();
        let repo = store.ingestion();

        let long = "e".repeat(ERROR_TEXT_LIMIT * 2);
        repo.mark_failed("A", &long).unwrap();
        let record = repo.get("A").unwrap().unwrap();
        assert_eq!(record.error.unwrap().chars().count(), ERROR_TEXT_LIMIT);
    }

    #[test]
    fn test_processed_identities_scan() {
        let (_dir, store) = temp_store();
        let repo = store.ingestion();

        for i in 0..(SCAN_PAGE_SIZE + 3) {
            repo.mark_processed(&format!("id-{i:05}"), "http://u", "k").unwrap();
        }
        repo.mark_failed("failed-one", "err").unwrap();
        repo.mark_pending("pending-one").unwrap();

        let processed = repo.processed_identities().unwrap();
        assert_eq!(processed.len(), SCAN_PAGE_SIZE + 3);
        assert!(!processed.contains("failed-one"));
        assert!(!processed.contains("pending-one"));
    }

    #[test]
    fn test_status_counts_and_recent_failures() {
        let (_dir, store) = temp_store();
        let repo = store.ingestion();

        repo.mark_processed("A", "http://u", "k").unwrap();
        repo.mark_failed("B", "first").unwrap();
        repo.mark_failed("C", "second").unwrap();

        let counts = repo.status_counts().unwrap();
        assert!(counts.contains(&("processed".to_string(), 1)));
        assert!(counts.contains(&("failed".to_string(), 2)));

        let failures = repo.recent_failures(10).unwrap();
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|r| r.error.is_some()));
    }
}
