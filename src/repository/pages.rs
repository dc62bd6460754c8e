//! Per-page extracted text storage.

use chrono::Utc;
use rusqlite::types::ToSql;
use rusqlite::params;

use super::{with_retry, Result, Store};
use crate::models::PageRecord;

/// Rows per INSERT statement; bounds statement size for very long
/// documents.
const INSERT_CHUNK: usize = 200;

/// Page row storage.
pub struct PageRepository {
    store: Store,
}

impl PageRepository {
    pub(crate) fn new(store: Store) -> Self {
        Self { store }
    }

    /// Replace all stored pages for an identity.
    ///
    /// Delete and chunked reinsert run inside one transaction: the prior
    /// rows stay visible until commit, so a crash mid-replacement never
    /// leaves a processed document without pages.
    pub fn replace_pages(&self, identity: &str, pages: &[PageRecord]) -> Result<()> {
        let identity = identity.to_string();
        let pages = pages.to_vec();

        with_retry(|| {
            let mut conn = self.store.connect()?;
            let tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();

            tx.execute(
                "DELETE FROM document_pages WHERE identity = ?1",
                params![identity],
            )?;

            for chunk in pages.chunks(INSERT_CHUNK) {
                let mut sql = String::from(
                    "INSERT INTO document_pages (identity, page_number, text, created_at) VALUES ",
                );
                let placeholders: Vec<&str> = chunk.iter().map(|_| "(?, ?, ?, ?)").collect();
                sql.push_str(&placeholders.join(", "));

                let mut values: Vec<&dyn ToSql> = Vec::with_capacity(chunk.len() * 4);
                for page in chunk {
                    values.push(&page.identity);
                    values.push(&page.page_number);
                    values.push(&page.text);
                    values.push(&now);
                }
                tx.execute(&sql, values.as_slice())?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    /// All stored pages for an identity, ascending by page number.
    pub fn get_pages(&self, identity: &str) -> Result<Vec<PageRecord>> {
        let conn = self.store.connect()?;
        let mut stmt = conn.prepare(
            "SELECT identity, page_number, text FROM document_pages
             WHERE identity = ?1
             ORDER BY page_number",
        )?;
        let pages = stmt
            .query_map(params![identity], |row| {
                Ok(PageRecord {
                    identity: row.get(0)?,
                    page_number: row.get(1)?,
                    text: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pages)
    }

    /// Total stored pages across all identities.
    pub fn count(&self) -> Result<u64> {
        let conn = self.store.connect()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM document_pages", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
