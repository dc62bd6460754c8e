//! Catalog scans.
//!
//! The pipeline never writes to the catalog; `upsert` exists for the
//! importer that seeds it.

use rusqlite::{params, Row};

use super::{Result, Store, SCAN_PAGE_SIZE};
use crate::models::CatalogItem;

/// Filter for catalog range scans.
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    /// Resume the scan after this row id.
    pub start_at: Option<i64>,
    /// Restrict to one collection.
    pub collection: Option<String>,
}

/// Read access to catalog rows.
pub struct CatalogRepository {
    store: Store,
}

impl CatalogRepository {
    pub(crate) fn new(store: Store) -> Self {
        Self { store }
    }

    /// Fetch candidate rows ordered by id.
    ///
    /// Accumulates fixed-size pages until a page shorter than the page
    /// size signals exhaustion. Any page failure discards the partial
    /// result and propagates.
    pub fn fetch_candidates(&self, filter: &CatalogFilter) -> Result<Vec<CatalogItem>> {
        let mut items = Vec::new();
        let mut cursor = filter.start_at.unwrap_or(0);

        loop {
            let page = self.fetch_page(cursor, filter.collection.as_deref())?;
            let short = page.len() < SCAN_PAGE_SIZE;
            if let Some(last) = page.last() {
                cursor = last.id;
            }
            items.extend(page);
            if short {
                break;
            }
        }

        Ok(items)
    }

    fn fetch_page(&self, after_id: i64, collection: Option<&str>) -> Result<Vec<CatalogItem>> {
        let conn = self.store.connect()?;

        let items = match collection {
            Some(collection) => {
                let mut stmt = conn.prepare(
                    "SELECT id, identity, name, binary_url, file_size, collection, subcollection
                     FROM catalog_items
                     WHERE id > ?1 AND collection = ?2
                     ORDER BY id
                     LIMIT ?3",
                )?;
                let rows = stmt.query_map(
                    params![after_id, collection, SCAN_PAGE_SIZE as i64],
                    row_to_item,
                )?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, identity, name, binary_url, file_size, collection, subcollection
                     FROM catalog_items
                     WHERE id > ?1
                     ORDER BY id
                     LIMIT ?2",
                )?;
                let rows =
                    stmt.query_map(params![after_id, SCAN_PAGE_SIZE as i64], row_to_item)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        Ok(items)
    }

    /// Total catalog rows.
    pub fn count(&self) -> Result<u64> {
        let conn = self.store.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM catalog_items", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Insert or update a catalog row, keyed by identity.
    pub fn upsert(&self, item: &CatalogItem) -> Result<i64> {
        let identity = item.identity.clone();
        let name = item.name.clone();
        let binary_url = item.binary_url.clone();
        let file_size = item.file_size;
        let collection = item.collection.clone();
        let subcollection = item.subcollection.clone();

        super::with_retry(|| {
            let conn = self.store.connect()?;
            conn.execute(
                r#"INSERT INTO catalog_items
                   (identity, name, binary_url, file_size, collection, subcollection)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                   ON CONFLICT(identity) DO UPDATE SET
                       name = excluded.name,
                       binary_url = excluded.binary_url,
                       file_size = excluded.file_size,
                       collection = excluded.collection,
                       subcollection = excluded.subcollection"#,
                params![identity, name, binary_url, file_size, collection, subcollection],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }
}

fn row_to_item(row: &Row) -> rusqlite::Result<CatalogItem> {
    Ok(CatalogItem {
        id: row.get(0)?,
        identity: row.get(1)?,
        name: row.get(2)?,
        binary_url: row.get(3)?,
        file_size: row.get(4)?,
        collection: row.get(5)?,
        subcollection: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_util::temp_store;
    use super::*;

    fn seed(repo: &CatalogRepository, n: usize, collection: Option<&str>) {
        for i in 0..n {
            repo.upsert(&CatalogItem {
                id: 0,
                identity: format!("item-{i:04}"),
                name: format!("Item {i}"),
                binary_url: format!("http://x/{i}.pdf"),
                file_size: None,
                collection: collection.map(|c| c.to_string()),
                subcollection: None,
            })
            .unwrap();
        }
    }

    #[test]
    fn test_fetch_candidates_crosses_page_boundaries() {
        let (_dir, store) = temp_store();
        let repo = store.catalog();
        // One full page plus a partial second page.
        seed(&repo, SCAN_PAGE_SIZE + 7, None);

        let items = repo.fetch_candidates(&CatalogFilter::default()).unwrap();
        assert_eq!(items.len(), SCAN_PAGE_SIZE + 7);
        // Ordered by id throughout.
        assert!(items.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn test_fetch_candidates_exact_page_size_terminates() {
        let (_dir, store) = temp_store();
        let repo = store.catalog();
        seed(&repo, SCAN_PAGE_SIZE, None);

        let items = repo.fetch_candidates(&CatalogFilter::default()).unwrap();
        assert_eq!(items.len(), SCAN_PAGE_SIZE);
    }

    #[test]
    fn test_fetch_candidates_start_at_skips_rows() {
        let (_dir, store) = temp_store();
        let repo = store.catalog();
        seed(&repo, 10, None);

        let all = repo.fetch_candidates(&CatalogFilter::default()).unwrap();
        let start_at = all[4].id;
        let rest = repo
            .fetch_candidates(&CatalogFilter {
                start_at: Some(start_at),
                collection: None,
            })
            .unwrap();
        assert_eq!(rest.len(), 5);
        assert!(rest.iter().all(|i| i.id > start_at));
    }

    #[test]
    fn test_fetch_candidates_collection_filter() {
        let (_dir, store) = temp_store();
        let repo = store.catalog();
        seed(&repo, 3, Some("history"));
        for i in 0..2 {
            repo.upsert(&CatalogItem {
                id: 0,
                identity: format!("other-{i}"),
                name: "Other".to_string(),
                binary_url: "http://x/o.pdf".to_string(),
                file_size: None,
                collection: Some("poetry".to_string()),
                subcollection: None,
            })
            .unwrap();
        }

        let items = repo
            .fetch_candidates(&CatalogFilter {
                start_at: None,
                collection: Some("history".to_string()),
            })
            .unwrap();
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|i| i.collection.as_deref() == Some("history")));
    }

    #[test]
    fn test_upsert_by_identity_updates_in_place() {
        let (_dir, store) = temp_store();
        let repo = store.catalog();
        seed(&repo, 1, None);

        repo.upsert(&CatalogItem {
            id: 0,
            identity: "item-0000".to_string(),
            name: "Renamed".to_string(),
            binary_url: "http://x/new.pdf".to_string(),
            file_size: Some(99),
            collection: None,
            subcollection: None,
        })
        .unwrap();

        let items = repo.fetch_candidates(&CatalogFilter::default()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Renamed");
        assert_eq!(items[0].file_size, Some(99));
    }
}
