//! Catalog models.
//!
//! Catalog rows describe the source binaries to ingest. They are populated
//! by the importer and are read-only to the ingestion pipeline.

use serde::{Deserialize, Serialize};

/// One scanned document in the source catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Database row ID.
    pub id: i64,
    /// Stable external key correlating this binary across catalog,
    /// ingestion-status, and page tables.
    pub identity: String,
    /// Display name or title.
    pub name: String,
    /// URL of the source binary.
    pub binary_url: String,
    /// Size of the binary in bytes, when the catalog knows it.
    pub file_size: Option<i64>,
    /// Collection this item belongs to.
    pub collection: Option<String>,
    /// Subcollection within the collection.
    pub subcollection: Option<String>,
}

impl CatalogItem {
    /// Whether this row carries enough information to be ingested.
    pub fn is_ingestible(&self) -> bool {
        !self.identity.trim().is_empty() && !self.binary_url.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(identity: &str, url: &str) -> CatalogItem {
        CatalogItem {
            id: 1,
            identity: identity.to_string(),
            name: "A Book".to_string(),
            binary_url: url.to_string(),
            file_size: Some(1024),
            collection: None,
            subcollection: None,
        }
    }

    #[test]
    fn test_ingestible_requires_identity_and_url() {
        assert!(item("b-1", "http://x/a.pdf").is_ingestible());
        assert!(!item("", "http://x/a.pdf").is_ingestible());
        assert!(!item("   ", "http://x/a.pdf").is_ingestible());
        assert!(!item("b-1", "").is_ingestible());
    }
}
