//! Seed the catalog from a JSON-lines export.

use std::path::Path;

use console::style;
use serde::Deserialize;

use crate::config::Settings;
use crate::models::CatalogItem;
use crate::repository::Store;

/// One catalog row in the import file.
#[derive(Debug, Deserialize)]
struct ImportRow {
    identity: String,
    name: String,
    url: String,
    #[serde(default)]
    size: Option<i64>,
    #[serde(default)]
    collection: Option<String>,
    #[serde(default)]
    subcollection: Option<String>,
}

pub async fn cmd_import(settings: &Settings, file: &Path) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let store = Store::open(&settings.db_path)?;
    let catalog = store.catalog();

    let contents = tokio::fs::read_to_string(file).await?;
    let mut imported = 0usize;

    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row: ImportRow = serde_json::from_str(line)
            .map_err(|e| anyhow::anyhow!("{}:{}: {}", file.display(), line_no + 1, e))?;
        catalog.upsert(&CatalogItem {
            id: 0,
            identity: row.identity,
            name: row.name,
            binary_url: row.url,
            file_size: row.size,
            collection: row.collection,
            subcollection: row.subcollection,
        })?;
        imported += 1;
    }

    println!("{} Imported {} catalog rows", style("✓").green(), imported);
    Ok(())
}
