//! Ingestion status summary.

use console::style;

use crate::config::Settings;
use crate::repository::Store;

pub async fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    let store = Store::open(&settings.db_path)?;

    let catalog_count = store.catalog().count()?;
    let page_count = store.pages().count()?;
    let counts = store.ingestion().status_counts()?;

    println!("\n{}", style("Ingestion Status").bold());
    println!("{}", "-".repeat(40));
    println!("  {:<12} {}", "catalog", catalog_count);
    for (status, count) in &counts {
        println!("  {:<12} {}", status, count);
    }
    println!("  {:<12} {}", "pages", page_count);

    let failures = store.ingestion().recent_failures(5)?;
    if !failures.is_empty() {
        println!("\n{}", style("Recent failures:").red());
        for record in failures {
            println!(
                "  {} {}",
                style(&record.identity).bold(),
                record.error.as_deref().unwrap_or("")
            );
        }
    }

    Ok(())
}
