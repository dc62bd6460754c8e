//! External tool availability check.

use console::style;

use crate::extract;

pub async fn cmd_check() -> anyhow::Result<()> {
    println!("\n{}", style("Extraction Tool Status").bold());
    println!("{}", "-".repeat(40));

    let mut all_found = true;
    for (tool, available) in extract::check_tools() {
        let status = if available {
            style("✓ found").green()
        } else {
            all_found = false;
            style("✗ not found").red()
        };
        println!("  {:<12} {}", tool, status);
    }

    if !all_found {
        println!(
            "\n  {}",
            style("Install poppler-utils and tesseract-ocr to run ingestion").dim()
        );
    }

    Ok(())
}
