//! Ingest pending catalog documents.

use std::time::Duration;

use console::style;
use indicatif::ProgressBar;
use tokio::sync::mpsc;

use super::IngestArgs;
use crate::config::Settings;
use crate::extract::{self, ExtractConfig, ExtractionEngine};
use crate::repository::Store;
use crate::services::{Downloader, IngestEvent, IngestOptions, IngestService};

/// Run one ingestion batch.
///
/// Setup failures (missing credentials, missing tools, scan errors)
/// abort with a non-zero exit. Per-document failures are recorded on
/// their ingestion records and reported in the summary; the process
/// still exits 0.
pub async fn cmd_ingest(settings: &Settings, args: &IngestArgs) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let strategies = extract::strategies_for(&settings.strategy).ok_or_else(|| {
        anyhow::anyhow!(
            "invalid PAGEMILL_STRATEGY '{}' (expected hybrid, text, or ocr)",
            settings.strategy
        )
    })?;

    let store = Store::open(&settings.db_path)?;

    let object_store = if args.dry_run {
        None
    } else {
        // Setup-phase validation: toolchain and storage credentials must
        // be present before any document is touched.
        for tool in extract::required_tools(&strategies) {
            if which::which(tool).is_err() {
                anyhow::bail!("required tool '{tool}' not found in PATH (run 'pagemill check')");
            }
        }
        Some(settings.object_store()?)
    };

    let downloader = Downloader::new(
        Duration::from_secs(settings.request_timeout),
        &settings.user_agent,
    )?;
    let engine = ExtractionEngine::new(ExtractConfig {
        dpi: args.dpi,
        langs: args.langs.clone(),
        strategies,
        page_workers: args.page_concurrency,
        ..ExtractConfig::default()
    });

    let service = IngestService::new(
        store,
        object_store,
        downloader,
        engine,
        settings.scratch_dir.clone(),
    );

    let options = IngestOptions {
        limit: args.limit,
        start_at: args.start_at,
        collection: args.collection.clone(),
        reprocess: args.reprocess,
        concurrency: args.concurrency,
        dry_run: args.dry_run,
    };

    // Event channel for progress updates (UI layer).
    let (event_tx, mut event_rx) = mpsc::channel::<IngestEvent>(100);

    let dry_run = args.dry_run;
    let event_handler = tokio::spawn(async move {
        let mut progress: Option<ProgressBar> = None;

        while let Some(event) = event_rx.recv().await {
            match event {
                IngestEvent::Planned {
                    total,
                    skipped_processed,
                } => {
                    if skipped_processed > 0 {
                        println!(
                            "{} Skipping {} already processed documents",
                            style("→").dim(),
                            skipped_processed
                        );
                    }
                    if dry_run {
                        println!("{} Would process {} documents", style("→").cyan(), total);
                    } else if total > 0 {
                        println!("{} Processing {} documents", style("→").cyan(), total);
                        progress = Some(ProgressBar::new(total as u64));
                    } else {
                        println!("{} Nothing to ingest", style("!").yellow());
                    }
                }
                IngestEvent::DocumentStarted { identity, .. } => {
                    if let Some(ref pb) = progress {
                        pb.set_message(identity);
                    }
                }
                IngestEvent::DocumentProcessed {
                    identity,
                    stored_pages,
                    ..
                } => {
                    if let Some(ref pb) = progress {
                        pb.println(format!(
                            "  {} {} ({} pages)",
                            style("✓").green(),
                            identity,
                            stored_pages
                        ));
                        pb.inc(1);
                    }
                }
                IngestEvent::DocumentFailed { identity, error } => {
                    if let Some(ref pb) = progress {
                        pb.println(format!("  {} {}: {}", style("✗").red(), identity, error));
                        pb.inc(1);
                    }
                }
            }
        }

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }
    });

    let summary = service.run(&options, event_tx).await?;
    let _ = event_handler.await;

    if dry_run {
        return Ok(());
    }

    println!(
        "\n{} {} processed, {} failed, {} pages stored",
        style("Done:").bold(),
        summary.processed,
        summary.failed,
        summary.pages_stored
    );
    if summary.failed > 0 {
        println!(
            "  {} Failures are recorded with their errors; see 'pagemill status'",
            style("→").dim()
        );
    }

    // Individual document failures do not fail the batch.
    Ok(())
}
