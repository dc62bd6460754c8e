//! Ingestion pipeline orchestration.
//!
//! Drives the full per-document flow: claim scratch space, download the
//! binary, extract page text, persist page rows, upload the artifact, and
//! finalize the ingestion record. Separated from UI concerns - emits
//! events for progress tracking.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::artifact::build_page_artifact;
use crate::extract::ExtractionEngine;
use crate::models::{CatalogItem, PageRecord};
use crate::pool;
use crate::repository::{CatalogFilter, Store};
use crate::scratch::{sanitize_identity, ScratchDir};
use crate::services::download::Downloader;
use crate::storage::ObjectStore;

/// Events emitted during an ingestion run.
#[derive(Debug, Clone)]
pub enum IngestEvent {
    /// Work set computed.
    Planned {
        total: usize,
        skipped_processed: usize,
    },
    /// A document worker picked up an item.
    DocumentStarted { identity: String, name: String },
    /// A document finished successfully.
    DocumentProcessed {
        identity: String,
        stored_pages: usize,
        artifact_url: String,
    },
    /// A document failed; the error is recorded on its ingestion record.
    DocumentFailed { identity: String, error: String },
}

/// Options for one ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Maximum documents to process (0 = unlimited).
    pub limit: usize,
    /// Resume the catalog scan after this row id.
    pub start_at: Option<i64>,
    /// Restrict to one collection.
    pub collection: Option<String>,
    /// Re-run identities that already have a processed record.
    pub reprocess: bool,
    /// Concurrent document workers.
    pub concurrency: usize,
    /// Compute and report the work set without processing anything.
    pub dry_run: bool,
}

/// End-of-run totals.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub planned: usize,
    pub processed: usize,
    pub failed: usize,
    pub pages_stored: usize,
}

/// Compute the work set for a run.
///
/// Rows without a usable URL or identity are never work. With `reprocess`
/// unset, identities already recorded as processed are excluded, which is
/// what makes interrupted runs safe to re-invoke.
pub fn compute_work_set(
    candidates: Vec<CatalogItem>,
    processed: &HashSet<String>,
    reprocess: bool,
) -> (Vec<CatalogItem>, usize) {
    let mut skipped_processed = 0;
    let work = candidates
        .into_iter()
        .filter(|item| item.is_ingestible())
        .filter(|item| {
            if !reprocess && processed.contains(&item.identity) {
                skipped_processed += 1;
                false
            } else {
                true
            }
        })
        .collect();
    (work, skipped_processed)
}

struct WorkerCtx {
    store: Store,
    object_store: ObjectStore,
    downloader: Downloader,
    engine: ExtractionEngine,
    scratch_base: PathBuf,
    event_tx: mpsc::Sender<IngestEvent>,
    processed: AtomicUsize,
    failed: AtomicUsize,
    pages_stored: AtomicUsize,
}

/// Orchestrates one ingestion batch.
pub struct IngestService {
    store: Store,
    object_store: Option<ObjectStore>,
    downloader: Downloader,
    engine: ExtractionEngine,
    scratch_base: PathBuf,
}

impl IngestService {
    pub fn new(
        store: Store,
        object_store: Option<ObjectStore>,
        downloader: Downloader,
        engine: ExtractionEngine,
        scratch_base: PathBuf,
    ) -> Self {
        Self {
            store,
            object_store,
            downloader,
            engine,
            scratch_base,
        }
    }

    /// Run one batch.
    ///
    /// Setup-phase scan failures abort the run. Per-item failures are
    /// converted into failed ingestion records and never stop sibling
    /// workers; the batch itself completes normally even when individual
    /// documents failed.
    pub async fn run(
        &self,
        options: &IngestOptions,
        event_tx: mpsc::Sender<IngestEvent>,
    ) -> anyhow::Result<IngestSummary> {
        let filter = CatalogFilter {
            start_at: options.start_at,
            collection: options.collection.clone(),
        };
        let candidates = self.store.catalog().fetch_candidates(&filter)?;

        let processed_ids = if options.reprocess {
            HashSet::new()
        } else {
            self.store.ingestion().processed_identities()?
        };

        let (mut work, skipped_processed) =
            compute_work_set(candidates, &processed_ids, options.reprocess);
        if options.limit > 0 {
            work.truncate(options.limit);
        }

        let _ = event_tx
            .send(IngestEvent::Planned {
                total: work.len(),
                skipped_processed,
            })
            .await;

        let mut summary = IngestSummary {
            planned: work.len(),
            ..Default::default()
        };

        if options.dry_run || work.is_empty() {
            return Ok(summary);
        }

        let Some(object_store) = self.object_store.clone() else {
            anyhow::bail!("object storage is not configured");
        };

        let ctx = Arc::new(WorkerCtx {
            store: self.store.clone(),
            object_store,
            downloader: self.downloader.clone(),
            engine: self.engine.clone(),
            scratch_base: self.scratch_base.clone(),
            event_tx,
            processed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            pages_stored: AtomicUsize::new(0),
        });

        let worker_ctx = Arc::clone(&ctx);
        pool::for_each_concurrent(work, options.concurrency, move |item| {
            let ctx = Arc::clone(&worker_ctx);
            async move {
                ingest_one(&ctx, item).await;
            }
        })
        .await;

        summary.processed = ctx.processed.load(Ordering::Relaxed);
        summary.failed = ctx.failed.load(Ordering::Relaxed);
        summary.pages_stored = ctx.pages_stored.load(Ordering::Relaxed);
        Ok(summary)
    }
}

/// Process one catalog item, converting any error into a failed record.
async fn ingest_one(ctx: &WorkerCtx, item: CatalogItem) {
    let _ = ctx
        .event_tx
        .send(IngestEvent::DocumentStarted {
            identity: item.identity.clone(),
            name: item.name.clone(),
        })
        .await;

    // Status write failures must not take down the batch.
    if let Err(e) = ctx.store.ingestion().mark_pending(&item.identity) {
        tracing::warn!("could not mark {} pending: {}", item.identity, e);
    }

    match process_item(ctx, &item).await {
        Ok((stored_pages, artifact_url)) => {
            ctx.processed.fetch_add(1, Ordering::Relaxed);
            ctx.pages_stored.fetch_add(stored_pages, Ordering::Relaxed);
            let _ = ctx
                .event_tx
                .send(IngestEvent::DocumentProcessed {
                    identity: item.identity.clone(),
                    stored_pages,
                    artifact_url,
                })
                .await;
        }
        Err(e) => {
            let error = format!("{e:#}");
            tracing::warn!("ingestion failed for {}: {}", item.identity, error);
            if let Err(we) = ctx.store.ingestion().mark_failed(&item.identity, &error) {
                tracing::warn!("could not record failure for {}: {}", item.identity, we);
            }
            ctx.failed.fetch_add(1, Ordering::Relaxed);
            let _ = ctx
                .event_tx
                .send(IngestEvent::DocumentFailed {
                    identity: item.identity.clone(),
                    error,
                })
                .await;
        }
    }
}

/// The per-document flow: scratch, download, extract, persist, upload,
/// finalize.
async fn process_item(ctx: &WorkerCtx, item: &CatalogItem) -> anyhow::Result<(usize, String)> {
    let scratch = Arc::new(ScratchDir::create(&ctx.scratch_base, &item.identity)?);

    let bytes = ctx
        .downloader
        .fetch_to(&item.binary_url, scratch.binary_path())
        .await?;
    tracing::debug!("downloaded {} ({} bytes)", item.identity, bytes);

    let outcome = ctx.engine.extract(&scratch).await?;
    tracing::info!(
        "extracted {}: {} stored / {} total pages ({} text-layer, {} ocr, {} empty)",
        item.identity,
        outcome.stats.stored_pages,
        outcome.stats.total_pages,
        outcome.stats.text_layer_pages,
        outcome.stats.ocr_pages,
        outcome.stats.empty_pages,
    );

    let records: Vec<PageRecord> = outcome
        .pages
        .iter()
        .map(|page| PageRecord {
            identity: item.identity.clone(),
            page_number: page.page_number,
            text: page.text.clone(),
        })
        .collect();
    ctx.store.pages().replace_pages(&item.identity, &records)?;

    let artifact = build_page_artifact(item, &outcome.pages);
    let name = format!("{}.csv", sanitize_identity(&item.identity));
    let key = ObjectStore::artifact_key(&item.identity);
    let stored = ctx.object_store.upload(artifact, &name, &key).await?;

    if let Err(e) = ctx
        .store
        .ingestion()
        .mark_processed(&item.identity, &stored.url, &stored.key)
    {
        tracing::warn!("could not mark {} processed: {}", item.identity, e);
    }

    Ok((records.len(), stored.url))
    // Scratch space is released here on every path, success or not.
}
