//! Page-level text extraction engine.
//!
//! One engine drives every extraction variant through an ordered strategy
//! list: the native text layer is the fast path, rasterize+OCR the
//! fallback, and a second OCR pass with a different layout mode catches
//! sparse pages the primary mode misreads as empty.

pub mod normalize;
mod tools;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::ExtractionStats;
use crate::pool;
use crate::scratch::ScratchDir;
use normalize::{content_chars, is_meaningful, normalize_text};
pub use tools::{check_tools, ToolError};

/// Default OCR page-segmentation mode: assume a uniform block of text.
const DEFAULT_PRIMARY_PSM: u8 = 6;

/// Fallback page-segmentation mode: fully automatic segmentation, which
/// handles sparse or irregular layouts the uniform-block mode reports as
/// empty.
const DEFAULT_FALLBACK_PSM: u8 = 3;

/// One step in the ordered extraction chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Native text layer via pdftotext; no rendering.
    TextLayer,
    /// Rasterize at the configured DPI, then OCR with the primary and
    /// fallback layout modes.
    RasterOcr,
}

/// Resolve a configured extraction mode into an ordered strategy list.
pub fn strategies_for(mode: &str) -> Option<Vec<Strategy>> {
    match mode {
        "hybrid" => Some(vec![Strategy::TextLayer, Strategy::RasterOcr]),
        "text" => Some(vec![Strategy::TextLayer]),
        "ocr" => Some(vec![Strategy::RasterOcr]),
        _ => None,
    }
}

/// External tools a strategy list depends on, for startup checks.
pub fn required_tools(strategies: &[Strategy]) -> Vec<&'static str> {
    let mut tools = vec!["pdfinfo"];
    if strategies.contains(&Strategy::TextLayer) {
        tools.push("pdftotext");
    }
    if strategies.contains(&Strategy::RasterOcr) {
        tools.push("pdftoppm");
        tools.push("tesseract");
    }
    tools
}

/// How a page's text was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStrategy {
    /// Native text layer.
    TextLayer,
    /// OCR at the primary layout mode.
    OcrPrimary,
    /// OCR retried at the fallback layout mode.
    OcrFallback,
}

impl PageStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextLayer => "text-layer",
            Self::OcrPrimary => "ocr",
            Self::OcrFallback => "ocr-fallback",
        }
    }
}

/// Result of extracting one page, recorded regardless of outcome.
///
/// Empty pages are kept for statistics and dropped before persistence.
#[derive(Debug, Clone)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
    /// Non-whitespace character count.
    pub chars: usize,
    /// Last strategy attempted for this page.
    pub strategy: PageStrategy,
}

impl PageText {
    fn new(page_number: u32, text: String, strategy: PageStrategy) -> Self {
        let chars = content_chars(&text);
        Self {
            page_number,
            text,
            chars,
            strategy,
        }
    }

    /// Whether the page has any extractable text.
    pub fn is_meaningful(&self) -> bool {
        self.chars > 0
    }
}

/// All meaningful pages of one document, sorted ascending by page number.
#[derive(Debug)]
pub struct ExtractionOutcome {
    pub pages: Vec<PageText>,
    pub stats: ExtractionStats,
}

/// Errors from document extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("no extractable text in any of {total_pages} pages (stored {stored_pages}, empty {empty_pages})")]
    EmptyDocument {
        total_pages: u32,
        stored_pages: u32,
        empty_pages: u32,
    },
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Rasterization resolution for OCR.
    pub dpi: u32,
    /// Tesseract language set, e.g. "guj+hin".
    pub langs: String,
    /// Primary OCR layout mode.
    pub primary_psm: u8,
    /// Fallback OCR layout mode.
    pub fallback_psm: u8,
    /// Ordered strategy chain.
    pub strategies: Vec<Strategy>,
    /// Concurrent page workers within one document.
    pub page_workers: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            langs: "guj+hin".to_string(),
            primary_psm: DEFAULT_PRIMARY_PSM,
            fallback_psm: DEFAULT_FALLBACK_PSM,
            strategies: vec![Strategy::TextLayer, Strategy::RasterOcr],
            page_workers: 1,
        }
    }
}

/// Per-document text extraction.
#[derive(Debug, Clone)]
pub struct ExtractionEngine {
    config: ExtractConfig,
}

impl ExtractionEngine {
    pub fn new(config: ExtractConfig) -> Self {
        Self { config }
    }

    /// Extract all meaningful pages from the document in `scratch`.
    ///
    /// Pages are dispatched through the inner bounded pool, so completion
    /// order is non-deterministic; results are re-sorted by page number
    /// before being returned. A document where every page yields no text
    /// is a failure, not a zero-page success.
    pub async fn extract(&self, scratch: &Arc<ScratchDir>) -> Result<ExtractionOutcome, ExtractError> {
        let pdf = scratch.binary_path().to_path_buf();
        let total_pages = run_blocking(move || tools::page_count(&pdf)).await?;

        let results: Arc<Mutex<Vec<Result<PageText, ExtractError>>>> =
            Arc::new(Mutex::new(Vec::with_capacity(total_pages as usize)));

        let pages: Vec<u32> = (1..=total_pages).collect();
        let engine = Arc::new(self.clone());
        let scratch_ref = Arc::clone(scratch);
        let results_ref = Arc::clone(&results);

        pool::for_each_concurrent(pages, self.config.page_workers, move |page| {
            let engine = Arc::clone(&engine);
            let scratch = Arc::clone(&scratch_ref);
            let results = Arc::clone(&results_ref);
            async move {
                let result = engine.extract_page(&scratch, page).await;
                results.lock().await.push(result);
            }
        })
        .await;

        let collected = std::mem::take(&mut *results.lock().await);
        let mut pages = Vec::with_capacity(collected.len());
        for result in collected {
            pages.push(result?);
        }

        assemble(pages, total_pages)
    }

    /// Run the strategy chain for a single page.
    async fn extract_page(&self, scratch: &ScratchDir, page: u32) -> Result<PageText, ExtractError> {
        let mut last = PageText::new(page, String::new(), PageStrategy::TextLayer);

        for strategy in &self.config.strategies {
            match strategy {
                Strategy::TextLayer => {
                    let pdf = scratch.binary_path().to_path_buf();
                    let raw = run_blocking(move || tools::page_text_layer(&pdf, page)).await?;
                    last = PageText::new(page, normalize_text(&raw), PageStrategy::TextLayer);
                }
                Strategy::RasterOcr => {
                    let pdf = scratch.binary_path().to_path_buf();
                    let prefix = scratch.page_image_prefix(page);
                    let dpi = self.config.dpi;
                    let image =
                        run_blocking(move || tools::rasterize_page(&pdf, page, dpi, &prefix))
                            .await?;

                    let config = self.config.clone();
                    let image_path = image.clone();
                    let outcome = run_blocking(move || {
                        ocr_page_with_fallback(
                            |psm| tools::ocr_image(&image_path, &config.langs, psm),
                            config.primary_psm,
                            config.fallback_psm,
                        )
                    })
                    .await;

                    // The rendered image is released as soon as this page's
                    // OCR finishes, not at end of document.
                    scratch.release_page_image(&image);

                    let (text, used) = outcome?;
                    last = PageText::new(page, text, used);
                }
            }
            if last.is_meaningful() {
                tracing::trace!(
                    "page {page}: {} chars via {}",
                    last.chars,
                    last.strategy.as_str()
                );
                return Ok(last);
            }
        }

        tracing::debug!("page {page}: no extractable text after all strategies");
        Ok(last)
    }
}

/// Run OCR at the primary layout mode, retrying once with the fallback
/// mode when the primary pass finds nothing.
fn ocr_page_with_fallback(
    run: impl Fn(u8) -> Result<String, ToolError>,
    primary_psm: u8,
    fallback_psm: u8,
) -> Result<(String, PageStrategy), ToolError> {
    let text = normalize_text(&run(primary_psm)?);
    if is_meaningful(&text) {
        return Ok((text, PageStrategy::OcrPrimary));
    }
    let text = normalize_text(&run(fallback_psm)?);
    Ok((text, PageStrategy::OcrFallback))
}

/// Sort page results, compute stats, and drop empty pages.
fn assemble(mut pages: Vec<PageText>, total_pages: u32) -> Result<ExtractionOutcome, ExtractError> {
    pages.sort_by_key(|p| p.page_number);

    let mut stats = ExtractionStats {
        total_pages,
        ..Default::default()
    };
    for page in &pages {
        if page.is_meaningful() {
            stats.stored_pages += 1;
            match page.strategy {
                PageStrategy::TextLayer => stats.text_layer_pages += 1,
                PageStrategy::OcrPrimary | PageStrategy::OcrFallback => stats.ocr_pages += 1,
            }
        } else {
            stats.empty_pages += 1;
        }
    }

    let kept: Vec<PageText> = pages.into_iter().filter(|p| p.is_meaningful()).collect();
    if kept.is_empty() {
        return Err(ExtractError::EmptyDocument {
            total_pages,
            stored_pages: 0,
            empty_pages: total_pages,
        });
    }

    Ok(ExtractionOutcome { pages: kept, stats })
}

/// Run a blocking tool invocation on the blocking thread pool.
async fn run_blocking<T>(
    f: impl FnOnce() -> Result<T, ToolError> + Send + 'static,
) -> Result<T, ToolError>
where
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ToolError::Io(std::io::Error::other(e)))?
}
