//! Data models shared across the pipeline.

mod catalog;
mod ingestion;

pub use catalog::CatalogItem;
pub use ingestion::{
    ExtractionStats, IngestionRecord, IngestionStatus, PageRecord, ERROR_TEXT_LIMIT,
};
