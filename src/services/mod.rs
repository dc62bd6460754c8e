//! Service layer: binary download and ingestion orchestration.

pub mod download;
pub mod ingest;

pub use download::{DownloadError, Downloader};
pub use ingest::{IngestEvent, IngestOptions, IngestService, IngestSummary};
