//! Pagemill - catalog-driven ingestion pipeline for scanned documents.
//!
//! Scans a catalog of source PDFs, extracts page-level text through a
//! prioritized chain of strategies (native text layer, then OCR with a
//! layout-mode fallback), publishes a CSV artifact per document, and
//! records per-item status so interrupted runs resume where they left off.

pub mod artifact;
pub mod cli;
pub mod config;
pub mod extract;
pub mod models;
pub mod pool;
pub mod repository;
pub mod scratch;
pub mod services;
pub mod storage;
