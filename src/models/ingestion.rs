//! Ingestion lifecycle models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum characters of error text stored on a failed record.
pub const ERROR_TEXT_LIMIT: usize = 500;

/// Lifecycle state of one catalog identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStatus {
    Pending,
    Processed,
    Failed,
}

impl IngestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processed" => Some(Self::Processed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Per-identity processing record.
///
/// A `processed` record always carries an artifact reference; a `failed`
/// record always carries error text. Transitions are upserts keyed by
/// identity, never bare inserts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRecord {
    pub identity: String,
    pub status: IngestionStatus,
    /// Truncated error text from the last failure, cleared on success.
    pub error: Option<String>,
    /// Public URL of the uploaded page artifact.
    pub artifact_url: Option<String>,
    /// Object-store key of the uploaded page artifact.
    pub artifact_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One stored page of extracted text.
///
/// Only pages with at least one non-whitespace character are ever stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub identity: String,
    pub page_number: u32,
    pub text: String,
}

/// Extraction statistics for one document, reported in logs and carried by
/// the empty-extraction error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub total_pages: u32,
    pub stored_pages: u32,
    pub empty_pages: u32,
    /// Pages satisfied by the native text layer.
    pub text_layer_pages: u32,
    /// Pages that needed rasterization and OCR.
    pub ocr_pages: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            IngestionStatus::Pending,
            IngestionStatus::Processed,
            IngestionStatus::Failed,
        ] {
            assert_eq!(IngestionStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(IngestionStatus::from_str("bogus"), None);
    }
}
